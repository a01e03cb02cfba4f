use std::sync::Arc;
use std::time::Duration;

use cloudprobe::content::{digest_reader, ContentSpec};
use cloudprobe::crvd::{Crvd, CrvdState};
use cloudprobe::error::ProbeError;
use cloudprobe::keys::ObjectKey;
use cloudprobe::retry::{BackoffStrategy, RetryPolicy};
use cloudprobe::target::{LocalTarget, MemoryTarget, Operation, Target, TargetConfig, TargetError};
use tempfile::TempDir;

const ROUND_TRIP_LENGTHS: [u64; 4] = [0, 1, 4096, 5 * 1024 * 1024 + 17];

fn quick_retries() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        backoff: BackoffStrategy::Fixed,
        jitter_factor: 0.0,
    }
}

#[tokio::test]
async fn test_round_trip_memory() {
    let target = Arc::new(MemoryTarget::new("bucket"));
    for length in ROUND_TRIP_LENGTHS {
        let content = ContentSpec::new(length, 0).unwrap();
        let mut crvd = Crvd::new(target.clone(), Some(ObjectKey::from(format!("rt-{}", length))), content);
        crvd.create_retrieve_verify().await.unwrap();

        assert_eq!(crvd.state(), CrvdState::Kept);
        let (retrieved, retrieved_length) = crvd.retrieved_digest().unwrap();
        assert_eq!(Some(retrieved), crvd.expected_digest());
        assert_eq!(retrieved_length, length);
        assert!(target.contains(crvd.key()));
    }
}

#[tokio::test]
async fn test_round_trip_local_directory() {
    let dir = TempDir::new().unwrap();
    let target: Arc<dyn Target> = Arc::new(LocalTarget::new(dir.path()));
    for length in ROUND_TRIP_LENGTHS {
        let content = ContentSpec::new(length, 42).unwrap();
        let key = ObjectKey::from(format!("nested/rt-{}.bin", length));
        let mut crvd = Crvd::new(target.clone(), Some(key.clone()), content);
        crvd.create_retrieve_verify_delete().await.unwrap();
        assert_eq!(crvd.state(), CrvdState::Deleted);
        assert!(!target.head(&key).await.unwrap());
    }
    assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
}

#[tokio::test]
async fn test_delete_finality() {
    let target = Arc::new(MemoryTarget::new("bucket"));
    let mut crvd = Crvd::new(target.clone(), None, ContentSpec::default());
    crvd.create_retrieve_verify_delete().await.unwrap();

    assert!(!target.head(crvd.key()).await.unwrap());
    let err = target.get(crvd.key()).await.err().unwrap();
    assert!(err.is_not_found());
    assert!(!crvd.may_have_orphaned());
}

#[tokio::test]
async fn test_stored_content_matches_generator() {
    let target = Arc::new(MemoryTarget::new("bucket"));
    let content = ContentSpec::new(100_000, 7).unwrap();
    let mut crvd = Crvd::new(target.clone(), Some("det.bin".into()), content);
    crvd.create_retrieve_verify().await.unwrap();

    let stored = target.get(&ObjectKey::from("det.bin")).await.unwrap();
    let (digest, length) = digest_reader(stored).await.unwrap();
    assert_eq!(length, 100_000);
    assert_eq!(digest, ContentSpec::new(100_000, 7).unwrap().digest());
    assert_ne!(digest, ContentSpec::new(100_000, 8).unwrap().digest());
}

#[tokio::test]
async fn test_corruption_is_reported_with_both_digests() {
    let target = Arc::new(MemoryTarget::new("bucket"));
    target.set_corrupt_reads(true);
    let mut crvd = Crvd::new(target.clone(), Some("corrupt.bin".into()), ContentSpec::default());

    let err = crvd.create_retrieve_verify_delete().await.unwrap_err();
    match &err {
        ProbeError::ContentMismatch {
            expected_digest,
            actual_digest,
            expected_length,
            actual_length,
            ..
        } => {
            assert_ne!(expected_digest, actual_digest);
            assert_eq!(*expected_length, 4096);
            assert_eq!(*actual_length, 4096);
        }
        other => panic!("unexpected error: {}", other),
    }
    assert!(!err.is_permanent());
    assert!(crvd.may_have_orphaned());
    assert!(target.contains(&ObjectKey::from("corrupt.bin")));
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let target = Arc::new(MemoryTarget::new("bucket"));
    target.fail_next(Operation::Put, TargetError::RateLimited("SlowDown".to_string()));
    target.fail_next(Operation::Get, TargetError::Network("connection reset".to_string()));

    let mut crvd = Crvd::new(target.clone(), None, ContentSpec::default()).with_retry_policy(quick_retries());
    crvd.create_retrieve_verify_delete().await.unwrap();

    let counts = target.counts();
    assert_eq!(counts.puts, 2);
    assert_eq!(counts.gets, 2);
    assert_eq!(counts.deletes, 1);
}

#[tokio::test]
async fn test_delete_failure_keeps_verification() {
    let target = Arc::new(MemoryTarget::new("bucket"));
    target.fail_next(Operation::Delete, TargetError::Rejected {
        code: "MethodNotAllowed".to_string(),
        message: "delete not permitted".to_string(),
    });

    let mut crvd = Crvd::new(target.clone(), None, ContentSpec::default()).with_retry_policy(quick_retries());
    let err = crvd.create_retrieve_verify_delete().await.unwrap_err();
    assert!(matches!(err, ProbeError::DeleteFailed { .. }));
    assert!(crvd.verified());
    assert!(crvd.may_have_orphaned());
}

#[tokio::test]
async fn test_mem_url_limits() {
    let target = TargetConfig::parse("mem://limited?max-size=1K")
        .unwrap()
        .connect()
        .await
        .unwrap();

    let mut small = Crvd::new(target.clone(), None, ContentSpec::new(1024, 0).unwrap());
    small.create_retrieve_verify_delete().await.unwrap();

    let mut large = Crvd::new(target, None, ContentSpec::new(1025, 0).unwrap());
    let err = large.create_retrieve_verify_delete().await.unwrap_err();
    assert!(matches!(err, ProbeError::Target(TargetError::Rejected { .. })));
    assert!(!large.may_have_orphaned());
}
