//! Exhaustive key probing: every key in a list, judged against a polarity

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use super::{crvd_probe, Case, CaseResult, Polarity, ProbeContext, Strategy};
use crate::error::Result;
use crate::keys::{KeyList, KeyResult};

/// Tests every key of a list individually
///
/// The case succeeds only if every outcome matches the polarity; each
/// mismatch is reported separately, so one unexpected acceptance in an
/// invalid-key list is one anomaly rather than a failed list.
pub struct ExhaustiveCase {
    name: String,
    list: Arc<KeyList>,
    polarity: Polarity,
}

impl ExhaustiveCase {
    pub fn new(prefix: &str, list: KeyList, polarity: Polarity) -> Self {
        Self {
            name: format!("{}{}", prefix, list.name()),
            list: Arc::new(list),
            polarity,
        }
    }

    pub fn list(&self) -> &KeyList {
        &self.list
    }
}

#[async_trait]
impl Case for ExhaustiveCase {
    fn name(&self) -> &str {
        &self.name
    }

    fn strategy(&self) -> Strategy {
        Strategy::Exhaustive
    }

    fn polarity(&self) -> Polarity {
        self.polarity
    }

    fn domain(&self) -> String {
        let expectation = match self.polarity {
            Polarity::ExpectAcceptance => "expect acceptance",
            Polarity::ExpectRejection => "expect rejection",
        };
        format!("{} keys, each tested ({})", self.list.count(), expectation)
    }

    async fn execute(&self, ctx: &ProbeContext) -> Result<CaseResult> {
        let mut result = CaseResult::new(&self.name, self.strategy());

        for (index, key) in self.list.keys().enumerate() {
            if ctx.is_cancelled() {
                result.abandoned = true;
                break;
            }

            let probe = crvd_probe(ctx, ctx.unicode_key(&key), ctx.key_content, self.polarity).await?;
            result.tested += 1;
            result.orphans.extend(probe.orphan);

            let key_result = KeyResult::new(self.list.clone(), index as u64, key, probe.error);
            if self.polarity.is_expected(key_result.success()) {
                debug!("{}", key_result.pretty());
            } else {
                info!("Unexpected outcome: {}", key_result.pretty());
                result.anomalies.push(key_result);
            }
        }

        result.success = !result.abandoned && result.anomalies.is_empty();
        result.summary = match (self.polarity, result.anomalies.len()) {
            (_, _) if result.abandoned => format!("abandoned after {} of {} keys", result.tested, self.list.count()),
            (Polarity::ExpectAcceptance, 0) => format!("all {} keys accepted", result.tested),
            (Polarity::ExpectRejection, 0) => format!("all {} keys rejected", result.tested),
            (Polarity::ExpectAcceptance, n) => format!("{} of {} keys rejected", n, result.tested),
            (Polarity::ExpectRejection, n) => format!("{} of {} keys unexpectedly accepted", n, result.tested),
        };
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::ObjectKey;
    use crate::retry::RetryPolicy;
    use crate::target::{MemoryTarget, Operation, TargetError};

    fn context(target: Arc<MemoryTarget>) -> ProbeContext {
        ProbeContext::new(target)
            .with_retry_policy(RetryPolicy::none())
            .with_run_id("test")
    }

    fn reject_containing(byte: u8) -> impl Fn(&ObjectKey) -> Option<TargetError> + Send + Sync {
        move |key: &ObjectKey| {
            key.as_bytes().contains(&byte).then(|| TargetError::InvalidKey {
                key: key.to_string(),
                reason: "forbidden byte".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_all_rejected_is_success() {
        let target = Arc::new(MemoryTarget::new("t").with_key_filter(reject_containing(b'!')));
        let list = KeyList::from_sequences("Bang", ["!", "a!", "!!"]);
        let case = ExhaustiveCase::new("Invalid: ", list, Polarity::ExpectRejection);

        let result = case.execute(&context(target.clone())).await.unwrap();
        assert!(result.success, "{}", result.summary);
        assert_eq!(result.tested, 3);
        assert!(result.anomalies.is_empty());
        assert_eq!(target.object_count(), 0);
    }

    #[tokio::test]
    async fn test_one_unexpected_acceptance_is_one_anomaly() {
        let target = Arc::new(MemoryTarget::new("t").with_key_filter(reject_containing(b'!')));
        let list = KeyList::from_sequences("Mixed", ["!", "ok", "!!"]);
        let case = ExhaustiveCase::new("Invalid: ", list, Polarity::ExpectRejection);

        let result = case.execute(&context(target)).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.tested, 3);
        assert_eq!(result.anomalies.len(), 1);
        assert_eq!(result.anomalies[0].index, 1);
        assert_eq!(result.anomalies[0].key, ObjectKey::from("ok"));
        assert_eq!(result.summary, "1 of 3 keys unexpectedly accepted");
    }

    #[tokio::test]
    async fn test_permanent_errors_count_as_rejection() {
        let target = Arc::new(MemoryTarget::new("t").with_key_filter(|_: &ObjectKey| {
            Some(TargetError::PermissionDenied("SignatureDoesNotMatch".to_string()))
        }));
        let list = KeyList::from_sequences("Any", ["x"]);

        let rejecting = ExhaustiveCase::new("", list.clone(), Polarity::ExpectRejection);
        assert!(rejecting.execute(&context(target.clone())).await.unwrap().success);

        let accepting = ExhaustiveCase::new("", list, Polarity::ExpectAcceptance);
        let err = accepting.execute(&context(target)).await.unwrap_err();
        assert!(err.is_permanent());
    }

    #[tokio::test]
    async fn test_cancelled_case_is_abandoned() {
        let target = Arc::new(MemoryTarget::new("t"));
        let ctx = context(target.clone());
        ctx.cancel.cancel();
        let case = ExhaustiveCase::new("", KeyList::from_sequences("Any", ["a", "b"]), Polarity::ExpectAcceptance);

        let result = case.execute(&ctx).await.unwrap();
        assert!(result.abandoned);
        assert!(!result.success);
        assert_eq!(result.tested, 0);
        assert_eq!(target.total_operations(), 0);
    }

    #[tokio::test]
    async fn test_denied_delete_keeps_key_accepted() {
        let target = Arc::new(MemoryTarget::new("t"));
        target.fail_next(Operation::Delete, TargetError::PermissionDenied("no delete".to_string()));
        let list = KeyList::from_sequences("Pair", ["a", "b"]);
        let case = ExhaustiveCase::new("", list, Polarity::ExpectAcceptance);

        let ctx = context(target.clone());
        let result = case.execute(&ctx).await.unwrap();
        assert!(result.success, "{}", result.summary);
        assert_eq!(result.tested, 2);
        assert!(result.anomalies.is_empty());
        assert_eq!(result.orphans, vec![ctx.unicode_key(&ObjectKey::from("a"))]);
        assert_eq!(target.object_count(), 1);
    }
}
