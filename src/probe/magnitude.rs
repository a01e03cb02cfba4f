/*!
 * Bisection over object size and object count
 *
 * A size probe at `v` is one create-retrieve-verify-delete of a `v`-byte
 * object.
 *
 * A count probe at `v` creates `v` objects under a fresh prefix (in parallel,
 * bounded by the worker count), then checks that every one of them can still
 * be found, then deletes all of them before the next probe. The probe fails if
 * any create-retrieve-verify fails *or* any created object cannot be found
 * afterwards: a backend that silently drops writes past a cap never reports a
 * write error, so a successful write alone is not taken as proof.
 */

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::{crvd_probe, Boundary, BoundarySearch, Case, CaseResult, Polarity, ProbeContext, Strategy};
use crate::content::ContentSpec;
use crate::crvd::CrvdState;
use crate::error::{ProbeError, Result};
use crate::keys::ObjectKey;
use crate::retry::with_retry;
use crate::units::format_bytes;

/// Default upper bound for size probes
pub const SIZE_MAX_DEFAULT: u64 = 16 * 1024 * 1024 * 1024;

/// Default upper bound for count probes
pub const COUNT_MAX_DEFAULT: u64 = 16 * 1024;

/// Outcome of probing one magnitude
struct MagnitudeProbe {
    accepted: bool,
    failure: Option<String>,
    orphans: Vec<ObjectKey>,
    interrupted: bool,
}

/// Drive a bisection, stopping at cancellation
///
/// `describe` renders a magnitude for the summary line.
async fn bisect<'a, P, Fut>(
    name: &str,
    ctx: &'a ProbeContext,
    mut search: BoundarySearch,
    describe: fn(u64) -> String,
    mut probe: P,
) -> Result<CaseResult>
where
    P: FnMut(&'a ProbeContext, u64) -> Fut,
    Fut: std::future::Future<Output = Result<MagnitudeProbe>>,
{
    let mut result = CaseResult::new(name, Strategy::BisectMagnitude);
    let mut last_failure: Option<(u64, String)> = None;

    while let Some(v) = search.next_probe() {
        if ctx.is_cancelled() {
            result.abandoned = true;
            break;
        }

        let outcome = probe(ctx, v).await?;
        result.tested += 1;
        result.orphans.extend(outcome.orphans);
        if outcome.interrupted {
            result.abandoned = true;
            break;
        }

        debug!("{} at {}: {}", name, describe(v), if outcome.accepted { "ok" } else { "failed" });
        search.record(v, outcome.accepted);
        if let Some(failure) = outcome.failure {
            last_failure = Some((v, failure));
        }
    }

    let boundary = search.finish();
    result.boundary = Some(boundary);
    result.success = !result.abandoned && (boundary.known_good > boundary.floor || boundary.ceiling == boundary.floor);
    result.summary = summarize(&boundary, result.abandoned, describe, last_failure);
    Ok(result)
}

fn summarize(
    boundary: &Boundary,
    abandoned: bool,
    describe: fn(u64) -> String,
    last_failure: Option<(u64, String)>,
) -> String {
    if abandoned {
        return format!(
            "abandoned after {} probes; {} succeeded",
            boundary.probes,
            describe(boundary.known_good)
        );
    }
    match (boundary.known_bad, last_failure) {
        (Some(bad), Some((at, failure))) if at == bad => format!(
            "maximum {}; {} failed: {}",
            describe(boundary.known_good),
            describe(bad),
            failure
        ),
        (Some(bad), _) => format!("maximum {}; {} failed", describe(boundary.known_good), describe(bad)),
        (None, _) => format!("{} succeeded (no limit found)", describe(boundary.known_good)),
    }
}

/// Finds the largest object the backend stores intact
pub struct SizeCase {
    name: String,
    ceiling: u64,
}

impl SizeCase {
    pub fn new(name: impl Into<String>, ceiling: u64) -> Self {
        Self {
            name: name.into(),
            ceiling,
        }
    }

    fn key(ctx: &ProbeContext, size: u64) -> ObjectKey {
        ObjectKey::from(format!("cloudprobe-{}-size-{}.bin", ctx.run_id, size))
    }

    async fn probe(ctx: &ProbeContext, size: u64) -> Result<MagnitudeProbe> {
        let content = ContentSpec::new(size, ctx.seed)?;
        let outcome = crvd_probe(ctx, Self::key(ctx, size), content, Polarity::ExpectAcceptance).await?;
        Ok(MagnitudeProbe {
            accepted: outcome.error.is_none(),
            failure: outcome.error.map(|e| e.one_line()),
            orphans: outcome.orphan.into_iter().collect(),
            interrupted: false,
        })
    }
}

#[async_trait]
impl Case for SizeCase {
    fn name(&self) -> &str {
        &self.name
    }

    fn strategy(&self) -> Strategy {
        Strategy::BisectMagnitude
    }

    fn domain(&self) -> String {
        format!("sizes 0B to {}", format_bytes(self.ceiling))
    }

    fn validate(&self, ctx: &ProbeContext) -> Result<()> {
        ContentSpec::new(self.ceiling, ctx.seed).map(drop)
    }

    async fn execute(&self, ctx: &ProbeContext) -> Result<CaseResult> {
        let search = BoundarySearch::new(0, self.ceiling);
        let result = bisect(&self.name, ctx, search, describe_size, Self::probe).await?;
        info!("{}: {}", self.name, result.summary);
        Ok(result)
    }
}

fn describe_size(size: u64) -> String {
    format_bytes(size)
}

fn describe_count(count: u64) -> String {
    if count == 1 {
        "1 object".to_string()
    } else {
        format!("{} objects", count)
    }
}

/// Finds how many objects the backend holds under one prefix
pub struct CountCase {
    name: String,
    ceiling: u64,
}

impl CountCase {
    pub fn new(name: impl Into<String>, ceiling: u64) -> Self {
        Self {
            name: name.into(),
            ceiling,
        }
    }

    /// `u64::MAX` means no upper bound
    pub fn is_unbounded(&self) -> bool {
        self.ceiling == u64::MAX
    }

    fn key(ctx: &ProbeContext, count: u64, index: u64) -> ObjectKey {
        ObjectKey::from(format!("cloudprobe-{}-count-{}/{:08}.bin", ctx.run_id, count, index))
    }

    async fn probe(ctx: &ProbeContext, count: u64) -> Result<MagnitudeProbe> {
        let content = ContentSpec::new(ctx.count_object_length, ctx.seed)?;

        let created = create_objects(ctx, count, content).await;
        let (created, mut failure, interrupted) = match created {
            Ok(outcome) => (outcome.created, outcome.failure, outcome.interrupted),
            Err((keys, err)) => {
                let orphans = delete_objects(ctx, keys).await;
                report_orphans(&orphans);
                return Err(err);
            }
        };

        // Writes all succeeded; check nothing was silently dropped
        let mut aborted = None;
        if failure.is_none() && !interrupted {
            match find_missing(ctx, &created).await {
                Ok(None) => {}
                Ok(Some(missing)) => {
                    failure = Some(format!(
                        "{} of {} created objects cannot be found (first: {})",
                        missing.count, count, missing.first
                    ))
                }
                Err(e) if e.is_permanent() => aborted = Some(e),
                Err(e) => failure = Some(e.one_line()),
            }
        }

        let orphans = delete_objects(ctx, created).await;
        report_orphans(&orphans);
        if let Some(err) = aborted {
            return Err(err);
        }

        Ok(MagnitudeProbe {
            accepted: failure.is_none(),
            failure,
            orphans,
            interrupted,
        })
    }
}

#[async_trait]
impl Case for CountCase {
    fn name(&self) -> &str {
        &self.name
    }

    fn strategy(&self) -> Strategy {
        Strategy::BisectMagnitude
    }

    fn domain(&self) -> String {
        if self.is_unbounded() {
            "counts from 1 object, no upper bound".to_string()
        } else {
            format!("counts 0 to {}", describe_count(self.ceiling))
        }
    }

    fn validate(&self, ctx: &ProbeContext) -> Result<()> {
        ContentSpec::new(ctx.count_object_length, ctx.seed).map(drop)
    }

    async fn execute(&self, ctx: &ProbeContext) -> Result<CaseResult> {
        let search = if self.is_unbounded() {
            BoundarySearch::galloping(0, self.ceiling, 1)
        } else {
            BoundarySearch::new(0, self.ceiling)
        };
        let result = bisect(&self.name, ctx, search, describe_count, Self::probe).await?;
        info!("{}: {}", self.name, result.summary);
        Ok(result)
    }
}

struct Created {
    created: Vec<ObjectKey>,
    failure: Option<String>,
    interrupted: bool,
}

/// Create-retrieve-verify `count` objects, keeping them
///
/// Stops spawning at the first failure or on cancellation. On a permanent
/// error the keys created so far are returned alongside it so the caller
/// can still clean up.
async fn create_objects(
    ctx: &ProbeContext,
    count: u64,
    content: ContentSpec,
) -> std::result::Result<Created, (Vec<ObjectKey>, ProbeError)> {
    let semaphore = Arc::new(Semaphore::new(ctx.workers.max(1)));
    let stop = Arc::new(AtomicBool::new(false));
    let mut join_set = JoinSet::new();

    for index in 0..count {
        if stop.load(Ordering::SeqCst) || ctx.is_cancelled() {
            break;
        }
        let Ok(permit) = semaphore.clone().acquire_owned().await else {
            break;
        };

        let mut crvd = ctx.crvd(CountCase::key(ctx, count, index), content);
        let stop = stop.clone();
        join_set.spawn(async move {
            let outcome = crvd.create_retrieve_verify().await;
            if outcome.is_err() {
                stop.store(true, Ordering::SeqCst);
            }
            let left_behind = crvd.state() == CrvdState::Kept || crvd.may_have_orphaned();
            drop(permit);
            (crvd.key().clone(), left_behind, outcome)
        });
    }

    let mut created = Vec::new();
    let mut failure = None;
    let mut permanent = None;
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((key, left_behind, outcome)) => {
                if left_behind {
                    created.push(key);
                }
                match outcome {
                    Ok(()) => {}
                    Err(e) if e.is_permanent() => permanent = Some(e),
                    Err(e) => {
                        if failure.is_none() {
                            failure = Some(e.one_line());
                        }
                    }
                }
            }
            Err(e) => permanent = Some(ProbeError::Worker(e.to_string())),
        }
    }

    if let Some(err) = permanent {
        return Err((created, err));
    }
    let interrupted = failure.is_none() && (created.len() as u64) < count;
    Ok(Created {
        created,
        failure,
        interrupted,
    })
}

struct Missing {
    count: u64,
    first: ObjectKey,
}

/// Head every key; `Some` if any is gone
async fn find_missing(ctx: &ProbeContext, keys: &[ObjectKey]) -> Result<Option<Missing>> {
    let target = ctx.target.clone();
    let retry = ctx.retry.clone();
    let outcomes: Vec<(usize, Result<bool>)> = stream::iter(keys.iter().cloned().enumerate())
        .map(move |(index, key)| {
            let target = target.clone();
            let retry = retry.clone();
            async move { (index, with_retry(&retry, "head", || target.head(&key)).await) }
        })
        .buffer_unordered(ctx.workers.max(1))
        .collect()
        .await;

    let mut missing: Vec<usize> = Vec::new();
    for (index, outcome) in outcomes {
        if !outcome? {
            missing.push(index);
        }
    }
    Ok(missing.iter().min().map(|&first| Missing {
        count: missing.len() as u64,
        first: keys[first].clone(),
    }))
}

/// Delete every key, returning those that could not be deleted
///
/// Runs on every exit path of a count probe, including after errors and
/// cancellation. Keys that are already gone count as deleted.
async fn delete_objects(ctx: &ProbeContext, keys: Vec<ObjectKey>) -> Vec<ObjectKey> {
    let semaphore = Arc::new(Semaphore::new(ctx.workers.max(1)));
    let mut join_set = JoinSet::new();
    let mut orphans = Vec::new();

    for key in keys {
        let Ok(permit) = semaphore.clone().acquire_owned().await else {
            orphans.push(key);
            continue;
        };
        let target = ctx.target.clone();
        let retry = ctx.retry.clone();
        join_set.spawn(async move {
            let outcome = with_retry(&retry, "delete", || target.delete(&key)).await;
            drop(permit);
            match outcome {
                Ok(()) => None,
                Err(e) if e.is_not_found() => None,
                Err(e) => {
                    warn!("Could not delete {}: {}", key, e.one_line());
                    Some(key)
                }
            }
        });
    }

    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok(Some(key)) => orphans.push(key),
            Ok(None) => {}
            Err(e) => warn!("Delete task failed: {}", e),
        }
    }
    orphans
}

fn report_orphans(orphans: &[ObjectKey]) {
    if !orphans.is_empty() {
        warn!("{} objects were left in the bucket", orphans.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryPolicy;
    use crate::target::{MemoryTarget, Operation, TargetError};
    use std::sync::atomic::AtomicU64;
    use tokio_util::sync::CancellationToken;

    /// Key filter that accepts everything and cancels once `puts` writes arrived
    fn cancel_after_puts(cancel: CancellationToken, puts: u64) -> impl Fn(&ObjectKey) -> Option<TargetError> + Send + Sync {
        let seen = AtomicU64::new(0);
        move |_: &ObjectKey| {
            if seen.fetch_add(1, Ordering::SeqCst) + 1 >= puts {
                cancel.cancel();
            }
            None
        }
    }

    fn context(target: Arc<MemoryTarget>) -> ProbeContext {
        ProbeContext::new(target)
            .with_retry_policy(RetryPolicy::none())
            .with_run_id("mag")
            .with_workers(4)
    }

    #[tokio::test]
    async fn test_size_limit() {
        let target = Arc::new(MemoryTarget::new("t").with_max_object_size(3000));
        let case = SizeCase::new("Maximum size", 8192);

        let result = case.execute(&context(target.clone())).await.unwrap();
        assert!(result.success, "{}", result.summary);
        let boundary = result.boundary.unwrap();
        assert_eq!(boundary.known_good, 3000);
        assert_eq!(boundary.known_bad, Some(3001));
        assert!(result.summary.starts_with("maximum 2.9K; 2.9K failed: "), "{}", result.summary);
        assert_eq!(target.object_count(), 0);
    }

    #[tokio::test]
    async fn test_size_without_limit() {
        let target = Arc::new(MemoryTarget::new("t"));
        let result = SizeCase::new("Maximum size", 1024).execute(&context(target)).await.unwrap();
        assert!(result.success);
        assert_eq!(result.summary, "1K succeeded (no limit found)");
    }

    #[tokio::test]
    async fn test_count_limit() {
        let target = Arc::new(MemoryTarget::new("t").with_max_objects(37));
        let case = CountCase::new("Maximum count", 100);

        let result = case.execute(&context(target.clone())).await.unwrap();
        assert!(result.success, "{}", result.summary);
        assert_eq!(result.boundary.unwrap().known_good, 37);
        assert!(result.orphans.is_empty());
        assert_eq!(target.object_count(), 0);
    }

    #[tokio::test]
    async fn test_silently_capped_count_fails_the_probe() {
        let target = Arc::new(MemoryTarget::new("t").with_silent_object_cap(20));
        let case = CountCase::new("Maximum count", 64);

        let result = case.execute(&context(target.clone())).await.unwrap();
        assert_eq!(result.boundary.unwrap().known_good, 20);
        assert_eq!(target.object_count(), 0);
    }

    #[tokio::test]
    async fn test_unbounded_count_gallops() {
        let target = Arc::new(MemoryTarget::new("t").with_max_objects(5));
        let case = CountCase::new("Maximum count", u64::MAX);
        assert!(case.domain().contains("no upper bound"));

        let result = case.execute(&context(target.clone())).await.unwrap();
        let boundary = result.boundary.unwrap();
        assert_eq!(boundary.known_good, 5);
        assert_eq!(boundary.known_bad, Some(6));
        assert_eq!(target.object_count(), 0);
    }

    #[tokio::test]
    async fn test_undeletable_objects_are_orphans() {
        let target = Arc::new(MemoryTarget::new("t"));
        target.fail_next(Operation::Delete, TargetError::Network("reset".to_string()));
        let case = CountCase::new("Maximum count", 1);

        let result = case.execute(&context(target.clone())).await.unwrap();
        assert!(result.success);
        assert_eq!(result.orphans.len(), 1);
        assert_eq!(target.object_count(), 1);
    }

    #[tokio::test]
    async fn test_permanent_error_aborts_after_cleanup() {
        let target = Arc::new(MemoryTarget::new("t"));
        target.fail_next(Operation::Head, TargetError::Authentication("expired".to_string()));
        let case = CountCase::new("Maximum count", 4);

        let err = case.execute(&context(target.clone())).await.unwrap_err();
        assert!(err.is_permanent());
        assert_eq!(target.object_count(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_count_cleans_up() {
        let cancel = CancellationToken::new();
        let target = Arc::new(MemoryTarget::new("t").with_key_filter(cancel_after_puts(cancel.clone(), 10)));
        target.fail_next(Operation::Delete, TargetError::Network("reset".to_string()));
        let ctx = context(target.clone()).with_cancellation(cancel);
        let case = CountCase::new("Maximum count", 100);

        let result = case.execute(&ctx).await.unwrap();
        assert!(result.abandoned);
        assert!(!result.success);
        assert_eq!(result.tested, 1);
        assert!(result.summary.starts_with("abandoned after"), "{}", result.summary);
        // Everything created was deleted, except the one reported
        assert_eq!(result.orphans.len(), 1);
        assert_eq!(target.keys(), result.orphans);
        assert!(target.counts().puts < 50);
    }

    #[tokio::test]
    async fn test_cancelled_size_stops_between_probes() {
        let cancel = CancellationToken::new();
        let target = Arc::new(MemoryTarget::new("t").with_key_filter(cancel_after_puts(cancel.clone(), 2)));
        let ctx = context(target.clone()).with_cancellation(cancel);

        let result = SizeCase::new("Maximum size", 1 << 20).execute(&ctx).await.unwrap();
        assert!(result.abandoned);
        assert_eq!(result.tested, 2);
        assert!(result.orphans.is_empty());
        assert_eq!(target.object_count(), 0);
    }
}
