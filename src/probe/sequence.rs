//! Bisection over the index of an ordered key list

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use super::{crvd_probe, BoundarySearch, Case, CaseResult, Polarity, ProbeContext, Strategy};
use crate::error::Result;
use crate::keys::{KeyList, KeyResult};

/// Finds how many leading keys of a list the backend accepts
///
/// Probing `n` tests the key at index `n - 1`, so the boundary is the number
/// of accepted keys and the case succeeds when it equals the list's count.
/// Only the keys the search visits are tested; a rejected key between two
/// probes goes unnoticed.
pub struct SequenceCase {
    name: String,
    list: Arc<KeyList>,
}

impl SequenceCase {
    pub fn new(prefix: &str, list: KeyList) -> Self {
        Self {
            name: format!("{}{}", prefix, list.name()),
            list: Arc::new(list),
        }
    }

    pub fn list(&self) -> &KeyList {
        &self.list
    }
}

#[async_trait]
impl Case for SequenceCase {
    fn name(&self) -> &str {
        &self.name
    }

    fn strategy(&self) -> Strategy {
        Strategy::BisectSequence
    }

    fn domain(&self) -> String {
        format!("{} keys, bisected", self.list.count())
    }

    async fn execute(&self, ctx: &ProbeContext) -> Result<CaseResult> {
        let mut result = CaseResult::new(&self.name, self.strategy());
        let count = self.list.count();
        let mut search = BoundarySearch::new(0, count);
        let mut boundary_rejected: Option<KeyResult> = None;

        while let Some(n) = search.next_probe() {
            if ctx.is_cancelled() {
                result.abandoned = true;
                break;
            }

            let index = n - 1;
            let Some(key) = self.list.key(index) else {
                break;
            };
            let probe = crvd_probe(ctx, ctx.unicode_key(&key), ctx.key_content, Polarity::ExpectAcceptance).await?;
            result.tested += 1;
            result.orphans.extend(probe.orphan);

            let key_result = KeyResult::new(self.list.clone(), index, key, probe.error);
            debug!("{}", key_result.pretty());
            search.record(n, key_result.success());
            if !key_result.success() {
                boundary_rejected = Some(key_result);
            }
        }

        let boundary = search.finish();
        result.boundary = Some(boundary);
        result.success = !result.abandoned && boundary.reached_ceiling();
        result.summary = if result.abandoned {
            format!("abandoned after {} probes", result.tested)
        } else if boundary.reached_ceiling() {
            format!("all {} keys accepted ({} probed)", count, result.tested)
        } else {
            format!("{} of {} keys accepted", boundary.known_good, count)
        };

        // The last rejection recorded is the one at the boundary
        if let Some(rejected) = boundary_rejected {
            if !result.abandoned {
                info!("{}: first rejected key {}", self.name, rejected.pretty());
            }
            result.anomalies.push(rejected);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::ObjectKey;
    use crate::retry::RetryPolicy;
    use crate::target::{MemoryTarget, TargetError};
    use std::sync::atomic::{AtomicU64, Ordering};
    use tokio_util::sync::CancellationToken;

    fn letters() -> KeyList {
        KeyList::from_sequences("Letters", ('a'..='z').map(String::from))
    }

    fn context(target: Arc<MemoryTarget>) -> ProbeContext {
        ProbeContext::new(target)
            .with_retry_policy(RetryPolicy::none())
            .with_run_id("seq")
    }

    #[tokio::test]
    async fn test_all_accepted() {
        let target = Arc::new(MemoryTarget::new("t"));
        let case = SequenceCase::new("Test: ", letters());
        assert_eq!(case.name(), "Test: Letters");

        let result = case.execute(&context(target.clone())).await.unwrap();
        assert!(result.success, "{}", result.summary);
        assert!(result.anomalies.is_empty());
        assert!(result.tested <= 6);
        assert_eq!(result.boundary.map(|b| b.known_good), Some(26));
        assert_eq!(target.object_count(), 0);
    }

    #[tokio::test]
    async fn test_boundary_at_first_rejected_key() {
        // Keys from 'k' onwards are rejected
        let target = Arc::new(MemoryTarget::new("t").with_key_filter(|key: &ObjectKey| {
            let last = *key.as_bytes().last()?;
            (last >= b'k').then(|| TargetError::InvalidKey {
                key: key.to_string(),
                reason: "unsupported".to_string(),
            })
        }));
        let case = SequenceCase::new("Test: ", letters());

        let result = case.execute(&context(target)).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.boundary.map(|b| b.known_good), Some(10));
        assert_eq!(result.summary, "10 of 26 keys accepted");
        assert_eq!(result.anomalies.len(), 1);
        assert_eq!(result.anomalies[0].key, ObjectKey::from("k"));
        assert_eq!(result.anomalies[0].index, 10);
    }

    #[tokio::test]
    async fn test_cancellation_abandons_between_probes() {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let puts = AtomicU64::new(0);
        let target = Arc::new(MemoryTarget::new("t").with_key_filter(move |_: &ObjectKey| {
            if puts.fetch_add(1, Ordering::SeqCst) + 1 >= 2 {
                token.cancel();
            }
            None
        }));
        let ctx = context(target.clone()).with_cancellation(cancel);
        let case = SequenceCase::new("Test: ", letters());

        let result = case.execute(&ctx).await.unwrap();
        assert!(result.abandoned);
        assert!(!result.success);
        assert_eq!(result.tested, 2);
        assert_eq!(result.summary, "abandoned after 2 probes");
        assert!(result.anomalies.is_empty());
        assert!(result.orphans.is_empty());
        assert_eq!(target.object_count(), 0);
    }
}
