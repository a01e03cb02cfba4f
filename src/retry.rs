//! Retry with backoff for storage operations
//!
//! Only transient [`TargetError`](crate::target::TargetError)s are retried. Anything else is returned on
//! the first attempt so a genuine limit is never mistaken for a flaky network.
//!
//! ```no_run
//! # use cloudprobe::retry::{RetryPolicy, BackoffStrategy};
//! use std::time::Duration;
//!
//! let policy = RetryPolicy {
//!     max_attempts: 5,
//!     initial_delay: Duration::from_millis(100),
//!     backoff: BackoffStrategy::Exponential,
//!     jitter_factor: 0.2,
//!     ..Default::default()
//! };
//! ```

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::{ProbeError, Result};
use crate::target::TargetResult;

/// How many times a transient failure is retried, and how long to wait
///
/// Delays grow from `initial_delay` according to `backoff`, are capped at
/// `max_delay`, and are then stretched by up to `jitter_factor` so that the
/// workers of a count probe do not hammer a throttled bucket in lockstep.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts per operation, the first one included
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff: BackoffStrategy,
    /// Fraction of the delay added at random, 0.0 to 1.0
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(30),
            backoff: BackoffStrategy::Exponential,
            jitter_factor: 0.3,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Wait before retrying after the `failures`-th consecutive failure
    pub fn delay_after(&self, failures: u32) -> Duration {
        let steps = failures.saturating_sub(1).min(31);
        let base = match self.backoff {
            BackoffStrategy::Fixed => self.initial_delay,
            BackoffStrategy::Exponential => self.initial_delay.saturating_mul(1 << steps),
        }
        .min(self.max_delay);

        let jitter = self.jitter_factor.clamp(0.0, 1.0);
        if jitter == 0.0 {
            return base;
        }
        base.mul_f64(1.0 + rand::rng().random_range(0.0..jitter))
    }
}

/// Shape of the delay sequence between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Same delay every time
    Fixed,
    /// Doubling delay
    #[default]
    Exponential,
}

/// Run a target operation, retrying transient failures under `policy`
///
/// A non-transient failure surfaces as [`ProbeError::Target`] on the first
/// attempt; a transient one that outlasts the policy surfaces as
/// [`ProbeError::RetriesExhausted`].
pub async fn with_retry<F, Fut, T>(policy: &RetryPolicy, operation: &str, mut attempt_once: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = TargetResult<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut failures = 0;

    loop {
        let err = match attempt_once().await {
            Ok(value) => {
                if failures > 0 {
                    debug!(operation, retries = failures, "recovered after transient failures");
                }
                return Ok(value);
            }
            Err(e) => e,
        };
        if !err.is_transient() {
            return Err(ProbeError::Target(err));
        }

        failures += 1;
        if failures >= max_attempts {
            return Err(ProbeError::RetriesExhausted {
                attempts: failures,
                last: err,
            });
        }

        let delay = policy.delay_after(failures);
        warn!(
            operation,
            attempt = failures,
            max_attempts,
            "transient failure, retrying in {:?}: {}",
            delay,
            err
        );
        sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::TargetError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
            backoff: BackoffStrategy::Fixed,
            jitter_factor: 0.0,
        }
    }

    #[test]
    fn test_exponential_delays_double_then_cap() {
        let policy = RetryPolicy {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            jitter_factor: 0.0,
            ..Default::default()
        };

        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
        assert_eq!(policy.delay_after(3), Duration::from_millis(400));
        assert_eq!(policy.delay_after(20), Duration::from_secs(10));
        assert_eq!(policy.delay_after(u32::MAX), Duration::from_secs(10));
    }

    #[test]
    fn test_fixed_delay() {
        let policy = fast_policy(3);
        assert_eq!(policy.delay_after(1), policy.delay_after(7));
    }

    #[test]
    fn test_jitter_stays_in_bounds() {
        let policy = RetryPolicy::default();
        for failures in 1..6 {
            let delay = policy.delay_after(failures);
            let base = (policy.initial_delay * 2_u32.pow(failures - 1)).min(policy.max_delay);
            assert!(delay >= base);
            assert!(delay <= base.mul_f64(1.0 + policy.jitter_factor) + Duration::from_millis(1));
        }
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_transient_failures() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let result = with_retry(&fast_policy(3), "put", || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(TargetError::Network("connection reset".to_string()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_transient_error_not_retried() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let result: Result<()> = with_retry(&fast_policy(5), "put", || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(TargetError::QuotaExceeded("bucket full".to_string()))
            }
        })
        .await;

        assert!(matches!(result, Err(ProbeError::Target(TargetError::QuotaExceeded(_)))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhausted_retries_report_attempts() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let result: Result<()> = with_retry(&fast_policy(3), "get", || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(TargetError::RateLimited("SlowDown".to_string()))
            }
        })
        .await;

        match result {
            Err(ProbeError::RetriesExhausted { attempts: n, .. }) => assert_eq!(n, 3),
            other => panic!("expected RetriesExhausted, got {:?}", other),
        }
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_waits_between_attempts() {
        let policy = RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff: BackoffStrategy::Exponential,
            jitter_factor: 0.0,
        };
        let start = tokio::time::Instant::now();

        let result: Result<()> = with_retry(&policy, "head", || async {
            Err(TargetError::Timeout {
                operation: "head".to_string(),
                message: "no response".to_string(),
            })
        })
        .await;

        assert!(result.is_err());
        // 1s after the first failure, 2s after the second
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(3));
        assert!(elapsed < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_none_policy_single_attempt() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();

        let _: Result<()> = with_retry(&RetryPolicy::none(), "delete", || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(TargetError::Network("down".to_string()))
            }
        })
        .await;

        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
