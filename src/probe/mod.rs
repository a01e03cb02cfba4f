/*!
 * Probe cases
 *
 * A [`Case`] is one probe definition: a fixed domain plus a strategy for
 * exploring it. Three strategies exist:
 *
 * - [`ExhaustiveCase`]: every key of a [`KeyList`](crate::keys::KeyList) gets
 *   its own create-retrieve-verify-delete run, judged against the case's
 *   [`Polarity`].
 * - [`SequenceCase`]: bisection over a key list's index to find how many
 *   leading keys are accepted.
 * - [`SizeCase`] and [`CountCase`]: bisection over a numeric magnitude.
 *
 * Cases are stateless between runs. A case returns `Err` only for errors that
 * should abort the whole suite; everything else is captured in the
 * [`CaseResult`].
 */

pub mod bisect;
pub mod exhaustive;
pub mod families;
pub mod magnitude;
pub mod sequence;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::content::{ContentSpec, DEFAULT_RANDOM_SEED};
use crate::crvd::Crvd;
use crate::error::{ProbeError, Result};
use crate::keys::{KeyResult, ObjectKey};
use crate::retry::RetryPolicy;
use crate::target::Target;

pub use bisect::{Boundary, BoundarySearch};
pub use exhaustive::ExhaustiveCase;
pub use families::UnicodeSelection;
pub use magnitude::{CountCase, SizeCase};
pub use sequence::SequenceCase;

/// Default number of concurrent creates during a count probe
pub const DEFAULT_WORKERS: usize = 16;

/// Default body length of each object created by a count probe
pub const DEFAULT_COUNT_OBJECT_LENGTH: u64 = 1;

/// How a case explores its domain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Exhaustive,
    BisectSequence,
    BisectMagnitude,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Strategy::Exhaustive => "exhaustive",
            Strategy::BisectSequence => "bisect-sequence",
            Strategy::BisectMagnitude => "bisect-magnitude",
        })
    }
}

/// The outcome a case expects from the backend for each probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    ExpectAcceptance,
    ExpectRejection,
}

impl Polarity {
    /// Whether a probe outcome is the expected one
    pub fn is_expected(&self, accepted: bool) -> bool {
        match self {
            Polarity::ExpectAcceptance => accepted,
            Polarity::ExpectRejection => !accepted,
        }
    }
}

/// Everything a case needs to run against a target
#[derive(Clone)]
pub struct ProbeContext {
    pub target: Arc<dyn Target>,
    pub retry: RetryPolicy,
    /// Concurrent creates during a count probe
    pub workers: usize,
    /// Body length for objects created by count probes
    pub count_object_length: u64,
    /// Body for objects created by key probes
    pub key_content: ContentSpec,
    pub seed: i64,
    pub cancel: CancellationToken,
    /// Distinguishes the keys of one run from another's
    pub run_id: String,
}

impl ProbeContext {
    pub fn new(target: Arc<dyn Target>) -> Self {
        Self {
            target,
            retry: RetryPolicy::default(),
            workers: DEFAULT_WORKERS,
            count_object_length: DEFAULT_COUNT_OBJECT_LENGTH,
            key_content: ContentSpec::default(),
            seed: DEFAULT_RANDOM_SEED,
            cancel: CancellationToken::new(),
            run_id: Utc::now().format("%Y%m%dT%H%M%S").to_string(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_count_object_length(mut self, length: u64) -> Self {
        self.count_object_length = length;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// A lifecycle for `key` using this context's target and retry policy
    pub fn crvd(&self, key: ObjectKey, content: ContentSpec) -> Crvd {
        Crvd::new(self.target.clone(), Some(key), content).with_retry_policy(self.retry.clone())
    }

    /// Full object key for a candidate key under test
    ///
    /// The raw bytes are appended unchanged, so malformed sequences stay malformed.
    pub fn unicode_key(&self, key: &ObjectKey) -> ObjectKey {
        let mut bytes = format!("cloudprobe-{}-unicode-", self.run_id).into_bytes();
        bytes.extend_from_slice(key.as_bytes());
        ObjectKey::new(bytes)
    }
}

/// Outcome of executing one case
#[derive(Debug)]
pub struct CaseResult {
    pub name: String,
    pub strategy: Strategy,
    /// Whether the case found what it expected
    pub success: bool,
    /// One-line description of what was found
    pub summary: String,
    /// The boundary, for bisecting cases
    pub boundary: Option<Boundary>,
    /// Key outcomes that did not match the case's polarity
    pub anomalies: Vec<KeyResult>,
    /// Number of probes made
    pub tested: u64,
    /// Objects left in the bucket
    pub orphans: Vec<ObjectKey>,
    /// Cancelled before completing
    pub abandoned: bool,
    pub elapsed: Duration,
}

impl CaseResult {
    pub fn new(name: impl Into<String>, strategy: Strategy) -> Self {
        Self {
            name: name.into(),
            strategy,
            success: false,
            summary: String::new(),
            boundary: None,
            anomalies: Vec::new(),
            tested: 0,
            orphans: Vec::new(),
            abandoned: false,
            elapsed: Duration::ZERO,
        }
    }
}

/// Outcome of a single create-retrieve-verify-delete probe
pub(crate) struct KeyProbe {
    /// `None` if the backend accepted the object
    pub error: Option<ProbeError>,
    pub orphan: Option<ObjectKey>,
}

/// Run one full lifecycle for `key`
///
/// A verified object that cannot be deleted counts as accepted and is
/// reported as an orphan. Permanent errors abort unless the case expects
/// rejection: the connection check has already shown the credentials work, so
/// there a permanent error is the backend refusing the key.
pub(crate) async fn crvd_probe(
    ctx: &ProbeContext,
    key: ObjectKey,
    content: ContentSpec,
    polarity: Polarity,
) -> Result<KeyProbe> {
    let mut crvd = ctx.crvd(key, content);
    let outcome = crvd.create_retrieve_verify_delete().await;
    let orphan = crvd.may_have_orphaned().then(|| crvd.key().clone());
    if let Some(key) = &orphan {
        warn!("Object {} was left in the bucket", key);
    }

    match outcome {
        Ok(()) => Ok(KeyProbe { error: None, orphan }),
        // Verified; only cleanup failed, whatever the cause
        Err(ProbeError::DeleteFailed { .. }) => Ok(KeyProbe { error: None, orphan }),
        Err(e) if e.is_permanent() && polarity == Polarity::ExpectAcceptance => Err(e),
        Err(e) => Ok(KeyProbe {
            error: Some(e),
            orphan,
        }),
    }
}

/// One probe definition
#[async_trait]
pub trait Case: Send + Sync {
    /// Human-readable label, e.g. `Unicode scripts: Latin`
    fn name(&self) -> &str;

    fn strategy(&self) -> Strategy;

    fn polarity(&self) -> Polarity {
        Polarity::ExpectAcceptance
    }

    /// Description of the domain, for dry runs
    fn domain(&self) -> String;

    /// Check the case can run under `ctx` before any request is made
    fn validate(&self, _ctx: &ProbeContext) -> Result<()> {
        Ok(())
    }

    /// Run the case; `Err` means the suite must abort
    async fn execute(&self, ctx: &ProbeContext) -> Result<CaseResult>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::MemoryTarget;

    #[test]
    fn test_polarity() {
        assert!(Polarity::ExpectAcceptance.is_expected(true));
        assert!(!Polarity::ExpectAcceptance.is_expected(false));
        assert!(Polarity::ExpectRejection.is_expected(false));
        assert!(!Polarity::ExpectRejection.is_expected(true));
    }

    #[test]
    fn test_unicode_key_keeps_raw_bytes() {
        let ctx = ProbeContext::new(Arc::new(MemoryTarget::new("t"))).with_run_id("r1");
        let key = ctx.unicode_key(&ObjectKey::new(vec![0xC0, 0xAF]));
        assert_eq!(key.as_bytes(), b"cloudprobe-r1-unicode-\xC0\xAF");
        assert!(key.to_str().is_err());
    }

    #[test]
    fn test_workers_at_least_one() {
        let ctx = ProbeContext::new(Arc::new(MemoryTarget::new("t"))).with_workers(0);
        assert_eq!(ctx.workers, 1);
    }
}
