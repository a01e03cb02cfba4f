/*!
 * Create, retrieve, verify and delete a single object
 *
 * A [`Crvd`] drives one object through
 * `New -> Created -> Retrieved -> Verified -> {Kept | Deleted}`, with `Failed`
 * reachable from any step. The created content is never held in memory: the
 * expected digest is recomputed from the [`ContentSpec`] and the retrieved body
 * is hashed as it streams in.
 *
 * A failure after `create` succeeds leaves the object in the bucket. That is
 * reported through [`Crvd::may_have_orphaned`] and never cleaned up
 * automatically, since a cleanup attempt could mask the failure being probed.
 */

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use crate::content::{digest_reader, ContentSpec, Digest};
use crate::error::{ProbeError, Result};
use crate::keys::ObjectKey;
use crate::retry::{with_retry, RetryPolicy};
use crate::target::{Target, TargetError};

/// Above this length the expected digest is computed on the blocking pool
const INLINE_DIGEST_LIMIT: u64 = 1024 * 1024;

/// Lifecycle position of a [`Crvd`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrvdState {
    New,
    Created,
    Retrieved,
    Verified,
    Kept,
    Deleted,
    Failed,
}

impl fmt::Display for CrvdState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CrvdState::New => "new",
            CrvdState::Created => "created",
            CrvdState::Retrieved => "retrieved",
            CrvdState::Verified => "verified",
            CrvdState::Kept => "kept",
            CrvdState::Deleted => "deleted",
            CrvdState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// One object's create/retrieve/verify/delete run
pub struct Crvd {
    target: Arc<dyn Target>,
    key: ObjectKey,
    content: ContentSpec,
    retry: RetryPolicy,
    state: CrvdState,
    created: bool,
    verified: bool,
    expected: Option<Digest>,
    retrieved: Option<(Digest, u64)>,
}

impl Crvd {
    /// Create a lifecycle for `key`, or for a timestamp-derived key if `None`
    pub fn new(target: Arc<dyn Target>, key: Option<ObjectKey>, content: ContentSpec) -> Self {
        Self {
            target,
            key: key.unwrap_or_else(default_key),
            content,
            retry: RetryPolicy::default(),
            state: CrvdState::New,
            created: false,
            verified: false,
            expected: None,
            retrieved: None,
        }
    }

    /// Use `policy` for every target operation
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    pub fn key(&self) -> &ObjectKey {
        &self.key
    }

    pub fn content(&self) -> ContentSpec {
        self.content
    }

    pub fn state(&self) -> CrvdState {
        self.state
    }

    /// Whether retrieved content matched what was created
    ///
    /// Stays `true` if a later delete fails.
    pub fn verified(&self) -> bool {
        self.verified
    }

    /// Digest of the created content, once `create` has run
    pub fn expected_digest(&self) -> Option<Digest> {
        self.expected
    }

    /// Digest and length of the retrieved content, once `retrieve` has run
    pub fn retrieved_digest(&self) -> Option<(Digest, u64)> {
        self.retrieved
    }

    /// Whether an object may have been left in the bucket unintentionally
    pub fn may_have_orphaned(&self) -> bool {
        self.created && !matches!(self.state, CrvdState::Deleted | CrvdState::Kept)
    }

    /// Upload generated content under the key
    pub async fn create(&mut self) -> Result<()> {
        self.expect_state("create", CrvdState::New)?;

        let expected = match self.expected_digest_of_content().await {
            Ok(digest) => digest,
            Err(e) => return self.fail(e),
        };

        let content = self.content;
        let target = &self.target;
        let key = &self.key;
        let result = with_retry(&self.retry, "put", || {
            target.put(key, Box::pin(content.reader()), content.length())
        })
        .await;

        match result {
            Ok(()) => {
                debug!("Created {} ({} bytes)", self.key, content.length());
                self.expected = Some(expected);
                self.created = true;
                self.state = CrvdState::Created;
                Ok(())
            }
            Err(e) => self.fail(e),
        }
    }

    /// Download the object and hash it as it streams in
    pub async fn retrieve(&mut self) -> Result<()> {
        self.expect_state("retrieve", CrvdState::Created)?;

        let target = &self.target;
        let key = &self.key;
        let result = with_retry(&self.retry, "get", || async move {
            let reader = target.get(key).await?;
            digest_reader(reader).await.map_err(TargetError::from)
        })
        .await;

        match result {
            Ok(retrieved) => {
                debug!("Retrieved {} ({} bytes)", self.key, retrieved.1);
                self.retrieved = Some(retrieved);
                self.state = CrvdState::Retrieved;
                Ok(())
            }
            Err(e) => self.fail(e),
        }
    }

    /// Compare retrieved and created digests and lengths
    pub fn verify(&mut self) -> Result<()> {
        self.expect_state("verify", CrvdState::Retrieved)?;

        let (expected, (actual, actual_length)) = match (self.expected, self.retrieved) {
            (Some(expected), Some(retrieved)) => (expected, retrieved),
            _ => return self.lifecycle_error("verify"),
        };

        if expected != actual || actual_length != self.content.length() {
            return self.fail(ProbeError::ContentMismatch {
                key: self.key.to_string(),
                expected_digest: expected.to_string(),
                actual_digest: actual.to_string(),
                expected_length: self.content.length(),
                actual_length,
            });
        }

        self.verified = true;
        self.state = CrvdState::Verified;
        Ok(())
    }

    /// Delete the verified object
    ///
    /// A failure here is reported as [`ProbeError::DeleteFailed`]; the
    /// verification result stands.
    pub async fn delete(&mut self) -> Result<()> {
        self.expect_state("delete", CrvdState::Verified)?;

        let target = &self.target;
        let key = &self.key;
        let result = with_retry(&self.retry, "delete", || target.delete(key)).await;

        match result {
            Ok(()) => {
                debug!("Deleted {}", self.key);
                self.state = CrvdState::Deleted;
                Ok(())
            }
            Err(e) => {
                warn!("Verified object {} could not be deleted: {}", self.key, e);
                self.state = CrvdState::Failed;
                Err(ProbeError::DeleteFailed {
                    key: self.key.to_string(),
                    source: Box::new(e),
                })
            }
        }
    }

    /// Mark the verified object as intentionally left in place
    pub fn keep(&mut self) -> Result<()> {
        self.expect_state("keep", CrvdState::Verified)?;
        self.state = CrvdState::Kept;
        Ok(())
    }

    /// Create, retrieve and verify, leaving the object in the bucket
    pub async fn create_retrieve_verify(&mut self) -> Result<()> {
        self.create().await?;
        self.retrieve().await?;
        self.verify()?;
        self.keep()
    }

    /// Create, retrieve, verify and delete
    pub async fn create_retrieve_verify_delete(&mut self) -> Result<()> {
        self.create().await?;
        self.retrieve().await?;
        self.verify()?;
        self.delete().await
    }

    async fn expected_digest_of_content(&self) -> Result<Digest> {
        let content = self.content;
        if content.length() <= INLINE_DIGEST_LIMIT {
            return Ok(content.digest());
        }
        tokio::task::spawn_blocking(move || content.digest())
            .await
            .map_err(|e| ProbeError::Worker(e.to_string()))
    }

    fn expect_state(&self, operation: &'static str, expected: CrvdState) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            self.lifecycle_error(operation)
        }
    }

    fn lifecycle_error<T>(&self, operation: &'static str) -> Result<T> {
        Err(ProbeError::Lifecycle {
            operation,
            key: self.key.to_string(),
            state: self.state.to_string(),
        })
    }

    fn fail<T>(&mut self, err: ProbeError) -> Result<T> {
        self.state = CrvdState::Failed;
        if self.created {
            warn!("{} may be left in the bucket: {}", self.key, err.one_line());
        }
        Err(err)
    }
}

/// Timestamp-derived default key, e.g. `cloudprobe-crvd-20240101T120000.123456Z.bin`
pub fn default_key() -> ObjectKey {
    ObjectKey::from(format!(
        "cloudprobe-crvd-{}.bin",
        Utc::now().format("%Y%m%dT%H%M%S%.6fZ")
    ))
}
