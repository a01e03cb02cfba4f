//! Storage targets
//!
//! A [`Target`] is the bucket under test: four keyed operations and nothing
//! else. Adapters live in the submodules and are selected from a bucket URL
//! by [`TargetConfig`].
//!
//! ```no_run
//! use cloudprobe::target::TargetConfig;
//!
//! # async fn demo() -> cloudprobe::Result<()> {
//! let target = TargetConfig::parse("mem://scratch?max-size=1M")?.connect().await?;
//! println!("probing {}", target.describe());
//! # Ok(())
//! # }
//! ```

pub mod error;

mod config;
mod local;
mod memory;

#[cfg(feature = "s3-native")]
mod s3;

pub use config::{S3Options, TargetConfig, MEMORY_SIZE_MAX_DEFAULT};
pub use error::{TargetError, TargetResult};
pub use local::LocalTarget;
pub use memory::{KeyFilter, MemoryTarget, Operation, OperationCounts};

#[cfg(feature = "s3-native")]
pub use s3::S3Target;

use std::pin::Pin;

use async_trait::async_trait;
use tokio::io::AsyncRead;

use crate::keys::ObjectKey;

/// Streamed object body
pub type ObjectReader = Pin<Box<dyn AsyncRead + Send>>;

/// Keyed object operations against one bucket
///
/// Implementors must be `Send + Sync`; a single target is shared by every
/// case and lifecycle in a run.
#[async_trait]
pub trait Target: Send + Sync {
    /// Store `length` bytes read from `content` under `key`
    ///
    /// # Errors
    ///
    /// Returns `TargetError::InvalidKey` if the key cannot be expressed for
    /// this backend, or `TargetError::Rejected`/`QuotaExceeded` if the backend
    /// refuses the object.
    async fn put(&self, key: &ObjectKey, content: ObjectReader, length: u64) -> TargetResult<()>;

    /// Open the object stored under `key`
    ///
    /// # Errors
    ///
    /// Returns `TargetError::NotFound` if no object exists under the key.
    async fn get(&self, key: &ObjectKey) -> TargetResult<ObjectReader>;

    /// Check whether an object exists under `key`
    async fn head(&self, key: &ObjectKey) -> TargetResult<bool>;

    /// Remove the object stored under `key`
    ///
    /// # Errors
    ///
    /// Returns `TargetError::NotFound` if no object exists under the key.
    async fn delete(&self, key: &ObjectKey) -> TargetResult<()>;

    /// Backend name for logging and error messages
    fn backend_name(&self) -> &str;

    /// Human-readable location, e.g. the bucket URL
    fn describe(&self) -> String;
}
