//! Error types for storage targets
//!
//! Every adapter maps its native failures onto [`TargetError`] so the probing
//! engine can tell three things apart: a missing object, a failure worth
//! retrying, and a failure that means the environment itself is unusable.

use std::io;
use thiserror::Error;

/// Result type alias for target operations
pub type TargetResult<T> = std::result::Result<T, TargetError>;

/// Unified error type for target operations
#[derive(Error, Debug, Clone)]
pub enum TargetError {
    /// Object not found
    #[error("Object not found: {key}")]
    NotFound { key: String },

    /// Key cannot be expressed for this backend (client-side rejection)
    #[error("Invalid object key {key}: {reason}")]
    InvalidKey { key: String, reason: String },

    /// The backend refused this particular request
    #[error("Request rejected ({code}): {message}")]
    Rejected { code: String, message: String },

    /// Operation timed out
    #[error("Operation '{operation}' timed out: {message}")]
    Timeout { operation: String, message: String },

    /// Throttled by the backend
    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    /// Network error during remote operation
    #[error("Network error: {0}")]
    Network(String),

    /// Credentials missing or refused
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Credentials accepted but access refused
    #[error("Access denied: {0}")]
    PermissionDenied(String),

    /// Invalid configuration for backend
    #[error("Invalid configuration for {backend}: {message}")]
    InvalidConfig { backend: String, message: String },

    /// Backend operation not supported
    #[error("Operation '{operation}' not supported by backend {backend}")]
    Unsupported { backend: String, operation: String },

    /// Storage quota or object count limit reached
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    /// I/O error while moving object content
    #[error("I/O error ({kind:?}): {message}")]
    Io { kind: io::ErrorKind, message: String },

    /// Generic backend error with context
    #[error("Backend error on {backend}: {message}")]
    Other { backend: String, message: String },
}

impl TargetError {
    /// Check if this error is transient (worth retrying with backoff)
    pub fn is_transient(&self) -> bool {
        match self {
            TargetError::Timeout { .. } => true,
            TargetError::RateLimited(_) => true,
            TargetError::Network(_) => true,
            TargetError::Io { kind, .. } => matches!(
                kind,
                io::ErrorKind::TimedOut
                    | io::ErrorKind::Interrupted
                    | io::ErrorKind::WouldBlock
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }

    /// Check if this error means the environment is unusable
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            TargetError::Authentication(_)
                | TargetError::PermissionDenied(_)
                | TargetError::InvalidConfig { .. }
        )
    }

    /// Check if this error indicates the object was not found
    pub fn is_not_found(&self) -> bool {
        matches!(self, TargetError::NotFound { .. })
    }

    /// Map an I/O error raised while handling `key`
    pub fn from_io(err: io::Error, key: impl Into<String>) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => TargetError::NotFound { key: key.into() },
            io::ErrorKind::PermissionDenied => TargetError::PermissionDenied(err.to_string()),
            io::ErrorKind::InvalidInput => TargetError::InvalidKey {
                key: key.into(),
                reason: err.to_string(),
            },
            kind => TargetError::Io {
                kind,
                message: err.to_string(),
            },
        }
    }
}

impl From<io::Error> for TargetError {
    fn from(err: io::Error) -> Self {
        TargetError::Io {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}
