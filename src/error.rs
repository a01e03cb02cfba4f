/*!
 * Error types for cloudprobe
 */

use thiserror::Error;

use crate::target::TargetError;

pub type Result<T> = std::result::Result<T, ProbeError>;

/// Exit code constants for structured process exit
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_PARTIAL: i32 = 1;
pub const EXIT_FATAL: i32 = 2;
pub const EXIT_INTEGRITY: i32 = 3;

#[derive(Debug, Error)]
pub enum ProbeError {
    /// Invalid size, seed, URL or flag combination; detected before any request
    #[error("Configuration error: {0}")]
    Config(String),

    /// A storage operation failed without being retried (or could not be)
    #[error("{0}")]
    Target(#[from] TargetError),

    /// A transient failure persisted through the whole retry budget
    #[error("Gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: TargetError },

    /// Retrieved content does not match what was created
    #[error(
        "Content mismatch for {key}: expected {expected_length} bytes with digest {expected_digest}, \
         got {actual_length} bytes with digest {actual_digest}"
    )]
    ContentMismatch {
        key: String,
        expected_digest: String,
        actual_digest: String,
        expected_length: u64,
        actual_length: u64,
    },

    /// Deleting a verified object failed; the verification itself stands
    #[error("Object {key} was verified but could not be deleted: {source}")]
    DeleteFailed {
        key: String,
        #[source]
        source: Box<ProbeError>,
    },

    /// A lifecycle step was invoked out of order
    #[error("Cannot {operation} {key} in state {state}")]
    Lifecycle {
        operation: &'static str,
        key: String,
        state: String,
    },

    /// The pre-flight create-retrieve-verify-delete cycle failed
    #[error("Connection check failed: {0}")]
    ConnectionCheck(Box<ProbeError>),

    /// A background worker panicked or was aborted
    #[error("Worker task failed: {0}")]
    Worker(String),

    /// Interrupted by the user or by the overall timeout
    #[error("Cancelled")]
    Cancelled,
}

impl ProbeError {
    /// Get the process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            ProbeError::Config(_) | ProbeError::ConnectionCheck(_) => EXIT_FATAL,
            ProbeError::Target(e) if e.is_permanent() => EXIT_FATAL,
            ProbeError::ContentMismatch { .. } => EXIT_INTEGRITY,
            _ => EXIT_PARTIAL,
        }
    }

    /// Permanent errors abort the whole suite rather than a single probe
    pub fn is_permanent(&self) -> bool {
        match self {
            ProbeError::Config(_) | ProbeError::ConnectionCheck(_) => true,
            ProbeError::Target(e) => e.is_permanent(),
            ProbeError::DeleteFailed { source, .. } => source.is_permanent(),
            _ => false,
        }
    }

    /// Check if this error means the object was missing
    pub fn is_not_found(&self) -> bool {
        match self {
            ProbeError::Target(e) => e.is_not_found(),
            ProbeError::RetriesExhausted { last, .. } => last.is_not_found(),
            _ => false,
        }
    }

    /// Check if this error is a content mismatch
    pub fn is_content_mismatch(&self) -> bool {
        matches!(self, ProbeError::ContentMismatch { .. })
    }

    /// Single-line description, suitable for progress output
    pub fn one_line(&self) -> String {
        self.to_string().replace('\n', "\\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_errors_are_fatal() {
        let err = ProbeError::Config("bad size".to_string());
        assert!(err.is_permanent());
        assert_eq!(err.exit_code(), EXIT_FATAL);
    }

    #[test]
    fn test_permanent_target_error() {
        let err = ProbeError::from(TargetError::Authentication("bad key id".to_string()));
        assert!(err.is_permanent());
        assert_eq!(err.exit_code(), EXIT_FATAL);

        let err = ProbeError::from(TargetError::Network("reset".to_string()));
        assert!(!err.is_permanent());
        assert_eq!(err.exit_code(), EXIT_PARTIAL);
    }

    #[test]
    fn test_exhausted_retries_are_not_permanent() {
        let err = ProbeError::RetriesExhausted {
            attempts: 4,
            last: TargetError::RateLimited("slow down".to_string()),
        };
        assert!(!err.is_permanent());
        assert_eq!(
            err.to_string(),
            "Gave up after 4 attempts: Rate limit exceeded: slow down"
        );
    }

    #[test]
    fn test_content_mismatch_display() {
        let err = ProbeError::ContentMismatch {
            key: "\"a.bin\"".to_string(),
            expected_digest: "abc".to_string(),
            actual_digest: "def".to_string(),
            expected_length: 10,
            actual_length: 9,
        };
        assert!(err.is_content_mismatch());
        assert_eq!(err.exit_code(), EXIT_INTEGRITY);
        assert!(err.to_string().contains("expected 10 bytes with digest abc"));
        assert!(err.to_string().contains("got 9 bytes with digest def"));
    }

    #[test]
    fn test_not_found_detection() {
        let err = ProbeError::from(TargetError::NotFound {
            key: "k".to_string(),
        });
        assert!(err.is_not_found());
        assert!(!ProbeError::Cancelled.is_not_found());
    }

    #[test]
    fn test_one_line_escapes_newlines() {
        let err = ProbeError::Config("line one\nline two".to_string());
        assert_eq!(err.one_line(), "Configuration error: line one\\nline two");
    }
}
