/*!
 * cloudprobe - discover the practical limits of an object-storage bucket
 *
 * - Maximum object size and maximum object count, by binary search
 * - Unicode key support, by category, script, property and emoji sequence
 * - Rejection of malformed keys
 * - A standalone create-retrieve-verify-delete check for a single object
 *
 * Storage backends sit behind the [`target::Target`] trait.
 */

pub mod cli_style;
pub mod config;
pub mod content;
pub mod crvd;
pub mod error;
pub mod keys;
pub mod logging;
pub mod probe;
pub mod retry;
pub mod suite;
pub mod target;
pub mod units;

// Re-export commonly used types
pub use config::{LogLevel, ProbeConfig};
pub use content::{ContentSpec, Digest};
pub use crvd::{Crvd, CrvdState};
pub use error::{ProbeError, Result};
pub use keys::{KeyList, KeyResult, ObjectKey, UnicodeTables};
pub use probe::{Case, CaseResult, Polarity, ProbeContext, Strategy};
pub use suite::{Suite, SuiteReport, SuiteReporter};
pub use target::{Target, TargetConfig, TargetError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(VERSION, env!("CARGO_PKG_VERSION"));
    }
}
