/*!
 * Logging and tracing initialization
 */

use std::fs::{File, OpenOptions};
use std::path::Path;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::config::{LogLevel, ProbeConfig};
use crate::error::{ProbeError, Result};

/// Install the global subscriber
///
/// With a log file, every event is appended to it as one JSON object per
/// line; otherwise events go to stderr so they never interleave with the
/// case results printed on stdout. `RUST_LOG` overrides the configured level.
pub fn init_logging(config: &ProbeConfig) -> Result<()> {
    let registry = tracing_subscriber::registry().with(build_filter(config)?);

    let installed = match &config.log_file {
        Some(path) => {
            let json = fmt::layer()
                .json()
                .with_writer(open_log_file(path)?)
                .with_ansi(false)
                .with_file(true)
                .with_line_number(true)
                .with_thread_ids(true)
                .with_span_events(FmtSpan::CLOSE);
            registry.with(json).try_init()
        }
        None => {
            let compact = fmt::layer()
                .compact()
                .with_writer(std::io::stderr)
                .with_target(matches!(config.effective_log_level(), LogLevel::Debug | LogLevel::Trace));
            registry.with(compact).try_init()
        }
    };
    installed.map_err(|e| ProbeError::Config(format!("Failed to install log subscriber: {}", e)))
}

fn build_filter(config: &ProbeConfig) -> Result<EnvFilter> {
    let level = config.effective_log_level().to_tracing_level();
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("cloudprobe={}", level)))
        .map_err(|e| ProbeError::Config(format!("Failed to create log filter: {}", e)))
}

/// Open the log file for appending, so consecutive runs share one history
fn open_log_file(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| ProbeError::Config(format!("Failed to open log file {}: {}", path.display(), e)))
}
