/*!
 * Configuration for cloudprobe
 *
 * Values come from defaults, then an optional TOML file, then command-line
 * flags, each layer overriding the one before.
 */

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::content::{DEFAULT_CONTENT_LENGTH, MAX_CONTENT_LENGTH};
use crate::error::{ProbeError, Result};
use crate::probe::magnitude::{COUNT_MAX_DEFAULT, SIZE_MAX_DEFAULT};
use crate::probe::{DEFAULT_COUNT_OBJECT_LENGTH, DEFAULT_WORKERS};
use crate::retry::{BackoffStrategy, RetryPolicy};

/// Main configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Log level for diagnostic output
    pub log_level: LogLevel,

    /// Log file path (None = stderr)
    pub log_file: Option<PathBuf>,

    /// Enable verbose logging (shorthand for log_level = debug)
    pub verbose: bool,

    /// Retry behaviour for every storage operation
    pub retry: RetrySettings,

    /// Concurrent creates during a count probe
    pub workers: usize,

    /// Body length of each object created by count probes
    pub count_object_length: u64,

    /// Default upper bound for size probes
    pub size_max: u64,

    /// Default upper bound for count probes
    pub count_max: u64,

    /// Body length of the connection-check object
    pub connection_check_length: u64,

    /// Overall timeout in seconds (None = no timeout)
    pub timeout_secs: Option<u64>,

    /// Custom S3 endpoint, for S3-compatible services
    pub endpoint: Option<String>,

    /// S3 region
    pub region: Option<String>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            log_file: None,
            verbose: false,
            retry: RetrySettings::default(),
            workers: DEFAULT_WORKERS,
            count_object_length: DEFAULT_COUNT_OBJECT_LENGTH,
            size_max: SIZE_MAX_DEFAULT,
            count_max: COUNT_MAX_DEFAULT,
            connection_check_length: DEFAULT_CONTENT_LENGTH,
            timeout_secs: None,
            endpoint: None,
            region: None,
        }
    }
}

impl ProbeConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ProbeError::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        let config: Self = toml::from_str(&contents).map_err(|e| {
            ProbeError::Config(format!("Failed to parse config file {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject object lengths that no probe could generate
    pub fn validate(&self) -> Result<()> {
        let lengths = [
            ("size_max", self.size_max),
            ("count_object_length", self.count_object_length),
            ("connection_check_length", self.connection_check_length),
        ];
        for (field, value) in lengths {
            if value > MAX_CONTENT_LENGTH {
                return Err(ProbeError::Config(format!(
                    "{} = {} exceeds the largest object length {}",
                    field, value, MAX_CONTENT_LENGTH
                )));
            }
        }
        Ok(())
    }

    /// Overall timeout, if one is set
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.filter(|&secs| secs > 0).map(Duration::from_secs)
    }

    /// Effective log level, taking `verbose` into account
    pub fn effective_log_level(&self) -> LogLevel {
        if self.verbose {
            LogLevel::Debug
        } else {
            self.log_level
        }
    }
}

/// Retry settings as they appear in the config file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Maximum attempts per operation, including the first
    pub max_attempts: u32,

    /// Delay before the first retry, in milliseconds
    pub initial_delay_ms: u64,

    /// Upper bound on any single delay, in milliseconds
    pub max_delay_ms: u64,

    pub backoff: BackoffStrategy,

    /// Jitter factor (0.0-1.0)
    pub jitter_factor: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            initial_delay_ms: policy.initial_delay.as_millis() as u64,
            max_delay_ms: policy.max_delay.as_millis() as u64,
            backoff: policy.backoff,
            jitter_factor: policy.jitter_factor,
        }
    }
}

impl RetrySettings {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            backoff: self.backoff,
            jitter_factor: self.jitter_factor.clamp(0.0, 1.0),
        }
    }
}

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Only errors
    Error,

    /// Warnings and errors
    #[default]
    Warn,

    /// Info, warnings, and errors
    Info,

    /// Debug and above
    Debug,

    /// All messages including traces
    Trace,
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}
