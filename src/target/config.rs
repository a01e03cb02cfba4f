//! Target configuration and bucket URL parsing
//!
//! Supported URL formats:
//! - `mem://name[?max-size=SIZE&max-objects=N]` - in-memory bucket
//! - `file:///path/to/dir` - local directory
//! - `s3://bucket[/prefix]` - S3-compatible storage (requires `s3-native`)

use std::path::PathBuf;
use std::sync::Arc;

use url::Url;

use super::{LocalTarget, MemoryTarget, Target};
use crate::error::{ProbeError, Result};
use crate::units::parse_size;

/// Client settings for S3-compatible endpoints
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct S3Options {
    /// Custom endpoint (MinIO, Ceph, ...)
    pub endpoint: Option<String>,

    /// Region, if not taken from the environment
    pub region: Option<String>,
}

/// Default size ceiling for an unlimited in-memory bucket, which buffers every
/// object it stores
pub const MEMORY_SIZE_MAX_DEFAULT: u64 = 64 * 1024 * 1024;

/// Parsed bucket URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetConfig {
    /// In-memory bucket
    Memory {
        name: String,
        max_object_size: Option<u64>,
        max_objects: Option<usize>,
    },

    /// Local directory
    Local { root: PathBuf },

    /// S3-compatible bucket
    S3 {
        bucket: String,
        prefix: String,
        options: S3Options,
    },
}

impl TargetConfig {
    /// Parse a bucket URL
    pub fn parse(input: &str) -> Result<Self> {
        let url = Url::parse(input)
            .map_err(|e| ProbeError::Config(format!("invalid bucket URL '{}': {}", input, e)))?;

        match url.scheme() {
            "mem" => Self::parse_memory(&url),
            "file" => {
                let root = url.to_file_path().map_err(|_| {
                    ProbeError::Config(format!("invalid file URL '{}': expected file:///path", input))
                })?;
                Ok(TargetConfig::Local { root })
            }
            "s3" => {
                let bucket = url.host_str().unwrap_or_default().to_string();
                if bucket.is_empty() {
                    return Err(ProbeError::Config(format!(
                        "invalid S3 URL '{}': missing bucket name",
                        input
                    )));
                }
                Ok(TargetConfig::S3 {
                    bucket,
                    prefix: url.path().trim_start_matches('/').to_string(),
                    options: S3Options::default(),
                })
            }
            other => Err(ProbeError::Config(format!(
                "unsupported bucket URL scheme '{}' (expected mem, file or s3)",
                other
            ))),
        }
    }

    fn parse_memory(url: &Url) -> Result<Self> {
        let name = url.host_str().unwrap_or("default").to_string();
        let mut max_object_size = None;
        let mut max_objects = None;

        for (param, value) in url.query_pairs() {
            match param.as_ref() {
                "max-size" => max_object_size = Some(parse_size(&value)?),
                "max-objects" => {
                    max_objects = Some(value.parse::<usize>().map_err(|e| {
                        ProbeError::Config(format!("invalid max-objects '{}': {}", value, e))
                    })?)
                }
                other => {
                    return Err(ProbeError::Config(format!(
                        "unknown mem:// parameter '{}'",
                        other
                    )))
                }
            }
        }

        Ok(TargetConfig::Memory {
            name,
            max_object_size,
            max_objects,
        })
    }

    /// Size ceiling to use when none was given on the command line
    ///
    /// An unlimited `mem://` bucket holds each object in RAM, so its ceiling is
    /// capped at [`MEMORY_SIZE_MAX_DEFAULT`]. A `max-size` limit rejects large
    /// objects before they are buffered and needs no cap.
    pub fn default_size_max(&self, configured: u64) -> u64 {
        match self {
            TargetConfig::Memory {
                max_object_size: None,
                ..
            } => configured.min(MEMORY_SIZE_MAX_DEFAULT),
            _ => configured,
        }
    }

    /// Apply S3 client settings; ignored by other backends
    pub fn with_s3_options(mut self, endpoint: Option<String>, region: Option<String>) -> Self {
        if let TargetConfig::S3 { options, .. } = &mut self {
            if endpoint.is_some() {
                options.endpoint = endpoint;
            }
            if region.is_some() {
                options.region = region;
            }
        }
        self
    }

    /// Get backend type name
    pub fn backend_type(&self) -> &'static str {
        match self {
            TargetConfig::Memory { .. } => "memory",
            TargetConfig::Local { .. } => "local",
            TargetConfig::S3 { .. } => "s3",
        }
    }

    /// Construct the target
    pub async fn connect(&self) -> Result<Arc<dyn Target>> {
        match self {
            TargetConfig::Memory {
                name,
                max_object_size,
                max_objects,
            } => {
                let mut target = MemoryTarget::new(name.clone());
                if let Some(size) = max_object_size {
                    target = target.with_max_object_size(*size);
                }
                if let Some(count) = max_objects {
                    target = target.with_max_objects(*count);
                }
                Ok(Arc::new(target))
            }
            TargetConfig::Local { root } => {
                let is_dir = tokio::fs::metadata(root)
                    .await
                    .map(|m| m.is_dir())
                    .unwrap_or(false);
                if !is_dir {
                    return Err(ProbeError::Config(format!(
                        "'{}' is not an existing directory",
                        root.display()
                    )));
                }
                Ok(Arc::new(LocalTarget::new(root.clone())))
            }
            #[cfg(feature = "s3-native")]
            TargetConfig::S3 {
                bucket,
                prefix,
                options,
            } => {
                let target = super::S3Target::connect(bucket.clone(), prefix.clone(), options).await?;
                Ok(Arc::new(target))
            }
            #[cfg(not(feature = "s3-native"))]
            TargetConfig::S3 { .. } => Err(ProbeError::Config(
                "s3:// URLs require cloudprobe to be built with the 's3-native' feature".to_string(),
            )),
        }
    }
}
