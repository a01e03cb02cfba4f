//! Local filesystem target
//!
//! Treats a directory as a bucket. Keys map to relative paths below the root;
//! `/` in a key creates intermediate directories, which are pruned again when
//! the last object beneath them is deleted.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::{ObjectReader, Target, TargetError, TargetResult};
use crate::keys::ObjectKey;

/// Directory-backed bucket
#[derive(Debug, Clone)]
pub struct LocalTarget {
    root: PathBuf,
}

impl LocalTarget {
    /// Create a target rooted at `root`; the directory must already exist
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a key to a path below the root
    fn resolve_key(&self, key: &ObjectKey) -> TargetResult<PathBuf> {
        let invalid = |reason: &str| TargetError::InvalidKey {
            key: key.to_string(),
            reason: reason.to_string(),
        };

        let bytes = key.as_bytes();
        if bytes.is_empty() {
            return Err(invalid("key must not be empty"));
        }
        if bytes.contains(&0) {
            return Err(invalid("key must not contain NUL"));
        }
        if bytes
            .split(|b| *b == b'/')
            .any(|segment| segment.is_empty() || segment == b"." || segment == b"..")
        {
            return Err(invalid("key segments must be non-empty and not '.' or '..'"));
        }

        let relative = key_to_path(key)?;
        if !relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
        {
            return Err(invalid("key must be a relative path"));
        }
        Ok(self.root.join(relative))
    }

    /// Remove empty directories between `path` and the root
    async fn prune_empty_parents(&self, path: &Path) {
        let mut current = path.parent();
        while let Some(dir) = current {
            if dir == self.root || !dir.starts_with(&self.root) {
                break;
            }
            if fs::remove_dir(dir).await.is_err() {
                break;
            }
            current = dir.parent();
        }
    }
}

#[cfg(unix)]
fn key_to_path(key: &ObjectKey) -> TargetResult<PathBuf> {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;
    Ok(PathBuf::from(OsStr::from_bytes(key.as_bytes())))
}

#[cfg(not(unix))]
fn key_to_path(key: &ObjectKey) -> TargetResult<PathBuf> {
    key.to_str()
        .map(PathBuf::from)
        .map_err(|e| TargetError::InvalidKey {
            key: key.to_string(),
            reason: e.to_string(),
        })
}

#[async_trait]
impl Target for LocalTarget {
    async fn put(&self, key: &ObjectKey, mut content: ObjectReader, length: u64) -> TargetResult<()> {
        let path = self.resolve_key(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| TargetError::from_io(e, key.to_string()))?;
        }

        let mut file = fs::File::create(&path)
            .await
            .map_err(|e| TargetError::from_io(e, key.to_string()))?;
        let written = tokio::io::copy(&mut content, &mut file).await?;
        file.flush().await?;
        drop(file);

        if written != length {
            let _ = fs::remove_file(&path).await;
            return Err(TargetError::Io {
                kind: std::io::ErrorKind::UnexpectedEof,
                message: format!("expected {} bytes, wrote {}", length, written),
            });
        }
        Ok(())
    }

    async fn get(&self, key: &ObjectKey) -> TargetResult<ObjectReader> {
        let path = self.resolve_key(key)?;
        let file = fs::File::open(&path)
            .await
            .map_err(|e| TargetError::from_io(e, key.to_string()))?;
        Ok(Box::pin(file))
    }

    async fn head(&self, key: &ObjectKey) -> TargetResult<bool> {
        let path = self.resolve_key(key)?;
        match fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(TargetError::from_io(e, key.to_string())),
        }
    }

    async fn delete(&self, key: &ObjectKey) -> TargetResult<()> {
        let path = self.resolve_key(key)?;
        fs::remove_file(&path)
            .await
            .map_err(|e| TargetError::from_io(e, key.to_string()))?;
        self.prune_empty_parents(&path).await;
        Ok(())
    }

    fn backend_name(&self) -> &str {
        "local"
    }

    fn describe(&self) -> String {
        format!("file://{}", self.root.display())
    }
}
