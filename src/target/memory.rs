//! In-memory target
//!
//! Stores objects in a `HashMap` and counts every operation it receives. Limits
//! and faults can be injected so that the probing engine can be exercised
//! against a bucket whose behavior is known exactly.

use std::collections::{HashMap, VecDeque};
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncReadExt;

use super::{ObjectReader, Target, TargetError, TargetResult};
use crate::keys::ObjectKey;

/// Per-key rejection hook: returning an error makes `put` fail with it
pub type KeyFilter = Arc<dyn Fn(&ObjectKey) -> Option<TargetError> + Send + Sync>;

/// Operation kinds, for scripting failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Put,
    Get,
    Head,
    Delete,
}

/// Snapshot of the operations a [`MemoryTarget`] has received
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OperationCounts {
    pub puts: u64,
    pub gets: u64,
    pub heads: u64,
    pub deletes: u64,
}

impl OperationCounts {
    pub fn total(&self) -> u64 {
        self.puts + self.gets + self.heads + self.deletes
    }
}

/// In-memory bucket
pub struct MemoryTarget {
    name: String,
    objects: RwLock<HashMap<ObjectKey, Bytes>>,
    max_object_size: Option<u64>,
    max_objects: Option<usize>,
    silent_object_cap: Option<usize>,
    key_filter: Option<KeyFilter>,
    scripted: Mutex<HashMap<Operation, VecDeque<TargetError>>>,
    corrupt_reads: AtomicBool,
    puts: AtomicU64,
    gets: AtomicU64,
    heads: AtomicU64,
    deletes: AtomicU64,
}

impl MemoryTarget {
    /// Create an empty, unlimited bucket
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            objects: RwLock::new(HashMap::new()),
            max_object_size: None,
            max_objects: None,
            silent_object_cap: None,
            key_filter: None,
            scripted: Mutex::new(HashMap::new()),
            corrupt_reads: AtomicBool::new(false),
            puts: AtomicU64::new(0),
            gets: AtomicU64::new(0),
            heads: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
        }
    }

    /// Reject objects larger than `size` bytes
    pub fn with_max_object_size(mut self, size: u64) -> Self {
        self.max_object_size = Some(size);
        self
    }

    /// Refuse new objects once `count` are stored
    pub fn with_max_objects(mut self, count: usize) -> Self {
        self.max_objects = Some(count);
        self
    }

    /// Accept every write but silently drop new objects once `count` are stored
    pub fn with_silent_object_cap(mut self, count: usize) -> Self {
        self.silent_object_cap = Some(count);
        self
    }

    /// Reject keys for which `filter` returns an error
    pub fn with_key_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&ObjectKey) -> Option<TargetError> + Send + Sync + 'static,
    {
        self.key_filter = Some(Arc::new(filter));
        self
    }

    /// Make the next `operation` fail with `error`; calls queue up in order
    pub fn fail_next(&self, operation: Operation, error: TargetError) {
        self.scripted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(operation)
            .or_default()
            .push_back(error);
    }

    /// Flip a bit in every object body returned by `get`
    pub fn set_corrupt_reads(&self, corrupt: bool) {
        self.corrupt_reads.store(corrupt, Ordering::SeqCst);
    }

    /// Operations received so far, including failed ones
    pub fn counts(&self) -> OperationCounts {
        OperationCounts {
            puts: self.puts.load(Ordering::SeqCst),
            gets: self.gets.load(Ordering::SeqCst),
            heads: self.heads.load(Ordering::SeqCst),
            deletes: self.deletes.load(Ordering::SeqCst),
        }
    }

    pub fn total_operations(&self) -> u64 {
        self.counts().total()
    }

    pub fn contains(&self, key: &ObjectKey) -> bool {
        self.read_objects().contains_key(key)
    }

    pub fn object_count(&self) -> usize {
        self.read_objects().len()
    }

    /// Stored keys, sorted
    pub fn keys(&self) -> Vec<ObjectKey> {
        let mut keys: Vec<ObjectKey> = self.read_objects().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Store an object directly, bypassing limits and counters
    pub fn insert(&self, key: impl Into<ObjectKey>, data: impl Into<Bytes>) {
        self.objects
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), data.into());
    }

    fn read_objects(&self) -> std::sync::RwLockReadGuard<'_, HashMap<ObjectKey, Bytes>> {
        self.objects.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn scripted_failure(&self, operation: Operation) -> TargetResult<()> {
        let mut scripted = self.scripted.lock().unwrap_or_else(PoisonError::into_inner);
        match scripted.get_mut(&operation).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn not_found(key: &ObjectKey) -> TargetError {
        TargetError::NotFound {
            key: key.to_string(),
        }
    }
}

impl Default for MemoryTarget {
    fn default() -> Self {
        Self::new("default")
    }
}

#[async_trait]
impl Target for MemoryTarget {
    async fn put(&self, key: &ObjectKey, mut content: ObjectReader, length: u64) -> TargetResult<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.scripted_failure(Operation::Put)?;

        if key.is_empty() {
            return Err(TargetError::InvalidKey {
                key: key.to_string(),
                reason: "key must not be empty".to_string(),
            });
        }
        if let Some(filter) = &self.key_filter {
            if let Some(err) = filter(key) {
                return Err(err);
            }
        }
        if let Some(max) = self.max_object_size {
            if length > max {
                return Err(TargetError::Rejected {
                    code: "EntityTooLarge".to_string(),
                    message: format!("object of {} bytes exceeds maximum of {}", length, max),
                });
            }
        }

        let mut data = Vec::new();
        content.read_to_end(&mut data).await?;
        if data.len() as u64 != length {
            return Err(TargetError::Io {
                kind: std::io::ErrorKind::UnexpectedEof,
                message: format!("expected {} bytes, read {}", length, data.len()),
            });
        }

        let mut objects = self.objects.write().unwrap_or_else(PoisonError::into_inner);
        let is_new = !objects.contains_key(key);
        if is_new {
            if let Some(max) = self.max_objects {
                if objects.len() >= max {
                    return Err(TargetError::QuotaExceeded(format!(
                        "bucket {} already holds {} objects",
                        self.name, max
                    )));
                }
            }
            if let Some(cap) = self.silent_object_cap {
                if objects.len() >= cap {
                    return Ok(());
                }
            }
        }
        objects.insert(key.clone(), Bytes::from(data));
        Ok(())
    }

    async fn get(&self, key: &ObjectKey) -> TargetResult<ObjectReader> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.scripted_failure(Operation::Get)?;

        let data = self
            .read_objects()
            .get(key)
            .cloned()
            .ok_or_else(|| Self::not_found(key))?;

        if self.corrupt_reads.load(Ordering::SeqCst) {
            let mut corrupted = data.to_vec();
            match corrupted.first_mut() {
                Some(first) => *first ^= 0x01,
                None => corrupted.push(0),
            }
            return Ok(Box::pin(Cursor::new(corrupted)));
        }
        Ok(Box::pin(Cursor::new(data)))
    }

    async fn head(&self, key: &ObjectKey) -> TargetResult<bool> {
        self.heads.fetch_add(1, Ordering::SeqCst);
        self.scripted_failure(Operation::Head)?;
        Ok(self.read_objects().contains_key(key))
    }

    async fn delete(&self, key: &ObjectKey) -> TargetResult<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.scripted_failure(Operation::Delete)?;
        self.objects
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| Self::not_found(key))
    }

    fn backend_name(&self) -> &str {
        "memory"
    }

    fn describe(&self) -> String {
        format!("mem://{}", self.name)
    }
}
