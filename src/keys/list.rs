//! Key lists and per-key outcomes

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use super::{ObjectKey, RangeTable};
use crate::error::ProbeError;

/// Where the keys of a [`KeyList`] come from
#[derive(Debug, Clone)]
pub enum KeySource {
    /// One key per code point of a table
    CodePoints(RangeTable),

    /// Explicit, pre-built keys
    Sequences(Vec<ObjectKey>),
}

/// An ordered, named, countable domain of candidate keys
///
/// Keys within a list are unique. Order matters for bisection.
#[derive(Debug, Clone)]
pub struct KeyList {
    name: String,
    source: KeySource,
}

impl KeyList {
    /// One key per code point of `table`
    ///
    /// Returns `None` for tables that cannot safely be turned into keys: empty
    /// tables, tables marked non-textual, and tables with members that are not
    /// Unicode scalar values.
    pub fn from_range_table(name: impl Into<String>, table: &RangeTable) -> Option<Self> {
        if table.is_empty() || !table.is_textual() || !table.all_scalar_values() {
            return None;
        }
        Some(Self {
            name: name.into(),
            source: KeySource::CodePoints(table.clone()),
        })
    }

    /// Explicit keys, in order; later duplicates are dropped
    pub fn from_sequences<K>(name: impl Into<String>, sequences: impl IntoIterator<Item = K>) -> Self
    where
        K: Into<ObjectKey>,
    {
        let mut seen = HashSet::new();
        let keys = sequences
            .into_iter()
            .map(Into::into)
            .filter(|key: &ObjectKey| seen.insert(key.clone()))
            .collect();
        Self {
            name: name.into(),
            source: KeySource::Sequences(keys),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &KeySource {
        &self.source
    }

    /// Number of keys
    pub fn count(&self) -> u64 {
        match &self.source {
            KeySource::CodePoints(table) => table.len(),
            KeySource::Sequences(keys) => keys.len() as u64,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// The key at `index`
    pub fn key(&self, index: u64) -> Option<ObjectKey> {
        match &self.source {
            KeySource::CodePoints(table) => table
                .code_point(index)
                .and_then(char::from_u32)
                .map(ObjectKey::from),
            KeySource::Sequences(keys) => usize::try_from(index)
                .ok()
                .and_then(|i| keys.get(i))
                .cloned(),
        }
    }

    /// All keys in order
    pub fn keys(&self) -> Box<dyn Iterator<Item = ObjectKey> + Send + '_> {
        match &self.source {
            KeySource::CodePoints(table) => Box::new(
                table
                    .iter()
                    .filter_map(char::from_u32)
                    .map(ObjectKey::from),
            ),
            KeySource::Sequences(keys) => Box::new(keys.iter().cloned()),
        }
    }
}

/// Outcome of testing one key from a [`KeyList`]
#[derive(Debug)]
pub struct KeyResult {
    pub list: Arc<KeyList>,
    pub index: u64,
    pub key: ObjectKey,
    /// `None` if the backend accepted the key
    pub error: Option<ProbeError>,
}

impl KeyResult {
    pub fn new(list: Arc<KeyList>, index: u64, key: ObjectKey, error: Option<ProbeError>) -> Self {
        debug_assert!(index < list.count());
        Self {
            list,
            index,
            key,
            error,
        }
    }

    /// Whether the backend accepted the key
    ///
    /// This is the raw outcome; whether it was the *expected* outcome depends
    /// on the polarity of the case that produced it.
    pub fn success(&self) -> bool {
        self.error.is_none()
    }

    /// One-line description, e.g. `"é" (3 of 10 from Latin) succeeded`
    pub fn pretty(&self) -> String {
        let position = format!(
            "{} ({} of {} from {})",
            self.key,
            self.index + 1,
            self.list.count(),
            self.list.name()
        );
        match &self.error {
            None => format!("{} succeeded", position),
            Some(err) => format!("{} failed: {}", position, err.one_line()),
        }
    }
}

impl fmt::Display for KeyResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pretty())
    }
}
