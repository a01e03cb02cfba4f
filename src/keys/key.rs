//! Object keys
//!
//! Keys are kept as raw bytes so that deliberately malformed UTF-8 can be
//! offered to a backend. Adapters that need text call [`ObjectKey::to_str`]
//! and reject the key client-side when it is not valid UTF-8.

use std::fmt;
use std::str::Utf8Error;

/// An object key, addressed as raw bytes
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey(Vec<u8>);

impl ObjectKey {
    /// Create a key from raw bytes
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// View the key as text, if it is valid UTF-8
    pub fn to_str(&self) -> Result<&str, Utf8Error> {
        std::str::from_utf8(&self.0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Byte-for-byte hexadecimal rendering, for diagnosing encodings
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl From<String> for ObjectKey {
    fn from(s: String) -> Self {
        Self(s.into_bytes())
    }
}

impl From<&str> for ObjectKey {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

impl From<char> for ObjectKey {
    fn from(c: char) -> Self {
        Self::from(c.to_string())
    }
}

impl From<Vec<u8>> for ObjectKey {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

/// Quoted and escaped, so control characters and invalid bytes stay visible
impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_str() {
            Ok(s) => write!(f, "\"{}\"", s.escape_debug()),
            Err(_) => {
                write!(f, "b\"")?;
                for b in &self.0 {
                    write!(f, "{}", std::ascii::escape_default(*b))?;
                }
                write!(f, "\"")
            }
        }
    }
}
