/*!
 * Deterministic object content and streaming digests
 *
 * Object bodies are pseudorandom byte streams fully determined by a
 * (length, seed) pair. Nothing is retained: the creator recomputes the
 * expected digest from the pair, and the retriever hashes the body as it
 * streams past.
 */

use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sha2::{Digest as _, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};

use crate::error::{ProbeError, Result};

/// Default object size for a single create-retrieve-verify-delete run
pub const DEFAULT_CONTENT_LENGTH: u64 = 4096;

/// Default seed, for repeatability
pub const DEFAULT_RANDOM_SEED: i64 = 0;

/// Generation granularity; block boundaries depend only on the length
const BLOCK_SIZE: usize = 64 * 1024;

/// Largest representable content length
pub const MAX_CONTENT_LENGTH: u64 = i64::MAX as u64;

/// Parameters of a generated object body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentSpec {
    length: u64,
    seed: i64,
}

impl ContentSpec {
    /// Create a content spec, rejecting lengths beyond `i64::MAX`
    pub fn new(length: u64, seed: i64) -> Result<Self> {
        if length > MAX_CONTENT_LENGTH {
            return Err(ProbeError::Config(format!(
                "content length {} bytes exceeds maximum {}",
                length, MAX_CONTENT_LENGTH
            )));
        }
        Ok(Self { length, seed })
    }

    /// Create a content spec from a signed length
    pub fn from_signed(length: i64, seed: i64) -> Result<Self> {
        if length < 0 {
            return Err(ProbeError::Config(format!(
                "content length must not be negative (got {})",
                length
            )));
        }
        Self::new(length as u64, seed)
    }

    pub fn length(&self) -> u64 {
        self.length
    }

    pub fn seed(&self) -> i64 {
        self.seed
    }

    /// Stream the content
    pub fn reader(&self) -> ContentReader {
        ContentReader::new(self.generator())
    }

    /// Compute the digest of the content without materializing it
    pub fn digest(&self) -> Digest {
        let mut generator = self.generator();
        let mut hasher = StreamingHasher::new();
        while let Some(block) = generator.next_block() {
            hasher.update(block);
        }
        hasher.finalize()
    }

    fn generator(&self) -> ContentGenerator {
        ContentGenerator {
            rng: ChaCha8Rng::seed_from_u64(self.seed as u64),
            remaining: self.length,
            block: vec![0u8; BLOCK_SIZE.min(self.length as usize)],
        }
    }
}

impl Default for ContentSpec {
    fn default() -> Self {
        Self {
            length: DEFAULT_CONTENT_LENGTH,
            seed: DEFAULT_RANDOM_SEED,
        }
    }
}

/// Produces the content one block at a time
struct ContentGenerator {
    rng: ChaCha8Rng,
    remaining: u64,
    block: Vec<u8>,
}

impl ContentGenerator {
    fn next_block(&mut self) -> Option<&[u8]> {
        if self.remaining == 0 {
            return None;
        }
        let n = (self.block.len() as u64).min(self.remaining) as usize;
        self.rng.fill_bytes(&mut self.block[..n]);
        self.remaining -= n as u64;
        Some(&self.block[..n])
    }
}

/// Async reader over generated content
pub struct ContentReader {
    generator: ContentGenerator,
    pos: usize,
    filled: usize,
}

impl ContentReader {
    fn new(generator: ContentGenerator) -> Self {
        Self {
            generator,
            pos: 0,
            filled: 0,
        }
    }
}

impl AsyncRead for ContentReader {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.pos == this.filled {
            match this.generator.next_block() {
                Some(block) => {
                    this.filled = block.len();
                    this.pos = 0;
                }
                None => return Poll::Ready(Ok(())),
            }
        }
        let n = buf.remaining().min(this.filled - this.pos);
        buf.put_slice(&this.generator.block[this.pos..this.pos + n]);
        this.pos += n;
        Poll::Ready(Ok(()))
    }
}

/// Fixed-size content fingerprint (SHA-256)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest([u8; 32]);

impl Digest {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Streaming hasher that calculates a digest incrementally
pub struct StreamingHasher {
    hasher: Sha256,
    length: u64,
}

impl StreamingHasher {
    pub fn new() -> Self {
        Self {
            hasher: Sha256::new(),
            length: 0,
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
        self.length += data.len() as u64;
    }

    /// Bytes hashed so far
    pub fn length(&self) -> u64 {
        self.length
    }

    pub fn finalize(self) -> Digest {
        Digest(self.hasher.finalize().into())
    }
}

impl Default for StreamingHasher {
    fn default() -> Self {
        Self::new()
    }
}

/// Hash a stream to completion, returning its digest and length
pub async fn digest_reader<R>(mut reader: R) -> io::Result<(Digest, u64)>
where
    R: AsyncRead + Unpin,
{
    let mut hasher = StreamingHasher::new();
    let mut buffer = vec![0u8; BLOCK_SIZE];
    loop {
        let n = reader.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    let length = hasher.length();
    Ok((hasher.finalize(), length))
}
