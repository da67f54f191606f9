//! Content-addressed blob storage.
//!
//! Blobs are addressed by their BLAKE3 digest. Writes arrive as streams and
//! are hashed incrementally; a blob only becomes visible under its digest
//! once every byte has been checked against it.

use std::collections::HashMap;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{self, Stream, StreamExt};

use crate::error::ContentError;

/// A stream of body chunks.
pub type ByteStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

/// Wrap an in-memory buffer as a single-chunk [`ByteStream`].
pub fn bytes_stream(bytes: impl Into<Bytes>) -> ByteStream {
    let bytes = bytes.into();
    if bytes.is_empty() {
        return Box::pin(stream::empty::<io::Result<Bytes>>());
    }
    Box::pin(stream::iter([Ok::<_, io::Error>(bytes)]))
}

/// Drain a [`ByteStream`] into memory.
pub async fn collect_stream(mut body: ByteStream) -> io::Result<Vec<u8>> {
    let mut out = Vec::new();
    while let Some(chunk) = body.next().await {
        out.extend_from_slice(&chunk?);
    }
    Ok(out)
}

/// Blob count and total size of a store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlobUsage {
    /// Number of complete blobs.
    pub blobs: u64,
    /// Sum of blob sizes in bytes.
    pub bytes: u64,
}

/// Trait for content-addressed blob storage.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Check if a complete blob exists for `hash`.
    async fn has(&self, hash: &[u8; 32]) -> Result<bool, ContentError>;

    /// Stream the blob stored under `hash`.
    ///
    /// Returns `NotFound` if the hash is not in the store.
    async fn read(&self, hash: &[u8; 32]) -> Result<ByteStream, ContentError>;

    /// Stream `body` into the store under `hash`.
    ///
    /// The digest is recomputed as bytes arrive. On mismatch, on an input
    /// error, or once more than `max_size` bytes have been read, the partial
    /// blob is discarded and no further input is consumed. Writing a blob
    /// that already exists succeeds without reading `body`.
    ///
    /// Returns the number of bytes stored (zero when already present).
    async fn write(
        &self,
        hash: &[u8; 32],
        body: ByteStream,
        max_size: Option<u64>,
    ) -> Result<u64, ContentError>;

    /// Remove a blob.
    ///
    /// Returns `Ok(true)` if removed, `Ok(false)` if not found.
    async fn remove(&self, hash: &[u8; 32]) -> Result<bool, ContentError>;

    /// Count blobs and bytes currently stored.
    async fn usage(&self) -> Result<BlobUsage, ContentError>;
}

/// Incremental digest and size check shared by store backends.
pub(crate) struct Verifier {
    hasher: blake3::Hasher,
    written: u64,
    max_size: Option<u64>,
}

impl Verifier {
    pub(crate) fn new(max_size: Option<u64>) -> Self {
        Self {
            hasher: blake3::Hasher::new(),
            written: 0,
            max_size,
        }
    }

    /// Account for a chunk, failing once the running size passes the limit.
    pub(crate) fn update(&mut self, chunk: &[u8]) -> Result<(), ContentError> {
        self.written += chunk.len() as u64;
        if let Some(limit) = self.max_size {
            if self.written > limit {
                return Err(ContentError::TooLarge { limit });
            }
        }
        self.hasher.update(chunk);
        Ok(())
    }

    /// Compare the final digest against `expected`.
    pub(crate) fn finish(self, expected: &[u8; 32]) -> Result<u64, ContentError> {
        let actual = self.hasher.finalize();
        if actual.as_bytes() != expected {
            return Err(ContentError::HashMismatch {
                expected: hex::encode(expected),
                actual: actual.to_hex().to_string(),
            });
        }
        Ok(self.written)
    }
}

/// In-memory blob store for testing.
///
/// Stores blobs in a thread-safe HashMap. Not persistent - all data
/// is lost when the store is dropped.
#[derive(Default, Clone)]
pub struct MemoryStore {
    blobs: Arc<Mutex<HashMap<[u8; 32], Bytes>>>,
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of blobs currently stored.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<[u8; 32], Bytes>> {
        // A poisoned map is still structurally sound.
        self.blobs.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("blobs", &self.len())
            .finish()
    }
}

#[async_trait]
impl BlobStore for MemoryStore {
    async fn has(&self, hash: &[u8; 32]) -> Result<bool, ContentError> {
        Ok(self.lock().contains_key(hash))
    }

    async fn read(&self, hash: &[u8; 32]) -> Result<ByteStream, ContentError> {
        let blob = self
            .lock()
            .get(hash)
            .cloned()
            .ok_or_else(|| ContentError::NotFound {
                hash: hex::encode(hash),
            })?;
        Ok(bytes_stream(blob))
    }

    async fn write(
        &self,
        hash: &[u8; 32],
        mut body: ByteStream,
        max_size: Option<u64>,
    ) -> Result<u64, ContentError> {
        if self.has(hash).await? {
            return Ok(0);
        }

        let mut verifier = Verifier::new(max_size);
        let mut buffer = Vec::new();
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            verifier.update(&chunk)?;
            buffer.extend_from_slice(&chunk);
        }
        let written = verifier.finish(hash)?;

        self.lock().insert(*hash, Bytes::from(buffer));
        Ok(written)
    }

    async fn remove(&self, hash: &[u8; 32]) -> Result<bool, ContentError> {
        Ok(self.lock().remove(hash).is_some())
    }

    async fn usage(&self) -> Result<BlobUsage, ContentError> {
        let blobs = self.lock();
        Ok(BlobUsage {
            blobs: blobs.len() as u64,
            bytes: blobs.values().map(|b| b.len() as u64).sum(),
        })
    }
}
