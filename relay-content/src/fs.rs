//! Filesystem blob store.
//!
//! Each blob lives at `<root>/<hex digest>`. Writes go to a dot-prefixed
//! temporary file in the same directory and are renamed into place only
//! after the digest checks out, so a reader never sees a partial blob under
//! its final name. Concurrent writers of the same digest each stream to
//! their own temporary file; the last rename wins with identical bytes.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

use crate::error::ContentError;
use crate::store::{BlobStore, BlobUsage, ByteStream, Verifier};

/// Blob store rooted at a directory.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, ContentError> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        debug!(root = %root.display(), "Opened blob store");
        Ok(Self { root })
    }

    /// Directory holding the blobs.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, hash: &[u8; 32]) -> PathBuf {
        self.root.join(hex::encode(hash))
    }

    fn temp_path(&self, hash: &[u8; 32]) -> Result<PathBuf, ContentError> {
        let mut suffix = [0u8; 8];
        getrandom::getrandom(&mut suffix)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
        Ok(self.root.join(format!(
            ".{}.{}.tmp",
            hex::encode(hash),
            hex::encode(suffix)
        )))
    }

    async fn stream_into(
        file: &mut File,
        hash: &[u8; 32],
        mut body: ByteStream,
        max_size: Option<u64>,
    ) -> Result<u64, ContentError> {
        let mut verifier = Verifier::new(max_size);
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            verifier.update(&chunk)?;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        file.sync_all().await?;
        verifier.finish(hash)
    }
}

#[async_trait]
impl BlobStore for FsStore {
    async fn has(&self, hash: &[u8; 32]) -> Result<bool, ContentError> {
        match fs::metadata(self.blob_path(hash)).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn read(&self, hash: &[u8; 32]) -> Result<ByteStream, ContentError> {
        match File::open(self.blob_path(hash)).await {
            Ok(file) => Ok(Box::pin(ReaderStream::new(file))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(ContentError::NotFound {
                hash: hex::encode(hash),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(
        &self,
        hash: &[u8; 32],
        body: ByteStream,
        max_size: Option<u64>,
    ) -> Result<u64, ContentError> {
        if self.has(hash).await? {
            debug!(hash = %hex::encode(hash), "Blob already stored");
            return Ok(0);
        }

        let temp = self.temp_path(hash)?;
        let mut file = File::create(&temp).await?;
        let result = Self::stream_into(&mut file, hash, body, max_size).await;
        drop(file);

        match result {
            Ok(written) => {
                if let Err(e) = fs::rename(&temp, self.blob_path(hash)).await {
                    if let Err(cleanup) = fs::remove_file(&temp).await {
                        warn!(path = %temp.display(), error = %cleanup, "Failed to remove unplaced blob");
                    }
                    return Err(e.into());
                }
                debug!(hash = %hex::encode(hash), bytes = written, "Stored blob");
                Ok(written)
            }
            Err(e) => {
                if let Err(cleanup) = fs::remove_file(&temp).await {
                    warn!(path = %temp.display(), error = %cleanup, "Failed to remove partial blob");
                }
                Err(e)
            }
        }
    }

    async fn remove(&self, hash: &[u8; 32]) -> Result<bool, ContentError> {
        match fs::remove_file(self.blob_path(hash)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn usage(&self) -> Result<BlobUsage, ContentError> {
        let mut usage = BlobUsage::default();
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            // Skip in-flight temporary files
            if entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }
            let meta = entry.metadata().await?;
            if meta.is_file() {
                usage.blobs += 1;
                usage.bytes += meta.len();
            }
        }
        Ok(usage)
    }
}
