//! # relay-content
//!
//! Content-addressed blob storage and path encryption for the web relay.
//!
//! Records never carry content themselves, only its BLAKE3 digest. The
//! bytes live in a [`BlobStore`] addressed by that digest:
//!
//! ```text
//! body stream → BLAKE3 (incremental) + size check → temp file → rename to <hex digest>
//!                         ↓ mismatch / too large
//!                   partial blob discarded
//! ```
//!
//! Encrypted entries are sealed before hashing, so relays only ever store
//! and address ciphertext:
//!
//! ```text
//! Plaintext → XChaCha20-Poly1305 → nonce || tag || ciphertext → BLAKE3 → Record hash
//!                 ↑
//!          SHA-256(namespace || author keypair || path)
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use web_relay_content::{bytes_stream, BlobStore, MemoryStore};
//!
//! # async fn example() -> Result<(), web_relay_content::ContentError> {
//! let store = MemoryStore::new();
//! let hash = *blake3::hash(b"bar").as_bytes();
//! store.write(&hash, bytes_stream("bar"), None).await?;
//! assert!(store.has(&hash).await?);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod encrypt;
mod error;
mod fs;
mod store;

pub use encrypt::{decrypt, derive_key, encrypt, KEY_NAMESPACE, KEY_SIZE, NONCE_SIZE, TAG_SIZE};
pub use error::ContentError;
pub use fs::FsStore;
pub use store::{bytes_stream, collect_stream, BlobStore, BlobUsage, ByteStream, MemoryStore};
