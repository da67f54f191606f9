//! Error types for relay-content.

use thiserror::Error;

/// Errors that can occur during content operations.
#[derive(Error, Debug)]
pub enum ContentError {
    /// Content not found in store.
    #[error("content not found: {hash}")]
    NotFound {
        /// Hex-encoded hash of the missing content.
        hash: String,
    },

    /// Streamed bytes did not hash to the declared digest.
    #[error("hash mismatch: expected {expected}, got {actual}")]
    HashMismatch {
        /// Expected hash (hex-encoded).
        expected: String,
        /// Actual hash (hex-encoded).
        actual: String,
    },

    /// Streamed body grew past the size limit.
    #[error("content too large (limit {limit} bytes)")]
    TooLarge {
        /// Configured maximum in bytes.
        limit: u64,
    },

    /// Encryption operation failed.
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    /// Decryption failed (authentication error).
    /// No details provided to prevent timing attacks.
    #[error("decryption failed")]
    DecryptionFailed,

    /// Underlying I/O failed, including errors from the input stream.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
