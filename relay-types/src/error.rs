//! Error types for the record codec.

use thiserror::Error;

/// Errors that can occur while creating or decoding records.
#[derive(Debug, Error)]
pub enum RecordError {
    /// Buffer shorter than the fixed-width header.
    #[error("record truncated: {len} bytes (minimum {min})", min = crate::record::HEADER_SIZE)]
    Truncated {
        /// Length of the rejected buffer.
        len: usize,
    },

    /// Unknown envelope version
    #[error("unsupported record version: {0}")]
    UnsupportedVersion(u8),

    /// Timestamp does not fit in 48 bits
    #[error("timestamp out of range: {0}")]
    TimestampOverflow(u64),

    /// Author segment is not a z-base-32 encoded 32-byte key
    #[error("invalid author id: {0}")]
    InvalidAuthorId(String),

    /// Record header is not valid base64
    #[error("invalid base64 record")]
    InvalidBase64,

    /// Path is empty or contains reserved characters
    #[error("invalid path: {0}")]
    InvalidPath(String),
}
