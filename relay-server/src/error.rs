//! Error types for web-relay.

use std::path::PathBuf;

use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use relay_content::ContentError;
use relay_types::protocol::RECORD_HEADER;
use relay_types::{Record, RecordError};

/// Main error type for web-relay operations.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Record store error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Blob store error.
    #[error("content error: {0}")]
    Content(#[from] ContentError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// First path segment is not a valid author id.
    #[error("invalid userID: {0}")]
    InvalidUserId(String),

    /// PUT without a record header.
    #[error("missing record header")]
    MissingRecordHeader,

    /// Record header could not be decoded.
    #[error("malformed record: {0}")]
    MalformedRecord(#[source] RecordError),

    /// Record signature does not match the path.
    #[error("invalid signature")]
    InvalidSignature,

    /// The stored record is newer than the one offered.
    #[error("conflict: stored record is newer")]
    Conflict(Box<Record>),

    /// No record at the path.
    #[error("record not found")]
    NotFound,

    /// A record exists but its blob does not.
    #[error("content missing for hash {hash}")]
    MissingContent {
        /// Hex digest of the missing blob.
        hash: String,
    },
}

/// Record store errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored record could not be decoded.
    #[error("corrupt record at {key}: {source}")]
    CorruptRecord {
        /// Key of the record.
        key: String,
        /// Decode error.
        source: RecordError,
    },

    /// Database path error.
    #[error("invalid database path: {path}")]
    InvalidPath {
        /// The invalid path.
        path: PathBuf,
    },
}

/// Result type alias for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;

/// Result type alias for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// An error as the HTTP client sees it.
#[derive(Debug)]
pub enum ApiError {
    /// 400 with a reason.
    BadRequest(String),
    /// 404.
    NotFound,
    /// 405.
    MethodNotAllowed,
    /// 409 carrying the newer stored record.
    Conflict(Box<Record>),
    /// 413.
    TooLarge,
    /// 500 with a reason.
    Internal(String),
}

impl ApiError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::TooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<RelayError> for ApiError {
    fn from(error: RelayError) -> Self {
        match error {
            RelayError::InvalidUserId(_) => Self::BadRequest("Invalid userID".into()),
            RelayError::MissingRecordHeader => {
                Self::BadRequest(format!("Missing or malformed header: '{RECORD_HEADER}'"))
            }
            RelayError::MalformedRecord(e) => Self::BadRequest(e.to_string()),
            RelayError::InvalidSignature => Self::BadRequest("Invalid signature".into()),
            RelayError::Conflict(record) => Self::Conflict(record),
            RelayError::NotFound => Self::NotFound,
            RelayError::Content(ContentError::TooLarge { .. }) => Self::TooLarge,
            RelayError::Content(ContentError::HashMismatch { .. }) => {
                Self::BadRequest("Invalid content hash".into())
            }
            e @ (RelayError::MissingContent { .. }
            | RelayError::Content(ContentError::NotFound { .. })) => {
                tracing::error!(error = %e, "Record without content");
                Self::Internal("Failed to read file".into())
            }
            other => {
                tracing::error!(error = %other, "Request failed");
                Self::Internal("Internal error".into())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            Self::Conflict(record) => {
                let mut response = (status, "Conflict").into_response();
                if let Ok(value) = HeaderValue::from_str(record.to_base64()) {
                    response.headers_mut().insert(RECORD_HEADER, value);
                }
                response
            }
            Self::BadRequest(reason) | Self::Internal(reason) => (status, reason).into_response(),
            Self::NotFound => (status, "File not found").into_response(),
            Self::MethodNotAllowed => (status, "Method not allowed").into_response(),
            Self::TooLarge => (status, "Content too large").into_response(),
        }
    }
}
