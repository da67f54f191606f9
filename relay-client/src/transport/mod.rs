//! Transport abstraction for the relay protocol.
//!
//! The client only needs two things from the network: a request that
//! returns a status, an optional record header and a streamed body; and a
//! long-lived subscription that yields record events. Everything protocol
//! specific (verification, caching, retries) lives above this trait.
//!
//! # Implementations
//!
//! - [`HttpTransport`]: reqwest over HTTP, server-sent events for subscriptions
//! - [`MockTransport`]: scripted responses and captured requests for tests
//!
//! # Example
//!
//! ```ignore
//! let transport = MockTransport::new();
//! transport.queue_response(MockResponse::status(200));
//! let response = transport.request(Request::get("http://relay/id/foo")).await?;
//! ```

mod http;
mod mock;

pub use http::HttpTransport;
pub use mock::{CapturedRequest, MockResponse, MockTransport};

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::Stream;
use relay_content::ByteStream;
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// The relay refused to open a subscription.
    #[error("unexpected status: {0}")]
    Status(u16),

    /// Receive failed mid-stream.
    #[error("receive failed: {0}")]
    ReceiveFailed(String),
}

/// Stream of event payloads (base64 records) from a subscription.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<String, TransportError>> + Send>>;

/// HTTP method used by the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Fetch a record and its blob.
    Get,
    /// Publish a record and its blob.
    Put,
}

/// A request to a relay.
#[derive(Clone)]
pub struct Request {
    /// Method.
    pub method: Method,
    /// Absolute URL.
    pub url: String,
    /// Base64 record for the record header.
    pub record: Option<String>,
    /// Request body.
    pub body: Bytes,
}

impl Request {
    /// A GET for `url`.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            record: None,
            body: Bytes::new(),
        }
    }

    /// A PUT of `body` to `url`, described by `record`.
    pub fn put(url: impl Into<String>, record: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            method: Method::Put,
            url: url.into(),
            record: Some(record.into()),
            body: body.into(),
        }
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("record", &self.record.is_some())
            .field("body", &format!("[{} bytes REDACTED]", self.body.len()))
            .finish()
    }
}

/// A relay response with a streamed body.
pub struct Response {
    /// HTTP status code.
    pub status: u16,
    /// Base64 record from the record header, if present.
    pub record: Option<String>,
    /// Response body.
    pub body: ByteStream,
}

impl Response {
    /// Whether the status is 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("record", &self.record.is_some())
            .finish_non_exhaustive()
    }
}

/// Transport trait for talking to relays.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Issue a request and return once headers have arrived.
    ///
    /// Errors are reserved for failures to get any response at all; HTTP
    /// error statuses are returned as responses.
    async fn request(&self, request: Request) -> Result<Response, TransportError>;

    /// Open a live update stream at `url`, presenting `record` (base64) as
    /// the last known state so the relay only replays something newer.
    async fn subscribe(
        &self,
        url: &str,
        record: Option<String>,
    ) -> Result<EventStream, TransportError>;
}
