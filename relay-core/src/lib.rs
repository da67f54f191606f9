//! # relay-core
//!
//! Pure logic for the web relay protocol (no I/O, instant tests).
//!
//! This crate holds the algorithms the client and relay share, without any
//! network or disk I/O:
//! - [`Backoff`] - retry delay schedule for relay delivery
//! - [`SlashUrl`] - shareable URL parsing and formatting
//! - [`keys`] - local key layout for records, blobs and pending writes
//! - [`SseDecoder`] - incremental `text/event-stream` decoding
//!
//! The actual I/O is performed by `relay-client` and `relay-server`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backoff;
pub mod keys;
pub mod sse;
pub mod url;

pub use backoff::{Backoff, INITIAL_BACKOFF, MAX_BACKOFF};
pub use sse::SseDecoder;
pub use url::{encode_path, relay_origin, validate_path, SlashUrl, UrlError, ENCRYPTION_KEY_SIZE};
