//! # web-relay-server
//!
//! HTTP relay for signed records.
//!
//! The relay stores, per `<authorID>/<path>`, the newest record an author
//! has signed together with the content it commits to, and pushes new
//! records to anyone watching the path:
//!
//! - `PUT /<authorID>/<path>` stores content plus a record header
//! - `GET /<authorID>/<path>` returns the content and the record header
//! - `GET /subscribe/<authorID>/<path>` streams records as server-sent events
//!
//! ## Architecture
//!
//! ```text
//! Writer ──PUT──┐                       ┌──SSE──► Reader
//!               │                       │
//!        ┌──────┴───────────────────────┴──────┐
//!        │               web-relay             │
//!        │  ┌──────────────┐ ┌──────────────┐  │
//!        │  │SQLite records│ │content/<hash>│  │
//!        │  └──────────────┘ └──────────────┘  │
//!        └─────────────────────────────────────┘
//! ```
//!
//! The relay never sees plaintext of encrypted entries; it only checks
//! signatures, hashes and timestamps.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod http;
pub mod server;
pub mod storage;
pub mod subscriptions;

pub use config::Config;
pub use error::{RelayError, Result};
pub use server::{RelayMetrics, RelayStats, WebRelay};
