//! # relay-client
//!
//! Offline-first client for the web relay protocol.
//!
//! This is the library applications use to publish and read signed entries.
//!
//! ## Features
//!
//! - **Local-first**: every write is stored locally before it is sent, and
//!   reads answer from the local cache while the relay is consulted
//! - **Durable delivery**: pending writes survive restarts and are retried
//!   with exponential backoff until the relay answers
//! - **Verified reads**: relay responses are checked against their signed
//!   record before they are cached
//! - **E2E Encryption**: XChaCha20-Poly1305 with path-derived keys, shared
//!   through the URL fragment
//! - **Transport Abstraction**: Pluggable transport layer (HTTP, mock)
//!
//! ## Example
//!
//! ```ignore
//! use web_relay_client::{Client, ClientConfig, GetOptions, HttpTransport, PutOptions, RedbKv};
//!
//! let key = relay_types::generate_signing_key();
//! let store = RedbKv::open("client.redb")?;
//! let config = ClientConfig::new().with_relay("http://localhost:3000");
//! let client = Client::new(key, store, HttpTransport::new(), config);
//!
//! client.put("/profile.json", br#"{"name":"alice"}"#, PutOptions::default()).await?;
//! let url = client.create_url("/profile.json").await?;
//!
//! let _sub = client.subscribe(&url, |value| println!("updated: {value:?}"))?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod kv;
pub mod subscriptions;
pub mod transport;

pub use client::{
    Client, ClientConfig, ClientError, DeleteOptions, GetOptions, PutOptions,
    DEFAULT_MAX_SUBSCRIPTIONS,
};
pub use kv::{BatchOp, KvError, KvStore, MemoryKv, RedbKv};
pub use subscriptions::{Callback, Subscription};
pub use transport::{
    EventStream, HttpTransport, Method, MockResponse, MockTransport, Request, Response, Transport,
    TransportError,
};
