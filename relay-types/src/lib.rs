//! # relay-types
//!
//! Wire format types for the web relay protocol.
//!
//! This crate provides the foundational types used across all web relay crates:
//! - [`Record`] - Signed envelope binding a path to a content digest
//! - [`AuthorId`] - z-base-32 encoded Ed25519 public key, root of every path
//! - [`protocol`] - Header names and other HTTP constants
//! - [`RecordError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod ids;
pub mod protocol;
mod record;

pub use ed25519_dalek::SigningKey;
pub use error::RecordError;
pub use ids::{
    absolute_path, full_path, generate_signing_key, signing_key_from_seed, split_full_path,
    AuthorId, AUTHOR_ID_SIZE,
};
pub use record::{
    now_millis, Record, RecordOptions, HASH_SIZE, HEADER_SIZE, MAX_TIMESTAMP, RECORD_VERSION,
    SIGNATURE_SIZE, TIMESTAMP_SIZE,
};
