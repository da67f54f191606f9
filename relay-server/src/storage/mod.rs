//! Storage layer for web-relay.
//!
//! Records live in a [`RecordStore`] keyed by full path; their content lives
//! in a content-addressed blob store from `relay-content`.

mod sqlite;

pub use sqlite::SqliteStorage;

use crate::error::StorageError;
use async_trait::async_trait;
use relay_types::{AuthorId, Record};

/// Result of offering a record to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutOutcome {
    /// Stored; it was new or at least as new as the previous record.
    Accepted,
    /// Refused; the stored record (returned) is newer.
    Conflict(Record),
}

/// Aggregate counts over the record store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordStats {
    /// Number of stored records.
    pub records: u64,
    /// Number of distinct authors with at least one record.
    pub authors: u64,
}

/// Trait for record storage backends.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Get the record stored at `key`.
    async fn get(&self, key: &str) -> Result<Option<Record>, StorageError>;

    /// Store `record` at `key` unless the stored one is strictly newer.
    ///
    /// The comparison and the write are a single atomic step.
    async fn put(
        &self,
        key: &str,
        author: &AuthorId,
        record: &Record,
    ) -> Result<PutOutcome, StorageError>;

    /// Note that `key` was read.
    async fn touch(&self, key: &str) -> Result<(), StorageError>;

    /// Record and author counts.
    async fn stats(&self) -> Result<RecordStats, StorageError>;
}
