//! Local key-value storage.
//!
//! The client persists records, blobs and pending-write markers in one
//! ordered byte-keyed store (see [`relay_core::keys`]). Anything that can
//! get, put, delete, apply an atomic batch and iterate a key range can back
//! a client.
//!
//! - [`MemoryKv`]: in-process `BTreeMap`, for tests and ephemeral clients.
//! - [`RedbKv`]: file-backed via `redb`; every batch is one write transaction.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use redb::{Database, ReadableTable, TableDefinition};
use thiserror::Error;

const TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("web-relay");

/// Key-value storage errors.
#[derive(Debug, Error)]
pub enum KvError {
    /// The database file could not be opened or created.
    #[error("failed to open database: {0}")]
    Database(#[from] redb::DatabaseError),

    /// A read or write transaction could not be started.
    #[error("failed to begin transaction: {0}")]
    Transaction(#[from] redb::TransactionError),

    /// The table could not be opened.
    #[error("failed to open table: {0}")]
    Table(#[from] redb::TableError),

    /// Reading or writing table data failed.
    #[error("storage error: {0}")]
    Storage(#[from] redb::StorageError),

    /// A write transaction failed to commit.
    #[error("failed to commit: {0}")]
    Commit(#[from] redb::CommitError),

    /// A blocking storage task panicked or was cancelled.
    #[error("storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// One operation in an atomic batch.
#[derive(Clone, PartialEq, Eq)]
pub enum BatchOp {
    /// Insert or overwrite `key`.
    Put {
        /// Key to write.
        key: Vec<u8>,
        /// Value to store.
        value: Vec<u8>,
    },
    /// Remove `key` if present.
    Delete {
        /// Key to remove.
        key: Vec<u8>,
    },
}

impl std::fmt::Debug for BatchOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BatchOp::Put { key, value } => f
                .debug_struct("Put")
                .field("key", &String::from_utf8_lossy(key))
                .field("value", &format!("[{} bytes REDACTED]", value.len()))
                .finish(),
            BatchOp::Delete { key } => f
                .debug_struct("Delete")
                .field("key", &String::from_utf8_lossy(key))
                .finish(),
        }
    }
}

/// Ordered byte-keyed storage used by the client.
#[async_trait]
pub trait KvStore: Send + Sync + 'static {
    /// Read a value.
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KvError>;

    /// Write a value.
    async fn put(&self, key: &[u8], value: &[u8]) -> Result<(), KvError>;

    /// Remove a value. Missing keys are not an error.
    async fn delete(&self, key: &[u8]) -> Result<(), KvError>;

    /// Apply every operation or none of them.
    async fn batch(&self, ops: Vec<BatchOp>) -> Result<(), KvError>;

    /// Every entry with `start <= key < end`, in key order.
    async fn iterate(&self, start: &[u8], end: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, KvError>;
}

/// In-memory store. Clones share the same map, so a clone outlives the
/// client that used it and can be handed to a new one.
#[derive(Debug, Default, Clone)]
pub struct MemoryKv {
    map: Arc<Mutex<BTreeMap<Vec<u8>, Vec<u8>>>>,
}

impl MemoryKv {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<Vec<u8>, Vec<u8>>> {
        self.map.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KvError> {
        Ok(self.lock().get(key).cloned())
    }

    async fn put(&self, key: &[u8], value: &[u8]) -> Result<(), KvError> {
        self.lock().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    async fn delete(&self, key: &[u8]) -> Result<(), KvError> {
        self.lock().remove(key);
        Ok(())
    }

    async fn batch(&self, ops: Vec<BatchOp>) -> Result<(), KvError> {
        let mut map = self.lock();
        for op in ops {
            match op {
                BatchOp::Put { key, value } => {
                    map.insert(key, value);
                }
                BatchOp::Delete { key } => {
                    map.remove(&key);
                }
            }
        }
        Ok(())
    }

    async fn iterate(&self, start: &[u8], end: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, KvError> {
        if start >= end {
            return Ok(Vec::new());
        }
        Ok(self
            .lock()
            .range(start.to_vec()..end.to_vec())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

/// File-backed store on `redb`.
///
/// redb is synchronous, so every call runs on the blocking pool.
#[derive(Clone)]
pub struct RedbKv {
    db: Arc<Database>,
}

impl std::fmt::Debug for RedbKv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbKv").finish_non_exhaustive()
    }
}

impl RedbKv {
    /// Open (creating if needed) the database file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, KvError> {
        let db = Database::create(path.as_ref())?;

        let txn = db.begin_write()?;
        txn.open_table(TABLE)?;
        txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }

    async fn blocking<R, F>(&self, f: F) -> Result<R, KvError>
    where
        R: Send + 'static,
        F: FnOnce(&Database) -> Result<R, KvError> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || f(&db)).await?
    }
}

#[async_trait]
impl KvStore for RedbKv {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KvError> {
        let key = key.to_vec();
        self.blocking(move |db| {
            let txn = db.begin_read()?;
            let table = txn.open_table(TABLE)?;
            let value = table.get(key.as_slice())?;
            Ok(value.map(|v| v.value().to_vec()))
        })
        .await
    }

    async fn put(&self, key: &[u8], value: &[u8]) -> Result<(), KvError> {
        self.batch(vec![BatchOp::Put {
            key: key.to_vec(),
            value: value.to_vec(),
        }])
        .await
    }

    async fn delete(&self, key: &[u8]) -> Result<(), KvError> {
        self.batch(vec![BatchOp::Delete { key: key.to_vec() }])
            .await
    }

    async fn batch(&self, ops: Vec<BatchOp>) -> Result<(), KvError> {
        self.blocking(move |db| {
            let txn = db.begin_write()?;
            {
                let mut table = txn.open_table(TABLE)?;
                for op in &ops {
                    match op {
                        BatchOp::Put { key, value } => {
                            table.insert(key.as_slice(), value.as_slice())?;
                        }
                        BatchOp::Delete { key } => {
                            table.remove(key.as_slice())?;
                        }
                    }
                }
            }
            Ok(txn.commit()?)
        })
        .await
    }

    async fn iterate(&self, start: &[u8], end: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, KvError> {
        if start >= end {
            return Ok(Vec::new());
        }
        let (start, end) = (start.to_vec(), end.to_vec());
        self.blocking(move |db| {
            let txn = db.begin_read()?;
            let table = txn.open_table(TABLE)?;
            let mut entries = Vec::new();
            for item in table.range::<&[u8]>(start.as_slice()..end.as_slice())? {
                let (k, v) = item?;
                entries.push((k.value().to_vec(), v.value().to_vec()));
            }
            Ok(entries)
        })
        .await
    }
}
