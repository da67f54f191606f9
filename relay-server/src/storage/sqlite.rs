//! SQLite storage backend for web-relay.

use super::{PutOutcome, RecordStats, RecordStore};
use crate::error::StorageError;
use async_trait::async_trait;
use relay_types::{AuthorId, Record};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

/// SQLite-based record storage.
///
/// Uses WAL mode for concurrent reads/writes.
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl std::fmt::Debug for SqliteStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStorage").finish_non_exhaustive()
    }
}

impl SqliteStorage {
    /// Create a new SQLite storage from a database path.
    ///
    /// Creates the database file if it doesn't exist.
    pub async fn new(path: &Path) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await
            .map_err(StorageError::Database)?;

        let storage = Self { pool };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Create an in-memory SQLite storage (for testing).
    pub async fn in_memory() -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(":memory:")
            .map_err(StorageError::Database)?
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(StorageError::Database)?;

        let storage = Self { pool };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Run database migrations.
    async fn run_migrations(&self) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS records (
                key TEXT PRIMARY KEY,
                author TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                record BLOB NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS last_queried (
                key TEXT PRIMARY KEY,
                queried_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_records_author ON records(author)")
            .execute(&self.pool)
            .await
            .map_err(StorageError::Database)?;

        Ok(())
    }

    /// When `key` was last read (unix seconds), if ever.
    pub async fn last_queried(&self, key: &str) -> Result<Option<i64>, StorageError> {
        sqlx::query_scalar("SELECT queried_at FROM last_queried WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::Database)
    }

    fn current_timestamp() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }
}

fn decode(key: &str, bytes: &[u8]) -> Result<Record, StorageError> {
    Record::decode(bytes).map_err(|source| StorageError::CorruptRecord {
        key: key.to_string(),
        source,
    })
}

#[async_trait]
impl RecordStore for SqliteStorage {
    async fn get(&self, key: &str) -> Result<Option<Record>, StorageError> {
        let bytes: Option<Vec<u8>> = sqlx::query_scalar("SELECT record FROM records WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::Database)?;

        bytes.map(|b| decode(key, &b)).transpose()
    }

    async fn put(
        &self,
        key: &str,
        author: &AuthorId,
        record: &Record,
    ) -> Result<PutOutcome, StorageError> {
        // Last write wins; an equal timestamp replaces.
        let result = sqlx::query(
            r#"
            INSERT INTO records (key, author, timestamp, record)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(key) DO UPDATE SET
                author = excluded.author,
                timestamp = excluded.timestamp,
                record = excluded.record
            WHERE excluded.timestamp >= records.timestamp
            "#,
        )
        .bind(key)
        .bind(author.to_string())
        .bind(record.timestamp() as i64)
        .bind(record.as_bytes())
        .execute(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        if result.rows_affected() > 0 {
            return Ok(PutOutcome::Accepted);
        }

        match self.get(key).await? {
            Some(stored) => Ok(PutOutcome::Conflict(stored)),
            // Deleted between the two statements; nothing newer remains.
            None => self.put(key, author, record).await,
        }
    }

    async fn touch(&self, key: &str) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO last_queried (key, queried_at)
            VALUES (?1, ?2)
            ON CONFLICT(key) DO UPDATE SET queried_at = excluded.queried_at
            "#,
        )
        .bind(key)
        .bind(Self::current_timestamp())
        .execute(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        Ok(())
    }

    async fn stats(&self) -> Result<RecordStats, StorageError> {
        let (records, authors): (i64, i64) =
            sqlx::query_as("SELECT COUNT(*), COUNT(DISTINCT author) FROM records")
                .fetch_one(&self.pool)
                .await
                .map_err(StorageError::Database)?;

        Ok(RecordStats {
            records: records as u64,
            authors: authors as u64,
        })
    }
}
