//! Main WebRelay server coordination.
//!
//! WebRelay owns the record store, the blob store and the listener registry,
//! and implements the relay operations independently of HTTP.

use crate::config::Config;
use crate::error::{RelayError, Result};
use crate::storage::{PutOutcome, RecordStats, RecordStore, SqliteStorage};
use crate::subscriptions::SubscriptionRegistry;
use futures_util::{future, stream, Stream, StreamExt, TryStreamExt};
use relay_content::{BlobStore, ByteStream, ContentError, FsStore};
use relay_types::{split_full_path, AuthorId, Record};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Operational metrics for monitoring relay activity.
///
/// All counters are monotonically increasing (reset only on restart).
#[derive(Debug, Default)]
pub struct RelayMetrics {
    /// Total GET requests answered with content.
    pub gets_total: AtomicU64,
    /// Total PUT requests accepted.
    pub puts_accepted: AtomicU64,
    /// Total PUT requests refused because a newer record is stored.
    pub conflicts_total: AtomicU64,
    /// Total PUT requests rejected (bad header, signature, hash or size).
    pub rejections_total: AtomicU64,
    /// Total content bytes received.
    pub bytes_received: AtomicU64,
    /// Total content bytes sent.
    pub bytes_sent: AtomicU64,
    /// Total subscriptions opened.
    pub subscribers_total: AtomicU64,
}

/// Point-in-time relay statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RelayStats {
    /// Stored records.
    pub records: u64,
    /// Distinct authors.
    pub authors: u64,
    /// Blobs on disk.
    pub blobs: u64,
    /// Bytes of blob content on disk.
    pub blob_bytes: u64,
    /// Live subscriptions.
    pub subscriptions: u64,
}

/// Main relay server.
pub struct WebRelay {
    config: Config,
    records: Arc<dyn RecordStore>,
    blobs: Arc<dyn BlobStore>,
    subscriptions: SubscriptionRegistry,
    metrics: Arc<RelayMetrics>,
    started: Instant,
}

impl std::fmt::Debug for WebRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebRelay")
            .field("config", &self.config)
            .field("metrics", &self.metrics)
            .field("subscriptions", &self.subscriptions.listeners())
            .finish_non_exhaustive()
    }
}

impl WebRelay {
    /// Create a relay over the given stores.
    pub fn new(
        config: Config,
        records: impl RecordStore + 'static,
        blobs: impl BlobStore + 'static,
    ) -> Self {
        Self {
            config,
            records: Arc::new(records),
            blobs: Arc::new(blobs),
            subscriptions: SubscriptionRegistry::new(),
            metrics: Arc::new(RelayMetrics::default()),
            started: Instant::now(),
        }
    }

    /// Open the on-disk stores under `config.storage.dir`.
    pub async fn open(config: Config) -> Result<Self> {
        tokio::fs::create_dir_all(&config.storage.dir).await?;
        let records = SqliteStorage::new(&config.storage.records_path()).await?;
        let blobs = FsStore::open(config.storage.content_dir()).await?;

        info!(dir = %config.storage.dir.display(), "Opened relay storage");
        Ok(Self::new(config, records, blobs))
    }

    /// Get the relay configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get access to the operational metrics.
    pub fn metrics(&self) -> &RelayMetrics {
        &self.metrics
    }

    /// Get access to the listener registry.
    pub fn subscriptions(&self) -> &SubscriptionRegistry {
        &self.subscriptions
    }

    /// Time since the relay was created.
    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// Fetch the record at `full_path` and stream its content.
    pub async fn get(&self, full_path: &str) -> Result<(Record, ByteStream)> {
        author_of(full_path)?;
        let record = self
            .records
            .get(full_path)
            .await?
            .ok_or(RelayError::NotFound)?;
        self.touch(full_path).await;

        let body = self.blobs.read(record.hash()).await.map_err(|e| match e {
            ContentError::NotFound { hash } => RelayError::MissingContent { hash },
            other => other.into(),
        })?;

        self.metrics.gets_total.fetch_add(1, Ordering::Relaxed);
        let metrics = Arc::clone(&self.metrics);
        let body: ByteStream = Box::pin(body.inspect_ok(move |chunk| {
            metrics
                .bytes_sent
                .fetch_add(chunk.len() as u64, Ordering::Relaxed);
        }));

        debug!(path = %full_path, timestamp = record.timestamp(), "Serving record");
        Ok((record, body))
    }

    /// Accept a write: `record_header` is the base64 record, `body` the
    /// content it signs.
    pub async fn put(
        &self,
        full_path: &str,
        record_header: Option<&str>,
        body: ByteStream,
    ) -> Result<()> {
        let result = self.try_put(full_path, record_header, body).await;
        match &result {
            Ok(()) => self.metrics.puts_accepted.fetch_add(1, Ordering::Relaxed),
            Err(RelayError::Conflict(_)) => self.metrics.conflicts_total.fetch_add(1, Ordering::Relaxed),
            Err(_) => self.metrics.rejections_total.fetch_add(1, Ordering::Relaxed),
        };
        result
    }

    async fn try_put(
        &self,
        full_path: &str,
        record_header: Option<&str>,
        body: ByteStream,
    ) -> Result<()> {
        let author = author_of(full_path)?;

        let header = record_header
            .filter(|h| !h.is_empty())
            .ok_or(RelayError::MissingRecordHeader)?;
        let record = Record::from_base64(header).map_err(RelayError::MalformedRecord)?;
        if !record.verify(full_path) {
            warn!(path = %full_path, "Rejected record with invalid signature");
            return Err(RelayError::InvalidSignature);
        }

        if let Some(stored) = self.records.get(full_path).await? {
            if stored.timestamp() > record.timestamp() {
                debug!(path = %full_path, "Stored record is newer");
                return Err(RelayError::Conflict(Box::new(stored)));
            }
        }

        let received = self
            .blobs
            .write(record.hash(), body, Some(self.config.storage.max_content_size))
            .await
            .inspect_err(|e| warn!(path = %full_path, error = %e, "Rejected content"))?;
        self.metrics
            .bytes_received
            .fetch_add(received, Ordering::Relaxed);

        if let PutOutcome::Conflict(stored) = self.records.put(full_path, &author, &record).await? {
            debug!(path = %full_path, "Lost race to a newer record");
            return Err(RelayError::Conflict(Box::new(stored)));
        }

        // Concurrent accepts for one key may notify out of order; each
        // subscriber stream drops anything older than what it has seen.
        let notified = self.subscriptions.notify(full_path, &record);
        info!(
            path = %full_path,
            timestamp = record.timestamp(),
            bytes = received,
            notified,
            "Accepted record"
        );
        Ok(())
    }

    /// Register a listener on `full_path`.
    ///
    /// The stream starts with the stored record when it is newer than
    /// `last_known` (a base64 record the subscriber already has), then
    /// yields every accepted write.
    pub async fn subscribe(
        &self,
        full_path: &str,
        last_known: Option<&str>,
    ) -> Result<impl Stream<Item = Record> + Send + 'static> {
        author_of(full_path)?;

        // Register first so no write slips between the read and the listen.
        let listener = self.subscriptions.listen(full_path);
        self.metrics
            .subscribers_total
            .fetch_add(1, Ordering::Relaxed);

        let known = last_known
            .and_then(|header| Record::from_base64(header).ok())
            .map(|record| record.timestamp());
        let current = self.records.get(full_path).await?;
        self.touch(full_path).await;

        let initial = current
            .clone()
            .filter(|record| known.map_or(true, |ts| record.timestamp() > ts));
        let mut newest = current;
        let updates = listener.filter(move |record| {
            let fresh = newest.as_ref().map_or(true, |seen| supersedes(record, seen));
            if fresh {
                newest = Some(record.clone());
            }
            future::ready(fresh)
        });

        Ok(stream::iter(initial).chain(updates))
    }

    /// Counts over both stores and the registry.
    pub async fn stats(&self) -> Result<RelayStats> {
        let RecordStats { records, authors } = self.records.stats().await?;
        let usage = self.blobs.usage().await?;

        Ok(RelayStats {
            records,
            authors,
            blobs: usage.blobs,
            blob_bytes: usage.bytes,
            subscriptions: self.subscriptions.listeners() as u64,
        })
    }

    async fn touch(&self, full_path: &str) {
        if let Err(e) = self.records.touch(full_path).await {
            warn!(path = %full_path, error = %e, "Failed to record read time");
        }
    }
}

/// Whether `record` should reach a subscriber that last saw `seen`.
///
/// Equal timestamps count when the records differ, matching the store's
/// acceptance rule.
fn supersedes(record: &Record, seen: &Record) -> bool {
    record.timestamp() > seen.timestamp()
        || (record.timestamp() == seen.timestamp() && record != seen)
}

/// The author named by the first segment of `full_path`.
pub fn author_of(full_path: &str) -> Result<AuthorId> {
    split_full_path(full_path)
        .map(|(author, _)| author)
        .map_err(|_| RelayError::InvalidUserId(full_path.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use relay_content::{bytes_stream, collect_stream, MemoryStore};
    use relay_types::{full_path, signing_key_from_seed, RecordOptions, SigningKey};
    use std::io;

    fn author() -> SigningKey {
        signing_key_from_seed(&[0u8; 32])
    }

    fn signed(path: &str, content: &[u8], timestamp: u64) -> (String, Record) {
        let key = author();
        let full = full_path(&AuthorId::from_signing_key(&key), path);
        let record = Record::create(
            &key,
            &full,
            content,
            RecordOptions {
                timestamp: Some(timestamp),
                metadata: None,
            },
        )
        .unwrap();
        (full, record)
    }

    fn test_config() -> Config {
        let mut config = Config::default();
        config.storage.max_content_size = 16;
        config
    }

    async fn test_relay() -> (WebRelay, SqliteStorage, MemoryStore) {
        let records = SqliteStorage::in_memory().await.unwrap();
        let blobs = MemoryStore::new();
        let relay = WebRelay::new(test_config(), records.clone(), blobs.clone());
        (relay, records, blobs)
    }

    fn unreadable_body() -> ByteStream {
        Box::pin(stream::once(async {
            Err::<Bytes, _>(io::Error::other("body was read"))
        }))
    }

    #[tokio::test]
    async fn put_then_get() {
        let (relay, _, _) = test_relay().await;
        let (full, record) = signed("/foo", b"bar", 1_000);

        relay
            .put(&full, Some(record.to_base64()), bytes_stream(&b"bar"[..]))
            .await
            .unwrap();

        let (stored, body) = relay.get(&full).await.unwrap();
        assert_eq!(stored, record);
        assert_eq!(collect_stream(body).await.unwrap(), b"bar");

        let m = relay.metrics();
        assert_eq!(m.puts_accepted.load(Ordering::Relaxed), 1);
        assert_eq!(m.bytes_received.load(Ordering::Relaxed), 3);
        assert_eq!(m.bytes_sent.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn get_missing_is_not_found() {
        let (relay, _, _) = test_relay().await;
        let (full, _) = signed("/nothing", b"", 1);
        assert!(matches!(relay.get(&full).await, Err(RelayError::NotFound)));
    }

    #[tokio::test]
    async fn record_without_blob_is_integrity_fault() {
        let (relay, records, _) = test_relay().await;
        let (full, record) = signed("/foo", b"bar", 1_000);
        records
            .put(&full, &AuthorId::from_signing_key(&author()), &record)
            .await
            .unwrap();

        assert!(matches!(
            relay.get(&full).await,
            Err(RelayError::MissingContent { .. })
        ));
    }

    #[tokio::test]
    async fn invalid_user_id() {
        let (relay, _, _) = test_relay().await;
        assert!(matches!(
            relay.get("nobody/foo").await,
            Err(RelayError::InvalidUserId(_))
        ));
        assert!(matches!(
            relay.put("nobody/foo", None, unreadable_body()).await,
            Err(RelayError::InvalidUserId(_))
        ));
    }

    #[tokio::test]
    async fn missing_or_malformed_header() {
        let (relay, _, _) = test_relay().await;
        let (full, _) = signed("/foo", b"bar", 1_000);

        assert!(matches!(
            relay.put(&full, None, unreadable_body()).await,
            Err(RelayError::MissingRecordHeader)
        ));
        assert!(matches!(
            relay.put(&full, Some(""), unreadable_body()).await,
            Err(RelayError::MissingRecordHeader)
        ));
        assert!(matches!(
            relay.put(&full, Some("AAAA"), unreadable_body()).await,
            Err(RelayError::MalformedRecord(_))
        ));
        assert_eq!(relay.metrics().rejections_total.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn signature_must_match_path() {
        let (relay, _, _) = test_relay().await;
        let (full, _) = signed("/foo", b"bar", 1_000);
        let (_, other) = signed("/other", b"bar", 1_000);

        assert!(matches!(
            relay.put(&full, Some(other.to_base64()), bytes_stream(&b"bar"[..])).await,
            Err(RelayError::InvalidSignature)
        ));
    }

    #[tokio::test]
    async fn older_record_conflicts_with_stored() {
        let (relay, _, _) = test_relay().await;
        let (full, newer) = signed("/foo", b"new", 20_000_000);
        let (_, older) = signed("/foo", b"old", 10_000_000);

        relay
            .put(&full, Some(newer.to_base64()), bytes_stream(&b"new"[..]))
            .await
            .unwrap();
        let result = relay
            .put(&full, Some(older.to_base64()), unreadable_body())
            .await;

        match result {
            Err(RelayError::Conflict(stored)) => assert_eq!(*stored, newer),
            other => panic!("expected conflict, got {other:?}"),
        }
        assert_eq!(relay.metrics().conflicts_total.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn oversized_content_rejected() {
        let (relay, records, blobs) = test_relay().await;
        let content = vec![7u8; 17];
        let (full, record) = signed("/big", &content, 1_000);

        let result = relay
            .put(&full, Some(record.to_base64()), bytes_stream(content))
            .await;

        assert!(matches!(
            result,
            Err(RelayError::Content(ContentError::TooLarge { limit: 16 }))
        ));
        assert!(records.get(&full).await.unwrap().is_none());
        assert!(blobs.is_empty());
    }

    #[tokio::test]
    async fn content_must_match_hash() {
        let (relay, records, _) = test_relay().await;
        let (full, record) = signed("/foo", b"bar", 1_000);

        let result = relay
            .put(&full, Some(record.to_base64()), bytes_stream(&b"baz"[..]))
            .await;

        assert!(matches!(
            result,
            Err(RelayError::Content(ContentError::HashMismatch { .. }))
        ));
        assert!(records.get(&full).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn existing_blob_is_not_restreamed() {
        let (relay, _, _) = test_relay().await;
        let (a, first) = signed("/a", b"same", 1_000);
        let (b, second) = signed("/b", b"same", 1_000);

        relay
            .put(&a, Some(first.to_base64()), bytes_stream(&b"same"[..]))
            .await
            .unwrap();
        relay
            .put(&b, Some(second.to_base64()), unreadable_body())
            .await
            .unwrap();

        let (_, body) = relay.get(&b).await.unwrap();
        assert_eq!(collect_stream(body).await.unwrap(), b"same");
    }

    #[tokio::test]
    async fn subscriber_sees_each_accepted_write() {
        let (relay, _, _) = test_relay().await;
        let (full, first) = signed("/foo", b"1", 1_000);
        let (_, second) = signed("/foo", b"2", 2_000);

        let mut updates = Box::pin(relay.subscribe(&full, None).await.unwrap());
        relay
            .put(&full, Some(first.to_base64()), bytes_stream(&b"1"[..]))
            .await
            .unwrap();
        relay
            .put(&full, Some(second.to_base64()), bytes_stream(&b"2"[..]))
            .await
            .unwrap();

        assert_eq!(updates.next().await, Some(first));
        assert_eq!(updates.next().await, Some(second));
    }

    #[tokio::test]
    async fn late_notification_of_older_write_is_dropped() {
        let (relay, _, _) = test_relay().await;
        let (full, first) = signed("/foo", b"1", 1_000);
        let (_, second) = signed("/foo", b"2", 2_000);
        let (_, third) = signed("/foo", b"3", 3_000);

        let mut updates = Box::pin(relay.subscribe(&full, None).await.unwrap());
        relay
            .put(&full, Some(second.to_base64()), bytes_stream(&b"2"[..]))
            .await
            .unwrap();
        // An accept of `first` that lost the race notifies after `second`
        assert_eq!(relay.subscriptions().notify(&full, &first), 1);
        relay.subscriptions().notify(&full, &second);
        relay
            .put(&full, Some(third.to_base64()), bytes_stream(&b"3"[..]))
            .await
            .unwrap();

        assert_eq!(updates.next().await, Some(second));
        assert_eq!(updates.next().await, Some(third));
    }

    #[tokio::test]
    async fn late_subscriber_gets_current_record() {
        let (relay, _, _) = test_relay().await;
        let (full, record) = signed("/foo", b"bar", 1_000);
        relay
            .put(&full, Some(record.to_base64()), bytes_stream(&b"bar"[..]))
            .await
            .unwrap();

        let mut updates = Box::pin(relay.subscribe(&full, None).await.unwrap());
        assert_eq!(updates.next().await, Some(record));
    }

    #[tokio::test]
    async fn up_to_date_subscriber_gets_no_replay() {
        let (relay, _, _) = test_relay().await;
        let (full, record) = signed("/foo", b"bar", 1_000);
        let (_, newer) = signed("/foo", b"baz", 2_000);
        relay
            .put(&full, Some(record.to_base64()), bytes_stream(&b"bar"[..]))
            .await
            .unwrap();

        let mut updates = Box::pin(
            relay
                .subscribe(&full, Some(record.to_base64()))
                .await
                .unwrap(),
        );
        relay
            .put(&full, Some(newer.to_base64()), bytes_stream(&b"baz"[..]))
            .await
            .unwrap();

        // First item is the new write, not a replay
        assert_eq!(updates.next().await, Some(newer));
    }

    #[tokio::test]
    async fn dropping_stream_removes_listener() {
        let (relay, _, _) = test_relay().await;
        let (full, _) = signed("/foo", b"bar", 1_000);

        let updates = relay.subscribe(&full, None).await.unwrap();
        assert_eq!(relay.subscriptions().listeners(), 1);

        drop(updates);
        assert_eq!(relay.subscriptions().listeners(), 0);
        assert_eq!(relay.subscriptions().keys(), 0);
    }

    #[tokio::test]
    async fn stats_cover_both_stores() {
        let (relay, _, _) = test_relay().await;
        let (a, first) = signed("/a", b"one", 1_000);
        let (b, second) = signed("/b", b"two", 1_000);
        relay
            .put(&a, Some(first.to_base64()), bytes_stream(&b"one"[..]))
            .await
            .unwrap();
        relay
            .put(&b, Some(second.to_base64()), bytes_stream(&b"two"[..]))
            .await
            .unwrap();
        let _listener = relay.subscribe(&a, None).await.unwrap();

        let stats = relay.stats().await.unwrap();
        assert_eq!(
            stats,
            RelayStats {
                records: 2,
                authors: 1,
                blobs: 2,
                blob_bytes: 6,
                subscriptions: 1,
            }
        );
    }

    #[tokio::test]
    async fn open_creates_storage_layout() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage.dir = dir.path().join("relay");

        let relay = WebRelay::open(config).await.unwrap();
        let (full, record) = signed("/foo", b"bar", 1_000);
        relay
            .put(&full, Some(record.to_base64()), bytes_stream(&b"bar"[..]))
            .await
            .unwrap();

        assert!(dir.path().join("relay/records.db").exists());
        assert!(dir
            .path()
            .join("relay/content")
            .join(record.hash_hex())
            .exists());
    }
}
