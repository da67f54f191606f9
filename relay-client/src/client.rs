//! Client - the offline-first sync engine.
//!
//! This module provides [`Client`], the API applications use to publish and
//! read signed entries.
//!
//! # Architecture
//!
//! Every write lands in local storage first, as one atomic batch (record,
//! blob and pending-write marker), then a per-path delivery task pushes it to
//! the relay, retrying with exponential backoff until the relay gives a
//! definitive answer.
//!
//! ```text
//! put/delete → KvStore (records!, blobs!, pending-records!)
//!                  ↓
//!            delivery task ── PUT ──→ relay
//!                  ↓ 2xx / 409 / 4xx
//!            pending marker cleared
//! ```
//!
//! Reads are local-first: a cached record answers immediately while a relay
//! fetch runs in the background and refreshes the cache if the relay holds
//! something newer. Relay responses are verified (signature and digest)
//! before anything is cached.
//!
//! # Example
//!
//! ```ignore
//! use web_relay_client::{Client, ClientConfig, HttpTransport, MemoryKv, PutOptions};
//!
//! let key = relay_types::generate_signing_key();
//! let config = ClientConfig::new().with_relay("http://localhost:3000");
//! let client = Client::new(key, MemoryKv::new(), HttpTransport::new(), config);
//!
//! client.put("/foo", b"bar", PutOptions::default()).await?;
//! let value = client.get("/foo", GetOptions::default()).await?;
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use ed25519_dalek::VerifyingKey;
use futures_util::StreamExt;
use relay_content::{decrypt, derive_key, encrypt, ContentError};
use relay_core::keys::{self, blob_key, pending_key, record_key};
use relay_core::{encode_path, relay_origin, validate_path, Backoff, SlashUrl, UrlError};
use relay_types::{
    absolute_path, full_path, now_millis, AuthorId, Record, RecordError, RecordOptions, SigningKey,
};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::{oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::kv::{BatchOp, KvError, KvStore};
use crate::subscriptions::SubscriptionRegistry;
use crate::transport::{Request, Transport, TransportError};

/// Default cap on concurrently open subscription listeners.
pub const DEFAULT_MAX_SUBSCRIPTIONS: usize = 100;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Path is empty or contains `?` or `#`, or names another author's entry
    /// where only local entries are allowed.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Record error.
    #[error("record error: {0}")]
    Record(#[from] RecordError),

    /// Content error (encryption, decryption).
    #[error("content error: {0}")]
    Content(#[from] ContentError),

    /// Shareable URL could not be parsed.
    #[error("url error: {0}")]
    Url(#[from] UrlError),

    /// Local storage error.
    #[error("storage error: {0}")]
    Storage(#[from] KvError),

    /// Transport error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The relay refused the write with a terminal 4xx status.
    #[error("relay rejected write with status {status}")]
    Rejected {
        /// HTTP status returned by the relay.
        status: u16,
    },

    /// The operation needs a relay and none is configured.
    #[error("no relay configured")]
    NoRelay,

    /// Too many distinct subscriptions are open.
    #[error("too many subscriptions (limit {limit})")]
    MaxSubscriptions {
        /// Configured maximum.
        limit: usize,
    },

    /// The client was closed or a newer write superseded this one.
    #[error("operation cancelled")]
    Cancelled,
}

/// Configuration for [`Client`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Relay address (origin); `None` keeps the client local-only.
    pub relay: Option<String>,
    /// Always wait for the relay on reads instead of answering from cache.
    pub skip_cache: bool,
    /// Trust relays: skip signature checks on fetched records. Digests are
    /// still checked.
    pub skip_record_verification: bool,
    /// Maximum number of distinct subscription listeners.
    pub max_subscriptions: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            relay: None,
            skip_cache: false,
            skip_record_verification: false,
            max_subscriptions: DEFAULT_MAX_SUBSCRIPTIONS,
        }
    }
}

impl ClientConfig {
    /// Create a local-only configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the relay address. Query, fragment and trailing slash are dropped.
    pub fn with_relay(mut self, relay: impl AsRef<str>) -> Self {
        self.relay = Some(relay_origin(relay.as_ref()));
        self
    }

    /// Set whether reads always wait for the relay.
    pub fn with_skip_cache(mut self, skip_cache: bool) -> Self {
        self.skip_cache = skip_cache;
        self
    }

    /// Set whether fetched records skip signature verification.
    pub fn with_skip_record_verification(mut self, skip: bool) -> Self {
        self.skip_record_verification = skip;
        self
    }

    /// Set the subscription listener cap.
    pub fn with_max_subscriptions(mut self, max: usize) -> Self {
        self.max_subscriptions = max;
        self
    }
}

/// Options for [`Client::put`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PutOptions {
    /// Encrypt the content with the path-derived key.
    pub encrypt: bool,
    /// Wait until the relay accepts or definitively rejects the write.
    pub await_relay_sync: bool,
}

/// Options for [`Client::delete`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DeleteOptions {
    /// Wait until the relay accepts or definitively rejects the deletion.
    pub await_relay_sync: bool,
}

/// Options for [`Client::get`].
#[derive(Debug, Clone, Copy, Default)]
pub struct GetOptions {
    /// Ignore the local cache and wait for the relay.
    pub skip_cache: bool,
}

/// A resolved read or write target.
#[derive(Clone)]
pub(crate) struct Target {
    pub(crate) author: AuthorId,
    pub(crate) path: String,
    pub(crate) full_path: String,
    pub(crate) relay: Option<String>,
    pub(crate) encryption_key: Option<[u8; 32]>,
}

/// Whether a delivery task's record is still the one waiting to be sent.
enum PendingState {
    Current,
    Superseded,
    Gone,
}

struct Retry {
    id: u64,
    timestamp: u64,
    cancel: CancellationToken,
}

pub(crate) struct Inner<S, T> {
    key: SigningKey,
    id: AuthorId,
    pub(crate) config: ClientConfig,
    store: S,
    pub(crate) transport: T,
    retries: Mutex<HashMap<String, Retry>>,
    next_retry: AtomicU64,
    last_timestamp: AtomicU64,
    pending_lock: tokio::sync::Mutex<()>,
    pub(crate) subscriptions: Arc<SubscriptionRegistry>,
    pub(crate) shutdown: CancellationToken,
    settled: watch::Receiver<bool>,
}

/// The offline-first sync client.
///
/// Cheap to clone; clones share storage, retry timers and subscriptions.
pub struct Client<S: KvStore, T: Transport> {
    pub(crate) inner: Arc<Inner<S, T>>,
}

impl<S: KvStore, T: Transport> Clone for Client<S, T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: KvStore, T: Transport> std::fmt::Debug for Client<S, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("id", &self.inner.id)
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl<S: KvStore, T: Transport> Client<S, T> {
    /// Create a client.
    ///
    /// When a relay is configured, pending writes left by a previous session
    /// are replayed in the background; see [`Client::settled`]. In that case
    /// this must be called from within a Tokio runtime.
    pub fn new(key: SigningKey, store: S, transport: T, mut config: ClientConfig) -> Self {
        config.relay = config.relay.as_deref().map(relay_origin);
        let has_relay = config.relay.is_some();
        let (settled_tx, settled_rx) = watch::channel(!has_relay);

        let inner = Arc::new(Inner {
            id: AuthorId::from_signing_key(&key),
            key,
            config,
            store,
            transport,
            retries: Mutex::new(HashMap::new()),
            next_retry: AtomicU64::new(0),
            last_timestamp: AtomicU64::new(0),
            pending_lock: tokio::sync::Mutex::new(()),
            subscriptions: Arc::new(SubscriptionRegistry::new()),
            shutdown: CancellationToken::new(),
            settled: settled_rx,
        });
        info!(id = %inner.id, relay = ?inner.config.relay, "Client started");

        if has_relay {
            let replay = Arc::clone(&inner);
            tokio::spawn(async move {
                replay.send_pending().await;
                let _ = settled_tx.send(true);
            });
        }

        Self { inner }
    }

    /// This client's author id.
    pub fn id(&self) -> AuthorId {
        self.inner.id
    }

    /// This client's public key.
    pub fn key(&self) -> VerifyingKey {
        self.inner.key.verifying_key()
    }

    /// Base URL of this client: `slash:<id>/?relay=<relay>`.
    pub fn url(&self) -> String {
        SlashUrl::new(self.inner.id, "/")
            .with_relay(self.inner.config.relay.as_deref())
            .to_string()
    }

    /// The configuration in effect.
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Write `content` at `path`.
    ///
    /// Returns once the write is stored locally, or, with
    /// `await_relay_sync`, once the relay has accepted it (or refused it with
    /// a terminal status).
    pub async fn put(&self, path: &str, content: &[u8], opts: PutOptions) -> Result<(), ClientError> {
        let target = self.inner.resolve_local(path)?;

        let content = if opts.encrypt {
            encrypt(content, &self.inner.encryption_key(&target.path))?
        } else {
            content.to_vec()
        };
        let metadata = json!({ "encrypted": opts.encrypt });

        self.inner
            .write(target.full_path, content, Some(metadata), opts.await_relay_sync)
            .await
    }

    /// Delete the entry at `path`.
    ///
    /// A deletion is a signed record over empty content; reads see `None`.
    pub async fn delete(&self, path: &str, opts: DeleteOptions) -> Result<(), ClientError> {
        let target = self.inner.resolve_local(path)?;
        self.inner
            .write(target.full_path, Vec::new(), None, opts.await_relay_sync)
            .await
    }

    /// Read the entry at `path` (a local path or a `slash:` URL).
    ///
    /// A cached entry is returned immediately unless `skip_cache` is set;
    /// otherwise the relay is awaited. Deleted or unknown entries read as
    /// `None`.
    pub async fn get(&self, path: &str, opts: GetOptions) -> Result<Option<Vec<u8>>, ClientError> {
        let target = self.inner.resolve(path)?;
        let cached = self.inner.stored_record(&target.full_path).await?;

        let inner = Arc::clone(&self.inner);
        let fetch_target = target.clone();
        let fetch = tokio::spawn(async move { inner.get_from_relay(&fetch_target).await });

        let skip_cache = opts.skip_cache || self.inner.config.skip_cache;
        match cached {
            Some(record) if !skip_cache => self.inner.read_cached(&target, &record).await,
            _ => fetch.await.map_err(|_| ClientError::Cancelled)?,
        }
    }

    /// A shareable URL for `path`.
    ///
    /// If the stored entry is encrypted, the URL carries its key in the
    /// fragment.
    pub async fn create_url(&self, path: &str) -> Result<String, ClientError> {
        let target = self.inner.resolve_local(path)?;
        let record = self.inner.stored_record(&target.full_path).await?;

        let key = record
            .filter(Record::is_encrypted)
            .map(|_| self.inner.encryption_key(&target.path));

        Ok(SlashUrl::new(self.inner.id, &target.path)
            .with_relay(self.inner.config.relay.as_deref())
            .with_encryption_key(key)
            .to_string())
    }

    /// Wait until every pending write found at startup has been delivered
    /// or definitively rejected.
    pub async fn settled(&self) {
        let mut settled = self.inner.settled.clone();
        let _ = settled.wait_for(|done| *done).await;
    }

    /// Number of writes with a scheduled or in-flight delivery.
    pub fn pending_deliveries(&self) -> usize {
        self.inner.retries().len()
    }

    /// Cancel every retry timer and close every subscription.
    ///
    /// Local data is kept. Calling `close` more than once is harmless.
    pub fn close(&self) {
        if self.inner.shutdown.is_cancelled() {
            return;
        }
        self.inner.shutdown.cancel();
        self.inner.retries().clear();
        self.inner.subscriptions.close_all();
        info!(id = %self.inner.id, "Client closed");
    }
}

impl<S: KvStore, T: Transport> Inner<S, T> {
    fn retries(&self) -> MutexGuard<'_, HashMap<String, Retry>> {
        self.retries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Resolve a local path or `slash:` URL.
    pub(crate) fn resolve(&self, path: &str) -> Result<Target, ClientError> {
        if SlashUrl::is_url(path) {
            let url = SlashUrl::parse(path)?;
            validate_path(&url.path).map_err(|_| ClientError::InvalidPath(url.path.clone()))?;
            // A URL without a relay falls back to ours.
            let relay = url
                .relay
                .as_deref()
                .map(relay_origin)
                .or_else(|| self.config.relay.clone());
            return Ok(Target {
                full_path: url.full_path(),
                author: url.author,
                path: url.path,
                relay,
                encryption_key: url.encryption_key,
            });
        }

        validate_path(path).map_err(|_| ClientError::InvalidPath(path.to_string()))?;
        let path = absolute_path(path);
        Ok(Target {
            full_path: full_path(&self.id, &path),
            author: self.id,
            path,
            relay: self.config.relay.clone(),
            encryption_key: None,
        })
    }

    /// Resolve a target this client may write to.
    fn resolve_local(&self, path: &str) -> Result<Target, ClientError> {
        let target = self.resolve(path)?;
        if target.author != self.id {
            return Err(ClientError::InvalidPath(path.to_string()));
        }
        Ok(target)
    }

    fn encryption_key(&self, path: &str) -> [u8; 32] {
        let secret = Zeroizing::new(self.key.to_keypair_bytes());
        derive_key(secret.as_slice(), &absolute_path(path))
    }

    /// Strictly increasing per client and past `floor`, so a write never
    /// ties with the one before it, even one made by an earlier process.
    fn next_timestamp(&self, floor: u64) -> u64 {
        let now = now_millis().max(floor.saturating_add(1));
        let prev = self
            .last_timestamp
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or_else(|prev| prev);
        now.max(prev + 1)
    }

    async fn write(
        self: &Arc<Self>,
        full_path: String,
        content: Vec<u8>,
        metadata: Option<Value>,
        await_relay_sync: bool,
    ) -> Result<(), ClientError> {
        let record = self.persist_local(&full_path, &content, metadata).await?;
        debug!(path = %full_path, timestamp = record.timestamp(), "Stored local write");

        if self.config.relay.is_none() {
            return if await_relay_sync {
                Err(ClientError::NoRelay)
            } else {
                Ok(())
            };
        }
        if self.shutdown.is_cancelled() {
            return if await_relay_sync {
                Err(ClientError::Cancelled)
            } else {
                Ok(())
            };
        }

        if !await_relay_sync {
            self.schedule_delivery(full_path, record, Bytes::from(content), None);
            return Ok(());
        }

        let (tx, rx) = oneshot::channel();
        self.schedule_delivery(full_path, record, Bytes::from(content), Some(tx));
        rx.await.map_err(|_| ClientError::Cancelled)?
    }

    /// Sign a new record and store it with its pending marker and blob in
    /// one batch.
    ///
    /// The timestamp is taken under `pending_lock` and lands past whatever
    /// is stored for the path, so a cached relay record with a later clock
    /// cannot shadow the write.
    async fn persist_local(
        &self,
        full_path: &str,
        content: &[u8],
        metadata: Option<Value>,
    ) -> Result<Record, ClientError> {
        let _guard = self.pending_lock.lock().await;
        let floor = self
            .stored_record(full_path)
            .await?
            .map_or(0, |stored| stored.timestamp());
        let record = Record::create(
            &self.key,
            full_path,
            content,
            RecordOptions {
                timestamp: Some(self.next_timestamp(floor)),
                metadata,
            },
        )?;

        self.store
            .batch(vec![
                BatchOp::Put {
                    key: record_key(full_path),
                    value: record.as_bytes().to_vec(),
                },
                BatchOp::Put {
                    key: pending_key(full_path),
                    value: record.as_bytes().to_vec(),
                },
                BatchOp::Put {
                    key: blob_key(record.hash()),
                    value: content.to_vec(),
                },
            ])
            .await?;
        Ok(record)
    }

    /// Record and blob fetched from a relay. No pending marker.
    ///
    /// Runs under `pending_lock` against what is stored now, not what was
    /// stored when the fetch started. Only a strictly newer record is
    /// written; otherwise the stored record and its content are returned.
    async fn cache_remote(
        &self,
        full_path: &str,
        record: &Record,
        content: &[u8],
    ) -> Result<Option<(Record, Vec<u8>)>, ClientError> {
        let _guard = self.pending_lock.lock().await;
        if let Some(stored) = self.stored_record(full_path).await? {
            if stored.timestamp() >= record.timestamp() {
                if let Some(stored_content) = self.store.get(&blob_key(stored.hash())).await? {
                    return Ok(Some((stored, stored_content)));
                }
            }
        }

        self.store
            .batch(vec![
                BatchOp::Put {
                    key: record_key(full_path),
                    value: record.as_bytes().to_vec(),
                },
                BatchOp::Put {
                    key: blob_key(record.hash()),
                    value: content.to_vec(),
                },
            ])
            .await?;
        Ok(None)
    }

    pub(crate) async fn stored_record(&self, full_path: &str) -> Result<Option<Record>, ClientError> {
        let Some(bytes) = self.store.get(&record_key(full_path)).await? else {
            return Ok(None);
        };
        match Record::decode(&bytes) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!(path = %full_path, error = %e, "Discarding unreadable cached record");
                Ok(None)
            }
        }
    }

    async fn read_cached(
        &self,
        target: &Target,
        record: &Record,
    ) -> Result<Option<Vec<u8>>, ClientError> {
        match self.store.get(&blob_key(record.hash())).await? {
            Some(content) => self.open_content(target, record, content),
            None => Ok(None),
        }
    }

    /// Turn stored bytes into what the caller sees.
    ///
    /// Empty content is a deletion. Encrypted content is decrypted with the
    /// URL key, or the derived key for our own entries; without either the
    /// ciphertext is returned as is.
    fn open_content(
        &self,
        target: &Target,
        record: &Record,
        content: Vec<u8>,
    ) -> Result<Option<Vec<u8>>, ClientError> {
        if content.is_empty() {
            return Ok(None);
        }
        if !record.is_encrypted() {
            return Ok(Some(content));
        }

        let key = match target.encryption_key {
            Some(key) => Some(key),
            None if target.author == self.id => Some(self.encryption_key(&target.path)),
            None => None,
        };
        match key {
            Some(key) => Ok(Some(decrypt(&content, &key)?)),
            None => Ok(Some(content)),
        }
    }

    /// Fetch `target` from its relay and verify it.
    ///
    /// Any network or verification failure reads as a miss. A verified
    /// record newer than the stored one is cached; if the store already
    /// holds something at least as new, that is what the caller gets.
    pub(crate) async fn get_from_relay(
        &self,
        target: &Target,
    ) -> Result<Option<Vec<u8>>, ClientError> {
        let Some(relay) = target.relay.as_deref() else {
            return Ok(None);
        };
        let url = relay_url(relay, &target.full_path);

        let response = match self.transport.request(Request::get(url)).await {
            Ok(response) => response,
            Err(e) => {
                debug!(path = %target.full_path, error = %e, "Relay fetch failed");
                return Ok(None);
            }
        };
        if !response.is_success() {
            debug!(path = %target.full_path, status = response.status, "Relay has no entry");
            return Ok(None);
        }

        let record = match response.record.as_deref().map(Record::from_base64) {
            Some(Ok(record)) => record,
            Some(Err(e)) => {
                warn!(path = %target.full_path, error = %e, "Relay sent a malformed record");
                return Ok(None);
            }
            None => {
                warn!(path = %target.full_path, "Relay response is missing the record header");
                return Ok(None);
            }
        };
        if !self.config.skip_record_verification && !record.verify(&target.full_path) {
            warn!(path = %target.full_path, "Relay sent a record with an invalid signature");
            return Ok(None);
        }

        let mut hasher = blake3::Hasher::new();
        let mut content = Vec::new();
        let mut body = response.body;
        while let Some(chunk) = body.next().await {
            match chunk {
                Ok(chunk) => {
                    hasher.update(&chunk);
                    content.extend_from_slice(&chunk);
                }
                Err(e) => {
                    debug!(path = %target.full_path, error = %e, "Relay body interrupted");
                    return Ok(None);
                }
            }
        }
        if hasher.finalize().as_bytes() != record.hash() {
            warn!(path = %target.full_path, "Relay sent content that does not match its record");
            return Ok(None);
        }

        match self.cache_remote(&target.full_path, &record, &content).await {
            Ok(Some((stored, stored_content))) => {
                debug!(
                    path = %target.full_path,
                    fetched = record.timestamp(),
                    stored = stored.timestamp(),
                    "Kept newer stored record over relay copy"
                );
                return self.open_content(target, &stored, stored_content);
            }
            Ok(None) => {}
            Err(e) => {
                warn!(path = %target.full_path, error = %e, "Failed to cache relay record");
            }
        }

        self.open_content(target, &record, content)
    }

    /// Start (or restart) delivery of `record` for `full_path`.
    ///
    /// At most one task per path: a newer record cancels the older task's
    /// timer; an older record never displaces a newer one.
    fn schedule_delivery(
        self: &Arc<Self>,
        full_path: String,
        record: Record,
        content: Bytes,
        notify: Option<oneshot::Sender<Result<(), ClientError>>>,
    ) {
        let id = self.next_retry.fetch_add(1, Ordering::Relaxed);
        let cancel = self.shutdown.child_token();
        {
            let mut retries = self.retries();
            if let Some(existing) = retries.get(&full_path) {
                if existing.timestamp > record.timestamp() {
                    if let Some(tx) = notify {
                        let _ = tx.send(Err(ClientError::Cancelled));
                    }
                    return;
                }
                existing.cancel.cancel();
            }
            retries.insert(
                full_path.clone(),
                Retry {
                    id,
                    timestamp: record.timestamp(),
                    cancel: cancel.clone(),
                },
            );
        }

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let result = inner.deliver(&full_path, &record, content, &cancel).await;
            inner.finish_delivery(&full_path, id);
            if let Err(e) = &result {
                debug!(path = %full_path, error = %e, "Delivery ended");
            }
            if let Some(tx) = notify {
                let _ = tx.send(result);
            }
        });
    }

    fn finish_delivery(&self, full_path: &str, id: u64) {
        let mut retries = self.retries();
        if retries.get(full_path).is_some_and(|r| r.id == id) {
            retries.remove(full_path);
        }
    }

    async fn deliver(
        &self,
        full_path: &str,
        record: &Record,
        content: Bytes,
        cancel: &CancellationToken,
    ) -> Result<(), ClientError> {
        let relay = self.config.relay.as_deref().ok_or(ClientError::NoRelay)?;
        let url = relay_url(relay, full_path);
        let mut backoff = Backoff::new();

        loop {
            match self.pending_state(full_path, record.timestamp()).await? {
                PendingState::Current => {}
                PendingState::Gone => return Ok(()),
                PendingState::Superseded => return Err(ClientError::Cancelled),
            }

            let request = Request::put(url.as_str(), record.to_base64(), content.clone());
            match self.transport.request(request).await {
                Ok(response) if response.is_success() || response.status == 409 => {
                    if response.status == 409 {
                        info!(path = %full_path, "Relay already holds a newer record");
                    }
                    self.remove_pending(full_path, record.timestamp()).await?;
                    debug!(path = %full_path, status = response.status, "Delivered to relay");
                    return Ok(());
                }
                Ok(response) if (400..500).contains(&response.status) => {
                    warn!(path = %full_path, status = response.status, "Relay rejected write");
                    self.remove_pending(full_path, record.timestamp()).await?;
                    return Err(ClientError::Rejected {
                        status: response.status,
                    });
                }
                Ok(response) => {
                    debug!(path = %full_path, status = response.status, "Relay unavailable");
                }
                Err(e) => {
                    debug!(path = %full_path, error = %e, "Relay unreachable");
                }
            }

            let delay = backoff.next_delay();
            tokio::select! {
                _ = cancel.cancelled() => return Err(ClientError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn pending_state(&self, full_path: &str, timestamp: u64) -> Result<PendingState, ClientError> {
        let Some(bytes) = self.store.get(&pending_key(full_path)).await? else {
            return Ok(PendingState::Gone);
        };
        match Record::decode(&bytes) {
            Ok(pending) if pending.timestamp() > timestamp => Ok(PendingState::Superseded),
            _ => Ok(PendingState::Current),
        }
    }

    /// Drop the pending marker unless a newer local write replaced it.
    async fn remove_pending(&self, full_path: &str, timestamp: u64) -> Result<(), ClientError> {
        let _guard = self.pending_lock.lock().await;
        if let PendingState::Superseded = self.pending_state(full_path, timestamp).await? {
            return Ok(());
        }
        self.store.delete(&pending_key(full_path)).await?;
        Ok(())
    }

    /// Replay every pending write left in storage.
    async fn send_pending(self: &Arc<Self>) {
        let (start, end) = keys::pending_range();
        let entries = match self.store.iterate(&start, &end).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "Failed to scan pending writes");
                return;
            }
        };

        let mut deliveries = Vec::new();
        for (key, value) in entries {
            let Some(full_path) = keys::path_from_pending_key(&key) else {
                continue;
            };
            let Ok(record) = Record::decode(&value) else {
                warn!(path = %full_path, "Skipping unreadable pending record");
                continue;
            };
            let content = match self.store.get(&blob_key(record.hash())).await {
                Ok(Some(content)) => content,
                _ => {
                    warn!(path = %full_path, "Skipping pending record without content");
                    continue;
                }
            };

            let (tx, rx) = oneshot::channel();
            self.schedule_delivery(full_path.to_string(), record, Bytes::from(content), Some(tx));
            deliveries.push(rx);
        }

        if !deliveries.is_empty() {
            info!(count = deliveries.len(), "Replaying pending writes");
        }
        for rx in deliveries {
            let _ = rx.await;
        }
    }
}

/// `<relay>/<encoded full path>`
pub(crate) fn relay_url(relay: &str, full_path: &str) -> String {
    format!("{}/{}", relay, encode_path(full_path))
}
