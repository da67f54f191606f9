//! Live updates.
//!
//! One push connection per subscribed URL, shared by every local callback
//! interested in it. A push is only a hint: the entry is re-fetched and
//! verified through the normal relay read before callbacks see it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use futures_util::StreamExt;
use relay_core::{encode_path, Backoff};
use relay_types::protocol::SUBSCRIBE_PREFIX;
use relay_types::Record;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::{Client, ClientError, Inner, Target};
use crate::kv::KvStore;
use crate::transport::Transport;

/// Callback invoked with the latest content of a subscribed entry.
///
/// `None` means the entry was deleted or could not be fetched.
pub type Callback = Arc<dyn Fn(Option<Vec<u8>>) + Send + Sync>;

type Callbacks = Arc<Mutex<HashMap<u64, Callback>>>;

struct Listener {
    callbacks: Callbacks,
    cancel: CancellationToken,
}

/// Live listeners keyed by subscribe URL.
pub(crate) struct SubscriptionRegistry {
    listeners: Mutex<HashMap<String, Listener>>,
    next_id: AtomicU64,
}

/// Result of adding a callback.
struct Registration {
    id: u64,
    /// Set when no listener existed for the URL and one must be started.
    start: Option<(Callbacks, CancellationToken)>,
}

impl SubscriptionRegistry {
    pub(crate) fn new() -> Self {
        Self {
            listeners: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Listener>> {
        self.listeners.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of open listeners.
    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    fn add(
        &self,
        url: &str,
        callback: Callback,
        limit: usize,
        parent: &CancellationToken,
    ) -> Result<Registration, ClientError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut listeners = self.lock();

        if let Some(listener) = listeners.get(url) {
            lock_callbacks(&listener.callbacks).insert(id, callback);
            return Ok(Registration { id, start: None });
        }
        if listeners.len() >= limit {
            return Err(ClientError::MaxSubscriptions { limit });
        }

        let callbacks: Callbacks = Arc::new(Mutex::new(HashMap::from([(id, callback)])));
        let cancel = parent.child_token();
        listeners.insert(
            url.to_string(),
            Listener {
                callbacks: Arc::clone(&callbacks),
                cancel: cancel.clone(),
            },
        );
        Ok(Registration {
            id,
            start: Some((callbacks, cancel)),
        })
    }

    /// Remove one callback; the last one out closes the listener.
    fn remove(&self, url: &str, id: u64) {
        let mut listeners = self.lock();
        let Some(listener) = listeners.get(url) else {
            return;
        };

        let empty = {
            let mut callbacks = lock_callbacks(&listener.callbacks);
            callbacks.remove(&id);
            callbacks.is_empty()
        };
        if empty {
            listener.cancel.cancel();
            listeners.remove(url);
            debug!(url = %url, "Closed listener");
        }
    }

    /// Close every listener.
    pub(crate) fn close_all(&self) {
        for (_, listener) in self.lock().drain() {
            listener.cancel.cancel();
        }
    }
}

fn lock_callbacks(callbacks: &Mutex<HashMap<u64, Callback>>) -> MutexGuard<'_, HashMap<u64, Callback>> {
    callbacks.lock().unwrap_or_else(|e| e.into_inner())
}

/// Handle for one subscribed callback.
///
/// Dropping the handle unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    registry: Weak<SubscriptionRegistry>,
    url: String,
    id: u64,
}

impl Subscription {
    /// The subscribe URL this callback listens on.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Stop receiving updates.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(&self.url, self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("url", &self.url)
            .field("id", &self.id)
            .finish()
    }
}

impl<S: KvStore, T: Transport> Client<S, T> {
    /// Call `callback` with the latest content of `path` whenever its
    /// relay reports a new write.
    ///
    /// `path` may be a local path or a `slash:` URL. Subscribers to the same
    /// URL share one connection.
    pub fn subscribe<F>(&self, path: &str, callback: F) -> Result<Subscription, ClientError>
    where
        F: Fn(Option<Vec<u8>>) + Send + Sync + 'static,
    {
        if self.inner.shutdown.is_cancelled() {
            return Err(ClientError::Cancelled);
        }
        let target = self.inner.resolve(path)?;
        let relay = target.relay.as_deref().ok_or(ClientError::NoRelay)?;
        let url = format!("{}{}{}", relay, SUBSCRIBE_PREFIX, encode_path(&target.full_path));

        let registration = self.inner.subscriptions.add(
            &url,
            Arc::new(callback),
            self.inner.config.max_subscriptions,
            &self.inner.shutdown,
        )?;

        if let Some((callbacks, cancel)) = registration.start {
            info!(url = %url, "Opening listener");
            tokio::spawn(listen(
                Arc::downgrade(&self.inner),
                target,
                url.clone(),
                callbacks,
                cancel,
            ));
        }

        Ok(Subscription {
            registry: Arc::downgrade(&self.inner.subscriptions),
            url,
            id: registration.id,
        })
    }

    /// Number of open listeners (distinct subscribed URLs).
    pub fn subscription_count(&self) -> usize {
        self.inner.subscriptions.len()
    }
}

/// Keep one push connection open until cancelled, reconnecting on failure.
async fn listen<S: KvStore, T: Transport>(
    client: Weak<Inner<S, T>>,
    target: Target,
    url: String,
    callbacks: Callbacks,
    cancel: CancellationToken,
) {
    let mut backoff = Backoff::new();

    loop {
        let Some(inner) = client.upgrade() else {
            return;
        };
        let last = match inner.stored_record(&target.full_path).await {
            Ok(record) => record.map(|r| r.to_base64().to_string()),
            Err(_) => None,
        };
        let connected = tokio::select! {
            _ = cancel.cancelled() => return,
            result = inner.transport.subscribe(&url, last) => result,
        };
        drop(inner);

        match connected {
            Ok(mut events) => {
                debug!(url = %url, "Listener connected");
                backoff.reset();
                loop {
                    let event = tokio::select! {
                        _ = cancel.cancelled() => return,
                        event = events.next() => event,
                    };
                    match event {
                        Some(Ok(data)) => on_event(&client, &target, &callbacks, &data).await,
                        Some(Err(e)) => {
                            debug!(url = %url, error = %e, "Listener stream failed");
                            break;
                        }
                        None => {
                            debug!(url = %url, "Listener stream ended");
                            break;
                        }
                    }
                }
            }
            Err(e) => debug!(url = %url, error = %e, "Listener connect failed"),
        }

        let delay = backoff.next_delay();
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

async fn on_event<S: KvStore, T: Transport>(
    client: &Weak<Inner<S, T>>,
    target: &Target,
    callbacks: &Callbacks,
    data: &str,
) {
    // The payload only announces a write; a bad one is dropped and the
    // next event re-syncs.
    if let Err(e) = Record::from_base64(data.trim()) {
        debug!(path = %target.full_path, error = %e, "Ignoring malformed push");
        return;
    }
    let Some(inner) = client.upgrade() else {
        return;
    };

    let value = match inner.get_from_relay(target).await {
        Ok(value) => value,
        Err(e) => {
            warn!(path = %target.full_path, error = %e, "Failed to refresh subscribed entry");
            return;
        }
    };

    let listeners: Vec<Callback> = lock_callbacks(callbacks).values().cloned().collect();
    for callback in listeners {
        callback(value.clone());
    }
}
