//! Live listeners keyed by full path.
//!
//! Every accepted write to a key is pushed to each listener registered for
//! exactly that key. A [`Listener`] deregisters itself when dropped, and a
//! key whose listener set empties is removed.

use dashmap::DashMap;
use futures_util::Stream;
use relay_types::Record;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

type Senders = HashMap<u64, mpsc::UnboundedSender<Record>>;

#[derive(Debug, Default)]
struct Shared {
    listeners: DashMap<String, Senders>,
    next_id: AtomicU64,
}

impl Shared {
    fn remove(&self, key: &str, id: u64) {
        if let Some(mut senders) = self.listeners.get_mut(key) {
            senders.remove(&id);
        }
        self.listeners.remove_if(key, |_, senders| senders.is_empty());
    }
}

/// Registry of live listeners.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionRegistry {
    shared: Arc<Shared>,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for `key`.
    pub fn listen(&self, key: &str) -> Listener {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.shared
            .listeners
            .entry(key.to_string())
            .or_default()
            .insert(id, tx);

        tracing::debug!(key = %key, id, "Listener registered");
        Listener {
            rx,
            shared: Arc::clone(&self.shared),
            key: key.to_string(),
            id,
        }
    }

    /// Push `record` to every listener on `key`.
    ///
    /// Returns the number of listeners reached.
    pub fn notify(&self, key: &str, record: &Record) -> usize {
        let delivered = match self.shared.listeners.get_mut(key) {
            Some(mut senders) => {
                senders.retain(|_, tx| tx.send(record.clone()).is_ok());
                senders.len()
            }
            None => return 0,
        };
        self.shared
            .listeners
            .remove_if(key, |_, senders| senders.is_empty());
        delivered
    }

    /// Number of keys with at least one listener.
    pub fn keys(&self) -> usize {
        self.shared.listeners.len()
    }

    /// Total number of listeners.
    pub fn listeners(&self) -> usize {
        self.shared.listeners.iter().map(|e| e.value().len()).sum()
    }
}

/// A stream of records written to one key.
#[derive(Debug)]
pub struct Listener {
    rx: mpsc::UnboundedReceiver<Record>,
    shared: Arc<Shared>,
    key: String,
    id: u64,
}

impl Listener {
    /// The key this listener watches.
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Stream for Listener {
    type Item = Record;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Record>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.shared.remove(&self.key, self.id);
        tracing::debug!(key = %self.key, id = self.id, "Listener removed");
    }
}
