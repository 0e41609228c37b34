//! Subscriber registry and fan-out

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::events::{Notification, StoreEventPayload};

/// Connection handle
pub type ConnectionId = Uuid;

/// Buffered messages per subscriber before sends start waiting
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 64;

/// How long a broadcast waits on one full subscriber before dropping it
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// A registered subscriber: its handle and the stream of messages for it
#[derive(Debug)]
pub struct Subscription {
    pub id: ConnectionId,
    pub receiver: mpsc::Receiver<Arc<str>>,
}

/// Result of one broadcast
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastOutcome {
    pub delivered: usize,
    pub dropped: usize,
}

struct Inner {
    clients: Mutex<HashMap<ConnectionId, mpsc::Sender<Arc<str>>>>,
    capacity: usize,
    send_timeout: Duration,
}

/// Registry of live subscribers
///
/// The registry is only reachable through `connect`, `disconnect` and
/// `broadcast`. A subscriber whose send fails or times out is removed as if
/// it had disconnected.
#[derive(Clone)]
pub struct Broadcaster {
    inner: Arc<Inner>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_SUBSCRIBER_CAPACITY, DEFAULT_SEND_TIMEOUT)
    }

    /// Create a broadcaster with a per-subscriber buffer and send timeout
    pub fn with_limits(capacity: usize, send_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                clients: Mutex::new(HashMap::new()),
                capacity: capacity.max(1),
                send_timeout,
            }),
        }
    }

    /// Register a new subscriber
    pub fn connect(&self) -> Subscription {
        let (tx, receiver) = mpsc::channel(self.inner.capacity);
        let id = Uuid::new_v4();
        self.inner.clients.lock().insert(id, tx);
        Subscription { id, receiver }
    }

    /// Remove a subscriber. Returns false if it was already gone.
    pub fn disconnect(&self, id: ConnectionId) -> bool {
        self.inner.clients.lock().remove(&id).is_some()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.clients.lock().len()
    }

    pub fn is_connected(&self, id: ConnectionId) -> bool {
        self.inner.clients.lock().contains_key(&id)
    }

    /// Deliver `message` to every current subscriber
    ///
    /// Sends run concurrently against a snapshot of the registry, so a slow
    /// subscriber costs at most the send timeout and never blocks
    /// `connect`/`disconnect`.
    pub async fn broadcast(&self, message: impl Into<Arc<str>>) -> BroadcastOutcome {
        let message = message.into();

        let targets: Vec<(ConnectionId, mpsc::Sender<Arc<str>>)> = self
            .inner
            .clients
            .lock()
            .iter()
            .map(|(id, tx)| (*id, tx.clone()))
            .collect();

        if targets.is_empty() {
            return BroadcastOutcome::default();
        }

        let timeout = self.inner.send_timeout;
        let results = join_all(targets.into_iter().map(|(id, tx)| {
            let message = message.clone();
            async move { (id, tx.send_timeout(message, timeout).await.is_ok()) }
        }))
        .await;

        let failed: Vec<ConnectionId> = results
            .iter()
            .filter(|(_, ok)| !ok)
            .map(|(id, _)| *id)
            .collect();

        if !failed.is_empty() {
            let mut clients = self.inner.clients.lock();
            for id in &failed {
                if clients.remove(id).is_some() {
                    tracing::debug!("Dropped subscriber {} after failed send", id);
                }
            }
        }

        BroadcastOutcome {
            delivered: results.len() - failed.len(),
            dropped: failed.len(),
        }
    }

    /// Broadcast one rendered notification
    pub async fn notify(&self, notification: &Notification) -> BroadcastOutcome {
        self.broadcast(notification.render()).await
    }

    /// Broadcast every record of a webhook payload, in order
    pub async fn ingest(&self, payload: &StoreEventPayload) -> usize {
        let notifications = payload.notifications();
        for notification in &notifications {
            let outcome = self.notify(notification).await;
            tracing::debug!(
                bucket = %notification.bucket,
                key = %notification.object_key,
                delivered = outcome.delivered,
                dropped = outcome.dropped,
                "Relayed store notification"
            );
        }
        notifications.len()
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}
