/// Notification fan-out: transient, auto-expiring toast queue
///
/// Deliberately decoupled from the durable notification list (REST); the two
/// are eventually consistent. Dedup is against the currently visible queue
/// only, so a redelivery while a toast is still on screen never doubles it,
/// while a late redelivery after expiry toasts again.
use crate::realtime::event::PushNotification;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::debug;

/// One visible toast. Ephemeral; never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToastItem {
    pub id: String,
    pub title: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// Queue changes streamed to subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToastUpdate {
    Pushed(ToastItem),
    Expired(String),
    Dismissed(String),
}

#[derive(Default)]
struct ToastInner {
    /// FIFO; the product currently shows one at a time, but the queue
    /// supports more without code change
    items: VecDeque<(ToastItem, u64)>,
    timers: HashMap<String, JoinHandle<()>>,
    next_epoch: u64,
}

#[derive(Clone)]
pub struct ToastQueue {
    ttl: Duration,
    inner: Arc<RwLock<ToastInner>>,
    updates: broadcast::Sender<ToastUpdate>,
}

impl ToastQueue {
    pub fn new(ttl: Duration) -> Self {
        let (updates, _) = broadcast::channel(64);
        Self {
            ttl,
            inner: Arc::new(RwLock::new(ToastInner::default())),
            updates,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ToastUpdate> {
        self.updates.subscribe()
    }

    /// Enqueue a toast for an inbound notification. Dropped silently if a
    /// toast with the same id is still visible.
    pub async fn push(&self, notification: PushNotification) {
        let mut inner = self.inner.write().await;
        if inner.items.iter().any(|(item, _)| item.id == notification.id) {
            debug!("Toast {} already visible, redelivery dropped", notification.id);
            return;
        }

        let item = ToastItem {
            id: notification.id,
            title: notification.title,
            body: notification.body,
            created_at: Utc::now(),
        };
        inner.next_epoch += 1;
        let epoch = inner.next_epoch;
        inner.items.push_back((item.clone(), epoch));

        // Self-destruct timer; the epoch guards against a stale timer
        // removing a re-toasted item with the same id
        let queue = self.clone();
        let id = item.id.clone();
        let ttl = self.ttl;
        let handle = tokio::spawn(async move {
            sleep(ttl).await;
            queue.expire(&id, epoch).await;
        });
        if let Some(old) = inner.timers.insert(item.id.clone(), handle) {
            old.abort();
        }

        let _ = self.updates.send(ToastUpdate::Pushed(item));
    }

    /// Explicit user dismissal before the TTL elapses
    pub async fn dismiss(&self, id: &str) {
        let mut inner = self.inner.write().await;
        let before = inner.items.len();
        inner.items.retain(|(item, _)| item.id != id);
        if let Some(timer) = inner.timers.remove(id) {
            timer.abort();
        }
        if inner.items.len() != before {
            let _ = self.updates.send(ToastUpdate::Dismissed(id.to_string()));
        }
    }

    async fn expire(&self, id: &str, epoch: u64) {
        let mut inner = self.inner.write().await;
        let before = inner.items.len();
        inner.items.retain(|(item, e)| !(item.id == id && *e == epoch));
        if inner.items.len() != before {
            inner.timers.remove(id);
            let _ = self.updates.send(ToastUpdate::Expired(id.to_string()));
        }
    }

    /// Snapshot of the visible queue, oldest first
    pub async fn visible(&self) -> Vec<ToastItem> {
        let inner = self.inner.read().await;
        inner.items.iter().map(|(item, _)| item.clone()).collect()
    }

    /// Cancel every pending timer and drop all items (session teardown)
    pub async fn teardown(&self) {
        let mut inner = self.inner.write().await;
        for (_, timer) in inner.timers.drain() {
            timer.abort();
        }
        inner.items.clear();
    }
}
