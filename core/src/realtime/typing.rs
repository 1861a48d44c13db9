/// Typing presence: debounced local signaling and expiring remote state
///
/// Local side is a per-conversation `Idle`/`Typing` machine: the first
/// keystroke emits `typing(true)` immediately, later keystrokes only re-arm
/// the inactivity timer, and the timer (or losing focus) emits
/// `typing(false)`. Remote side keeps a per-conversation set of typing peers
/// with a safety-net expiry, so a lost `typing(false)` can never leave an
/// indicator stuck.
use crate::realtime::connection::ConnectionManager;
use crate::realtime::event::OutboundEvent;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::debug;

/// Snapshot pushed to subscribers whenever a conversation's typing set changes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypingChange {
    pub match_id: String,
    pub typists: Vec<String>,
}

/// Present in the map only while locally in the `Typing` state
struct LocalTyping {
    generation: u64,
    timer: JoinHandle<()>,
}

struct RemoteTypist {
    generation: u64,
    last_seen: Instant,
    timer: JoinHandle<()>,
}

#[derive(Clone)]
pub struct TypingTracker {
    connection: ConnectionManager,
    debounce: Duration,
    expiry: Duration,
    local: Arc<RwLock<HashMap<String, LocalTyping>>>,
    remote: Arc<RwLock<HashMap<String, HashMap<String, RemoteTypist>>>>,
    generations: Arc<AtomicU64>,
    changes: broadcast::Sender<TypingChange>,
}

impl TypingTracker {
    pub fn new(connection: ConnectionManager, debounce: Duration, expiry: Duration) -> Self {
        let (changes, _) = broadcast::channel(64);
        Self {
            connection,
            debounce,
            expiry,
            local: Arc::new(RwLock::new(HashMap::new())),
            remote: Arc::new(RwLock::new(HashMap::new())),
            generations: Arc::new(AtomicU64::new(0)),
            changes,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TypingChange> {
        self.changes.subscribe()
    }

    /// Local keystroke in a conversation. Emits `typing(true)` only on the
    /// `Idle -> Typing` edge; inside the window it just re-arms the timer.
    pub async fn keystroke(&self, match_id: &str) {
        let generation = self.next_generation();
        let newly_typing = {
            let mut local = self.local.write().await;
            let newly_typing = !local.contains_key(match_id);

            let tracker = self.clone();
            let conversation = match_id.to_string();
            let timer = tokio::spawn(async move {
                sleep(tracker.debounce).await;
                tracker.debounce_elapsed(&conversation, generation).await;
            });

            if let Some(previous) = local.insert(match_id.to_string(), LocalTyping { generation, timer }) {
                previous.timer.abort();
            }
            newly_typing
        };

        if newly_typing {
            self.connection
                .emit(OutboundEvent::Typing {
                    match_id: match_id.to_string(),
                    is_typing: true,
                })
                .await;
        }
    }

    /// Losing focus forces `Idle` immediately and cancels the pending timer,
    /// so no stale "typing" state leaks after navigating away.
    pub async fn blur(&self, match_id: &str) {
        let was_typing = {
            let mut local = self.local.write().await;
            match local.remove(match_id) {
                Some(entry) => {
                    entry.timer.abort();
                    true
                }
                None => false,
            }
        };
        if was_typing {
            self.connection
                .emit(OutboundEvent::Typing {
                    match_id: match_id.to_string(),
                    is_typing: false,
                })
                .await;
        }
    }

    pub async fn is_locally_typing(&self, match_id: &str) -> bool {
        self.local.read().await.contains_key(match_id)
    }

    async fn debounce_elapsed(&self, match_id: &str, generation: u64) {
        let back_to_idle = {
            let mut local = self.local.write().await;
            // The generation check keeps a timer that fired while being
            // re-armed from clobbering the newer state
            match local.get(match_id) {
                Some(entry) if entry.generation == generation => {
                    local.remove(match_id);
                    true
                }
                _ => false,
            }
        };
        if back_to_idle {
            self.connection
                .emit(OutboundEvent::Typing {
                    match_id: match_id.to_string(),
                    is_typing: false,
                })
                .await;
        }
    }

    /// Inbound typing event for a peer. `true` inserts (or refreshes) the
    /// peer and re-arms its expiry; `false` removes it.
    pub async fn remote_event(&self, match_id: &str, user_id: &str, is_typing: bool) {
        if is_typing {
            let generation = self.next_generation();
            {
                let mut remote = self.remote.write().await;
                let conversation = remote.entry(match_id.to_string()).or_default();

                let tracker = self.clone();
                let m = match_id.to_string();
                let u = user_id.to_string();
                let timer = tokio::spawn(async move {
                    sleep(tracker.expiry).await;
                    tracker.expire_remote(&m, &u, generation).await;
                });

                let entry = RemoteTypist {
                    generation,
                    last_seen: Instant::now(),
                    timer,
                };
                if let Some(previous) = conversation.insert(user_id.to_string(), entry) {
                    previous.timer.abort();
                }
            }
            self.publish(match_id).await;
        } else {
            let removed = {
                let mut remote = self.remote.write().await;
                match remote.get_mut(match_id) {
                    Some(conversation) => match conversation.remove(user_id) {
                        Some(entry) => {
                            entry.timer.abort();
                            true
                        }
                        None => false,
                    },
                    None => false,
                }
            };
            if removed {
                self.publish(match_id).await;
            }
        }
    }

    /// Safety net for lost `typing(false)` events
    async fn expire_remote(&self, match_id: &str, user_id: &str, generation: u64) {
        let removed = {
            let mut remote = self.remote.write().await;
            match remote.get_mut(match_id) {
                Some(conversation) => match conversation.get(user_id) {
                    Some(entry) if entry.generation == generation => {
                        debug!(
                            "Typing flag for {} in {} expired after {:?} without refresh",
                            user_id,
                            match_id,
                            entry.last_seen.elapsed()
                        );
                        conversation.remove(user_id);
                        true
                    }
                    _ => false,
                },
                None => false,
            }
        };
        if removed {
            self.publish(match_id).await;
        }
    }

    /// Peers currently flagged typing in a conversation, sorted for stable UI
    pub async fn typists(&self, match_id: &str) -> Vec<String> {
        let remote = self.remote.read().await;
        let mut typists: Vec<String> = remote
            .get(match_id)
            .map(|c| c.keys().cloned().collect())
            .unwrap_or_default();
        typists.sort();
        typists
    }

    /// Drop all state for one conversation (screen teardown)
    pub async fn clear_conversation(&self, match_id: &str) {
        self.blur(match_id).await;
        let mut remote = self.remote.write().await;
        if let Some(conversation) = remote.remove(match_id) {
            for (_, entry) in conversation {
                entry.timer.abort();
            }
        }
    }

    /// Cancel every timer and drop all state (logout). No emissions: the
    /// connection is going away with us.
    pub async fn teardown(&self) {
        let mut local = self.local.write().await;
        for (_, entry) in local.drain() {
            entry.timer.abort();
        }
        drop(local);

        let mut remote = self.remote.write().await;
        for (_, conversation) in remote.drain() {
            for (_, entry) in conversation {
                entry.timer.abort();
            }
        }
    }

    async fn publish(&self, match_id: &str) {
        let typists = self.typists(match_id).await;
        let _ = self.changes.send(TypingChange {
            match_id: match_id.to_string(),
            typists,
        });
    }

    fn next_generation(&self) -> u64 {
        self.generations.fetch_add(1, Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::realtime::connection::Identity;

    fn tracker(debounce: Duration, expiry: Duration) -> TypingTracker {
        // Disconnected manager: emissions are dropped here; emission itself
        // is covered by the integration tests
        let connection = ConnectionManager::new(
            Config::default(),
            Identity {
                user_id: "me".to_string(),
                token: "t".to_string(),
            },
        );
        TypingTracker::new(connection, debounce, expiry)
    }

    #[tokio::test]
    async fn test_keystroke_enters_and_leaves_typing() {
        let tracker = tracker(Duration::from_millis(40), Duration::from_millis(200));
        tracker.keystroke("m1").await;
        assert!(tracker.is_locally_typing("m1").await);

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(!tracker.is_locally_typing("m1").await);
    }

    #[tokio::test]
    async fn test_keystrokes_inside_window_keep_typing() {
        let tracker = tracker(Duration::from_millis(60), Duration::from_millis(200));
        tracker.keystroke("m1").await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        tracker.keystroke("m1").await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        // Second keystroke re-armed the timer, so still typing
        assert!(tracker.is_locally_typing("m1").await);
    }

    #[tokio::test]
    async fn test_blur_forces_idle() {
        let tracker = tracker(Duration::from_secs(5), Duration::from_secs(5));
        tracker.keystroke("m1").await;
        tracker.blur("m1").await;
        assert!(!tracker.is_locally_typing("m1").await);
    }

    #[tokio::test]
    async fn test_remote_typing_set_tracks_events() {
        let tracker = tracker(Duration::from_secs(5), Duration::from_secs(5));
        tracker.remote_event("m1", "peer-b", true).await;
        tracker.remote_event("m1", "peer-a", true).await;
        assert_eq!(tracker.typists("m1").await, vec!["peer-a", "peer-b"]);

        tracker.remote_event("m1", "peer-a", false).await;
        assert_eq!(tracker.typists("m1").await, vec!["peer-b"]);
    }

    #[tokio::test]
    async fn test_remote_typing_expires_without_refresh() {
        let tracker = tracker(Duration::from_millis(20), Duration::from_millis(50));
        tracker.remote_event("m1", "peer", true).await;
        assert_eq!(tracker.typists("m1").await.len(), 1);

        // No typing(false) ever arrives; the safety net clears the flag
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(tracker.typists("m1").await.is_empty());
    }

    #[tokio::test]
    async fn test_remote_refresh_rearms_expiry() {
        let tracker = tracker(Duration::from_millis(20), Duration::from_millis(80));
        tracker.remote_event("m1", "peer", true).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        tracker.remote_event("m1", "peer", true).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        // Refresh at t=50ms pushed expiry to t=130ms
        assert_eq!(tracker.typists("m1").await.len(), 1);
    }

    #[tokio::test]
    async fn test_conversations_have_independent_typing_sets() {
        let tracker = tracker(Duration::from_secs(5), Duration::from_secs(5));
        tracker.remote_event("m1", "peer", true).await;
        tracker.remote_event("m2", "peer", true).await;
        tracker.clear_conversation("m1").await;
        assert!(tracker.typists("m1").await.is_empty());
        assert_eq!(tracker.typists("m2").await.len(), 1);
    }
}
