/// Per-conversation message ordering and dedup
///
/// Arrival order is authoritative: the backend is the single ordering source
/// for a conversation, so ingestion never sorts by timestamp. Duplicates
/// (reconnect replays, repeated pushes) are dropped by identity key.
use crate::realtime::event::{ChatMessage, EventKey};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Outcome of one ingest attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingest {
    Appended,
    Duplicate,
}

#[derive(Debug, Default)]
struct ConversationBuffer {
    /// Only ever appended to; existing entries are never rewritten
    messages: Vec<ChatMessage>,
    /// Identity index for O(1) membership checks
    seen: HashSet<EventKey>,
}

/// All open conversation buffers, keyed by match id. Buffers are independent:
/// an event for one conversation never affects another's buffer.
#[derive(Clone, Default)]
pub struct MessageBuffers {
    buffers: Arc<RwLock<HashMap<String, ConversationBuffer>>>,
}

impl MessageBuffers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent ingestion: a replayed message leaves the buffer unchanged
    pub async fn ingest(&self, message: ChatMessage) -> Ingest {
        let key = message.key();
        let mut buffers = self.buffers.write().await;
        let buffer = buffers.entry(message.match_id.clone()).or_default();
        if !buffer.seen.insert(key) {
            debug!("Duplicate message {} for match {} dropped", message.id, message.match_id);
            return Ingest::Duplicate;
        }
        buffer.messages.push(message);
        Ingest::Appended
    }

    /// Snapshot of a conversation's messages in arrival order
    pub async fn messages(&self, match_id: &str) -> Vec<ChatMessage> {
        let buffers = self.buffers.read().await;
        buffers
            .get(match_id)
            .map(|b| b.messages.clone())
            .unwrap_or_default()
    }

    pub async fn len(&self, match_id: &str) -> usize {
        let buffers = self.buffers.read().await;
        buffers.get(match_id).map(|b| b.messages.len()).unwrap_or(0)
    }

    /// Drop one conversation's buffer (screen teardown). Durable history
    /// comes from the REST message-history fetch on re-entry.
    pub async fn clear(&self, match_id: &str) {
        let mut buffers = self.buffers.write().await;
        buffers.remove(match_id);
    }

    pub async fn clear_all(&self) {
        let mut buffers = self.buffers.write().await;
        buffers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(id: &str, match_id: &str, sent_at: &str) -> ChatMessage {
        ChatMessage {
            id: id.to_string(),
            match_id: match_id.to_string(),
            sender_id: "peer".to_string(),
            sent_at: sent_at.to_string(),
            content: format!("message {}", id),
        }
    }

    #[tokio::test]
    async fn test_ingest_is_idempotent() {
        let buffers = MessageBuffers::new();
        let m = message("m1", "x", "2026-08-01T12:00:00Z");

        assert_eq!(buffers.ingest(m.clone()).await, Ingest::Appended);
        assert_eq!(buffers.ingest(m).await, Ingest::Duplicate);
        assert_eq!(buffers.len("x").await, 1);
    }

    #[tokio::test]
    async fn test_arrival_order_beats_timestamps() {
        let buffers = MessageBuffers::new();
        // e1 arrives first but carries the later timestamp
        buffers.ingest(message("e1", "x", "2026-08-01T12:00:05Z")).await;
        buffers.ingest(message("e2", "x", "2026-08-01T12:00:00Z")).await;

        let messages = buffers.messages("x").await;
        assert_eq!(messages[0].id, "e1");
        assert_eq!(messages[1].id, "e2");
    }

    #[tokio::test]
    async fn test_same_id_different_sent_at_is_distinct() {
        let buffers = MessageBuffers::new();
        buffers.ingest(message("m1", "x", "2026-08-01T12:00:00Z")).await;
        buffers.ingest(message("m1", "x", "2026-08-01T12:00:01Z")).await;
        assert_eq!(buffers.len("x").await, 2);
    }

    #[tokio::test]
    async fn test_conversations_are_independent() {
        let buffers = MessageBuffers::new();
        buffers.ingest(message("m1", "a", "2026-08-01T12:00:00Z")).await;
        buffers.ingest(message("m1", "b", "2026-08-01T12:00:00Z")).await;

        assert_eq!(buffers.len("a").await, 1);
        assert_eq!(buffers.len("b").await, 1);

        buffers.clear("a").await;
        assert_eq!(buffers.len("a").await, 0);
        assert_eq!(buffers.len("b").await, 1);
    }

    #[tokio::test]
    async fn test_reconnect_replay_keeps_length() {
        let buffers = MessageBuffers::new();
        let m1 = message("m1", "x", "2026-08-01T12:00:00Z");
        let m2 = message("m2", "x", "2026-08-01T12:00:01Z");
        buffers.ingest(m1.clone()).await;
        buffers.ingest(m2.clone()).await;

        // Backend redelivers the last two messages after reconnect
        buffers.ingest(m1).await;
        buffers.ingest(m2).await;
        assert_eq!(buffers.len("x").await, 2);
    }
}
