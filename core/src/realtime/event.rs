/// Wire protocol for the realtime channel
///
/// Frames are newline-delimited JSON with a `kind` discriminator. The server
/// is the single ordering source per conversation; client clocks are never
/// trusted for ordering, so `sent_at` participates in identity only.
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fallback title for notifications that arrive without one.
/// Normalization happens once, at ingestion, never at render time.
pub const DEFAULT_NOTIFICATION_TITLE: &str = "New activity";

/// A chat message as delivered over the channel (and by the history REST fetch)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: String,
    pub match_id: String,
    pub sender_id: String,
    /// RFC3339 wall-clock stamp from the backend
    pub sent_at: String,
    pub content: String,
}

impl ChatMessage {
    /// Identity tuple used by the dedup buffer
    pub fn key(&self) -> EventKey {
        EventKey {
            kind: "message",
            id: self.id.clone(),
            sent_at: self.sent_at.clone(),
        }
    }
}

/// A push-style notification event (feeds the transient toast queue)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PushNotification {
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
    pub sent_at: String,
}

/// Dedup identity: `(kind, id, sent_at)` for events that carry an id.
/// Ephemeral events (typing) have no key and are compared structurally.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventKey {
    pub kind: &'static str,
    pub id: String,
    pub sent_at: String,
}

/// Server → client frames
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind")]
pub enum InboundEvent {
    /// Auth handshake accepted
    #[serde(rename = "auth-ok")]
    AuthOk { user_id: String },

    /// Auth handshake rejected; terminal for this session's connection
    #[serde(rename = "auth-error")]
    AuthError { reason: String },

    #[serde(rename = "message")]
    Message(ChatMessage),

    #[serde(rename = "notification")]
    Notification(PushNotification),

    #[serde(rename = "typing")]
    Typing {
        match_id: String,
        user_id: String,
        is_typing: bool,
    },

    /// Delivery acknowledgment; logged, no UI state derived from it
    #[serde(rename = "ack")]
    Ack { id: Option<String> },
}

impl InboundEvent {
    /// Parse one wire frame
    pub fn from_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }

    /// Get event kind as string
    pub fn kind(&self) -> &'static str {
        match self {
            InboundEvent::AuthOk { .. } => "auth-ok",
            InboundEvent::AuthError { .. } => "auth-error",
            InboundEvent::Message(_) => "message",
            InboundEvent::Notification(_) => "notification",
            InboundEvent::Typing { .. } => "typing",
            InboundEvent::Ack { .. } => "ack",
        }
    }

    /// Shape validation at ingestion. Events failing validation are dropped
    /// by the caller rather than propagated as errors; notifications get
    /// their title normalized here so the fallback lives in one place.
    pub fn validate(self) -> Option<Self> {
        match self {
            InboundEvent::Message(m) => {
                if m.id.is_empty() || m.match_id.is_empty() || m.sender_id.is_empty() {
                    return None;
                }
                Some(InboundEvent::Message(m))
            }
            InboundEvent::Notification(mut n) => {
                if n.id.is_empty() || n.user_id.is_empty() {
                    return None;
                }
                if n.title.trim().is_empty() {
                    n.title = DEFAULT_NOTIFICATION_TITLE.to_string();
                }
                Some(InboundEvent::Notification(n))
            }
            InboundEvent::Typing {
                match_id, user_id, is_typing,
            } => {
                if match_id.is_empty() || user_id.is_empty() {
                    return None;
                }
                Some(InboundEvent::Typing { match_id, user_id, is_typing })
            }
            other => Some(other),
        }
    }
}

impl fmt::Display for InboundEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InboundEvent({})", self.kind())
    }
}

/// Client → server frames
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind")]
pub enum OutboundEvent {
    /// First frame after connect; carries the identity token
    #[serde(rename = "auth")]
    Auth { token: String, user_id: String },

    #[serde(rename = "join-room")]
    JoinRoom { room: String },

    #[serde(rename = "leave-room")]
    LeaveRoom { room: String },

    #[serde(rename = "send-message")]
    SendMessage {
        match_id: String,
        sender_id: String,
        content: String,
        message_type: String,
    },

    #[serde(rename = "typing")]
    Typing { match_id: String, is_typing: bool },

    #[serde(rename = "send-global-notification")]
    SendGlobalNotification {
        user_id: String,
        title: String,
        body: String,
    },

    #[serde(rename = "send-like-notification")]
    SendLikeNotification {
        to_user_id: String,
        from_user_id: String,
        from_name: String,
    },
}

impl OutboundEvent {
    /// Serialize to one wire frame (caller appends the newline)
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Get event kind as string
    pub fn kind(&self) -> &'static str {
        match self {
            OutboundEvent::Auth { .. } => "auth",
            OutboundEvent::JoinRoom { .. } => "join-room",
            OutboundEvent::LeaveRoom { .. } => "leave-room",
            OutboundEvent::SendMessage { .. } => "send-message",
            OutboundEvent::Typing { .. } => "typing",
            OutboundEvent::SendGlobalNotification { .. } => "send-global-notification",
            OutboundEvent::SendLikeNotification { .. } => "send-like-notification",
        }
    }
}

/// Room naming: every user has a personal room; the active conversation
/// room is keyed by match id.
pub fn personal_room(user_id: &str) -> String {
    format!("user_{}", user_id)
}

pub fn match_room(match_id: &str) -> String {
    format!("match_{}", match_id)
}
