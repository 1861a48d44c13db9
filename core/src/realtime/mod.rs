/// Realtime channel modules
pub mod buffer;
pub mod connection;
pub mod event;
pub mod toast;
pub mod typing;

pub use buffer::{Ingest, MessageBuffers};
pub use connection::{ConnectionManager, ConnectionStatus, Identity, TransportState};
pub use event::{ChatMessage, EventKey, InboundEvent, OutboundEvent, PushNotification};
pub use toast::{ToastItem, ToastQueue, ToastUpdate};
pub use typing::{TypingChange, TypingTracker};
