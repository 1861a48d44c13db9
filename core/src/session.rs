/// Session assembly: one per authenticated user
///
/// Owns the connection manager and the realtime components, routes inbound
/// events to them, and re-broadcasts a single `SessionEvent` stream for the
/// UI. Screens hold a `Session` clone and subscribe; they never reach into
/// transport internals.
use crate::config::Config;
use crate::discovery::{LocationProvider, SwipeQueue};
use crate::error::{AmoraError, Result};
use crate::geo::Coordinate;
use crate::profile_store::{CurrentUser, ProfileStore, StoredIdentity};
use crate::realtime::connection::{ConnectionManager, ConnectionStatus, Identity, TransportState};
use crate::realtime::event::{ChatMessage, InboundEvent, OutboundEvent};
use crate::realtime::{Ingest, MessageBuffers, ToastItem, ToastQueue, ToastUpdate, TypingChange, TypingTracker};
use crate::rest::{Candidate, MatchApi, NotificationRecord, SwipeAction};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const HISTORY_PAGE_SIZE: u32 = 50;
const DISCOVERY_PAGE_SIZE: u32 = 25;
const NOTIFICATIONS_PAGE_SIZE: u32 = 20;

/// Everything a screen can react to, in one stream
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Connection(ConnectionStatus),
    MessageAppended { message: ChatMessage },
    TypingChanged(TypingChange),
    Toast(ToastUpdate),
}

#[derive(Clone)]
pub struct Session {
    config: Config,
    identity: StoredIdentity,
    connection: ConnectionManager,
    buffers: MessageBuffers,
    typing: TypingTracker,
    toasts: ToastQueue,
    swipes: SwipeQueue,
    api: Arc<dyn MatchApi>,
    location: Arc<dyn LocationProvider>,
    events: broadcast::Sender<SessionEvent>,
    dispatcher: Arc<RwLock<Option<JoinHandle<()>>>>,
}

impl Session {
    /// Build a session from the locally persisted identity. Refused when no
    /// identity is stored; the login flow must run first.
    pub fn new(
        config: Config,
        store: &ProfileStore,
        api: Arc<dyn MatchApi>,
        location: Arc<dyn LocationProvider>,
    ) -> Result<Self> {
        let identity = store
            .load_identity()?
            .ok_or_else(|| AmoraError::Auth("No stored identity; log in first".to_string()))?;

        let connection = ConnectionManager::new(
            config.clone(),
            Identity {
                user_id: identity.user.user_id.clone(),
                token: identity.token.clone(),
            },
        );
        let typing = TypingTracker::new(connection.clone(), config.typing_debounce, config.typing_expiry);
        let toasts = ToastQueue::new(config.toast_ttl);
        let swipes = SwipeQueue::new(config.default_radius_km);
        let (events, _) = broadcast::channel(256);

        Ok(Self {
            config,
            identity,
            connection,
            buffers: MessageBuffers::new(),
            typing,
            toasts,
            swipes,
            api,
            location,
            events,
            dispatcher: Arc::new(RwLock::new(None)),
        })
    }

    pub fn user(&self) -> &CurrentUser {
        &self.identity.user
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Bring the realtime channel up (spawning the dispatch task on first
    /// use). Streams are subscribed before the transport comes up so no
    /// early event slips past the dispatcher.
    pub async fn connect(&self) {
        {
            let mut dispatcher = self.dispatcher.write().await;
            if dispatcher.is_none() {
                let inbound = self.connection.subscribe_events();
                let status = self.connection.subscribe_status();
                let typing_changes = self.typing.subscribe();
                let toast_updates = self.toasts.subscribe();
                let session = self.clone();
                *dispatcher = Some(tokio::spawn(async move {
                    session.dispatch(inbound, status, typing_changes, toast_updates).await
                }));
            }
        }
        info!("Session starting for {}", self.identity.user.user_id);
        self.connection.connect().await;
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn connection_state(&self) -> TransportState {
        self.connection.state().await
    }

    /// Full teardown: transport, dispatch task, and every pending timer
    pub async fn shutdown(&self) {
        self.connection.disconnect().await;
        if let Some(handle) = self.dispatcher.write().await.take() {
            handle.abort();
        }
        self.typing.teardown().await;
        self.toasts.teardown().await;
        self.buffers.clear_all().await;
    }

    /// Logout: tear down and forget the stored identity
    pub async fn logout(&self, store: &ProfileStore) -> Result<()> {
        self.shutdown().await;
        store.clear_identity()?;
        info!("Logged out {}", self.identity.user.user_id);
        Ok(())
    }

    // ─── Conversations ───────────────────────────────────────────────────

    /// Enter a conversation screen: join its room and seed the buffer from
    /// durable history (newest last; ingestion dedups against live events)
    pub async fn open_conversation(&self, match_id: &str) {
        self.connection.join_conversation(match_id).await;
        match self.api.fetch_messages(match_id, 1, HISTORY_PAGE_SIZE).await {
            Ok(messages) => {
                for message in messages {
                    self.buffers.ingest(message).await;
                }
            }
            Err(e) => warn!("Message history fetch failed for {}: {}", match_id, e),
        }
    }

    /// Leave a conversation screen: room, buffer, and typing state all go
    pub async fn close_conversation(&self, match_id: &str) {
        self.typing.clear_conversation(match_id).await;
        self.buffers.clear(match_id).await;
        self.connection.leave_conversation().await;
    }

    /// Best-effort send over the channel; the message-history REST fetch is
    /// the durable record
    pub async fn send_message(&self, match_id: &str, content: &str) {
        self.typing.blur(match_id).await;
        self.connection
            .emit(OutboundEvent::SendMessage {
                match_id: match_id.to_string(),
                sender_id: self.identity.user.user_id.clone(),
                content: content.to_string(),
                message_type: "text".to_string(),
            })
            .await;
    }

    pub async fn keystroke(&self, match_id: &str) {
        self.typing.keystroke(match_id).await;
    }

    pub async fn blur(&self, match_id: &str) {
        self.typing.blur(match_id).await;
    }

    pub async fn messages(&self, match_id: &str) -> Vec<ChatMessage> {
        self.buffers.messages(match_id).await
    }

    pub async fn typists(&self, match_id: &str) -> Vec<String> {
        self.typing.typists(match_id).await
    }

    // ─── Discovery ───────────────────────────────────────────────────────

    /// Fetch a fresh candidate page and rebuild the swipe queue around the
    /// viewer's current coordinate. Returns the queue length.
    pub async fn load_discovery(&self) -> Result<usize> {
        let raw = self.api.fetch_candidates(1, DISCOVERY_PAGE_SIZE).await?;
        let origin = self.location.current_coordinate().await?;
        self.swipes.load(raw, origin).await;
        Ok(self.swipes.len().await)
    }

    /// Submit the swipe for the current candidate, then advance. The cursor
    /// moves whether or not the REST call succeeded; a failure is logged and
    /// never rolls the deck back.
    pub async fn submit_swipe(&self, action: SwipeAction) -> Option<Candidate> {
        let candidate = self.swipes.current().await?;
        match self
            .api
            .submit_swipe(&self.identity.user.user_id, &candidate.user_id, action)
            .await
        {
            Ok(ack) => {
                if action == SwipeAction::Like {
                    self.connection
                        .emit(OutboundEvent::SendLikeNotification {
                            to_user_id: candidate.user_id.clone(),
                            from_user_id: self.identity.user.user_id.clone(),
                            from_name: self.identity.user.display_name.clone(),
                        })
                        .await;
                }
                if ack.matched {
                    info!("Mutual match with {}", candidate.user_id);
                }
            }
            Err(e) => warn!("Swipe submission for {} failed: {}", candidate.user_id, e),
        }
        self.swipes.advance(action).await
    }

    pub async fn rewind_swipe(&self) -> Option<Candidate> {
        self.swipes.rewind().await
    }

    pub async fn current_candidate(&self) -> Option<Candidate> {
        self.swipes.current().await
    }

    pub async fn set_search_radius(&self, radius_km: f64) {
        self.swipes.set_radius(radius_km).await;
    }

    pub async fn update_location(&self, coordinate: Coordinate) {
        self.swipes.set_origin(coordinate).await;
    }

    // ─── Notifications ───────────────────────────────────────────────────

    pub async fn visible_toasts(&self) -> Vec<ToastItem> {
        self.toasts.visible().await
    }

    pub async fn dismiss_toast(&self, id: &str) {
        self.toasts.dismiss(id).await;
    }

    /// Durable notification list page; eventually consistent with the toast
    /// queue, never its source of truth
    pub async fn notifications(&self, page: u32) -> Result<Vec<NotificationRecord>> {
        self.api.fetch_notifications(page, NOTIFICATIONS_PAGE_SIZE).await
    }

    pub async fn send_global_notification(&self, title: &str, body: &str) {
        self.connection
            .emit(OutboundEvent::SendGlobalNotification {
                user_id: self.identity.user.user_id.clone(),
                title: title.to_string(),
                body: body.to_string(),
            })
            .await;
    }

    // ─── Dispatch ────────────────────────────────────────────────────────

    /// Single routing task: inbound events fan out to the buffer, typing
    /// tracker, and toast queue; component streams are re-broadcast as
    /// `SessionEvent`s. Sequential ingestion preserves per-conversation
    /// arrival order.
    async fn dispatch(
        &self,
        mut inbound: broadcast::Receiver<InboundEvent>,
        mut status: broadcast::Receiver<ConnectionStatus>,
        mut typing_changes: broadcast::Receiver<TypingChange>,
        mut toast_updates: broadcast::Receiver<ToastUpdate>,
    ) {
        loop {
            tokio::select! {
                event = inbound.recv() => match event {
                    Ok(event) => self.route(event).await,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Dispatcher lagged {} inbound events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                update = status.recv() => match update {
                    Ok(update) => {
                        let _ = self.events.send(SessionEvent::Connection(update));
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                change = typing_changes.recv() => match change {
                    Ok(change) => {
                        let _ = self.events.send(SessionEvent::TypingChanged(change));
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                update = toast_updates.recv() => match update {
                    Ok(update) => {
                        let _ = self.events.send(SessionEvent::Toast(update));
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
    }

    async fn route(&self, event: InboundEvent) {
        match event {
            InboundEvent::Message(message) => {
                if self.buffers.ingest(message.clone()).await == Ingest::Appended {
                    let _ = self.events.send(SessionEvent::MessageAppended { message });
                }
            }
            InboundEvent::Notification(notification) => {
                self.toasts.push(notification).await;
            }
            InboundEvent::Typing {
                match_id,
                user_id,
                is_typing,
            } => {
                // The backend may loop our own typing signal back through the room
                if user_id != self.identity.user.user_id {
                    self.typing.remote_event(&match_id, &user_id, is_typing).await;
                }
            }
            InboundEvent::Ack { id } => {
                debug!("Delivery ack: {:?}", id);
            }
            InboundEvent::AuthOk { .. } | InboundEvent::AuthError { .. } => {}
        }
    }
}
