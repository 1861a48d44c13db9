/// Connection management for the realtime channel
///
/// One `ConnectionManager` per authenticated session, owning at most one live
/// transport. The transport is newline-delimited JSON over TCP: an `auth`
/// frame first, then `kind`-tagged events both ways. UI code never touches
/// the socket; it only calls `emit`/`join_conversation`/`disconnect` and
/// subscribes to the event/status streams.
use crate::config::Config;
use crate::error::{AmoraError, Result};
use crate::realtime::event::{match_room, personal_room, InboundEvent, OutboundEvent};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

/// Transport state of the realtime connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    /// Not connected
    Disconnected,
    /// First connection attempt in flight
    Connecting,
    /// Authenticated and serving traffic
    Connected,
    /// Lost the transport; backoff retries in flight
    Reconnecting,
}

/// Status signals surfaced to the UI. Per-attempt transport errors are
/// logged, never streamed; only terminal outcomes get a dedicated signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    StateChanged(TransportState),
    /// Retry budget exhausted; one terminal signal per outage
    Offline,
    /// The backend rejected the identity token; no retries follow
    AuthFailed { reason: String },
}

/// Identity presented during the auth handshake
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: String,
    pub token: String,
}

/// Rooms the connection is a member of. At most one conversation room at a
/// time; joining a new one implicitly leaves the previous one.
#[derive(Debug, Clone)]
struct RoomMembership {
    personal: String,
    conversation: Option<String>,
}

/// Owns the transport lifecycle: connect/auth/reconnect/teardown and
/// room membership. Cheap to clone; clones share the same connection.
#[derive(Clone)]
pub struct ConnectionManager {
    config: Config,
    identity: Identity,
    state: Arc<RwLock<TransportState>>,
    rooms: Arc<RwLock<RoomMembership>>,
    outbound: Arc<RwLock<Option<mpsc::UnboundedSender<OutboundEvent>>>>,
    events: broadcast::Sender<InboundEvent>,
    status: broadcast::Sender<ConnectionStatus>,
    supervisor: Arc<RwLock<Option<JoinHandle<()>>>>,
}

impl ConnectionManager {
    pub fn new(config: Config, identity: Identity) -> Self {
        let (events, _) = broadcast::channel(256);
        let (status, _) = broadcast::channel(64);
        let rooms = RoomMembership {
            personal: personal_room(&identity.user_id),
            conversation: None,
        };
        Self {
            config,
            identity,
            state: Arc::new(RwLock::new(TransportState::Disconnected)),
            rooms: Arc::new(RwLock::new(rooms)),
            outbound: Arc::new(RwLock::new(None)),
            events,
            status,
            supervisor: Arc::new(RwLock::new(None)),
        }
    }

    /// Validated inbound events, in backend arrival order
    pub fn subscribe_events(&self) -> broadcast::Receiver<InboundEvent> {
        self.events.subscribe()
    }

    /// Connection status signals (state changes and terminal outcomes)
    pub fn subscribe_status(&self) -> broadcast::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    pub async fn state(&self) -> TransportState {
        *self.state.read().await
    }

    /// Start the connection supervisor. Any previous transport is torn down
    /// first, so a session never holds two live transports.
    pub async fn connect(&self) {
        self.disconnect().await;
        self.set_state(TransportState::Connecting).await;

        let manager = self.clone();
        let handle = tokio::spawn(async move { manager.run().await });
        *self.supervisor.write().await = Some(handle);
    }

    /// Explicit teardown. Idempotent and reachable from any state; cancels
    /// the supervisor and with it any pending backoff sleep.
    pub async fn disconnect(&self) {
        if let Some(handle) = self.supervisor.write().await.take() {
            handle.abort();
        }
        *self.outbound.write().await = None;

        let previous = {
            let mut state = self.state.write().await;
            std::mem::replace(&mut *state, TransportState::Disconnected)
        };
        if previous != TransportState::Disconnected {
            info!("Realtime connection closed");
            let _ = self
                .status
                .send(ConnectionStatus::StateChanged(TransportState::Disconnected));
        }
    }

    /// Fire-and-forget emission: dropped (not queued) unless `Connected`.
    /// Callers must treat delivery as best-effort; anything durable goes
    /// through the REST layer.
    pub async fn emit(&self, event: OutboundEvent) {
        if self.state().await != TransportState::Connected {
            debug!("Dropping {} while not connected", event.kind());
            return;
        }
        let outbound = self.outbound.read().await;
        match outbound.as_ref() {
            Some(tx) => {
                if tx.send(event).is_err() {
                    debug!("Transport gone, outbound event dropped");
                }
            }
            None => debug!("No live transport, outbound event dropped"),
        }
    }

    /// Switch the active conversation room. Leaves the previous room first
    /// so the connection is never in two conversation rooms at once.
    pub async fn join_conversation(&self, match_id: &str) {
        let room = match_room(match_id);
        let previous = {
            let mut rooms = self.rooms.write().await;
            if rooms.conversation.as_deref() == Some(room.as_str()) {
                return;
            }
            rooms.conversation.replace(room.clone())
        };
        if let Some(previous) = previous {
            self.emit(OutboundEvent::LeaveRoom { room: previous }).await;
        }
        self.emit(OutboundEvent::JoinRoom { room }).await;
    }

    pub async fn leave_conversation(&self) {
        let room = self.rooms.write().await.conversation.take();
        if let Some(room) = room {
            self.emit(OutboundEvent::LeaveRoom { room }).await;
        }
    }

    pub async fn active_conversation(&self) -> Option<String> {
        self.rooms.read().await.conversation.clone()
    }

    /// Supervisor loop: connect, serve, and retry with bounded exponential
    /// backoff. Auth rejection ends the loop immediately; an exhausted retry
    /// budget surfaces one terminal offline signal.
    async fn run(&self) {
        let mut attempt: u32 = 0;
        loop {
            match self.establish().await {
                Ok((lines, write_half)) => {
                    attempt = 0;
                    self.set_state(TransportState::Connected).await;
                    info!("Connected to realtime backend as {}", self.identity.user_id);
                    match self.serve(lines, write_half).await {
                        Ok(()) => info!("Server closed the connection"),
                        Err(e) => warn!("Transport error: {}", e),
                    }
                    *self.outbound.write().await = None;
                }
                Err(AmoraError::Auth(reason)) => {
                    error!("Authentication rejected: {}", reason);
                    self.set_state(TransportState::Disconnected).await;
                    let _ = self.status.send(ConnectionStatus::AuthFailed { reason });
                    return;
                }
                Err(e) => {
                    warn!("Connect attempt failed: {}", e);
                }
            }

            attempt += 1;
            if attempt >= self.config.max_connect_attempts {
                info!("Retries exhausted after {} attempts, going offline", attempt);
                self.set_state(TransportState::Disconnected).await;
                let _ = self.status.send(ConnectionStatus::Offline);
                return;
            }

            self.set_state(TransportState::Reconnecting).await;
            let delay = self.backoff_delay(attempt);
            debug!(
                "Reconnecting in {:?} (attempt {}/{})",
                delay,
                attempt + 1,
                self.config.max_connect_attempts
            );
            sleep(delay).await;
        }
    }

    /// Dial the backend and run the auth handshake. Hands back the reader
    /// and writer halves so `serve` continues on the same buffered stream
    /// and no frame pushed right after the auth reply is lost.
    async fn establish(&self) -> Result<(Lines<BufReader<OwnedReadHalf>>, OwnedWriteHalf)> {
        debug!("Connecting to {}", self.config.server_addr);
        let stream = timeout(
            self.config.connect_timeout,
            TcpStream::connect(self.config.server_addr),
        )
        .await
        .map_err(|_| AmoraError::Timeout(format!("Connect timeout to {}", self.config.server_addr)))?
        .map_err(AmoraError::Io)?;

        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();

        let auth = OutboundEvent::Auth {
            token: self.identity.token.clone(),
            user_id: self.identity.user_id.clone(),
        };
        let frame = auth.to_line().map_err(AmoraError::Serialization)?;
        write_half.write_all(frame.as_bytes()).await.map_err(AmoraError::Io)?;
        write_half.write_all(b"\n").await.map_err(AmoraError::Io)?;

        let reply = timeout(self.config.connect_timeout, lines.next_line())
            .await
            .map_err(|_| AmoraError::Timeout("Auth reply timeout".to_string()))?
            .map_err(AmoraError::Io)?
            .ok_or_else(|| AmoraError::Connection("Server closed during auth".to_string()))?;

        match InboundEvent::from_line(reply.trim()) {
            Ok(InboundEvent::AuthOk { user_id }) => {
                debug!("Authenticated as {}", user_id);
                Ok((lines, write_half))
            }
            Ok(InboundEvent::AuthError { reason }) => Err(AmoraError::Auth(reason)),
            Ok(other) => Err(AmoraError::Protocol(format!(
                "Expected auth reply, got {}",
                other.kind()
            ))),
            Err(e) => Err(AmoraError::Protocol(format!("Invalid auth reply: {}", e))),
        }
    }

    /// Serve one established transport until it drops: pump outbound events
    /// to the socket and publish validated inbound frames. Joins the personal
    /// room (and the active conversation room, if any) first, which makes
    /// reconnects transparent to membership.
    async fn serve(
        &self,
        mut lines: Lines<BufReader<OwnedReadHalf>>,
        mut write_half: OwnedWriteHalf,
    ) -> Result<()> {
        let (tx, mut rx) = mpsc::unbounded_channel::<OutboundEvent>();
        *self.outbound.write().await = Some(tx.clone());

        {
            let rooms = self.rooms.read().await;
            let _ = tx.send(OutboundEvent::JoinRoom {
                room: rooms.personal.clone(),
            });
            if let Some(room) = rooms.conversation.clone() {
                let _ = tx.send(OutboundEvent::JoinRoom { room });
            }
        }

        loop {
            tokio::select! {
                line = lines.next_line() => match line {
                    Ok(Some(line)) => self.handle_line(&line),
                    Ok(None) => return Ok(()),
                    Err(e) => return Err(AmoraError::Io(e)),
                },
                event = rx.recv() => match event {
                    Some(event) => {
                        let frame = event.to_line().map_err(AmoraError::Serialization)?;
                        write_half.write_all(frame.as_bytes()).await.map_err(AmoraError::Io)?;
                        write_half.write_all(b"\n").await.map_err(AmoraError::Io)?;
                    }
                    None => return Ok(()),
                },
            }
        }
    }

    /// Parse, validate, and publish one inbound frame. A malformed payload is
    /// dropped with a warning so one bad frame cannot destabilize the loop.
    fn handle_line(&self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        let event = match InboundEvent::from_line(line) {
            Ok(event) => event,
            Err(e) => {
                warn!("Malformed frame dropped: {}", e);
                return;
            }
        };
        let kind = event.kind();
        let Some(event) = event.validate() else {
            warn!("Invalid {} event dropped", kind);
            return;
        };
        match event {
            InboundEvent::AuthOk { .. } | InboundEvent::AuthError { .. } => {
                debug!("Unexpected {} mid-stream, ignored", kind);
            }
            event => {
                let _ = self.events.send(event);
            }
        }
    }

    async fn set_state(&self, next: TransportState) {
        let previous = {
            let mut state = self.state.write().await;
            std::mem::replace(&mut *state, next)
        };
        if previous != next {
            let _ = self.status.send(ConnectionStatus::StateChanged(next));
        }
    }

    /// Exponential backoff with ±20% jitter, capped
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let doublings = attempt.saturating_sub(1).min(16);
        let exp = self.config.backoff_base.saturating_mul(1u32 << doublings);
        let capped = exp.min(self.config.backoff_cap);
        capped.mul_f64(rand::thread_rng().gen_range(0.8..1.2))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> ConnectionManager {
        let config = Config {
            backoff_base: Duration::from_millis(100),
            backoff_cap: Duration::from_millis(450),
            ..Default::default()
        };
        let identity = Identity {
            user_id: "u1".to_string(),
            token: "t".to_string(),
        };
        ConnectionManager::new(config, identity)
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let manager = manager();
        let first = manager.backoff_delay(1);
        assert!(first >= Duration::from_millis(80) && first <= Duration::from_millis(120));

        let second = manager.backoff_delay(2);
        assert!(second >= Duration::from_millis(160) && second <= Duration::from_millis(240));

        // Capped at 450ms before jitter
        let deep = manager.backoff_delay(10);
        assert!(deep <= Duration::from_millis(540));
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let manager = manager();
        manager.disconnect().await;
        manager.disconnect().await;
        assert_eq!(manager.state().await, TransportState::Disconnected);
    }

    #[tokio::test]
    async fn test_emit_while_disconnected_is_dropped() {
        let manager = manager();
        // No transport: must not panic, block, or queue
        manager
            .emit(OutboundEvent::Typing {
                match_id: "x".to_string(),
                is_typing: true,
            })
            .await;
        assert_eq!(manager.state().await, TransportState::Disconnected);
    }

    #[tokio::test]
    async fn test_join_conversation_tracks_single_room() {
        let manager = manager();
        manager.join_conversation("m1").await;
        assert_eq!(manager.active_conversation().await, Some("match_m1".to_string()));

        manager.join_conversation("m2").await;
        assert_eq!(manager.active_conversation().await, Some("match_m2".to_string()));

        manager.leave_conversation().await;
        assert_eq!(manager.active_conversation().await, None);
    }
}
