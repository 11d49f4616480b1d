//! Session coordinator: the state machine that takes two independently
//! started processes from searching, through role arbitration and the
//! readiness handshake, into a running replicated session, and back to
//! searching when the opponent leaves.
//!
//! All session and game state is mutated under one lock; inbound handlers,
//! the periodic tick and the game-loop entry points serialize through it and
//! run to completion. Sends are fire-and-forget, never retried.
//!
//! The readiness handshake assumes a lossless LAN: a lost `ready` or `ack`
//! leaves both sides in sync-ready forever. There is deliberately no
//! retransmission or timeout.

pub mod events;
pub mod replica;
pub mod state;

pub use events::{SessionEvent, StatusChange};
pub use replica::ReplicatedGameState;
pub use state::{decide_role, Role, SessionState};

use crate::builders::NodeConfig;
use crate::discovery::{Beacon, DiscoveryChannel};
use crate::error::{Result, VolleyError};
use crate::protocol::announce::{Announcement, PeerRecord};
use crate::protocol::message::{GameMessage, Payload, PlayerSlot, Vec2};
use crate::registry::PeerRegistry;
use crate::transport::{Datagram, Transport};
use futures::StreamExt;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

struct Inner {
    session: SessionState,
    role: Option<Role>,
    replica: ReplicatedGameState,
    last_sent_paddle: Option<Vec2>,
}

/// Protocol core. One per process, explicitly constructed and handed to the
/// game loop together with the event receiver.
pub struct Coordinator<T, B> {
    name: String,
    points_to_win: u32,
    window_size: Vec2,
    self_record: PeerRecord,
    transport: Arc<T>,
    registry: PeerRegistry<T>,
    discovery: DiscoveryChannel<B>,
    state: Mutex<Inner>,
    events: mpsc::UnboundedSender<SessionEvent>,
    cancel: CancellationToken,
}

impl<T, B> Coordinator<T, B>
where
    T: Transport + 'static,
    B: Beacon + 'static,
{
    /// Builds the coordinator and the notification channel for the game loop.
    pub fn new(
        config: NodeConfig,
        transport: Arc<T>,
        beacon: Arc<B>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<SessionEvent>) {
        let keys = transport.local_keys();
        let descriptor = Announcement {
            addr: config.bind_addr,
            name: config.name.clone(),
            enc_key: keys.enc_key,
            sign_key: keys.sign_key,
            session_type: config.session_type.clone(),
        };
        let self_record = descriptor.clone().into_record();
        let (events, events_rx) = mpsc::unbounded_channel();

        let coordinator = Arc::new(Self {
            name: config.name,
            points_to_win: config.points_to_win,
            window_size: config.window_size,
            self_record,
            registry: PeerRegistry::new(transport.clone()),
            transport,
            discovery: DiscoveryChannel::new(beacon, descriptor),
            state: Mutex::new(Inner {
                session: SessionState::Searching,
                role: None,
                replica: ReplicatedGameState::default(),
                last_sent_paddle: None,
            }),
            events,
            cancel: CancellationToken::new(),
        });

        (coordinator, events_rx)
    }

    /// Starts discovery and the inbound pumps. Call once.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        self.discovery.begin().await?;

        let Some(mut accepted) = self.discovery.accepted().await else {
            return Err(VolleyError::InvalidState(
                "coordinator already started".to_string(),
            ));
        };

        let this = Arc::clone(self);
        let token = self.cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    record = accepted.recv() => {
                        let Some(record) = record else { break };
                        this.handle_announcement(record).await;
                    }
                }
            }
        });

        let mut incoming = self.transport.incoming();
        let this = Arc::clone(self);
        let token = self.cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    datagram = incoming.next() => {
                        let Some(datagram) = datagram else { break };
                        this.handle_datagram(datagram).await;
                    }
                }
            }
        });

        tracing::info!("welcome {} - searching for an opponent", self.name);
        Ok(())
    }

    /// Local display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn session_state(&self) -> SessionState {
        self.state.lock().await.session
    }

    pub async fn role(&self) -> Option<Role> {
        self.state.lock().await.role
    }

    pub async fn scores(&self) -> [u32; 2] {
        self.state.lock().await.replica.scores
    }

    /// Snapshot of the replicated game state.
    pub async fn game_state(&self) -> ReplicatedGameState {
        self.state.lock().await.replica.clone()
    }

    pub async fn opponent(&self) -> Option<SocketAddr> {
        self.registry.current_opponent().await
    }

    pub async fn discovery_active(&self) -> bool {
        self.discovery.is_active().await
    }

    /// Periodic driver entry point. Promotes a synchronized session to
    /// running on the first call; outside the running states a tick is a
    /// no-op. Publishes the local paddle at most once per tick and only when
    /// it moved since the last send.
    pub async fn tick(&self, local_paddle: Option<Vec2>) {
        let outbound = {
            let mut inner = self.state.lock().await;
            match inner.session {
                SessionState::Synchronized => {
                    inner.session = SessionState::Running;
                    tracing::info!("session running");
                }
                SessionState::Running => {}
                _ => return,
            }

            let Some(position) = local_paddle else { return };
            let Some(role) = inner.role else { return };
            inner.replica.set_paddle(role.slot(), position);
            if inner.last_sent_paddle == Some(position) {
                return;
            }
            inner.last_sent_paddle = Some(position);
            Payload::from(GameMessage::PaddlePosition(position))
        };
        self.registry.send_payload(&outbound).await;
    }

    /// Owner-side scoring event from the game loop. Replicates the new score
    /// and, at the threshold, the authoritative game-over notice.
    pub async fn record_point(&self, scorer: PlayerSlot) {
        let outbound = {
            let mut inner = self.state.lock().await;
            if inner.role != Some(Role::Owner) {
                tracing::warn!("only the owner records points");
                return;
            }
            if !matches!(
                inner.session,
                SessionState::Running | SessionState::Paused
            ) {
                tracing::debug!("point recorded while {}", inner.session);
                return;
            }

            let points = inner.replica.record_point(scorer);
            self.emit(SessionEvent::ScoreUpdate {
                slot: scorer,
                points,
            });

            let mut payload = Payload::from(GameMessage::Score {
                slot: scorer,
                points,
            });
            // win condition evaluated locally on every scoring event
            if inner.replica.winner(self.points_to_win).is_some() {
                self.check_win(&mut inner);
                payload.push(GameMessage::GameOver(scorer));
            }
            payload
        };
        self.registry.send_payload(&outbound).await;
    }

    /// Flips the pause state and replicates the new flag.
    pub async fn toggle_pause(&self) {
        let outbound = {
            let mut inner = self.state.lock().await;
            let flag = match inner.session {
                SessionState::Running => {
                    inner.session = SessionState::Paused;
                    true
                }
                SessionState::Paused => {
                    inner.session = SessionState::Running;
                    false
                }
                _ => {
                    tracing::debug!("pause toggled while {}", inner.session);
                    return;
                }
            };
            inner.replica.paused = flag;
            self.emit(SessionEvent::GameStatusUpdate(StatusChange::Paused(flag)));
            Payload::from(GameMessage::Pause(flag))
        };
        self.registry.send_payload(&outbound).await;
    }

    /// Zeroes both scores, clears a finished game and replicates the reset.
    pub async fn reset_scores(&self) {
        let outbound = {
            let mut inner = self.state.lock().await;
            if inner.role.is_none() {
                return;
            }
            self.apply_reset(&mut inner);
            Payload::from(GameMessage::ResetScores)
        };
        self.registry.send_payload(&outbound).await;
    }

    /// Publishes game-loop data through the replication channel. Kinds only
    /// the Owner may send are dropped with a warning when called as Guest.
    pub async fn send_game_data(&self, messages: impl IntoIterator<Item = GameMessage>) {
        let outbound = {
            let inner = self.state.lock().await;
            let Some(role) = inner.role else {
                tracing::warn!("no opponent connected, dropping game data");
                return;
            };
            let mut payload = Payload::new();
            for message in messages {
                if message.owner_only() && role != Role::Owner {
                    tracing::warn!("guest may not send {}, dropping", message.key());
                    continue;
                }
                payload.push(message);
            }
            if payload.is_empty() {
                return;
            }
            payload
        };
        self.registry.send_payload(&outbound).await;
    }

    /// Notifies the opponent and tears the session down for good.
    pub async fn leave(&self) {
        {
            let mut inner = self.state.lock().await;
            if inner.session == SessionState::Disconnected {
                return;
            }
            inner.session = SessionState::Disconnected;
        }
        if self.registry.current_opponent().await.is_some() {
            self.registry
                .send_payload(&Payload::from(GameMessage::OpponentLeft))
                .await;
        }
        self.registry.clear().await;
        self.discovery.end().await;
        self.cancel.cancel();
        tracing::info!("session torn down");
    }

    /// Guest-path trigger: an accepted announcement names a candidate
    /// opponent. Installs it, answers with the init record and commits the
    /// role. Exactly one init and one `OpponentFound` per accepted record.
    async fn handle_announcement(&self, announcement: Announcement) {
        let mut inner = self.state.lock().await;
        if inner.session != SessionState::Searching {
            tracing::debug!(
                "ignoring announcement from {:?} while {}",
                announcement.name,
                inner.session
            );
            return;
        }

        let Some(role) = decide_role(&self.name, &announcement.name) else {
            tracing::warn!(
                "cannot arbitrate roles against identical name {:?}",
                announcement.name
            );
            return;
        };

        let name = announcement.name.clone();
        if let Err(e) = self.registry.set_opponent(announcement.into_record()).await {
            tracing::error!("failed to install opponent: {}", e);
            return;
        }

        self.registry
            .send_payload(&Payload::from(GameMessage::Init(self.self_record.clone())))
            .await;
        tracing::info!("found opponent: {}", name);
        self.emit(SessionEvent::OpponentFound { name });

        inner.session = SessionState::AwaitingRoleDecision;
        self.commit_role(&mut inner, role).await;
        self.discovery.end().await;
    }

    async fn handle_datagram(&self, datagram: Datagram) {
        let text = match std::str::from_utf8(&datagram.payload) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("dropping non-UTF-8 datagram from {}: {}", datagram.from, e);
                return;
            }
        };
        let payload = match Payload::decode(text) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!("dropping payload from {}: {}", datagram.from, e);
                return;
            }
        };
        // each bundled key is dispatched on its own
        for message in payload.into_messages() {
            match message {
                GameMessage::Init(record) => self.handle_init(record).await,
                other => self.handle_replication(other).await,
            }
        }
    }

    /// Owner-path trigger: the opponent addressed us first.
    async fn handle_init(&self, record: PeerRecord) {
        let mut inner = self.state.lock().await;
        if inner.session != SessionState::Searching {
            // a duplicate init from the current opponent refreshes keys
            if Some(record.addr) == self.registry.current_opponent().await
                && record.validate().is_ok()
            {
                if let Err(e) = self.registry.set_opponent(record).await {
                    tracing::error!("failed to refresh opponent keys: {}", e);
                }
            } else {
                tracing::debug!("ignoring init from {} while {}", record.addr, inner.session);
            }
            return;
        }

        if let Err(e) = record.validate() {
            tracing::warn!("dropping init: {}", e);
            return;
        }
        let Some(role) = decide_role(&self.name, &record.name) else {
            tracing::warn!(
                "cannot arbitrate roles against identical name {:?}",
                record.name
            );
            return;
        };

        let name = record.name.clone();
        if let Err(e) = self.registry.set_opponent(record).await {
            tracing::error!("failed to install opponent: {}", e);
            return;
        }
        tracing::info!("addressed by opponent: {}", name);
        self.emit(SessionEvent::GameInit { name });

        inner.session = SessionState::AwaitingRoleDecision;
        self.commit_role(&mut inner, role).await;
        self.discovery.end().await;
    }

    /// Commits the arbitrated role and opens the readiness handshake.
    async fn commit_role(&self, inner: &mut MutexGuard<'_, Inner>, role: Role) {
        inner.role = Some(role);
        tracing::info!("role decided: {}", role);
        self.emit(SessionEvent::RoleDecided { role });
        inner.session = SessionState::SyncReady;

        if role == Role::Owner {
            self.registry
                .send_payload(&Payload::from(GameMessage::WinSize(self.window_size)))
                .await;
        }
        self.registry
            .send_payload(&Payload::from(GameMessage::Ready))
            .await;
    }

    async fn handle_replication(&self, message: GameMessage) {
        let mut inner = self.state.lock().await;
        if inner.session == SessionState::Disconnected {
            tracing::debug!("message received after teardown, ignoring");
            return;
        }
        match message {
            GameMessage::Ready => {
                if inner.session == SessionState::SyncReady {
                    self.registry
                        .send_payload(&Payload::from(GameMessage::Acknowledge))
                        .await;
                    self.synchronize(&mut inner);
                } else {
                    tracing::debug!("ready received while {}", inner.session);
                }
            }
            GameMessage::Acknowledge => {
                if inner.session == SessionState::SyncReady {
                    self.synchronize(&mut inner);
                } else {
                    tracing::debug!("ack received while {}", inner.session);
                }
            }
            GameMessage::PaddlePosition(position) => {
                let Some(role) = inner.role else { return };
                inner.replica.set_paddle(role.slot().other(), position);
                self.emit(SessionEvent::GameDataUpdate(GameMessage::PaddlePosition(
                    position,
                )));
            }
            GameMessage::BallVelocity(velocity) => {
                if inner.role.is_none() {
                    return;
                }
                inner.replica.apply_ball_velocity(velocity);
                self.emit(SessionEvent::GameDataUpdate(GameMessage::BallVelocity(
                    velocity,
                )));
            }
            GameMessage::BallPosition(position) => {
                if inner.role.is_none() {
                    return;
                }
                // skipping the unchanged case avoids redundant reassignment
                if inner.replica.apply_ball_position(position) {
                    self.emit(SessionEvent::GameDataUpdate(GameMessage::BallPosition(
                        position,
                    )));
                }
            }
            GameMessage::Score { slot, points } => {
                if inner.role.is_none() {
                    return;
                }
                inner.replica.apply_score(slot, points);
                self.emit(SessionEvent::ScoreUpdate { slot, points });
                // the guest reaches the same verdict from the score alone
                self.check_win(&mut inner);
            }
            GameMessage::Pause(flag) => {
                inner.replica.paused = flag;
                match (inner.session, flag) {
                    (SessionState::Running, true) => inner.session = SessionState::Paused,
                    (SessionState::Paused, false) => inner.session = SessionState::Running,
                    _ => {}
                }
                self.emit(SessionEvent::GameStatusUpdate(StatusChange::Paused(flag)));
            }
            GameMessage::ResetScores => {
                if inner.role.is_none() {
                    return;
                }
                self.apply_reset(&mut inner);
            }
            GameMessage::OpponentLeft => {
                self.reset_to_searching(&mut inner).await;
            }
            GameMessage::GameOver(winner) => {
                let Some(role) = inner.role else { return };
                if inner.session == SessionState::GameOver {
                    tracing::debug!("duplicate game-over notice");
                    return;
                }
                inner.session = SessionState::GameOver;
                self.emit(SessionEvent::GameStatusUpdate(StatusChange::GameOver {
                    winner,
                    local_win: role.slot() == winner,
                }));
            }
            GameMessage::WinSize(size) => {
                inner.replica.window_size = size;
                self.emit(SessionEvent::GameStatusUpdate(StatusChange::WindowSize(
                    size,
                )));
            }
            GameMessage::Init(_) => {
                tracing::debug!("init outside the handshake path, ignoring");
            }
        }
    }

    fn synchronize(&self, inner: &mut MutexGuard<'_, Inner>) {
        inner.session = SessionState::Synchronized;
        tracing::info!("session synchronized");
        self.emit(SessionEvent::Synchronized);
    }

    /// Pure threshold check; transitions to game-over at most once.
    fn check_win(&self, inner: &mut MutexGuard<'_, Inner>) {
        let Some(winner) = inner.replica.winner(self.points_to_win) else {
            return;
        };
        if !matches!(
            inner.session,
            SessionState::Running | SessionState::Paused
        ) {
            return;
        }
        inner.session = SessionState::GameOver;
        let local_win = inner.role.map(|r| r.slot() == winner).unwrap_or(false);
        self.emit(SessionEvent::GameStatusUpdate(StatusChange::GameOver {
            winner,
            local_win,
        }));
    }

    fn apply_reset(&self, inner: &mut MutexGuard<'_, Inner>) {
        inner.replica.reset_scores();
        inner.replica.paused = false;
        if matches!(
            inner.session,
            SessionState::GameOver | SessionState::Paused
        ) {
            inner.session = SessionState::Running;
        }
        self.emit(SessionEvent::GameStatusUpdate(StatusChange::ScoresReset));
    }

    /// Full reset after an opponent-left notice: scores zeroed, role
    /// re-armed, registry cleared, discovery restarted.
    async fn reset_to_searching(&self, inner: &mut MutexGuard<'_, Inner>) {
        inner.replica = ReplicatedGameState::default();
        inner.role = None;
        inner.last_sent_paddle = None;
        inner.session = SessionState::Searching;
        self.registry.clear().await;
        tracing::info!("opponent left, searching again");
        self.emit(SessionEvent::GameStatusUpdate(StatusChange::OpponentLeft));
        if let Err(e) = self.discovery.begin().await {
            tracing::error!("failed to restart discovery: {}", e);
        }
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}
