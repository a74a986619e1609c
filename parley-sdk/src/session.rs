//! The session connection manager.
//!
//! Owns the one live link to the chat backend and everything that keeps
//! it healthy: lifecycle state, the offline outbound queue, heartbeat
//! and background-retry supervision, and room resync after a resume.
//!
//! All work happens on a single dispatch loop. Commands from the
//! [`SessionHandle`], events from the transport link, timer ticks, and
//! reconnect deadlines each arrive as one wake-up of a `select!` loop,
//! so state is owned by one task and never needs locking. Every link is
//! tagged with a monotonically increasing generation; events and timers
//! carry the generation they were created under and are dropped when a
//! newer link has taken over. That is the entire defense against stale
//! callbacks; there is no shared mutable connection global.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::time::{self, Duration, Instant};

use crate::config::SessionConfig;
use crate::event::{DirectMessage, DirectMessageEcho, LinkEvent, RoomMessage, UserIdentity};
use crate::queue::OutboundQueue;
use crate::storage::{BACKGROUND_ENTERED_AT_KEY, LAST_ACTIVE_ROOM_KEY, SessionStorage};
use crate::store::{ChatMessage, ChatStore, ConnectionState, UserKind, conversation_id};
use crate::transport::{Connector, TransportLink};

/// App lifecycle states as reported by the host platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppLifecycle {
    Active,
    Background,
    /// Transitional state on iOS; treated the same as background.
    Inactive,
}

type DisconnectCallback = Box<dyn Fn() + Send>;

enum Command {
    Init {
        identity: UserIdentity,
    },
    Queue {
        event: String,
        payload: Value,
    },
    Lifecycle(AppLifecycle),
    Disconnect,
    ResetOnLogout,
    RegisterDisconnectCallback {
        key: String,
        callback: DisconnectCallback,
    },
    UnregisterDisconnectCallback {
        key: String,
    },
    Shutdown,
}

/// Handle to a running session manager.
///
/// All operations are non-blocking and never fail to the caller; the
/// manager logs and degrades instead, because the app must stay usable
/// while fully offline.
#[derive(Clone)]
pub struct SessionHandle {
    cmd_tx: mpsc::UnboundedSender<Command>,
    connected: Arc<AtomicBool>,
    store: Arc<ChatStore>,
}

impl SessionHandle {
    /// Connect (or attach) the session to a user identity. Idempotent
    /// for the same user; a different user tears the old session down
    /// first.
    pub fn init(&self, user_id: u64, username: &str) {
        let _ = self.cmd_tx.send(Command::Init {
            identity: UserIdentity::new(user_id, username),
        });
    }

    /// Queue an outbound event for delivery on the next (re)connect.
    pub fn queue_message(&self, event: &str, payload: Value) {
        let _ = self.cmd_tx.send(Command::Queue {
            event: event.to_string(),
            payload,
        });
    }

    /// Whether the link is currently up.
    pub fn is_ready(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Report an app lifecycle transition.
    pub fn notify_lifecycle(&self, state: AppLifecycle) {
        let _ = self.cmd_tx.send(Command::Lifecycle(state));
    }

    /// Tear the session down: timers, queue, link, identity.
    pub fn disconnect(&self) {
        let _ = self.cmd_tx.send(Command::Disconnect);
    }

    /// Tear down on logout. Equivalent to [`Self::disconnect`]; queued
    /// messages are dropped, never delivered across identities.
    pub fn reset_on_logout(&self) {
        let _ = self.cmd_tx.send(Command::ResetOnLogout);
    }

    /// Register a callback invoked once per full teardown. Registering
    /// the same key again has no effect.
    pub fn register_disconnect_callback(&self, key: &str, callback: impl Fn() + Send + 'static) {
        let _ = self.cmd_tx.send(Command::RegisterDisconnectCallback {
            key: key.to_string(),
            callback: Box::new(callback),
        });
    }

    pub fn unregister_disconnect_callback(&self, key: &str) {
        let _ = self.cmd_tx.send(Command::UnregisterDisconnectCallback {
            key: key.to_string(),
        });
    }

    /// The shared store delivered events land in.
    pub fn store(&self) -> Arc<ChatStore> {
        Arc::clone(&self.store)
    }

    /// Stop the dispatch loop entirely. Mainly for tests and app exit.
    pub fn shutdown(&self) {
        let _ = self.cmd_tx.send(Command::Shutdown);
    }
}

/// Spawn the session manager dispatch loop.
pub fn spawn(
    config: SessionConfig,
    connector: Arc<dyn Connector>,
    storage: Arc<dyn SessionStorage>,
) -> SessionHandle {
    let store = Arc::new(ChatStore::new());
    let connected = Arc::new(AtomicBool::new(false));
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (link_tx, link_rx) = mpsc::unbounded_channel();

    let dispatcher = Dispatcher {
        config,
        connector,
        storage,
        store: Arc::clone(&store),
        connected: Arc::clone(&connected),
        cmd_rx,
        link_tx,
        link_rx,
        link: None,
        state: LinkState::Absent,
        next_generation: 0,
        epoch: None,
        queue: OutboundQueue::new(),
        in_background: false,
        background_entered_instant: None,
        background_entered_at_ms: None,
        heartbeat: None,
        background_retry: None,
        disconnect_callbacks: HashMap::new(),
    };
    tokio::spawn(dispatcher.run());

    SessionHandle {
        cmd_tx,
        connected,
        store,
    }
}

/// Lifecycle of the current link.
#[derive(Debug, Clone, Copy, PartialEq)]
enum LinkState {
    /// No link exists.
    Absent,
    /// A link was opened and has not reported up yet.
    Connecting,
    Connected,
    /// The link dropped; the transport retries on its own.
    Disconnected,
    /// A resume-driven reconnect with a bounded deadline. `escalated`
    /// means the link was already force-recreated once.
    Reconnecting { deadline: Instant, escalated: bool },
}

struct Link {
    generation: u64,
    transport: Arc<dyn TransportLink>,
}

struct Heartbeat {
    generation: u64,
    interval: time::Interval,
}

enum Wake {
    Command(Command),
    Link(u64, LinkEvent),
    Heartbeat,
    BackgroundRetry,
    Deadline,
}

struct Dispatcher {
    config: SessionConfig,
    connector: Arc<dyn Connector>,
    storage: Arc<dyn SessionStorage>,
    store: Arc<ChatStore>,
    connected: Arc<AtomicBool>,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    link_tx: mpsc::UnboundedSender<(u64, LinkEvent)>,
    link_rx: mpsc::UnboundedReceiver<(u64, LinkEvent)>,
    link: Option<Link>,
    state: LinkState,
    next_generation: u64,
    epoch: Option<UserIdentity>,
    queue: OutboundQueue,
    in_background: bool,
    /// Monotonic instant of the last background entry, for elapsed time.
    background_entered_instant: Option<Instant>,
    /// Wall-clock ms of the last background entry, for the sync delta.
    background_entered_at_ms: Option<i64>,
    heartbeat: Option<Heartbeat>,
    background_retry: Option<time::Interval>,
    disconnect_callbacks: HashMap<String, DisconnectCallback>,
}

impl Dispatcher {
    async fn run(mut self) {
        loop {
            let deadline = self.pending_deadline();
            let wake = tokio::select! {
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(cmd) => Wake::Command(cmd),
                    None => break,
                },
                event = self.link_rx.recv() => match event {
                    Some((generation, event)) => Wake::Link(generation, event),
                    None => break,
                },
                _ = tick_or_pending(self.heartbeat.as_mut().map(|hb| &mut hb.interval)) => Wake::Heartbeat,
                _ = tick_or_pending(self.background_retry.as_mut()) => Wake::BackgroundRetry,
                _ = deadline_or_pending(deadline) => Wake::Deadline,
            };
            match wake {
                Wake::Command(Command::Shutdown) => break,
                Wake::Command(cmd) => self.handle_command(cmd),
                Wake::Link(generation, event) => self.handle_link_event(generation, event),
                Wake::Heartbeat => self.handle_heartbeat_tick(),
                Wake::BackgroundRetry => self.handle_background_retry_tick(),
                Wake::Deadline => self.handle_reconnect_deadline(),
            }
        }
        self.full_teardown("session loop stopping");
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Init { identity } => self.handle_init(identity),
            Command::Queue { event, payload } => self.handle_queue(event, payload),
            Command::Lifecycle(state) => match state {
                AppLifecycle::Active => self.handle_foreground(),
                AppLifecycle::Background | AppLifecycle::Inactive => self.handle_background(),
            },
            Command::Disconnect => self.full_teardown("explicit disconnect"),
            Command::ResetOnLogout => self.full_teardown("logout"),
            Command::RegisterDisconnectCallback { key, callback } => {
                self.disconnect_callbacks.entry(key).or_insert(callback);
            }
            Command::UnregisterDisconnectCallback { key } => {
                self.disconnect_callbacks.remove(&key);
            }
            Command::Shutdown => {}
        }
    }

    // ─── Connect / init ──────────────────────────────────────────────

    fn handle_init(&mut self, identity: UserIdentity) {
        if let Some(epoch) = &self.epoch
            && epoch.user_id != identity.user_id
        {
            tracing::info!(
                from = epoch.user_id,
                to = identity.user_id,
                "user changed, tearing down previous session"
            );
            self.full_teardown("user switch");
        }

        if matches!(self.state, LinkState::Connecting) {
            tracing::debug!("link creation already in progress, ignoring init");
            return;
        }
        if self.link_connected()
            && self
                .epoch
                .as_ref()
                .is_some_and(|epoch| epoch.user_id == identity.user_id)
        {
            tracing::debug!(user = identity.user_id, "already connected, reusing link");
            return;
        }

        self.epoch = Some(identity.clone());
        self.store.set_current_user(Some(identity.clone()));
        self.open_link(&identity);
    }

    /// Open a fresh link, superseding and destroying any existing one.
    fn open_link(&mut self, identity: &UserIdentity) {
        if let Some(old) = self.link.take() {
            tracing::debug!(generation = old.generation, "destroying superseded link");
            old.transport.close();
        }
        self.heartbeat = None;

        self.next_generation += 1;
        let generation = self.next_generation;
        let opened = self.connector.open(identity);

        // Forward link events into the dispatch loop, tagged with this
        // link's generation so stale events can be recognized.
        let link_tx = self.link_tx.clone();
        let mut events = opened.events;
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if link_tx.send((generation, event)).is_err() {
                    break;
                }
            }
        });

        self.link = Some(Link {
            generation,
            transport: opened.link,
        });
        self.state = LinkState::Connecting;
        self.set_connected(false);
        self.store.set_connection_state(ConnectionState::Connecting);
        tracing::debug!(generation, user = identity.user_id, "opening link");
    }

    // ─── Link events ─────────────────────────────────────────────────

    fn handle_link_event(&mut self, generation: u64, event: LinkEvent) {
        let Some(link) = &self.link else {
            tracing::debug!(generation, "event from torn-down link ignored");
            return;
        };
        if link.generation != generation {
            tracing::debug!(
                generation,
                current = link.generation,
                "event from superseded link ignored"
            );
            return;
        }
        match event {
            LinkEvent::Up => self.handle_link_up(generation),
            LinkEvent::Down { reason } => self.handle_link_down(&reason),
            LinkEvent::ConnectError { message } => self.handle_connect_error(&message),
            LinkEvent::SessionReplaced => self.handle_session_replaced(),
            LinkEvent::DirectMessage(dm) => self.handle_direct_message(dm),
            LinkEvent::DirectMessageEcho(echo) => self.handle_direct_message_echo(echo),
            LinkEvent::RoomMessage(message) => self.handle_room_message(message),
        }
    }

    fn handle_link_up(&mut self, generation: u64) {
        let Some(identity) = self.epoch.clone() else {
            tracing::warn!("link came up without a user context, closing it");
            if let Some(link) = self.link.take() {
                link.transport.close();
            }
            self.state = LinkState::Absent;
            return;
        };

        let was = self.state;
        self.state = LinkState::Connected;
        self.set_connected(true);
        self.store.set_connection_state(ConnectionState::Connected);
        tracing::info!(user = identity.user_id, "link up, authenticating");

        self.emit(
            "auth:login",
            json!({ "userId": identity.user_id, "username": identity.username }),
        );

        if matches!(was, LinkState::Reconnecting { .. }) {
            // Resume-driven reconnect: rejoin the last room and pull the
            // messages missed while backgrounded.
            self.rejoin_and_sync(&identity);
        } else if let Some(room_id) = self.store.current_room() {
            // Fresh connect or transport auto-reconnect: silently rejoin
            // the room the UI is on.
            self.emit_silent_rejoin(&identity, &room_id);
        }

        self.flush_queue(&identity);
        self.start_heartbeat(generation);
    }

    fn handle_link_down(&mut self, reason: &str) {
        tracing::debug!(reason, "link went down");
        self.set_connected(false);
        self.store
            .set_connection_state(ConnectionState::Disconnected);
        if matches!(self.state, LinkState::Connected) {
            self.state = LinkState::Disconnected;
        }
    }

    fn handle_connect_error(&mut self, message: &str) {
        tracing::debug!(error = message, "link connect attempt failed");
        if matches!(self.state, LinkState::Connecting) {
            self.state = LinkState::Disconnected;
            self.store
                .set_connection_state(ConnectionState::Disconnected);
        }
    }

    /// The server replaced this session with a newer one. Terminal for
    /// the link: reconnecting would fight the single-session policy.
    fn handle_session_replaced(&mut self) {
        tracing::warn!("session replaced by another connection, not reconnecting");
        self.heartbeat = None;
        if let Some(link) = self.link.take() {
            link.transport.close();
        }
        self.state = LinkState::Absent;
        self.set_connected(false);
        self.store
            .set_connection_state(ConnectionState::Disconnected);
    }

    // ─── Outbound queue ──────────────────────────────────────────────

    fn handle_queue(&mut self, event: String, payload: Value) {
        let Some(identity) = &self.epoch else {
            tracing::debug!(event, "cannot queue message: no user context");
            return;
        };
        tracing::debug!(event, "message queued for next connect");
        self.queue.push(identity.user_id, event, payload);
    }

    fn flush_queue(&mut self, identity: &UserIdentity) {
        if !self.link_connected() {
            return;
        }
        let entries = self.queue.take_for(identity.user_id);
        if entries.is_empty() {
            return;
        }
        tracing::debug!(count = entries.len(), "flushing queued messages");
        for entry in entries {
            self.emit(&entry.event, entry.payload);
        }
    }

    // ─── Lifecycle ───────────────────────────────────────────────────

    fn handle_foreground(&mut self) {
        self.in_background = false;
        self.background_retry = None;

        let elapsed = self.background_elapsed();
        tracing::debug!(elapsed_secs = elapsed.as_secs(), "app resumed");

        if self.reconnect_in_flight() {
            tracing::debug!("reconnect already in progress, deferring resume work");
            return;
        }
        let Some(identity) = self.epoch.clone() else {
            return;
        };

        enum Resume {
            Create,
            Reconnect,
            AlreadyConnected,
        }
        let resume = match &self.link {
            None => Resume::Create,
            Some(link) if !link.transport.is_connected() => Resume::Reconnect,
            Some(_) => Resume::AlreadyConnected,
        };

        match resume {
            Resume::Create => {
                tracing::info!("no link on resume, creating one");
                self.open_link(&identity);
            }
            Resume::Reconnect => {
                tracing::info!("link down on resume, requesting reconnect");
                if let Some(link) = &self.link {
                    link.transport.request_reconnect();
                }
                self.state = LinkState::Reconnecting {
                    deadline: Instant::now() + self.config.reconnect_wait,
                    escalated: false,
                };
                self.store.set_connection_state(ConnectionState::Connecting);
            }
            Resume::AlreadyConnected => {
                if elapsed > self.config.reauth_threshold {
                    tracing::info!(
                        elapsed_secs = elapsed.as_secs(),
                        "long background, re-authenticating and resyncing"
                    );
                    self.emit(
                        "auth:login",
                        json!({ "userId": identity.user_id, "username": identity.username }),
                    );
                    self.rejoin_and_sync(&identity);
                }
            }
        }
    }

    fn handle_background(&mut self) {
        self.in_background = true;

        // Persist immediately: the OS may kill the process while we are
        // backgrounded and the resume sync needs this marker.
        let now_ms = chrono::Utc::now().timestamp_millis();
        self.background_entered_instant = Some(Instant::now());
        self.background_entered_at_ms = Some(now_ms);
        self.storage
            .set(BACKGROUND_ENTERED_AT_KEY, &now_ms.to_string());
        if let Some(room_id) = self.store.current_room() {
            self.storage.set(LAST_ACTIVE_ROOM_KEY, &room_id);
        }
        tracing::debug!("app moved to background");

        if self.config.platform.aggressive_background() && self.background_retry.is_none() {
            let period = self.config.background_retry_period;
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
            self.background_retry = Some(interval);
        }
    }

    fn background_elapsed(&self) -> Duration {
        if let Some(entered) = self.background_entered_instant {
            return Instant::now().saturating_duration_since(entered);
        }
        // Process was restarted while backgrounded: fall back to the
        // persisted wall-clock marker.
        let Some(entered_ms) = self
            .storage
            .get(BACKGROUND_ENTERED_AT_KEY)
            .and_then(|raw| raw.parse::<i64>().ok())
        else {
            return Duration::ZERO;
        };
        let now_ms = chrono::Utc::now().timestamp_millis();
        Duration::from_millis(now_ms.saturating_sub(entered_ms).max(0) as u64)
    }

    // ─── Rejoin + sync ───────────────────────────────────────────────

    fn emit_silent_rejoin(&self, identity: &UserIdentity, room_id: &str) {
        tracing::debug!(room_id, "silently rejoining room");
        self.emit(
            "room:silent_rejoin",
            json!({
                "roomId": room_id,
                "userId": identity.user_id,
                "username": identity.username,
                "lastMessageId": self.store.last_message_id(room_id),
            }),
        );
    }

    fn rejoin_and_sync(&mut self, identity: &UserIdentity) {
        let room_id = self
            .store
            .current_room()
            .or_else(|| self.storage.get(LAST_ACTIVE_ROOM_KEY));
        let Some(room_id) = room_id else {
            return;
        };

        self.emit_silent_rejoin(identity, &room_id);

        let since = self.background_entered_at_ms.or_else(|| {
            self.storage
                .get(BACKGROUND_ENTERED_AT_KEY)
                .and_then(|raw| raw.parse::<i64>().ok())
        });
        if let Some(since) = since {
            tracing::debug!(room_id, since, "requesting missed-message sync");
            self.emit(
                "room:messages:sync",
                json!({
                    "roomId": room_id,
                    "since": since,
                    "limit": self.config.sync_fetch_limit,
                }),
            );
            // The marker is consumed exactly once per background cycle.
            self.background_entered_at_ms = None;
            self.background_entered_instant = None;
            self.storage.remove(BACKGROUND_ENTERED_AT_KEY);
        }
    }

    // ─── Supervision timers ──────────────────────────────────────────

    fn start_heartbeat(&mut self, generation: u64) {
        let period = self.config.heartbeat_period;
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        self.heartbeat = Some(Heartbeat {
            generation,
            interval,
        });
    }

    fn handle_heartbeat_tick(&mut self) {
        let Some(owner) = self.heartbeat.as_ref().map(|hb| hb.generation) else {
            return;
        };
        let Some(link) = &self.link else {
            self.heartbeat = None;
            return;
        };
        if link.generation != owner {
            tracing::debug!("heartbeat for superseded link stopped");
            self.heartbeat = None;
            return;
        }
        if link.transport.is_connected() {
            link.transport.emit("ping", json!({}));
        } else if self.in_background && !self.reconnect_in_flight() {
            // Heartbeat doubles as a backstop reconnect trigger while the
            // app is backgrounded and nothing else is trying.
            tracing::debug!("link down in background, heartbeat requesting reconnect");
            link.transport.request_reconnect();
        }
    }

    fn handle_background_retry_tick(&mut self) {
        if !self.in_background || self.reconnect_in_flight() {
            return;
        }
        if let Some(link) = &self.link
            && !link.transport.is_connected()
        {
            tracing::debug!("background retry requesting reconnect");
            link.transport.request_reconnect();
        }
    }

    fn handle_reconnect_deadline(&mut self) {
        let LinkState::Reconnecting { escalated, .. } = self.state else {
            return;
        };
        let Some(identity) = self.epoch.clone() else {
            self.state = LinkState::Absent;
            return;
        };
        if escalated {
            // Not fatal: the app stays usable offline and the next
            // heartbeat tick or foreground transition retries.
            tracing::warn!("forced link recreation did not connect in time, staying offline");
            self.state = LinkState::Disconnected;
            self.store
                .set_connection_state(ConnectionState::Disconnected);
        } else {
            tracing::warn!("reconnect timed out, force-recreating link");
            self.open_link(&identity);
            self.state = LinkState::Reconnecting {
                deadline: Instant::now() + self.config.recreate_wait,
                escalated: true,
            };
            self.store.set_connection_state(ConnectionState::Connecting);
        }
    }

    // ─── Inbound fan-out ─────────────────────────────────────────────

    fn handle_direct_message(&mut self, dm: DirectMessage) {
        let Some(user) = self.store.current_user() else {
            return;
        };
        if dm.to_user_id != user.user_id {
            tracing::debug!(
                to = dm.to_user_id,
                local = user.user_id,
                "direct message for another user dropped"
            );
            return;
        }
        let Some(from_username) = dm.from_username.filter(|name| !name.is_empty()) else {
            tracing::debug!("direct message without sender username dropped");
            return;
        };
        if dm.message.is_empty() {
            return;
        }

        let conversation = conversation_id(user.user_id, dm.from_user_id);
        self.store.open_conversation(&conversation, &from_username);
        let message = ChatMessage {
            id: dm.id.unwrap_or_else(|| fallback_message_id("pm")),
            username: from_username,
            body: dm.message,
            is_own: false,
            kind: UserKind::from_role(dm.from_role.as_deref()),
            timestamp: dm.timestamp.unwrap_or_else(now_rfc3339),
            message_color: dm.message_color,
        };
        self.store.append_message(&conversation, message, true);
        self.store.increment_unread_pm(dm.from_user_id);
    }

    fn handle_direct_message_echo(&mut self, echo: DirectMessageEcho) {
        let Some(user) = self.store.current_user() else {
            return;
        };
        let conversation = conversation_id(user.user_id, echo.to_user_id);
        let title = echo
            .to_username
            .clone()
            .unwrap_or_else(|| format!("User {}", echo.to_user_id));
        self.store.open_conversation(&conversation, &title);
        let message = ChatMessage {
            id: echo.id.unwrap_or_else(|| fallback_message_id("pm_sent")),
            username: user.username,
            body: echo.message,
            is_own: true,
            kind: UserKind::Normal,
            timestamp: echo.timestamp.unwrap_or_else(now_rfc3339),
            message_color: None,
        };
        // Own messages are never unread.
        self.store.append_message(&conversation, message, false);
    }

    fn handle_room_message(&mut self, incoming: RoomMessage) {
        self.store
            .note_last_message_id(&incoming.room_id, &incoming.id);
        let user = self.store.current_user();
        let is_own = user.as_ref().is_some_and(|u| u.user_id == incoming.user_id);
        let is_active = self.store.current_room().as_deref() == Some(incoming.room_id.as_str());
        let message = ChatMessage {
            id: incoming.id,
            username: incoming.username,
            body: incoming.message,
            is_own,
            kind: UserKind::from_role(incoming.role.as_deref()),
            timestamp: incoming.timestamp.unwrap_or_else(now_rfc3339),
            message_color: None,
        };
        self.store
            .append_message(&incoming.room_id, message, !is_own && !is_active);
    }

    // ─── Teardown ────────────────────────────────────────────────────

    fn full_teardown(&mut self, reason: &str) {
        tracing::info!(reason, "tearing down session");
        self.heartbeat = None;
        self.background_retry = None;
        self.queue.clear();
        if let Some(link) = self.link.take() {
            link.transport.close();
        }
        self.state = LinkState::Absent;
        self.set_connected(false);
        for callback in self.disconnect_callbacks.values() {
            callback();
        }
        self.epoch = None;
        self.store.set_current_user(None);
        self.store
            .set_connection_state(ConnectionState::Disconnected);
    }

    // ─── Small helpers ───────────────────────────────────────────────

    fn emit(&self, event: &str, payload: Value) {
        if let Some(link) = &self.link {
            link.transport.emit(event, payload);
        }
    }

    fn link_connected(&self) -> bool {
        self.link
            .as_ref()
            .is_some_and(|link| link.transport.is_connected())
    }

    fn reconnect_in_flight(&self) -> bool {
        matches!(
            self.state,
            LinkState::Connecting | LinkState::Reconnecting { .. }
        )
    }

    fn pending_deadline(&self) -> Option<Instant> {
        match self.state {
            LinkState::Reconnecting { deadline, .. } => Some(deadline),
            _ => None,
        }
    }

    fn set_connected(&self, value: bool) {
        self.connected.store(value, Ordering::Release);
    }
}

async fn tick_or_pending(interval: Option<&mut time::Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

async fn deadline_or_pending(deadline: Option<Instant>) {
    match deadline {
        Some(at) => time::sleep_until(at).await,
        None => std::future::pending::<()>().await,
    }
}

fn fallback_message_id(prefix: &str) -> String {
    format!(
        "{prefix}_{}_{:08x}",
        chrono::Utc::now().timestamp_millis(),
        rand::random::<u32>()
    )
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
