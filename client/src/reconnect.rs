//! Reconnection coordinator and the room client that drives it.
//!
//! DESIGN
//! ======
//! [`Coordinator`] is the state machine:
//!
//! ```text
//! Disconnected -> Connecting -> Connected
//!                                   | abnormal close
//!                                   v
//!                     Reconnecting <-> (attempt in flight)
//!                          | attempts exhausted
//!                          v
//!                     Disconnected + "connection lost"
//! ```
//!
//! Each attempt tries the last session token first and, if the server
//! answers that it no longer knows it, joins fresh with the same name and
//! avatar. A token is only dropped on that answer: an attempt that cannot
//! reach the server keeps it for the next one. Waits
//! between attempts double from 1 s up to 16 s; five failed attempts give
//! up, clear the stored session and surface an error. A success resets the
//! counter. Close code 1000 (intentional leave) and 4001 (replaced by a
//! newer tab) never trigger a reconnect.
//!
//! [`RoomClient`] owns a transport link, a [`Coordinator`], a session store
//! and a [`RoomView`]. Call [`RoomClient::next_event`] in a loop: it relays
//! server frames while connected and runs reconnect attempts when their
//! deadline comes due.
//!
//! CANCELLATION
//! ============
//! `next_event` may be dropped at any await (it usually sits in a
//! `select!`). Waiting for a frame or a deadline is cancel-safe. A running
//! attempt is a boxed future owned by the client, so dropping `next_event`
//! mid-handshake only pauses it; the next call picks it up where it left off.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use frames::{CLOSE_NORMAL, CLOSE_REPLACED, ClientMessage, Reaction, RoomKind, RoomSnapshot, ServerMessage, Status};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::errors::{ClientError, ConnectError};
use crate::store::{SessionStore, StoredSession};
use crate::view::RoomView;

/// Error shown once reconnection gives up.
pub const CONNECTION_LOST: &str = "Connection lost. Please rejoin the room.";

/// Error shown when another connection took over this participant.
pub const SESSION_REPLACED: &str = "This session was opened somewhere else.";

// =============================================================================
// POLICY & STATE
// =============================================================================

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { base_delay: Duration::from_secs(1), max_delay: Duration::from_secs(16), max_attempts: 5 }
    }
}

impl ReconnectPolicy {
    /// Wait before the next attempt when `attempts` have already been made.
    #[must_use]
    pub fn delay_for(&self, attempts: u32) -> Duration {
        self.base_delay
            .saturating_mul(2_u32.saturating_pow(attempts))
            .min(self.max_delay)
    }
}

/// Where and as whom to join.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JoinParams {
    pub kind: RoomKind,
    pub room_id: String,
    pub name: String,
    pub avatar: Option<u8>,
}

impl JoinParams {
    #[must_use]
    pub fn join_message(&self) -> ClientMessage {
        ClientMessage::Join { name: self.name.clone(), avatar: self.avatar }
    }
}

/// One reconnect attempt handed out by [`Coordinator::start_attempt`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attempt {
    pub number: u32,
    pub token: Option<String>,
    pub params: JoinParams,
}

/// How [`Coordinator::closed`] classified a closed connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseOutcome {
    Left,
    Replaced,
    Reconnecting(Duration),
}

// =============================================================================
// COORDINATOR
// =============================================================================

#[derive(Debug, Default)]
pub struct Coordinator {
    policy: ReconnectPolicy,
    state: ConnectionState,
    attempts: u32,
    in_flight: bool,
    params: Option<JoinParams>,
    token: Option<String>,
    retry_at: Option<Instant>,
    error: Option<String>,
}

impl Coordinator {
    #[must_use]
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self { policy, ..Self::default() }
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    #[must_use]
    pub fn params(&self) -> Option<&JoinParams> {
        self.params.as_ref()
    }

    #[must_use]
    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    /// When the next attempt is due, if one is scheduled.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.retry_at
    }

    /// A user-initiated join is starting.
    pub fn begin_join(&mut self, params: JoinParams) {
        self.retry_at = None;
        self.error = None;
        self.attempts = 0;
        self.in_flight = false;
        self.state = ConnectionState::Connecting;
        self.params = Some(params);
    }

    /// A seat was granted. `avatar` is the one the server settled on.
    pub fn established(&mut self, token: String, avatar: Option<u8>) {
        self.state = ConnectionState::Connected;
        self.attempts = 0;
        self.in_flight = false;
        self.retry_at = None;
        self.error = None;
        self.token = Some(token);
        if let Some(params) = self.params.as_mut()
            && avatar.is_some()
        {
            params.avatar = avatar;
        }
    }

    /// The user-initiated join failed; nothing is retried.
    pub fn join_failed(&mut self, message: String) {
        self.state = ConnectionState::Disconnected;
        self.error = Some(message);
    }

    /// The live connection closed with `code` (`None` when the transport
    /// dropped without a close frame).
    pub fn closed(&mut self, code: Option<u16>, now: Instant) -> CloseOutcome {
        if code == Some(CLOSE_REPLACED) {
            self.forget();
            self.error = Some(SESSION_REPLACED.to_owned());
            return CloseOutcome::Replaced;
        }
        if code == Some(CLOSE_NORMAL) || self.params.is_none() {
            self.forget();
            return CloseOutcome::Left;
        }
        let delay = self.policy.delay_for(self.attempts);
        self.state = ConnectionState::Reconnecting;
        self.retry_at = Some(now + delay);
        CloseOutcome::Reconnecting(delay)
    }

    /// Claim the next attempt. Returns `None` while another attempt is in
    /// flight, and also when there is nothing left to try, in which case the
    /// state drops to `Disconnected`.
    pub fn start_attempt(&mut self) -> Option<Attempt> {
        if self.in_flight {
            return None;
        }
        let params = match self.params.clone() {
            Some(params) if self.attempts < self.policy.max_attempts => params,
            _ => {
                self.state = ConnectionState::Disconnected;
                self.token = None;
                self.retry_at = None;
                return None;
            }
        };
        self.in_flight = true;
        self.state = ConnectionState::Reconnecting;
        self.attempts += 1;
        self.retry_at = None;
        Some(Attempt { number: self.attempts, token: self.token.clone(), params })
    }

    /// The server refused the token; later attempts join fresh.
    pub fn token_rejected(&mut self) {
        self.token = None;
    }

    /// The in-flight attempt failed. Returns the wait before the next one,
    /// or `None` if attempts are exhausted.
    pub fn attempt_failed(&mut self, now: Instant) -> Option<Duration> {
        self.in_flight = false;
        if self.attempts < self.policy.max_attempts {
            let delay = self.policy.delay_for(self.attempts);
            self.retry_at = Some(now + delay);
            return Some(delay);
        }
        self.state = ConnectionState::Disconnected;
        self.token = None;
        self.retry_at = None;
        self.error = Some(CONNECTION_LOST.to_owned());
        None
    }

    /// The app came back to the foreground. A pending backoff wait is cut
    /// short. Returns true if an attempt was pulled forward.
    pub fn visible(&mut self, now: Instant) -> bool {
        if self.state != ConnectionState::Reconnecting || self.in_flight || self.retry_at.is_none() {
            return false;
        }
        self.retry_at = Some(now);
        true
    }

    /// Start over with a fresh attempt budget. Returns false if there is no
    /// room to go back to or an attempt is already running.
    pub fn retry(&mut self, now: Instant) -> bool {
        if self.params.is_none() || self.in_flight {
            return false;
        }
        self.attempts = 0;
        self.error = None;
        self.state = ConnectionState::Reconnecting;
        self.retry_at = Some(now);
        true
    }

    /// Abandon the room and any pending attempt.
    pub fn cancel(&mut self) {
        self.forget();
        self.attempts = 0;
        self.in_flight = false;
    }

    fn forget(&mut self) {
        self.state = ConnectionState::Disconnected;
        self.params = None;
        self.token = None;
        self.retry_at = None;
    }
}

// =============================================================================
// TRANSPORT SEAM
// =============================================================================

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LinkEvent {
    Message(ServerMessage),
    /// The socket closed. `code` is `None` when no close frame arrived.
    Closed { code: Option<u16> },
}

/// An open, seated connection to one room.
#[async_trait::async_trait]
pub trait RoomLink: Send {
    /// # Errors
    ///
    /// Returns [`ConnectError::Transport`] if the frame cannot be written.
    async fn send(&mut self, message: &ClientMessage) -> Result<(), ConnectError>;

    /// Next inbound event. Must be cancel-safe.
    async fn recv(&mut self) -> LinkEvent;

    async fn close(&mut self);
}

/// Result of a completed handshake.
#[derive(Debug)]
pub struct Established<L> {
    pub session_id: String,
    pub token: String,
    pub state: RoomSnapshot,
    pub link: L,
}

/// Opens links. The connector sends `hello` as the first frame and waits
/// for the server's `joined` (or `error`) reply.
#[async_trait::async_trait]
pub trait RoomConnector: Send + Sync {
    type Link: RoomLink + 'static;

    /// # Errors
    ///
    /// Returns [`ConnectError::Rejected`] when the server answers with an
    /// error frame, otherwise a transport or close error.
    async fn connect(
        &self,
        kind: RoomKind,
        room_id: &str,
        hello: ClientMessage,
    ) -> Result<Established<Self::Link>, ConnectError>;
}

// =============================================================================
// CLIENT
// =============================================================================

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientEvent {
    /// A `state` frame was applied to the view.
    Updated,
    Emoji { from_id: String, to_id: String, emoji: Reaction },
    ServerError { code: String, message: String },
    /// The next attempt, numbered from 1, runs after `delay`.
    Reconnecting { attempt: u32, delay: Duration },
    /// `resumed` is true when the old seat was reclaimed by token.
    Reconnected { resumed: bool },
    Disconnected { error: Option<String> },
}

/// How a reconnect attempt ended.
enum AttemptOutcome<L> {
    Resumed(Established<L>),
    Joined(Established<L>),
    Failed { error: ConnectError, token_refused: bool },
}

type PendingAttempt<L> = Pin<Box<dyn Future<Output = AttemptOutcome<L>> + Send>>;

pub struct RoomClient<C: RoomConnector + 'static, S: SessionStore> {
    connector: Arc<C>,
    store: S,
    coordinator: Coordinator,
    pending: Option<PendingAttempt<C::Link>>,
    link: Option<C::Link>,
    session_id: Option<String>,
    view: RoomView,
}

impl<C: RoomConnector + 'static, S: SessionStore> RoomClient<C, S> {
    pub fn new(connector: C, store: S, policy: ReconnectPolicy) -> Self {
        Self {
            connector: Arc::new(connector),
            store,
            coordinator: Coordinator::new(policy),
            pending: None,
            link: None,
            session_id: None,
            view: RoomView::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.coordinator.state()
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    pub fn error(&self) -> Option<&str> {
        self.coordinator.error()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn view(&self) -> &RoomView {
        &self.view
    }

    /// Mutable access for subscribing to view events.
    pub fn view_mut(&mut self) -> &mut RoomView {
        &mut self.view
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Join a room, resuming a stored session for the same room if one
    /// exists and the server still honours it.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::RoomFull`] when the room has no free seat,
    /// otherwise [`ClientError::Connect`] with the handshake failure. A
    /// stored session that could not be tried because the server was
    /// unreachable is kept.
    pub async fn join(
        &mut self,
        kind: RoomKind,
        room_id: &str,
        name: &str,
        avatar: Option<u8>,
    ) -> Result<(), ClientError> {
        self.pending = None;
        self.drop_link().await;
        let params = JoinParams { kind, room_id: room_id.to_owned(), name: name.to_owned(), avatar };
        self.coordinator.begin_join(params.clone());

        match self.store.load().await {
            Ok(Some(stored)) if stored.is_for(kind, room_id) => {
                let hello = ClientMessage::Resume { token: stored.token };
                match self.connector.connect(kind, room_id, hello).await {
                    Ok(established) => {
                        info!(%room_id, "resumed stored session");
                        self.install(established).await;
                        return Ok(());
                    }
                    Err(e) if e.is_unknown_session() => {
                        info!(%room_id, "stored session expired; joining fresh");
                        self.clear_store().await;
                    }
                    Err(e) => {
                        warn!(%room_id, error = %e, "stored session resume failed");
                        self.coordinator.join_failed(e.to_string());
                        return Err(e.into());
                    }
                }
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "session store load failed"),
        }

        match self.connector.connect(kind, room_id, params.join_message()).await {
            Ok(established) => {
                self.install(established).await;
                Ok(())
            }
            Err(e) => {
                warn!(%room_id, error = %e, "join failed");
                self.coordinator.join_failed(e.to_string());
                if e.is_room_full() { Err(ClientError::RoomFull(e.to_string())) } else { Err(e.into()) }
            }
        }
    }

    /// Send one message on the live connection.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotConnected`] without a live connection, or
    /// the transport failure.
    pub async fn send(&mut self, message: ClientMessage) -> Result<(), ClientError> {
        let link = self.link.as_mut().ok_or(ClientError::NotConnected)?;
        link.send(&message).await?;
        Ok(())
    }

    /// # Errors
    ///
    /// See [`RoomClient::send`].
    pub async fn vote(&mut self, vote: &str) -> Result<(), ClientError> {
        self.send(ClientMessage::Vote { vote: vote.to_owned() }).await
    }

    /// # Errors
    ///
    /// See [`RoomClient::send`].
    pub async fn set_status(&mut self, status: Status) -> Result<(), ClientError> {
        self.send(ClientMessage::Status { status }).await
    }

    /// # Errors
    ///
    /// See [`RoomClient::send`].
    pub async fn throw_emoji(&mut self, target_id: &str, emoji: Reaction) -> Result<(), ClientError> {
        self.send(ClientMessage::ThrowEmoji { target_id: target_id.to_owned(), emoji }).await
    }

    /// Leave on purpose: the seat is released and the stored session
    /// forgotten.
    pub async fn leave(&mut self) {
        if let Some(mut link) = self.link.take() {
            if let Err(e) = link.send(&ClientMessage::Leave).await {
                debug!(error = %e, "leave frame not delivered");
            }
            link.close().await;
        }
        self.pending = None;
        self.coordinator.cancel();
        self.session_id = None;
        self.view.clear();
        self.clear_store().await;
    }

    /// Stop a pending reconnect and forget the room.
    pub async fn cancel_reconnect(&mut self) {
        self.pending = None;
        self.drop_link().await;
        self.coordinator.cancel();
        self.session_id = None;
        self.view.clear();
        self.clear_store().await;
    }

    /// Retry now with a fresh attempt budget.
    pub fn retry_connection(&mut self) -> bool {
        self.coordinator.retry(Instant::now())
    }

    /// Report foreground/background. Returns true if a waiting reconnect
    /// was pulled forward.
    pub fn set_visible(&mut self, visible: bool) -> bool {
        visible && self.coordinator.visible(Instant::now())
    }

    /// Wait for the next thing worth telling the caller about. Returns
    /// `None` once there is no connection and nothing scheduled.
    pub async fn next_event(&mut self) -> Option<ClientEvent> {
        loop {
            if let Some(pending) = self.pending.as_mut() {
                let outcome = pending.await;
                self.pending = None;
                return Some(self.finish_attempt(outcome).await);
            }

            if let Some(link) = self.link.as_mut() {
                let event = link.recv().await;
                match event {
                    LinkEvent::Message(message) => {
                        if let Some(event) = self.on_message(message) {
                            return Some(event);
                        }
                    }
                    LinkEvent::Closed { code } => return Some(self.on_closed(code).await),
                }
                continue;
            }

            let deadline = self.coordinator.next_deadline()?;
            tokio::time::sleep_until(deadline).await;
            let Some(attempt) = self.coordinator.start_attempt() else {
                return Some(ClientEvent::Disconnected { error: self.coordinator.error().map(str::to_owned) });
            };
            self.pending = Some(self.launch(attempt));
        }
    }

    fn on_message(&mut self, message: ServerMessage) -> Option<ClientEvent> {
        match message {
            ServerMessage::State { state } => {
                self.view.apply_state(state);
                Some(ClientEvent::Updated)
            }
            ServerMessage::EmojiThrown { from_id, to_id, emoji } => Some(ClientEvent::Emoji { from_id, to_id, emoji }),
            ServerMessage::Error { code, message } => Some(ClientEvent::ServerError { code, message }),
            ServerMessage::Joined { .. } => {
                debug!("unexpected joined frame on a seated connection");
                None
            }
        }
    }

    async fn on_closed(&mut self, code: Option<u16>) -> ClientEvent {
        self.link = None;
        self.session_id = None;
        match self.coordinator.closed(code, Instant::now()) {
            CloseOutcome::Left => {
                info!(?code, "connection closed");
                self.view.clear();
                self.clear_store().await;
                ClientEvent::Disconnected { error: None }
            }
            CloseOutcome::Replaced => {
                warn!("session replaced by another connection");
                self.view.clear();
                ClientEvent::Disconnected { error: self.coordinator.error().map(str::to_owned) }
            }
            CloseOutcome::Reconnecting(delay) => {
                warn!(?code, ?delay, "connection lost; reconnecting");
                ClientEvent::Reconnecting { attempt: self.coordinator.attempts() + 1, delay }
            }
        }
    }

    /// Run one attempt detached from `self` so it survives a dropped
    /// `next_event`.
    fn launch(&self, attempt: Attempt) -> PendingAttempt<C::Link> {
        let connector = Arc::clone(&self.connector);
        Box::pin(async move {
            let Attempt { number, token, params } = attempt;
            info!(attempt = number, room_id = %params.room_id, "reconnect attempt");

            let mut token_refused = false;
            if let Some(token) = token {
                match connector.connect(params.kind, &params.room_id, ClientMessage::Resume { token }).await {
                    Ok(established) => return AttemptOutcome::Resumed(established),
                    Err(e) if e.is_unknown_session() => {
                        info!(attempt = number, "session token refused; joining fresh");
                        token_refused = true;
                    }
                    Err(error) => return AttemptOutcome::Failed { error, token_refused },
                }
            }

            match connector.connect(params.kind, &params.room_id, params.join_message()).await {
                Ok(established) => AttemptOutcome::Joined(established),
                Err(error) => AttemptOutcome::Failed { error, token_refused },
            }
        })
    }

    async fn finish_attempt(&mut self, outcome: AttemptOutcome<C::Link>) -> ClientEvent {
        match outcome {
            AttemptOutcome::Resumed(established) => {
                self.install(established).await;
                ClientEvent::Reconnected { resumed: true }
            }
            AttemptOutcome::Joined(established) => {
                self.install(established).await;
                ClientEvent::Reconnected { resumed: false }
            }
            AttemptOutcome::Failed { error, token_refused } => {
                if token_refused {
                    self.coordinator.token_rejected();
                }
                warn!(attempt = self.coordinator.attempts(), %error, "reconnect attempt failed");
                self.fail_attempt().await
            }
        }
    }

    /// Record a failed attempt and schedule the next one.
    async fn fail_attempt(&mut self) -> ClientEvent {
        match self.coordinator.attempt_failed(Instant::now()) {
            Some(delay) => ClientEvent::Reconnecting { attempt: self.coordinator.attempts() + 1, delay },
            None => {
                warn!("reconnect attempts exhausted");
                self.view.clear();
                self.clear_store().await;
                ClientEvent::Disconnected { error: self.coordinator.error().map(str::to_owned) }
            }
        }
    }

    async fn install(&mut self, established: Established<C::Link>) {
        let Established { session_id, token, state, link } = established;
        let avatar = state.participant(&session_id).map(|p| p.avatar);
        self.coordinator.established(token.clone(), avatar);
        self.view.apply_joined(&session_id, state);
        self.session_id = Some(session_id);
        self.link = Some(link);

        if let Some(params) = self.coordinator.params() {
            let stored = StoredSession {
                token,
                kind: params.kind,
                room_id: params.room_id.clone(),
                name: params.name.clone(),
                avatar: params.avatar,
            };
            if let Err(e) = self.store.save(&stored).await {
                warn!(error = %e, "session store save failed");
            }
        }
    }

    async fn drop_link(&mut self) {
        if let Some(mut link) = self.link.take() {
            link.close().await;
        }
    }

    async fn clear_store(&self) {
        if let Err(e) = self.store.clear().await {
            warn!(error = %e, "session store clear failed");
        }
    }
}

#[cfg(test)]
#[path = "reconnect_test.rs"]
mod tests;
