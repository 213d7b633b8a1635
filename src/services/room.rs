//! Room state machine: seats, votes, reactions, grace periods, board edits.
//!
//! DESIGN
//! ======
//! A `Room` is plain synchronous state. The owning actor feeds it one
//! command at a time together with the current instant, then drains the
//! [`Outbox`] to learn what to send. Nothing here touches a socket, a clock
//! or the filesystem, so every lifecycle rule is testable without a runtime.
//!
//! LIFECYCLE
//! =========
//! `Active -> Grace -> Active` on resume, `Grace -> Removed` on expiry,
//! `Active -> Removed` on a consented leave. Only voting rooms hold seats in
//! grace; board rooms remove on any disconnect because item ownership is
//! keyed by name and survives without a seat.
//!
//! TIMERS
//! ======
//! Reaction reverts, grace expiries and the board save all live in one
//! [`Scheduler`] keyed by owner and kind. Removing a participant cancels
//! every timer that participant owns.

use std::collections::HashMap;

use frames::{
    CLOSE_REPLACED, ClientMessage, ParticipantView, Reaction, RoomKind, RoomSnapshot, Scheduler, ServerMessage,
    Status, TOTAL_AVATARS,
};
use indexmap::IndexMap;
use rand::Rng;
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::RoomConfig;
use crate::services::ErrorCode;
use crate::services::board::{Board, BoardError, StoredSnapshot};
use crate::services::identity::{collisions, normalize_name};
use crate::services::now_ms;
use crate::services::reaction::Reactions;
use crate::services::session::SessionTokens;

/// Longest accepted vote token, in characters.
pub const MAX_VOTE_CHARS: usize = 16;

pub type SessionId = Uuid;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RoomError {
    #[error("room is full (max {0} participants)")]
    Full(usize),
    #[error("unknown or expired session")]
    UnknownSession,
    #[error("room is closing")]
    Closed,
}

impl crate::services::ErrorCode for RoomError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Full(_) => "E_ROOM_FULL",
            Self::UnknownSession => "E_UNKNOWN_SESSION",
            Self::Closed => "E_ROOM_CLOSED",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerOwner {
    Room,
    Participant(SessionId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Ephemeral reaction status reverts.
    Revert,
    /// Seat held for a disconnected participant is released.
    GraceExpiry,
    /// Debounced board snapshot write.
    Save,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerKey {
    pub owner: TimerOwner,
    pub kind: TimerKind,
}

impl TimerKey {
    #[must_use]
    pub fn room(kind: TimerKind) -> Self {
        Self { owner: TimerOwner::Room, kind }
    }

    #[must_use]
    pub fn participant(session_id: SessionId, kind: TimerKind) -> Self {
        Self { owner: TimerOwner::Participant(session_id), kind }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub session_id: SessionId,
    pub name: String,
    pub avatar: u8,
    /// Empty when no vote is cast.
    pub vote: String,
    pub status: Status,
    /// Unix ms when the grace period started; 0 while connected.
    pub disconnected_at: i64,
}

impl Participant {
    #[must_use]
    pub fn new(session_id: SessionId, name: String, avatar: u8) -> Self {
        Self { session_id, name, avatar, vote: String::new(), status: Status::Idle, disconnected_at: 0 }
    }

    #[must_use]
    pub fn in_grace(&self) -> bool {
        self.disconnected_at != 0
    }

    fn view(&self, show_vote: bool) -> ParticipantView {
        ParticipantView {
            id: self.session_id.to_string(),
            name: self.name.clone(),
            avatar: self.avatar,
            vote: if show_vote { self.vote.clone() } else { String::new() },
            voted: !self.vote.is_empty(),
            status: self.status,
            disconnected_at: self.disconnected_at,
        }
    }
}

/// A seat granted by join or resume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seat {
    pub session_id: SessionId,
    pub token: String,
}

/// Side effects the owning actor performs after a command.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Deliver to every connection in the room.
    Broadcast(ServerMessage),
    /// Close one participant's connection.
    Disconnect { session_id: SessionId, code: u16, reason: String },
    /// Persist the board.
    Save(StoredSnapshot),
}

#[derive(Debug, Default, PartialEq)]
pub struct Outbox {
    /// Shared state changed; every connection needs a fresh snapshot.
    pub state_changed: bool,
    pub effects: Vec<Effect>,
}

pub struct Room {
    id: String,
    kind: RoomKind,
    config: RoomConfig,
    revealed: bool,
    participants: IndexMap<SessionId, Participant>,
    board: Option<Board>,
    reactions: Reactions,
    /// Status to restore for each seat held in grace.
    grace: HashMap<SessionId, Status>,
    tokens: SessionTokens,
    timers: Scheduler<TimerKey, Instant>,
    outbox: Outbox,
}

// =============================================================================
// LIFECYCLE
// =============================================================================

impl Room {
    /// A board room without a loaded `board` starts from the default columns.
    #[must_use]
    pub fn new(id: impl Into<String>, kind: RoomKind, config: RoomConfig, board: Option<Board>) -> Self {
        let board = kind
            .has_board()
            .then(|| board.unwrap_or_else(Board::with_default_columns));
        Self {
            id: id.into(),
            kind,
            config,
            revealed: false,
            participants: IndexMap::new(),
            board,
            reactions: Reactions::new(),
            grace: HashMap::new(),
            tokens: SessionTokens::new(),
            timers: Scheduler::new(),
            outbox: Outbox::default(),
        }
    }

    /// Seat a new participant, evicting any seat that holds the same name.
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::Full`] when no seat is free after eviction.
    pub fn join(&mut self, name: &str, avatar: Option<u8>) -> Result<Seat, RoomError> {
        let name = normalize_name(name);

        let seats = self.participants.iter().map(|(id, p)| (*id, p.name.as_str()));
        for evicted in collisions(seats, &name, None) {
            info!(room_id = %self.id, session_id = %evicted, name = %name, "replacing session with same name");
            self.remove(evicted);
            self.outbox.effects.push(Effect::Disconnect {
                session_id: evicted,
                code: CLOSE_REPLACED,
                reason: "replaced by a newer session".to_owned(),
            });
        }

        if self.participants.len() >= self.config.max_clients {
            return Err(RoomError::Full(self.config.max_clients));
        }

        let avatar = avatar
            .filter(|a| *a < TOTAL_AVATARS)
            .unwrap_or_else(|| rand::rng().random_range(0..TOTAL_AVATARS));
        let session_id = Uuid::new_v4();
        let token = self.tokens.issue(session_id);
        info!(room_id = %self.id, %session_id, name = %name, "participant joined");
        self.participants.insert(session_id, Participant::new(session_id, name, avatar));
        self.outbox.state_changed = true;
        Ok(Seat { session_id, token })
    }

    /// Reclaim the seat bound to `token`.
    ///
    /// A seat in grace gets its pre-disconnect status back. A seat that is
    /// still connected is handed over as is; the caller closes the old
    /// connection.
    ///
    /// # Errors
    ///
    /// Returns [`RoomError::UnknownSession`] when the token is unknown or its
    /// seat is gone.
    pub fn resume(&mut self, token: &str) -> Result<Seat, RoomError> {
        let session_id = self.tokens.lookup(token).ok_or(RoomError::UnknownSession)?;
        let Some(participant) = self.participants.get_mut(&session_id) else {
            self.tokens.revoke(session_id);
            return Err(RoomError::UnknownSession);
        };

        if participant.in_grace() {
            participant.status = self.grace.remove(&session_id).unwrap_or_default();
            participant.disconnected_at = 0;
            self.timers.cancel(&TimerKey::participant(session_id, TimerKind::GraceExpiry));
            self.outbox.state_changed = true;
            info!(room_id = %self.id, %session_id, name = %participant.name, "participant reconnected");
        } else {
            info!(room_id = %self.id, %session_id, name = %participant.name, "session taken over by new connection");
        }
        Ok(Seat { session_id, token: token.to_owned() })
    }

    /// Handle a closed connection. Returns true if room state changed.
    ///
    /// A consented leave, or any leave from a board room, removes the seat.
    /// Otherwise the seat enters the grace period.
    pub fn leave(&mut self, session_id: SessionId, consented: bool, now: Instant) -> bool {
        let holds_seats = self.holds_seats();
        let Some(participant) = self.participants.get_mut(&session_id) else {
            return false;
        };
        if participant.in_grace() && !consented {
            return false;
        }

        if consented || !holds_seats {
            info!(room_id = %self.id, %session_id, name = %participant.name, "participant left");
            self.remove(session_id);
            return true;
        }

        info!(room_id = %self.id, %session_id, name = %participant.name, "participant disconnected; holding seat");
        let restore = self.reactions.underlying(participant);
        self.timers.cancel(&TimerKey::participant(session_id, TimerKind::Revert));
        participant.status = Status::Disconnected;
        participant.disconnected_at = now_ms().max(1);
        self.grace.insert(session_id, restore);
        self.timers.schedule(
            TimerKey::participant(session_id, TimerKind::GraceExpiry),
            now + self.config.grace_period,
        );
        self.outbox.state_changed = true;
        true
    }

    /// Fire every timer due at `now`.
    pub fn fire_due(&mut self, now: Instant) {
        for key in self.timers.pop_due(now) {
            match (key.owner, key.kind) {
                (TimerOwner::Participant(session_id), TimerKind::Revert) => {
                    if let Some(participant) = self.participants.get_mut(&session_id)
                        && self.reactions.revert(participant)
                    {
                        self.outbox.state_changed = true;
                    }
                }
                (TimerOwner::Participant(session_id), TimerKind::GraceExpiry) => {
                    if self.participants.get(&session_id).is_some_and(Participant::in_grace) {
                        info!(room_id = %self.id, %session_id, "reconnect timeout; releasing seat");
                        self.remove(session_id);
                    }
                }
                (TimerOwner::Room, TimerKind::Save) => {
                    if let Some(board) = &self.board {
                        self.outbox.effects.push(Effect::Save(board.to_stored(&self.id)));
                    }
                }
                (owner, kind) => debug!(room_id = %self.id, ?owner, ?kind, "ignoring unexpected timer"),
            }
        }
    }

    /// Snapshot to write at teardown, cancelling any pending debounced save.
    pub fn final_snapshot(&mut self) -> Option<StoredSnapshot> {
        self.timers.cancel(&TimerKey::room(TimerKind::Save));
        self.board.as_ref().map(|board| board.to_stored(&self.id))
    }

    fn remove(&mut self, session_id: SessionId) {
        self.participants.shift_remove(&session_id);
        self.grace.remove(&session_id);
        self.tokens.revoke(session_id);
        self.reactions.release(session_id, &mut self.timers);
        self.timers
            .cancel_where(|key| key.owner == TimerOwner::Participant(session_id));
        self.outbox.state_changed = true;
    }

    fn holds_seats(&self) -> bool {
        !self.kind.has_board()
    }
}

// =============================================================================
// MESSAGES
// =============================================================================

impl Room {
    /// Apply one client message from `session_id`. Invalid actions are
    /// dropped without a reply.
    pub fn handle(&mut self, session_id: SessionId, message: ClientMessage, now: Instant) {
        if !self.participants.get(&session_id).is_some_and(|p| !p.in_grace()) {
            debug!(room_id = %self.id, %session_id, "message from unseated session dropped");
            return;
        }

        match message {
            ClientMessage::Join { .. } | ClientMessage::Resume { .. } => {
                debug!(room_id = %self.id, %session_id, "handshake message after join dropped");
            }
            ClientMessage::Leave => {
                self.leave(session_id, true, now);
            }
            ClientMessage::Vote { vote } => self.vote(session_id, vote),
            ClientMessage::Status { status } => self.set_status(session_id, status),
            ClientMessage::Reveal => self.reveal(),
            ClientMessage::Reset => self.reset(),
            ClientMessage::ThrowEmoji { target_id, emoji } => self.throw_emoji(session_id, &target_id, emoji, now),
            ClientMessage::AddItem { column_id, content } => {
                self.edit_board(session_id, now, |board, name| board.add_item(&column_id, &content, name).map(drop));
            }
            ClientMessage::EditItem { column_id, item_id, content } => {
                self.edit_board(session_id, now, |board, name| board.edit_item(&column_id, &item_id, &content, name));
            }
            ClientMessage::DeleteItem { column_id, item_id } => {
                self.edit_board(session_id, now, |board, name| board.delete_item(&column_id, &item_id, name).map(drop));
            }
        }
    }

    /// Casting the current vote again withdraws it.
    fn vote(&mut self, session_id: SessionId, vote: String) {
        if self.kind != RoomKind::Scrum || self.revealed {
            debug!(room_id = %self.id, %session_id, "vote dropped");
            return;
        }
        if vote.chars().count() > MAX_VOTE_CHARS {
            debug!(room_id = %self.id, %session_id, "over-long vote dropped");
            return;
        }
        let Some(participant) = self.participants.get_mut(&session_id) else {
            return;
        };
        participant.vote = if participant.vote == vote { String::new() } else { vote };
        participant.status = if participant.vote.is_empty() { Status::Idle } else { Status::Ready };
        self.reactions.record_base(session_id, participant.status);
        self.timers.cancel(&TimerKey::participant(session_id, TimerKind::Revert));
        self.outbox.state_changed = true;
    }

    fn set_status(&mut self, session_id: SessionId, status: Status) {
        if !status.is_client_settable() {
            debug!(room_id = %self.id, %session_id, %status, "status not settable by clients");
            return;
        }
        let Some(participant) = self.participants.get_mut(&session_id) else {
            return;
        };
        if participant.status == status {
            return;
        }
        participant.status = status;
        self.reactions.record_base(session_id, status);
        self.timers.cancel(&TimerKey::participant(session_id, TimerKind::Revert));
        self.outbox.state_changed = true;
    }

    fn reveal(&mut self) {
        if self.kind != RoomKind::Scrum || self.revealed {
            return;
        }
        self.revealed = true;
        self.outbox.state_changed = true;
    }

    /// Clear votes and statuses for a new round. Seats in grace keep showing
    /// `disconnected` but come back `idle`.
    fn reset(&mut self) {
        if self.kind != RoomKind::Scrum {
            return;
        }
        self.revealed = false;
        for participant in self.participants.values_mut() {
            participant.vote.clear();
            if participant.status != Status::Disconnected {
                participant.status = Status::Idle;
            }
        }
        for restore in self.grace.values_mut() {
            *restore = Status::Idle;
        }
        self.reactions.clear_previous();
        self.timers.cancel_where(|key| key.kind == TimerKind::Revert);
        self.outbox.state_changed = true;
    }

    fn throw_emoji(&mut self, sender: SessionId, target_id: &str, emoji: Reaction, now: Instant) {
        let Some(target) = Uuid::parse_str(target_id).ok().filter(|id| self.participants.contains_key(id)) else {
            debug!(room_id = %self.id, %sender, %target_id, "emoji for unknown target dropped");
            return;
        };

        self.outbox.effects.push(Effect::Broadcast(ServerMessage::EmojiThrown {
            from_id: sender.to_string(),
            to_id: target.to_string(),
            emoji,
        }));

        let lifetime = self.config.reaction_duration;
        for (session_id, status) in [(sender, emoji.sender_status()), (target, emoji.receiver_status())] {
            if let Some(participant) = self.participants.get_mut(&session_id)
                && self.reactions.apply(participant, status, now, lifetime, &mut self.timers)
            {
                self.outbox.state_changed = true;
            }
        }
    }

    /// Run a board mutation as `session_id` and debounce a save on success.
    fn edit_board(
        &mut self,
        session_id: SessionId,
        now: Instant,
        op: impl FnOnce(&mut Board, &str) -> Result<(), BoardError>,
    ) {
        let Some(name) = self.participants.get(&session_id).map(|p| p.name.clone()) else {
            return;
        };
        let Some(board) = self.board.as_mut() else {
            debug!(room_id = %self.id, %session_id, "board message in a room without a board dropped");
            return;
        };
        if let Err(e) = op(board, &name) {
            debug!(room_id = %self.id, %session_id, code = e.error_code(), error = %e, "board mutation dropped");
            return;
        }
        self.timers
            .schedule(TimerKey::room(TimerKind::Save), now + self.config.save_debounce);
        self.outbox.state_changed = true;
    }
}

// =============================================================================
// QUERIES
// =============================================================================

impl Room {
    #[cfg(test)]
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[cfg(test)]
    #[must_use]
    pub fn kind(&self) -> RoomKind {
        self.kind
    }

    #[cfg(test)]
    #[must_use]
    pub fn revealed(&self) -> bool {
        self.revealed
    }

    #[must_use]
    pub fn participant(&self, session_id: SessionId) -> Option<&Participant> {
        self.participants.get(&session_id)
    }

    #[cfg(test)]
    pub fn participants(&self) -> impl Iterator<Item = &Participant> {
        self.participants.values()
    }

    #[cfg(test)]
    #[must_use]
    pub fn len(&self) -> usize {
        self.participants.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    #[cfg(test)]
    #[must_use]
    pub fn board(&self) -> Option<&Board> {
        self.board.as_ref()
    }

    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    #[cfg(test)]
    #[must_use]
    pub fn is_timer_pending(&self, key: TimerKey) -> bool {
        self.timers.is_pending(&key)
    }

    /// Room state as seen by `viewer`. Other participants' votes stay hidden
    /// until the room is revealed.
    #[must_use]
    pub fn snapshot_for(&self, viewer: Option<SessionId>) -> RoomSnapshot {
        RoomSnapshot {
            room_id: self.id.clone(),
            kind: self.kind,
            revealed: self.revealed,
            participants: self
                .participants
                .values()
                .map(|p| p.view(self.revealed || Some(p.session_id) == viewer))
                .collect(),
            columns: self.board.as_ref().map(Board::views).unwrap_or_default(),
        }
    }

    /// Take everything accumulated since the last call.
    pub fn take_outbox(&mut self) -> Outbox {
        std::mem::take(&mut self.outbox)
    }
}

#[cfg(test)]
#[path = "room_test.rs"]
mod tests;
