//! Ephemeral emoji reactions.
//!
//! DESIGN
//! ======
//! A reaction temporarily overrides a participant's status and reverts after
//! a fixed lifetime. The status showing before the first reaction is kept as
//! the participant's "previous" status, so a reaction during `ready` reverts
//! to `ready`. A second reaction while one is showing replaces it and
//! restarts the revert timer; it never replaces the remembered status.
//!
//! Revert deadlines live in the room's [`Scheduler`] under
//! [`TimerKind::Revert`], one per participant.

use std::collections::HashMap;
use std::time::Duration;

use frames::{Scheduler, Status};
use tokio::time::Instant;

use crate::services::room::{Participant, SessionId, TimerKey, TimerKind};

#[derive(Debug, Default)]
pub struct Reactions {
    previous: HashMap<SessionId, Status>,
}

impl Reactions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Show `status` on `participant` until `now + lifetime`.
    ///
    /// Returns false, leaving everything untouched, for a participant in the
    /// grace period.
    pub fn apply(
        &mut self,
        participant: &mut Participant,
        status: Status,
        now: Instant,
        lifetime: Duration,
        timers: &mut Scheduler<TimerKey, Instant>,
    ) -> bool {
        if participant.status == Status::Disconnected {
            return false;
        }
        if !participant.status.is_ephemeral() {
            self.previous.insert(participant.session_id, participant.status);
        }
        participant.status = status;
        timers.schedule(TimerKey::participant(participant.session_id, TimerKind::Revert), now + lifetime);
        true
    }

    /// Restore the remembered status once the revert timer fires.
    ///
    /// A participant whose status was changed by other means in the meantime
    /// keeps it. Returns true if the status changed.
    pub fn revert(&mut self, participant: &mut Participant) -> bool {
        if !participant.status.is_ephemeral() {
            return false;
        }
        participant.status = self.underlying(participant);
        true
    }

    /// Status the participant shows once any reaction has expired.
    #[must_use]
    pub fn underlying(&self, participant: &Participant) -> Status {
        if participant.status.is_ephemeral() {
            self.previous.get(&participant.session_id).copied().unwrap_or_default()
        } else {
            participant.status
        }
    }

    /// Remember a status set directly by a vote or status message.
    pub fn record_base(&mut self, session_id: SessionId, status: Status) {
        self.previous.insert(session_id, status);
    }

    /// Drop all bookkeeping for a participant that left the room.
    pub fn release(&mut self, session_id: SessionId, timers: &mut Scheduler<TimerKey, Instant>) {
        self.previous.remove(&session_id);
        timers.cancel(&TimerKey::participant(session_id, TimerKind::Revert));
    }

    /// Forget every remembered status; used when the round resets.
    pub fn clear_previous(&mut self) {
        self.previous.clear();
    }
}

#[cfg(test)]
#[path = "reaction_test.rs"]
mod tests;
