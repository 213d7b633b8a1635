//! Presence tracker: local input signals to status changes.
//!
//! DESIGN
//! ======
//! The tracker owns the participant's own base status as last sent to the
//! server. Input handlers (`on_activity`, hover, vote changes) and timer
//! expiry queue status updates in an outbox; the owner drains it with
//! [`ActivityTracker::take_outbox`] and sends each entry as a `status`
//! message. A status identical to the last one queued is never queued again.
//!
//! Server snapshots are folded back in with [`ActivityTracker::observe`].
//! Until the server reflects the last queued status, snapshots showing
//! anything else predate it and are not adopted.
//!
//! Rules:
//! - No activity for 30 s while unvoted: `sleeping`. Next activity: `idle`.
//! - Card hover while unvoted: `deciding`. Hover end: back to `idle` after
//!   800 ms unless hovering resumes first.
//! - Vote cast: `ready`; vote cleared: `idle`.
//! - Three or more vote changes within 5 s: `confused` for 2 s, then `ready`
//!   or `idle` by the current vote.
//! - Raw activity is coalesced: the first signal opens a 100 ms window and
//!   the rest of the window is ignored.

use std::collections::VecDeque;
use std::time::Duration;

use frames::{Scheduler, Status};
use tokio::time::Instant;

/// Thresholds for the presence rules.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PresenceTimings {
    pub sleep_after: Duration,
    pub hover_end_delay: Duration,
    pub activity_debounce: Duration,
    pub confused_window: Duration,
    pub confused_hold: Duration,
    pub confused_threshold: usize,
}

impl Default for PresenceTimings {
    fn default() -> Self {
        Self {
            sleep_after: Duration::from_secs(30),
            hover_end_delay: Duration::from_millis(800),
            activity_debounce: Duration::from_millis(100),
            confused_window: Duration::from_secs(5),
            confused_hold: Duration::from_secs(2),
            confused_threshold: 3,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum Timer {
    Sleep,
    Debounce,
    HoverEnd,
    ConfusedReset,
}

#[derive(Debug)]
pub struct ActivityTracker {
    timings: PresenceTimings,
    current: Status,
    voted: bool,
    vote_changes: VecDeque<Instant>,
    timers: Scheduler<Timer, Instant>,
    outbox: Vec<Status>,
    /// Last queued status the server has not shown back yet.
    unconfirmed: Option<Status>,
}

impl ActivityTracker {
    /// Start tracking at `now` with the sleep timer armed.
    #[must_use]
    pub fn new(timings: PresenceTimings, now: Instant) -> Self {
        let mut tracker = Self {
            timings,
            current: Status::Idle,
            voted: false,
            vote_changes: VecDeque::new(),
            timers: Scheduler::new(),
            outbox: Vec::new(),
            unconfirmed: None,
        };
        tracker.arm_sleep(now);
        tracker
    }

    #[must_use]
    pub fn status(&self) -> Status {
        self.current
    }

    #[must_use]
    pub fn voted(&self) -> bool {
        self.voted
    }

    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    /// Statuses queued since the last call, oldest first.
    pub fn take_outbox(&mut self) -> Vec<Status> {
        std::mem::take(&mut self.outbox)
    }

    /// Raw pointer or key activity.
    pub fn on_activity(&mut self, now: Instant) {
        if self.timers.is_pending(&Timer::Debounce) {
            return;
        }
        self.timers.schedule(Timer::Debounce, now + self.timings.activity_debounce);
    }

    pub fn on_hover_start(&mut self, now: Instant) {
        self.timers.cancel(&Timer::HoverEnd);
        self.record_activity(now);
        if !self.voted {
            self.update(Status::Deciding);
        }
    }

    pub fn on_hover_end(&mut self, now: Instant) {
        self.record_activity(now);
        if !self.voted && self.current == Status::Deciding {
            self.timers.schedule(Timer::HoverEnd, now + self.timings.hover_end_delay);
        }
    }

    /// The local vote changed; `voted` is whether a vote is now cast.
    pub fn on_vote_change(&mut self, now: Instant, voted: bool) {
        self.voted = voted;
        self.record_activity(now);

        self.vote_changes.push_back(now);
        let window = self.timings.confused_window;
        self.vote_changes.retain(|at| now.saturating_duration_since(*at) < window);

        if self.vote_changes.len() >= self.timings.confused_threshold {
            self.update(Status::Confused);
            self.timers.schedule(Timer::ConfusedReset, now + self.timings.confused_hold);
        } else {
            self.update(self.settled());
        }
    }

    /// Adopt the server's view of this participant without sending anything.
    /// Reaction and disconnected statuses are server-owned and ignored, as is
    /// any status seen while a queued one is still unconfirmed.
    pub fn observe(&mut self, status: Status, voted: bool) {
        self.voted = voted;
        if !status.is_client_settable() {
            return;
        }
        match self.unconfirmed {
            Some(queued) if queued != status => {}
            _ => {
                self.unconfirmed = None;
                self.current = status;
            }
        }
    }

    /// Fire every timer due at or before `now`.
    pub fn poll(&mut self, now: Instant) {
        for timer in self.timers.pop_due(now) {
            match timer {
                Timer::Sleep => {
                    if !self.voted {
                        self.update(Status::Sleeping);
                    }
                }
                Timer::Debounce => self.record_activity(now),
                Timer::HoverEnd => {
                    if !self.voted && self.current == Status::Deciding {
                        self.update(Status::Idle);
                    }
                }
                Timer::ConfusedReset => {
                    if self.current == Status::Confused {
                        self.update(self.settled());
                    }
                }
            }
        }
    }

    fn record_activity(&mut self, now: Instant) {
        self.arm_sleep(now);
        if self.current == Status::Sleeping {
            self.update(Status::Idle);
        }
    }

    fn arm_sleep(&mut self, now: Instant) {
        self.timers.schedule(Timer::Sleep, now + self.timings.sleep_after);
    }

    fn settled(&self) -> Status {
        if self.voted { Status::Ready } else { Status::Idle }
    }

    fn update(&mut self, status: Status) {
        if self.current != status {
            self.current = status;
            self.unconfirmed = Some(status);
            self.outbox.push(status);
        }
    }
}

#[cfg(test)]
#[path = "presence_test.rs"]
mod tests;
