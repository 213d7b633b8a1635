//! Client-side room view with synchronous change events.
//!
//! DESIGN
//! ======
//! The server sends whole-room snapshots. [`RoomView`] diffs each snapshot
//! against the participants it already holds and tells subscribers what
//! changed, in order: removals, then additions and changes in join order.
//! Subscribers run synchronously inside [`RoomView::apply_joined`] and
//! [`RoomView::apply_state`].
//!
//! Join and leave notifications (`PeerJoined`/`PeerLeft`) are separate from
//! the raw collection events: they skip the local participant, and
//! `PeerJoined` is suppressed for the snapshot delivered with `joined` so a
//! fresh load or a reconnect does not announce everyone already present.

use frames::{ColumnView, ParticipantView, RoomKind, RoomSnapshot};
use indexmap::IndexMap;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ViewEvent {
    Added(ParticipantView),
    Removed(ParticipantView),
    Changed { before: ParticipantView, after: ParticipantView },
    Revealed(bool),
    BoardChanged,
    PeerJoined(ParticipantView),
    PeerLeft(ParticipantView),
}

/// Returned by [`RoomView::subscribe`]; pass to [`RoomView::unsubscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Observer = Box<dyn FnMut(&ViewEvent) + Send>;

#[derive(Default)]
pub struct RoomView {
    room_id: String,
    kind: Option<RoomKind>,
    local_id: Option<String>,
    revealed: bool,
    participants: IndexMap<String, ParticipantView>,
    columns: Vec<ColumnView>,
    observers: Vec<(SubscriptionId, Observer)>,
    next_subscription: u64,
}

impl std::fmt::Debug for RoomView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomView")
            .field("room_id", &self.room_id)
            .field("local_id", &self.local_id)
            .field("participants", &self.participants.len())
            .field("observers", &self.observers.len())
            .finish_non_exhaustive()
    }
}

impl RoomView {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, observer: impl FnMut(&ViewEvent) + Send + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.observers.push((id, Box::new(observer)));
        id
    }

    /// Returns false if `id` was not subscribed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(sid, _)| *sid != id);
        self.observers.len() != before
    }

    /// Load the snapshot that came with `joined` for `local_id`.
    pub fn apply_joined(&mut self, local_id: &str, snapshot: RoomSnapshot) {
        self.local_id = Some(local_id.to_owned());
        self.apply(snapshot, false);
    }

    pub fn apply_state(&mut self, snapshot: RoomSnapshot) {
        self.apply(snapshot, true);
    }

    /// Forget everything except subscribers. No events are emitted.
    pub fn clear(&mut self) {
        self.room_id.clear();
        self.kind = None;
        self.local_id = None;
        self.revealed = false;
        self.participants.clear();
        self.columns.clear();
    }

    #[must_use]
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    #[must_use]
    pub fn kind(&self) -> Option<RoomKind> {
        self.kind
    }

    #[must_use]
    pub fn local_id(&self) -> Option<&str> {
        self.local_id.as_deref()
    }

    #[must_use]
    pub fn me(&self) -> Option<&ParticipantView> {
        self.local_id.as_deref().and_then(|id| self.participants.get(id))
    }

    #[must_use]
    pub fn revealed(&self) -> bool {
        self.revealed
    }

    #[must_use]
    pub fn participant(&self, id: &str) -> Option<&ParticipantView> {
        self.participants.get(id)
    }

    /// First participant whose name matches exactly.
    #[must_use]
    pub fn find_by_name(&self, name: &str) -> Option<&ParticipantView> {
        self.participants.values().find(|p| p.name == name)
    }

    /// Participants in join order.
    pub fn participants(&self) -> impl Iterator<Item = &ParticipantView> {
        self.participants.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.participants.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    #[must_use]
    pub fn columns(&self) -> &[ColumnView] {
        &self.columns
    }

    fn apply(&mut self, snapshot: RoomSnapshot, announce_joins: bool) {
        let mut events = Vec::new();

        let removed: Vec<String> = self
            .participants
            .keys()
            .filter(|id| snapshot.participant(id).is_none())
            .cloned()
            .collect();
        for id in removed {
            if let Some(gone) = self.participants.shift_remove(&id) {
                let is_peer = !self.is_local(&gone.id);
                events.push(ViewEvent::Removed(gone.clone()));
                if is_peer {
                    events.push(ViewEvent::PeerLeft(gone));
                }
            }
        }

        for incoming in snapshot.participants {
            match self.participants.get_mut(&incoming.id) {
                Some(existing) if *existing == incoming => {}
                Some(existing) => {
                    let before = std::mem::replace(existing, incoming.clone());
                    events.push(ViewEvent::Changed { before, after: incoming });
                }
                None => {
                    let announce = announce_joins && !self.is_local(&incoming.id);
                    self.participants.insert(incoming.id.clone(), incoming.clone());
                    events.push(ViewEvent::Added(incoming.clone()));
                    if announce {
                        events.push(ViewEvent::PeerJoined(incoming));
                    }
                }
            }
        }

        if self.revealed != snapshot.revealed {
            self.revealed = snapshot.revealed;
            events.push(ViewEvent::Revealed(snapshot.revealed));
        }
        if self.columns != snapshot.columns {
            self.columns = snapshot.columns;
            events.push(ViewEvent::BoardChanged);
        }
        self.room_id = snapshot.room_id;
        self.kind = Some(snapshot.kind);

        for event in &events {
            for (_, observer) in &mut self.observers {
                observer(event);
            }
        }
    }

    fn is_local(&self, id: &str) -> bool {
        self.local_id.as_deref() == Some(id)
    }
}

#[cfg(test)]
#[path = "view_test.rs"]
mod tests;
