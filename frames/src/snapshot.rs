//! Room state as seen by one recipient.

use serde::{Deserialize, Serialize};

use crate::{RoomKind, Status};

/// Whole-room state broadcast after every mutation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub room_id: String,
    pub kind: RoomKind,
    pub revealed: bool,
    /// Participants in join order.
    pub participants: Vec<ParticipantView>,
    /// Board columns sorted by `order`. Empty for voting rooms.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<ColumnView>,
}

/// One participant's public record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantView {
    pub id: String,
    pub name: String,
    pub avatar: u8,
    /// Empty when unvoted, or when the vote belongs to someone else and the
    /// room is not revealed yet.
    pub vote: String,
    /// Whether a vote is cast, visible even while the value is masked.
    pub voted: bool,
    pub status: Status,
    /// Milliseconds since the Unix epoch when the grace period started, 0
    /// while connected.
    pub disconnected_at: i64,
}

impl ParticipantView {
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.disconnected_at == 0
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnView {
    pub id: String,
    pub title: String,
    pub order: u32,
    /// Items in creation order.
    pub items: Vec<ItemView>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemView {
    pub id: String,
    pub content: String,
    pub author_name: String,
    pub created_at: i64,
}

impl RoomSnapshot {
    #[must_use]
    pub fn participant(&self, id: &str) -> Option<&ParticipantView> {
        self.participants.iter().find(|p| p.id == id)
    }

    #[must_use]
    pub fn column(&self, id: &str) -> Option<&ColumnView> {
        self.columns.iter().find(|c| c.id == id)
    }

    /// True when at least one participant is connected and every connected
    /// participant has voted. Seats held in the grace period do not count.
    #[must_use]
    pub fn voting_complete(&self) -> bool {
        let mut connected = self.participants.iter().filter(|p| p.is_connected()).peekable();
        connected.peek().is_some() && connected.all(|p| p.voted)
    }
}
