//! Shared room message model and JSON codec for realtime WS transport.
//!
//! This crate owns the wire representation used by both the server and the
//! client engine. Every message is a closed enum variant carrying a typed
//! payload; dispatch on either side is an exhaustive `match`, never a string
//! lookup.
//!
//! DESIGN
//! ======
//! - Text frames, JSON, internally tagged by `type` (camelCase).
//! - The server broadcasts whole-room snapshots after every mutation; there
//!   is no delta protocol at this layer.
//! - The [`Scheduler`] lives here because both ends own deadline-driven
//!   timers (room actors on the server, the presence tracker on the client).

mod schedule;
mod snapshot;
mod status;

pub use schedule::Scheduler;
pub use snapshot::{ColumnView, ItemView, ParticipantView, RoomSnapshot};
pub use status::{Reaction, Status};

use serde::{Deserialize, Serialize};

// =============================================================================
// CONSTANTS
// =============================================================================

/// Number of avatar images available; valid indexes are `0..TOTAL_AVATARS`.
pub const TOTAL_AVATARS: u8 = 141;

/// Maximum length of a board item after trimming, in characters.
pub const MAX_ITEM_CHARS: usize = 500;

/// Close code for an intentional, client-confirmed leave.
pub const CLOSE_NORMAL: u16 = 1000;

/// Close code sent to a connection whose participant was replaced by a newer
/// join with the same name. Clients must not try to resume after it.
pub const CLOSE_REPLACED: u16 = 4001;

/// Close code sent when the opening `join`/`resume` frame is rejected.
pub const CLOSE_REJECTED: u16 = 4002;

// =============================================================================
// ERRORS
// =============================================================================

/// Error returned by [`decode_client`] and [`decode_server`].
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The text could not be parsed as a known message.
    #[error("failed to decode message: {0}")]
    Json(#[from] serde_json::Error),
}

// =============================================================================
// ROOM KIND
// =============================================================================

/// The two room flavours served by the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomKind {
    /// Estimation voting with a reconnection grace period.
    Scrum,
    /// Retrospective board; persisted, no grace period.
    Retro,
}

impl RoomKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scrum => "scrum",
            Self::Retro => "retro",
        }
    }

    /// Board rooms hold columns and items and persist them.
    #[must_use]
    pub fn has_board(self) -> bool {
        matches!(self, Self::Retro)
    }
}

impl std::fmt::Display for RoomKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RoomKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scrum" => Ok(Self::Scrum),
            "retro" => Ok(Self::Retro),
            other => Err(format!("unknown room kind: {other}")),
        }
    }
}

// =============================================================================
// MESSAGES
// =============================================================================

/// Every frame a client may send. The first frame on a socket must be
/// [`ClientMessage::Join`] or [`ClientMessage::Resume`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Take a fresh seat. A missing avatar is assigned at random.
    Join {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        avatar: Option<u8>,
    },
    /// Reclaim a seat held in the grace period.
    Resume { token: String },
    /// Intentional leave; the seat is released immediately.
    Leave,
    /// Cast a vote; sending the current vote again clears it.
    Vote { vote: String },
    /// Set the sender's presence status directly.
    Status { status: Status },
    Reveal,
    Reset,
    ThrowEmoji { target_id: String, emoji: Reaction },
    AddItem { column_id: String, content: String },
    EditItem { column_id: String, item_id: String, content: String },
    DeleteItem { column_id: String, item_id: String },
}

/// Every frame the server may send.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Reply to a successful `join` or `resume`.
    Joined { session_id: String, token: String, state: RoomSnapshot },
    /// Full room state, sent after every mutation.
    State { state: RoomSnapshot },
    /// Animation trigger only; the status change arrives in the next `state`.
    EmojiThrown { from_id: String, to_id: String, emoji: Reaction },
    Error { code: String, message: String },
}

impl ServerMessage {
    #[must_use]
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error { code: code.into(), message: message.into() }
    }
}

// =============================================================================
// CODEC
// =============================================================================

/// Encode any message as a JSON text frame.
///
/// Message types contain only string-keyed maps, so serialization cannot
/// fail; an empty string is returned if it ever does.
#[must_use]
pub fn encode<T: Serialize>(message: &T) -> String {
    serde_json::to_string(message).unwrap_or_default()
}

/// Decode a client frame.
///
/// # Errors
///
/// Returns [`CodecError::Json`] for malformed JSON, unknown `type` tags,
/// unknown status/emoji values, or missing fields.
pub fn decode_client(text: &str) -> Result<ClientMessage, CodecError> {
    Ok(serde_json::from_str(text)?)
}

/// Decode a server frame.
///
/// # Errors
///
/// Returns [`CodecError::Json`] if the text is not a known server message.
pub fn decode_server(text: &str) -> Result<ServerMessage, CodecError> {
    Ok(serde_json::from_str(text)?)
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
