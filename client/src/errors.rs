//! Client error types and the room-full check.

/// Why a single connect attempt (handshake included) failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectError {
    /// The server answered the handshake with an `error` frame.
    #[error("{message}")]
    Rejected { code: String, message: String },
    /// The socket could not be opened or broke mid-handshake.
    #[error("transport error: {0}")]
    Transport(String),
    /// The server closed the socket without granting a seat.
    #[error("connection closed during handshake")]
    Closed,
}

impl ConnectError {
    #[must_use]
    pub fn is_room_full(&self) -> bool {
        match self {
            Self::Rejected { code, message } => code == "E_ROOM_FULL" || is_room_full_error(message),
            Self::Transport(_) | Self::Closed => false,
        }
    }

    /// True when the server no longer knows the token used to resume.
    #[must_use]
    pub fn is_unknown_session(&self) -> bool {
        matches!(self, Self::Rejected { code, .. } if code == "E_UNKNOWN_SESSION")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("{0}")]
    RoomFull(String),
    #[error("failed to join room: {0}")]
    Connect(#[from] ConnectError),
    #[error("not connected to a room")]
    NotConnected,
}

/// True if a server error message means the room has no free seat.
#[must_use]
pub fn is_room_full_error(message: &str) -> bool {
    message.contains("maxClients") || message.contains("full")
}

#[cfg(test)]
#[path = "errors_test.rs"]
mod tests;
