//! Session tokens for seat resumption.
//!
//! ARCHITECTURE
//! ============
//! A token is issued when a seat is taken and handed to the client in the
//! `joined` reply. Presenting it on a new socket reclaims the same session
//! id, vote and status instead of creating a new participant.
//!
//! TRADE-OFFS
//! ==========
//! Tokens survive a successful resume unchanged. Rotating them would make a
//! lost `joined` reply strand the client on a dead token; a stable token
//! only stops working once the seat itself is gone.

use std::collections::HashMap;
use std::fmt::Write;

use rand::Rng;

use crate::services::room::SessionId;

pub(crate) fn bytes_to_hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}

/// Generate a cryptographically random 32-byte hex token.
#[must_use]
pub fn generate_token() -> String {
    let bytes: [u8; 32] = rand::rng().random();
    bytes_to_hex(&bytes)
}

/// Live tokens of one room, indexed both ways so a seat's token can be
/// revoked when the seat goes away.
#[derive(Debug, Default)]
pub struct SessionTokens {
    by_token: HashMap<String, SessionId>,
    by_session: HashMap<SessionId, String>,
}

impl SessionTokens {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a token for `session_id`, replacing any earlier one.
    pub fn issue(&mut self, session_id: SessionId) -> String {
        self.revoke(session_id);
        let token = generate_token();
        self.by_token.insert(token.clone(), session_id);
        self.by_session.insert(session_id, token.clone());
        token
    }

    /// Session bound to `token`, if it is still valid.
    #[must_use]
    pub fn lookup(&self, token: &str) -> Option<SessionId> {
        self.by_token.get(token).copied()
    }

    #[cfg(test)]
    #[must_use]
    pub fn token_for(&self, session_id: SessionId) -> Option<&str> {
        self.by_session.get(&session_id).map(String::as_str)
    }

    /// Invalidate the token bound to `session_id`. Returns true if one existed.
    pub fn revoke(&mut self, session_id: SessionId) -> bool {
        match self.by_session.remove(&session_id) {
            Some(token) => {
                self.by_token.remove(&token);
                true
            }
            None => false,
        }
    }

    #[cfg(test)]
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_token.len()
    }

    #[cfg(test)]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_token.is_empty()
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
