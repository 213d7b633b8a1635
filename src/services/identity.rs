//! Name-keyed participant identity.
//!
//! DESIGN
//! ======
//! A display name is the only identity a room knows about. Joining under a
//! name that an existing seat already holds evicts that seat, which covers a
//! reconnect on a fresh socket, a duplicate tab and a stale session alike.
//! There is no authentication, so anyone may claim any name.

use crate::services::room::SessionId;

/// Name used when a join supplies a blank one.
pub const ANONYMOUS: &str = "Anonymous";

/// Longest accepted display name, in characters.
pub const MAX_NAME_CHARS: usize = 64;

/// Trim a requested display name and cut it to [`MAX_NAME_CHARS`],
/// substituting [`ANONYMOUS`] for blanks.
#[must_use]
pub fn normalize_name(raw: &str) -> String {
    let name: String = raw.trim().chars().take(MAX_NAME_CHARS).collect();
    let name = name.trim_end();
    if name.is_empty() { ANONYMOUS.to_owned() } else { name.to_owned() }
}

/// Whether two display names denote the same participant.
#[must_use]
pub fn is_same_identity(a: &str, b: &str) -> bool {
    a == b
}

/// Sessions other than `incoming` that already hold `name`, in seat order.
pub fn collisions<'a>(
    seats: impl IntoIterator<Item = (SessionId, &'a str)>,
    name: &str,
    incoming: Option<SessionId>,
) -> Vec<SessionId> {
    seats
        .into_iter()
        .filter(|(id, seat_name)| Some(*id) != incoming && is_same_identity(seat_name, name))
        .map(|(id, _)| id)
        .collect()
}

#[cfg(test)]
#[path = "identity_test.rs"]
mod tests;
