//! Client engine for scrumkit rooms.
//!
//! Everything a participant needs short of rendering: the presence tracker
//! that turns local input into status changes, the reconnection coordinator
//! that keeps a seat alive across flaky networks, the persisted session used
//! to resume after a restart, and an ordered room view with change events.
//!
//! DESIGN
//! ======
//! - Transport is injected through [`RoomConnector`]; this crate never opens
//!   a socket itself. The CLI plugs in `tokio-tungstenite`.
//! - Timer-driven pieces ([`ActivityTracker`], [`Coordinator`]) are plain
//!   state plus a [`frames::Scheduler`]; the owner sleeps until their next
//!   deadline and polls them.
//! - All client state lives on one task; `&mut self` serializes access.

pub mod errors;
pub mod presence;
pub mod reconnect;
pub mod store;
pub mod view;

pub use errors::{ClientError, ConnectError, is_room_full_error};
pub use presence::{ActivityTracker, PresenceTimings};
pub use reconnect::{
    ClientEvent, ConnectionState, Coordinator, Established, JoinParams, LinkEvent, ReconnectPolicy, RoomClient,
    RoomConnector, RoomLink,
};
pub use store::{FileSessionStore, MemorySessionStore, SessionStore, StoreError, StoredSession};
pub use view::{RoomView, SubscriptionId, ViewEvent};
