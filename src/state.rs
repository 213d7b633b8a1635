//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor.
//! It holds the configuration, the snapshot store and the registry of live
//! rooms. The registry maps `(kind, room id)` to the handle of the actor
//! that owns that room; actors remove themselves when their room empties.

use std::collections::HashMap;
use std::sync::Arc;

use frames::RoomKind;
use tokio::sync::RwLock;

use crate::config::ServerConfig;
use crate::services::actor::RoomHandle;
use crate::services::persistence::SnapshotStore;

/// Longest accepted room id, in bytes.
pub const MAX_ROOM_ID_LEN: usize = 64;

/// Registry key: rooms of different kinds never share state.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoomKey {
    pub kind: RoomKind,
    pub room_id: String,
}

impl RoomKey {
    #[must_use]
    pub fn new(kind: RoomKind, room_id: impl Into<String>) -> Self {
        Self { kind, room_id: room_id.into() }
    }
}

pub type RoomRegistry = Arc<RwLock<HashMap<RoomKey, RoomHandle>>>;

/// Room ids double as snapshot file names, so only `[A-Za-z0-9_-]` is allowed.
#[must_use]
pub fn is_valid_room_id(room_id: &str) -> bool {
    !room_id.is_empty()
        && room_id.len() <= MAX_ROOM_ID_LEN
        && room_id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Shared application state, injected into Axum handlers via State extractor.
/// Clone is required by Axum; all inner fields are Arc-wrapped.
#[derive(Clone)]
pub struct AppState {
    pub rooms: RoomRegistry,
    pub config: Arc<ServerConfig>,
    pub store: Arc<dyn SnapshotStore>,
}

impl AppState {
    #[must_use]
    pub fn new(config: ServerConfig, store: Arc<dyn SnapshotStore>) -> Self {
        Self { rooms: Arc::new(RwLock::new(HashMap::new())), config: Arc::new(config), store }
    }

    #[cfg(test)]
    /// Number of rooms with a running actor.
    pub async fn live_rooms(&self) -> usize {
        self.rooms.read().await.len()
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================

#[cfg(test)]
pub mod test_helpers {
    use std::sync::Mutex;

    use super::*;
    use crate::config::RoomConfig;
    use crate::services::board::StoredSnapshot;
    use crate::services::persistence::PersistenceError;

    /// In-memory snapshot store that records every successful save.
    #[derive(Default)]
    pub struct MemoryStore {
        snapshots: Mutex<HashMap<String, StoredSnapshot>>,
        saves: Mutex<Vec<StoredSnapshot>>,
        fail: bool,
    }

    impl MemoryStore {
        /// A store whose saves always fail.
        #[must_use]
        pub fn failing() -> Self {
            Self { fail: true, ..Self::default() }
        }

        /// A store already holding `snapshot`.
        #[must_use]
        pub fn seeded(snapshot: StoredSnapshot) -> Self {
            let store = Self::default();
            store
                .snapshots
                .lock()
                .expect("store mutex should lock")
                .insert(snapshot.room_id.clone(), snapshot);
            store
        }

        /// Every snapshot saved so far, oldest first.
        #[must_use]
        pub fn saves(&self) -> Vec<StoredSnapshot> {
            self.saves.lock().expect("store mutex should lock").clone()
        }
    }

    #[async_trait::async_trait]
    impl SnapshotStore for MemoryStore {
        async fn load(&self, room_id: &str) -> Result<Option<StoredSnapshot>, PersistenceError> {
            Ok(self.snapshots.lock().expect("store mutex should lock").get(room_id).cloned())
        }

        async fn save(&self, snapshot: &StoredSnapshot) -> Result<(), PersistenceError> {
            if self.fail {
                return Err(std::io::Error::other("disk on fire").into());
            }
            self.snapshots
                .lock()
                .expect("store mutex should lock")
                .insert(snapshot.room_id.clone(), snapshot.clone());
            self.saves.lock().expect("store mutex should lock").push(snapshot.clone());
            Ok(())
        }
    }

    /// Room timings used across tests: short enough to read, distinct enough
    /// to tell apart.
    #[must_use]
    pub fn test_room_config() -> RoomConfig {
        RoomConfig {
            max_clients: 3,
            grace_period: std::time::Duration::from_secs(30),
            reaction_duration: std::time::Duration::from_secs(4),
            save_debounce: std::time::Duration::from_secs(2),
        }
    }

    /// Create a test `AppState` backed by `store`.
    #[must_use]
    pub fn test_app_state_with_store(store: Arc<MemoryStore>) -> AppState {
        let config = ServerConfig { room: test_room_config(), ..ServerConfig::default() };
        AppState::new(config, store)
    }

    /// Create a test `AppState` with an empty in-memory store.
    #[must_use]
    pub fn test_app_state() -> AppState {
        test_app_state_with_store(Arc::new(MemoryStore::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_id_accepts_slug_characters() {
        assert!(is_valid_room_id("sprint-42"));
        assert!(is_valid_room_id("team_a"));
        assert!(is_valid_room_id(&"a".repeat(MAX_ROOM_ID_LEN)));
    }

    #[test]
    fn room_id_rejects_path_like_or_empty() {
        assert!(!is_valid_room_id(""));
        assert!(!is_valid_room_id("../etc"));
        assert!(!is_valid_room_id("a b"));
        assert!(!is_valid_room_id(&"a".repeat(MAX_ROOM_ID_LEN + 1)));
    }

    #[test]
    fn room_keys_differ_by_kind() {
        assert_ne!(RoomKey::new(RoomKind::Scrum, "x"), RoomKey::new(RoomKind::Retro, "x"));
    }

    #[tokio::test]
    async fn new_state_has_no_live_rooms() {
        let state = test_helpers::test_app_state();
        assert_eq!(state.live_rooms().await, 0);
    }
}
