//! Board snapshot storage.
//!
//! DESIGN
//! ======
//! Each retro room is one pretty-printed JSON file named after the room id.
//! Writes go to a temporary sibling first and are renamed into place, so a
//! crash mid-write leaves the previous snapshot intact.
//!
//! ERROR HANDLING
//! ==============
//! Load and save failures never reach the room. [`load_board`] falls back to
//! the default columns and [`save_snapshot`] logs; the in-memory board stays
//! authoritative either way.

use std::io::ErrorKind;
use std::path::PathBuf;

use tracing::{error, info, warn};

use crate::services::ErrorCode;
use crate::services::board::{Board, StoredSnapshot};

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("snapshot io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl crate::services::ErrorCode for PersistenceError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Io(_) => "E_PERSISTENCE_IO",
            Self::Json(_) => "E_PERSISTENCE_JSON",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}

/// Durable home for board snapshots. Enables in-memory stores in tests.
#[async_trait::async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Latest snapshot for `room_id`, or `None` if the room was never saved.
    ///
    /// # Errors
    ///
    /// Returns a [`PersistenceError`] if the snapshot exists but cannot be
    /// read or parsed.
    async fn load(&self, room_id: &str) -> Result<Option<StoredSnapshot>, PersistenceError>;

    /// Replace the snapshot for `snapshot.room_id`.
    ///
    /// # Errors
    ///
    /// Returns a [`PersistenceError`] if the snapshot cannot be written.
    async fn save(&self, snapshot: &StoredSnapshot) -> Result<(), PersistenceError>;
}

/// One JSON file per room under a data directory.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[cfg(test)]
    #[must_use]
    pub fn dir(&self) -> &std::path::Path {
        &self.dir
    }

    fn path_for(&self, room_id: &str) -> PathBuf {
        self.dir.join(format!("{room_id}.json"))
    }
}

#[async_trait::async_trait]
impl SnapshotStore for JsonFileStore {
    async fn load(&self, room_id: &str) -> Result<Option<StoredSnapshot>, PersistenceError> {
        let bytes = match tokio::fs::read(self.path_for(room_id)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    async fn save(&self, snapshot: &StoredSnapshot) -> Result<(), PersistenceError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let json = serde_json::to_vec_pretty(snapshot)?;
        let path = self.path_for(&snapshot.room_id);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

/// Board for a retro room: the stored snapshot if one loads, else defaults.
pub async fn load_board(store: &dyn SnapshotStore, room_id: &str) -> Board {
    match store.load(room_id).await {
        Ok(Some(stored)) => {
            info!(%room_id, columns = stored.columns.len(), "loaded board snapshot");
            Board::from_stored(stored)
        }
        Ok(None) => Board::with_default_columns(),
        Err(e) => {
            warn!(%room_id, code = e.error_code(), error = %e, "board snapshot load failed; starting from defaults");
            Board::with_default_columns()
        }
    }
}

/// Write a snapshot, logging the outcome. Returns true on success.
pub async fn save_snapshot(store: &dyn SnapshotStore, snapshot: &StoredSnapshot) -> bool {
    match store.save(snapshot).await {
        Ok(()) => {
            info!(room_id = %snapshot.room_id, "saved board snapshot");
            true
        }
        Err(e) => {
            error!(
                room_id = %snapshot.room_id,
                code = e.error_code(),
                retryable = e.retryable(),
                error = %e,
                "board snapshot save failed"
            );
            false
        }
    }
}

#[cfg(test)]
#[path = "persistence_test.rs"]
mod tests;
