//! Persisted client session.
//!
//! DESIGN
//! ======
//! After every successful join the client stores `{token, room, name,
//! avatar}`. On the next join for the same room it tries the token first so
//! a restarted process lands back in its old seat. The record is cleared on
//! an intentional leave, on a cancelled reconnect, and when reconnection
//! gives up.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use frames::RoomKind;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("session io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("session json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// What is needed to reclaim a seat after a restart.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSession {
    pub token: String,
    pub kind: RoomKind,
    pub room_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<u8>,
}

impl StoredSession {
    #[must_use]
    pub fn is_for(&self, kind: RoomKind, room_id: &str) -> bool {
        self.kind == kind && self.room_id == room_id
    }
}

/// Where the client keeps its one session record.
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    /// The stored session, if any.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if a record exists but cannot be read.
    async fn load(&self) -> Result<Option<StoredSession>, StoreError>;

    /// Replace the stored session.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the record cannot be written.
    async fn save(&self, session: &StoredSession) -> Result<(), StoreError>;

    /// Forget the stored session. Clearing an empty store is not an error.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if an existing record cannot be removed.
    async fn clear(&self) -> Result<(), StoreError>;
}

/// Process-local store; a restart starts fresh.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    slot: Mutex<Option<StoredSession>>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_slot<R>(&self, f: impl FnOnce(&mut Option<StoredSession>) -> R) -> R {
        let mut slot = self.slot.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        f(&mut slot)
    }
}

#[async_trait::async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self) -> Result<Option<StoredSession>, StoreError> {
        Ok(self.with_slot(|slot| slot.clone()))
    }

    async fn save(&self, session: &StoredSession) -> Result<(), StoreError> {
        self.with_slot(|slot| *slot = Some(session.clone()));
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.with_slot(|slot| *slot = None);
        Ok(())
    }
}

/// One JSON file holding the session record.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait::async_trait]
impl SessionStore for FileSessionStore {
    async fn load(&self) -> Result<Option<StoredSession>, StoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    async fn save(&self, session: &StoredSession) -> Result<(), StoreError> {
        if let Some(dir) = self.path.parent()
            && !dir.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(dir).await?;
        }
        let json = serde_json::to_vec_pretty(session)?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
#[path = "store_test.rs"]
mod tests;
