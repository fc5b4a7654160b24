//! Durable user-record storage.
//!
//! Two scopes exist: a long-lived store that survives process restarts and a
//! session-scoped store that lives only as long as the process. Which one
//! mirrors the user record is selected by the `remember_me` flag at login.
//! Neither scope ever stores the access token.

use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use crate::error::StorageError;
use crate::user::User;

/// Durable storage seam for the user record.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Load the mirrored user record, if any.
    async fn load(&self) -> Result<Option<User>, StorageError>;

    /// Replace the mirrored user record.
    async fn save(&self, user: &User) -> Result<(), StorageError>;

    /// Remove the mirrored user record. Removing an absent record is not an
    /// error.
    async fn clear(&self) -> Result<(), StorageError>;
}

/// File-backed store: the "persist across restarts" scope.
pub struct FileUserStore {
    path: PathBuf,
}

impl FileUserStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

#[async_trait]
impl UserStore for FileUserStore {
    async fn load(&self) -> Result<Option<User>, StorageError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let user = serde_json::from_slice(&bytes)?;
        Ok(Some(user))
    }

    async fn save(&self, user: &User) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec_pretty(user)?;
        tokio::fs::write(&self.path, bytes).await?;
        debug!(path = %self.path.display(), "Persisted user record");
        Ok(())
    }

    async fn clear(&self) -> Result<(), StorageError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory store: the "this session only" scope. Its contents die with the
/// process, which is exactly the lifetime a non-remembered session should
/// have.
#[derive(Default)]
pub struct MemoryUserStore {
    slot: RwLock<Option<User>>,
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn load(&self) -> Result<Option<User>, StorageError> {
        Ok(self.slot.read().clone())
    }

    async fn save(&self, user: &User) -> Result<(), StorageError> {
        *self.slot.write() = Some(user.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<(), StorageError> {
        *self.slot.write() = None;
        Ok(())
    }
}
