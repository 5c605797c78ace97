//! File-backed session storage.
//!
//! One directory per session id, containing the story log and one record per
//! NPC. Writes go through a temp file and an atomic rename, so a reader never
//! observes a partially written record; a crash between the two steps leaves
//! an orphaned temp file that is never read as the canonical record.

use crate::state::{NpcState, StoryLog};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::debug;

/// Errors from storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// File-backed store for all sessions under a root directory.
#[derive(Debug, Clone)]
pub struct SessionStore {
    root: PathBuf,
}

impl SessionStore {
    /// Create a store rooted at the given directory. The directory is created
    /// lazily on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Load a session's story log, or an empty log if none exists.
    pub async fn load_story(&self, session_id: &str) -> Result<StoryLog, StorageError> {
        self.read_json(&self.story_path(session_id)).await
    }

    /// Persist a session's story log.
    pub async fn save_story(
        &self,
        session_id: &str,
        story: &StoryLog,
    ) -> Result<(), StorageError> {
        self.write_json(&self.story_path(session_id), story).await
    }

    /// Load an NPC's state record, or the default record if none exists.
    pub async fn load_npc(
        &self,
        session_id: &str,
        npc_name: &str,
    ) -> Result<NpcState, StorageError> {
        self.read_json(&self.npc_path(session_id, npc_name)).await
    }

    /// Persist an NPC's state record.
    pub async fn save_npc(
        &self,
        session_id: &str,
        npc_name: &str,
        state: &NpcState,
    ) -> Result<(), StorageError> {
        self.write_json(&self.npc_path(session_id, npc_name), state)
            .await
    }

    /// Remove a session's entire namespace. Deleting a session that does not
    /// exist is a no-op, not an error.
    pub async fn delete_session(&self, session_id: &str) -> Result<(), StorageError> {
        let dir = self.session_dir(session_id);
        match fs::remove_dir_all(&dir).await {
            Ok(()) => {
                debug!(session = session_id, "deleted session namespace");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn session_dir(&self, session_id: &str) -> PathBuf {
        self.root.join(sanitize(session_id))
    }

    fn story_path(&self, session_id: &str) -> PathBuf {
        self.session_dir(session_id).join("story.json")
    }

    fn npc_path(&self, session_id: &str, npc_name: &str) -> PathBuf {
        self.session_dir(session_id)
            .join("npcs")
            .join(format!("{}.json", sanitize(npc_name)))
    }

    async fn read_json<T: DeserializeOwned + Default>(
        &self,
        path: &Path,
    ) -> Result<T, StorageError> {
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(T::default()),
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&content)?)
    }

    async fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<(), StorageError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(value)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, content).await?;
        fs::rename(&tmp, path).await?;

        debug!(path = %path.display(), "wrote session record");
        Ok(())
    }
}

/// Map a session or NPC name to a filesystem-safe component. Arbitrary names
/// must not be able to escape the session namespace.
pub(crate) fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect()
}
