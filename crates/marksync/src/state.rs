//! Persisted engine state.
//!
//! Everything the engine needs to remember across sessions lives in one
//! small JSON file: bookmark counts for the UI, the last successful sync
//! time, the last-known canonical structure (for unsynced-change detection
//! at startup), the sync history ring and the folder selection.
//!
//! Writes are atomic: the state is written to a temp file first, then
//! renamed, so a crash mid-write never corrupts the file. A corrupted or
//! missing file loads as the default state.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::filter::FolderSelection;
use crate::history::SyncHistory;

/// State persisted between sessions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LocalState {
    /// Leaf bookmark count of the local tree, for the UI.
    pub local_count: usize,
    /// Leaf bookmark count of the last seen remote snapshot.
    pub remote_count: usize,
    /// When the last successful sync finished.
    pub last_sync_time: Option<DateTime<Utc>>,
    /// Serialized canonical structure recorded at the last successful sync.
    ///
    /// Compared against the live tree at startup to detect unsynced local
    /// changes.
    pub last_bookmark_structure: Option<String>,
    /// Ring of recent operation outcomes.
    pub sync_history: SyncHistory,
    /// The user's folder selection.
    #[serde(flatten)]
    pub selection: FolderSelection,
}

/// Atomic JSON file holding a [`LocalState`].
#[derive(Debug)]
pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    /// Create a handle for the given file path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Load the persisted state.
    ///
    /// A missing file is a fresh install; a corrupted file is discarded with
    /// a warning. Both load as the default state.
    pub async fn load(&self) -> LocalState {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(_) => {
                debug!(path = %self.path.display(), "No persisted state, starting fresh");
                return LocalState::default();
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(state) => state,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Persisted state corrupted, starting fresh");
                let _ = tokio::fs::remove_file(&self.path).await;
                LocalState::default()
            }
        }
    }

    /// Persist the state atomically (temp file + rename).
    pub async fn save(&self, state: &LocalState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::store(format!("failed to create state directory: {e}")))?;
        }

        let bytes = serde_json::to_vec_pretty(state)
            .map_err(|e| Error::serialization(format!("state encode failed: {e}")))?;

        let temp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, &bytes)
            .await
            .map_err(|e| Error::store(format!("failed to write state temp file: {e}")))?;
        tokio::fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| Error::store(format!("failed to rename state temp file: {e}")))?;

        debug!(path = %self.path.display(), "State saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{SyncKind, SyncOutcome};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_load_missing_returns_default() {
        let dir = TempDir::new().unwrap();
        let file = StateFile::new(dir.path().join("state.json"));
        let state = file.load().await;
        assert_eq!(state, LocalState::default());
    }

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let file = StateFile::new(dir.path().join("state.json"));

        let mut state = LocalState::default();
        state.local_count = 12;
        state.remote_count = 10;
        state.last_sync_time = Some(Utc::now());
        state.last_bookmark_structure = Some("[]".to_string());
        state.selection.selected_ids.insert("7".to_string());
        state
            .sync_history
            .record(SyncKind::Manual, SyncOutcome::Success, "uploaded 12 bookmarks");

        file.save(&state).await.unwrap();
        let loaded = file.load().await;
        assert_eq!(loaded, state);
    }

    #[tokio::test]
    async fn test_corrupted_state_heals_to_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        tokio::fs::write(&path, b"{not json").await.unwrap();

        let file = StateFile::new(&path);
        let state = file.load().await;
        assert_eq!(state, LocalState::default());
        assert!(!path.exists(), "corrupted file should be removed");
    }

    #[tokio::test]
    async fn test_save_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        let file = StateFile::new(&path);

        file.save(&LocalState::default()).await.unwrap();
        assert!(path.exists());
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_persisted_key_names() {
        let state = LocalState::default();
        let json = serde_json::to_string(&state).unwrap();
        assert!(json.contains("\"localCount\""));
        assert!(json.contains("\"lastSyncTime\""));
        assert!(json.contains("\"selectedFolderIds\""));
        assert!(json.contains("\"excludedFolderIds\""));
        assert!(json.contains("\"syncHistory\""));
    }
}
