//! Checkpoint state stores.
//!
//! The engine checkpoints the full run state after planning and after
//! every completed step, so a crashed or cancelled run can resume without
//! re-executing finished steps. [`InMemoryStateStore`] backs tests and
//! single-process deployments; [`FileStateStore`] persists one JSON file
//! per run with atomic replace semantics.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use conductor_core::{AgentState, StoreError, StoreResult};

/// Persistence seam for workflow checkpoints.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Persist a checkpoint, replacing any previous one for the run.
    async fn save(&self, state: &AgentState) -> StoreResult<()>;

    /// Load the checkpoint for a run, `None` when absent.
    async fn load(&self, run_id: &str) -> StoreResult<Option<AgentState>>;

    /// Delete the checkpoint for a run, reporting whether one existed.
    async fn delete(&self, run_id: &str) -> StoreResult<bool>;

    /// Ids of all runs with a checkpoint.
    async fn list_runs(&self) -> StoreResult<Vec<String>>;
}

/// Keeps checkpoints in process memory.
#[derive(Default)]
pub struct InMemoryStateStore {
    states: RwLock<HashMap<String, AgentState>>,
}

impl InMemoryStateStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn save(&self, state: &AgentState) -> StoreResult<()> {
        self.states
            .write()
            .await
            .insert(state.run_id.clone(), state.clone());
        Ok(())
    }

    async fn load(&self, run_id: &str) -> StoreResult<Option<AgentState>> {
        Ok(self.states.read().await.get(run_id).cloned())
    }

    async fn delete(&self, run_id: &str) -> StoreResult<bool> {
        Ok(self.states.write().await.remove(run_id).is_some())
    }

    async fn list_runs(&self) -> StoreResult<Vec<String>> {
        let mut ids: Vec<String> = self.states.read().await.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

/// Persists one `<run_id>.json` file per run under a directory.
///
/// Writes go through a temp file and rename, so a crash mid-write never
/// leaves a truncated checkpoint behind.
pub struct FileStateStore {
    dir: Arc<PathBuf>,
}

impl FileStateStore {
    /// Create a store rooted at a directory, creating it if needed.
    pub fn new(dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir: Arc::new(dir) })
    }

    fn path_for(&self, run_id: &str) -> PathBuf {
        self.dir.join(format!("{run_id}.json"))
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn save(&self, state: &AgentState) -> StoreResult<()> {
        let path = self.path_for(&state.run_id);
        let tmp = path.with_extension("json.tmp");
        let encoded = serde_json::to_vec_pretty(state)?;
        let run_id = state.run_id.clone();

        tokio::task::spawn_blocking(move || -> StoreResult<()> {
            std::fs::write(&tmp, &encoded)?;
            std::fs::rename(&tmp, &path)?;
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Io(e.to_string()))??;

        debug!(run_id = %run_id, "Checkpoint saved");
        Ok(())
    }

    async fn load(&self, run_id: &str) -> StoreResult<Option<AgentState>> {
        let path = self.path_for(run_id);
        let bytes = tokio::task::spawn_blocking(move || match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::from(e)),
        })
        .await
        .map_err(|e| StoreError::Io(e.to_string()))??;

        match bytes {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn delete(&self, run_id: &str) -> StoreResult<bool> {
        let path = self.path_for(run_id);
        tokio::task::spawn_blocking(move || match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::from(e)),
        })
        .await
        .map_err(|e| StoreError::Io(e.to_string()))?
    }

    async fn list_runs(&self) -> StoreResult<Vec<String>> {
        let dir = Arc::clone(&self.dir);
        let mut ids = tokio::task::spawn_blocking(move || -> StoreResult<Vec<String>> {
            let mut ids = Vec::new();
            for entry in std::fs::read_dir(dir.as_path())? {
                let path = entry?.path();
                if path.extension().and_then(|e| e.to_str()) == Some("json")
                    && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
                {
                    ids.push(stem.to_string());
                }
            }
            Ok(ids)
        })
        .await
        .map_err(|e| StoreError::Io(e.to_string()))??;

        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_core::WorkflowStatus;

    #[tokio::test]
    async fn test_in_memory_round_trip() {
        let store = InMemoryStateStore::new();
        let mut state = AgentState::new("a task");
        state.set_status(WorkflowStatus::Planning);

        store.save(&state).await.unwrap();
        let loaded = store.load(&state.run_id).await.unwrap().unwrap();
        assert_eq!(loaded, state);

        assert_eq!(store.list_runs().await.unwrap(), vec![state.run_id.clone()]);
        assert!(store.delete(&state.run_id).await.unwrap());
        assert!(!store.delete(&state.run_id).await.unwrap());
        assert!(store.load(&state.run_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path()).unwrap();

        let state = AgentState::new("persisted task");
        store.save(&state).await.unwrap();

        let loaded = store.load(&state.run_id).await.unwrap().unwrap();
        assert_eq!(loaded, state);
        assert_eq!(store.list_runs().await.unwrap(), vec![state.run_id.clone()]);
    }

    #[tokio::test]
    async fn test_file_store_save_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path()).unwrap();

        let mut state = AgentState::new("task");
        store.save(&state).await.unwrap();
        state.set_status(WorkflowStatus::Completed);
        store.save(&state).await.unwrap();

        let loaded = store.load(&state.run_id).await.unwrap().unwrap();
        assert_eq!(loaded.status, WorkflowStatus::Completed);
        // No leftover temp file after the atomic replace.
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().and_then(|x| x.to_str()) == Some("tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_file_store_missing_run() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path()).unwrap();
        assert!(store.load("no-such-run").await.unwrap().is_none());
        assert!(!store.delete("no-such-run").await.unwrap());
    }
}
