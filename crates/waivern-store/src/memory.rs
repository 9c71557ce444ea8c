//! In-memory store backend.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use waivern_core::{ArtifactId, ExecutionState, Message, RunId, RunMetadata};

use crate::{ArtifactStore, StoreError, StoreResult, TRACING_TARGET};

/// Everything the store holds for a single run.
#[derive(Debug, Default)]
struct RunEntry {
    artifacts: HashMap<ArtifactId, Message>,
    state: Option<ExecutionState>,
    metadata: Option<RunMetadata>,
}

/// In-memory [`ArtifactStore`] backend.
///
/// Keeps one map per run behind an async lock. Intended for tests and
/// short-lived local runs; nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    runs: RwLock<HashMap<RunId, RunEntry>>,
}

impl MemoryStore {
    /// Creates an empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ArtifactStore for MemoryStore {
    async fn save_artifact(
        &self,
        run_id: RunId,
        id: &ArtifactId,
        message: &Message,
    ) -> StoreResult<()> {
        let mut runs = self.runs.write().await;
        runs.entry(run_id)
            .or_default()
            .artifacts
            .insert(id.clone(), message.clone());

        tracing::debug!(
            target: TRACING_TARGET,
            run_id = %run_id,
            artifact_id = %id,
            "Artifact saved"
        );

        Ok(())
    }

    async fn get_artifact(&self, run_id: RunId, id: &ArtifactId) -> StoreResult<Message> {
        let runs = self.runs.read().await;
        runs.get(&run_id)
            .and_then(|entry| entry.artifacts.get(id))
            .cloned()
            .ok_or_else(|| StoreError::artifact_not_found(run_id, id.clone()))
    }

    async fn artifact_exists(&self, run_id: RunId, id: &ArtifactId) -> StoreResult<bool> {
        let runs = self.runs.read().await;
        Ok(runs
            .get(&run_id)
            .is_some_and(|entry| entry.artifacts.contains_key(id)))
    }

    async fn delete_artifact(&self, run_id: RunId, id: &ArtifactId) -> StoreResult<()> {
        let mut runs = self.runs.write().await;
        if let Some(entry) = runs.get_mut(&run_id) {
            entry.artifacts.remove(id);
        }
        Ok(())
    }

    async fn list_artifacts(&self, run_id: RunId) -> StoreResult<Vec<ArtifactId>> {
        let runs = self.runs.read().await;
        Ok(runs
            .get(&run_id)
            .map(|entry| entry.artifacts.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn clear_artifacts(&self, run_id: RunId) -> StoreResult<()> {
        let mut runs = self.runs.write().await;
        if let Some(entry) = runs.get_mut(&run_id) {
            entry.artifacts.clear();
        }

        tracing::debug!(
            target: TRACING_TARGET,
            run_id = %run_id,
            "Artifacts cleared"
        );

        Ok(())
    }

    async fn save_execution_state(&self, run_id: RunId, state: &ExecutionState) -> StoreResult<()> {
        let mut runs = self.runs.write().await;
        runs.entry(run_id).or_default().state = Some(state.clone());
        Ok(())
    }

    async fn load_execution_state(&self, run_id: RunId) -> StoreResult<ExecutionState> {
        let runs = self.runs.read().await;
        runs.get(&run_id)
            .and_then(|entry| entry.state.clone())
            .ok_or(StoreError::RunNotFound(run_id))
    }

    async fn save_run_metadata(&self, run_id: RunId, metadata: &RunMetadata) -> StoreResult<()> {
        let mut runs = self.runs.write().await;
        runs.entry(run_id).or_default().metadata = Some(metadata.clone());
        Ok(())
    }

    async fn load_run_metadata(&self, run_id: RunId) -> StoreResult<RunMetadata> {
        let runs = self.runs.read().await;
        runs.get(&run_id)
            .and_then(|entry| entry.metadata.clone())
            .ok_or(StoreError::RunNotFound(run_id))
    }

    async fn list_runs(&self) -> StoreResult<Vec<RunId>> {
        let runs = self.runs.read().await;
        Ok(runs.keys().copied().collect())
    }
}

#[cfg(test)]
mod tests {
    use jiff::Timestamp;
    use serde_json::json;
    use waivern_core::{ExecutionStatus, NodeStatus, RunStatus};

    use super::*;

    fn artifact(id: &str) -> ArtifactId {
        id.parse().expect("valid id")
    }

    fn message(content: serde_json::Value) -> Message {
        Message::new("finding/1.0.0".parse().expect("schema"), content)
            .with_status(ExecutionStatus::Success)
    }

    #[tokio::test]
    async fn test_artifact_roundtrip() {
        let store = MemoryStore::new();
        let run = RunId::new();
        let id = artifact("db_schema");
        let msg = message(json!({"tables": ["users"]}));

        store.save_artifact(run, &id, &msg).await.expect("save");
        let loaded = store.get_artifact(run, &id).await.expect("get");
        assert_eq!(loaded, msg);
    }

    #[tokio::test]
    async fn test_get_missing_artifact() {
        let store = MemoryStore::new();
        let err = store
            .get_artifact(RunId::new(), &artifact("nope"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ArtifactNotFound { .. }));
    }

    #[tokio::test]
    async fn test_save_is_upsert() {
        let store = MemoryStore::new();
        let run = RunId::new();
        let id = artifact("a");

        store
            .save_artifact(run, &id, &message(json!(1)))
            .await
            .expect("first save");
        store
            .save_artifact(run, &id, &message(json!(2)))
            .await
            .expect("second save");

        let loaded = store.get_artifact(run, &id).await.expect("get");
        assert_eq!(loaded.content, json!(2));
        assert_eq!(store.list_artifacts(run).await.expect("list").len(), 1);
    }

    #[tokio::test]
    async fn test_delete_missing_is_noop() {
        let store = MemoryStore::new();
        store
            .delete_artifact(RunId::new(), &artifact("ghost"))
            .await
            .expect("delete");
    }

    #[tokio::test]
    async fn test_clear_preserves_system_data() {
        let store = MemoryStore::new();
        let run = RunId::new();
        let meta = RunMetadata::started(run, "audit", Timestamp::UNIX_EPOCH);

        store.save_run_metadata(run, &meta).await.expect("meta");
        store
            .save_artifact(run, &artifact("a"), &message(json!(null)))
            .await
            .expect("save");

        store.clear_artifacts(run).await.expect("clear");
        store.clear_artifacts(run).await.expect("clear twice");

        assert!(store.list_artifacts(run).await.expect("list").is_empty());
        assert_eq!(store.load_run_metadata(run).await.expect("meta"), meta);
    }

    #[tokio::test]
    async fn test_state_roundtrip() {
        let store = MemoryStore::new();
        let run = RunId::new();
        let mut state = ExecutionState::pending([artifact("a")], Timestamp::UNIX_EPOCH);
        state.record(artifact("a"), NodeStatus::Success, Timestamp::UNIX_EPOCH);

        store.save_execution_state(run, &state).await.expect("save");
        assert_eq!(store.load_execution_state(run).await.expect("load"), state);
    }

    #[tokio::test]
    async fn test_list_runs() {
        let store = MemoryStore::new();
        assert!(store.list_runs().await.expect("list").is_empty());

        let run_a = RunId::new();
        let run_b = RunId::new();
        let meta = RunMetadata::started(run_a, "a", Timestamp::UNIX_EPOCH);
        store.save_run_metadata(run_a, &meta).await.expect("meta");
        store
            .save_artifact(run_b, &artifact("x"), &message(json!(1)))
            .await
            .expect("save");

        let mut runs = store.list_runs().await.expect("list");
        runs.sort();
        let mut expected = vec![run_a, run_b];
        expected.sort();
        assert_eq!(runs, expected);
    }

    #[tokio::test]
    async fn test_metadata_final_status() {
        let store = MemoryStore::new();
        let run = RunId::new();
        let mut meta = RunMetadata::started(run, "audit", Timestamp::UNIX_EPOCH);
        store.save_run_metadata(run, &meta).await.expect("save");

        meta.finish(RunStatus::Partial, Timestamp::UNIX_EPOCH);
        store.save_run_metadata(run, &meta).await.expect("update");

        let loaded = store.load_run_metadata(run).await.expect("load");
        assert_eq!(loaded.status, RunStatus::Partial);
    }
}
