//! Filesystem store backend.
//!
//! Runs are laid out as:
//!
//! ```text
//! <base>/runs/<run_id>/
//!   _system/
//!     run.json      // run metadata
//!     state.json    // execution state snapshot
//!   artifacts/
//!     <id>.json     // one message per artifact; nested dirs allowed
//! ```
//!
//! Hierarchical artifact ids create nested directories under `artifacts/`.
//! Individual writes go through a temp file followed by a rename, so a
//! crash can never leave a partially-written file readable.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;
use waivern_core::{ArtifactId, ExecutionState, Message, RunId, RunMetadata};

use crate::{ArtifactStore, StoreError, StoreResult, TRACING_TARGET};

const RUNS_DIR: &str = "runs";
const SYSTEM_DIR: &str = "_system";
const ARTIFACTS_DIR: &str = "artifacts";
const METADATA_FILE: &str = "run.json";
const STATE_FILE: &str = "state.json";

/// Filesystem [`ArtifactStore`] backend.
///
/// Artifact keys are typed [`ArtifactId`]s, whose construction already
/// rejects absolute paths and `..` segments, so joining them under the run
/// directory cannot escape it. Run directories are named by the run's UUID.
#[derive(Debug, Clone)]
pub struct FilesystemStore {
    base: PathBuf,
}

impl FilesystemStore {
    /// Creates a store rooted at the given base directory.
    ///
    /// The directory is created lazily on first write.
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// Returns the base directory of this store.
    pub fn base(&self) -> &Path {
        &self.base
    }

    fn run_dir(&self, run_id: RunId) -> PathBuf {
        self.base.join(RUNS_DIR).join(run_id.to_string())
    }

    fn artifacts_dir(&self, run_id: RunId) -> PathBuf {
        self.run_dir(run_id).join(ARTIFACTS_DIR)
    }

    fn artifact_path(&self, run_id: RunId, id: &ArtifactId) -> PathBuf {
        let mut path = self.artifacts_dir(run_id);
        let mut segments = id.segments().peekable();
        while let Some(segment) = segments.next() {
            if segments.peek().is_some() {
                path.push(segment);
            } else {
                // Appended rather than set_extension so ids whose last
                // segment contains a dot keep their full name.
                path.push(format!("{segment}.json"));
            }
        }
        path
    }

    fn system_path(&self, run_id: RunId, file: &str) -> PathBuf {
        self.run_dir(run_id).join(SYSTEM_DIR).join(file)
    }

    /// Serializes a value and writes it atomically (temp file + rename).
    async fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> StoreResult<()> {
        let parent = path
            .parent()
            .ok_or_else(|| StoreError::write(format!("path {} has no parent", path.display())))?;
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| StoreError::write(format!("creating {}: {e}", parent.display())))?;

        let data = serde_json::to_vec_pretty(value)?;
        let tmp = parent.join(format!(".{}.tmp", Uuid::new_v4().simple()));

        tokio::fs::write(&tmp, &data)
            .await
            .map_err(|e| StoreError::write(format!("writing {}: {e}", tmp.display())))?;
        if let Err(e) = tokio::fs::rename(&tmp, path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(StoreError::write(format!(
                "renaming into {}: {e}",
                path.display()
            )));
        }

        Ok(())
    }

    /// Reads and deserializes a JSON file, mapping a missing file to `None`.
    async fn read_json<T: DeserializeOwned>(&self, path: &Path) -> StoreResult<Option<T>> {
        match tokio::fs::read(path).await {
            Ok(data) => Ok(Some(serde_json::from_slice(&data)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::read(format!("reading {}: {e}", path.display()))),
        }
    }

    /// Walks the artifacts directory collecting `.json` files as ids.
    async fn collect_artifact_ids(&self, run_id: RunId) -> StoreResult<Vec<ArtifactId>> {
        let root = self.artifacts_dir(run_id);
        let mut ids = Vec::new();
        let mut stack = vec![root.clone()];

        while let Some(dir) = stack.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(StoreError::list(format!("reading {}: {e}", dir.display())));
                }
            };

            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| StoreError::list(format!("reading {}: {e}", dir.display())))?
            {
                let path = entry.path();
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| StoreError::list(format!("stat {}: {e}", path.display())))?;

                if file_type.is_dir() {
                    stack.push(path);
                } else {
                    let relative = path
                        .strip_prefix(&root)
                        .map_err(|e| StoreError::list(e.to_string()))?
                        .to_string_lossy()
                        .replace('\\', "/");
                    if let Some(stem) = relative.strip_suffix(".json")
                        && let Ok(id) = stem.parse()
                    {
                        ids.push(id);
                    }
                }
            }
        }

        Ok(ids)
    }
}

#[async_trait]
impl ArtifactStore for FilesystemStore {
    async fn save_artifact(
        &self,
        run_id: RunId,
        id: &ArtifactId,
        message: &Message,
    ) -> StoreResult<()> {
        let path = self.artifact_path(run_id, id);
        self.write_json(&path, message).await?;

        tracing::debug!(
            target: TRACING_TARGET,
            run_id = %run_id,
            artifact_id = %id,
            path = %path.display(),
            "Artifact saved"
        );

        Ok(())
    }

    async fn get_artifact(&self, run_id: RunId, id: &ArtifactId) -> StoreResult<Message> {
        let path = self.artifact_path(run_id, id);
        self.read_json(&path)
            .await?
            .ok_or_else(|| StoreError::artifact_not_found(run_id, id.clone()))
    }

    async fn artifact_exists(&self, run_id: RunId, id: &ArtifactId) -> StoreResult<bool> {
        let path = self.artifact_path(run_id, id);
        match tokio::fs::try_exists(&path).await {
            Ok(exists) => Ok(exists),
            Err(e) => Err(StoreError::read(format!("stat {}: {e}", path.display()))),
        }
    }

    async fn delete_artifact(&self, run_id: RunId, id: &ArtifactId) -> StoreResult<()> {
        let path = self.artifact_path(run_id, id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!(
                    target: TRACING_TARGET,
                    run_id = %run_id,
                    artifact_id = %id,
                    "Artifact deleted"
                );
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::delete(format!(
                "removing {}: {e}",
                path.display()
            ))),
        }
    }

    async fn list_artifacts(&self, run_id: RunId) -> StoreResult<Vec<ArtifactId>> {
        self.collect_artifact_ids(run_id).await
    }

    async fn clear_artifacts(&self, run_id: RunId) -> StoreResult<()> {
        let dir = self.artifacts_dir(run_id);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {
                tracing::debug!(
                    target: TRACING_TARGET,
                    run_id = %run_id,
                    "Artifacts cleared"
                );
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::delete(format!(
                "removing {}: {e}",
                dir.display()
            ))),
        }
    }

    async fn save_execution_state(&self, run_id: RunId, state: &ExecutionState) -> StoreResult<()> {
        self.write_json(&self.system_path(run_id, STATE_FILE), state)
            .await
    }

    async fn load_execution_state(&self, run_id: RunId) -> StoreResult<ExecutionState> {
        self.read_json(&self.system_path(run_id, STATE_FILE))
            .await?
            .ok_or(StoreError::RunNotFound(run_id))
    }

    async fn save_run_metadata(&self, run_id: RunId, metadata: &RunMetadata) -> StoreResult<()> {
        self.write_json(&self.system_path(run_id, METADATA_FILE), metadata)
            .await
    }

    async fn load_run_metadata(&self, run_id: RunId) -> StoreResult<RunMetadata> {
        self.read_json(&self.system_path(run_id, METADATA_FILE))
            .await?
            .ok_or(StoreError::RunNotFound(run_id))
    }

    async fn list_runs(&self) -> StoreResult<Vec<RunId>> {
        let dir = self.base.join(RUNS_DIR);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(StoreError::list(format!("reading {}: {e}", dir.display())));
            }
        };

        let mut runs = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::list(format!("reading {}: {e}", dir.display())))?
        {
            if let Some(name) = entry.file_name().to_str()
                && let Ok(run_id) = name.parse()
            {
                runs.push(run_id);
            }
        }

        Ok(runs)
    }
}

#[cfg(test)]
mod tests {
    use jiff::Timestamp;
    use serde_json::json;
    use waivern_core::ExecutionStatus;

    use super::*;

    fn artifact(id: &str) -> ArtifactId {
        id.parse().expect("valid id")
    }

    fn message(content: serde_json::Value) -> Message {
        Message::new("finding/1.0.0".parse().expect("schema"), content)
            .with_status(ExecutionStatus::Success)
    }

    fn store() -> (tempfile::TempDir, FilesystemStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FilesystemStore::new(dir.path());
        (dir, store)
    }

    #[tokio::test]
    async fn test_artifact_roundtrip() {
        let (_dir, store) = store();
        let run = RunId::new();
        let id = artifact("db_schema");
        let msg = message(json!({"tables": ["users", "orders"]}));

        store.save_artifact(run, &id, &msg).await.expect("save");
        assert!(store.artifact_exists(run, &id).await.expect("exists"));
        assert_eq!(store.get_artifact(run, &id).await.expect("get"), msg);
    }

    #[tokio::test]
    async fn test_hierarchical_id_creates_nested_dirs() {
        let (dir, store) = store();
        let run = RunId::new();
        let id = artifact("analysis/personal_data/findings");

        store
            .save_artifact(run, &id, &message(json!([])))
            .await
            .expect("save");

        let expected = dir
            .path()
            .join("runs")
            .join(run.to_string())
            .join("artifacts/analysis/personal_data/findings.json");
        assert!(expected.exists());

        let listed = store.list_artifacts(run).await.expect("list");
        assert_eq!(listed, vec![id]);
    }

    #[tokio::test]
    async fn test_layout_matches_documented_shape() {
        let (dir, store) = store();
        let run = RunId::new();
        let meta = RunMetadata::started(run, "audit", Timestamp::UNIX_EPOCH);
        let state = ExecutionState::pending([artifact("a")], Timestamp::UNIX_EPOCH);

        store.save_run_metadata(run, &meta).await.expect("meta");
        store.save_execution_state(run, &state).await.expect("state");
        store
            .save_artifact(run, &artifact("a"), &message(json!(1)))
            .await
            .expect("artifact");

        let run_dir = dir.path().join("runs").join(run.to_string());
        assert!(run_dir.join("_system/run.json").exists());
        assert!(run_dir.join("_system/state.json").exists());
        assert!(run_dir.join("artifacts/a.json").exists());
    }

    #[tokio::test]
    async fn test_clear_artifacts_preserves_system() {
        let (_dir, store) = store();
        let run = RunId::new();
        let meta = RunMetadata::started(run, "audit", Timestamp::UNIX_EPOCH);

        store.save_run_metadata(run, &meta).await.expect("meta");
        store
            .save_artifact(run, &artifact("a/b"), &message(json!(1)))
            .await
            .expect("artifact");

        store.clear_artifacts(run).await.expect("clear");
        store.clear_artifacts(run).await.expect("clear is idempotent");

        assert!(store.list_artifacts(run).await.expect("list").is_empty());
        assert_eq!(store.load_run_metadata(run).await.expect("meta"), meta);
    }

    #[tokio::test]
    async fn test_missing_artifact_and_run() {
        let (_dir, store) = store();
        let run = RunId::new();

        let err = store.get_artifact(run, &artifact("nope")).await.unwrap_err();
        assert!(matches!(err, StoreError::ArtifactNotFound { .. }));

        let err = store.load_run_metadata(run).await.unwrap_err();
        assert!(matches!(err, StoreError::RunNotFound(_)));

        store
            .delete_artifact(run, &artifact("nope"))
            .await
            .expect("delete missing is a no-op");
    }

    #[tokio::test]
    async fn test_list_runs() {
        let (_dir, store) = store();
        assert!(store.list_runs().await.expect("empty").is_empty());

        let run_a = RunId::new();
        let run_b = RunId::new();
        store
            .save_run_metadata(run_a, &RunMetadata::started(run_a, "a", Timestamp::UNIX_EPOCH))
            .await
            .expect("meta a");
        store
            .save_artifact(run_b, &artifact("x"), &message(json!(null)))
            .await
            .expect("artifact b");

        let mut runs = store.list_runs().await.expect("list");
        runs.sort();
        let mut expected = vec![run_a, run_b];
        expected.sort();
        assert_eq!(runs, expected);
    }

    #[tokio::test]
    async fn test_upsert_overwrites() {
        let (_dir, store) = store();
        let run = RunId::new();
        let id = artifact("a");

        store
            .save_artifact(run, &id, &message(json!({"v": 1})))
            .await
            .expect("save");
        store
            .save_artifact(run, &id, &message(json!({"v": 2})))
            .await
            .expect("overwrite");

        let loaded = store.get_artifact(run, &id).await.expect("get");
        assert_eq!(loaded.content, json!({"v": 2}));
    }

    #[tokio::test]
    async fn test_no_temp_files_left_behind() {
        let (dir, store) = store();
        let run = RunId::new();
        store
            .save_artifact(run, &artifact("a"), &message(json!(1)))
            .await
            .expect("save");

        let artifacts_dir = dir
            .path()
            .join("runs")
            .join(run.to_string())
            .join("artifacts");
        let leftovers: Vec<_> = std::fs::read_dir(&artifacts_dir)
            .expect("read dir")
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
