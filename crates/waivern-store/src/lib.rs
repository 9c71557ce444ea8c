#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

mod config;
mod error;
mod filesystem;
mod memory;

#[doc(hidden)]
pub mod prelude;

use async_trait::async_trait;
pub use config::{ENV_STORE_PATH, ENV_STORE_TYPE, DEFAULT_BASE_PATH, FilesystemConfig, StoreConfig};
pub use error::{StoreError, StoreResult};
pub use filesystem::FilesystemStore;
pub use memory::MemoryStore;
use waivern_core::{ArtifactId, ExecutionState, Message, RunId, RunMetadata};

/// Tracing target for store operations.
pub const TRACING_TARGET: &str = "waivern_store";

/// Run-scoped persistence for artifacts, execution state, and run metadata.
///
/// Every operation is keyed by the caller-supplied [`RunId`]; the store
/// itself is stateless with respect to the current run. Implementations
/// must tolerate concurrent calls from cooperative tasks within a single
/// run (a single-writer-per-run discipline is assumed across runs).
///
/// Artifact keys are [`ArtifactId`]s, which are validated at construction
/// and deserialization to exclude absolute paths and `..` segments, so a
/// well-typed key can never escape the run's directory.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Saves an artifact, replacing any previous message under the same id.
    async fn save_artifact(
        &self,
        run_id: RunId,
        id: &ArtifactId,
        message: &Message,
    ) -> StoreResult<()>;

    /// Loads an artifact.
    ///
    /// Fails with [`StoreError::ArtifactNotFound`] when absent.
    async fn get_artifact(&self, run_id: RunId, id: &ArtifactId) -> StoreResult<Message>;

    /// Returns whether an artifact exists.
    async fn artifact_exists(&self, run_id: RunId, id: &ArtifactId) -> StoreResult<bool>;

    /// Deletes an artifact. Deleting a missing artifact is a no-op.
    async fn delete_artifact(&self, run_id: RunId, id: &ArtifactId) -> StoreResult<()>;

    /// Lists the ids of all artifacts saved under a run. Order unspecified.
    async fn list_artifacts(&self, run_id: RunId) -> StoreResult<Vec<ArtifactId>>;

    /// Removes every artifact of a run, preserving system metadata.
    async fn clear_artifacts(&self, run_id: RunId) -> StoreResult<()>;

    /// Saves the execution state snapshot for a run.
    async fn save_execution_state(&self, run_id: RunId, state: &ExecutionState) -> StoreResult<()>;

    /// Loads the execution state snapshot for a run.
    ///
    /// Fails with [`StoreError::RunNotFound`] when absent.
    async fn load_execution_state(&self, run_id: RunId) -> StoreResult<ExecutionState>;

    /// Saves the metadata for a run.
    async fn save_run_metadata(&self, run_id: RunId, metadata: &RunMetadata) -> StoreResult<()>;

    /// Loads the metadata for a run.
    ///
    /// Fails with [`StoreError::RunNotFound`] when absent.
    async fn load_run_metadata(&self, run_id: RunId) -> StoreResult<RunMetadata>;

    /// Enumerates every run the store knows about.
    async fn list_runs(&self) -> StoreResult<Vec<RunId>>;
}
