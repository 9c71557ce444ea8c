//! Store error types.

use thiserror::Error;
use waivern_core::{ArtifactId, RunId};

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Failed to initialize the store backend.
    #[error("store initialization failed: {0}")]
    Init(String),

    /// A named artifact is absent.
    #[error("artifact `{id}` not found in run {run_id}")]
    ArtifactNotFound {
        /// The run that was queried.
        run_id: RunId,
        /// The missing artifact.
        id: ArtifactId,
    },

    /// A run (or its state/metadata) is absent.
    #[error("run {0} not found")]
    RunNotFound(RunId),

    /// Read operation failed.
    #[error("read failed: {0}")]
    Read(String),

    /// Write operation failed.
    #[error("write failed: {0}")]
    Write(String),

    /// Delete operation failed.
    #[error("delete failed: {0}")]
    Delete(String),

    /// List operation failed.
    #[error("list failed: {0}")]
    List(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Creates a new initialization error.
    pub fn init(msg: impl Into<String>) -> Self {
        Self::Init(msg.into())
    }

    /// Creates a new artifact-not-found error.
    pub fn artifact_not_found(run_id: RunId, id: ArtifactId) -> Self {
        Self::ArtifactNotFound { run_id, id }
    }

    /// Creates a new read error.
    pub fn read(msg: impl Into<String>) -> Self {
        Self::Read(msg.into())
    }

    /// Creates a new write error.
    pub fn write(msg: impl Into<String>) -> Self {
        Self::Write(msg.into())
    }

    /// Creates a new delete error.
    pub fn delete(msg: impl Into<String>) -> Self {
        Self::Delete(msg.into())
    }

    /// Creates a new list error.
    pub fn list(msg: impl Into<String>) -> Self {
        Self::List(msg.into())
    }

    /// Returns whether this error reports a missing item rather than a
    /// backend failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ArtifactNotFound { .. } | Self::RunNotFound(_))
    }
}
