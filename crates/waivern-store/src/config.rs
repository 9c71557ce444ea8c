//! Store configuration types.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{ArtifactStore, FilesystemStore, MemoryStore, StoreError, StoreResult};

/// Environment variable selecting the store backend (`memory` | `filesystem`).
pub const ENV_STORE_TYPE: &str = "WAIVERN_STORE_TYPE";

/// Environment variable overriding the filesystem store base path.
pub const ENV_STORE_PATH: &str = "WAIVERN_STORE_PATH";

/// Default base path of the filesystem backend.
pub const DEFAULT_BASE_PATH: &str = ".waivern";

/// Store backend configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum StoreConfig {
    /// In-memory store, intended for tests.
    Memory,
    /// Filesystem store rooted at a base directory.
    Filesystem(FilesystemConfig),
}

/// Filesystem backend configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilesystemConfig {
    /// Base directory under which runs are stored.
    #[serde(default = "FilesystemConfig::default_base_path")]
    pub base_path: PathBuf,
}

impl FilesystemConfig {
    fn default_base_path() -> PathBuf {
        PathBuf::from(DEFAULT_BASE_PATH)
    }
}

impl Default for FilesystemConfig {
    fn default() -> Self {
        Self {
            base_path: Self::default_base_path(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::Filesystem(FilesystemConfig::default())
    }
}

impl StoreConfig {
    /// Returns the backend name as a static string.
    pub fn backend_name(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Filesystem(_) => "filesystem",
        }
    }

    /// Builds a configuration from a backend name and optional base path.
    ///
    /// This is the shape the CLI's `--store-type`/`--store-path` flags and
    /// the `WAIVERN_STORE_TYPE`/`WAIVERN_STORE_PATH` environment variables
    /// produce.
    pub fn from_parts(backend: &str, base_path: Option<PathBuf>) -> StoreResult<Self> {
        match backend {
            "memory" => Ok(Self::Memory),
            "filesystem" => Ok(Self::Filesystem(FilesystemConfig {
                base_path: base_path.unwrap_or_else(FilesystemConfig::default_base_path),
            })),
            other => Err(StoreError::init(format!(
                "unknown store type `{other}`, expected `memory` or `filesystem`"
            ))),
        }
    }

    /// Builds the configured store.
    pub fn build(&self) -> Arc<dyn ArtifactStore> {
        match self {
            Self::Memory => Arc::new(MemoryStore::new()),
            Self::Filesystem(cfg) => Arc::new(FilesystemStore::new(cfg.base_path.clone())),
        }
    }
}
