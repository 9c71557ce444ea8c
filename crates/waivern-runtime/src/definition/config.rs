//! Runbook execution configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default number of artifacts produced concurrently.
pub const DEFAULT_MAX_CONCURRENCY: usize = 10;

/// Execution configuration of a runbook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RunbookConfig {
    /// Wall-clock deadline for the whole run, in seconds.
    pub timeout_seconds: Option<u64>,
    /// Budget ceiling accumulated by an external cost collaborator.
    pub cost_limit: Option<f64>,
    /// Maximum number of artifacts produced concurrently.
    pub max_concurrency: usize,
    /// Directories searched, in order, for child runbooks that are not
    /// found relative to the including file.
    pub template_paths: Vec<PathBuf>,
}

impl Default for RunbookConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: None,
            cost_limit: None,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            template_paths: Vec::new(),
        }
    }
}
