//! Run result types.

use std::collections::BTreeMap;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use waivern_core::{ArtifactId, Message, Origin, RunId, RunStatus};

/// Outcome of one artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactResult {
    /// The artifact's id in its namespaced form.
    pub artifact_id: ArtifactId,
    /// Whether production succeeded.
    pub success: bool,
    /// Failure description when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wall-clock production time in seconds.
    pub duration_seconds: f64,
    /// Whether the node was declared in the parent or a flattened child.
    pub origin: Origin,
    /// Parent-visible alias of a flattened child artifact.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// The produced message, attached only for successful artifacts marked
    /// `output: true`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
}

/// Machine-readable outcome of a whole run.
///
/// Every node of the plan appears in exactly one place: `artifacts` when it
/// ran (successfully or not), `skipped` when a failed or skipped
/// predecessor kept it from ever starting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    /// The run's identifier.
    pub run_id: RunId,
    /// When the run started.
    pub start_timestamp: Timestamp,
    /// Total wall-clock duration in seconds.
    pub total_duration_seconds: f64,
    /// Final status of the run.
    pub status: RunStatus,
    /// Per-artifact outcomes for every node that ran.
    pub artifacts: BTreeMap<ArtifactId, ArtifactResult>,
    /// Nodes that never ran because a predecessor failed or was skipped.
    pub skipped: Vec<ArtifactId>,
}

impl RunResult {
    /// Maps the run status onto the process exit code contract:
    /// 0 success, 1 partial (only optional failures), 2 failed or timed
    /// out. (Planning errors exit 3 and never produce a result.)
    pub fn exit_code(&self) -> i32 {
        match self.status {
            RunStatus::Success => 0,
            RunStatus::Partial => 1,
            RunStatus::Failed | RunStatus::Timeout => 2,
            // A result is only produced once the run is over.
            RunStatus::Running => 2,
        }
    }

    /// Iterates the results of failed artifacts.
    pub fn failures(&self) -> impl Iterator<Item = &ArtifactResult> {
        self.artifacts.values().filter(|result| !result.success)
    }
}
