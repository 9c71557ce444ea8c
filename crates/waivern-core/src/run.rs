//! Run identity, metadata, and execution state types.
//!
//! A run is one execution of a plan. Its identifier scopes every store
//! operation; its metadata and execution state are persisted alongside the
//! artifacts under `_system/` so runs can be inspected after the fact.

use std::collections::BTreeMap;
use std::str::FromStr;

use derive_more::{Debug, Display, From, Into};
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::artifact::ArtifactId;

/// Unique identifier for a single pipeline run.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[derive(Debug, Display, From, Into)]
#[debug("{_0}")]
#[display("{_0}")]
#[serde(transparent)]
pub struct RunId(Uuid);

impl RunId {
    /// Creates a new random run ID.
    #[inline]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a run ID from an existing UUID.
    #[inline]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[inline]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::from_str(s)?))
    }
}

impl AsRef<Uuid> for RunId {
    fn as_ref(&self) -> &Uuid {
        &self.0
    }
}

/// Terminal and non-terminal status of a whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RunStatus {
    /// The run is still executing.
    Running,
    /// Every non-optional artifact succeeded.
    Success,
    /// Only optional artifacts failed.
    Partial,
    /// At least one non-optional artifact failed.
    Failed,
    /// The run was cut short by its deadline.
    Timeout,
}

/// Status of a single node over its lifecycle.
///
/// Transitions: `pending → running → (success | failed)`, plus
/// `pending → skipped` when any predecessor failed or was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NodeStatus {
    /// Not yet scheduled.
    Pending,
    /// Currently producing.
    Running,
    /// Produced a message.
    Success,
    /// Producer raised or violated its schema.
    Failed,
    /// Never ran because a predecessor failed or was skipped.
    Skipped,
}

impl NodeStatus {
    /// Returns whether this status is terminal.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Skipped)
    }
}

/// Metadata persisted for every run under `_system/run.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    /// The run this metadata belongs to.
    pub run_id: RunId,
    /// Name of the runbook that was executed.
    pub runbook_name: String,
    /// When the run started.
    pub started_at: Timestamp,
    /// When the run finished, absent while running.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<Timestamp>,
    /// Current status of the run.
    pub status: RunStatus,
}

impl RunMetadata {
    /// Creates metadata for a freshly started run.
    pub fn started(run_id: RunId, runbook_name: impl Into<String>, started_at: Timestamp) -> Self {
        Self {
            run_id,
            runbook_name: runbook_name.into(),
            started_at,
            finished_at: None,
            status: RunStatus::Running,
        }
    }

    /// Marks the run finished with the given status.
    pub fn finish(&mut self, status: RunStatus, finished_at: Timestamp) {
        self.status = status;
        self.finished_at = Some(finished_at);
    }
}

/// Progress snapshot persisted under `_system/state.json`.
///
/// Written by the executor after every node finalisation, so a crashed or
/// cancelled run still leaves an inspectable trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionState {
    /// Status per node.
    pub nodes: BTreeMap<ArtifactId, NodeStatus>,
    /// When execution started.
    pub started_at: Timestamp,
    /// When this snapshot was taken.
    pub last_updated: Timestamp,
}

impl ExecutionState {
    /// Creates a snapshot with every node pending.
    pub fn pending(nodes: impl IntoIterator<Item = ArtifactId>, started_at: Timestamp) -> Self {
        Self {
            nodes: nodes.into_iter().map(|id| (id, NodeStatus::Pending)).collect(),
            started_at,
            last_updated: started_at,
        }
    }

    /// Records a node status change and bumps the snapshot timestamp.
    pub fn record(&mut self, id: ArtifactId, status: NodeStatus, at: Timestamp) {
        self.nodes.insert(id, status);
        self.last_updated = at;
    }

    /// Returns the number of nodes in a terminal status.
    pub fn terminal_count(&self) -> usize {
        self.nodes.values().filter(|s| s.is_terminal()).count()
    }
}
