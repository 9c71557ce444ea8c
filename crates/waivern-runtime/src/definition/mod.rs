//! Runbook definition types.
//!
//! This module contains the serializable representation of a runbook: the
//! YAML document a pipeline author writes. Definitions are parsed once per
//! run and handed to the [`Planner`](crate::plan::Planner), which flattens
//! child runbooks and compiles the result into an executable plan.
//!
//! Unknown keys are rejected at every level so typos fail loudly at parse
//! time instead of silently changing behaviour.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use waivern_core::ArtifactId;

mod artifact;
mod config;
mod io;

pub use artifact::{
    ArtifactDefinition, ChildRunbookDef, InputRefs, MergeStrategy, ProcessDef, Production,
    Properties, ReuseDef, SourceDef,
};
pub use config::{DEFAULT_MAX_CONCURRENCY, RunbookConfig};
pub use io::InputDeclaration;

use crate::error::{PlanError, PlanResult};

/// A declarative pipeline description.
///
/// A runbook with a non-empty `inputs` mapping is a *child* runbook: it
/// declares the external data it expects and can only be executed by being
/// included from a parent through a `child_runbook` artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Runbook {
    /// Human-readable name of the pipeline.
    pub name: String,
    /// What the pipeline does.
    pub description: String,
    /// Contact for questions about the pipeline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
    /// Execution configuration.
    #[serde(default)]
    pub config: RunbookConfig,
    /// Declared external inputs; present only on child runbooks.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub inputs: BTreeMap<String, InputDeclaration>,
    /// Declared outputs: visible name to internal artifact id.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, ArtifactId>,
    /// The artifacts this runbook produces.
    pub artifacts: BTreeMap<ArtifactId, ArtifactDefinition>,
}

impl Runbook {
    /// Parses a runbook from YAML text.
    pub fn parse_str(yaml: &str) -> PlanResult<Self> {
        serde_yaml::from_str(yaml).map_err(|e| PlanError::Parse {
            path: None,
            message: e.to_string(),
        })
    }

    /// Loads and parses a runbook file.
    pub async fn load(path: &Path) -> PlanResult<Self> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| PlanError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        serde_yaml::from_str(&text).map_err(|e| PlanError::Parse {
            path: Some(path.to_path_buf()),
            message: e.to_string(),
        })
    }

    /// Returns whether this runbook declares external inputs.
    pub fn is_child(&self) -> bool {
        !self.inputs.is_empty()
    }

    /// Validates the structural invariants that hold for any runbook.
    ///
    /// Checks each artifact for exactly one production method, forbids
    /// `source` artifacts in runbooks that declare inputs, and requires
    /// every `outputs` entry to name an existing artifact.
    pub fn validate(&self) -> PlanResult<()> {
        for (id, definition) in &self.artifacts {
            let production = definition.production().map_err(|message| {
                PlanError::InvalidArtifact {
                    artifact: id.clone(),
                    message,
                }
            })?;

            if self.is_child() && matches!(production, Production::Source(_)) {
                return Err(PlanError::InvalidArtifact {
                    artifact: id.clone(),
                    message: format!(
                        "runbook `{}` declares inputs and must not contain source artifacts",
                        self.name
                    ),
                });
            }
        }

        for (output, artifact) in &self.outputs {
            if !self.artifacts.contains_key(artifact) {
                return Err(PlanError::Parse {
                    path: None,
                    message: format!(
                        "output `{output}` names unknown artifact `{artifact}`"
                    ),
                });
            }
        }

        Ok(())
    }
}
