//! Artifact definition types.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use waivern_core::{ArtifactId, RunId, SchemaId};

/// Arbitrary key/value properties handed to a producer.
pub type Properties = serde_json::Map<String, serde_json::Value>;

/// Definition of a single artifact and how it is produced.
///
/// Exactly one production method must be set: `source`, `inputs` +
/// `process`, `reuse`, or `child_runbook`. The [`production`] accessor
/// enforces this; the serde shape keeps the fields optional so violations
/// produce a precise error instead of a generic parse failure.
///
/// [`production`]: ArtifactDefinition::production
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields, default)]
pub struct ArtifactDefinition {
    /// Connector producing this artifact from the outside world.
    pub source: Option<SourceDef>,
    /// Artifacts consumed by `process`.
    pub inputs: Option<InputRefs>,
    /// Processor transforming `inputs` into this artifact.
    pub process: Option<ProcessDef>,
    /// How same-schema fan-in inputs are combined before processing.
    pub merge: Option<MergeStrategy>,
    /// Copy of an artifact from a prior run.
    pub reuse: Option<ReuseDef>,
    /// Child runbook expanded in place of this artifact by the planner.
    pub child_runbook: Option<ChildRunbookDef>,
    /// Include the produced message in the exported run result.
    pub output: bool,
    /// On failure, skip dependents but let the run continue.
    pub optional: bool,
    /// Picks one of several output schemas a producer declares.
    pub output_schema: Option<SchemaId>,
}

/// The production method of an artifact, borrowed from its definition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Production<'a> {
    /// Produced by a connector.
    Source(&'a SourceDef),
    /// Produced by a processor over upstream artifacts.
    Process {
        /// Consumed artifacts, in order.
        inputs: &'a InputRefs,
        /// The processor to invoke.
        process: &'a ProcessDef,
        /// Fan-in merge strategy, if any.
        merge: Option<MergeStrategy>,
    },
    /// Copied from a prior run.
    Reuse(&'a ReuseDef),
    /// Expanded by the planner; never reaches the executor.
    ChildRunbook(&'a ChildRunbookDef),
}

impl ArtifactDefinition {
    /// Returns the production method, verifying that exactly one is set.
    ///
    /// A `child_runbook` artifact may additionally carry `inputs` naming the
    /// parent artifacts it pipes into the child; they must agree with the
    /// directive's `input_mapping` values.
    pub fn production(&self) -> Result<Production<'_>, String> {
        if let Some(child) = &self.child_runbook {
            if self.source.is_some() || self.process.is_some() || self.reuse.is_some() {
                return Err(
                    "child_runbook cannot be combined with source, process, or reuse".to_string(),
                );
            }
            if let Some(inputs) = &self.inputs {
                let mut listed: Vec<&ArtifactId> = inputs.iter().collect();
                let mut mapped: Vec<&ArtifactId> = child.input_mapping.values().collect();
                listed.sort();
                mapped.sort();
                if listed != mapped {
                    return Err(
                        "inputs of a child_runbook artifact must match its input_mapping values"
                            .to_string(),
                    );
                }
            }
            return Ok(Production::ChildRunbook(child));
        }

        match (&self.source, &self.inputs, &self.process, &self.reuse) {
            (Some(source), None, None, None) => {
                if self.merge.is_some() {
                    return Err("merge is only valid with inputs and process".to_string());
                }
                Ok(Production::Source(source))
            }
            (None, Some(inputs), Some(process), None) => Ok(Production::Process {
                inputs,
                process,
                merge: self.merge,
            }),
            (None, None, None, Some(reuse)) => {
                if self.merge.is_some() {
                    return Err("merge is only valid with inputs and process".to_string());
                }
                Ok(Production::Reuse(reuse))
            }
            (None, None, None, None) => Err(
                "no production method set; expected source, inputs+process, reuse, or child_runbook"
                    .to_string(),
            ),
            (None, Some(_), None, None) => {
                Err("inputs without a process; add a process block".to_string())
            }
            (None, None, Some(_), None) => {
                Err("process without inputs; add an inputs list".to_string())
            }
            _ => Err("more than one production method set".to_string()),
        }
    }
}

/// Connector reference: `{type, properties}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceDef {
    /// Registered connector type.
    #[serde(rename = "type")]
    pub connector: String,
    /// Connector-specific properties.
    #[serde(default)]
    pub properties: Properties,
}

/// Processor reference: `{type, properties}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProcessDef {
    /// Registered processor type.
    #[serde(rename = "type")]
    pub processor: String,
    /// Processor-specific properties.
    #[serde(default)]
    pub properties: Properties,
}

/// One artifact id or an ordered list of ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputRefs {
    /// A single input.
    One(ArtifactId),
    /// Several inputs, order preserved.
    Many(Vec<ArtifactId>),
}

impl InputRefs {
    /// Iterates the referenced ids in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &ArtifactId> {
        match self {
            Self::One(id) => std::slice::from_ref(id).iter(),
            Self::Many(ids) => ids.iter(),
        }
    }

    /// Returns the number of referenced ids.
    pub fn len(&self) -> usize {
        match self {
            Self::One(_) => 1,
            Self::Many(ids) => ids.len(),
        }
    }

    /// Returns whether the reference list is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rewrites every reference through the given mapping.
    pub fn rewrite(&mut self, mut rewrite: impl FnMut(&ArtifactId) -> ArtifactId) {
        match self {
            Self::One(id) => *id = rewrite(id),
            Self::Many(ids) => {
                for id in ids {
                    *id = rewrite(id);
                }
            }
        }
    }
}

/// Fan-in merge strategy for same-schema inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[derive(strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MergeStrategy {
    /// Concatenate the inputs' content sequences into one.
    Concatenate,
}

/// Reuse directive: copy an artifact from a prior run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReuseDef {
    /// The run to copy from.
    pub from_run: RunId,
    /// The artifact to copy.
    pub artifact: ArtifactId,
}

/// Child runbook directive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChildRunbookDef {
    /// Path of the child runbook, relative to the including file or a
    /// configured template directory.
    pub path: PathBuf,
    /// Child input name to parent artifact id.
    #[serde(default)]
    pub input_mapping: BTreeMap<String, ArtifactId>,
    /// Single exposed output: the declared child output published under
    /// this artifact's own id.
    #[serde(default)]
    pub output: Option<String>,
    /// Several exposed outputs: parent-visible name to declared child
    /// output name.
    #[serde(default)]
    pub output_mapping: Option<BTreeMap<String, String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact(yaml: &str) -> ArtifactDefinition {
        serde_yaml::from_str(yaml).expect("parse artifact")
    }

    #[test]
    fn test_source_production() {
        let def = artifact("source:\n  type: static\n");
        assert!(matches!(def.production(), Ok(Production::Source(_))));
    }

    #[test]
    fn test_process_production_single_input() {
        let def = artifact("inputs: a\nprocess:\n  type: passthrough\n");
        let Ok(Production::Process { inputs, .. }) = def.production() else {
            panic!("expected process production");
        };
        assert_eq!(inputs.len(), 1);
    }

    #[test]
    fn test_process_production_many_inputs_with_merge() {
        let def = artifact("inputs: [a, b]\nprocess:\n  type: passthrough\nmerge: concatenate\n");
        let Ok(Production::Process { inputs, merge, .. }) = def.production() else {
            panic!("expected process production");
        };
        assert_eq!(inputs.len(), 2);
        assert_eq!(merge, Some(MergeStrategy::Concatenate));
    }

    #[test]
    fn test_unknown_merge_strategy_rejected() {
        let err = serde_yaml::from_str::<ArtifactDefinition>(
            "inputs: a\nprocess:\n  type: passthrough\nmerge: zip\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("unknown variant"));
    }

    #[test]
    fn test_no_production_method() {
        let def = artifact("output: true\n");
        assert!(def.production().is_err());
    }

    #[test]
    fn test_two_production_methods() {
        let def = artifact(
            "source:\n  type: static\nreuse:\n  from_run: 1f2a0d9c-9a5b-4a6e-8de4-64f0a2d1c0aa\n  artifact: x\n",
        );
        assert!(def.production().is_err());
    }

    #[test]
    fn test_inputs_without_process() {
        let def = artifact("inputs: [a]\n");
        assert!(def.production().unwrap_err().contains("process"));
    }

    #[test]
    fn test_child_runbook_with_matching_inputs() {
        let def = artifact(
            "child_runbook:\n  path: child.yaml\n  input_mapping:\n    source_data: db\n  output: findings\ninputs: db\n",
        );
        assert!(matches!(def.production(), Ok(Production::ChildRunbook(_))));
    }

    #[test]
    fn test_child_runbook_with_mismatched_inputs() {
        let def = artifact(
            "child_runbook:\n  path: child.yaml\n  input_mapping:\n    source_data: db\n  output: findings\ninputs: other\n",
        );
        assert!(def.production().is_err());
    }

    #[test]
    fn test_child_runbook_with_process_rejected() {
        let def = artifact(
            "child_runbook:\n  path: child.yaml\n  output: findings\nprocess:\n  type: passthrough\n",
        );
        assert!(def.production().is_err());
    }
}
