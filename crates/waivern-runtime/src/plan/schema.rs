//! Plan-time schema resolution and compatibility checking.

use std::collections::BTreeMap;

use waivern_core::{ArtifactId, SchemaId};
use waivern_store::ArtifactStore;

use crate::definition::{
    ArtifactDefinition, MergeStrategy, ProcessDef, Production, Runbook, SourceDef,
};
use crate::error::{PlanError, PlanResult};
use crate::plan::flatten::ChildInputConstraint;
use crate::producer::{ProducerDescriptor, ProducerKind, ProducerRegistry};

/// Input and output schemas resolved for one artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSchemas {
    /// Schemas of the artifact's inputs, in declaration order; empty for
    /// `source` and `reuse` artifacts.
    pub inputs: Vec<SchemaId>,
    /// The schema this artifact produces.
    pub output: SchemaId,
}

/// Resolves output schemas for every artifact and verifies each edge.
///
/// `resolved_inputs` maps each processing artifact to its alias-resolved
/// input ids, in declaration order.
pub(crate) async fn resolve_schemas(
    runbook: &Runbook,
    resolved_inputs: &BTreeMap<ArtifactId, Vec<ArtifactId>>,
    constraints: &[ChildInputConstraint],
    registry: &ProducerRegistry,
    store: &dyn ArtifactStore,
) -> PlanResult<BTreeMap<ArtifactId, ResolvedSchemas>> {
    let mut outputs: BTreeMap<ArtifactId, SchemaId> = BTreeMap::new();

    // First pass: the schema every node produces.
    for (id, definition) in &runbook.artifacts {
        let output = match production(id, definition)? {
            Production::Source(source) => {
                source_output_schema(id, definition, source, registry)?
            }
            Production::Process { process, .. } => {
                process_output_schema(id, definition, process, registry)?
            }
            Production::Reuse(reuse) => {
                match store.get_artifact(reuse.from_run, &reuse.artifact).await {
                    Ok(message) => message.schema,
                    Err(error) if error.is_not_found() => {
                        return Err(PlanError::ReuseTargetMissing {
                            from_run: reuse.from_run,
                            artifact: reuse.artifact.clone(),
                        });
                    }
                    Err(error) => return Err(error.into()),
                }
            }
            Production::ChildRunbook(_) => {
                unreachable!("child runbooks are flattened before schema resolution")
            }
        };
        outputs.insert(id.clone(), output);
    }

    // Second pass: every edge pairs compatible schemas.
    let mut resolved = BTreeMap::new();
    for (id, definition) in &runbook.artifacts {
        let inputs = match production(id, definition)? {
            Production::Process { process, merge, .. } => {
                let input_ids = resolved_inputs
                    .get(id)
                    .expect("resolved inputs are recorded for every processing artifact");
                let offered: Vec<SchemaId> = input_ids
                    .iter()
                    .map(|input| outputs[input].clone())
                    .collect();
                check_edge(id, input_ids, &offered, merge, process, registry)?;
                offered
            }
            _ => Vec::new(),
        };

        resolved.insert(
            id.clone(),
            ResolvedSchemas {
                inputs,
                output: outputs[id].clone(),
            },
        );
    }

    // Child input declarations constrain the mapped parent artifacts.
    for constraint in constraints {
        let found = outputs.get(&constraint.artifact).ok_or_else(|| {
            PlanError::UnknownArtifact {
                consumer: constraint.artifact.clone(),
                input: constraint.artifact.clone(),
            }
        })?;
        if *found != constraint.schema {
            return Err(PlanError::ChildInputSchemaIncompatible {
                child: constraint.child.clone(),
                input: constraint.input.clone(),
                artifact: constraint.artifact.clone(),
                expected: constraint.schema.clone(),
                found: found.clone(),
            });
        }
    }

    Ok(resolved)
}

fn production<'a>(
    id: &ArtifactId,
    definition: &'a ArtifactDefinition,
) -> PlanResult<Production<'a>> {
    definition
        .production()
        .map_err(|message| PlanError::InvalidArtifact {
            artifact: id.clone(),
            message,
        })
}

fn source_output_schema(
    id: &ArtifactId,
    definition: &ArtifactDefinition,
    source: &SourceDef,
    registry: &ProducerRegistry,
) -> PlanResult<SchemaId> {
    let descriptor = registry
        .descriptor(ProducerKind::Connector, &source.connector)
        .ok_or_else(|| PlanError::ProducerNotFound {
            kind: ProducerKind::Connector,
            type_name: source.connector.clone(),
        })?;
    pick_output_schema(id, definition, descriptor)
}

fn process_output_schema(
    id: &ArtifactId,
    definition: &ArtifactDefinition,
    process: &ProcessDef,
    registry: &ProducerRegistry,
) -> PlanResult<SchemaId> {
    let descriptor = registry
        .descriptor(ProducerKind::Processor, &process.processor)
        .ok_or_else(|| PlanError::ProducerNotFound {
            kind: ProducerKind::Processor,
            type_name: process.processor.clone(),
        })?;
    pick_output_schema(id, definition, descriptor)
}

/// Picks the single declared output schema, or the one the artifact's
/// `output_schema` field names when a producer declares several.
fn pick_output_schema(
    id: &ArtifactId,
    definition: &ArtifactDefinition,
    descriptor: &ProducerDescriptor,
) -> PlanResult<SchemaId> {
    let declared = &descriptor.output_schemas;

    match &definition.output_schema {
        Some(chosen) => {
            if declared.contains(chosen) {
                Ok(chosen.clone())
            } else {
                Err(PlanError::OutputSchemaUnresolved {
                    artifact: id.clone(),
                    message: format!("`{chosen}` is not declared by `{}`", descriptor.type_name),
                    declared: declared.clone(),
                })
            }
        }
        None => match declared.as_slice() {
            [only] => Ok(only.clone()),
            [] => Err(PlanError::OutputSchemaUnresolved {
                artifact: id.clone(),
                message: format!("`{}` declares no output schemas", descriptor.type_name),
                declared: Vec::new(),
            }),
            _ => Err(PlanError::OutputSchemaUnresolved {
                artifact: id.clone(),
                message: format!(
                    "`{}` declares several output schemas; set output_schema to pick one",
                    descriptor.type_name
                ),
                declared: declared.clone(),
            }),
        },
    }
}

/// Verifies a processing node against the schemas its inputs offer.
///
/// Two fan-in shapes exist: `merge: concatenate` requires every input to
/// share one schema and the processor to accept that single schema, while
/// plain multi-input processing matches the offered schemas against the
/// processor's declared combinations as an unordered multiset.
fn check_edge(
    consumer: &ArtifactId,
    input_ids: &[ArtifactId],
    offered: &[SchemaId],
    merge: Option<MergeStrategy>,
    process: &ProcessDef,
    registry: &ProducerRegistry,
) -> PlanResult<()> {
    let descriptor = registry
        .descriptor(ProducerKind::Processor, &process.processor)
        .ok_or_else(|| PlanError::ProducerNotFound {
            kind: ProducerKind::Processor,
            type_name: process.processor.clone(),
        })?;
    let capability = &descriptor.input_schemas;

    let incompatible = |accepted: String| PlanError::SchemaIncompatible {
        consumer: consumer.clone(),
        producers: input_ids.to_vec(),
        offered: offered.to_vec(),
        accepted,
    };

    match merge {
        Some(MergeStrategy::Concatenate) => {
            let Some((first, rest)) = offered.split_first() else {
                return Err(incompatible(capability.describe()));
            };
            if rest.iter().any(|schema| schema != first) {
                return Err(incompatible(format!(
                    "merge: concatenate requires one shared schema; {}",
                    capability.describe()
                )));
            }
            if !capability.accepts(std::slice::from_ref(first)) {
                return Err(incompatible(capability.describe()));
            }
        }
        None => {
            if !capability.accepts(offered) {
                return Err(incompatible(capability.describe()));
            }
        }
    }

    Ok(())
}
