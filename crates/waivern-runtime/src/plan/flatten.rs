//! Child-runbook flattening.
//!
//! A `child_runbook` artifact is expanded in place: the child's artifacts
//! are pulled into the parent under a unique namespace, its references to
//! declared inputs are rewritten to the parent artifacts named in
//! `input_mapping`, and the parent-visible output names are recorded as
//! aliases onto the namespaced ids. Expansion is iterative over a queue so
//! inclusion depth is bounded only by memory, and each branch carries the
//! chain of resolved paths it came through for cycle detection.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::{Component, Path, PathBuf};

use uuid::Uuid;
use waivern_core::{ArtifactId, SchemaId};

use crate::TRACING_TARGET;
use crate::definition::{ArtifactDefinition, ChildRunbookDef, Production, Runbook};
use crate::error::{PlanError, PlanResult};

/// The flattened runbook plus everything recorded along the way.
#[derive(Debug)]
pub struct FlattenOutcome {
    /// The runbook with every child expanded; artifacts are only `source`,
    /// `inputs`+`process`, or `reuse`.
    pub runbook: Runbook,
    /// Parent-visible name to namespaced child artifact id.
    pub aliases: BTreeMap<String, ArtifactId>,
    /// Namespaced child artifact id back to its parent-visible name.
    pub reversed_aliases: BTreeMap<ArtifactId, String>,
    /// Parent artifacts piped into a child input declared `sensitive`.
    pub sensitive_inputs: BTreeSet<ArtifactId>,
    /// Alias targets whose hosting artifact carried `output: true`.
    pub output_overrides: BTreeSet<ArtifactId>,
    /// Schema declarations on child inputs, checked once schemas resolve.
    pub schema_constraints: Vec<ChildInputConstraint>,
}

/// A child input's declared schema, to verify against the mapped artifact.
#[derive(Debug, Clone)]
pub struct ChildInputConstraint {
    /// Name of the child runbook declaring the input.
    pub child: String,
    /// The declared input name.
    pub input: String,
    /// Parent artifact mapped into the input.
    pub artifact: ArtifactId,
    /// Schema the declaration requires.
    pub schema: SchemaId,
}

/// A child-runbook directive waiting for expansion.
struct PendingChild {
    /// Artifact id hosting the directive (already namespaced for nested
    /// directives).
    host_id: ArtifactId,
    /// Whether the host artifact was marked `output: true`.
    host_output: bool,
    directive: ChildRunbookDef,
    /// Directory of the runbook file containing the directive.
    base_dir: PathBuf,
    /// Template directories of the containing runbook, already resolved.
    template_paths: Vec<PathBuf>,
    /// Canonical paths of the runbooks on this expansion branch.
    branch: Vec<PathBuf>,
}

/// Expands every child-runbook directive in `runbook`.
pub async fn flatten(mut runbook: Runbook, base_dir: &Path) -> PlanResult<FlattenOutcome> {
    let mut outcome = FlattenOutcome {
        runbook: Runbook {
            artifacts: BTreeMap::new(),
            ..runbook.clone()
        },
        aliases: BTreeMap::new(),
        reversed_aliases: BTreeMap::new(),
        sensitive_inputs: BTreeSet::new(),
        output_overrides: BTreeSet::new(),
        schema_constraints: Vec::new(),
    };

    let template_paths = resolve_template_dirs(&runbook, base_dir);
    let mut queue = VecDeque::new();

    for (id, definition) in std::mem::take(&mut runbook.artifacts) {
        queue_or_keep(
            &mut outcome.runbook.artifacts,
            &mut queue,
            id,
            definition,
            base_dir,
            &template_paths,
            &[],
        )?;
    }

    while let Some(pending) = queue.pop_front() {
        expand_child(pending, &mut outcome, &mut queue).await?;
    }

    collapse_alias_chains(&mut outcome);

    Ok(outcome)
}

/// Collapses alias chains left by nested inclusions.
///
/// A child exposing a grandchild's output records `analysis ->
/// middle__x__deep -> child__y__findings`; after collapsing, every alias
/// names the real node at the end of its chain, and the reversed map keeps
/// only the outermost (parent-visible) name per node.
fn collapse_alias_chains(outcome: &mut FlattenOutcome) {
    let originals = outcome.aliases.clone();

    for target in outcome.aliases.values_mut() {
        let mut hops = 0;
        while let Some(next) = originals.get(target.as_str()) {
            *target = next.clone();
            hops += 1;
            if hops > originals.len() {
                break;
            }
        }
    }

    let intermediate: BTreeSet<&str> = originals.values().map(|id| id.as_str()).collect();
    outcome.reversed_aliases = outcome
        .aliases
        .iter()
        .filter(|(name, _)| !intermediate.contains(name.as_str()))
        .map(|(name, target)| (target.clone(), name.clone()))
        .collect();
}

/// Enqueues a child-runbook artifact or keeps a plain one.
fn queue_or_keep(
    artifacts: &mut BTreeMap<ArtifactId, ArtifactDefinition>,
    queue: &mut VecDeque<PendingChild>,
    id: ArtifactId,
    definition: ArtifactDefinition,
    base_dir: &Path,
    template_paths: &[PathBuf],
    branch: &[PathBuf],
) -> PlanResult<()> {
    let is_child = matches!(
        definition
            .production()
            .map_err(|message| PlanError::InvalidArtifact {
                artifact: id.clone(),
                message,
            })?,
        Production::ChildRunbook(_)
    );

    if is_child {
        let directive = definition
            .child_runbook
            .expect("production() verified the directive is present");
        queue.push_back(PendingChild {
            host_id: id,
            host_output: definition.output,
            directive,
            base_dir: base_dir.to_path_buf(),
            template_paths: template_paths.to_vec(),
            branch: branch.to_vec(),
        });
    } else {
        artifacts.insert(id, definition);
    }

    Ok(())
}

/// Expands one pending directive into the outcome.
async fn expand_child(
    pending: PendingChild,
    outcome: &mut FlattenOutcome,
    queue: &mut VecDeque<PendingChild>,
) -> PlanResult<()> {
    let PendingChild {
        host_id,
        host_output,
        directive,
        base_dir,
        template_paths,
        branch,
    } = pending;

    let path = resolve_child_path(&host_id, &directive.path, &base_dir, &template_paths).await?;
    let canonical = tokio::fs::canonicalize(&path)
        .await
        .map_err(|e| PlanError::ChildRunbookInvalid {
            path: path.clone(),
            message: e.to_string(),
        })?;

    if branch.contains(&canonical) {
        let mut cycle = branch.clone();
        cycle.push(canonical);
        return Err(PlanError::CircularRunbook { cycle });
    }

    let child = load_child(&path).await?;
    validate_input_mapping(&child, &directive)?;

    let namespace = namespace_for(&child.name);

    tracing::debug!(
        target: TRACING_TARGET,
        child = %child.name,
        path = %path.display(),
        namespace = %namespace,
        "Expanding child runbook"
    );

    record_input_flags(&child, &directive, outcome);
    record_aliases(&host_id, host_output, &child, &directive, &namespace, outcome)?;

    let child_dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let child_templates = resolve_template_dirs(&child, &child_dir);
    let mut child_branch = branch;
    child_branch.push(canonical);

    for (id, mut definition) in child.artifacts.clone() {
        let namespaced = namespace_id(&namespace, &id);

        if let Some(inputs) = definition.inputs.as_mut() {
            let mut rewrite_error = None;
            inputs.rewrite(|reference| {
                match rewrite_reference(reference, &child, &directive, &namespace) {
                    Ok(rewritten) => rewritten,
                    Err(error) => {
                        rewrite_error.get_or_insert(error);
                        reference.clone()
                    }
                }
            });
            if let Some(error) = rewrite_error {
                return Err(error);
            }
        }

        if let Some(nested) = definition.child_runbook.as_mut() {
            for parent_ref in nested.input_mapping.values_mut() {
                *parent_ref = rewrite_reference(parent_ref, &child, &directive, &namespace)?;
            }
        }

        queue_or_keep(
            &mut outcome.runbook.artifacts,
            queue,
            namespaced,
            definition,
            &child_dir,
            &child_templates,
            &child_branch,
        )?;
    }

    Ok(())
}

/// Resolves a directive path against the including file, then the template
/// directories, first match wins.
async fn resolve_child_path(
    host_id: &ArtifactId,
    path: &Path,
    base_dir: &Path,
    template_paths: &[PathBuf],
) -> PlanResult<PathBuf> {
    if path.is_absolute()
        || path
            .components()
            .any(|component| matches!(component, Component::ParentDir))
    {
        return Err(PlanError::InvalidPath {
            artifact: host_id.clone(),
            path: path.to_path_buf(),
        });
    }

    let mut searched = Vec::with_capacity(1 + template_paths.len());
    searched.push(base_dir.to_path_buf());
    searched.extend(template_paths.iter().cloned());

    for dir in &searched {
        let candidate = dir.join(path);
        if tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
            return Ok(candidate);
        }
    }

    Err(PlanError::ChildRunbookNotFound {
        path: path.to_path_buf(),
        searched,
    })
}

/// Loads and shape-validates a child runbook.
async fn load_child(path: &Path) -> PlanResult<Runbook> {
    let child = match Runbook::load(path).await {
        Ok(child) => child,
        Err(PlanError::Parse { message, .. }) => {
            return Err(PlanError::ChildRunbookInvalid {
                path: path.to_path_buf(),
                message,
            });
        }
        Err(PlanError::Io { source, .. }) => {
            return Err(PlanError::ChildRunbookInvalid {
                path: path.to_path_buf(),
                message: source.to_string(),
            });
        }
        Err(other) => return Err(other),
    };

    if let Err(error) = child.validate() {
        return Err(PlanError::ChildRunbookInvalid {
            path: path.to_path_buf(),
            message: error.to_string(),
        });
    }

    Ok(child)
}

/// Checks the directive's `input_mapping` against the child's declarations.
fn validate_input_mapping(child: &Runbook, directive: &ChildRunbookDef) -> PlanResult<()> {
    for (input, declaration) in &child.inputs {
        if !declaration.optional && !directive.input_mapping.contains_key(input) {
            return Err(PlanError::MissingInputMapping {
                child: child.name.clone(),
                input: input.clone(),
            });
        }
    }

    for input in directive.input_mapping.keys() {
        if !child.inputs.contains_key(input) {
            return Err(PlanError::UnknownInputMapping {
                child: child.name.clone(),
                input: input.clone(),
            });
        }
    }

    Ok(())
}

/// Records `sensitive` flags and `input_schema` constraints off the mapped
/// child inputs.
fn record_input_flags(child: &Runbook, directive: &ChildRunbookDef, outcome: &mut FlattenOutcome) {
    for (input, declaration) in &child.inputs {
        let Some(artifact) = directive.input_mapping.get(input) else {
            continue;
        };
        if declaration.sensitive {
            outcome.sensitive_inputs.insert(artifact.clone());
        }
        if let Some(schema) = &declaration.input_schema {
            outcome.schema_constraints.push(ChildInputConstraint {
                child: child.name.clone(),
                input: input.clone(),
                artifact: artifact.clone(),
                schema: schema.clone(),
            });
        }
    }
}

/// Validates `output`/`output_mapping` and records the parent-visible
/// aliases onto namespaced child ids.
fn record_aliases(
    host_id: &ArtifactId,
    host_output: bool,
    child: &Runbook,
    directive: &ChildRunbookDef,
    namespace: &str,
    outcome: &mut FlattenOutcome,
) -> PlanResult<()> {
    let exposed: Vec<(String, String)> = match (&directive.output, &directive.output_mapping) {
        (Some(_), Some(_)) => {
            return Err(PlanError::ChildRunbookInvalid {
                path: directive.path.clone(),
                message: "set either output or output_mapping, not both".to_string(),
            });
        }
        (None, None) => {
            return Err(PlanError::ChildRunbookInvalid {
                path: directive.path.clone(),
                message: "child_runbook must expose an output or output_mapping".to_string(),
            });
        }
        (Some(output), None) => vec![(host_id.to_string(), output.clone())],
        (None, Some(mapping)) => mapping
            .iter()
            .map(|(visible, output)| (visible.clone(), output.clone()))
            .collect(),
    };

    for (visible, output) in exposed {
        let internal = child.outputs.get(&output).ok_or_else(|| {
            PlanError::InvalidOutputMapping {
                child: child.name.clone(),
                output: output.clone(),
            }
        })?;
        let target = namespace_id(namespace, internal);

        let visible_id: ArtifactId =
            visible
                .parse()
                .map_err(|_| PlanError::ChildRunbookInvalid {
                    path: directive.path.clone(),
                    message: format!("alias name `{visible}` is not a valid artifact id"),
                })?;
        if outcome.aliases.contains_key(&visible)
            || outcome.runbook.artifacts.contains_key(&visible_id)
        {
            return Err(PlanError::ChildRunbookInvalid {
                path: directive.path.clone(),
                message: format!("alias `{visible}` collides with an existing artifact or alias"),
            });
        }
        if outcome.reversed_aliases.contains_key(&target) {
            return Err(PlanError::ChildRunbookInvalid {
                path: directive.path.clone(),
                message: format!("child output `{output}` is exposed under two names"),
            });
        }

        if host_output {
            outcome.output_overrides.insert(target.clone());
        }
        outcome.aliases.insert(visible.clone(), target.clone());
        outcome.reversed_aliases.insert(target, visible);
    }

    Ok(())
}

/// Rewrites one child-internal reference: declared inputs become the mapped
/// parent artifact, everything else is namespaced.
fn rewrite_reference(
    reference: &ArtifactId,
    child: &Runbook,
    directive: &ChildRunbookDef,
    namespace: &str,
) -> PlanResult<ArtifactId> {
    if let Some(declaration) = child.inputs.get(reference.as_str()) {
        return match directive.input_mapping.get(reference.as_str()) {
            Some(mapped) => Ok(mapped.clone()),
            // validate_input_mapping lets optional inputs go unmapped; an
            // artifact that still consumes one cannot be produced.
            None if declaration.optional => Err(PlanError::ChildRunbookInvalid {
                path: directive.path.clone(),
                message: format!(
                    "optional input `{reference}` is unmapped but consumed by an artifact"
                ),
            }),
            None => unreachable!("non-optional inputs are checked by validate_input_mapping"),
        };
    }

    Ok(namespace_id(namespace, reference))
}

/// Builds the `{sanitized_name}__{8-hex}__` namespace for one inclusion.
fn namespace_for(name: &str) -> String {
    let sanitized: String = name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{sanitized}__{}__", &suffix[..8])
}

/// Prefixes an id with a namespace.
fn namespace_id(namespace: &str, id: &ArtifactId) -> ArtifactId {
    ArtifactId::new(format!("{namespace}{id}"))
        .expect("namespacing a valid id yields a valid id")
}

/// Resolves a runbook's template directories against its own directory.
fn resolve_template_dirs(runbook: &Runbook, base_dir: &Path) -> Vec<PathBuf> {
    runbook
        .config
        .template_paths
        .iter()
        .map(|dir| {
            if dir.is_absolute() {
                dir.clone()
            } else {
                base_dir.join(dir)
            }
        })
        .collect()
}
