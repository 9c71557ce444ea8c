//! Planner and executor error types.

use std::path::PathBuf;

use thiserror::Error;
use waivern_core::{ArtifactId, RunId, SchemaId};
use waivern_store::StoreError;

use crate::producer::ProducerKind;

/// Result type for planning operations.
pub type PlanResult<T> = Result<T, PlanError>;

/// Result type for execution operations.
pub type ExecuteResult<T> = Result<T, ExecuteError>;

/// Errors raised while turning a runbook into an execution plan.
///
/// Planner errors surface to the caller before anything is written to the
/// store; a run that fails to plan leaves no trace.
#[derive(Debug, Error)]
pub enum PlanError {
    /// The runbook file could not be read.
    #[error("failed to read runbook {path}: {source}")]
    Io {
        /// Path that failed to read.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The runbook YAML is malformed or violates the documented shape.
    #[error("failed to parse runbook{}: {message}", fmt_path(.path))]
    Parse {
        /// Path of the offending file, when parsed from disk.
        path: Option<PathBuf>,
        /// Parser or shape-validation error text.
        message: String,
    },

    /// An artifact definition sets an invalid combination of production
    /// methods.
    #[error("artifact `{artifact}`: {message}")]
    InvalidArtifact {
        /// The offending artifact.
        artifact: ArtifactId,
        /// What is wrong with its definition.
        message: String,
    },

    /// A `child_runbook.path` is absolute or contains `..`.
    #[error("artifact `{artifact}`: child runbook path `{path}` must be relative and free of `..`")]
    InvalidPath {
        /// The artifact carrying the directive.
        artifact: ArtifactId,
        /// The rejected path.
        path: PathBuf,
    },

    /// A child runbook file was not found on the search path.
    #[error("child runbook `{path}` not found (searched {searched:?})")]
    ChildRunbookNotFound {
        /// The requested path.
        path: PathBuf,
        /// Directories that were searched.
        searched: Vec<PathBuf>,
    },

    /// A child runbook exists but is malformed or structurally invalid.
    #[error("child runbook `{path}` is invalid: {message}")]
    ChildRunbookInvalid {
        /// The resolved child path.
        path: PathBuf,
        /// What is wrong with it.
        message: String,
    },

    /// Child expansion revisited a runbook already on the expansion branch.
    #[error("circular child runbook inclusion: {}", fmt_cycle_paths(.cycle))]
    CircularRunbook {
        /// The chain of paths forming the cycle.
        cycle: Vec<PathBuf>,
    },

    /// A non-optional child input has no entry in `input_mapping`.
    #[error("child runbook `{child}`: input `{input}` is not mapped")]
    MissingInputMapping {
        /// Name of the child runbook.
        child: String,
        /// The unmapped input.
        input: String,
    },

    /// `input_mapping` names an input the child does not declare.
    #[error("child runbook `{child}` does not declare input `{input}`")]
    UnknownInputMapping {
        /// Name of the child runbook.
        child: String,
        /// The unknown mapping key.
        input: String,
    },

    /// `output`/`output_mapping` references a child output that does not
    /// exist.
    #[error("child runbook `{child}` does not declare output `{output}`")]
    InvalidOutputMapping {
        /// Name of the child runbook.
        child: String,
        /// The unknown output name.
        output: String,
    },

    /// An artifact's `inputs` references an id that exists nowhere in the
    /// flattened runbook.
    #[error("artifact `{consumer}` references unknown input `{input}`")]
    UnknownArtifact {
        /// The referencing artifact.
        consumer: ArtifactId,
        /// The unresolved reference.
        input: ArtifactId,
    },

    /// The dependency graph contains a cycle.
    #[error("cyclic artifact dependency: {}", fmt_cycle_ids(.cycle))]
    CyclicDependency {
        /// One cycle through the graph.
        cycle: Vec<ArtifactId>,
    },

    /// No producer is registered under the requested kind and type.
    #[error("no {kind} of type `{type_name}` is registered")]
    ProducerNotFound {
        /// Connector or processor.
        kind: ProducerKind,
        /// The requested type string.
        type_name: String,
    },

    /// A producer declares several output schemas and the artifact does not
    /// pick one, or picks one the producer does not declare.
    #[error("artifact `{artifact}`: cannot resolve output schema ({message}); declared: {declared:?}")]
    OutputSchemaUnresolved {
        /// The offending artifact.
        artifact: ArtifactId,
        /// Why resolution failed.
        message: String,
        /// Schemas the producer declares.
        declared: Vec<SchemaId>,
    },

    /// A producer/consumer edge pairs incompatible schemas.
    #[error(
        "artifact `{consumer}` cannot accept {offered:?} from {producers:?}; accepted combinations: {accepted}"
    )]
    SchemaIncompatible {
        /// The consuming artifact.
        consumer: ArtifactId,
        /// Its input artifacts, in declaration order.
        producers: Vec<ArtifactId>,
        /// The schemas those inputs produce.
        offered: Vec<SchemaId>,
        /// Textual rendering of the accepted combinations.
        accepted: String,
    },

    /// The artifact piped into a child input does not produce the schema the
    /// child declares for it.
    #[error(
        "child runbook `{child}` input `{input}` expects {expected}, but `{artifact}` produces {found}"
    )]
    ChildInputSchemaIncompatible {
        /// Name of the child runbook.
        child: String,
        /// The declared input name.
        input: String,
        /// The parent artifact being piped in.
        artifact: ArtifactId,
        /// Schema the child declares.
        expected: SchemaId,
        /// Schema the parent artifact produces.
        found: SchemaId,
    },

    /// A `reuse` directive points at a run or artifact that does not exist.
    #[error("reuse target {from_run}/{artifact} is missing")]
    ReuseTargetMissing {
        /// The source run.
        from_run: RunId,
        /// The artifact expected in that run.
        artifact: ArtifactId,
    },

    /// The store failed while resolving reuse targets.
    #[error("store error during planning: {0}")]
    Store(#[from] StoreError),
}

/// Errors that abort a run as a whole.
///
/// Per-node failures never surface here; they are recorded in the
/// [`RunResult`](crate::engine::RunResult). Only store failures (which make
/// further persistence impossible) and internal scheduler faults abort the
/// run.
#[derive(Debug, Error)]
pub enum ExecuteError {
    /// The store failed; the run cannot continue persisting results.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Internal scheduler error.
    #[error("internal error: {0}")]
    Internal(String),
}

fn fmt_path(path: &Option<PathBuf>) -> String {
    match path {
        Some(path) => format!(" {}", path.display()),
        None => String::new(),
    }
}

fn fmt_cycle_paths(cycle: &[PathBuf]) -> String {
    cycle
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

fn fmt_cycle_ids(cycle: &[ArtifactId]) -> String {
    cycle
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}
