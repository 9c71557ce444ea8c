//! Runbook planning.
//!
//! The planner turns a parsed [`Runbook`] into an immutable
//! [`ExecutionPlan`] in five phases:
//!
//! 1. **Validation**: every artifact sets exactly one production method
//! 2. **Flattening**: child runbooks are expanded into one namespace
//! 3. **Graph building**: alias-resolved input references become DAG edges
//! 4. **Schema resolution**: each node's output schema is resolved and
//!    every edge is checked for compatibility
//! 5. **Emission**: the plan is assembled and never mutated again

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use waivern_core::{ArtifactId, Origin, SchemaId};
use waivern_store::ArtifactStore;

use crate::TRACING_TARGET;
use crate::definition::{ArtifactDefinition, Production, Runbook, RunbookConfig};
use crate::error::{PlanError, PlanResult};
use crate::producer::ProducerRegistry;

pub(crate) mod flatten;
mod graph;
mod schema;

pub use graph::ExecutionGraph;
pub use schema::ResolvedSchemas;

/// Maximum alias-chain hops before resolution gives up.
///
/// Chains form when a child runbook exposes the output of a grandchild;
/// their length is bounded by inclusion depth, so a generous cap only
/// guards against a broken alias table.
const MAX_ALIAS_HOPS: usize = 64;

/// Compiles runbooks into execution plans.
pub struct Planner<'a> {
    registry: &'a ProducerRegistry,
    store: &'a dyn ArtifactStore,
}

impl<'a> Planner<'a> {
    /// Creates a planner over a producer registry and an artifact store.
    ///
    /// The store is only read, and only to resolve `reuse` references.
    pub fn new(registry: &'a ProducerRegistry, store: &'a dyn ArtifactStore) -> Self {
        Self { registry, store }
    }

    /// Loads a runbook file and plans it.
    pub async fn plan_file(&self, path: &Path) -> PlanResult<ExecutionPlan> {
        let runbook = Runbook::load(path).await?;
        let base_dir = path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        self.plan(runbook, base_dir).await
    }

    /// Plans a parsed runbook.
    ///
    /// `base_dir` anchors relative child-runbook paths; pass the directory
    /// of the runbook file.
    pub async fn plan(&self, runbook: Runbook, base_dir: &Path) -> PlanResult<ExecutionPlan> {
        if runbook.is_child() {
            return Err(PlanError::Parse {
                path: None,
                message: format!(
                    "runbook `{}` declares inputs and can only run as a child of another runbook",
                    runbook.name
                ),
            });
        }

        runbook.validate()?;

        let outcome = flatten::flatten(runbook, base_dir).await?;
        let flattened = &outcome.runbook;

        // Edges from alias-resolved input references.
        let mut resolved_inputs: BTreeMap<ArtifactId, Vec<ArtifactId>> = BTreeMap::new();
        let mut edges: BTreeSet<(ArtifactId, ArtifactId)> = BTreeSet::new();

        for (id, definition) in &flattened.artifacts {
            let Production::Process { inputs, .. } = definition
                .production()
                .map_err(|message| PlanError::InvalidArtifact {
                    artifact: id.clone(),
                    message,
                })?
            else {
                continue;
            };

            let mut resolved = Vec::with_capacity(inputs.len());
            for reference in inputs.iter() {
                let target = resolve_alias(&outcome.aliases, reference);
                if !flattened.artifacts.contains_key(&target) {
                    return Err(PlanError::UnknownArtifact {
                        consumer: id.clone(),
                        input: reference.clone(),
                    });
                }
                edges.insert((target.clone(), id.clone()));
                resolved.push(target);
            }
            resolved_inputs.insert(id.clone(), resolved);
        }

        let graph = ExecutionGraph::new(flattened.artifacts.keys().cloned(), edges)?;

        // Sensitive flags and schema constraints may name sibling aliases;
        // resolve them onto real nodes before checking.
        let sensitive_inputs: BTreeSet<ArtifactId> = outcome
            .sensitive_inputs
            .iter()
            .map(|artifact| resolve_alias(&outcome.aliases, artifact))
            .collect();
        let schema_constraints: Vec<flatten::ChildInputConstraint> = outcome
            .schema_constraints
            .iter()
            .map(|constraint| flatten::ChildInputConstraint {
                artifact: resolve_alias(&outcome.aliases, &constraint.artifact),
                ..constraint.clone()
            })
            .collect();

        let schemas = schema::resolve_schemas(
            flattened,
            &resolved_inputs,
            &schema_constraints,
            self.registry,
            self.store,
        )
        .await?;

        let mut output_artifacts: BTreeSet<ArtifactId> = flattened
            .artifacts
            .iter()
            .filter(|(_, definition)| definition.output)
            .map(|(id, _)| id.clone())
            .collect();
        output_artifacts.extend(
            outcome
                .output_overrides
                .iter()
                .map(|artifact| resolve_alias(&outcome.aliases, artifact)),
        );

        tracing::debug!(
            target: TRACING_TARGET,
            runbook = %flattened.name,
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            aliases = outcome.aliases.len(),
            "Runbook planned"
        );

        Ok(ExecutionPlan {
            runbook: outcome.runbook,
            graph,
            schemas,
            resolved_inputs,
            aliases: outcome.aliases,
            reversed_aliases: outcome.reversed_aliases,
            sensitive_inputs,
            output_artifacts,
        })
    }
}

/// Follows an alias chain to the node it ultimately names.
fn resolve_alias(aliases: &BTreeMap<String, ArtifactId>, reference: &ArtifactId) -> ArtifactId {
    let mut current = reference.clone();
    for _ in 0..MAX_ALIAS_HOPS {
        match aliases.get(current.as_str()) {
            Some(next) => current = next.clone(),
            None => break,
        }
    }
    current
}

/// An immutable plan: the flattened runbook, its dependency graph, resolved
/// schemas, and the alias maps needed to shape results.
#[derive(Debug)]
pub struct ExecutionPlan {
    runbook: Runbook,
    graph: ExecutionGraph,
    schemas: BTreeMap<ArtifactId, ResolvedSchemas>,
    resolved_inputs: BTreeMap<ArtifactId, Vec<ArtifactId>>,
    aliases: BTreeMap<String, ArtifactId>,
    reversed_aliases: BTreeMap<ArtifactId, String>,
    sensitive_inputs: BTreeSet<ArtifactId>,
    output_artifacts: BTreeSet<ArtifactId>,
}

impl ExecutionPlan {
    /// Returns the flattened runbook.
    pub fn runbook(&self) -> &Runbook {
        &self.runbook
    }

    /// Returns the execution configuration.
    pub fn config(&self) -> &RunbookConfig {
        &self.runbook.config
    }

    /// Returns the dependency graph.
    pub fn graph(&self) -> &ExecutionGraph {
        &self.graph
    }

    /// Returns the definition of an artifact.
    pub fn definition(&self, id: &ArtifactId) -> Option<&ArtifactDefinition> {
        self.runbook.artifacts.get(id)
    }

    /// Returns the resolved schemas of an artifact.
    pub fn schemas(&self, id: &ArtifactId) -> Option<&ResolvedSchemas> {
        self.schemas.get(id)
    }

    /// Returns the schema an artifact produces.
    pub fn output_schema(&self, id: &ArtifactId) -> Option<&SchemaId> {
        self.schemas.get(id).map(|resolved| &resolved.output)
    }

    /// Returns an artifact's alias-resolved input ids, in declaration
    /// order. Empty for `source` and `reuse` artifacts.
    pub fn resolved_inputs(&self, id: &ArtifactId) -> &[ArtifactId] {
        self.resolved_inputs
            .get(id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Returns the parent-visible-name to namespaced-id alias map.
    pub fn aliases(&self) -> &BTreeMap<String, ArtifactId> {
        &self.aliases
    }

    /// Returns the namespaced-id to parent-visible-name alias map.
    pub fn reversed_aliases(&self) -> &BTreeMap<ArtifactId, String> {
        &self.reversed_aliases
    }

    /// Returns the artifacts flagged sensitive by a child input
    /// declaration.
    pub fn sensitive_inputs(&self) -> &BTreeSet<ArtifactId> {
        &self.sensitive_inputs
    }

    /// Returns the artifacts whose messages are exported in the run result.
    pub fn output_artifacts(&self) -> &BTreeSet<ArtifactId> {
        &self.output_artifacts
    }

    /// Returns the parent-visible alias of a node, if it has one.
    pub fn alias_of(&self, id: &ArtifactId) -> Option<&str> {
        self.reversed_aliases.get(id).map(String::as_str)
    }

    /// Derives a node's origin from the alias map.
    ///
    /// Aliased nodes carry `child:<runbook_name>` parsed from their
    /// namespace prefix; everything else originates in the parent.
    pub fn origin_of(&self, id: &ArtifactId) -> Origin {
        if !self.reversed_aliases.contains_key(id) {
            return Origin::Parent;
        }
        match id.as_str().split_once("__") {
            Some((name, _)) if !name.is_empty() => Origin::Child(name.to_string()),
            _ => Origin::Parent,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;

    use serde_json::json;
    use waivern_store::MemoryStore;
    use waivern_test::{MapProcessor, StubConnector, schema};

    use super::*;
    use crate::producer::{InputCapability, ProducerKind};

    const RAW: &str = "raw/1.0.0";

    fn id(s: &str) -> ArtifactId {
        s.parse().expect("valid id")
    }

    fn registry() -> ProducerRegistry {
        let mut registry = ProducerRegistry::new();
        registry.register(
            ProducerKind::Connector,
            "extract",
            Arc::new(StubConnector::new(schema(RAW), json!(null))),
        );
        registry.register(
            ProducerKind::Processor,
            "wrap",
            Arc::new(MapProcessor::identity(schema(RAW))),
        );
        registry
    }

    fn write(dir: &Path, name: &str, yaml: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create dirs");
        }
        std::fs::write(&path, yaml).expect("write runbook");
        path
    }

    async fn plan_at(dir: &Path, name: &str) -> PlanResult<ExecutionPlan> {
        let registry = registry();
        let store = MemoryStore::new();
        Planner::new(&registry, &store)
            .plan_file(&dir.join(name))
            .await
    }

    const CHILD: &str = r#"
name: child
description: wraps piped-in data
inputs:
  source_data:
    input_schema: raw/1.0.0
artifacts:
  findings:
    inputs: source_data
    process:
      type: wrap
outputs:
  result: findings
"#;

    #[test]
    fn test_resolve_alias_follows_chains() {
        let aliases = BTreeMap::from([
            ("analysis".to_string(), id("child__aa__inner")),
            ("child__aa__inner".to_string(), id("child__aa__grand__bb__findings")),
        ]);
        assert_eq!(
            resolve_alias(&aliases, &id("analysis")),
            id("child__aa__grand__bb__findings")
        );
        assert_eq!(resolve_alias(&aliases, &id("plain")), id("plain"));
    }

    #[tokio::test]
    async fn test_child_runbook_cannot_be_planned_directly() {
        let registry = registry();
        let store = MemoryStore::new();
        let runbook = Runbook::parse_str(CHILD).expect("parse");
        let err = Planner::new(&registry, &store)
            .plan(runbook, Path::new("."))
            .await
            .unwrap_err();
        assert!(matches!(err, PlanError::Parse { .. }));
    }

    #[tokio::test]
    async fn test_child_found_via_template_paths() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(dir.path(), "templates/child.yaml", CHILD);
        write(
            dir.path(),
            "parent.yaml",
            r#"
name: parent
description: child lives in the template directory
config:
  template_paths: [templates]
artifacts:
  db:
    source:
      type: extract
  analysis:
    child_runbook:
      path: child.yaml
      input_mapping:
        source_data: db
      output: result
"#,
        );

        let plan = plan_at(dir.path(), "parent.yaml").await.expect("plan");
        assert_eq!(plan.graph().node_count(), 2);
        assert!(plan.aliases().contains_key("analysis"));
    }

    #[tokio::test]
    async fn test_nested_children_flatten_through_alias_chain() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(dir.path(), "grandchild.yaml", CHILD);
        write(
            dir.path(),
            "middle.yaml",
            r#"
name: middle
description: passes its input to a grandchild
inputs:
  middle_in: {}
artifacts:
  deep:
    child_runbook:
      path: grandchild.yaml
      input_mapping:
        source_data: middle_in
      output: result
outputs:
  middle_out: deep
"#,
        );
        write(
            dir.path(),
            "parent.yaml",
            r#"
name: parent
description: two levels of inclusion
artifacts:
  db:
    source:
      type: extract
  analysis:
    child_runbook:
      path: middle.yaml
      input_mapping:
        middle_in: db
      output: middle_out
  report:
    inputs: analysis
    process:
      type: wrap
"#,
        );

        let plan = plan_at(dir.path(), "parent.yaml").await.expect("plan");

        // db, the grandchild's findings node, and report.
        assert_eq!(plan.graph().node_count(), 3);
        let target = resolve_alias(plan.aliases(), &id("analysis"));
        assert!(target.as_str().starts_with("child__"));
        assert!(target.as_str().ends_with("__findings"));
        // report consumes the grandchild node through the alias chain.
        assert_eq!(plan.resolved_inputs(&id("report")), &[target.clone()]);
        assert_eq!(plan.graph().successors(&id("db")), vec![target]);
    }

    #[tokio::test]
    async fn test_same_child_twice_gets_distinct_namespaces() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(dir.path(), "child.yaml", CHILD);
        write(
            dir.path(),
            "parent.yaml",
            r#"
name: parent
description: the same template included twice
artifacts:
  db:
    source:
      type: extract
  first:
    child_runbook:
      path: child.yaml
      input_mapping:
        source_data: db
      output: result
  second:
    child_runbook:
      path: child.yaml
      input_mapping:
        source_data: db
      output: result
"#,
        );

        let plan = plan_at(dir.path(), "parent.yaml").await.expect("plan");
        let first = plan.aliases().get("first").expect("first alias");
        let second = plan.aliases().get("second").expect("second alias");
        assert_ne!(first, second);
        assert_eq!(plan.graph().node_count(), 3);
    }

    #[tokio::test]
    async fn test_output_mapping_exposes_several_names() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(
            dir.path(),
            "child.yaml",
            r#"
name: audit
description: exposes two findings
inputs:
  source_data: {}
artifacts:
  pii:
    inputs: source_data
    process:
      type: wrap
  retention:
    inputs: source_data
    process:
      type: wrap
outputs:
  pii_out: pii
  retention_out: retention
"#,
        );
        write(
            dir.path(),
            "parent.yaml",
            r#"
name: parent
description: consumes one of two exposed outputs
artifacts:
  db:
    source:
      type: extract
  audit:
    child_runbook:
      path: child.yaml
      input_mapping:
        source_data: db
      output_mapping:
        pii_findings: pii_out
        retention_findings: retention_out
  summary:
    inputs: pii_findings
    process:
      type: wrap
"#,
        );

        let plan = plan_at(dir.path(), "parent.yaml").await.expect("plan");
        assert!(plan.aliases().contains_key("pii_findings"));
        assert!(plan.aliases().contains_key("retention_findings"));
        let pii = plan.aliases()["pii_findings"].clone();
        assert_eq!(plan.resolved_inputs(&id("summary")), &[pii]);
    }

    #[tokio::test]
    async fn test_circular_inclusion_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(
            dir.path(),
            "loop.yaml",
            r#"
name: loop
description: includes itself
inputs:
  data: {}
artifacts:
  again:
    child_runbook:
      path: loop.yaml
      input_mapping:
        data: data
      output: out
outputs:
  out: again
"#,
        );
        write(
            dir.path(),
            "parent.yaml",
            r#"
name: parent
description: starts the loop
artifacts:
  db:
    source:
      type: extract
  looped:
    child_runbook:
      path: loop.yaml
      input_mapping:
        data: db
      output: out
"#,
        );

        let err = plan_at(dir.path(), "parent.yaml").await.unwrap_err();
        assert!(matches!(err, PlanError::CircularRunbook { .. }));
    }

    #[tokio::test]
    async fn test_missing_input_mapping_fails_at_plan_time() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(dir.path(), "child.yaml", CHILD);
        write(
            dir.path(),
            "parent.yaml",
            r#"
name: parent
description: forgets to map source_data
artifacts:
  db:
    source:
      type: extract
  analysis:
    child_runbook:
      path: child.yaml
      output: result
"#,
        );

        let err = plan_at(dir.path(), "parent.yaml").await.unwrap_err();
        let PlanError::MissingInputMapping { child, input } = err else {
            panic!("expected missing input mapping, got {err}");
        };
        assert_eq!(child, "child");
        assert_eq!(input, "source_data");
    }

    #[tokio::test]
    async fn test_unknown_input_mapping_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(dir.path(), "child.yaml", CHILD);
        write(
            dir.path(),
            "parent.yaml",
            r#"
name: parent
description: maps an undeclared input
artifacts:
  db:
    source:
      type: extract
  analysis:
    child_runbook:
      path: child.yaml
      input_mapping:
        source_data: db
        bogus: db
      output: result
"#,
        );

        let err = plan_at(dir.path(), "parent.yaml").await.unwrap_err();
        assert!(matches!(err, PlanError::UnknownInputMapping { .. }));
    }

    #[tokio::test]
    async fn test_invalid_output_name_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(dir.path(), "child.yaml", CHILD);
        write(
            dir.path(),
            "parent.yaml",
            r#"
name: parent
description: asks for an output the child does not declare
artifacts:
  db:
    source:
      type: extract
  analysis:
    child_runbook:
      path: child.yaml
      input_mapping:
        source_data: db
      output: nonexistent
"#,
        );

        let err = plan_at(dir.path(), "parent.yaml").await.unwrap_err();
        assert!(matches!(err, PlanError::InvalidOutputMapping { .. }));
    }

    #[tokio::test]
    async fn test_traversal_path_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(
            dir.path(),
            "parent.yaml",
            r#"
name: parent
description: escapes the runbook directory
artifacts:
  db:
    source:
      type: extract
  analysis:
    child_runbook:
      path: ../outside.yaml
      input_mapping:
        source_data: db
      output: result
"#,
        );

        let err = plan_at(dir.path(), "parent.yaml").await.unwrap_err();
        assert!(matches!(err, PlanError::InvalidPath { .. }));
    }

    #[tokio::test]
    async fn test_missing_child_reports_search_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(
            dir.path(),
            "parent.yaml",
            r#"
name: parent
description: child file does not exist
artifacts:
  db:
    source:
      type: extract
  analysis:
    child_runbook:
      path: nowhere.yaml
      input_mapping:
        source_data: db
      output: result
"#,
        );

        let err = plan_at(dir.path(), "parent.yaml").await.unwrap_err();
        let PlanError::ChildRunbookNotFound { searched, .. } = err else {
            panic!("expected child-not-found, got {err}");
        };
        assert!(!searched.is_empty());
    }

    #[tokio::test]
    async fn test_sensitive_inputs_recorded() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(
            dir.path(),
            "child.yaml",
            r#"
name: child
description: treats its input as sensitive
inputs:
  source_data:
    sensitive: true
artifacts:
  findings:
    inputs: source_data
    process:
      type: wrap
outputs:
  result: findings
"#,
        );
        write(
            dir.path(),
            "parent.yaml",
            r#"
name: parent
description: pipes db into a sensitive input
artifacts:
  db:
    source:
      type: extract
  analysis:
    child_runbook:
      path: child.yaml
      input_mapping:
        source_data: db
      output: result
"#,
        );

        let plan = plan_at(dir.path(), "parent.yaml").await.expect("plan");
        assert!(plan.sensitive_inputs().contains(&id("db")));
    }

    #[tokio::test]
    async fn test_child_input_schema_mismatch_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(
            dir.path(),
            "child.yaml",
            r#"
name: child
description: wants a schema the parent does not produce
inputs:
  source_data:
    input_schema: other/1.0.0
artifacts:
  findings:
    inputs: source_data
    process:
      type: wrap
outputs:
  result: findings
"#,
        );
        write(
            dir.path(),
            "parent.yaml",
            r#"
name: parent
description: pipes raw data into the child
artifacts:
  db:
    source:
      type: extract
  analysis:
    child_runbook:
      path: child.yaml
      input_mapping:
        source_data: db
      output: result
"#,
        );

        let err = plan_at(dir.path(), "parent.yaml").await.unwrap_err();
        assert!(matches!(err, PlanError::ChildInputSchemaIncompatible { .. }));
    }

    #[tokio::test]
    async fn test_unknown_input_reference_fails() {
        let registry = registry();
        let store = MemoryStore::new();
        let runbook = Runbook::parse_str(
            r#"
name: dangling
description: b consumes an artifact that does not exist
artifacts:
  b:
    inputs: ghost
    process:
      type: wrap
"#,
        )
        .expect("parse");

        let err = Planner::new(&registry, &store)
            .plan(runbook, Path::new("."))
            .await
            .unwrap_err();
        let PlanError::UnknownArtifact { consumer, input } = err else {
            panic!("expected unknown artifact, got {err}");
        };
        assert_eq!(consumer, id("b"));
        assert_eq!(input, id("ghost"));
    }
}
