//! The DAG executor.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use jiff::Timestamp;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use waivern_core::{
    ArtifactId, ExecutionContext, ExecutionState, ExecutionStatus, Message, NodeStatus, Origin,
    RunId, RunMetadata, RunStatus, SchemaId,
};
use waivern_store::{ArtifactStore, StoreError};

use super::cost::CostTracker;
use super::result::{ArtifactResult, RunResult};
use super::signal::{StopCause, StopSignal};
use crate::TRACING_TARGET;
use crate::definition::{MergeStrategy, Production, Properties};
use crate::error::{ExecuteError, ExecuteResult};
use crate::plan::ExecutionPlan;
use crate::producer::{ProducerContext, ProducerKind, ProducerRegistry};

/// Drives execution plans to completion.
///
/// One executor instance serves one run at a time; it owns no state beyond
/// its store and registry handles, both explicit values. The executor is
/// the only component that writes the store during a run.
pub struct Executor {
    store: Arc<dyn ArtifactStore>,
    registry: Arc<ProducerRegistry>,
}

impl Executor {
    /// Creates an executor over a store and a producer registry.
    pub fn new(store: Arc<dyn ArtifactStore>, registry: Arc<ProducerRegistry>) -> Self {
        Self { store, registry }
    }

    /// Runs a plan to completion.
    pub async fn run(&self, plan: &ExecutionPlan) -> ExecuteResult<RunResult> {
        self.run_with_signal(plan, StopSignal::new()).await
    }

    /// Runs a plan, honouring an external stop signal.
    ///
    /// The `config.timeout_seconds` deadline and the `config.cost_limit`
    /// budget are armed internally on the same signal; passing a signal in
    /// additionally lets an operator abort the run from outside.
    pub async fn run_with_signal(
        &self,
        plan: &ExecutionPlan,
        signal: StopSignal,
    ) -> ExecuteResult<RunResult> {
        let run_id = RunId::new();
        let started_at = Timestamp::now();
        let clock = Instant::now();
        let config = plan.config();
        let max_concurrency = config.max_concurrency.max(1);
        let graph = plan.graph();

        tracing::info!(
            target: TRACING_TARGET,
            run_id = %run_id,
            runbook = %plan.runbook().name,
            nodes = graph.node_count(),
            max_concurrency,
            timeout_seconds = config.timeout_seconds,
            "Run starting"
        );

        let mut metadata = RunMetadata::started(run_id, &plan.runbook().name, started_at);
        self.store.save_run_metadata(run_id, &metadata).await?;

        let mut state = ExecutionState::pending(graph.node_ids().cloned(), started_at);
        self.store.save_execution_state(run_id, &state).await?;

        let mut remaining: HashMap<ArtifactId, usize> = graph
            .node_ids()
            .map(|id| (id.clone(), graph.predecessors(id).len()))
            .collect();
        let mut ready: VecDeque<ArtifactId> = graph.roots().into();
        let mut running: JoinSet<NodeOutcome> = JoinSet::new();
        let mut results: BTreeMap<ArtifactId, ArtifactResult> = BTreeMap::new();
        let mut skipped: BTreeSet<ArtifactId> = BTreeSet::new();

        let deadline = config
            .timeout_seconds
            .map(|secs| tokio::time::Instant::now() + std::time::Duration::from_secs(secs));
        let costs = CostTracker::new(config.cost_limit, signal.clone());
        let mut stop_cause: Option<StopCause> = None;

        loop {
            while running.len() < max_concurrency
                && let Some(id) = ready.pop_front()
            {
                state.record(id.clone(), NodeStatus::Running, Timestamp::now());
                tracing::debug!(
                    target: TRACING_TARGET,
                    run_id = %run_id,
                    artifact_id = %id,
                    "Producing artifact"
                );
                let task =
                    self.node_task(plan, run_id, &id, signal.token().child_token(), costs.clone());
                running.spawn(task.produce());
            }

            if running.is_empty() {
                break;
            }

            tokio::select! {
                biased;

                () = signal.cancelled() => {
                    stop_cause = Some(signal.cause().unwrap_or(StopCause::External));
                    break;
                }

                () = wait_deadline(deadline) => {
                    stop_cause = Some(StopCause::Timeout);
                    break;
                }

                Some(joined) = running.join_next() => {
                    let outcome = joined
                        .map_err(|e| ExecuteError::Internal(format!("node task failed: {e}")))?;

                    match outcome.result {
                        Ok(message) => self.finalize_success(
                            plan,
                            outcome.id,
                            message,
                            outcome.duration_seconds,
                            &mut state,
                            &mut results,
                            &mut remaining,
                            &mut ready,
                        ),
                        Err(NodeError::Store(error)) => {
                            running.abort_all();
                            return Err(error.into());
                        }
                        Err(error) => self.finalize_failure(
                            plan,
                            outcome.id,
                            error.to_string(),
                            outcome.duration_seconds,
                            &mut state,
                            &mut results,
                            &mut skipped,
                        ),
                    }

                    self.store.save_execution_state(run_id, &state).await?;
                }
            }
        }

        if let Some(cause) = stop_cause {
            tracing::warn!(
                target: TRACING_TARGET,
                run_id = %run_id,
                cause = %cause,
                "Run stopping early"
            );

            running.abort_all();
            while running.join_next().await.is_some() {}

            let reason = cause.to_string();
            let unfinished: Vec<ArtifactId> = state
                .nodes
                .iter()
                .filter(|(_, status)| !status.is_terminal())
                .map(|(id, _)| id.clone())
                .collect();
            for id in unfinished {
                state.record(id.clone(), NodeStatus::Failed, Timestamp::now());
                results.insert(
                    id.clone(),
                    ArtifactResult {
                        artifact_id: id.clone(),
                        success: false,
                        error: Some(reason.clone()),
                        duration_seconds: 0.0,
                        origin: plan.origin_of(&id),
                        alias: plan.alias_of(&id).map(str::to_string),
                        message: None,
                    },
                );
            }
            self.store.save_execution_state(run_id, &state).await?;
        }

        let status = final_status(plan, &results, stop_cause);
        metadata.finish(status, Timestamp::now());
        self.store.save_run_metadata(run_id, &metadata).await?;

        tracing::info!(
            target: TRACING_TARGET,
            run_id = %run_id,
            status = %status,
            produced = results.values().filter(|r| r.success).count(),
            failed = results.values().filter(|r| !r.success).count(),
            skipped = skipped.len(),
            "Run finished"
        );

        Ok(RunResult {
            run_id,
            start_timestamp: started_at,
            total_duration_seconds: clock.elapsed().as_secs_f64(),
            status,
            artifacts: results,
            skipped: skipped.into_iter().collect(),
        })
    }

    /// Records a success, then admits any dependents whose predecessors are
    /// now all done. The artifact was persisted inside the node task, so it
    /// is visible to every dependent admitted here.
    #[allow(clippy::too_many_arguments)]
    fn finalize_success(
        &self,
        plan: &ExecutionPlan,
        id: ArtifactId,
        message: Message,
        duration_seconds: f64,
        state: &mut ExecutionState,
        results: &mut BTreeMap<ArtifactId, ArtifactResult>,
        remaining: &mut HashMap<ArtifactId, usize>,
        ready: &mut VecDeque<ArtifactId>,
    ) {
        state.record(id.clone(), NodeStatus::Success, Timestamp::now());

        let exported = plan.output_artifacts().contains(&id);
        results.insert(
            id.clone(),
            ArtifactResult {
                artifact_id: id.clone(),
                success: true,
                error: None,
                duration_seconds,
                origin: plan.origin_of(&id),
                alias: plan.alias_of(&id).map(str::to_string),
                message: exported.then_some(message),
            },
        );

        for successor in plan.graph().successors(&id) {
            let count = remaining
                .get_mut(&successor)
                .expect("every node has a remaining-predecessors entry");
            *count -= 1;
            if *count == 0 {
                ready.push_back(successor);
            }
        }
    }

    /// Records a failure and transitively skips every descendant.
    ///
    /// Dependents become `skipped`, never `failed`, preserving blame; the
    /// run continues with independent branches either way.
    fn finalize_failure(
        &self,
        plan: &ExecutionPlan,
        id: ArtifactId,
        error: String,
        duration_seconds: f64,
        state: &mut ExecutionState,
        results: &mut BTreeMap<ArtifactId, ArtifactResult>,
        skipped: &mut BTreeSet<ArtifactId>,
    ) {
        tracing::warn!(
            target: TRACING_TARGET,
            artifact_id = %id,
            error = %error,
            optional = plan.definition(&id).is_some_and(|def| def.optional),
            "Artifact failed"
        );

        state.record(id.clone(), NodeStatus::Failed, Timestamp::now());
        results.insert(
            id.clone(),
            ArtifactResult {
                artifact_id: id.clone(),
                success: false,
                error: Some(error),
                duration_seconds,
                origin: plan.origin_of(&id),
                alias: plan.alias_of(&id).map(str::to_string),
                message: None,
            },
        );

        for descendant in plan.graph().descendants(&id) {
            if state.nodes.get(&descendant) == Some(&NodeStatus::Pending) {
                state.record(descendant.clone(), NodeStatus::Skipped, Timestamp::now());
                skipped.insert(descendant);
            }
        }
    }

    /// Clones everything one node's production needs into an owned task.
    fn node_task(
        &self,
        plan: &ExecutionPlan,
        run_id: RunId,
        id: &ArtifactId,
        cancellation: CancellationToken,
        costs: CostTracker,
    ) -> NodeTask {
        let definition = plan
            .definition(id)
            .expect("scheduled nodes come from the plan");
        let production = match definition
            .production()
            .expect("definitions were validated at plan time")
        {
            Production::Source(source) => TaskProduction::Source {
                connector: source.connector.clone(),
                properties: source.properties.clone(),
            },
            Production::Process { process, merge, .. } => TaskProduction::Process {
                processor: process.processor.clone(),
                properties: process.properties.clone(),
                inputs: plan.resolved_inputs(id).to_vec(),
                merge,
            },
            Production::Reuse(reuse) => TaskProduction::Reuse {
                from_run: reuse.from_run,
                artifact: reuse.artifact.clone(),
            },
            Production::ChildRunbook(_) => {
                unreachable!("child runbooks are flattened before execution")
            }
        };

        let sensitive_inputs = plan
            .resolved_inputs(id)
            .iter()
            .filter(|input| plan.sensitive_inputs().contains(*input))
            .cloned()
            .collect();

        NodeTask {
            run_id,
            id: id.clone(),
            production,
            expected_schema: plan
                .output_schema(id)
                .expect("schemas were resolved at plan time")
                .clone(),
            origin: plan.origin_of(id),
            alias: plan.alias_of(id).map(str::to_string),
            sensitive_inputs,
            store: Arc::clone(&self.store),
            registry: Arc::clone(&self.registry),
            cancellation,
            costs,
        }
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("registry", &self.registry)
            .finish()
    }
}

/// Sleeps until the deadline, or forever when none is set.
async fn wait_deadline(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Derives the run's final status from its failures.
fn final_status(
    plan: &ExecutionPlan,
    results: &BTreeMap<ArtifactId, ArtifactResult>,
    stop_cause: Option<StopCause>,
) -> RunStatus {
    if stop_cause == Some(StopCause::Timeout) {
        return RunStatus::Timeout;
    }

    let mut any_failure = false;
    for result in results.values().filter(|result| !result.success) {
        any_failure = true;
        let optional = plan
            .definition(&result.artifact_id)
            .is_some_and(|definition| definition.optional);
        if !optional {
            return RunStatus::Failed;
        }
    }

    if any_failure {
        RunStatus::Partial
    } else {
        RunStatus::Success
    }
}

/// How one node produces its message, detached from the plan.
enum TaskProduction {
    Source {
        connector: String,
        properties: Properties,
    },
    Process {
        processor: String,
        properties: Properties,
        inputs: Vec<ArtifactId>,
        merge: Option<MergeStrategy>,
    },
    Reuse {
        from_run: RunId,
        artifact: ArtifactId,
    },
}

/// Everything one node's production needs, owned by its task.
struct NodeTask {
    run_id: RunId,
    id: ArtifactId,
    production: TaskProduction,
    expected_schema: SchemaId,
    origin: Origin,
    alias: Option<String>,
    sensitive_inputs: Vec<ArtifactId>,
    store: Arc<dyn ArtifactStore>,
    registry: Arc<ProducerRegistry>,
    cancellation: CancellationToken,
    costs: CostTracker,
}

/// What a node task hands back to the scheduler.
struct NodeOutcome {
    id: ArtifactId,
    duration_seconds: f64,
    result: Result<Message, NodeError>,
}

/// Ways a single node can fail without aborting the run.
///
/// `Store` is the exception: persistence failures are fatal and the
/// scheduler converts them into [`ExecuteError::Store`].
#[derive(Debug, thiserror::Error)]
enum NodeError {
    #[error("no {kind} of type `{type_name}` is registered")]
    ProducerNotFound {
        kind: ProducerKind,
        type_name: String,
    },

    #[error("upstream artifact missing: {0}")]
    UpstreamMissing(ArtifactId),

    #[error("reuse target {from_run}/{artifact} is missing")]
    ReuseTargetMissing {
        from_run: RunId,
        artifact: ArtifactId,
    },

    #[error("merge: concatenate requires sequence content in every input")]
    MergeShape,

    #[error("producer returned schema {found}, expected {expected}")]
    SchemaViolation { expected: SchemaId, found: SchemaId },

    #[error("{0}")]
    Producer(String),

    #[error("cancelled")]
    Cancelled,

    #[error(transparent)]
    Store(StoreError),
}

impl NodeTask {
    /// Produces the node's message, stamps its execution extension, and
    /// persists it. The message is saved only after the producer returns
    /// successfully and its schema checks out, so no partial artifacts are
    /// ever stored.
    async fn produce(self) -> NodeOutcome {
        let started = Instant::now();
        let produced = self.run_production().await;
        let duration_seconds = started.elapsed().as_secs_f64();

        let result = match produced {
            Ok(mut message) => {
                if message.schema != self.expected_schema {
                    Err(NodeError::SchemaViolation {
                        expected: self.expected_schema.clone(),
                        found: message.schema.clone(),
                    })
                } else {
                    message.extensions.execution = ExecutionContext {
                        status: ExecutionStatus::Success,
                        error: None,
                        duration_seconds: Some(duration_seconds),
                        origin: self.origin.clone(),
                        alias: self.alias.clone(),
                    };
                    match self
                        .store
                        .save_artifact(self.run_id, &self.id, &message)
                        .await
                    {
                        Ok(()) => Ok(message),
                        Err(error) => Err(NodeError::Store(error)),
                    }
                }
            }
            Err(error) => Err(error),
        };

        NodeOutcome {
            id: self.id.clone(),
            duration_seconds,
            result,
        }
    }

    async fn run_production(&self) -> Result<Message, NodeError> {
        match &self.production {
            TaskProduction::Source {
                connector,
                properties,
            } => {
                let producer = self
                    .registry
                    .resolve(ProducerKind::Connector, connector)
                    .ok_or_else(|| NodeError::ProducerNotFound {
                        kind: ProducerKind::Connector,
                        type_name: connector.clone(),
                    })?;
                let ctx = self.context(properties.clone());
                self.invoke(producer.produce(&ctx, &[])).await
            }
            TaskProduction::Process {
                processor,
                properties,
                inputs,
                merge,
            } => {
                let producer = self
                    .registry
                    .resolve(ProducerKind::Processor, processor)
                    .ok_or_else(|| NodeError::ProducerNotFound {
                        kind: ProducerKind::Processor,
                        type_name: processor.clone(),
                    })?;

                let mut loaded = Vec::with_capacity(inputs.len());
                for input in inputs {
                    match self.store.get_artifact(self.run_id, input).await {
                        Ok(message) => loaded.push(message),
                        Err(StoreError::ArtifactNotFound { .. }) => {
                            return Err(NodeError::UpstreamMissing(input.clone()));
                        }
                        Err(error) => return Err(NodeError::Store(error)),
                    }
                }

                let handed = match merge {
                    Some(MergeStrategy::Concatenate) if loaded.len() > 1 => {
                        vec![concatenate(&loaded)?]
                    }
                    _ => loaded,
                };

                let ctx = self.context(properties.clone());
                self.invoke(producer.produce(&ctx, &handed)).await
            }
            TaskProduction::Reuse { from_run, artifact } => {
                match self.store.get_artifact(*from_run, artifact).await {
                    Ok(message) => Ok(message),
                    Err(error) if error.is_not_found() => Err(NodeError::ReuseTargetMissing {
                        from_run: *from_run,
                        artifact: artifact.clone(),
                    }),
                    Err(error) => Err(NodeError::Store(error)),
                }
            }
        }
    }

    /// Awaits a producer while watching the cancellation signal.
    async fn invoke(
        &self,
        produce: impl Future<Output = Result<Message, crate::producer::ProducerError>>,
    ) -> Result<Message, NodeError> {
        tokio::select! {
            biased;

            () = self.cancellation.cancelled() => Err(NodeError::Cancelled),
            result = produce => result.map_err(|error| NodeError::Producer(error_chain(&error))),
        }
    }

    fn context(&self, properties: Properties) -> ProducerContext {
        ProducerContext {
            run_id: self.run_id,
            artifact_id: self.id.clone(),
            properties,
            cancellation: self.cancellation.clone(),
            costs: self.costs.clone(),
            sensitive_inputs: self.sensitive_inputs.clone(),
        }
    }
}

/// Renders an error and its source chain as `message: cause: cause`.
///
/// Recorded node errors are plain strings in the run result, so the chain
/// a producer attaches via `ProducerError::with_source` is flattened here
/// instead of being lost.
fn error_chain(error: &dyn std::error::Error) -> String {
    let mut text = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}

/// Concatenates same-schema inputs' content sequences into one message.
fn concatenate(inputs: &[Message]) -> Result<Message, NodeError> {
    let mut combined = Vec::new();
    for message in inputs {
        match &message.content {
            serde_json::Value::Array(items) => combined.extend(items.iter().cloned()),
            _ => return Err(NodeError::MergeShape),
        }
    }

    let schema = inputs
        .first()
        .map(|message| message.schema.clone())
        .expect("concatenate is only called with at least two inputs");

    Ok(Message::new(schema, serde_json::Value::Array(combined)))
}
