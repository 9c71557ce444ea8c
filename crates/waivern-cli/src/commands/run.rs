//! `waivern run` — execute a runbook.

use std::path::Path;
use std::sync::Arc;

use waivern_runtime::{Executor, Planner, ProducerRegistry};
use waivern_store::ArtifactStore;

use crate::{EXIT_PLAN_ERROR, TRACING_TARGET_COMMAND};

/// Plans and executes a runbook, printing the run result as JSON.
pub async fn execute(runbook: &Path, store: Arc<dyn ArtifactStore>) -> anyhow::Result<i32> {
    let registry = ProducerRegistry::with_builtins();

    let planner = Planner::new(&registry, store.as_ref());
    let plan = match planner.plan_file(runbook).await {
        Ok(plan) => plan,
        Err(error) => {
            tracing::error!(
                target: TRACING_TARGET_COMMAND,
                runbook = %runbook.display(),
                error = %error,
                "planning failed"
            );
            eprintln!("planning failed: {error}");
            return Ok(EXIT_PLAN_ERROR);
        }
    };

    let executor = Executor::new(store, Arc::new(registry));
    let result = executor.run(&plan).await?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(result.exit_code())
}
