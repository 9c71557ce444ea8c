//! `waivern runs` — inspect persisted runs.

use std::sync::Arc;

use serde_json::json;
use waivern_core::RunId;
use waivern_store::{ArtifactStore, StoreError};

use crate::EXIT_FAILED;

/// Lists every run the store knows about, as a JSON array.
pub async fn list(store: Arc<dyn ArtifactStore>) -> anyhow::Result<i32> {
    let mut run_ids = store.list_runs().await?;
    run_ids.sort();

    let mut runs = Vec::with_capacity(run_ids.len());
    for run_id in run_ids {
        // Metadata can be absent for runs written by older versions or
        // interrupted before their first metadata write.
        let entry = match store.load_run_metadata(run_id).await {
            Ok(metadata) => json!({
                "run_id": run_id,
                "runbook_name": metadata.runbook_name,
                "status": metadata.status,
                "started_at": metadata.started_at,
            }),
            Err(StoreError::RunNotFound(_)) => json!({ "run_id": run_id }),
            Err(error) => return Err(error.into()),
        };
        runs.push(entry);
    }

    println!("{}", serde_json::to_string_pretty(&runs)?);
    Ok(0)
}

/// Dumps metadata, execution state, and artifact ids for one run.
pub async fn inspect(store: Arc<dyn ArtifactStore>, run_id: RunId) -> anyhow::Result<i32> {
    let metadata = match store.load_run_metadata(run_id).await {
        Ok(metadata) => metadata,
        Err(StoreError::RunNotFound(_)) => {
            eprintln!("run {run_id} not found");
            return Ok(EXIT_FAILED);
        }
        Err(error) => return Err(error.into()),
    };

    let state = match store.load_execution_state(run_id).await {
        Ok(state) => Some(state),
        Err(StoreError::RunNotFound(_)) => None,
        Err(error) => return Err(error.into()),
    };

    let mut artifacts = store.list_artifacts(run_id).await?;
    artifacts.sort();

    let report = json!({
        "metadata": metadata,
        "state": state,
        "artifacts": artifacts,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(0)
}
