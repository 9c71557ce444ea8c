//! DAG execution engine.
//!
//! The executor drives an [`ExecutionPlan`](crate::plan::ExecutionPlan) to
//! completion: artifacts are produced in dependency order with bounded
//! concurrency, every produced message is persisted before dependents may
//! read it, and the run always finishes with a well-formed [`RunResult`]
//! accounting for every node.

mod cost;
mod executor;
mod result;
mod signal;

pub use cost::CostTracker;
pub use executor::Executor;
pub use result::{ArtifactResult, RunResult};
pub use signal::{StopCause, StopSignal};
