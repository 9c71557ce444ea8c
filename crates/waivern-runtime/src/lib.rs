#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

pub mod definition;
pub mod engine;
pub mod plan;
pub mod producer;

mod error;

#[doc(hidden)]
pub mod prelude;

pub use engine::{ArtifactResult, CostTracker, Executor, RunResult, StopCause, StopSignal};
pub use error::{ExecuteError, ExecuteResult, PlanError, PlanResult};
pub use plan::{ExecutionGraph, ExecutionPlan, Planner, ResolvedSchemas};
pub use producer::{
    InputCapability, Producer, ProducerContext, ProducerError, ProducerKind, ProducerRegistry,
};

/// Tracing target for runtime operations.
pub const TRACING_TARGET: &str = "waivern_runtime";
