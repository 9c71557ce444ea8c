//! Commonly used items from waivern-runtime.

pub use crate::definition::Runbook;
pub use crate::engine::{Executor, RunResult};
pub use crate::error::{ExecuteError, PlanError};
pub use crate::plan::{ExecutionPlan, Planner};
pub use crate::producer::{Producer, ProducerKind, ProducerRegistry};
