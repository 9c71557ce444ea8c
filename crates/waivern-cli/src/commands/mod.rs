//! Command implementations.
//!
//! Every command returns the process exit code; operational failures that
//! should abort with a generic error bubble up as `anyhow` errors instead.

pub mod run;
pub mod runs;
