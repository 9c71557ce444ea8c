//! Command-line configuration.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use waivern_core::RunId;
use waivern_store::{ENV_STORE_PATH, ENV_STORE_TYPE, StoreConfig, StoreResult};

/// Compliance analysis orchestrator.
#[derive(Debug, Parser)]
#[command(name = "waivern", version, about)]
pub struct Cli {
    /// Store backend options.
    #[command(flatten)]
    pub store: StoreOptions,

    /// The command to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// Artifact store selection.
#[derive(Debug, Args)]
pub struct StoreOptions {
    /// Store backend: `memory` or `filesystem`.
    #[arg(long, env = ENV_STORE_TYPE, default_value = "filesystem", global = true)]
    pub store_type: String,

    /// Base directory of the filesystem store.
    #[arg(long, env = ENV_STORE_PATH, global = true)]
    pub store_path: Option<PathBuf>,
}

impl StoreOptions {
    /// Builds the store configuration from the flags.
    pub fn config(&self) -> StoreResult<StoreConfig> {
        StoreConfig::from_parts(&self.store_type, self.store_path.clone())
    }
}

/// Top-level commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Execute a runbook and print the run result as JSON.
    Run {
        /// Path of the runbook YAML file.
        runbook: PathBuf,
    },

    /// Inspect persisted runs.
    Runs {
        /// The runs subcommand.
        #[command(subcommand)]
        command: RunsCommand,
    },
}

/// Subcommands under `runs`.
#[derive(Debug, Subcommand)]
pub enum RunsCommand {
    /// Enumerate every run the store knows about.
    List,

    /// Dump metadata, execution state, and artifact ids for one run.
    Inspect {
        /// The run to inspect.
        run_id: RunId,
    },
}
