#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

mod commands;
mod config;

use std::process;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::{Cli, Command, RunsCommand};

// Tracing target constants
pub const TRACING_TARGET_STARTUP: &str = "waivern_cli::startup";
pub const TRACING_TARGET_COMMAND: &str = "waivern_cli::command";

/// Exit code for runs where a non-optional artifact failed.
pub const EXIT_FAILED: i32 = 2;

/// Exit code for planning errors; nothing was executed.
pub const EXIT_PLAN_ERROR: i32 = 3;

#[tokio::main]
async fn main() {
    let code = match run().await {
        Ok(code) => code,
        Err(error) => {
            if tracing::enabled!(tracing::Level::ERROR) {
                tracing::error!(
                    target: TRACING_TARGET_COMMAND,
                    error = %error,
                    "command failed"
                );
            } else {
                eprintln!("Error: {error:#}");
            }
            EXIT_FAILED
        }
    };

    process::exit(code);
}

/// Main application entry point.
async fn run() -> anyhow::Result<i32> {
    let cli = Cli::parse();

    init_tracing();
    log_startup_info(&cli);

    let store = cli.store.config()?.build();

    match cli.command {
        Command::Run { runbook } => commands::run::execute(&runbook, store).await,
        Command::Runs { command } => match command {
            RunsCommand::List => commands::runs::list(store).await,
            RunsCommand::Inspect { run_id } => commands::runs::inspect(store, run_id).await,
        },
    }
}

/// Initializes tracing with environment-based filtering.
///
/// Diagnostics go to stderr so stdout stays parseable JSON.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Logs startup information.
fn log_startup_info(cli: &Cli) {
    tracing::debug!(
        target: TRACING_TARGET_STARTUP,
        version = env!("CARGO_PKG_VERSION"),
        store_type = %cli.store.store_type,
        store_path = ?cli.store.store_path,
        "starting waivern"
    );
}
