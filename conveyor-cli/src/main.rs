//! Conveyor CLI
//!
//! Loads a pipeline plan, runs its stages locally and reports the result.

mod commands;
mod config;

use clap::Parser;
use colored::*;
use commands::{Commands, handle_command};
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_LOG_FILTER: &str = "conveyor=info,conveyor_cli=info,conveyor_runner=info,conveyor_lua=info";

#[derive(Parser)]
#[command(name = "conveyor", version)]
#[command(about = "Run CI pipelines on the local machine", long_about = None)]
struct Cli {
    /// Show debug logs (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match handle_command(cli.command).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

/// Logs go to stderr so stdout only carries the report
fn init_tracing(verbose: bool) {
    let default = if verbose {
        DEFAULT_LOG_FILTER.replace("=info", "=debug")
    } else {
        DEFAULT_LOG_FILTER.to_string()
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();
}
