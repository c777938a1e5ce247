//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod init;
mod run;
mod validate;

pub use init::InitArgs;
pub use run::RunArgs;
pub use validate::ValidateArgs;

use anyhow::Result;
use clap::Subcommand;
use std::process::ExitCode;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run a pipeline plan
    Run(RunArgs),
    /// Load and check a plan without running it
    Validate(ValidateArgs),
    /// Write a starter plan and Lua language-server files
    Init(InitArgs),
}

/// Routes the command to its handler
pub async fn handle_command(command: Commands) -> Result<ExitCode> {
    match command {
        Commands::Run(args) => run::handle_run(args).await,
        Commands::Validate(args) => validate::handle_validate(args),
        Commands::Init(args) => init::handle_init(args),
    }
}

/// Parses a `KEY=value` pair
pub(crate) fn parse_key_val(s: &str) -> Result<(String, String)> {
    let pos = s
        .find('=')
        .ok_or_else(|| anyhow::anyhow!("invalid KEY=value: no `=` found in `{}`", s))?;
    let key = s[..pos].trim();
    if key.is_empty() {
        anyhow::bail!("invalid KEY=value: empty key in `{}`", s);
    }
    Ok((key.to_string(), s[pos + 1..].to_string()))
}
