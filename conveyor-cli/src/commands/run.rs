//! `conveyor run`

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use conveyor_core::Verdict;
use conveyor_lua::Loader;
use conveyor_runner::{ProcessExecutor, Reporter, StageScheduler};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::parse_key_val;
use crate::config::{Overrides, runner_config};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Args)]
pub struct RunArgs {
    /// Plan file (.lua or .json)
    pub plan: PathBuf,

    /// Cancel the run on SIGINT/SIGTERM and still print the report
    #[arg(long)]
    pub cancel_on_signal: bool,

    /// Report format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text, env = "CONVEYOR_FORMAT")]
    pub format: OutputFormat,

    /// Write each job's output to <DIR>/<stage>/<job>.log
    #[arg(long, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    /// Variable visible to the plan script (repeatable)
    #[arg(long = "var", value_name = "KEY=VALUE", value_parser = parse_key_val)]
    pub vars: Vec<(String, String)>,

    /// Shell used to run job commands
    #[arg(long)]
    pub shell: Option<PathBuf>,

    /// Timeout in seconds for jobs that do not declare one
    #[arg(long, value_name = "SECS")]
    pub default_timeout: Option<u64>,

    /// Bytes of output kept per stream
    #[arg(long, value_name = "BYTES")]
    pub output_limit: Option<usize>,

    /// Maximum number of jobs running at once
    #[arg(short, long, value_name = "N")]
    pub jobs: Option<usize>,
}

impl RunArgs {
    fn overrides(&self) -> Overrides {
        Overrides {
            shell: self.shell.clone(),
            default_timeout: self.default_timeout,
            output_limit: self.output_limit,
            log_dir: self.log_dir.clone(),
            max_parallel_jobs: self.jobs,
        }
    }
}

pub async fn handle_run(args: RunArgs) -> Result<ExitCode> {
    let config = runner_config(&args.overrides())?;

    let plan = Loader::new()
        .with_variables(args.vars.iter().cloned())
        .load_file(&args.plan)
        .with_context(|| format!("Failed to load plan {}", args.plan.display()))?;

    let executor = Arc::new(ProcessExecutor::new(config.clone()));
    let scheduler = StageScheduler::new(executor).with_max_parallel_jobs(config.max_parallel_jobs);

    let signal_listener = args
        .cancel_on_signal
        .then(|| spawn_signal_listener(scheduler.cancellation_token()));

    let result = scheduler.run(&plan).await;

    if let Some(listener) = signal_listener {
        listener.abort();
    }

    let mut reporter = Reporter::new();
    if let Some(dir) = &config.log_dir {
        reporter = reporter.with_log_dir(dir);
    }
    let summary = reporter.summarize(&result);

    match args.format {
        OutputFormat::Text => print!("{}", reporter.render(&result, &summary)),
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("Failed to serialize run summary")?
        ),
    }

    Ok(match summary.verdict {
        Verdict::Succeeded => ExitCode::SUCCESS,
        Verdict::Failed => ExitCode::FAILURE,
    })
}

fn spawn_signal_listener(token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        shutdown_signal().await;
        warn!("Received shutdown signal, cancelling run");
        token.cancel();
    })
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        Err(e) => {
            info!("SIGTERM handling unavailable: {}", e);
            ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    ctrl_c().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tempfile::TempDir;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        run: RunArgs,
    }

    #[test]
    fn test_run_flags() {
        let cli = TestCli::try_parse_from([
            "conveyor",
            "ci.lua",
            "--var",
            "TARGET=x86_64",
            "--var",
            "PROFILE=release",
            "--format",
            "json",
            "--default-timeout",
            "600",
            "-j",
            "2",
        ])
        .unwrap();

        assert_eq!(cli.run.plan, PathBuf::from("ci.lua"));
        assert_eq!(cli.run.vars.len(), 2);
        assert_eq!(cli.run.vars[1], ("PROFILE".to_string(), "release".to_string()));
        assert_eq!(cli.run.format, OutputFormat::Json);
        assert!(!cli.run.cancel_on_signal);

        let overrides = cli.run.overrides();
        assert_eq!(overrides.default_timeout, Some(600));
        assert_eq!(overrides.max_parallel_jobs, Some(2));
    }

    fn plan_args(dir: &TempDir, source: &str) -> RunArgs {
        let path = dir.path().join("pipeline.lua");
        std::fs::write(&path, source).unwrap();
        TestCli::try_parse_from(["conveyor", path.to_str().unwrap(), "--shell", "/bin/sh"])
            .unwrap()
            .run
    }

    #[tokio::test]
    async fn test_passing_plan_exits_successfully() {
        let dir = TempDir::new().unwrap();
        let args = plan_args(
            &dir,
            r#"return { stages = { "build" }, jobs = { { name = "compile", stage = "build", command = "true" } } }"#,
        );

        assert_eq!(handle_run(args).await.unwrap(), ExitCode::SUCCESS);
    }

    #[tokio::test]
    async fn test_failed_lint_exits_with_failure() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("tests-ran");
        let source = format!(
            r#"
            return {{
                stages = {{ "lint", "test" }},
                jobs = {{
                    {{ name = "style-check", stage = "lint", command = "exit 1" }},
                    {{ name = "unit-test", stage = "test", command = "touch {}" }},
                }},
            }}
            "#,
            marker.display()
        );

        assert_eq!(handle_run(plan_args(&dir, &source)).await.unwrap(), ExitCode::FAILURE);
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_invalid_plan_is_an_error() {
        let dir = TempDir::new().unwrap();
        let args = plan_args(
            &dir,
            r#"return { stages = { "build" }, jobs = { { name = "compile", stage = "deploy", command = "true" } } }"#,
        );

        assert!(handle_run(args).await.is_err());
    }

    #[test]
    fn test_malformed_var_rejected() {
        assert!(TestCli::try_parse_from(["conveyor", "ci.lua", "--var", "oops"]).is_err());
    }
}
