//! Local subprocess executor

use async_trait::async_trait;
use chrono::Utc;
use command_group::{AsyncCommandGroup, AsyncGroupChild};
use conveyor_core::{CapturedOutput, Job, JobResult, JobState, Reason};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::JobExecutor;
use super::capture::{Captured, capture};
use super::termination::{kill_leftovers, terminate_group};
use crate::config::RunnerConfig;

/// How long output pipes may stay open after the job's process exits
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Runs each job as `<shell> -c <command>` in its own process group
pub struct ProcessExecutor {
    config: RunnerConfig,
}

enum Exit {
    Completed(ExitStatus),
    WaitFailed(std::io::Error),
    TimedOut(Duration),
    Cancelled,
}

impl ProcessExecutor {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    fn command(&self, pipeline: &str, job: &Job) -> Command {
        let mut cmd = Command::new(&self.config.shell);
        cmd.arg("-c")
            .arg(&job.command)
            .current_dir(&job.working_dir)
            .envs(&job.environment)
            .env("CONVEYOR_PIPELINE", pipeline)
            .env("CONVEYOR_STAGE", &job.stage)
            .env("CONVEYOR_JOB", &job.name)
            .env("CONVEYOR_SERVICES", job.services.join(","))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    fn spawn_capture<R>(&self, reader: R, stop: &CancellationToken) -> JoinHandle<Captured>
    where
        R: tokio::io::AsyncRead + Unpin + Send + 'static,
    {
        tokio::spawn(capture(reader, self.config.output_limit_bytes, stop.clone()))
    }

    async fn wait(
        &self,
        child: &mut AsyncGroupChild,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Exit {
        let deadline = async {
            match timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            status = child.wait() => match status {
                Ok(status) => Exit::Completed(status),
                Err(e) => Exit::WaitFailed(e),
            },
            _ = deadline => Exit::TimedOut(timeout.unwrap_or_default()),
            _ = cancel.cancelled() => Exit::Cancelled,
        }
    }
}

#[async_trait]
impl JobExecutor for ProcessExecutor {
    async fn execute(&self, pipeline: &str, job: &Job, cancel: &CancellationToken) -> JobResult {
        if cancel.is_cancelled() {
            return JobResult::skipped(job, Reason::Cancelled);
        }

        if !job.working_dir.is_dir() {
            warn!(stage = %job.stage, job = %job.name, "Working directory {} does not exist", job.working_dir.display());
            return JobResult::launch_failed(
                job,
                format!("working directory {} does not exist", job.working_dir.display()),
            );
        }

        let started_at = Utc::now();
        let start = Instant::now();

        let mut child = match self.command(pipeline, job).group_spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(stage = %job.stage, job = %job.name, "Failed to spawn job: {}", e);
                return JobResult::launch_failed(
                    job,
                    format!("failed to spawn {}: {}", self.config.shell.display(), e),
                );
            }
        };
        let pid = child.id();
        info!(stage = %job.stage, job = %job.name, pid, "Started job");

        let stop = CancellationToken::new();
        let (stdout, stderr) = match (child.inner().stdout.take(), child.inner().stderr.take()) {
            (Some(stdout), Some(stderr)) => (
                self.spawn_capture(stdout, &stop),
                self.spawn_capture(stderr, &stop),
            ),
            _ => {
                terminate_group(&mut child, pid, Duration::ZERO).await;
                return JobResult::launch_failed(job, "job output pipes were not available");
            }
        };

        let timeout = job.timeout.or(self.config.default_timeout);
        let exit = self.wait(&mut child, timeout, cancel).await;

        match &exit {
            Exit::TimedOut(after) => {
                warn!(stage = %job.stage, job = %job.name, "Job timed out after {:?}, terminating", after);
                terminate_group(&mut child, pid, self.config.kill_grace_period).await;
            }
            Exit::Cancelled => {
                info!(stage = %job.stage, job = %job.name, "Run cancelled, terminating job");
                terminate_group(&mut child, pid, self.config.kill_grace_period).await;
            }
            Exit::WaitFailed(_) => {
                terminate_group(&mut child, pid, Duration::ZERO).await;
            }
            Exit::Completed(_) => {
                // Background processes die with the job
                if let Some(pid) = pid {
                    kill_leftovers(pid);
                }
            }
        }

        let drain_stop = stop.clone();
        let drain_timer = tokio::spawn(async move {
            tokio::time::sleep(OUTPUT_DRAIN_TIMEOUT).await;
            drain_stop.cancel();
        });
        let stdout = stdout.await.unwrap_or_default();
        let stderr = stderr.await.unwrap_or_default();
        drain_timer.abort();

        if stop.is_cancelled() {
            warn!(stage = %job.stage, job = %job.name, "Output still open after job exited, killing leftover processes");
            if let Some(pid) = pid {
                kill_leftovers(pid);
            }
        }

        let output = CapturedOutput {
            truncated: stdout.truncated || stderr.truncated,
            stdout: stdout.into_string(),
            stderr: stderr.into_string(),
        };
        if output.truncated {
            debug!(stage = %job.stage, job = %job.name, limit = self.config.output_limit_bytes, "Job output truncated");
        }

        let (state, exit_code, reason) = match exit {
            Exit::Completed(status) => classify(status),
            Exit::WaitFailed(e) => (
                JobState::Failed,
                None,
                Some(Reason::LaunchFailed {
                    message: format!("failed to wait for process: {}", e),
                }),
            ),
            Exit::TimedOut(after) => (
                JobState::TimedOut,
                None,
                Some(Reason::TimedOut {
                    after_ms: after.as_millis() as u64,
                }),
            ),
            Exit::Cancelled => (JobState::Failed, None, Some(Reason::Cancelled)),
        };

        let duration = start.elapsed();
        info!(
            stage = %job.stage,
            job = %job.name,
            state = %state,
            duration_ms = duration.as_millis() as u64,
            "Finished job"
        );

        JobResult {
            stage: job.stage.clone(),
            job: job.name.clone(),
            allow_failure: job.allow_failure,
            state,
            exit_code,
            output,
            duration,
            started_at: Some(started_at),
            finished_at: Some(Utc::now()),
            reason,
        }
    }
}

fn classify(status: ExitStatus) -> (JobState, Option<i32>, Option<Reason>) {
    if status.success() {
        return (JobState::Succeeded, Some(0), None);
    }
    match status.code() {
        Some(code) => (JobState::Failed, Some(code), Some(Reason::ExitStatus { exit_code: code })),
        None => (JobState::Failed, None, Some(signal_reason(status))),
    }
}

#[cfg(unix)]
fn signal_reason(status: ExitStatus) -> Reason {
    use std::os::unix::process::ExitStatusExt;

    match status.signal() {
        Some(signal) => Reason::Signal { signal },
        None => Reason::ExitStatus { exit_code: -1 },
    }
}

#[cfg(not(unix))]
fn signal_reason(_status: ExitStatus) -> Reason {
    Reason::ExitStatus { exit_code: -1 }
}
