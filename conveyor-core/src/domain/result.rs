//! Run result domain types
//!
//! Results are created while a plan runs and are owned by that run. Each
//! [`JobResult`] is final once produced; stage and pipeline results only
//! aggregate them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use super::plan::{Job, Stage};

/// Terminal state of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobState {
    Succeeded,
    Failed,
    TimedOut,
    Skipped,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
            JobState::TimedOut => "timed out",
            JobState::Skipped => "skipped",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a job ended up in a non-successful state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum Reason {
    /// Process exited with a nonzero status
    ExitStatus { exit_code: i32 },
    /// Process was terminated by a signal it did not expect
    Signal { signal: i32 },
    /// Process group was killed after exceeding the job timeout
    TimedOut { after_ms: u64 },
    /// The process could not be started at all
    LaunchFailed { message: String },
    /// Run was cancelled; the job was aborted or never started
    Cancelled,
    /// An earlier stage failed so the job never started
    UpstreamFailed { stage: String },
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reason::ExitStatus { exit_code } => write!(f, "exit code {}", exit_code),
            Reason::Signal { signal } => write!(f, "killed by signal {}", signal),
            Reason::TimedOut { after_ms } => {
                write!(f, "timed out after {:.1}s", *after_ms as f64 / 1000.0)
            }
            Reason::LaunchFailed { message } => write!(f, "failed to launch: {}", message),
            Reason::Cancelled => f.write_str("cancelled"),
            Reason::UpstreamFailed { stage } => write!(f, "stage '{}' failed", stage),
        }
    }
}

/// Captured process output
///
/// `truncated` is set when either stream exceeded the executor's size cap
/// and the remainder was discarded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
    pub truncated: bool,
}

impl CapturedOutput {
    pub fn is_empty(&self) -> bool {
        self.stdout.is_empty() && self.stderr.is_empty()
    }

    /// Last `lines` lines of stdout followed by stderr
    pub fn tail(&self, lines: usize) -> Vec<&str> {
        let all: Vec<&str> = self.stdout.lines().chain(self.stderr.lines()).collect();
        let start = all.len().saturating_sub(lines);
        all[start..].to_vec()
    }
}

/// Outcome of one job in one run
#[derive(Debug, Clone, PartialEq)]
pub struct JobResult {
    pub stage: String,
    pub job: String,
    pub allow_failure: bool,
    pub state: JobState,
    pub exit_code: Option<i32>,
    pub output: CapturedOutput,
    pub duration: Duration,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub reason: Option<Reason>,
}

impl JobResult {
    /// A job that never started
    pub fn skipped(job: &Job, reason: Reason) -> Self {
        Self {
            stage: job.stage.clone(),
            job: job.name.clone(),
            allow_failure: job.allow_failure,
            state: JobState::Skipped,
            exit_code: None,
            output: CapturedOutput::default(),
            duration: Duration::ZERO,
            started_at: None,
            finished_at: None,
            reason: Some(reason),
        }
    }

    /// A job whose process could not be launched
    pub fn launch_failed(job: &Job, message: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            stage: job.stage.clone(),
            job: job.name.clone(),
            allow_failure: job.allow_failure,
            state: JobState::Failed,
            exit_code: None,
            output: CapturedOutput::default(),
            duration: Duration::ZERO,
            started_at: Some(now),
            finished_at: Some(now),
            reason: Some(Reason::LaunchFailed {
                message: message.into(),
            }),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.state == JobState::Succeeded
    }

    /// Whether this result fails its stage under the allow-failure policy
    pub fn blocks_stage(&self) -> bool {
        !self.allow_failure && !self.succeeded()
    }
}

/// Aggregate status of a stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageStatus {
    Succeeded,
    Failed,
    Skipped,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StageStatus::Succeeded => "succeeded",
            StageStatus::Failed => "failed",
            StageStatus::Skipped => "skipped",
        })
    }
}

/// Job results of one stage, in declared job order
#[derive(Debug, Clone, PartialEq)]
pub struct StageResult {
    pub name: String,
    pub jobs: Vec<JobResult>,
}

impl StageResult {
    pub fn new(name: impl Into<String>, jobs: Vec<JobResult>) -> Self {
        Self {
            name: name.into(),
            jobs,
        }
    }

    /// Marks every job of `stage` as skipped
    pub fn skipped(stage: &Stage, reason: Reason) -> Self {
        Self {
            name: stage.name.clone(),
            jobs: stage
                .jobs
                .iter()
                .map(|job| JobResult::skipped(job, reason.clone()))
                .collect(),
        }
    }

    /// `Skipped` when no job ran, `Failed` when any job without
    /// `allow_failure` did not succeed, otherwise `Succeeded`
    pub fn status(&self) -> StageStatus {
        if self.jobs.iter().all(|job| job.state == JobState::Skipped) {
            StageStatus::Skipped
        } else if self.jobs.iter().any(JobResult::blocks_stage) {
            StageStatus::Failed
        } else {
            StageStatus::Succeeded
        }
    }

    pub fn passed(&self) -> bool {
        self.status() == StageStatus::Succeeded
    }
}

/// Final outcome of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Succeeded,
    Failed,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Verdict::Succeeded => "Succeeded",
            Verdict::Failed => "Failed",
        })
    }
}

/// Results of one run, stages in declared order
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineResult {
    pub run_id: Uuid,
    pub pipeline: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Whether the run's cancellation token fired
    pub cancelled: bool,
    pub stages: Vec<StageResult>,
}

impl PipelineResult {
    /// `Failed` if the run was cancelled or any stage did not succeed
    pub fn verdict(&self) -> Verdict {
        if !self.cancelled && self.stages.iter().all(StageResult::passed) {
            Verdict::Succeeded
        } else {
            Verdict::Failed
        }
    }

    /// All job results in stage order, then declared job order
    pub fn jobs(&self) -> impl Iterator<Item = &JobResult> {
        self.stages.iter().flat_map(|stage| stage.jobs.iter())
    }

    pub fn count(&self, state: JobState) -> usize {
        self.jobs().filter(|job| job.state == state).count()
    }

    pub fn duration(&self) -> Duration {
        (self.finished_at - self.started_at)
            .to_std()
            .unwrap_or_default()
    }

    pub fn job(&self, stage: &str, job: &str) -> Option<&JobResult> {
        self.jobs().find(|result| result.stage == stage && result.job == job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(stage: &str, name: &str, state: JobState, allow_failure: bool) -> JobResult {
        let job = Job::new(stage, name, "true").with_allow_failure(allow_failure);
        let mut result = JobResult::skipped(&job, Reason::Cancelled);
        result.state = state;
        result.reason = None;
        result
    }

    fn pipeline(stages: Vec<StageResult>) -> PipelineResult {
        let now = Utc::now();
        PipelineResult {
            run_id: Uuid::new_v4(),
            pipeline: "ci".to_string(),
            started_at: now,
            finished_at: now,
            cancelled: false,
            stages,
        }
    }

    #[test]
    fn test_stage_fails_on_required_job_failure() {
        let stage = StageResult::new(
            "lint",
            vec![
                result("lint", "style-check", JobState::Failed, false),
                result("lint", "clippy", JobState::Succeeded, false),
            ],
        );
        assert_eq!(stage.status(), StageStatus::Failed);
    }

    #[test]
    fn test_allowed_failure_does_not_fail_stage() {
        let stage = StageResult::new(
            "lint",
            vec![
                result("lint", "audit", JobState::Failed, true),
                result("lint", "clippy", JobState::Succeeded, false),
            ],
        );
        assert_eq!(stage.status(), StageStatus::Succeeded);
    }

    #[test]
    fn test_timeout_fails_stage_like_failure() {
        let stage = StageResult::new(
            "test",
            vec![result("test", "slow", JobState::TimedOut, false)],
        );
        assert_eq!(stage.status(), StageStatus::Failed);

        let tolerated = StageResult::new(
            "test",
            vec![
                result("test", "slow", JobState::TimedOut, true),
                result("test", "fast", JobState::Succeeded, false),
            ],
        );
        assert_eq!(tolerated.status(), StageStatus::Succeeded);
    }

    #[test]
    fn test_fully_skipped_stage() {
        let stage = Stage::new("deploy", vec![Job::new("deploy", "ship", "true")]);
        let result = StageResult::skipped(
            &stage,
            Reason::UpstreamFailed {
                stage: "test".to_string(),
            },
        );
        assert_eq!(result.status(), StageStatus::Skipped);
        assert_eq!(result.jobs[0].state, JobState::Skipped);
        assert_eq!(result.jobs[0].duration, Duration::ZERO);
    }

    #[test]
    fn test_verdict() {
        let ok = pipeline(vec![StageResult::new(
            "test",
            vec![result("test", "unit", JobState::Succeeded, false)],
        )]);
        assert_eq!(ok.verdict(), Verdict::Succeeded);

        let failed = pipeline(vec![
            StageResult::new(
                "lint",
                vec![result("lint", "style-check", JobState::Failed, false)],
            ),
            StageResult::new(
                "test",
                vec![result("test", "unit-test", JobState::Skipped, false)],
            ),
        ]);
        assert_eq!(failed.verdict(), Verdict::Failed);
        assert_eq!(failed.count(JobState::Skipped), 1);
        assert!(failed.job("test", "unit-test").is_some());

        let mut cancelled = ok.clone();
        cancelled.cancelled = true;
        assert_eq!(cancelled.verdict(), Verdict::Failed);
    }

    #[test]
    fn test_output_tail() {
        let output = CapturedOutput {
            stdout: "one\ntwo\nthree\n".to_string(),
            stderr: "boom\n".to_string(),
            truncated: false,
        };
        assert_eq!(output.tail(2), vec!["three", "boom"]);
        assert_eq!(output.tail(10).len(), 4);
    }

    #[test]
    fn test_reason_display() {
        assert_eq!(Reason::ExitStatus { exit_code: 1 }.to_string(), "exit code 1");
        assert_eq!(
            Reason::TimedOut { after_ms: 1500 }.to_string(),
            "timed out after 1.5s"
        );
        assert_eq!(
            Reason::UpstreamFailed {
                stage: "lint".to_string()
            }
            .to_string(),
            "stage 'lint' failed"
        );
    }
}
