//! Run reporting
//!
//! Turns a [`PipelineResult`] into a [`RunSummary`] (optionally persisting
//! each job's output first) and renders it for humans.

use colored::*;
use conveyor_core::dto::{JobSummary, RunSummary};
use conveyor_core::{JobResult, JobState, PipelineResult, StageStatus, Verdict};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Lines of output shown for each failed job
pub const DEFAULT_TAIL_LINES: usize = 20;

#[derive(Debug, Clone)]
pub struct Reporter {
    log_dir: Option<PathBuf>,
}

impl Reporter {
    pub fn new() -> Self {
        Self { log_dir: None }
    }

    /// Persists job output under `dir/<stage>/<job>.log`
    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    /// Builds the summary of a run
    ///
    /// With a log directory, every job that ran gets its output written to
    /// disk and `output_ref` points at that file. A file that cannot be
    /// written is logged and left without a reference.
    pub fn summarize(&self, result: &PipelineResult) -> RunSummary {
        let mut summary = RunSummary::from(result);

        if let Some(dir) = &self.log_dir {
            for job in result.jobs().filter(|job| job.state != JobState::Skipped) {
                match write_job_log(dir, job) {
                    Ok(path) => {
                        if let Some(entry) = summary.job_mut(&job.stage, &job.job) {
                            entry.output_ref = Some(path.display().to_string());
                        }
                    }
                    Err(e) => warn!(stage = %job.stage, job = %job.job, "Failed to write job log: {}", e),
                }
            }
        }

        summary
    }

    /// Human-readable report: one block per stage, output tails of failed
    /// jobs, and the verdict
    pub fn render(&self, result: &PipelineResult, summary: &RunSummary) -> String {
        let mut out = String::new();

        let _ = writeln!(
            out,
            "{} {} {}",
            "Pipeline".bold(),
            summary.pipeline.cyan().bold(),
            format!("(run {})", summary.run_id).dimmed()
        );

        for stage in &summary.stages {
            let _ = writeln!(out);
            let _ = writeln!(
                out,
                "{} {} {}",
                "▸".cyan(),
                stage.stage.bold(),
                colorize_stage(stage.status)
            );

            for job in summary.jobs.iter().filter(|job| job.stage == stage.stage) {
                let _ = writeln!(out, "  {}", job_line(job));

                if let Some(output) = result.job(&job.stage, &job.job).filter(|r| shows_tail(r)) {
                    for line in output.output.tail(DEFAULT_TAIL_LINES) {
                        let _ = writeln!(out, "      {} {}", "│".dimmed(), line);
                    }
                    if output.output.truncated {
                        let _ = writeln!(out, "      {}", "(output truncated)".dimmed());
                    }
                }

                if let Some(path) = &job.output_ref {
                    let _ = writeln!(out, "      {} {}", "log:".dimmed(), path.dimmed());
                }
            }
        }

        let _ = writeln!(out);
        let verdict = match summary.verdict {
            Verdict::Succeeded => "✓ Succeeded".green().bold(),
            Verdict::Failed => "✗ Failed".red().bold(),
        };
        let cancelled = if summary.cancelled {
            format!(" {}", "(cancelled)".yellow())
        } else {
            String::new()
        };
        let _ = writeln!(
            out,
            "{}{} {}",
            verdict,
            cancelled,
            format!(
                "{} succeeded, {} failed, {} timed out, {} skipped in {}",
                result.count(JobState::Succeeded),
                result.count(JobState::Failed),
                result.count(JobState::TimedOut),
                result.count(JobState::Skipped),
                format_duration(Duration::from_millis(summary.duration_ms))
            )
            .dimmed()
        );

        out
    }
}

impl Default for Reporter {
    fn default() -> Self {
        Self::new()
    }
}

fn shows_tail(result: &JobResult) -> bool {
    matches!(result.state, JobState::Failed | JobState::TimedOut) && !result.output.is_empty()
}

fn job_line(job: &JobSummary) -> String {
    let symbol = match (job.state, job.allow_failure) {
        (JobState::Succeeded, _) => "✓".green(),
        (JobState::Skipped, _) => "○".dimmed(),
        (_, true) => "!".yellow(),
        (_, false) => "✗".red(),
    };

    let mut line = format!("{} {}", symbol, job.job);
    if job.state != JobState::Skipped {
        line.push_str(&format!(" {}", format_duration(Duration::from_millis(job.duration_ms)).dimmed()));
    }
    if job.state != JobState::Succeeded {
        line.push_str(&format!(" {}", colorize_state(job.state)));
    }
    if let Some(reason) = &job.reason {
        line.push_str(&format!(" {}", format!("({})", reason).dimmed()));
    }
    if job.allow_failure && job.state != JobState::Succeeded && job.state != JobState::Skipped {
        line.push_str(&format!(" {}", "[allowed to fail]".yellow()));
    }
    line
}

fn colorize_state(state: JobState) -> ColoredString {
    match state {
        JobState::Succeeded => state.as_str().green(),
        JobState::Failed => state.as_str().red(),
        JobState::TimedOut => state.as_str().red(),
        JobState::Skipped => state.as_str().dimmed(),
    }
}

fn colorize_stage(status: StageStatus) -> ColoredString {
    let text = status.to_string();
    match status {
        StageStatus::Succeeded => text.green(),
        StageStatus::Failed => text.red(),
        StageStatus::Skipped => text.dimmed(),
    }
}

/// `850ms`, `4.2s` or `3m 07s`
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis < 1000 {
        format!("{}ms", millis)
    } else if millis < 60_000 {
        format!("{:.1}s", duration.as_secs_f64())
    } else {
        let secs = duration.as_secs();
        format!("{}m {:02}s", secs / 60, secs % 60)
    }
}

fn write_job_log(dir: &Path, job: &JobResult) -> std::io::Result<PathBuf> {
    let stage_dir = dir.join(&job.stage);
    std::fs::create_dir_all(&stage_dir)?;

    let path = stage_dir.join(format!("{}.log", job.job));
    let mut contents = String::new();
    contents.push_str(&job.output.stdout);
    if !job.output.stderr.is_empty() {
        if !contents.is_empty() && !contents.ends_with('\n') {
            contents.push('\n');
        }
        contents.push_str("--- stderr ---\n");
        contents.push_str(&job.output.stderr);
    }
    if job.output.truncated {
        if !contents.ends_with('\n') {
            contents.push('\n');
        }
        contents.push_str("--- output truncated ---\n");
    }

    std::fs::write(&path, contents)?;
    debug!(path = %path.display(), "Wrote job log");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use conveyor_core::{CapturedOutput, Job, Reason, Stage, StageResult};
    use tempfile::TempDir;
    use uuid::Uuid;

    fn ran(stage: &str, name: &str, state: JobState, stdout: &str) -> JobResult {
        let job = Job::new(stage, name, "true");
        let mut result = JobResult::launch_failed(&job, "unused");
        result.state = state;
        result.reason = match state {
            JobState::Failed => Some(Reason::ExitStatus { exit_code: 1 }),
            _ => None,
        };
        result.exit_code = Some(if state == JobState::Succeeded { 0 } else { 1 });
        result.output = CapturedOutput {
            stdout: stdout.to_string(),
            stderr: String::new(),
            truncated: false,
        };
        result.duration = Duration::from_millis(1200);
        result
    }

    fn failed_lint_run() -> PipelineResult {
        let test = Stage::new("test", vec![Job::new("test", "unit-test", "cargo test")]);
        let now = Utc::now();
        PipelineResult {
            run_id: Uuid::new_v4(),
            pipeline: "ci".to_string(),
            started_at: now,
            finished_at: now,
            cancelled: false,
            stages: vec![
                StageResult::new(
                    "lint",
                    vec![ran("lint", "style-check", JobState::Failed, "src/main.rs: bad indent\n")],
                ),
                StageResult::skipped(
                    &test,
                    Reason::UpstreamFailed {
                        stage: "lint".to_string(),
                    },
                ),
            ],
        }
    }

    #[test]
    fn test_summary_without_log_dir() {
        let result = failed_lint_run();
        let summary = Reporter::new().summarize(&result);

        assert_eq!(summary.verdict, Verdict::Failed);
        assert_eq!(summary.jobs.len(), 2);
        assert!(summary.jobs.iter().all(|job| job.output_ref.is_none()));
    }

    #[test]
    fn test_logs_written_for_jobs_that_ran() {
        let dir = TempDir::new().unwrap();
        let result = failed_lint_run();
        let summary = Reporter::new().with_log_dir(dir.path()).summarize(&result);

        let log = dir.path().join("lint").join("style-check.log");
        assert_eq!(summary.jobs[0].output_ref.as_deref(), Some(log.display().to_string().as_str()));
        assert_eq!(std::fs::read_to_string(&log).unwrap(), "src/main.rs: bad indent\n");

        assert!(summary.jobs[1].output_ref.is_none());
        assert!(!dir.path().join("test").exists());
    }

    #[test]
    fn test_render_lists_every_job_and_tail() {
        let result = failed_lint_run();
        let reporter = Reporter::new();
        let summary = reporter.summarize(&result);
        let text = reporter.render(&result, &summary);

        assert!(text.contains("style-check"));
        assert!(text.contains("unit-test"));
        assert!(text.contains("src/main.rs: bad indent"));
        assert!(text.contains("stage 'lint' failed"));
        assert!(text.contains("Failed"));

        let lint = text.find("style-check").unwrap();
        let test = text.find("unit-test").unwrap();
        assert!(lint < test);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(850)), "850ms");
        assert_eq!(format_duration(Duration::from_millis(4200)), "4.2s");
        assert_eq!(format_duration(Duration::from_secs(187)), "3m 07s");
    }
}
