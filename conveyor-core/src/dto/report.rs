//! Run summary DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::result::{JobResult, JobState, PipelineResult, Reason, StageStatus, Verdict};

/// Machine-readable summary of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub pipeline: String,
    pub verdict: Verdict,
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub stages: Vec<StageSummary>,
    /// Every job in stage order, then declared job order, skipped ones included
    pub jobs: Vec<JobSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageSummary {
    pub stage: String,
    pub status: StageStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSummary {
    pub stage: String,
    pub job: String,
    pub state: JobState,
    pub duration_ms: u64,
    /// Where the captured output was persisted, if it was
    pub output_ref: Option<String>,
    pub truncated: bool,
    pub exit_code: Option<i32>,
    pub allow_failure: bool,
    pub reason: Option<Reason>,
}

impl From<&JobResult> for JobSummary {
    fn from(result: &JobResult) -> Self {
        Self {
            stage: result.stage.clone(),
            job: result.job.clone(),
            state: result.state,
            duration_ms: result.duration.as_millis() as u64,
            output_ref: None,
            truncated: result.output.truncated,
            exit_code: result.exit_code,
            allow_failure: result.allow_failure,
            reason: result.reason.clone(),
        }
    }
}

impl From<&PipelineResult> for RunSummary {
    fn from(result: &PipelineResult) -> Self {
        Self {
            run_id: result.run_id,
            pipeline: result.pipeline.clone(),
            verdict: result.verdict(),
            cancelled: result.cancelled,
            started_at: result.started_at,
            finished_at: result.finished_at,
            duration_ms: result.duration().as_millis() as u64,
            stages: result
                .stages
                .iter()
                .map(|stage| StageSummary {
                    stage: stage.name.clone(),
                    status: stage.status(),
                })
                .collect(),
            jobs: result.jobs().map(JobSummary::from).collect(),
        }
    }
}

impl RunSummary {
    pub fn job_mut(&mut self, stage: &str, job: &str) -> Option<&mut JobSummary> {
        self.jobs
            .iter_mut()
            .find(|summary| summary.stage == stage && summary.job == job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::plan::{Job, Stage};
    use crate::domain::result::StageResult;

    #[test]
    fn test_summary_keeps_order_and_skipped_jobs() {
        let lint = Job::new("lint", "style-check", "exit 1");
        let mut failed = JobResult::launch_failed(&lint, "ignored");
        failed.reason = Some(Reason::ExitStatus { exit_code: 1 });
        failed.exit_code = Some(1);

        let test_stage = Stage::new("test", vec![Job::new("test", "unit-test", "true")]);
        let now = Utc::now();
        let result = PipelineResult {
            run_id: Uuid::new_v4(),
            pipeline: "ci".to_string(),
            started_at: now,
            finished_at: now,
            cancelled: false,
            stages: vec![
                StageResult::new("lint", vec![failed]),
                StageResult::skipped(
                    &test_stage,
                    Reason::UpstreamFailed {
                        stage: "lint".to_string(),
                    },
                ),
            ],
        };

        let summary = RunSummary::from(&result);
        assert_eq!(summary.verdict, Verdict::Failed);
        assert_eq!(summary.jobs.len(), 2);
        assert_eq!(summary.jobs[0].job, "style-check");
        assert_eq!(summary.jobs[1].job, "unit-test");
        assert_eq!(summary.jobs[1].state, JobState::Skipped);
        assert_eq!(summary.stages[1].status, StageStatus::Skipped);

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["verdict"], "Failed");
        assert_eq!(json["jobs"][0]["reason"]["code"], "exit_status");
        assert_eq!(json["jobs"][0]["reason"]["exit_code"], 1);
        assert_eq!(json["jobs"][1]["reason"]["stage"], "lint");
        assert!(json["jobs"][1]["output_ref"].is_null());
    }
}
