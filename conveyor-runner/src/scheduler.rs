//! Stage scheduler
//!
//! Runs a plan's stages strictly in declared order. All jobs of a stage are
//! spawned as separate tasks and the stage ends only when every task has
//! finished. A stage that does not pass stops the run: every later stage is
//! recorded as skipped.

use chrono::Utc;
use conveyor_core::{Job, JobResult, PipelinePlan, PipelineResult, Reason, Stage, StageResult, StageStatus};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::executor::JobExecutor;

/// Drives one or more runs of a plan through a [`JobExecutor`]
pub struct StageScheduler {
    executor: Arc<dyn JobExecutor>,
    cancel: CancellationToken,
    max_parallel_jobs: Option<usize>,
}

impl StageScheduler {
    pub fn new(executor: Arc<dyn JobExecutor>) -> Self {
        Self {
            executor,
            cancel: CancellationToken::new(),
            max_parallel_jobs: None,
        }
    }

    /// Uses `token` to cancel runs instead of a private one
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Caps how many jobs may run at the same time
    pub fn with_max_parallel_jobs(mut self, limit: Option<usize>) -> Self {
        self.max_parallel_jobs = limit;
        self
    }

    /// Token that cancels the run when fired
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Executes `plan` and returns the result of every stage and job
    ///
    /// Never fails: job problems are recorded in the result. Once the
    /// cancellation token fires no new job is started; running jobs are
    /// stopped by the executor.
    pub async fn run(&self, plan: &PipelinePlan) -> PipelineResult {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let semaphore = self.max_parallel_jobs.map(|n| Arc::new(Semaphore::new(n)));

        info!(
            %run_id,
            pipeline = plan.name(),
            stages = plan.stages().len(),
            jobs = plan.job_count(),
            "Starting run"
        );

        let mut stages = Vec::with_capacity(plan.stages().len());
        let mut blocked: Option<Reason> = None;

        for stage in plan.stages() {
            if blocked.is_none() && self.cancel.is_cancelled() {
                blocked = Some(Reason::Cancelled);
            }

            if let Some(reason) = &blocked {
                info!(stage = %stage.name, "Skipping stage ({})", reason);
                stages.push(StageResult::skipped(stage, reason.clone()));
                continue;
            }

            let result = self.run_stage(plan.name(), stage, semaphore.as_ref()).await;
            let status = result.status();
            info!(stage = %stage.name, %status, "Stage finished");

            if status != StageStatus::Succeeded {
                blocked = Some(if self.cancel.is_cancelled() {
                    Reason::Cancelled
                } else {
                    Reason::UpstreamFailed {
                        stage: stage.name.clone(),
                    }
                });
            }
            stages.push(result);
        }

        let result = PipelineResult {
            run_id,
            pipeline: plan.name().to_string(),
            started_at,
            finished_at: Utc::now(),
            cancelled: self.cancel.is_cancelled(),
            stages,
        };

        if result.cancelled {
            warn!(%run_id, "Run cancelled");
        }
        info!(%run_id, verdict = %result.verdict(), "Run finished");

        result
    }

    async fn run_stage(&self, pipeline: &str, stage: &Stage, semaphore: Option<&Arc<Semaphore>>) -> StageResult {
        info!(stage = %stage.name, jobs = stage.jobs.len(), "Starting stage");

        let handles: Vec<JoinHandle<JobResult>> = stage
            .jobs
            .iter()
            .map(|job| self.spawn_job(pipeline, job, semaphore.cloned()))
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for (job, handle) in stage.jobs.iter().zip(handles) {
            match handle.await {
                Ok(result) => results.push(result),
                Err(e) => {
                    error!(stage = %stage.name, job = %job.name, "Job task failed: {}", e);
                    results.push(JobResult::launch_failed(job, format!("job task failed: {}", e)));
                }
            }
        }

        StageResult::new(stage.name.clone(), results)
    }

    fn spawn_job(&self, pipeline: &str, job: &Arc<Job>, semaphore: Option<Arc<Semaphore>>) -> JoinHandle<JobResult> {
        let executor = Arc::clone(&self.executor);
        let cancel = self.cancel.clone();
        let pipeline = pipeline.to_string();
        let job = Arc::clone(job);

        tokio::spawn(async move {
            let _permit = match semaphore {
                Some(semaphore) => tokio::select! {
                    permit = semaphore.acquire_owned() => permit.ok(),
                    _ = cancel.cancelled() => return JobResult::skipped(&job, Reason::Cancelled),
                },
                None => None,
            };

            if cancel.is_cancelled() {
                return JobResult::skipped(&job, Reason::Cancelled);
            }

            executor.execute(&pipeline, &job, &cancel).await
        })
    }
}
