//! Job execution
//!
//! The scheduler only knows [`JobExecutor`]. [`ProcessExecutor`] runs jobs
//! as local shell processes; other backends (containers, remote agents)
//! implement the same trait.

mod capture;
pub mod process;
mod termination;

use async_trait::async_trait;
use conveyor_core::{Job, JobResult};
use tokio_util::sync::CancellationToken;

pub use process::ProcessExecutor;

/// Runs a single job to completion
///
/// Implementations never fail: launch problems, timeouts and cancellation
/// are all reported through the returned [`JobResult`]. Once `cancel` has
/// fired an implementation must not start any new process and should stop
/// the running one.
#[async_trait]
pub trait JobExecutor: Send + Sync {
    async fn execute(&self, pipeline: &str, job: &Job, cancel: &CancellationToken) -> JobResult;
}
