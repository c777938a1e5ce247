//! Data Transfer Objects
//!
//! Serializable views of run results, meant for machines (JSON output,
//! dashboards, archived run records) rather than for execution.

pub mod report;

pub use report::{JobSummary, RunSummary, StageSummary};
