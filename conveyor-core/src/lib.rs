//! Conveyor Core
//!
//! Core types for the Conveyor pipeline runner.
//!
//! This crate contains:
//! - Definition: the declarative pipeline description as written by users
//! - Domain types: the validated plan (stages, jobs, services) and run results
//! - DTOs: machine-readable run summaries
//! - Errors: plan validation failures

pub mod definition;
pub mod domain;
pub mod dto;
pub mod error;

pub use definition::{JobDefinition, PipelineDefinition, ServiceDefinition, StageEntry};
pub use domain::plan::{Job, PipelinePlan, Service, Stage};
pub use domain::result::{
    CapturedOutput, JobResult, JobState, PipelineResult, Reason, StageResult, StageStatus,
    Verdict,
};
pub use error::DefinitionError;
