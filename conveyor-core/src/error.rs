//! Plan validation errors

use thiserror::Error;

/// Reasons a pipeline definition cannot become a plan
///
/// Every variant names the stage, job or service at fault. A definition
/// error is fatal: no job runs when loading fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DefinitionError {
    #[error("pipeline must declare at least one stage")]
    NoStages,

    #[error("{kind} name '{name}' is invalid: names must be non-empty and path-safe")]
    InvalidName { kind: &'static str, name: String },

    #[error("stage '{stage}' is declared more than once")]
    DuplicateStage { stage: String },

    #[error("stage '{stage}' has no jobs")]
    EmptyStage { stage: String },

    #[error("job '{job}' is declared more than once in stage '{stage}'")]
    DuplicateJob { stage: String, job: String },

    #[error("job '{job}' does not name a stage")]
    MissingStage { job: String },

    #[error("job '{job}' references unknown stage '{stage}'")]
    UnknownStage { job: String, stage: String },

    #[error("job '{job}' is declared inside stage '{stage}' but names stage '{declared}'")]
    ConflictingStage {
        job: String,
        stage: String,
        declared: String,
    },

    #[error("job '{job}' in stage '{stage}' has neither 'command' nor 'script'")]
    MissingCommand { stage: String, job: String },

    #[error("job '{job}' in stage '{stage}' sets both 'command' and 'script'")]
    AmbiguousCommand { stage: String, job: String },

    #[error("job '{job}' in stage '{stage}' has a zero timeout")]
    ZeroTimeout { stage: String, job: String },

    #[error("job '{job}' in stage '{stage}' requires unknown service '{service}'")]
    UnknownService {
        stage: String,
        job: String,
        service: String,
    },

    #[error("service '{service}' is declared more than once")]
    DuplicateService { service: String },

    #[error("service '{service}' depends on unknown service '{dependency}'")]
    UnknownServiceDependency { service: String, dependency: String },

    #[error("service dependency cycle: {}", cycle.join(" -> "))]
    ServiceCycle { cycle: Vec<String> },
}
