//! Pipeline plan domain types
//!
//! A [`PipelinePlan`] is the validated, immutable form of a
//! [`PipelineDefinition`]. It is built once at load time and then shared
//! read-only by every worker of a run.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::definition::{JobDefinition, PipelineDefinition, ServiceDefinition, StageEntry};
use crate::error::DefinitionError;

/// Name used when a definition does not provide one
pub const DEFAULT_PIPELINE_NAME: &str = "pipeline";

/// Validated execution plan
///
/// Stage order is fixed at construction. There is no mutating API.
#[derive(Debug, Clone)]
pub struct PipelinePlan {
    name: String,
    description: Option<String>,
    stages: Vec<Stage>,
    services: Vec<Service>,
}

/// An ordered, non-empty group of jobs that run concurrently
#[derive(Debug, Clone)]
pub struct Stage {
    pub name: String,
    pub jobs: Vec<Arc<Job>>,
}

impl Stage {
    pub fn new(name: impl Into<String>, jobs: Vec<Job>) -> Self {
        Self {
            name: name.into(),
            jobs: jobs.into_iter().map(Arc::new).collect(),
        }
    }
}

/// A resolved job, ready to execute
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub name: String,
    pub stage: String,
    /// Shell command line, run through the executor's shell
    pub command: String,
    pub working_dir: PathBuf,
    /// Effective environment: pipeline variables, then required services,
    /// then the job's own entries
    pub environment: HashMap<String, String>,
    pub allow_failure: bool,
    /// Required services including transitive dependencies, dependencies first
    pub services: Vec<String>,
    pub timeout: Option<Duration>,
}

impl Job {
    /// Creates a job running `command` in the current directory
    pub fn new(
        stage: impl Into<String>,
        name: impl Into<String>,
        command: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            stage: stage.into(),
            command: command.into(),
            working_dir: PathBuf::from("."),
            environment: HashMap::new(),
            allow_failure: false,
            services: Vec::new(),
            timeout: None,
        }
    }

    pub fn with_allow_failure(mut self, allow_failure: bool) -> Self {
        self.allow_failure = allow_failure;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }
}

/// A declared external dependency
#[derive(Debug, Clone, PartialEq)]
pub struct Service {
    pub name: String,
    pub description: Option<String>,
    pub environment: HashMap<String, String>,
    pub depends_on: Vec<String>,
}

impl From<ServiceDefinition> for Service {
    fn from(def: ServiceDefinition) -> Self {
        Self {
            name: def.name,
            description: def.description,
            environment: def.environment,
            depends_on: def.depends_on,
        }
    }
}

impl PipelinePlan {
    /// Validates a definition and resolves it into a plan
    ///
    /// Relative working directories are resolved against `base_dir`; jobs
    /// without one run in `base_dir` itself.
    ///
    /// # Errors
    /// Returns the first [`DefinitionError`] found. Services are checked
    /// first, then stages in declared order, then jobs.
    pub fn from_definition(
        definition: PipelineDefinition,
        base_dir: &Path,
    ) -> Result<Self, DefinitionError> {
        let PipelineDefinition {
            name,
            description,
            stages: entries,
            jobs: loose_jobs,
            variables,
            services,
        } = definition;

        if entries.is_empty() {
            return Err(DefinitionError::NoStages);
        }

        let services = resolve_services(services)?;

        // Stage skeletons in declared order, with their inline jobs
        let mut slots: Vec<(String, Vec<JobDefinition>)> = Vec::with_capacity(entries.len());
        for entry in entries {
            let (stage_name, jobs) = match entry {
                StageEntry::Name(name) => (name, Vec::new()),
                StageEntry::Inline(stage) => {
                    for job in &stage.jobs {
                        if let Some(declared) = &job.stage {
                            if declared != &stage.name {
                                return Err(DefinitionError::ConflictingStage {
                                    job: job.name.clone(),
                                    stage: stage.name.clone(),
                                    declared: declared.clone(),
                                });
                            }
                        }
                    }
                    (stage.name, stage.jobs)
                }
            };

            check_name("stage", &stage_name)?;
            if slots.iter().any(|(existing, _)| *existing == stage_name) {
                return Err(DefinitionError::DuplicateStage { stage: stage_name });
            }
            slots.push((stage_name, jobs));
        }

        for job in loose_jobs {
            let Some(stage_name) = job.stage.clone() else {
                return Err(DefinitionError::MissingStage { job: job.name });
            };
            match slots.iter_mut().find(|(name, _)| *name == stage_name) {
                Some((_, jobs)) => jobs.push(job),
                None => {
                    return Err(DefinitionError::UnknownStage {
                        job: job.name,
                        stage: stage_name,
                    });
                }
            }
        }

        let mut stages = Vec::with_capacity(slots.len());
        for (stage_name, definitions) in slots {
            let mut jobs = Vec::with_capacity(definitions.len());
            for definition in definitions {
                jobs.push(resolve_job(
                    &stage_name,
                    definition,
                    &variables,
                    &services,
                    base_dir,
                )?);
            }
            stages.push(Stage::new(stage_name, jobs));
        }

        Self::assemble(
            name.unwrap_or_else(|| DEFAULT_PIPELINE_NAME.to_string()),
            description,
            stages,
            services,
        )
    }

    /// Builds a plan from already-resolved stages
    ///
    /// Applies the same structural checks as [`from_definition`](Self::from_definition).
    pub fn from_stages(name: impl Into<String>, stages: Vec<Stage>) -> Result<Self, DefinitionError> {
        Self::assemble(name.into(), None, stages, Vec::new())
    }

    fn assemble(
        name: String,
        description: Option<String>,
        stages: Vec<Stage>,
        services: Vec<Service>,
    ) -> Result<Self, DefinitionError> {
        if stages.is_empty() {
            return Err(DefinitionError::NoStages);
        }

        let mut stage_names = HashSet::new();
        for stage in &stages {
            check_name("stage", &stage.name)?;
            if !stage_names.insert(stage.name.as_str()) {
                return Err(DefinitionError::DuplicateStage {
                    stage: stage.name.clone(),
                });
            }

            let mut job_names = HashSet::new();
            for job in &stage.jobs {
                check_name("job", &job.name)?;
                if !job_names.insert(job.name.as_str()) {
                    return Err(DefinitionError::DuplicateJob {
                        stage: stage.name.clone(),
                        job: job.name.clone(),
                    });
                }
                if job.stage != stage.name {
                    return Err(DefinitionError::ConflictingStage {
                        job: job.name.clone(),
                        stage: stage.name.clone(),
                        declared: job.stage.clone(),
                    });
                }
                if job.timeout == Some(Duration::ZERO) {
                    return Err(DefinitionError::ZeroTimeout {
                        stage: stage.name.clone(),
                        job: job.name.clone(),
                    });
                }
                if let Some(service) = job
                    .services
                    .iter()
                    .find(|required| !services.iter().any(|s| &s.name == *required))
                {
                    return Err(DefinitionError::UnknownService {
                        stage: stage.name.clone(),
                        job: job.name.clone(),
                        service: service.clone(),
                    });
                }
            }

            if stage.jobs.is_empty() {
                return Err(DefinitionError::EmptyStage {
                    stage: stage.name.clone(),
                });
            }
        }

        Ok(Self {
            name,
            description,
            stages,
            services,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Stages in execution order
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn services(&self) -> &[Service] {
        &self.services
    }

    pub fn stage(&self, name: &str) -> Option<&Stage> {
        self.stages.iter().find(|stage| stage.name == name)
    }

    pub fn job_count(&self) -> usize {
        self.stages.iter().map(|stage| stage.jobs.len()).sum()
    }
}

/// Rejects names that cannot be used as report keys or log file paths
fn check_name(kind: &'static str, name: &str) -> Result<(), DefinitionError> {
    let invalid = name.is_empty()
        || name.trim() != name
        || name == "."
        || name == ".."
        || name.contains(['/', '\\']);

    if invalid {
        return Err(DefinitionError::InvalidName {
            kind,
            name: name.to_string(),
        });
    }
    Ok(())
}

fn resolve_services(definitions: Vec<ServiceDefinition>) -> Result<Vec<Service>, DefinitionError> {
    let mut names = HashSet::new();
    for definition in &definitions {
        check_name("service", &definition.name)?;
        if !names.insert(definition.name.as_str()) {
            return Err(DefinitionError::DuplicateService {
                service: definition.name.clone(),
            });
        }
    }

    for definition in &definitions {
        if let Some(dependency) = definition
            .depends_on
            .iter()
            .find(|dependency| !names.contains(dependency.as_str()))
        {
            return Err(DefinitionError::UnknownServiceDependency {
                service: definition.name.clone(),
                dependency: dependency.clone(),
            });
        }
    }

    if let Some(cycle) = find_service_cycle(&definitions) {
        return Err(DefinitionError::ServiceCycle { cycle });
    }

    Ok(definitions.into_iter().map(Service::from).collect())
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Depth-first search over `depends_on` edges in declaration order
///
/// Returns the first cycle found as a closed path (`a -> b -> a`).
fn find_service_cycle(services: &[ServiceDefinition]) -> Option<Vec<String>> {
    let index: HashMap<&str, usize> = services
        .iter()
        .enumerate()
        .map(|(i, service)| (service.name.as_str(), i))
        .collect();
    let mut marks = vec![Mark::Unvisited; services.len()];
    let mut path = Vec::new();

    for start in 0..services.len() {
        if marks[start] == Mark::Unvisited {
            if let Some(cycle) = visit_service(start, services, &index, &mut marks, &mut path) {
                return Some(cycle);
            }
        }
    }
    None
}

fn visit_service(
    node: usize,
    services: &[ServiceDefinition],
    index: &HashMap<&str, usize>,
    marks: &mut [Mark],
    path: &mut Vec<usize>,
) -> Option<Vec<String>> {
    marks[node] = Mark::InProgress;
    path.push(node);

    for dependency in &services[node].depends_on {
        let Some(&next) = index.get(dependency.as_str()) else {
            continue;
        };
        match marks[next] {
            Mark::InProgress => {
                let start = path.iter().position(|&n| n == next).unwrap_or(0);
                let mut cycle: Vec<String> = path[start..]
                    .iter()
                    .map(|&n| services[n].name.clone())
                    .collect();
                cycle.push(services[next].name.clone());
                return Some(cycle);
            }
            Mark::Unvisited => {
                if let Some(cycle) = visit_service(next, services, index, marks, path) {
                    return Some(cycle);
                }
            }
            Mark::Done => {}
        }
    }

    path.pop();
    marks[node] = Mark::Done;
    None
}

/// Transitive closure of `required`, dependencies before dependents
fn service_closure(required: &[String], services: &[Service]) -> Vec<String> {
    fn visit(name: &str, services: &[Service], ordered: &mut Vec<String>) {
        if ordered.iter().any(|existing| existing == name) {
            return;
        }
        if let Some(service) = services.iter().find(|s| s.name == name) {
            for dependency in &service.depends_on {
                visit(dependency, services, ordered);
            }
            ordered.push(service.name.clone());
        }
    }

    let mut ordered = Vec::new();
    for name in required {
        visit(name, services, &mut ordered);
    }
    ordered
}

fn resolve_job(
    stage: &str,
    definition: JobDefinition,
    variables: &HashMap<String, String>,
    services: &[Service],
    base_dir: &Path,
) -> Result<Job, DefinitionError> {
    check_name("job", &definition.name)?;

    let command = match (definition.command, definition.script.is_empty()) {
        (Some(_), false) => {
            return Err(DefinitionError::AmbiguousCommand {
                stage: stage.to_string(),
                job: definition.name,
            });
        }
        (Some(command), true) if !command.trim().is_empty() => command,
        (None, false) => format!("set -e\n{}", definition.script.join("\n")),
        _ => {
            return Err(DefinitionError::MissingCommand {
                stage: stage.to_string(),
                job: definition.name,
            });
        }
    };

    let timeout = match definition.timeout {
        Some(0) => {
            return Err(DefinitionError::ZeroTimeout {
                stage: stage.to_string(),
                job: definition.name,
            });
        }
        Some(secs) => Some(Duration::from_secs(secs)),
        None => None,
    };

    if let Some(unknown) = definition
        .services
        .iter()
        .find(|required| !services.iter().any(|s| &s.name == *required))
    {
        return Err(DefinitionError::UnknownService {
            stage: stage.to_string(),
            job: definition.name,
            service: unknown.clone(),
        });
    }
    let required = service_closure(&definition.services, services);

    let mut environment = variables.clone();
    for name in &required {
        if let Some(service) = services.iter().find(|s| &s.name == name) {
            environment.extend(service.environment.clone());
        }
    }
    environment.extend(definition.environment);

    let working_dir = match definition.working_dir {
        Some(dir) if dir.is_absolute() => dir,
        Some(dir) => base_dir.join(dir),
        None => base_dir.to_path_buf(),
    };

    Ok(Job {
        name: definition.name,
        stage: stage.to_string(),
        command,
        working_dir,
        environment,
        allow_failure: definition.allow_failure,
        services: required,
        timeout,
    })
}
