//! Plan file loading
//!
//! [`Loader`] reads a `.lua` or `.json` plan, parses it into a
//! [`PipelineDefinition`] and validates it into a [`PipelinePlan`]. Relative
//! job working directories resolve against the plan file's directory.

use conveyor_core::{PipelineDefinition, PipelinePlan};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::LoadError;
use crate::module::ModuleRegistry;
use crate::modules::{EnvModule, LogModule, MapVarProvider, TracingLogSink};
use crate::parser::{parse_json, parse_lua};
use crate::sandbox::{PipelineModule, create_sandbox};

/// Plan document format, picked from the file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanFormat {
    Lua,
    Json,
}

impl PlanFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "lua" => Some(PlanFormat::Lua),
            "json" => Some(PlanFormat::Json),
            _ => None,
        }
    }
}

/// Loads plan files
///
/// Variables given to the loader are the only outside values a plan script
/// can read (through the `env` module).
#[derive(Debug, Clone, Default)]
pub struct Loader {
    variables: HashMap<String, String>,
}

impl Loader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_variable(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(key.into(), value.into());
        self
    }

    pub fn with_variables<I, K, V>(mut self, variables: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.variables
            .extend(variables.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Reads, parses and validates the plan at `path`
    ///
    /// The pipeline is named after the file stem unless the plan names itself.
    pub fn load_file(&self, path: &Path) -> Result<PipelinePlan, LoadError> {
        let mut definition = self.read_definition(path)?;

        if definition.name.is_none() {
            definition.name = path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned());
        }

        let base_dir = plan_dir(path)?;
        let plan = PipelinePlan::from_definition(definition, &base_dir)?;
        info!(
            pipeline = plan.name(),
            stages = plan.stages().len(),
            jobs = plan.job_count(),
            "Loaded plan from {}",
            path.display()
        );
        Ok(plan)
    }

    /// Reads and parses the plan at `path` without validating it
    pub fn read_definition(&self, path: &Path) -> Result<PipelineDefinition, LoadError> {
        let format = PlanFormat::from_path(path).ok_or_else(|| LoadError::UnsupportedFormat {
            path: path.to_path_buf(),
        })?;
        let source = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), ?format, "Parsing plan");

        match format {
            PlanFormat::Lua => self.parse_lua_source(&source, &path.display().to_string()),
            PlanFormat::Json => parse_json(&source),
        }
    }

    /// Parses and validates a plan script held in memory
    pub fn load_lua(&self, source: &str, base_dir: &Path) -> Result<PipelinePlan, LoadError> {
        let definition = self.parse_lua_source(source, "plan")?;
        Ok(PipelinePlan::from_definition(definition, base_dir)?)
    }

    /// Parses and validates a JSON plan held in memory
    pub fn load_json(&self, source: &str, base_dir: &Path) -> Result<PipelinePlan, LoadError> {
        Ok(PipelinePlan::from_definition(parse_json(source)?, base_dir)?)
    }

    /// Modules available to plan scripts, `pipeline` included
    pub fn modules(&self, chunk: &str) -> ModuleRegistry {
        ModuleRegistry::new()
            .with(PipelineModule)
            .with(EnvModule::new(MapVarProvider::new(self.variables.clone())))
            .with(LogModule::new(TracingLogSink::for_chunk(chunk)))
    }

    fn parse_lua_source(&self, source: &str, chunk: &str) -> Result<PipelineDefinition, LoadError> {
        let lua = create_sandbox(&self.modules(chunk))
            .map_err(|e| LoadError::Script(format!("failed to create sandbox: {}", e)))?;
        parse_lua(&lua, source, chunk)
    }
}

fn plan_dir(path: &Path) -> Result<PathBuf, LoadError> {
    let absolute = std::path::absolute(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(absolute
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or(absolute))
}
