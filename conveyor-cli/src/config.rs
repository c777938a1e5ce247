//! Runner configuration from command-line flags
//!
//! Flags win over `CONVEYOR_*` environment variables, which win over defaults.

use anyhow::{Context, Result};
use conveyor_runner::RunnerConfig;
use std::path::PathBuf;
use std::time::Duration;

/// Runner settings that can be given on the command line
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub shell: Option<PathBuf>,
    pub default_timeout: Option<u64>,
    pub output_limit: Option<usize>,
    pub log_dir: Option<PathBuf>,
    pub max_parallel_jobs: Option<usize>,
}

impl Overrides {
    /// Applies the overrides to `config` and validates the result
    pub fn apply(&self, mut config: RunnerConfig) -> Result<RunnerConfig> {
        if let Some(shell) = &self.shell {
            config.shell = shell.clone();
        }
        if let Some(secs) = self.default_timeout {
            config.default_timeout = Some(Duration::from_secs(secs));
        }
        if let Some(limit) = self.output_limit {
            config.output_limit_bytes = limit;
        }
        if let Some(dir) = &self.log_dir {
            config.log_dir = Some(dir.clone());
        }
        if let Some(limit) = self.max_parallel_jobs {
            config.max_parallel_jobs = Some(limit);
        }

        config.validate().context("Invalid runner configuration")?;
        Ok(config)
    }
}

/// Environment-derived configuration with `overrides` applied
pub fn runner_config(overrides: &Overrides) -> Result<RunnerConfig> {
    let config = RunnerConfig::from_env().context("Failed to read runner configuration from environment")?;
    overrides.apply(config)
}
