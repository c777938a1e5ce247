//! Runner configuration
//!
//! Settings for how jobs are executed and where their output goes. Values
//! come from defaults, then `CONVEYOR_*` environment variables, then
//! whatever the caller overrides.

use std::path::PathBuf;
use std::time::Duration;

/// Default per-stream capture cap (1 MiB)
pub const DEFAULT_OUTPUT_LIMIT: usize = 1024 * 1024;

/// Runner configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RunnerConfig {
    /// Shell used to run job commands as `<shell> -c <command>`
    pub shell: PathBuf,

    /// Bytes kept per output stream; the rest is discarded
    pub output_limit_bytes: usize,

    /// Timeout for jobs that do not declare one
    pub default_timeout: Option<Duration>,

    /// Time between SIGTERM and SIGKILL when a process group is terminated
    pub kill_grace_period: Duration,

    /// Where job output is persisted, if anywhere
    pub log_dir: Option<PathBuf>,

    /// Cap on jobs running at once within a stage; `None` runs them all
    pub max_parallel_jobs: Option<usize>,
}

impl RunnerConfig {
    pub fn new() -> Self {
        Self {
            shell: PathBuf::from("/bin/sh"),
            output_limit_bytes: DEFAULT_OUTPUT_LIMIT,
            default_timeout: None,
            kill_grace_period: Duration::from_secs(5),
            log_dir: None,
            max_parallel_jobs: None,
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Every variable is optional:
    /// - CONVEYOR_SHELL (default: /bin/sh)
    /// - CONVEYOR_OUTPUT_LIMIT (bytes, default: 1048576)
    /// - CONVEYOR_DEFAULT_TIMEOUT (seconds, default: none)
    /// - CONVEYOR_KILL_GRACE (seconds, default: 5)
    /// - CONVEYOR_LOG_DIR (default: none)
    /// - CONVEYOR_MAX_PARALLEL_JOBS (default: unlimited)
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut config = Self::new();

        if let Some(shell) = lookup("CONVEYOR_SHELL") {
            config.shell = PathBuf::from(shell);
        }
        if let Some(limit) = parse_var::<usize>(&lookup, "CONVEYOR_OUTPUT_LIMIT")? {
            config.output_limit_bytes = limit;
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "CONVEYOR_DEFAULT_TIMEOUT")? {
            config.default_timeout = Some(Duration::from_secs(secs));
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "CONVEYOR_KILL_GRACE")? {
            config.kill_grace_period = Duration::from_secs(secs);
        }
        if let Some(dir) = lookup("CONVEYOR_LOG_DIR") {
            config.log_dir = Some(PathBuf::from(dir));
        }
        config.max_parallel_jobs = parse_var::<usize>(&lookup, "CONVEYOR_MAX_PARALLEL_JOBS")?;

        Ok(config)
    }

    pub fn with_shell(mut self, shell: impl Into<PathBuf>) -> Self {
        self.shell = shell.into();
        self
    }

    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.shell.as_os_str().is_empty() {
            anyhow::bail!("shell cannot be empty");
        }

        if self.output_limit_bytes == 0 {
            anyhow::bail!("output_limit_bytes must be greater than 0");
        }

        if self.default_timeout == Some(Duration::ZERO) {
            anyhow::bail!("default_timeout must be greater than 0");
        }

        if self.max_parallel_jobs == Some(0) {
            anyhow::bail!("max_parallel_jobs must be greater than 0");
        }

        Ok(())
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> anyhow::Result<Option<T>> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| anyhow::anyhow!("{} must be a non-negative integer, got '{}'", key, raw)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_vars(vars: &[(&str, &str)]) -> anyhow::Result<RunnerConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        RunnerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = RunnerConfig::default();
        assert_eq!(config.shell, PathBuf::from("/bin/sh"));
        assert_eq!(config.output_limit_bytes, 1024 * 1024);
        assert_eq!(config.default_timeout, None);
        assert_eq!(config.kill_grace_period, Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_env_vars() {
        let config = from_vars(&[
            ("CONVEYOR_SHELL", "/bin/bash"),
            ("CONVEYOR_OUTPUT_LIMIT", "4096"),
            ("CONVEYOR_DEFAULT_TIMEOUT", "600"),
            ("CONVEYOR_KILL_GRACE", "1"),
            ("CONVEYOR_LOG_DIR", "target/conveyor-logs"),
            ("CONVEYOR_MAX_PARALLEL_JOBS", "4"),
        ])
        .unwrap();

        assert_eq!(config.shell, PathBuf::from("/bin/bash"));
        assert_eq!(config.output_limit_bytes, 4096);
        assert_eq!(config.default_timeout, Some(Duration::from_secs(600)));
        assert_eq!(config.kill_grace_period, Duration::from_secs(1));
        assert_eq!(config.log_dir, Some(PathBuf::from("target/conveyor-logs")));
        assert_eq!(config.max_parallel_jobs, Some(4));
    }

    #[test]
    fn test_malformed_env_var_is_an_error() {
        let err = from_vars(&[("CONVEYOR_OUTPUT_LIMIT", "lots")]).unwrap_err();
        assert!(err.to_string().contains("CONVEYOR_OUTPUT_LIMIT"));
    }

    #[test]
    fn test_config_validation() {
        let mut config = RunnerConfig::default();
        assert!(config.validate().is_ok());

        config.output_limit_bytes = 0;
        assert!(config.validate().is_err());
        config.output_limit_bytes = 1;

        config.default_timeout = Some(Duration::ZERO);
        assert!(config.validate().is_err());
        config.default_timeout = None;

        config.max_parallel_jobs = Some(0);
        assert!(config.validate().is_err());
        config.max_parallel_jobs = Some(2);

        config.shell = PathBuf::new();
        assert!(config.validate().is_err());
    }
}
