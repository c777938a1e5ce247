//! Conveyor runner
//!
//! Executes validated pipeline plans on the local machine:
//! - [`StageScheduler`] runs stages in order and jobs within a stage concurrently
//! - [`JobExecutor`] is the execution boundary, [`ProcessExecutor`] the local implementation
//! - [`Reporter`] summarizes and renders the result

pub mod config;
pub mod executor;
pub mod report;
pub mod scheduler;

pub use config::RunnerConfig;
pub use executor::{JobExecutor, ProcessExecutor};
pub use report::Reporter;
pub use scheduler::StageScheduler;

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use conveyor_core::{JobState, Reason, StageStatus, Verdict};
    use conveyor_lua::Loader;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    async fn run_plan(source: &str, dir: &TempDir) -> conveyor_core::PipelineResult {
        let plan = Loader::new().load_lua(source, dir.path()).unwrap();
        let mut config = RunnerConfig::default();
        config.kill_grace_period = Duration::from_millis(200);
        StageScheduler::new(Arc::new(ProcessExecutor::new(config)))
            .run(&plan)
            .await
    }

    #[tokio::test]
    async fn test_lint_then_test() {
        let dir = TempDir::new().unwrap();
        let result = run_plan(
            r#"
            return {
                name = "ci",
                stages = { "lint", "test" },
                jobs = {
                    { name = "style-check", stage = "lint", command = "echo checking" },
                    { name = "unit-test", stage = "test", script = { "echo one", "echo two" } },
                },
            }
            "#,
            &dir,
        )
        .await;

        assert_eq!(result.verdict(), Verdict::Succeeded);
        let unit = result.job("test", "unit-test").unwrap();
        assert_eq!(unit.output.stdout, "one\ntwo\n");

        let summary = Reporter::new().with_log_dir(dir.path().join("logs")).summarize(&result);
        assert_eq!(summary.jobs.len(), 2);
        assert!(dir.path().join("logs/lint/style-check.log").exists());
    }

    #[tokio::test]
    async fn test_failed_lint_skips_test_and_nothing_runs() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("tests-ran");
        let source = format!(
            r#"
            return {{
                stages = {{ "lint", "test" }},
                jobs = {{
                    {{ name = "style-check", stage = "lint", command = "exit 1" }},
                    {{ name = "unit-test", stage = "test", command = "touch {}" }},
                }},
            }}
            "#,
            marker.display()
        );

        let result = run_plan(&source, &dir).await;
        assert_eq!(result.verdict(), Verdict::Failed);
        assert_eq!(result.stages[1].status(), StageStatus::Skipped);
        assert_eq!(
            result.job("test", "unit-test").unwrap().reason,
            Some(Reason::UpstreamFailed {
                stage: "lint".to_string()
            })
        );
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_script_stops_at_first_failure() {
        let dir = TempDir::new().unwrap();
        let result = run_plan(
            r#"return { stages = { pipeline.stage("build", { { name = "make", script = { "echo a", "false", "echo b" } } }) } }"#,
            &dir,
        )
        .await;

        let make = result.job("build", "make").unwrap();
        assert_eq!(make.state, JobState::Failed);
        assert_eq!(make.output.stdout, "a\n");
    }

    #[tokio::test]
    async fn test_service_environment_reaches_job() {
        let dir = TempDir::new().unwrap();
        let result = run_plan(
            r#"
            return {
                stages = { "test" },
                services = {
                    { name = "postgres", environment = { DATABASE_URL = "postgres://localhost/test" } },
                },
                jobs = {
                    { name = "db", stage = "test", services = { "postgres" }, command = "echo $DATABASE_URL $CONVEYOR_SERVICES" },
                },
            }
            "#,
            &dir,
        )
        .await;

        let db = result.job("test", "db").unwrap();
        assert_eq!(db.output.stdout, "postgres://localhost/test postgres\n");
    }
}
