//! `conveyor validate`

use anyhow::{Context, Result};
use clap::Args;
use colored::*;
use conveyor_core::{Job, PipelinePlan};
use conveyor_lua::Loader;
use std::path::PathBuf;
use std::process::ExitCode;

use super::parse_key_val;

#[derive(Args)]
pub struct ValidateArgs {
    /// Plan file (.lua or .json)
    pub plan: PathBuf,

    /// Variable visible to the plan script (repeatable)
    #[arg(long = "var", value_name = "KEY=VALUE", value_parser = parse_key_val)]
    pub vars: Vec<(String, String)>,
}

pub fn handle_validate(args: ValidateArgs) -> Result<ExitCode> {
    let plan = Loader::new()
        .with_variables(args.vars)
        .load_file(&args.plan)
        .with_context(|| format!("Failed to load plan {}", args.plan.display()))?;

    print!("{}", describe(&plan));
    Ok(ExitCode::SUCCESS)
}

fn describe(plan: &PipelinePlan) -> String {
    let mut out = format!(
        "{} {} {}\n",
        "✓".green().bold(),
        plan.name().cyan().bold(),
        format!(
            "is valid ({} stages, {} jobs)",
            plan.stages().len(),
            plan.job_count()
        )
        .green()
    );
    if let Some(description) = plan.description() {
        out.push_str(&format!("  {}\n", description.dimmed()));
    }

    for stage in plan.stages() {
        out.push_str(&format!("\n{} {}\n", "▸".cyan(), stage.name.bold()));
        for job in &stage.jobs {
            out.push_str(&format!("    {} {}{}\n", job.name, job.command.lines().next().unwrap_or("").dimmed(), annotations(job)));
        }
    }

    if !plan.services().is_empty() {
        out.push_str(&format!("\n{}\n", "Services".bold()));
        for service in plan.services() {
            let depends = if service.depends_on.is_empty() {
                String::new()
            } else {
                format!(" (depends on {})", service.depends_on.join(", "))
            };
            out.push_str(&format!("    {}{}\n", service.name, depends.dimmed()));
        }
    }

    out
}

fn annotations(job: &Job) -> String {
    let mut notes = Vec::new();
    if job.allow_failure {
        notes.push("allow failure".to_string());
    }
    if let Some(timeout) = job.timeout {
        notes.push(format!("timeout {}s", timeout.as_secs()));
    }
    if !job.services.is_empty() {
        notes.push(format!("services: {}", job.services.join(", ")));
    }

    if notes.is_empty() {
        String::new()
    } else {
        format!(" {}", format!("[{}]", notes.join("; ")).yellow())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conveyor_core::Stage;
    use std::time::Duration;

    #[test]
    fn test_describe_lists_stages_in_order() {
        let plan = PipelinePlan::from_stages(
            "ci",
            vec![
                Stage::new(
                    "lint",
                    vec![Job::new("lint", "style-check", "cargo fmt --check").with_allow_failure(true)],
                ),
                Stage::new(
                    "test",
                    vec![Job::new("test", "unit-test", "cargo test").with_timeout(Duration::from_secs(600))],
                ),
            ],
        )
        .unwrap();

        let text = describe(&plan);
        assert!(text.contains("2 stages, 2 jobs"));
        assert!(text.contains("allow failure"));
        assert!(text.contains("timeout 600s"));
        assert!(text.find("style-check").unwrap() < text.find("unit-test").unwrap());
    }
}
