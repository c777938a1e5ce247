//! `conveyor init`
//!
//! Writes a starter plan plus `.luarc.json` and stub files so the Lua
//! language server can complete the plan-script modules.

use anyhow::{Context, Result};
use clap::Args;
use colored::*;
use conveyor_lua::Loader;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

const STUBS_DIR: &str = ".conveyor/stubs";

const STARTER_PLAN: &str = r#"-- Conveyor pipeline
--
-- Stages run in order; jobs within a stage run concurrently.
-- Run it with `conveyor run pipeline.lua`.

return pipeline.define({
    name = "ci",
    stages = { "lint", "test" },
    variables = {
        CARGO_TERM_COLOR = "always",
    },
    jobs = {
        { name = "fmt", stage = "lint", command = "cargo fmt --check" },
        { name = "clippy", stage = "lint", command = "cargo clippy -- -D warnings", allow_failure = true },
        { name = "unit", stage = "test", command = "cargo test", timeout = 1800 },
    },
})
"#;

#[derive(Args)]
pub struct InitArgs {
    /// Output directory for generated files
    #[arg(short, long, default_value = ".")]
    pub output: PathBuf,

    /// Overwrite an existing pipeline.lua
    #[arg(long)]
    pub force: bool,
}

pub fn handle_init(args: InitArgs) -> Result<ExitCode> {
    fs::create_dir_all(&args.output)
        .with_context(|| format!("Failed to create output directory {:?}", args.output))?;

    generate_starter_plan(&args.output, args.force)?;
    generate_luarc_json(&args.output)?;
    generate_stub_files(&args.output)?;

    println!();
    println!("{}", "✓ Conveyor project initialized!".green().bold());
    println!();
    println!("{}", "Next steps:".bold());
    println!("  1. Edit pipeline.lua to describe your stages and jobs");
    println!("  2. Check it with {}", "conveyor validate pipeline.lua".cyan());
    println!("  3. Run it with {}", "conveyor run pipeline.lua".cyan());

    Ok(ExitCode::SUCCESS)
}

fn generate_starter_plan(output: &Path, force: bool) -> Result<()> {
    let path = output.join("pipeline.lua");
    if path.exists() && !force {
        println!("  {} pipeline.lua (already exists, use --force to overwrite)", "Skipped".yellow());
        return Ok(());
    }

    fs::write(&path, STARTER_PLAN).with_context(|| format!("Failed to write {:?}", path))?;
    println!("  {} pipeline.lua", "Created".green());
    Ok(())
}

fn generate_luarc_json(output: &Path) -> Result<()> {
    let path = output.join(".luarc.json");
    let registry = Loader::new().modules("init");
    let globals: Vec<&str> = registry.modules().iter().map(|module| module.id()).collect();

    let luarc = serde_json::json!({
        "$schema": "https://raw.githubusercontent.com/sumneko/vscode-lua/master/setting/schema.json",
        "runtime": { "version": "Lua 5.4" },
        "diagnostics": { "globals": globals },
        "workspace": {
            "library": [STUBS_DIR],
            "checkThirdParty": false
        },
        "completion": { "callSnippet": "Both" }
    });

    let contents = serde_json::to_string_pretty(&luarc).context("Failed to serialize .luarc.json")?;
    fs::write(&path, contents + "\n").with_context(|| format!("Failed to write {:?}", path))?;
    println!("  {} .luarc.json", "Created".green());
    Ok(())
}

/// Stubs come from the module implementations themselves
fn generate_stub_files(output: &Path) -> Result<()> {
    let stubs_dir = output.join(STUBS_DIR);
    fs::create_dir_all(&stubs_dir)
        .with_context(|| format!("Failed to create stubs directory at {:?}", stubs_dir))?;

    for module in Loader::new().modules("init").modules() {
        let path = stubs_dir.join(format!("{}.lua", module.id()));
        fs::write(&path, module.stubs()).with_context(|| format!("Failed to write stub file {:?}", path))?;
        println!("  {} {}/{}.lua", "Created".green(), STUBS_DIR, module.id());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_writes_project_files() {
        let dir = TempDir::new().unwrap();
        handle_init(InitArgs {
            output: dir.path().to_path_buf(),
            force: false,
        })
        .unwrap();

        assert!(dir.path().join("pipeline.lua").exists());
        for module in ["pipeline", "env", "log"] {
            let stub = dir.path().join(STUBS_DIR).join(format!("{}.lua", module));
            assert!(fs::read_to_string(stub).unwrap().starts_with("---@meta"));
        }

        let luarc: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join(".luarc.json")).unwrap()).unwrap();
        assert_eq!(luarc["diagnostics"]["globals"], serde_json::json!(["pipeline", "env", "log"]));
    }

    #[test]
    fn test_existing_plan_kept_without_force() {
        let dir = TempDir::new().unwrap();
        let plan = dir.path().join("pipeline.lua");
        fs::write(&plan, "return {}").unwrap();

        generate_starter_plan(dir.path(), false).unwrap();
        assert_eq!(fs::read_to_string(&plan).unwrap(), "return {}");

        generate_starter_plan(dir.path(), true).unwrap();
        assert_eq!(fs::read_to_string(&plan).unwrap(), STARTER_PLAN);
    }

    #[test]
    fn test_starter_plan_is_valid() {
        let plan = Loader::new().load_lua(STARTER_PLAN, Path::new(".")).unwrap();
        assert_eq!(plan.name(), "ci");
        assert_eq!(plan.stages().len(), 2);
        assert!(plan.stage("lint").unwrap().jobs[1].allow_failure);
    }
}
