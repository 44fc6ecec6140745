// src/commands/plan.rs
//! Plan command - show the install order for a formula

use super::{load_config, load_index};
use crate::cli::GlobalArgs;
use anyhow::{Context, Result};
use formulary::{Environment, LifecycleController, PlannedAction, RunOptions, db};

/// Print what `install` would do
pub fn cmd_plan(global: &GlobalArgs, name: &str, json: bool) -> Result<()> {
    let config = load_config(global)?;
    let index = load_index(&config)?;
    let environment = Environment::resolve(&config.environment_overrides())
        .context("Invalid install paths")?;
    let conn = db::open(&config.db_path()).context("Failed to open state database")?;

    let controller = LifecycleController::new(
        &index,
        &conn,
        environment,
        config.lock_path(),
        config.work_root.clone(),
    );
    let plan = controller
        .plan(name, &RunOptions::default())
        .with_context(|| format!("Cannot plan install of {}", name))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    for dup in &plan.duplicates {
        println!(
            "Warning: '{}' is provided by {}; using '{}'",
            dup.name,
            dup.repositories.join(", "),
            dup.chosen
        );
    }

    println!("Install plan for {}:", plan.target);
    for (i, step) in plan.steps.iter().enumerate() {
        let action = match step.action {
            PlannedAction::Install => "install",
            PlannedAction::Skip => "installed",
        };
        println!(
            "  {:>3}. {:<30} {:<12} [{}]",
            i + 1,
            step.name,
            step.repository,
            action
        );
    }

    if !plan.runtime_requirements.is_empty() {
        println!("\nRuntime requirements:");
        for (dependent, dependency) in &plan.runtime_requirements {
            println!("  {} needs {}", dependent, dependency);
        }
    }

    Ok(())
}
