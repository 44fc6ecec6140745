// src/commands/install.rs
//! Install command - build a formula and its dependencies

use super::progress::CliProgress;
use super::{load_config, load_index};
use crate::cli::GlobalArgs;
use anyhow::{Context, Result};
use formulary::{
    AbortHandle, Environment, LifecycleController, LogProgress, ProgressTracker, RunOptions,
    RunOutcome, db,
};
use std::sync::Arc;
use tracing::info;

/// Options for `formulary install`
#[derive(Debug, Clone, Default)]
pub struct InstallArgs {
    pub test: bool,
    pub reinstall: bool,
    pub head: bool,
    pub no_progress: bool,
}

/// Install a formula
pub fn cmd_install(
    global: &GlobalArgs,
    name: &str,
    args: &InstallArgs,
    abort: AbortHandle,
) -> Result<()> {
    let config = load_config(global)?;
    let index = load_index(&config)?;
    let environment = Environment::resolve(&config.environment_overrides())
        .context("Invalid install paths")?;
    let db_path = config.db_path();
    let conn = db::open(&db_path)
        .with_context(|| format!("Failed to open state database {}", db_path.display()))?;

    let progress: Arc<dyn ProgressTracker> = if args.no_progress || global.quiet {
        Arc::new(LogProgress::new())
    } else {
        Arc::new(CliProgress::new())
    };

    let controller = LifecycleController::new(
        &index,
        &conn,
        environment,
        config.lock_path(),
        config.work_root.clone(),
    )
    .with_progress(progress)
    .with_abort_handle(abort);

    let options = RunOptions {
        run_tests: args.test || config.run_tests,
        reinstall: args.reinstall,
        prefer_head: args.head || config.prefer_head,
    };

    info!("Installing {} ({:?})", name, options);
    let report = controller.run(name, &options);

    for warning in &report.warnings {
        println!("Warning: {}", warning);
    }

    match report.outcome {
        RunOutcome::Success | RunOutcome::SuccessWithTestWarning => {
            if !report.installed.is_empty() {
                println!("Installed: {}", report.installed.join(", "));
            }
            if !report.skipped.is_empty() {
                println!("Already installed: {}", report.skipped.join(", "));
            }
            let prefix = controller.environment().prefix_for(&report.target);
            println!("[COMPLETE] {} -> {}", report.target, prefix.display());
            Ok(())
        }
        RunOutcome::Failed(e) => {
            if let Some((formula, stage, command, code)) = e.stage_failure() {
                println!(
                    "[FAILED] {} {} stage: `{}` exited with code {}",
                    formula, stage, command, code
                );
            }
            println!("Run id: {}", report.run_id);
            Err(anyhow::Error::new(e).context(format!("Failed to install {}", report.target)))
        }
    }
}
