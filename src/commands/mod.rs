// src/commands/mod.rs
//! Command handlers for the formulary CLI

mod check;
mod install;
mod plan;
pub mod progress;
mod status;

pub use check::cmd_check;
pub use install::{InstallArgs, cmd_install};
pub use plan::cmd_plan;
pub use status::cmd_status;

use crate::cli::GlobalArgs;
use anyhow::{Context, Result};
use formulary::{EngineConfig, FormulaIndex};
use tracing::debug;

/// Load configuration and apply command-line overrides
pub fn load_config(global: &GlobalArgs) -> Result<EngineConfig> {
    let mut config = EngineConfig::load(global.config.as_deref())
        .context("Failed to load configuration")?;

    if let Some(prefix) = &global.prefix {
        config.prefix_root = prefix.clone();
    }
    if let Some(state_dir) = &global.state_dir {
        config.state_dir = state_dir.clone();
    }
    if !global.formula_dirs.is_empty() {
        config.formula_dirs = global.formula_dirs.clone();
    }

    debug!("Effective configuration: {:?}", config);
    Ok(config)
}

/// Load every configured formula repository
pub fn load_index(config: &EngineConfig) -> Result<FormulaIndex> {
    if config.formula_dirs.is_empty() {
        anyhow::bail!("No formula directories configured (use --formula-dir or formula_dirs)");
    }

    let mut index = FormulaIndex::new();
    for dir in &config.formula_dirs {
        index
            .load_dir(dir)
            .with_context(|| format!("Failed to load formulas from {}", dir.display()))?;
    }
    Ok(index)
}
