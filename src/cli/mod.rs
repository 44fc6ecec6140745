// src/cli/mod.rs
//! CLI definitions for formulary
//!
//! The command implementations live in the `commands` module.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "formulary")]
#[command(version)]
#[command(about = "Build and install software from formula descriptors", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Options shared by every command
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Configuration file (default: /etc/formulary/config.toml if present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Root under which each formula is installed
    #[arg(long, global = true)]
    pub prefix: Option<PathBuf>,

    /// Directory holding the state database and lock
    #[arg(long, global = true)]
    pub state_dir: Option<PathBuf>,

    /// Formula repository directory (repeatable, searched in order)
    #[arg(short = 'f', long = "formula-dir", global = true)]
    pub formula_dirs: Vec<PathBuf>,

    /// Verbose output (debug logging)
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Install a formula and its dependencies
    Install {
        /// Formula name
        name: String,

        /// Run the formula's test stage after installing
        #[arg(long)]
        test: bool,

        /// Install again even if already installed
        #[arg(long)]
        reinstall: bool,

        /// Build from head sources where available
        #[arg(long)]
        head: bool,

        /// Disable the progress bar
        #[arg(long)]
        no_progress: bool,
    },

    /// Show the install order for a formula without installing
    Plan {
        /// Formula name
        name: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate a formula file
    Check {
        /// Path to the formula file
        file: PathBuf,
    },

    /// Show install records
    Status {
        /// Only show records for this formula
        name: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}
