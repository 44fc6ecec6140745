// src/lib.rs

//! Formulary formula engine
//!
//! Installs software from source by running the shell commands a formula
//! declares, after installing everything the formula depends on.
//!
//! # Architecture
//!
//! - Formulas: immutable TOML descriptors loaded into a `FormulaIndex`
//! - Environment: per-formula `{prefix}`, shared `{sysconfdir}`/`{mandir}`
//! - Ordering: build dependencies first, declaration order otherwise
//! - Stages: fail-fast command lists run through a `CommandExecutor`
//! - Lifecycle: one run per target, with install records kept in SQLite

pub mod config;
pub mod db;
pub mod environment;
mod error;
pub mod formula;
pub mod graph;
pub mod lifecycle;
pub mod lock;
pub mod progress;
pub mod source;
pub mod stage;

pub use config::EngineConfig;
pub use environment::{Bindings, Environment, EnvironmentOverrides};
pub use error::{Error, Result};
pub use formula::{Dependency, DependencyKind, Formula, FormulaIndex, SourceLocator};
pub use graph::DependencyGraph;
pub use lifecycle::{
    InstallPlan, LifecycleController, PlannedAction, RunOptions, RunOutcome, RunReport, RunState,
    RunWarning,
};
pub use lock::{SharedDirsGuard, SharedDirsLock};
pub use progress::{FormulaEvent, LogProgress, ProgressTracker, SilentProgress};
pub use source::{LocalSourceFetcher, SourceFetcher};
pub use stage::{AbortHandle, CommandExecutor, CommandOutput, ShellExecutor, Stage, StageRunner};
