// src/stage.rs

//! Stage execution
//!
//! A stage is an ordered list of shell commands from a formula. The runner
//! substitutes every template up front, then executes the commands one by one
//! in the formula's working directory and stops at the first non-zero exit.
//! Partial writes are left in place and there is no timeout.

use crate::environment::Bindings;
use crate::error::{Error, Result};
use crate::formula::Formula;
use crate::lock::SharedDirsGuard;
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// The two stages a formula defines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Install,
    Test,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Install => "install",
            Stage::Test => "test",
        }
    }

    /// Commands of this stage in the given formula
    pub fn commands<'a>(&self, formula: &'a Formula) -> &'a [String] {
        match self {
            Stage::Install => &formula.install_steps,
            Stage::Test => &formula.test_steps,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Thread-safe flag used to request that a run stop
///
/// Clones share the same flag. The runner checks it before every command; a
/// command that has already started is left to finish.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    flag: Arc<AtomicBool>,
}

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request an abort
    pub fn abort(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// What a command needs to know about where it runs
#[derive(Debug, Clone, Copy)]
pub struct CommandContext<'a> {
    pub formula: &'a str,
    pub stage: Stage,
    pub work_dir: &'a Path,
    pub bindings: &'a Bindings,
}

/// Result of one executed command
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandOutput {
    /// Exit code, `-1` if the process was killed by a signal
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs a single substituted command
///
/// Errors are reserved for failing to launch the command at all; a command
/// that ran and exited non-zero is reported through `CommandOutput`.
pub trait CommandExecutor: Send + Sync {
    fn execute(&self, command: &str, ctx: &CommandContext<'_>) -> Result<CommandOutput>;
}

/// Executes commands with `sh -c`
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellExecutor;

impl CommandExecutor for ShellExecutor {
    fn execute(&self, command: &str, ctx: &CommandContext<'_>) -> Result<CommandOutput> {
        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(ctx.work_dir)
            .env("FORMULARY_FORMULA", ctx.formula)
            .env("FORMULARY_STAGE", ctx.stage.as_str())
            .env("FORMULARY_FORMULA_PREFIX", &ctx.bindings.prefix)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| {
                Error::IoError(format!(
                    "Failed to run {} stage of {}: {}",
                    ctx.stage, ctx.formula, e
                ))
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        for line in stdout.lines() {
            info!("[{}:{}] {}", ctx.formula, ctx.stage, line);
        }
        for line in stderr.lines() {
            warn!("[{}:{}] {}", ctx.formula, ctx.stage, line);
        }

        Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout,
            stderr,
        })
    }
}

/// One command as it was run
#[derive(Debug, Clone, Serialize)]
pub struct CommandRecord {
    pub command: String,
    #[serde(flatten)]
    pub output: CommandOutput,
}

/// Everything a successful stage produced
#[derive(Debug, Clone, Serialize)]
pub struct StageLog {
    pub formula: String,
    pub stage: Stage,
    pub commands: Vec<CommandRecord>,
}

/// Executes formula stages through a `CommandExecutor`
pub struct StageRunner<'a> {
    executor: &'a dyn CommandExecutor,
    abort: AbortHandle,
}

impl<'a> StageRunner<'a> {
    pub fn new(executor: &'a dyn CommandExecutor, abort: AbortHandle) -> Self {
        Self { executor, abort }
    }

    /// Run one stage of a formula
    ///
    /// Fails with `UnresolvedVariable` before anything runs if a template
    /// cannot be substituted, with `StageFailed` at the first non-zero exit,
    /// and with `Aborted` if an abort was requested before a command started
    /// or while a command that then exited non-zero was running.
    pub fn run(
        &self,
        formula: &Formula,
        stage: Stage,
        bindings: &Bindings,
        work_dir: &Path,
        _lock: &SharedDirsGuard,
    ) -> Result<StageLog> {
        let commands = stage
            .commands(formula)
            .iter()
            .map(|template| bindings.substitute(template))
            .collect::<Result<Vec<String>>>()?;

        info!(
            "Running {} stage of {} ({} command(s))",
            stage,
            formula.name,
            commands.len()
        );

        if stage == Stage::Install {
            for dir in bindings.directories() {
                fs::create_dir_all(dir).map_err(|e| {
                    Error::IoError(format!("Failed to create {}: {}", dir.display(), e))
                })?;
            }
        }

        let ctx = CommandContext {
            formula: &formula.name,
            stage,
            work_dir,
            bindings,
        };

        let mut log = StageLog {
            formula: formula.name.clone(),
            stage,
            commands: Vec::with_capacity(commands.len()),
        };

        for command in commands {
            if self.abort.is_aborted() {
                warn!("Abort requested, stopping {} stage of {}", stage, formula.name);
                return Err(Error::Aborted {
                    name: formula.name.clone(),
                });
            }

            debug!("[{}:{}] $ {}", formula.name, stage, command);
            let output = self.executor.execute(&command, &ctx)?;

            if !output.success() && self.abort.is_aborted() {
                // The command was interrupted, not broken
                warn!(
                    "`{}` of {} exited with code {} after an abort request",
                    command, formula.name, output.exit_code
                );
                return Err(Error::Aborted {
                    name: formula.name.clone(),
                });
            }

            if !output.success() {
                warn!(
                    "{} stage of {} failed: `{}` exited with code {}",
                    stage, formula.name, command, output.exit_code
                );
                return Err(Error::StageFailed {
                    formula: formula.name.clone(),
                    stage,
                    command,
                    exit_code: output.exit_code,
                });
            }

            log.commands.push(CommandRecord { command, output });
        }

        info!("{} stage of {} completed", stage, formula.name);
        Ok(log)
    }
}
