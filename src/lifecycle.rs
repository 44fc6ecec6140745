// src/lifecycle.rs

//! Install run state machine
//!
//! A run moves through
//! `Resolving -> Ordering -> InstallingDependencies -> InstallingTarget ->
//! Testing (optional) -> Done | Failed`, and every state it visits is kept in
//! the `RunReport`.
//!
//! Formulas whose latest install record from the same repository is already
//! satisfying are skipped, so re-running a finished install executes nothing. The first failing
//! dependency ends the run and nothing that depends on it is attempted.
//! Records of formulas installed earlier in a failed run are kept; there is
//! no rollback.
//!
//! # Example
//!
//! ```ignore
//! use formulary::lifecycle::{LifecycleController, RunOptions};
//!
//! let controller = LifecycleController::new(&index, &conn, environment, lock_path, work_root);
//! let report = controller.run("muon", &RunOptions { run_tests: true, ..Default::default() });
//! if let RunOutcome::Failed(e) = &report.outcome {
//!     eprintln!("{e}");
//! }
//! ```

use crate::db::models::{InstallRecord, InstallStatus};
use crate::environment::Environment;
use crate::error::{Error, Result};
use crate::formula::{DuplicateFormulaName, Formula, FormulaIndex, Resolution};
use crate::graph::DependencyGraph;
use crate::lock::{SharedDirsGuard, SharedDirsLock};
use crate::progress::{FormulaEvent, LogProgress, ProgressTracker};
use crate::source::{LocalSourceFetcher, SourceFetcher};
use crate::stage::{AbortHandle, CommandExecutor, ShellExecutor, Stage, StageLog, StageRunner};
use rusqlite::Connection;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// States of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Resolving,
    Ordering,
    InstallingDependencies,
    InstallingTarget,
    Testing,
    Done,
    Failed,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Resolving => "resolving",
            RunState::Ordering => "ordering",
            RunState::InstallingDependencies => "installing_dependencies",
            RunState::InstallingTarget => "installing_target",
            RunState::Testing => "testing",
            RunState::Done => "done",
            RunState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Done | RunState::Failed)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller choices for a run
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Run the target's test stage after installing it
    pub run_tests: bool,
    /// Install the target even if it is already installed
    pub reinstall: bool,
    /// Build from head sources where available
    pub prefer_head: bool,
}

/// Non-fatal findings of a run
#[derive(Debug)]
pub enum RunWarning {
    /// A dependency name matched formulas from several repositories
    DuplicateFormulaName(DuplicateFormulaName),
    /// The target installed but its tests failed; holds `Error::TestFailed`
    TestFailed(Error),
}

impl fmt::Display for RunWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunWarning::DuplicateFormulaName(dup) => write!(
                f,
                "formula '{}' is provided by {}; used '{}'",
                dup.name,
                dup.repositories.join(", "),
                dup.chosen
            ),
            RunWarning::TestFailed(e) => match e.stage_failure() {
                Some((_, _, command, code)) => {
                    write!(f, "{}: `{}` exited with code {}", e, command, code)
                }
                None => write!(f, "{}", e),
            },
        }
    }
}

/// How a run ended
#[derive(Debug)]
pub enum RunOutcome {
    Success,
    /// Installed, but the requested tests failed (see the warnings)
    SuccessWithTestWarning,
    Failed(Error),
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, RunOutcome::Failed(_))
    }

    pub fn error(&self) -> Option<&Error> {
        match self {
            RunOutcome::Failed(e) => Some(e),
            _ => None,
        }
    }
}

/// Everything that happened during a run
#[derive(Debug)]
pub struct RunReport {
    pub run_id: String,
    /// Target name as requested, replaced by the formula's own name once resolved
    pub target: String,
    /// Install order; empty if the run failed before ordering finished
    pub order: Vec<String>,
    /// States visited, in order; the last one is terminal
    pub states: Vec<RunState>,
    /// Formulas whose install stage ran to completion in this run
    pub installed: Vec<String>,
    /// Formulas skipped because they were already installed
    pub skipped: Vec<String>,
    /// Final copy of every record written by this run
    pub records: Vec<InstallRecord>,
    pub stage_logs: Vec<StageLog>,
    pub warnings: Vec<RunWarning>,
    pub outcome: RunOutcome,
}

impl RunReport {
    fn new(target: &str) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            target: target.to_string(),
            order: Vec::new(),
            states: Vec::new(),
            installed: Vec::new(),
            skipped: Vec::new(),
            records: Vec::new(),
            stage_logs: Vec::new(),
            warnings: Vec::new(),
            outcome: RunOutcome::Success,
        }
    }

    /// The state the run ended in
    pub fn final_state(&self) -> RunState {
        self.states.last().copied().unwrap_or(RunState::Resolving)
    }

    /// Number of stages that ran to completion
    pub fn stage_invocations(&self) -> usize {
        self.stage_logs.len()
    }

    fn enter(&mut self, state: RunState) {
        debug!("Run {} entering state {}", self.run_id, state);
        self.states.push(state);
    }
}

/// What `plan` would do for one formula
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlannedAction {
    Install,
    Skip,
}

/// One entry of an install plan
#[derive(Debug, Clone, Serialize)]
pub struct PlannedStep {
    pub name: String,
    pub repository: String,
    pub action: PlannedAction,
}

/// Install order for a target without executing anything
#[derive(Debug, Clone, Serialize)]
pub struct InstallPlan {
    pub target: String,
    pub steps: Vec<PlannedStep>,
    /// `(dependent, dependency)` pairs checked after install
    pub runtime_requirements: Vec<(String, String)>,
    pub duplicates: Vec<DuplicateFormulaName>,
}

struct Prepared {
    resolution: Resolution,
    graph: DependencyGraph,
    order: Vec<String>,
}

/// Drives install runs for one formula index and state database
pub struct LifecycleController<'a> {
    index: &'a FormulaIndex,
    conn: &'a Connection,
    environment: Environment,
    lock_path: PathBuf,
    executor: Arc<dyn CommandExecutor>,
    fetcher: Arc<dyn SourceFetcher>,
    progress: Arc<dyn ProgressTracker>,
    abort: AbortHandle,
}

impl<'a> LifecycleController<'a> {
    /// Create a controller that runs commands with `sh` and builds in `work_root`
    pub fn new(
        index: &'a FormulaIndex,
        conn: &'a Connection,
        environment: Environment,
        lock_path: impl Into<PathBuf>,
        work_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            index,
            conn,
            environment,
            lock_path: lock_path.into(),
            executor: Arc::new(ShellExecutor),
            fetcher: Arc::new(LocalSourceFetcher::new(work_root)),
            progress: Arc::new(LogProgress::new()),
            abort: AbortHandle::new(),
        }
    }

    pub fn with_executor(mut self, executor: Arc<dyn CommandExecutor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn SourceFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressTracker>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_abort_handle(mut self, abort: AbortHandle) -> Self {
        self.abort = abort;
        self
    }

    /// Handle that stops this controller's runs when triggered
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    fn prepare(&self, target: &str, report: Option<&mut RunReport>) -> Result<Prepared> {
        let resolution = self.index.resolve(target)?;

        if let Some(report) = report {
            report.target = resolution.target.name.clone();
            report.warnings.extend(
                resolution
                    .duplicates
                    .iter()
                    .cloned()
                    .map(RunWarning::DuplicateFormulaName),
            );
            report.enter(RunState::Ordering);
        }

        let graph = DependencyGraph::from_closure(&resolution.target, &resolution.formulas)?;
        let order = graph.install_order()?;

        Ok(Prepared {
            resolution,
            graph,
            order,
        })
    }

    /// Compute what a run would do, without locking or executing anything
    pub fn plan(&self, target: &str, options: &RunOptions) -> Result<InstallPlan> {
        let prepared = self.prepare(target, None)?;
        let target_name = prepared.resolution.target.name.clone();

        let mut steps = Vec::with_capacity(prepared.order.len());
        let mut duplicates = prepared.resolution.duplicates.clone();
        for name in &prepared.order {
            let formula = self.formula(&prepared.resolution, name)?;
            let is_target = formula.name == target_name;
            let satisfied = InstallRecord::is_satisfied(self.conn, &formula)?;
            let action = if satisfied && !(is_target && options.reinstall) {
                PlannedAction::Skip
            } else {
                duplicates.extend(self.installed_elsewhere(&formula)?);
                PlannedAction::Install
            };
            steps.push(PlannedStep {
                name: formula.name.clone(),
                repository: formula.repository.clone(),
                action,
            });
        }

        Ok(InstallPlan {
            target: target_name,
            steps,
            runtime_requirements: prepared
                .graph
                .runtime_requirements()
                .into_iter()
                .map(|(a, b)| (a.to_string(), b.to_string()))
                .collect(),
            duplicates,
        })
    }

    fn formula(&self, resolution: &Resolution, name: &str) -> Result<Arc<Formula>> {
        resolution
            .formulas
            .get(&name.to_lowercase())
            .cloned()
            .ok_or_else(|| Error::MissingDependency {
                name: name.to_string(),
                required_by: resolution.target.name.clone(),
            })
    }

    /// Install `target` and everything it depends on
    ///
    /// Never panics on a failed install: the failure is the report's outcome.
    pub fn run(&self, target: &str, options: &RunOptions) -> RunReport {
        let mut report = RunReport::new(target);
        info!("Starting run {} for {}", report.run_id, target);
        report.enter(RunState::Resolving);

        match self.execute(&mut report, options) {
            Ok(outcome) => {
                report.enter(RunState::Done);
                let message = match &outcome {
                    RunOutcome::SuccessWithTestWarning => {
                        format!("{} installed with test warnings", report.target)
                    }
                    _ => format!("{} installed", report.target),
                };
                info!("Run {} done: {}", report.run_id, message);
                self.progress.run_finished(true, &message);
                report.outcome = outcome;
            }
            Err(e) => {
                report.enter(RunState::Failed);
                warn!("Run {} failed: {}", report.run_id, e);
                self.progress.run_finished(false, &e.to_string());
                report.outcome = RunOutcome::Failed(e);
            }
        }

        report
    }

    fn execute(&self, report: &mut RunReport, options: &RunOptions) -> Result<RunOutcome> {
        let prepared = self.prepare(&report.target.clone(), Some(&mut *report))?;
        let target = Arc::clone(&prepared.resolution.target);
        report.order = prepared.order.clone();
        info!("Install order: {}", prepared.order.join(" -> "));

        let guard = SharedDirsLock::acquire(&self.lock_path)?;
        let runner = StageRunner::new(self.executor.as_ref(), self.abort.clone());
        self.progress.run_started(&target.name, prepared.order.len());

        report.enter(RunState::InstallingDependencies);
        for name in prepared.order.iter().filter(|n| **n != target.name) {
            let formula = self.formula(&prepared.resolution, name)?;

            if InstallRecord::is_satisfied(self.conn, &formula)? {
                info!("{} is already installed, skipping", formula.name);
                report.skipped.push(formula.name.clone());
                self.progress.formula_done(&formula.name, FormulaEvent::Skipped);
                continue;
            }

            if let Err(e) = self.install(&runner, &formula, options, &guard, report, true) {
                return Err(match e {
                    Error::Aborted { .. } => e,
                    e => Error::DependencyInstallFailed {
                        name: formula.name.clone(),
                        source: Box::new(e),
                    },
                });
            }
        }

        report.enter(RunState::InstallingTarget);
        let already = InstallRecord::is_satisfied(self.conn, &target)?;
        let target_install = if already && !options.reinstall {
            info!("{} is already installed, skipping", target.name);
            report.skipped.push(target.name.clone());
            self.progress.formula_done(&target.name, FormulaEvent::Skipped);
            None
        } else {
            // With tests pending the record stays `installing` until they end
            match self.install(&runner, &target, options, &guard, report, !options.run_tests) {
                Ok(installed) => Some(installed),
                Err(e @ Error::Aborted { .. }) => return Err(e),
                Err(e) => {
                    return Err(Error::TargetInstallFailed {
                        name: target.name.clone(),
                        source: Box::new(e),
                    });
                }
            }
        };

        if let Err(e) = self.check_runtime_requirements(&prepared) {
            if let Some((mut record, _)) = target_install
                && !record.status.is_final()
            {
                self.finish_record(report, &mut record, InstallStatus::Installed, None)?;
            }
            return Err(e);
        }

        let Some((mut record, work_dir)) = target_install else {
            return Ok(RunOutcome::Success);
        };
        if !options.run_tests {
            return Ok(RunOutcome::Success);
        }

        report.enter(RunState::Testing);
        self.progress.stage_started(&target.name, Stage::Test);
        let bindings = self.environment.bindings(&target.name);

        match runner.run(&target, Stage::Test, &bindings, &work_dir, &guard) {
            Ok(log) => {
                report.stage_logs.push(log);
                self.finish_record(report, &mut record, InstallStatus::Installed, None)?;
                Ok(RunOutcome::Success)
            }
            Err(e @ Error::Aborted { .. }) => {
                // The install itself succeeded
                self.finish_record(report, &mut record, InstallStatus::Installed, None)?;
                Err(e)
            }
            Err(e) => {
                let reason = e.to_string();
                let err = Error::TestFailed {
                    name: target.name.clone(),
                    source: Box::new(e),
                };
                warn!("{}: {}", err, reason);
                self.finish_record(
                    report,
                    &mut record,
                    InstallStatus::InstalledWithTestWarning,
                    Some(reason),
                )?;
                report.warnings.push(RunWarning::TestFailed(err));
                Ok(RunOutcome::SuccessWithTestWarning)
            }
        }
    }

    fn check_runtime_requirements(&self, prepared: &Prepared) -> Result<()> {
        for (dependent, dependency) in prepared.graph.runtime_requirements() {
            let formula = self.formula(&prepared.resolution, dependency)?;
            if !InstallRecord::is_satisfied(self.conn, &formula)? {
                return Err(Error::MissingDependency {
                    name: dependency.to_string(),
                    required_by: dependent.to_string(),
                });
            }
        }
        Ok(())
    }

    /// A same-named formula from another repository that is currently installed
    fn installed_elsewhere(&self, formula: &Formula) -> Result<Option<DuplicateFormulaName>> {
        let Some(other) = InstallRecord::installed_elsewhere(self.conn, formula)? else {
            return Ok(None);
        };
        Ok(Some(DuplicateFormulaName {
            name: formula.name.clone(),
            repositories: vec![
                other.repository.unwrap_or_else(|| "unknown".to_string()),
                formula.repository.clone(),
            ],
            chosen: formula.repository.clone(),
        }))
    }

    /// Write the record's terminal status and mirror it into the report
    fn finish_record(
        &self,
        report: &mut RunReport,
        record: &mut InstallRecord,
        status: InstallStatus,
        failure_reason: Option<String>,
    ) -> Result<()> {
        record.update_status(self.conn, status, failure_reason)?;
        replace_record(report, record);
        Ok(())
    }

    /// Fetch, record and run the install stage for one formula
    ///
    /// With `finish` the record ends `installed` on success; otherwise it is
    /// left `installing` for the caller to finish. A failed stage always ends
    /// the record `failed`. Returns the record and the working directory the
    /// stage used.
    fn install(
        &self,
        runner: &StageRunner<'_>,
        formula: &Formula,
        options: &RunOptions,
        guard: &SharedDirsGuard,
        report: &mut RunReport,
        finish: bool,
    ) -> Result<(InstallRecord, PathBuf)> {
        if let Some(dup) = self.installed_elsewhere(formula)? {
            warn!(
                "{} from '{}' replaces the installed formula from '{}'",
                dup.name, dup.chosen, dup.repositories[0]
            );
            report.warnings.push(RunWarning::DuplicateFormulaName(dup));
        }

        self.progress.stage_started(&formula.name, Stage::Install);

        let locator = formula.source.select(options.prefer_head);
        let mut record = InstallRecord::new(&report.run_id, &formula.name);
        record.repository = Some(formula.repository.clone());
        record.source = locator.map(|l| l.to_string());
        record.insert(self.conn)?;
        record.update_status(self.conn, InstallStatus::Installing, None)?;

        let result = self.fetcher.fetch(formula, locator).and_then(|work_dir| {
            let bindings = self.environment.bindings(&formula.name);
            runner
                .run(formula, Stage::Install, &bindings, &work_dir, guard)
                .map(|log| (log, work_dir))
        });

        match result {
            Ok((log, work_dir)) => {
                if finish {
                    record.update_status(self.conn, InstallStatus::Installed, None)?;
                }
                info!(
                    "{} installed into {}",
                    formula.name,
                    self.environment.prefix_for(&formula.name).display()
                );
                report.stage_logs.push(log);
                report.installed.push(formula.name.clone());
                report.records.push(record.clone());
                self.progress.formula_done(&formula.name, FormulaEvent::Installed);
                Ok((record, work_dir))
            }
            Err(e) => {
                record.update_status(self.conn, InstallStatus::Failed, Some(e.to_string()))?;
                report.records.push(record);
                self.progress.formula_done(&formula.name, FormulaEvent::Failed);
                Err(e)
            }
        }
    }
}

fn replace_record(report: &mut RunReport, record: &InstallRecord) {
    match report.records.iter_mut().find(|r| r.id == record.id) {
        Some(existing) => *existing = record.clone(),
        None => report.records.push(record.clone()),
    }
}
