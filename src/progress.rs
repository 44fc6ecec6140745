// src/progress.rs

//! Progress reporting for install runs
//!
//! The lifecycle controller reports run events through `ProgressTracker`:
//! the size of the install order once it is known, each stage as it starts,
//! and each formula once it has been installed, skipped or has failed.
//!
//! - `LogProgress`: reports through tracing
//! - `SilentProgress`: no-op for tests and embedding
//!
//! The binary adds an indicatif-backed tracker for terminals.

use crate::stage::Stage;
use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{info, warn};

/// What became of one formula in the install order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormulaEvent {
    Installed,
    /// Already installed by an earlier run
    Skipped,
    Failed,
}

impl fmt::Display for FormulaEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FormulaEvent::Installed => "installed",
            FormulaEvent::Skipped => "already installed",
            FormulaEvent::Failed => "failed",
        })
    }
}

/// Receives progress events from a run
pub trait ProgressTracker: Send + Sync {
    /// Ordering succeeded; `total` formulas will be handled
    fn run_started(&self, target: &str, total: usize);

    /// A stage of `formula` is about to run
    fn stage_started(&self, formula: &str, stage: Stage);

    fn formula_done(&self, formula: &str, event: FormulaEvent);

    /// The run ended, `success` is false for `Failed`
    fn run_finished(&self, success: bool, summary: &str);
}

/// No-op tracker
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentProgress;

impl SilentProgress {
    pub fn new() -> Self {
        Self
    }
}

impl ProgressTracker for SilentProgress {
    fn run_started(&self, _target: &str, _total: usize) {}

    fn stage_started(&self, _formula: &str, _stage: Stage) {}

    fn formula_done(&self, _formula: &str, _event: FormulaEvent) {}

    fn run_finished(&self, _success: bool, _summary: &str) {}
}

/// Tracker that logs every event, numbered by position in the install order
#[derive(Debug, Default)]
pub struct LogProgress {
    target: Mutex<String>,
    total: AtomicUsize,
    done: AtomicUsize,
}

impl LogProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Formulas handled so far
    pub fn done(&self) -> usize {
        self.done.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::Relaxed)
    }

    fn target(&self) -> String {
        self.target
            .lock()
            .map(|t| t.clone())
            .unwrap_or_default()
    }
}

impl ProgressTracker for LogProgress {
    fn run_started(&self, target: &str, total: usize) {
        if let Ok(mut t) = self.target.lock() {
            *t = target.to_string();
        }
        self.total.store(total, Ordering::Relaxed);
        self.done.store(0, Ordering::Relaxed);
        info!("{}: {} formula(s) to process", target, total);
    }

    fn stage_started(&self, formula: &str, stage: Stage) {
        info!(
            "{} [{}/{}]: {} stage of {}",
            self.target(),
            self.done() + 1,
            self.total(),
            stage,
            formula
        );
    }

    fn formula_done(&self, formula: &str, event: FormulaEvent) {
        let done = self.done.fetch_add(1, Ordering::Relaxed) + 1;
        match event {
            FormulaEvent::Failed => warn!("[{}/{}] {} {}", done, self.total(), formula, event),
            _ => info!("[{}/{}] {} {}", done, self.total(), formula, event),
        }
    }

    fn run_finished(&self, success: bool, summary: &str) {
        if success {
            info!("{}: {}", self.target(), summary);
        } else {
            warn!("{}: {}", self.target(), summary);
        }
    }
}
