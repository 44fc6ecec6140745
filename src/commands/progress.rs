// src/commands/progress.rs
//! Terminal progress for install runs
//!
//! An overall bar counts formulas in the install order; a spinner line below
//! it shows which stage is running. Finished formulas are printed above the
//! bars so the history stays visible.

use formulary::{FormulaEvent, ProgressTracker, Stage};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::time::Duration;

/// indicatif-backed tracker
pub struct CliProgress {
    multi: MultiProgress,
    overall: ProgressBar,
    status: ProgressBar,
}

impl CliProgress {
    pub fn new() -> Self {
        let multi = MultiProgress::new();

        let overall = ProgressBar::new(0);
        overall.set_style(
            ProgressStyle::default_bar()
                .template("{msg} ({pos}/{len}) [{bar:40.green/dim}] {percent}%")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("##-"),
        );

        let status = ProgressBar::new_spinner();
        status.set_style(
            ProgressStyle::default_spinner()
                .template("  {spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );

        let overall = multi.add(overall);
        let status = multi.add(status);

        Self {
            multi,
            overall,
            status,
        }
    }
}

impl ProgressTracker for CliProgress {
    fn run_started(&self, target: &str, total: usize) {
        self.overall.set_length(total as u64);
        self.overall.set_message(format!("Installing {}", target));
        self.status.enable_steady_tick(Duration::from_millis(100));
    }

    fn stage_started(&self, formula: &str, stage: Stage) {
        let verb = match stage {
            Stage::Install => "Building",
            Stage::Test => "Testing",
        };
        self.status.set_message(format!("{} {}", verb, formula));
    }

    fn formula_done(&self, formula: &str, event: FormulaEvent) {
        let marker = match event {
            FormulaEvent::Installed => "[OK]",
            FormulaEvent::Skipped => "[SKIP]",
            FormulaEvent::Failed => "[FAILED]",
        };
        let _ = self.multi.println(format!("  {} {} {}", marker, formula, event));
        self.overall.inc(1);
    }

    fn run_finished(&self, success: bool, summary: &str) {
        self.status.finish_and_clear();
        if success {
            self.overall.finish_with_message(summary.to_string());
        } else {
            self.overall.abandon_with_message(summary.to_string());
        }
    }
}
