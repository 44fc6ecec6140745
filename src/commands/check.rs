// src/commands/check.rs
//! Check command - validate a formula file

use anyhow::{Context, Result};
use formulary::formula::{DEFAULT_REPOSITORY, lint_formula, parse_formula_file};
use std::path::Path;

/// Validate a formula file and print any warnings
pub fn cmd_check(path: &Path) -> Result<()> {
    let repository = path
        .parent()
        .and_then(|p| p.file_name())
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| DEFAULT_REPOSITORY.to_string());

    let formula = parse_formula_file(path, &repository)
        .with_context(|| format!("Invalid formula: {}", path.display()))?;

    println!("Formula: {} ({})", formula.name, formula.repository);
    if let Some(source) = formula.source.select(false) {
        println!("Source:  {}", source);
    }
    for dep in &formula.dependencies {
        println!("Depends: {} ({})", dep.name, dep.kind);
    }
    println!(
        "Steps:   {} install, {} test",
        formula.install_steps.len(),
        formula.test_steps.len()
    );

    let warnings = lint_formula(&formula);
    for warning in &warnings {
        println!("Warning: {}", warning);
    }

    if warnings.is_empty() {
        println!("[OK] No issues found");
    } else {
        println!("[OK] {} warning(s)", warnings.len());
    }
    Ok(())
}
