// src/formula/parser.rs

//! Formula file parsing and validation

use crate::environment::check_template;
use crate::error::{Error, Result};
use crate::formula::format::{
    Dependency, DependencyKind, Formula, FormulaFile, SourceLocator, SourceSpec,
};
use std::path::Path;

/// Repository label used when none is known
pub const DEFAULT_REPOSITORY: &str = "local";

/// Parse and validate a formula from a TOML string
pub fn parse_formula(content: &str, repository: &str) -> Result<Formula> {
    parse_with_hint(content, repository, "<unknown>")
}

/// Parse and validate a formula file
///
/// The file stem is used as the formula name in errors raised before the
/// name itself could be read.
pub fn parse_formula_file(path: &Path, repository: &str) -> Result<Formula> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::IoError(format!(
            "Failed to read formula file {}: {}",
            path.display(),
            e
        ))
    })?;

    let hint = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "<unknown>".to_string());

    parse_with_hint(&content, repository, &hint)
}

fn parse_with_hint(content: &str, repository: &str, hint: &str) -> Result<Formula> {
    let file: FormulaFile = toml::from_str(content).map_err(|e| Error::MalformedFormula {
        name: hint.to_string(),
        reason: format!("invalid formula file: {}", e.message()),
    })?;

    build_formula(file, repository)
}

/// Validate a deserialized formula file and build the immutable `Formula`
pub fn build_formula(file: FormulaFile, repository: &str) -> Result<Formula> {
    let name = file.formula.name.trim().to_string();
    let malformed = |reason: String| Error::MalformedFormula {
        name: if name.is_empty() {
            "<unnamed>".to_string()
        } else {
            name.clone()
        },
        reason,
    };

    if name.is_empty() {
        return Err(malformed("name cannot be empty".to_string()));
    }
    if name == "." || name == ".." || name.contains('/') || name.contains('\\') {
        return Err(malformed(format!(
            "name '{}' must be a single path component",
            name
        )));
    }

    let source = file.source.unwrap_or_default();
    let stable = source.url.map(|url| SourceLocator::Versioned {
        url,
        version: source.version,
        sha256: source.sha256,
    });
    let head = source.head.map(|url| SourceLocator::Head {
        url,
        branch: source.branch,
    });
    if stable.is_none() && head.is_none() {
        return Err(malformed(
            "no source locator: expected [source] url or head".to_string(),
        ));
    }

    let mut dependencies: Vec<Dependency> = Vec::with_capacity(file.depends_on.len());
    for entry in file.depends_on {
        let dep_name = entry.name.trim().to_string();
        if dep_name.is_empty() {
            return Err(malformed("dependency with empty name".to_string()));
        }

        let kind = match entry.kind.as_deref() {
            None => DependencyKind::Runtime,
            Some(k) => DependencyKind::parse(k).ok_or_else(|| {
                malformed(format!(
                    "unrecognized kind '{}' for dependency '{}' (expected build or runtime)",
                    k, dep_name
                ))
            })?,
        };

        if dep_name.eq_ignore_ascii_case(&name) {
            return Err(malformed("formula cannot depend on itself".to_string()));
        }

        // A name listed twice keeps its first position; build wins over runtime
        if let Some(existing) = dependencies
            .iter_mut()
            .find(|d| d.name.eq_ignore_ascii_case(&dep_name))
        {
            if kind == DependencyKind::Build {
                existing.kind = DependencyKind::Build;
            }
            continue;
        }

        dependencies.push(Dependency {
            name: dep_name,
            kind,
        });
    }

    if file.steps.install.is_empty() {
        return Err(malformed("install steps cannot be empty".to_string()));
    }

    for step in file.steps.install.iter().chain(file.steps.test.iter()) {
        check_template(step)?;
    }

    Ok(Formula {
        name,
        description: file.formula.description,
        homepage: file.formula.homepage,
        repository: file
            .formula
            .repository
            .unwrap_or_else(|| repository.to_string()),
        source: SourceSpec { stable, head },
        dependencies,
        install_steps: file.steps.install,
        test_steps: file.steps.test,
    })
}

/// Non-fatal findings about a valid formula
pub fn lint_formula(formula: &Formula) -> Vec<String> {
    let mut warnings = Vec::new();

    if formula.description.is_none() {
        warnings.push("Missing formula description".to_string());
    }
    if formula.homepage.is_none() {
        warnings.push("Missing formula homepage".to_string());
    }

    if let Some(SourceLocator::Versioned { url, sha256, .. }) = &formula.source.stable
        && sha256.is_none()
    {
        warnings.push(format!("Versioned source {} has no sha256 checksum", url));
    }

    if formula.test_steps.is_empty() {
        warnings.push("No test steps defined".to_string());
    }

    warnings
}
