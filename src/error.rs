// src/error.rs

//! Error types for the formula engine
//!
//! Every failure a run can end in is a variant here, carrying enough context
//! (formula name, stage, failing command, exit code) for an operator to
//! diagnose it without re-running.

use crate::stage::Stage;
use thiserror::Error;

/// Result type used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while loading, ordering or executing formulas
#[derive(Error, Debug)]
pub enum Error {
    /// The formula descriptor failed validation
    #[error("malformed formula '{name}': {reason}")]
    MalformedFormula { name: String, reason: String },

    /// A referenced formula is not available
    #[error("missing dependency '{name}' (required by '{required_by}')")]
    MissingDependency { name: String, required_by: String },

    /// The dependency graph contains a cycle
    #[error("circular dependency detected: {}", cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },

    /// A command template uses a placeholder with no binding
    #[error("unresolved variable {{{placeholder}}} in command: {command}")]
    UnresolvedVariable { placeholder: String, command: String },

    /// A command in a stage exited non-zero
    #[error("{stage} stage of '{formula}' failed: `{command}` exited with code {exit_code}")]
    StageFailed {
        formula: String,
        stage: Stage,
        command: String,
        exit_code: i32,
    },

    /// Installing a dependency of the target failed
    #[error("dependency '{name}' failed to install")]
    DependencyInstallFailed {
        name: String,
        #[source]
        source: Box<Error>,
    },

    /// Installing the target formula failed
    #[error("target '{name}' failed to install")]
    TargetInstallFailed {
        name: String,
        #[source]
        source: Box<Error>,
    },

    /// The test stage of the target failed
    #[error("tests for '{name}' failed")]
    TestFailed {
        name: String,
        #[source]
        source: Box<Error>,
    },

    /// The operator aborted the run
    #[error("run aborted while processing '{name}'")]
    Aborted { name: String },

    /// A path that must be absolute was not
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Formula or config file could not be parsed
    #[error("parse error: {0}")]
    ParseError(String),

    /// Shared directory lock could not be taken
    #[error("lock error: {0}")]
    LockError(String),

    /// I/O failure with context
    #[error("I/O error: {0}")]
    IoError(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl Error {
    /// Short tag naming the failure kind, stable for scripting
    pub fn kind(&self) -> &'static str {
        match self {
            Error::MalformedFormula { .. } => "MalformedFormula",
            Error::MissingDependency { .. } => "MissingDependency",
            Error::CyclicDependency { .. } => "CyclicDependency",
            Error::UnresolvedVariable { .. } => "UnresolvedVariable",
            Error::StageFailed { .. } => "StageFailed",
            Error::DependencyInstallFailed { .. } => "DependencyInstallFailed",
            Error::TargetInstallFailed { .. } => "TargetInstallFailed",
            Error::TestFailed { .. } => "TestFailed",
            Error::Aborted { .. } => "Aborted",
            Error::InvalidPath(_) => "InvalidPath",
            Error::ParseError(_) => "ParseError",
            Error::LockError(_) => "LockError",
            Error::IoError(_) | Error::Io(_) => "IoError",
            Error::Database(_) => "DatabaseError",
        }
    }

    /// The innermost stage failure, if this error wraps one
    pub fn stage_failure(&self) -> Option<(&str, Stage, &str, i32)> {
        match self {
            Error::StageFailed {
                formula,
                stage,
                command,
                exit_code,
            } => Some((formula, *stage, command, *exit_code)),
            Error::DependencyInstallFailed { source, .. }
            | Error::TargetInstallFailed { source, .. }
            | Error::TestFailed { source, .. } => source.stage_failure(),
            _ => None,
        }
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::ParseError(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_failure_unwraps_nested() {
        let err = Error::TargetInstallFailed {
            name: "a".to_string(),
            source: Box::new(Error::StageFailed {
                formula: "a".to_string(),
                stage: Stage::Install,
                command: "false".to_string(),
                exit_code: 1,
            }),
        };

        let (formula, stage, command, code) = err.stage_failure().unwrap();
        assert_eq!(formula, "a");
        assert_eq!(stage, Stage::Install);
        assert_eq!(command, "false");
        assert_eq!(code, 1);
        assert_eq!(err.kind(), "TargetInstallFailed");
    }

    #[test]
    fn test_display_messages() {
        let err = Error::CyclicDependency {
            cycle: vec!["a".to_string(), "b".to_string(), "a".to_string()],
        };
        assert_eq!(err.to_string(), "circular dependency detected: a -> b -> a");

        let err = Error::UnresolvedVariable {
            placeholder: "libdir".to_string(),
            command: "ls {libdir}".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "unresolved variable {libdir} in command: ls {libdir}"
        );
    }
}
