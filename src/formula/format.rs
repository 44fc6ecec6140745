// src/formula/format.rs

//! Formula file format definitions
//!
//! Formulas are TOML files. The on-disk shape (`FormulaFile`) accepts almost
//! anything; `parser::build_formula` validates it and turns it into a
//! `Formula`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A formula as it appears on disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormulaFile {
    /// Package metadata
    pub formula: FormulaSection,

    /// Source locations (versioned archive and/or head)
    #[serde(default)]
    pub source: Option<SourceSection>,

    /// Dependencies, in declaration order
    #[serde(default)]
    pub depends_on: Vec<DependencyEntry>,

    /// Lifecycle scripts
    #[serde(default)]
    pub steps: StepsSection,
}

/// Package metadata section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormulaSection {
    /// Formula name
    #[serde(default)]
    pub name: String,

    /// Short description
    #[serde(default)]
    pub description: Option<String>,

    /// Homepage URL
    #[serde(default)]
    pub homepage: Option<String>,

    /// Repository (tap) this formula belongs to
    ///
    /// Overrides the label the index would otherwise derive from the
    /// directory the file was loaded from.
    #[serde(default)]
    pub repository: Option<String>,
}

/// Source section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceSection {
    /// Versioned archive URL
    #[serde(default)]
    pub url: Option<String>,

    /// Version of the archive
    #[serde(default)]
    pub version: Option<String>,

    /// Archive checksum
    #[serde(default)]
    pub sha256: Option<String>,

    /// Latest-source (VCS) URL
    #[serde(default)]
    pub head: Option<String>,

    /// Branch to follow for head builds
    #[serde(default)]
    pub branch: Option<String>,
}

/// A single `[[depends_on]]` entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyEntry {
    /// Name of the required formula
    pub name: String,

    /// `build` or `runtime`; missing means runtime
    #[serde(default)]
    pub kind: Option<String>,
}

/// Lifecycle scripts
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepsSection {
    /// Install commands, run in order
    #[serde(default)]
    pub install: Vec<String>,

    /// Test commands, run after a successful install
    #[serde(default)]
    pub test: Vec<String>,
}

/// Dependency kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyKind {
    /// Must be installed before the dependent's install stage
    Build,
    /// Must be present for the installed artifact to be usable
    Runtime,
}

impl DependencyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DependencyKind::Build => "build",
            DependencyKind::Runtime => "runtime",
        }
    }

    /// Parse a kind string, returning `None` for unknown kinds
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "build" => Some(DependencyKind::Build),
            "runtime" => Some(DependencyKind::Runtime),
            _ => None,
        }
    }
}

impl fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated dependency declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dependency {
    pub name: String,
    pub kind: DependencyKind,
}

/// Where the source of a formula comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceLocator {
    /// A released archive
    Versioned {
        url: String,
        version: Option<String>,
        sha256: Option<String>,
    },
    /// The latest upstream source
    Head { url: String, branch: Option<String> },
}

impl SourceLocator {
    pub fn url(&self) -> &str {
        match self {
            SourceLocator::Versioned { url, .. } | SourceLocator::Head { url, .. } => url,
        }
    }

    pub fn is_head(&self) -> bool {
        matches!(self, SourceLocator::Head { .. })
    }
}

impl fmt::Display for SourceLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceLocator::Versioned {
                url,
                version: Some(v),
                ..
            } => write!(f, "{} ({})", url, v),
            SourceLocator::Versioned { url, .. } => f.write_str(url),
            SourceLocator::Head {
                url,
                branch: Some(b),
            } => write!(f, "HEAD {} ({})", url, b),
            SourceLocator::Head { url, .. } => write!(f, "HEAD {}", url),
        }
    }
}

/// The source references a formula declares
///
/// At least one of `stable`/`head` is always present on a validated formula.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceSpec {
    pub stable: Option<SourceLocator>,
    pub head: Option<SourceLocator>,
}

impl SourceSpec {
    /// Pick the locator to build from
    ///
    /// The versioned archive wins unless head is preferred or it is the only
    /// reference available.
    pub fn select(&self, prefer_head: bool) -> Option<&SourceLocator> {
        if prefer_head {
            self.head.as_ref().or(self.stable.as_ref())
        } else {
            self.stable.as_ref().or(self.head.as_ref())
        }
    }
}

/// A validated, immutable formula
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Formula {
    pub name: String,
    pub description: Option<String>,
    pub homepage: Option<String>,
    /// Provenance label; together with the lowercased name this is the identity
    pub repository: String,
    pub source: SourceSpec,
    pub dependencies: Vec<Dependency>,
    pub install_steps: Vec<String>,
    pub test_steps: Vec<String>,
}

impl Formula {
    /// Case-insensitive lookup key
    pub fn key(&self) -> String {
        self.name.to_lowercase()
    }

    /// Dependencies that must precede this formula's install stage
    pub fn build_dependencies(&self) -> impl Iterator<Item = &Dependency> {
        self.dependencies
            .iter()
            .filter(|d| d.kind == DependencyKind::Build)
    }

    /// Dependencies that must be present for this formula to be usable
    pub fn runtime_dependencies(&self) -> impl Iterator<Item = &Dependency> {
        self.dependencies
            .iter()
            .filter(|d| d.kind == DependencyKind::Runtime)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_select() {
        let stable = SourceLocator::Versioned {
            url: "https://example.com/a-1.0.tar.gz".to_string(),
            version: Some("1.0".to_string()),
            sha256: None,
        };
        let head = SourceLocator::Head {
            url: "https://example.com/a.git".to_string(),
            branch: None,
        };

        let both = SourceSpec {
            stable: Some(stable.clone()),
            head: Some(head.clone()),
        };
        assert_eq!(both.select(false), Some(&stable));
        assert_eq!(both.select(true), Some(&head));

        let head_only = SourceSpec {
            stable: None,
            head: Some(head.clone()),
        };
        assert_eq!(head_only.select(false), Some(&head));
    }

    #[test]
    fn test_dependency_kind_parse() {
        assert_eq!(DependencyKind::parse("build"), Some(DependencyKind::Build));
        assert_eq!(DependencyKind::parse("runtime"), Some(DependencyKind::Runtime));
        assert_eq!(DependencyKind::parse("optional"), None);
    }

    #[test]
    fn test_locator_display() {
        let head = SourceLocator::Head {
            url: "https://github.com/puxxustc/muon.git".to_string(),
            branch: Some("master".to_string()),
        };
        assert_eq!(
            head.to_string(),
            "HEAD https://github.com/puxxustc/muon.git (master)"
        );
    }
}
