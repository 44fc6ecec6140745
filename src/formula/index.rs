// src/formula/index.rs

//! Formula index: the set of formulas available to a run
//!
//! Formulas are keyed by `(lowercased name, repository)`. Two formulas with
//! the same name from different repositories are both kept; lookups pick one
//! and report the conflict instead of silently merging them.

use crate::error::{Error, Result};
use crate::formula::format::Formula;
use crate::formula::parser::parse_formula_file;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A name provided by more than one repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateFormulaName {
    pub name: String,
    /// Every repository providing the name, in registration order
    pub repositories: Vec<String>,
    /// The repository whose formula was used
    pub chosen: String,
}

/// Outcome of looking a name up
#[derive(Debug, Clone)]
pub enum Lookup {
    Found {
        formula: Arc<Formula>,
        duplicate: Option<DuplicateFormulaName>,
    },
    /// A file with this name existed but failed validation
    Rejected { reason: String },
    Missing,
}

/// The target formula and everything it transitively depends on
#[derive(Debug, Clone)]
pub struct Resolution {
    pub target: Arc<Formula>,
    /// Keyed by lowercased name
    pub formulas: HashMap<String, Arc<Formula>>,
    pub duplicates: Vec<DuplicateFormulaName>,
}

/// Registry of loaded formulas
#[derive(Debug, Default)]
pub struct FormulaIndex {
    formulas: Vec<Arc<Formula>>,
    by_key: HashMap<String, Vec<usize>>,
    rejected: HashMap<String, String>,
}

impl FormulaIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered formulas
    pub fn len(&self) -> usize {
        self.formulas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formulas.is_empty()
    }

    /// Register a formula
    ///
    /// A second formula with the same name in the same repository is an error;
    /// the same name in another repository is kept alongside the first.
    pub fn insert(&mut self, formula: Formula) -> Result<()> {
        let key = formula.key();
        let slots = self.by_key.entry(key).or_default();

        if slots
            .iter()
            .any(|&i| self.formulas[i].repository == formula.repository)
        {
            return Err(Error::MalformedFormula {
                name: formula.name.clone(),
                reason: format!(
                    "already defined in repository '{}'",
                    formula.repository
                ),
            });
        }

        slots.push(self.formulas.len());
        self.formulas.push(Arc::new(formula));
        Ok(())
    }

    /// Record a formula file that failed to load
    pub fn reject(&mut self, name: &str, reason: impl Into<String>) {
        self.rejected.insert(name.to_lowercase(), reason.into());
    }

    /// Load every `*.toml` file in a directory
    ///
    /// The repository label is the directory name. Files that fail to parse or
    /// validate are remembered as rejected rather than aborting the load.
    /// Returns the number of formulas registered.
    pub fn load_dir(&mut self, dir: &Path) -> Result<usize> {
        let repository = dir
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| crate::formula::DEFAULT_REPOSITORY.to_string());

        let mut paths: Vec<PathBuf> = fs::read_dir(dir)
            .map_err(|e| {
                Error::IoError(format!(
                    "Failed to read formula directory {}: {}",
                    dir.display(),
                    e
                ))
            })?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "toml"))
            .collect();
        // Directory iteration order is unspecified
        paths.sort();

        let mut loaded = 0;
        for path in paths {
            match parse_formula_file(&path, &repository) {
                Ok(formula) => {
                    debug!("Loaded formula {} from {}", formula.name, path.display());
                    match self.insert(formula) {
                        Ok(()) => loaded += 1,
                        Err(e) => warn!("Skipping {}: {}", path.display(), e),
                    }
                }
                Err(e) => {
                    warn!("Rejected formula file {}: {}", path.display(), e);
                    let stem = path
                        .file_stem()
                        .map(|s| s.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    self.reject(&stem, e.to_string());
                }
            }
        }

        info!(
            "Loaded {} formula(s) from repository '{}'",
            loaded, repository
        );
        Ok(loaded)
    }

    /// Look a formula up by name (case-insensitive)
    ///
    /// With several candidates, the one from `preferred_repository` wins,
    /// otherwise the first registered.
    pub fn lookup(&self, name: &str, preferred_repository: Option<&str>) -> Lookup {
        let key = name.to_lowercase();

        let Some(slots) = self.by_key.get(&key) else {
            return match self.rejected.get(&key) {
                Some(reason) => Lookup::Rejected {
                    reason: reason.clone(),
                },
                None => Lookup::Missing,
            };
        };

        let chosen = preferred_repository
            .and_then(|repo| {
                slots
                    .iter()
                    .copied()
                    .find(|&i| self.formulas[i].repository == repo)
            })
            .unwrap_or(slots[0]);
        let formula = Arc::clone(&self.formulas[chosen]);

        let duplicate = (slots.len() > 1).then(|| DuplicateFormulaName {
            name: formula.name.clone(),
            repositories: slots
                .iter()
                .map(|&i| self.formulas[i].repository.clone())
                .collect(),
            chosen: formula.repository.clone(),
        });

        Lookup::Found { formula, duplicate }
    }

    /// Load the target and its transitive dependency closure
    ///
    /// A name resolves once per closure: later references to an already
    /// resolved name reuse that formula, so a run never installs two formulas
    /// into the same prefix.
    pub fn resolve(&self, target: &str) -> Result<Resolution> {
        let target_formula = self.require(target, "(requested)", None)?;

        let mut formulas: HashMap<String, Arc<Formula>> = HashMap::new();
        let mut duplicates: Vec<DuplicateFormulaName> = Vec::new();
        let mut queue: VecDeque<Arc<Formula>> = VecDeque::new();

        let (target_formula, dup) = target_formula;
        duplicates.extend(dup);
        formulas.insert(target_formula.key(), Arc::clone(&target_formula));
        queue.push_back(Arc::clone(&target_formula));

        while let Some(current) = queue.pop_front() {
            for dep in &current.dependencies {
                let key = dep.name.to_lowercase();
                if formulas.contains_key(&key) {
                    continue;
                }

                let (formula, dup) =
                    self.require(&dep.name, &current.name, Some(&current.repository))?;
                if let Some(dup) = dup
                    && !duplicates.iter().any(|d| d.name == dup.name)
                {
                    warn!(
                        "Formula name '{}' is provided by several repositories ({}); using '{}'",
                        dup.name,
                        dup.repositories.join(", "),
                        dup.chosen
                    );
                    duplicates.push(dup);
                }

                formulas.insert(key, Arc::clone(&formula));
                queue.push_back(formula);
            }
        }

        Ok(Resolution {
            target: target_formula,
            formulas,
            duplicates,
        })
    }

    fn require(
        &self,
        name: &str,
        required_by: &str,
        preferred_repository: Option<&str>,
    ) -> Result<(Arc<Formula>, Option<DuplicateFormulaName>)> {
        match self.lookup(name, preferred_repository) {
            Lookup::Found { formula, duplicate } => Ok((formula, duplicate)),
            Lookup::Rejected { reason } => Err(Error::MalformedFormula {
                name: name.to_string(),
                reason,
            }),
            Lookup::Missing => Err(Error::MissingDependency {
                name: name.to_string(),
                required_by: required_by.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::parse_formula;

    fn formula(name: &str, repo: &str, deps: &[(&str, &str)]) -> Formula {
        let mut content = format!(
            "[formula]\nname = \"{}\"\n\n[source]\nurl = \"https://example.com/{}.tar.gz\"\n",
            name, name
        );
        for (dep, kind) in deps {
            content.push_str(&format!(
                "\n[[depends_on]]\nname = \"{}\"\nkind = \"{}\"\n",
                dep, kind
            ));
        }
        content.push_str("\n[steps]\ninstall = [\"true\"]\n");
        parse_formula(&content, repo).unwrap()
    }

    #[test]
    fn test_lookup_case_insensitive() {
        let mut index = FormulaIndex::new();
        index.insert(formula("LibMill", "core", &[])).unwrap();

        match index.lookup("libmill", None) {
            Lookup::Found { formula, duplicate } => {
                assert_eq!(formula.name, "LibMill");
                assert!(duplicate.is_none());
            }
            other => panic!("unexpected lookup: {other:?}"),
        }
        assert!(matches!(index.lookup("nope", None), Lookup::Missing));
    }

    #[test]
    fn test_same_repository_duplicate_rejected() {
        let mut index = FormulaIndex::new();
        index.insert(formula("muon", "core", &[])).unwrap();
        assert!(index.insert(formula("Muon", "core", &[])).is_err());
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_duplicate_names_are_not_merged() {
        let mut index = FormulaIndex::new();
        index.insert(formula("muon", "puxxustc", &[])).unwrap();
        index.insert(formula("muon", "homebrew", &[])).unwrap();
        assert_eq!(index.len(), 2);

        match index.lookup("muon", Some("homebrew")) {
            Lookup::Found { formula, duplicate } => {
                assert_eq!(formula.repository, "homebrew");
                let dup = duplicate.unwrap();
                assert_eq!(dup.repositories, vec!["puxxustc", "homebrew"]);
                assert_eq!(dup.chosen, "homebrew");
            }
            other => panic!("unexpected lookup: {other:?}"),
        }

        match index.lookup("muon", None) {
            Lookup::Found { formula, .. } => assert_eq!(formula.repository, "puxxustc"),
            other => panic!("unexpected lookup: {other:?}"),
        }
    }

    #[test]
    fn test_resolve_closure() {
        let mut index = FormulaIndex::new();
        index
            .insert(formula("a", "core", &[("b", "build"), ("c", "runtime")]))
            .unwrap();
        index.insert(formula("b", "core", &[("d", "build")])).unwrap();
        index.insert(formula("c", "core", &[])).unwrap();
        index.insert(formula("d", "core", &[])).unwrap();
        index.insert(formula("unrelated", "core", &[])).unwrap();

        let resolution = index.resolve("A").unwrap();
        assert_eq!(resolution.target.name, "a");
        let mut keys: Vec<&String> = resolution.formulas.keys().collect();
        keys.sort();
        assert_eq!(keys, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_resolve_missing() {
        let mut index = FormulaIndex::new();
        index.insert(formula("a", "core", &[("b", "build")])).unwrap();

        match index.resolve("a").unwrap_err() {
            Error::MissingDependency { name, required_by } => {
                assert_eq!(name, "b");
                assert_eq!(required_by, "a");
            }
            other => panic!("unexpected error: {other}"),
        }

        assert!(matches!(
            index.resolve("zzz"),
            Err(Error::MissingDependency { .. })
        ));
    }

    #[test]
    fn test_resolve_rejected_is_malformed() {
        let mut index = FormulaIndex::new();
        index.insert(formula("a", "core", &[("b", "build")])).unwrap();
        index.reject("b", "install steps cannot be empty");

        assert!(matches!(
            index.resolve("a"),
            Err(Error::MalformedFormula { .. })
        ));
    }

    #[test]
    fn test_resolve_reports_duplicates() {
        let mut index = FormulaIndex::new();
        index.insert(formula("a", "core", &[("b", "build")])).unwrap();
        index.insert(formula("b", "core", &[])).unwrap();
        index.insert(formula("b", "extra", &[])).unwrap();

        let resolution = index.resolve("a").unwrap();
        assert_eq!(resolution.duplicates.len(), 1);
        assert_eq!(resolution.duplicates[0].chosen, "core");
        assert_eq!(resolution.formulas["b"].repository, "core");
    }

    #[test]
    fn test_load_dir() {
        let dir = tempfile::tempdir().unwrap();
        let repo = dir.path().join("tap");
        fs::create_dir_all(&repo).unwrap();

        fs::write(
            repo.join("hello.toml"),
            "[formula]\nname = \"hello\"\n\n[source]\nurl = \"https://example.com/h.tar.gz\"\n\n[steps]\ninstall = [\"true\"]\n",
        )
        .unwrap();
        fs::write(repo.join("broken.toml"), "[formula]\nname = \"broken\"\n").unwrap();
        fs::write(repo.join("README.md"), "not a formula").unwrap();

        let mut index = FormulaIndex::new();
        assert_eq!(index.load_dir(&repo).unwrap(), 1);

        match index.lookup("hello", None) {
            Lookup::Found { formula, .. } => assert_eq!(formula.repository, "tap"),
            other => panic!("unexpected lookup: {other:?}"),
        }
        assert!(matches!(index.lookup("broken", None), Lookup::Rejected { .. }));
    }
}
