// src/source.rs

//! Source preparation for formula stages
//!
//! Stages run inside a working directory prepared from the formula's source
//! locator. Downloading and unpacking are left to `SourceFetcher`
//! implementations; the engine only needs a directory back.

use crate::error::{Error, Result};
use crate::formula::{Formula, SourceLocator};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Prepares the working directory a formula's stages run in
pub trait SourceFetcher: Send + Sync {
    /// Return the directory to run commands in for `formula`
    fn fetch(&self, formula: &Formula, locator: Option<&SourceLocator>) -> Result<PathBuf>;
}

/// Fetcher that only understands local sources
///
/// A `file://` URL or an absolute path naming an existing directory is used in
/// place. Anything else gets an empty directory at `<work_root>/<name>`.
#[derive(Debug, Clone)]
pub struct LocalSourceFetcher {
    work_root: PathBuf,
}

impl LocalSourceFetcher {
    pub fn new(work_root: impl Into<PathBuf>) -> Self {
        Self {
            work_root: work_root.into(),
        }
    }

    pub fn work_root(&self) -> &Path {
        &self.work_root
    }
}

fn local_dir(url: &str) -> Option<PathBuf> {
    let path = Path::new(url.strip_prefix("file://").unwrap_or(url));
    (path.is_absolute() && path.is_dir()).then(|| path.to_path_buf())
}

impl SourceFetcher for LocalSourceFetcher {
    fn fetch(&self, formula: &Formula, locator: Option<&SourceLocator>) -> Result<PathBuf> {
        if let Some(dir) = locator.and_then(|l| local_dir(l.url())) {
            info!("Using local source for {}: {}", formula.name, dir.display());
            return Ok(dir);
        }

        let dir = self.work_root.join(&formula.name);
        fs::create_dir_all(&dir).map_err(|e| {
            Error::IoError(format!(
                "Failed to create work directory {}: {}",
                dir.display(),
                e
            ))
        })?;

        if let Some(locator) = locator {
            debug!(
                "No local checkout for {} ({}), using {}",
                formula.name,
                locator,
                dir.display()
            );
        }
        Ok(dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::parse_formula;
    use tempfile::TempDir;

    fn formula_with_source(url: &str) -> Formula {
        let content = format!(
            "[formula]\nname = \"demo\"\n[source]\nurl = {:?}\n[steps]\ninstall = [\"true\"]\n",
            url
        );
        parse_formula(&content, "local").unwrap()
    }

    #[test]
    fn test_local_directory_used_in_place() {
        let temp = TempDir::new().unwrap();
        let checkout = temp.path().join("checkout");
        fs::create_dir_all(&checkout).unwrap();

        let fetcher = LocalSourceFetcher::new(temp.path().join("work"));
        for url in [
            format!("file://{}", checkout.display()),
            checkout.display().to_string(),
        ] {
            let formula = formula_with_source(&url);
            let dir = fetcher
                .fetch(&formula, formula.source.select(false))
                .unwrap();
            assert_eq!(dir, checkout);
        }
        assert!(!temp.path().join("work").exists());
    }

    #[test]
    fn test_remote_source_gets_work_dir() {
        let temp = TempDir::new().unwrap();
        let fetcher = LocalSourceFetcher::new(temp.path().join("work"));
        let formula = formula_with_source("https://example.com/demo-1.0.tar.gz");

        let dir = fetcher
            .fetch(&formula, formula.source.select(false))
            .unwrap();
        assert_eq!(dir, temp.path().join("work").join("demo"));
        assert!(dir.is_dir());
    }
}
