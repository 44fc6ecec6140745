// src/config.rs

//! Engine configuration
//!
//! Settings come from a TOML file, then `FORMULARY_*` environment variables,
//! then command-line flags (applied by the binary). Every field has a
//! default, so an empty or absent file is a valid configuration.
//!
//! ```toml
//! prefix_root = "/opt/pkg"
//! sysconfdir = "/etc"
//! state_dir = "/var/lib/formulary"
//! formula_dirs = ["/usr/share/formulary/core"]
//! run_tests = true
//! ```

use crate::db::DB_FILE_NAME;
use crate::environment::EnvironmentOverrides;
use crate::error::{Error, Result};
use crate::lock::SharedDirsLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Config file read when none is given explicitly
pub const DEFAULT_CONFIG_PATH: &str = "/etc/formulary/config.toml";

/// Environment variable overriding `prefix_root`
pub const ENV_PREFIX: &str = "FORMULARY_PREFIX";

/// Environment variable overriding `state_dir`
pub const ENV_STATE_DIR: &str = "FORMULARY_STATE_DIR";

/// Engine settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Root under which each formula gets `<prefix_root>/<name>`
    pub prefix_root: PathBuf,

    /// Shared configuration directory (default `<prefix_root>/etc`)
    pub sysconfdir: Option<PathBuf>,

    /// Manual page directory (default `<prefix_root>/share/man`)
    pub mandir: Option<PathBuf>,

    /// Holds the install record database and the shared directory lock
    pub state_dir: PathBuf,

    /// Scratch space for sources that are not local directories
    pub work_root: PathBuf,

    /// Formula repositories, searched in order
    pub formula_dirs: Vec<PathBuf>,

    /// Run the target's test stage after install
    pub run_tests: bool,

    /// Build from head sources when a formula offers both
    pub prefer_head: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            prefix_root: PathBuf::from("/opt/pkg"),
            sysconfdir: None,
            mandir: None,
            state_dir: PathBuf::from("/var/lib/formulary"),
            work_root: PathBuf::from("/var/cache/formulary/work"),
            formula_dirs: Vec::new(),
            run_tests: false,
            prefer_head: false,
        }
    }
}

impl EngineConfig {
    /// Parse a config from TOML
    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load configuration
    ///
    /// An explicit path must exist. Without one, `DEFAULT_CONFIG_PATH` is read
    /// if present and defaults are used otherwise. Environment overrides are
    /// applied on top.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default = Path::new(DEFAULT_CONFIG_PATH);
                if default.exists() {
                    Self::from_file(default)?
                } else {
                    debug!("No config file at {}, using defaults", DEFAULT_CONFIG_PATH);
                    Self::default()
                }
            }
        };

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading config from {}", path.display());
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::IoError(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
            .map_err(|e| Error::ParseError(format!("{}: {}", path.display(), e)))
    }

    /// Apply environment overrides using `lookup` to read variables
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(prefix) = lookup(ENV_PREFIX).filter(|v| !v.is_empty()) {
            debug!("{} overrides prefix_root: {}", ENV_PREFIX, prefix);
            self.prefix_root = PathBuf::from(prefix);
        }
        if let Some(state) = lookup(ENV_STATE_DIR).filter(|v| !v.is_empty()) {
            debug!("{} overrides state_dir: {}", ENV_STATE_DIR, state);
            self.state_dir = PathBuf::from(state);
        }
    }

    /// Inputs for environment resolution
    pub fn environment_overrides(&self) -> EnvironmentOverrides {
        EnvironmentOverrides {
            prefix_root: self.prefix_root.clone(),
            sysconfdir: self.sysconfdir.clone(),
            mandir: self.mandir.clone(),
        }
    }

    /// Path of the install record database
    pub fn db_path(&self) -> PathBuf {
        self.state_dir.join(DB_FILE_NAME)
    }

    /// Path of the shared directory lock file
    pub fn lock_path(&self) -> PathBuf {
        self.state_dir.join(SharedDirsLock::FILE_NAME)
    }
}
