// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use formulary::db;
use formulary::{
    CommandExecutor, CommandOutput, Environment, EnvironmentOverrides, FormulaIndex,
    LifecycleController, ShellExecutor, SilentProgress,
};
use formulary::stage::CommandContext;
use rusqlite::Connection;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Scratch layout for one test: a formula repository, install root and state.
///
/// Keep the value alive for the duration of the test to prevent cleanup.
pub struct TestEnv {
    pub temp: TempDir,
    pub repo: PathBuf,
}

impl TestEnv {
    pub fn new() -> Self {
        let temp = tempfile::tempdir().unwrap();
        let repo = temp.path().join("core");
        fs::create_dir_all(&repo).unwrap();
        Self { temp, repo }
    }

    pub fn prefix_root(&self) -> PathBuf {
        self.temp.path().join("pkg")
    }

    pub fn state_dir(&self) -> PathBuf {
        self.temp.path().join("state")
    }

    pub fn work_root(&self) -> PathBuf {
        self.temp.path().join("work")
    }

    /// Write `<repo>/<name>.toml`
    pub fn write_formula(&self, name: &str, content: &str) -> PathBuf {
        let path = self.repo.join(format!("{}.toml", name));
        fs::write(&path, content).unwrap();
        path
    }

    pub fn index(&self) -> FormulaIndex {
        let mut index = FormulaIndex::new();
        index.load_dir(&self.repo).unwrap();
        index
    }

    pub fn environment(&self) -> Environment {
        Environment::resolve(&EnvironmentOverrides::new(self.prefix_root())).unwrap()
    }

    pub fn open_db(&self) -> Connection {
        db::open(&self.state_dir().join(db::DB_FILE_NAME)).unwrap()
    }

    /// Controller running real shell commands through `executor`
    pub fn controller<'a>(
        &self,
        index: &'a FormulaIndex,
        conn: &'a Connection,
        executor: Arc<CountingExecutor>,
    ) -> LifecycleController<'a> {
        LifecycleController::new(
            index,
            conn,
            self.environment(),
            self.state_dir().join(formulary::SharedDirsLock::FILE_NAME),
            self.work_root(),
        )
        .with_executor(executor)
        .with_progress(Arc::new(SilentProgress::new()))
    }
}

/// Build formula TOML from parts
pub fn formula_toml(name: &str, deps: &[(&str, &str)], install: &[&str], test: &[&str]) -> String {
    let quote = |cmds: &[&str]| {
        cmds.iter()
            .map(|c| format!("{:?}", c))
            .collect::<Vec<_>>()
            .join(", ")
    };

    let mut content = format!(
        "[formula]\nname = \"{}\"\ndescription = \"{} test formula\"\nhomepage = \"https://example.com/{}\"\n\n[source]\nurl = \"https://example.com/{}-1.0.tar.gz\"\nversion = \"1.0\"\n",
        name, name, name, name
    );
    for (dep, kind) in deps {
        content.push_str(&format!(
            "\n[[depends_on]]\nname = \"{}\"\nkind = \"{}\"\n",
            dep, kind
        ));
    }
    content.push_str(&format!(
        "\n[steps]\ninstall = [{}]\ntest = [{}]\n",
        quote(install),
        quote(test)
    ));
    content
}

/// Runs commands with `sh` and remembers `formula:stage:command` for each
#[derive(Default)]
pub struct CountingExecutor {
    calls: Mutex<Vec<String>>,
}

impl CountingExecutor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl CommandExecutor for CountingExecutor {
    fn execute(&self, command: &str, ctx: &CommandContext<'_>) -> formulary::Result<CommandOutput> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{}:{}:{}", ctx.formula, ctx.stage, command));
        ShellExecutor.execute(command, ctx)
    }
}

/// Assert that `path` is a directory
pub fn assert_dir(path: &Path) {
    assert!(path.is_dir(), "expected directory at {}", path.display());
}
