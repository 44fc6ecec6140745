// src/lock.rs

//! Exclusive lock over the shared install directories
//!
//! Every formula owns its own prefix, but `sysconfdir` and `mandir` are
//! shared by all of them. A run takes this lock once ordering has succeeded
//! and keeps the guard until it ends; stage execution borrows the guard as
//! proof that the caller holds it.
//!
//! # Example
//!
//! ```ignore
//! use formulary::lock::SharedDirsLock;
//!
//! let guard = SharedDirsLock::acquire(state_dir.join(SharedDirsLock::FILE_NAME))?;
//! runner.run(&formula, Stage::Install, &bindings, &work_dir, &guard)?;
//! // released on drop
//! ```

use crate::error::{Error, Result};
use fs2::FileExt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Lock file guarding `sysconfdir` and `mandir`
pub struct SharedDirsLock;

impl SharedDirsLock {
    /// Lock file name inside the state directory
    pub const FILE_NAME: &'static str = "shared-dirs.lock";

    /// Acquire the lock, blocking until it is available
    pub fn acquire<P: AsRef<Path>>(path: P) -> Result<SharedDirsGuard> {
        let path = path.as_ref();
        if let Some(guard) = Self::try_acquire(path)? {
            return Ok(guard);
        }

        info!(
            "Shared directories are locked by another run, waiting on {}",
            path.display()
        );
        let file = open_lock_file(path)?;
        file.lock_exclusive().map_err(|e| {
            Error::LockError(format!("Failed to lock {}: {}", path.display(), e))
        })?;

        info!("Acquired shared directory lock at {}", path.display());
        Ok(SharedDirsGuard {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Try to acquire the lock without blocking
    ///
    /// Returns `Ok(None)` when another holder has it.
    pub fn try_acquire<P: AsRef<Path>>(path: P) -> Result<Option<SharedDirsGuard>> {
        let path = path.as_ref();
        let file = open_lock_file(path)?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                info!("Acquired shared directory lock at {}", path.display());
                Ok(Some(SharedDirsGuard {
                    file,
                    path: path.to_path_buf(),
                }))
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                debug!("Shared directory lock already held at {}", path.display());
                Ok(None)
            }
            Err(e) => Err(Error::LockError(format!(
                "Failed to try-lock {}: {}",
                path.display(),
                e
            ))),
        }
    }

    /// Check whether anyone currently holds the lock
    pub fn is_held<P: AsRef<Path>>(path: P) -> bool {
        let Ok(file) = File::open(path.as_ref()) else {
            return false;
        };

        match file.try_lock_exclusive() {
            Ok(()) => {
                let _ = file.unlock();
                false
            }
            Err(_) => true,
        }
    }
}

fn open_lock_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            Error::IoError(format!(
                "Failed to create lock directory {}: {}",
                parent.display(),
                e
            ))
        })?;
    }

    File::create(path)
        .map_err(|e| Error::IoError(format!("Failed to open {}: {}", path.display(), e)))
}

/// Proof that the shared directory lock is held
///
/// The lock is released when the guard is dropped.
#[derive(Debug)]
pub struct SharedDirsGuard {
    /// Kept open to hold the flock
    #[allow(dead_code)]
    file: File,
    path: PathBuf,
}

impl SharedDirsGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SharedDirsGuard {
    fn drop(&mut self) {
        info!("Released shared directory lock at {}", self.path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_acquire_and_release() {
        let temp_dir = TempDir::new().unwrap();
        let lock_path = temp_dir.path().join(SharedDirsLock::FILE_NAME);

        let guard = SharedDirsLock::acquire(&lock_path).unwrap();
        assert!(lock_path.exists());
        assert_eq!(guard.path(), lock_path);
        assert!(SharedDirsLock::is_held(&lock_path));

        drop(guard);
        assert!(!SharedDirsLock::is_held(&lock_path));
    }

    #[test]
    fn test_try_acquire_fails_when_held() {
        let temp_dir = TempDir::new().unwrap();
        let lock_path = temp_dir.path().join(SharedDirsLock::FILE_NAME);

        let _held = SharedDirsLock::acquire(&lock_path).unwrap();
        assert!(SharedDirsLock::try_acquire(&lock_path).unwrap().is_none());
    }

    #[test]
    fn test_is_held_without_file() {
        let temp_dir = TempDir::new().unwrap();
        assert!(!SharedDirsLock::is_held(temp_dir.path().join("missing.lock")));
    }

    #[test]
    fn test_creates_parent_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let lock_path = temp_dir.path().join("state/nested").join(SharedDirsLock::FILE_NAME);

        let _guard = SharedDirsLock::acquire(&lock_path).unwrap();
        assert!(lock_path.parent().unwrap().is_dir());
    }
}
