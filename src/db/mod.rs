// src/db/mod.rs

//! Persistent run state
//!
//! A single SQLite database under the state directory holds one install
//! record per formula install attempt. The latest record for a name decides
//! whether that formula is already present.

pub mod models;
pub mod schema;

use crate::error::{Error, Result};
use rusqlite::Connection;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Database file name inside the state directory
pub const DB_FILE_NAME: &str = "state.db";

/// Open (creating if needed) and migrate the database at `path`
pub fn open(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            Error::IoError(format!(
                "Failed to create state directory {}: {}",
                parent.display(),
                e
            ))
        })?;
    }

    debug!("Opening database at {}", path.display());
    let conn = Connection::open(path)?;
    conn.busy_timeout(Duration::from_secs(5))?;
    conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")?;
    schema::migrate(&conn)?;
    Ok(conn)
}

/// Open a migrated in-memory database
pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;
    schema::migrate(&conn)?;
    Ok(conn)
}
