// src/db/models/install_record.rs

//! Install record model - one row per formula install attempt

use crate::error::{Error, Result};
use crate::formula::Formula;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Status of an install attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallStatus {
    Pending,
    Installing,
    Installed,
    /// Installed, but the requested test stage failed
    InstalledWithTestWarning,
    Failed,
}

impl InstallStatus {
    pub fn as_str(&self) -> &str {
        match self {
            InstallStatus::Pending => "pending",
            InstallStatus::Installing => "installing",
            InstallStatus::Installed => "installed",
            InstallStatus::InstalledWithTestWarning => "installed_with_test_warning",
            InstallStatus::Failed => "failed",
        }
    }

    /// Whether a formula in this state counts as present
    pub fn is_satisfying(&self) -> bool {
        matches!(
            self,
            InstallStatus::Installed | InstallStatus::InstalledWithTestWarning
        )
    }

    /// Whether the attempt has ended
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            InstallStatus::Installed
                | InstallStatus::InstalledWithTestWarning
                | InstallStatus::Failed
        )
    }
}

impl FromStr for InstallStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(InstallStatus::Pending),
            "installing" => Ok(InstallStatus::Installing),
            "installed" => Ok(InstallStatus::Installed),
            "installed_with_test_warning" => Ok(InstallStatus::InstalledWithTestWarning),
            "failed" => Ok(InstallStatus::Failed),
            _ => Err(format!("Invalid install status: {s}")),
        }
    }
}

impl fmt::Display for InstallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted install attempt
#[derive(Debug, Clone, Serialize)]
pub struct InstallRecord {
    pub id: Option<i64>,
    pub run_id: String,
    pub formula_name: String,
    pub repository: Option<String>,
    /// Source locator the formula was built from
    pub source: Option<String>,
    pub status: InstallStatus,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub failure_reason: Option<String>,
}

const COLUMNS: &str = "id, run_id, formula_name, repository, source, status, \
                       started_at, finished_at, failure_reason";

impl InstallRecord {
    /// Create a new pending record
    pub fn new(run_id: impl Into<String>, formula_name: impl Into<String>) -> Self {
        Self {
            id: None,
            run_id: run_id.into(),
            formula_name: formula_name.into(),
            repository: None,
            source: None,
            status: InstallStatus::Pending,
            started_at: Utc::now().to_rfc3339(),
            finished_at: None,
            failure_reason: None,
        }
    }

    /// Insert this record into the database
    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        conn.execute(
            "INSERT INTO install_records
                (run_id, formula_name, repository, source, status, started_at, finished_at, failure_reason)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                &self.run_id,
                &self.formula_name,
                &self.repository,
                &self.source,
                self.status.as_str(),
                &self.started_at,
                &self.finished_at,
                &self.failure_reason,
            ],
        )?;

        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    /// Update the status, stamping `finished_at` on final states
    ///
    /// A record leaves a final state never: updating one fails.
    pub fn update_status(
        &mut self,
        conn: &Connection,
        new_status: InstallStatus,
        failure_reason: Option<String>,
    ) -> Result<()> {
        let id = self.id.ok_or_else(|| {
            Error::IoError("Cannot update install record without ID".to_string())
        })?;
        if self.status.is_final() {
            return Err(Error::IoError(format!(
                "Install record {} for {} is already {}",
                id, self.formula_name, self.status
            )));
        }

        let finished_at = new_status.is_final().then(|| Utc::now().to_rfc3339());

        conn.execute(
            "UPDATE install_records
             SET status = ?1, finished_at = ?2, failure_reason = ?3
             WHERE id = ?4",
            params![new_status.as_str(), &finished_at, &failure_reason, id],
        )?;

        self.status = new_status;
        self.finished_at = finished_at;
        self.failure_reason = failure_reason;
        Ok(())
    }

    /// Find a record by ID
    pub fn find_by_id(conn: &Connection, id: i64) -> Result<Option<Self>> {
        let mut stmt =
            conn.prepare(&format!("SELECT {COLUMNS} FROM install_records WHERE id = ?1"))?;
        let record = stmt.query_row([id], Self::from_row).optional()?;
        Ok(record)
    }

    /// Most recent record for a formula name (case-insensitive)
    pub fn latest_for(conn: &Connection, formula_name: &str) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM install_records
             WHERE formula_name = ?1 COLLATE NOCASE
             ORDER BY id DESC LIMIT 1"
        ))?;
        let record = stmt.query_row([formula_name], Self::from_row).optional()?;
        Ok(record)
    }

    /// Most recent record for a formula from one repository
    pub fn latest_for_formula(
        conn: &Connection,
        formula_name: &str,
        repository: &str,
    ) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM install_records
             WHERE formula_name = ?1 COLLATE NOCASE AND repository = ?2
             ORDER BY id DESC LIMIT 1"
        ))?;
        let record = stmt
            .query_row(params![formula_name, repository], Self::from_row)
            .optional()?;
        Ok(record)
    }

    /// Whether this exact formula (name and repository) is present
    ///
    /// False once a same-named formula from another repository has been
    /// installed over it.
    pub fn is_satisfied(conn: &Connection, formula: &Formula) -> Result<bool> {
        let own = Self::latest_for_formula(conn, &formula.name, &formula.repository)?
            .is_some_and(|r| r.status.is_satisfying());
        Ok(own && Self::installed_elsewhere(conn, formula)?.is_none())
    }

    /// Satisfying record of a same-named formula from another repository
    ///
    /// Only the latest record for the name counts: once this formula has
    /// been installed over the other one, the other is no longer present.
    pub fn installed_elsewhere(conn: &Connection, formula: &Formula) -> Result<Option<Self>> {
        Ok(Self::latest_for(conn, &formula.name)?.filter(|r| {
            r.status.is_satisfying() && r.repository.as_deref() != Some(formula.repository.as_str())
        }))
    }

    /// All records written by one run, in creation order
    pub fn list_for_run(conn: &Connection, run_id: &str) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM install_records WHERE run_id = ?1 ORDER BY id"
        ))?;
        let records = stmt
            .query_map([run_id], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// All records, newest first
    pub fn list_all(conn: &Connection) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM install_records ORDER BY id DESC"
        ))?;
        let records = stmt
            .query_map([], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// All records for one formula, newest first
    pub fn list_for_formula(conn: &Connection, formula_name: &str) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM install_records
             WHERE formula_name = ?1 COLLATE NOCASE
             ORDER BY id DESC"
        ))?;
        let records = stmt
            .query_map([formula_name], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let status_str: String = row.get(5)?;
        let status = status_str.parse::<InstallStatus>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                5,
                rusqlite::types::Type::Text,
                Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
            )
        })?;

        Ok(Self {
            id: Some(row.get(0)?),
            run_id: row.get(1)?,
            formula_name: row.get(2)?,
            repository: row.get(3)?,
            source: row.get(4)?,
            status,
            started_at: row.get(6)?,
            finished_at: row.get(7)?,
            failure_reason: row.get(8)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;
    use crate::formula::parse_formula;

    #[test]
    fn test_insert_and_find() {
        let conn = open_in_memory().unwrap();
        let mut record = InstallRecord::new("run-1", "muon");
        record.repository = Some("puxxustc".to_string());
        let id = record.insert(&conn).unwrap();

        let found = InstallRecord::find_by_id(&conn, id).unwrap().unwrap();
        assert_eq!(found.formula_name, "muon");
        assert_eq!(found.status, InstallStatus::Pending);
        assert_eq!(found.repository.as_deref(), Some("puxxustc"));
        assert!(found.finished_at.is_none());
    }

    #[test]
    fn test_update_status_stamps_finish() {
        let conn = open_in_memory().unwrap();
        let mut record = InstallRecord::new("run-1", "muon");
        record.insert(&conn).unwrap();

        record
            .update_status(&conn, InstallStatus::Installing, None)
            .unwrap();
        assert!(record.finished_at.is_none());

        record
            .update_status(&conn, InstallStatus::Failed, Some("make exited 2".to_string()))
            .unwrap();

        let found = InstallRecord::find_by_id(&conn, record.id.unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(found.status, InstallStatus::Failed);
        assert_eq!(found.failure_reason.as_deref(), Some("make exited 2"));
        assert!(found.finished_at.is_some());
    }

    #[test]
    fn test_update_without_id_fails() {
        let conn = open_in_memory().unwrap();
        let mut record = InstallRecord::new("run-1", "muon");
        assert!(
            record
                .update_status(&conn, InstallStatus::Installed, None)
                .is_err()
        );
    }

    fn formula(name: &str, repository: &str) -> Formula {
        let content = format!(
            "[formula]\nname = \"{}\"\n[source]\nurl = \"https://example.com/{}.tar.gz\"\n[steps]\ninstall = [\"true\"]\n",
            name, name
        );
        parse_formula(&content, repository).unwrap()
    }

    fn record(conn: &Connection, run: &str, name: &str, repo: &str, status: InstallStatus) {
        let mut record = InstallRecord::new(run, name);
        record.repository = Some(repo.to_string());
        record.insert(conn).unwrap();
        record.update_status(conn, status, None).unwrap();
    }

    #[test]
    fn test_latest_for_and_satisfied() {
        let conn = open_in_memory().unwrap();
        let muon = formula("muon", "puxxustc");
        assert!(!InstallRecord::is_satisfied(&conn, &muon).unwrap());

        record(&conn, "run-1", "MUON", "puxxustc", InstallStatus::Installed);
        assert!(InstallRecord::is_satisfied(&conn, &muon).unwrap());

        record(&conn, "run-2", "muon", "puxxustc", InstallStatus::Failed);
        let latest = InstallRecord::latest_for(&conn, "muon").unwrap().unwrap();
        assert_eq!(latest.run_id, "run-2");
        assert!(!InstallRecord::is_satisfied(&conn, &muon).unwrap());
    }

    #[test]
    fn test_satisfied_is_per_repository() {
        let conn = open_in_memory().unwrap();
        let upstream = formula("muon", "puxxustc");
        let homebrew = formula("muon", "homebrew");
        record(&conn, "run-1", "muon", "puxxustc", InstallStatus::Installed);

        assert!(InstallRecord::is_satisfied(&conn, &upstream).unwrap());
        assert!(!InstallRecord::is_satisfied(&conn, &homebrew).unwrap());
        assert!(
            InstallRecord::latest_for_formula(&conn, "muon", "homebrew")
                .unwrap()
                .is_none()
        );

        let other = InstallRecord::installed_elsewhere(&conn, &homebrew)
            .unwrap()
            .unwrap();
        assert_eq!(other.repository.as_deref(), Some("puxxustc"));
        assert!(
            InstallRecord::installed_elsewhere(&conn, &upstream)
                .unwrap()
                .is_none()
        );

        // Installing the homebrew formula replaces the other one
        record(&conn, "run-2", "muon", "homebrew", InstallStatus::Installed);
        assert!(
            InstallRecord::installed_elsewhere(&conn, &homebrew)
                .unwrap()
                .is_none()
        );
        assert!(InstallRecord::is_satisfied(&conn, &homebrew).unwrap());
        assert!(!InstallRecord::is_satisfied(&conn, &upstream).unwrap());

        // A failed attempt does not displace what is installed
        record(&conn, "run-3", "muon", "puxxustc", InstallStatus::Failed);
        assert!(InstallRecord::is_satisfied(&conn, &homebrew).unwrap());
    }

    #[test]
    fn test_final_status_is_written_once() {
        let conn = open_in_memory().unwrap();
        let mut record = InstallRecord::new("run-1", "muon");
        record.insert(&conn).unwrap();
        record
            .update_status(&conn, InstallStatus::Installed, None)
            .unwrap();
        let finished_at = record.finished_at.clone();

        assert!(
            record
                .update_status(&conn, InstallStatus::Failed, Some("late".to_string()))
                .is_err()
        );
        let found = InstallRecord::find_by_id(&conn, record.id.unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(found.status, InstallStatus::Installed);
        assert_eq!(found.finished_at, finished_at);
        assert!(found.failure_reason.is_none());
    }

    #[test]
    fn test_list_for_run() {
        let conn = open_in_memory().unwrap();
        for (run, name) in [("r1", "b"), ("r2", "x"), ("r1", "a")] {
            InstallRecord::new(run, name).insert(&conn).unwrap();
        }

        let names: Vec<String> = InstallRecord::list_for_run(&conn, "r1")
            .unwrap()
            .into_iter()
            .map(|r| r.formula_name)
            .collect();
        assert_eq!(names, vec!["b", "a"]);
        assert_eq!(InstallRecord::list_all(&conn).unwrap().len(), 3);
        assert_eq!(InstallRecord::list_for_formula(&conn, "X").unwrap().len(), 1);
    }

    #[test]
    fn test_status_round_trip_and_satisfying() {
        for status in [
            InstallStatus::Pending,
            InstallStatus::Installing,
            InstallStatus::Installed,
            InstallStatus::InstalledWithTestWarning,
            InstallStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<InstallStatus>().unwrap(), status);
        }
        assert!(InstallStatus::InstalledWithTestWarning.is_satisfying());
        assert!(!InstallStatus::Installing.is_satisfying());
        assert!("bogus".parse::<InstallStatus>().is_err());
    }
}
