// src/commands/status.rs
//! Status command - show install records

use super::load_config;
use crate::cli::GlobalArgs;
use anyhow::{Context, Result};
use formulary::db;
use formulary::db::models::InstallRecord;

/// Print install records, newest first
pub fn cmd_status(global: &GlobalArgs, name: Option<&str>, json: bool) -> Result<()> {
    let config = load_config(global)?;
    let conn = db::open(&config.db_path()).context("Failed to open state database")?;

    let records = match name {
        Some(name) => InstallRecord::list_for_formula(&conn, name)?,
        None => InstallRecord::list_all(&conn)?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No install records.");
        return Ok(());
    }

    println!("{:<24}  {:<28}  {:<25}  RUN", "FORMULA", "STATUS", "STARTED");
    println!("{}", "-".repeat(100));
    for record in &records {
        // Date and time only
        let started = record.started_at.get(..19).unwrap_or(&record.started_at);
        println!(
            "{:<24}  {:<28}  {:<25}  {}",
            record.formula_name,
            record.status.as_str(),
            started,
            &record.run_id[..8.min(record.run_id.len())]
        );
        if let Some(reason) = &record.failure_reason {
            println!("    {}", reason);
        }
    }

    println!();
    println!("Total: {} record(s)", records.len());
    Ok(())
}
