// src/db/models/mod.rs

//! Data models for persisted run state

mod install_record;

pub use install_record::{InstallRecord, InstallStatus};
