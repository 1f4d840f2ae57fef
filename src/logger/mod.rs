//! # Resource Loggers
//!
//! Database-backed loggers that run as protected resources behind an action
//! engine. Every logger operation executes inside one transaction, so a
//! failed action leaves storage exactly as it was.

pub mod machines;
pub mod models;

pub use machines::{MachinesLogger, MachinesLoggerEngine};
pub use models::{MachineConfig, MachineRecord, MachineUpdate, NewMachine, TagBinding};

use crate::engine::EngineError;

impl From<sqlx::Error> for EngineError {
    fn from(error: sqlx::Error) -> Self {
        match error {
            sqlx::Error::RowNotFound => EngineError::not_found("Record", "query returned no rows"),
            other => EngineError::storage("database", other.to_string()),
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(error: serde_json::Error) -> Self {
        EngineError::validation(format!("JSON conversion failed: {error}"))
    }
}
