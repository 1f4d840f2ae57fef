use thiserror::Error;

use crate::engine::EngineError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ManagerError {
    #[error("State machine not found: {name}")]
    NotFound { name: String },

    #[error("State machine '{name}' is already registered")]
    DuplicateMachine { name: String },

    #[error("Interval of {interval_ms}ms for '{name}' is below the minimum of {min_interval_ms}ms")]
    InvalidInterval {
        name: String,
        interval_ms: u64,
        min_interval_ms: u64,
    },

    #[error("Tag store request failed: {0}")]
    Engine(#[from] EngineError),
}

impl ManagerError {
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }
}

pub type ManagerResult<T> = std::result::Result<T, ManagerError>;
