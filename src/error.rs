use thiserror::Error;

use crate::config::ConfigurationError;
use crate::engine::EngineError;
use crate::state_machine::ManagerError;

/// Crate-level error aggregating every module's error type
#[derive(Error, Debug)]
pub enum AutomationError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Manager(#[from] ManagerError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

impl AutomationError {
    /// True when the underlying cause is a missing tag, machine or record
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Engine(e) => e.is_not_found(),
            Self::Manager(ManagerError::NotFound { .. }) => true,
            Self::Manager(ManagerError::Engine(e)) => e.is_not_found(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, AutomationError>;
