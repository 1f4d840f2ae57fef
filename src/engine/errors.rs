//! # Engine Error Types
//!
//! Error taxonomy shared by every action engine and the handlers it drives.
//! Handlers return these as values; the worker loop never terminates because
//! of one of them.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Unknown operation '{operation}' for resource {resource}")]
    UnknownOperation { resource: String, operation: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("{entity} not found: {key}")]
    NotFound { entity: String, key: String },

    #[error("Storage error during {operation}: {message}")]
    Storage { operation: String, message: String },

    #[error("Operation '{operation}' on {resource} timed out after {timeout_ms}ms")]
    Timeout {
        resource: String,
        operation: String,
        timeout_ms: u64,
    },

    #[error("Action engine for {resource} is closed")]
    Closed { resource: String },

    #[error("Handler for '{operation}' on {resource} panicked: {message}")]
    HandlerPanicked {
        resource: String,
        operation: String,
        message: String,
    },
}

impl EngineError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn missing_parameter(key: &str) -> Self {
        Self::validation(format!("missing required parameter '{key}'"))
    }

    pub fn not_found(entity: impl Into<String>, key: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            key: key.into(),
        }
    }

    pub fn storage(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Storage {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Errors raised by the caller side of the queue rather than by a handler
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Closed { .. })
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
