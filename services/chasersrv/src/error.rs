//! Error handling for the controller service

use chaser_modbus::ModbusError;
use thiserror::Error;

/// Result type alias for the controller service
pub type Result<T> = std::result::Result<T, ServiceError>;

/// Controller service error type
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Configuration loading or validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors surfaced by the Modbus transport
    #[error(transparent)]
    Modbus(#[from] ModbusError),

    /// Malformed command parameters, rejected with no side effect
    #[error("Validation error: {0}")]
    Validation(String),
}

impl ServiceError {
    pub fn config(msg: impl Into<String>) -> Self {
        ServiceError::Config(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        ServiceError::Validation(msg.into())
    }
}
