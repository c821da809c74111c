//! Error types for the Modbus client library

use thiserror::Error;

/// Result type alias for Modbus operations
pub type Result<T> = std::result::Result<T, ModbusError>;

/// Modbus client error type
///
/// `Connection`, `Io` and `Timeout` always leave the transport disconnected;
/// `Protocol` means the stream can no longer be trusted for request/response
/// pairing and is likewise fatal for the current connection. `Validation`
/// is rejected before any byte is written.
#[derive(Error, Debug, Clone)]
pub enum ModbusError {
    /// Connection establishment and liveness errors
    #[error("Connection error: {0}")]
    Connection(String),

    /// Framing and response correlation errors
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Operation exceeded its deadline
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// Underlying stream I/O errors
    #[error("IO error: {0}")]
    Io(String),

    /// Malformed request parameters, rejected before dispatch
    #[error("Validation error: {0}")]
    Validation(String),
}

impl ModbusError {
    pub fn connection(msg: impl Into<String>) -> Self {
        ModbusError::Connection(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        ModbusError::Protocol(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        ModbusError::Timeout(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        ModbusError::Validation(msg.into())
    }

    /// Whether the error terminated the connection it occurred on
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ModbusError::Validation(_))
    }
}

impl From<std::io::Error> for ModbusError {
    fn from(e: std::io::Error) -> Self {
        ModbusError::Io(e.to_string())
    }
}
