//! IPC error types

use thiserror::Error;

/// IPC error types
#[derive(Debug, Error)]
pub enum IpcError {
    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// The other end closed the channel
    #[error("Connection closed")]
    ConnectionClosed,
}

impl IpcError {
    /// Check if only a single message was affected
    pub fn is_message_error(&self) -> bool {
        matches!(self, IpcError::DeserializationError(_))
    }
}

impl From<std::io::Error> for IpcError {
    fn from(err: std::io::Error) -> Self {
        IpcError::IoError(err.to_string())
    }
}
