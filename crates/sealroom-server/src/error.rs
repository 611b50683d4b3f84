//! Server error types.

use sealroom_core::RelayError;
use thiserror::Error;

/// Errors that can occur in the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Transport/network error
    #[error("transport error: {0}")]
    Transport(String),

    /// Protocol error
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),

    /// Relay rejected an event
    #[error("relay error: {0}")]
    Relay(#[from] RelayError),
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<sealroom_proto::ProtocolError> for ServerError {
    fn from(err: sealroom_proto::ProtocolError) -> Self {
        Self::Protocol(err.to_string())
    }
}
