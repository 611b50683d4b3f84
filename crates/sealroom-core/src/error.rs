//! Error types for the relay core.
//!
//! Undeliverable envelopes are not errors; they are reported as
//! [`Delivery::Dropped`](crate::Delivery::Dropped). What remains here are
//! handshake failures and events the relay cannot attribute to a connection.

use thiserror::Error;

use crate::lifecycle::SessionState;

/// Connection lifecycle failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    /// Handshake carried no identity (or an empty one)
    #[error("handshake rejected: missing identity")]
    MissingIdentity,

    /// Operation not valid in the connection's current state
    #[error("invalid state transition: cannot {operation} from {state:?}")]
    InvalidState {
        /// State the connection was in
        state: SessionState,
        /// Operation that was attempted
        operation: &'static str,
    },
}

/// Errors returned by [`Relay::process_event`](crate::Relay::process_event).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    /// Event for a connection the relay never accepted (or already closed)
    #[error("unknown connection: {0:#018x}")]
    UnknownConnection(u64),

    /// The transport reused a connection ID that is still open
    #[error("duplicate connection: {0:#018x}")]
    DuplicateConnection(u64),
}
