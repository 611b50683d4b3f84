//! Harness errors.

use sealroom_client::ClientError;
use sealroom_core::RelayError;
use sealroom_proto::ProtocolError;
use thiserror::Error;

/// Failures surfaced while driving a simulation.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// A client rejected an event
    #[error("client error: {0}")]
    Client(#[from] ClientError),

    /// The relay rejected an event
    #[error("relay error: {0}")]
    Relay(#[from] RelayError),

    /// A frame failed to encode or decode in transit
    #[error("codec error: {0}")]
    Codec(#[from] ProtocolError),

    /// No peer with this ID was added
    #[error("unknown peer {0}")]
    UnknownPeer(usize),
}
