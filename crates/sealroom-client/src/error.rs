//! Client error types.

use sealroom_crypto::CryptoError;
use sealroom_proto::{Identity, ProtocolError, RoomName};
use thiserror::Error;

/// Errors from client operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Peer is not in the cached directory, or has published no key.
    #[error("peer not found: {identity}")]
    PeerNotFound {
        /// The identity that was looked up.
        identity: Identity,
    },

    /// Group send to a room this client has not joined.
    #[error("room not joined: {room}")]
    RoomNotJoined {
        /// The room.
        room: RoomName,
    },

    /// Operation needs an established session.
    #[error("not connected")]
    NotConnected,

    /// Sealing failed.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Frame encoding failed.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Frame from the relay could not be decoded or was unexpected.
    #[error("invalid frame: {reason}")]
    InvalidFrame {
        /// Description of the frame error.
        reason: String,
    },

    /// Client is in an invalid state for the operation.
    #[error("invalid state: {reason}")]
    InvalidState {
        /// Description of the state error.
        reason: String,
    },
}

impl ClientError {
    /// Returns true if this error is fatal (unrecoverable).
    ///
    /// Fatal errors indicate protocol violations or bugs. Transient errors
    /// clear up on the next directory refresh, join or reconnect.
    pub fn is_fatal(&self) -> bool {
        match self {
            // Fatal: protocol violations, encoding bugs
            Self::InvalidFrame { .. } | Self::InvalidState { .. } | Self::Protocol(_) => true,

            // Transient: a bad peer key is replaced when the peer re-registers
            Self::Crypto(_)
            | Self::PeerNotFound { .. }
            | Self::RoomNotJoined { .. }
            | Self::NotConnected => false,
        }
    }
}
