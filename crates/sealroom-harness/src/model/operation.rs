//! Operations for model-based testing.
//!
//! Operations represent every user-visible action in the system. They are
//! generated randomly by proptest and applied to both the model and a
//! simulated relay with real clients.

use arbitrary::Arbitrary;

/// Client identifier (0-indexed).
pub type ClientId = u8;

/// Room identifier (uses u8 to keep test space manageable).
pub type ModelRoomId = u8;

/// Identity string for a model client.
pub fn identity_name(id: ClientId) -> String {
    format!("peer-{id}")
}

/// Room name for a model room.
pub fn room_name(id: ModelRoomId) -> String {
    format!("room-{id}")
}

/// Operations that can be applied to the system.
#[derive(Debug, Clone, Arbitrary)]
pub enum Operation {
    /// Client opens a session.
    Connect {
        /// Client connecting.
        client_id: ClientId,
    },

    /// Client closes its session with a goodbye.
    Disconnect {
        /// Client disconnecting.
        client_id: ClientId,
    },

    /// Client joins a room.
    JoinRoom {
        /// Client joining.
        client_id: ClientId,
        /// Room to join.
        room_id: ModelRoomId,
    },

    /// Client leaves a room.
    LeaveRoom {
        /// Client leaving.
        client_id: ClientId,
        /// Room to leave.
        room_id: ModelRoomId,
    },

    /// Client sends a sealed message to one peer.
    SendPrivate {
        /// Sender.
        client_id: ClientId,
        /// Recipient.
        to: ClientId,
        /// Message content.
        content: SmallMessage,
    },

    /// Client sends a sealed message to every cached member of a room.
    SendGroup {
        /// Sender.
        client_id: ClientId,
        /// Target room.
        room_id: ModelRoomId,
        /// Message content.
        content: SmallMessage,
    },

    /// Advance simulation time.
    ///
    /// Drives the periodic directory refresh.
    AdvanceTime {
        /// Milliseconds to advance.
        millis: u16,
    },
}

impl Operation {
    /// Map every client reference into `0..num_clients`.
    #[must_use]
    pub fn clamp_clients(self, num_clients: usize) -> Self {
        let n = u8::try_from(num_clients).unwrap_or(u8::MAX).max(1);
        match self {
            Self::Connect { client_id } => Self::Connect { client_id: client_id % n },
            Self::Disconnect { client_id } => Self::Disconnect { client_id: client_id % n },
            Self::JoinRoom { client_id, room_id } => {
                Self::JoinRoom { client_id: client_id % n, room_id }
            },
            Self::LeaveRoom { client_id, room_id } => {
                Self::LeaveRoom { client_id: client_id % n, room_id }
            },
            Self::SendPrivate { client_id, to, content } => {
                Self::SendPrivate { client_id: client_id % n, to: to % n, content }
            },
            Self::SendGroup { client_id, room_id, content } => {
                Self::SendGroup { client_id: client_id % n, room_id, content }
            },
            other @ Self::AdvanceTime { .. } => other,
        }
    }
}

/// Small message content for testing.
///
/// Compact so shrunk cases stay readable. The content is deterministic from
/// the seed.
#[derive(Debug, Clone, Arbitrary)]
pub struct SmallMessage {
    /// Message seed.
    pub seed: u8,
    /// Length hint (0-3 maps to empty/small/medium/large).
    pub size_class: u8,
}

impl SmallMessage {
    /// Expand to actual message bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let len = match self.size_class % 4 {
            0 => 0,
            1 => 8,
            2 => 64,
            _ => 256,
        };

        (0..len).map(|i| self.seed.wrapping_add(i as u8)).collect()
    }
}

/// Result of applying an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationResult {
    /// Operation succeeded.
    Ok,

    /// Operation failed with expected error.
    Error(OperationError),
}

/// Expected errors that can occur during operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationError {
    /// Client has no session.
    NotConnected,

    /// Client already has a session.
    AlreadyConnected,

    /// Recipient is missing from the sender's directory snapshot.
    PeerNotFound,

    /// Sender has not joined the room.
    RoomNotJoined,

    /// Invalid client ID.
    InvalidClient,
}

impl OperationResult {
    /// Check if operation succeeded.
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }

    /// Check if operation failed.
    pub fn is_err(&self) -> bool {
        !self.is_ok()
    }
}
