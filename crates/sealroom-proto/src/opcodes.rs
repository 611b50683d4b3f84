//! Operation codes for Sealroom protocol frames.
//!
//! # Opcode Ranges
//!
//! - `0x0000-0x00FF`: Session (connection lifecycle)
//! - `0x1000-0x10FF`: Directory and presence
//! - `0x2000-0x20FF`: Room membership
//! - `0x3000-0x30FF`: Encrypted message routing

use serde_repr::{Deserialize_repr, Serialize_repr};

/// Frame operation codes
///
/// Opcodes are serialized as Big Endian `u16` values in the frame header.
/// Unknown values decode to `None` via [`Opcode::from_u16`] and must be
/// rejected with [`ProtocolError::InvalidOpcode`](crate::ProtocolError::InvalidOpcode).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize_repr, Deserialize_repr)]
#[repr(u16)]
pub enum Opcode {
    // Session (0x0000-0x00FF)
    /// Client handshake carrying the chosen identity
    Hello = 0x0001,
    /// Server acknowledgement of an accepted handshake
    HelloReply = 0x0002,
    /// Graceful disconnect (either direction)
    Goodbye = 0x0003,

    // Directory and presence (0x1000-0x10FF)
    /// Client publishes its public key
    RegisterKey = 0x1000,
    /// Client asks for the directory snapshot
    ListUsers = 0x1001,
    /// Server replies with the directory snapshot
    UserList = 0x1002,
    /// Server announces an identity going online or offline
    Presence = 0x1003,

    // Rooms (0x2000-0x20FF)
    /// Client joins a room
    JoinRoom = 0x2000,
    /// Client leaves a room
    LeaveRoom = 0x2001,
    /// Server pushes a room's member list
    RoomUpdate = 0x2002,

    // Messages (0x3000-0x30FF)
    /// Client submits an envelope for one identity
    SendPrivate = 0x3000,
    /// Client submits per-member envelopes for a room
    SendGroup = 0x3001,
    /// Server forwards a private envelope
    PrivateMessage = 0x3002,
    /// Server forwards a group envelope
    GroupMessage = 0x3003,
}

impl Opcode {
    /// Convert to raw u16 value
    #[must_use]
    pub const fn to_u16(self) -> u16 {
        self as u16
    }

    /// Convert from raw u16 value
    #[must_use]
    pub const fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0001 => Some(Self::Hello),
            0x0002 => Some(Self::HelloReply),
            0x0003 => Some(Self::Goodbye),
            0x1000 => Some(Self::RegisterKey),
            0x1001 => Some(Self::ListUsers),
            0x1002 => Some(Self::UserList),
            0x1003 => Some(Self::Presence),
            0x2000 => Some(Self::JoinRoom),
            0x2001 => Some(Self::LeaveRoom),
            0x2002 => Some(Self::RoomUpdate),
            0x3000 => Some(Self::SendPrivate),
            0x3001 => Some(Self::SendGroup),
            0x3002 => Some(Self::PrivateMessage),
            0x3003 => Some(Self::GroupMessage),
            _ => None,
        }
    }

    /// Returns true for opcodes only a client may send.
    #[must_use]
    pub const fn is_client_to_server(self) -> bool {
        matches!(
            self,
            Self::Hello
                | Self::Goodbye
                | Self::RegisterKey
                | Self::ListUsers
                | Self::JoinRoom
                | Self::LeaveRoom
                | Self::SendPrivate
                | Self::SendGroup
        )
    }
}
