//! CBOR-encoded frame payloads.
//!
//! Each opcode has a corresponding payload type. The frame header's opcode
//! identifies the payload, so only the inner struct is serialized (no variant
//! tag in CBOR). Payload-less opcodes carry zero bytes.

pub mod directory;
pub mod message;
pub mod room;
pub mod session;

use bytes::BufMut;
use serde::de::DeserializeOwned;

use crate::{
    Frame, FrameHeader, Opcode,
    errors::{ProtocolError, Result},
};

/// All possible frame payloads
///
/// # Invariants
///
/// - Each variant corresponds to exactly one `Opcode`.
/// - Encoding a payload and decoding it under the same opcode yields an equal
///   value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    // Session
    /// Client handshake
    Hello(session::Hello),
    /// Handshake accepted
    HelloReply(session::HelloReply),
    /// Graceful disconnect
    Goodbye(session::Goodbye),

    // Directory and presence
    /// Publish a public key
    RegisterKey(directory::RegisterKey),
    /// Request the directory snapshot
    ListUsers,
    /// Directory snapshot
    UserList(directory::UserList),
    /// Online/offline transition
    Presence(directory::Presence),

    // Rooms
    /// Join a room
    JoinRoom(room::JoinRoom),
    /// Leave a room
    LeaveRoom(room::LeaveRoom),
    /// Member list push
    RoomUpdate(room::RoomUpdate),

    // Messages
    /// Submit a private envelope
    SendPrivate(message::SendPrivate),
    /// Submit per-member group envelopes
    SendGroup(message::SendGroup),
    /// Forwarded private envelope
    PrivateMessage(message::PrivateMessage),
    /// Forwarded group envelope
    GroupMessage(message::GroupMessage),
}

impl Payload {
    /// Get the opcode for this payload variant
    #[must_use]
    pub const fn opcode(&self) -> Opcode {
        match self {
            Self::Hello(_) => Opcode::Hello,
            Self::HelloReply(_) => Opcode::HelloReply,
            Self::Goodbye(_) => Opcode::Goodbye,
            Self::RegisterKey(_) => Opcode::RegisterKey,
            Self::ListUsers => Opcode::ListUsers,
            Self::UserList(_) => Opcode::UserList,
            Self::Presence(_) => Opcode::Presence,
            Self::JoinRoom(_) => Opcode::JoinRoom,
            Self::LeaveRoom(_) => Opcode::LeaveRoom,
            Self::RoomUpdate(_) => Opcode::RoomUpdate,
            Self::SendPrivate(_) => Opcode::SendPrivate,
            Self::SendGroup(_) => Opcode::SendGroup,
            Self::PrivateMessage(_) => Opcode::PrivateMessage,
            Self::GroupMessage(_) => Opcode::GroupMessage,
        }
    }

    /// Encode payload to buffer
    ///
    /// Serializes only the inner struct, NOT the variant tag.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::CborEncode`] if serialization fails.
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<()> {
        let mut writer = dst.writer();

        match self {
            Self::Hello(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::HelloReply(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::Goodbye(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::RegisterKey(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::ListUsers => Ok(()), // Zero-byte payload
            Self::UserList(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::Presence(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::JoinRoom(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::LeaveRoom(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::RoomUpdate(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::SendPrivate(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::SendGroup(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::PrivateMessage(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::GroupMessage(inner) => ciborium::ser::into_writer(inner, &mut writer),
        }
        .map_err(|e| ProtocolError::CborEncode(e.to_string()))
    }

    /// Decode payload from bytes based on opcode
    ///
    /// # Errors
    ///
    /// Returns error if the bytes exceed [`FrameHeader::MAX_PAYLOAD_SIZE`] or
    /// CBOR deserialization fails. The size check runs before parsing.
    pub fn decode(opcode: Opcode, bytes: &[u8]) -> Result<Self> {
        if bytes.len() > FrameHeader::MAX_PAYLOAD_SIZE as usize {
            return Err(ProtocolError::PayloadTooLarge {
                size: bytes.len(),
                max: FrameHeader::MAX_PAYLOAD_SIZE as usize,
            });
        }

        let payload = match opcode {
            Opcode::Hello => Self::Hello(from_cbor(bytes)?),
            Opcode::HelloReply => Self::HelloReply(from_cbor(bytes)?),
            Opcode::Goodbye => Self::Goodbye(from_cbor(bytes)?),
            Opcode::RegisterKey => Self::RegisterKey(from_cbor(bytes)?),
            Opcode::ListUsers => Self::ListUsers,
            Opcode::UserList => Self::UserList(from_cbor(bytes)?),
            Opcode::Presence => Self::Presence(from_cbor(bytes)?),
            Opcode::JoinRoom => Self::JoinRoom(from_cbor(bytes)?),
            Opcode::LeaveRoom => Self::LeaveRoom(from_cbor(bytes)?),
            Opcode::RoomUpdate => Self::RoomUpdate(from_cbor(bytes)?),
            Opcode::SendPrivate => Self::SendPrivate(from_cbor(bytes)?),
            Opcode::SendGroup => Self::SendGroup(from_cbor(bytes)?),
            Opcode::PrivateMessage => Self::PrivateMessage(from_cbor(bytes)?),
            Opcode::GroupMessage => Self::GroupMessage(from_cbor(bytes)?),
        };

        Ok(payload)
    }

    /// Convert payload into a transport frame
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError::CborEncode` if serialization fails
    pub fn into_frame(self) -> Result<Frame> {
        let mut buf = Vec::new();
        self.encode(&mut buf)?;
        Ok(Frame::new(FrameHeader::new(self.opcode()), buf))
    }

    /// Parse payload from a raw transport frame
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidOpcode`] for unknown opcodes, or a
    /// decode error if the payload does not match the opcode's schema.
    pub fn from_frame(frame: &Frame) -> Result<Self> {
        let opcode = frame
            .header
            .opcode_enum()
            .ok_or_else(|| ProtocolError::InvalidOpcode(frame.header.opcode()))?;
        Self::decode(opcode, &frame.payload)
    }
}

fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    ciborium::de::from_reader(bytes).map_err(|e| ProtocolError::CborDecode(e.to_string()))
}
