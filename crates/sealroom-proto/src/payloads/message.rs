//! Encrypted message payload types.
//!
//! Group messages are never a single broadcast ciphertext. The sender seals
//! one envelope per recipient and submits them together; the relay forwards
//! each one independently.

use serde::{Deserialize, Serialize};

use crate::{Envelope, GroupPacket, Identity, RoomName};

/// Client submits an envelope for a single identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendPrivate {
    /// Destination identity
    pub to: Identity,
    /// Envelope sealed for `to`
    pub envelope: Envelope,
}

/// Client submits per-member envelopes for a room
///
/// The room tag is display metadata; the relay does not check that the
/// destinations are members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendGroup {
    /// Room the message belongs to
    pub room: RoomName,
    /// One envelope per destination
    pub packets: Vec<GroupPacket>,
}

/// Private envelope forwarded to its recipient
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateMessage {
    /// The envelope, unchanged
    pub envelope: Envelope,
}

/// Group envelope forwarded to one member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMessage {
    /// Room tag copied from the dispatch
    pub room: RoomName,
    /// The envelope, unchanged
    pub envelope: Envelope,
}
