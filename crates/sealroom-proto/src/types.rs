//! Data types shared by payloads, the relay core, and clients.
//!
//! Byte-carrying types implement `Debug` by hand and print lengths only, so
//! key material and ciphertext never end up in logs.

use std::{borrow::Borrow, fmt};

use serde::{Deserialize, Serialize};

/// A participant's username.
///
/// Opaque, case-sensitive, and chosen by the client at connect time. The relay
/// does not verify ownership.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Wrap a username.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The username as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true for the empty username, which the handshake rejects.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for Identity {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Identity {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Name of a room.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomName(String);

impl RoomName {
    /// Wrap a room name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The room name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true for the empty name, which join and leave ignore.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for RoomName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for RoomName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RoomName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// An opaque public key.
///
/// The relay stores and forwards it; only clients know its algorithm.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PublicKey(Vec<u8>);

impl PublicKey {
    /// Wrap raw key bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Raw key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Key length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true for a zero-length key.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey(<{} bytes>)", self.0.len())
    }
}

/// An encrypted message unit.
///
/// Produced by the sender, forwarded verbatim by the relay, opened by the
/// recipient. Every envelope carries `sender_public_key` so the recipient can
/// authenticate the box without a directory lookup.
///
/// `sender` and `timestamp` are display metadata. The relay does not check
/// that `sender` matches the submitting connection; a forged value only makes
/// decryption fail on the recipient.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Nonce used for sealing
    pub nonce: Vec<u8>,
    /// Sealed message
    pub ciphertext: Vec<u8>,
    /// Public key of the sealing party
    pub sender_public_key: PublicKey,
    /// Claimed sender identity
    pub sender: Identity,
    /// Sender's wall clock at send time (milliseconds since the Unix epoch)
    pub timestamp: u64,
}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Envelope")
            .field("nonce", &format!("<{} bytes>", self.nonce.len()))
            .field("ciphertext", &format!("<{} bytes>", self.ciphertext.len()))
            .field("sender_public_key", &self.sender_public_key)
            .field("sender", &self.sender)
            .field("timestamp", &self.timestamp)
            .finish()
    }
}

/// One individually addressed envelope within a group dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupPacket {
    /// Destination identity
    pub to: Identity,
    /// Envelope sealed for `to`
    pub envelope: Envelope,
}

/// A directory listing entry.
///
/// Online status is deliberately absent; presence is pushed separately.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Registered identity
    pub identity: Identity,
    /// Last published key, if any
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub public_key: Option<PublicKey>,
}
