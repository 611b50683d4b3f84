//! Directory and presence payload types.

use serde::{Deserialize, Serialize};

use crate::{Identity, PublicKey, UserRecord};

/// Client publishes its public key
///
/// `identity` must name the identity bound to the sending connection; the
/// relay ignores registrations for any other identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterKey {
    /// Identity the key belongs to
    pub identity: Identity,
    /// The key itself
    pub public_key: PublicKey,
}

/// Directory snapshot, reply to `ListUsers`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserList {
    /// Every identity the relay has seen, with its last known key
    pub users: Vec<UserRecord>,
}

/// Presence transition, pushed to every connected client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Presence {
    /// Identity whose status changed
    pub identity: Identity,
    /// True on connect, false on disconnect
    pub online: bool,
}
