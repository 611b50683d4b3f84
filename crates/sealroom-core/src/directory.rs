//! Key directory: identity -> last known public key and live connection.
//!
//! Entries are created on first registration and never removed. The public
//! key survives disconnects so peers can still seal for an offline identity
//! (delivery will be dropped until it reconnects).
//!
//! # Reconnect races
//!
//! Each registration stores a [`ConnectionHandle`] tagged with the
//! connection's generation. [`KeyDirectory::mark_offline`] only clears the
//! handle it is given, so a late disconnect from a replaced connection cannot
//! knock the newer connection offline.

use std::collections::BTreeMap;

use sealroom_proto::{Identity, PublicKey, UserRecord};

/// A live connection as seen by the directory.
///
/// `generation` increases monotonically across every connection the relay
/// establishes, so two handles for the same identity always compare unequal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionHandle {
    /// Transport-assigned connection ID
    pub conn_id: u64,
    /// Relay-assigned establishment counter
    pub generation: u64,
}

/// Directory state for one identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    /// The identity this entry describes
    pub identity: Identity,
    /// Last published key
    pub public_key: Option<PublicKey>,
    /// Current live connection, `None` while offline
    pub connection: Option<ConnectionHandle>,
}

impl DirectoryEntry {
    /// Returns true if the identity has a live connection.
    pub fn is_online(&self) -> bool {
        self.connection.is_some()
    }
}

/// Identity directory owned by the relay.
#[derive(Debug, Default, Clone)]
pub struct KeyDirectory {
    entries: BTreeMap<Identity, DirectoryEntry>,
}

impl KeyDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `identity` to a live connection.
    ///
    /// Creates the entry (with no key) if absent, otherwise replaces the
    /// stored handle. Last writer wins. Registering the same handle twice
    /// leaves the directory unchanged.
    pub fn register(&mut self, identity: &Identity, handle: ConnectionHandle) {
        self.entries
            .entry(identity.clone())
            .and_modify(|entry| entry.connection = Some(handle))
            .or_insert_with(|| DirectoryEntry {
                identity: identity.clone(),
                public_key: None,
                connection: Some(handle),
            });
    }

    /// Replace the stored public key for `identity`.
    ///
    /// Unknown identities are ignored and `false` is returned. Envelopes
    /// already sealed under the old key are unaffected.
    pub fn update_public_key(&mut self, identity: &str, public_key: PublicKey) -> bool {
        match self.entries.get_mut(identity) {
            Some(entry) => {
                entry.public_key = Some(public_key);
                true
            },
            None => false,
        }
    }

    /// Clear the live connection of `identity` if it is still `handle`.
    ///
    /// Returns true if the identity went offline. A stale handle (the identity
    /// has since reconnected) leaves the entry untouched. The public key is
    /// never modified.
    pub fn mark_offline(&mut self, identity: &str, handle: ConnectionHandle) -> bool {
        match self.entries.get_mut(identity) {
            Some(entry) if entry.connection == Some(handle) => {
                entry.connection = None;
                true
            },
            _ => false,
        }
    }

    /// Look up an identity.
    pub fn lookup(&self, identity: &str) -> Option<&DirectoryEntry> {
        self.entries.get(identity)
    }

    /// Live connection for `identity`, if any.
    pub fn live_handle(&self, identity: &str) -> Option<ConnectionHandle> {
        self.entries.get(identity).and_then(|entry| entry.connection)
    }

    /// Snapshot of every known identity and its key.
    ///
    /// Online status is not included. Ordered by identity.
    pub fn list_all(&self) -> Vec<UserRecord> {
        self.entries
            .values()
            .map(|entry| UserRecord {
                identity: entry.identity.clone(),
                public_key: entry.public_key.clone(),
            })
            .collect()
    }

    /// Number of known identities.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no identity was ever registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
