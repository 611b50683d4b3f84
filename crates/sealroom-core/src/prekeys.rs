//! Opaque prekey bundle store.
//!
//! Clients that want asynchronous session setup publish a bundle here and
//! peers fetch it by identity. The relay never parses bundles.

use std::collections::HashMap;

use sealroom_proto::Identity;

/// In-memory prekey bundles keyed by identity.
#[derive(Debug, Default, Clone)]
pub struct PrekeyStore {
    bundles: HashMap<Identity, Vec<u8>>,
}

impl PrekeyStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `bundle` for `identity`, replacing any previous one.
    pub fn put(&mut self, identity: Identity, bundle: Vec<u8>) {
        self.bundles.insert(identity, bundle);
    }

    /// Fetch the bundle for `identity`.
    pub fn get(&self, identity: &str) -> Option<&[u8]> {
        self.bundles.get(identity).map(Vec::as_slice)
    }
}
