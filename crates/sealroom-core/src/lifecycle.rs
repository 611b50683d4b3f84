//! Connection lifecycle: `Connecting -> Established -> Closed`.
//!
//! A connection is tracked from the moment the transport accepts it. The
//! handshake binds it to an identity and registers a fresh
//! [`ConnectionHandle`] in the [`KeyDirectory`]. Disconnect removes the
//! session and performs a compare-and-clear on the directory, so only the
//! connection that is still live for an identity can take it offline.
//!
//! `Closed` is terminal and not stored: a connection the lifecycle no longer
//! tracks reports [`SessionState::Closed`], which makes repeated disconnects
//! no-ops.

use std::collections::HashMap;

use sealroom_proto::{Identity, payloads::session::Hello};

use crate::{
    directory::{ConnectionHandle, KeyDirectory},
    error::LifecycleError,
};

/// Per-connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Accepted by the transport, waiting for `Hello`
    Connecting,
    /// Bound to an identity
    Established,
    /// Terminal
    Closed,
}

#[derive(Debug, Clone)]
struct Session {
    state: SessionState,
    binding: Option<(Identity, ConnectionHandle)>,
}

/// Result of closing an established connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    /// Identity the connection was bound to
    pub identity: Identity,
    /// True if this connection was still the identity's live one
    pub went_offline: bool,
}

/// Tracks every open connection and its identity binding.
#[derive(Debug, Default)]
pub struct ConnectionLifecycle {
    sessions: HashMap<u64, Session>,
    next_generation: u64,
}

impl ConnectionLifecycle {
    /// Create an empty lifecycle tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking `conn_id` in [`SessionState::Connecting`].
    ///
    /// Returns false if the ID is already tracked.
    pub fn accept(&mut self, conn_id: u64) -> bool {
        if self.sessions.contains_key(&conn_id) {
            return false;
        }

        self.sessions.insert(conn_id, Session { state: SessionState::Connecting, binding: None });
        true
    }

    /// Complete the handshake for `conn_id`.
    ///
    /// On success the identity is registered in `directory` under a new
    /// handle (replacing any older connection for that identity) and the
    /// session becomes [`SessionState::Established`].
    ///
    /// # Errors
    ///
    /// - [`LifecycleError::MissingIdentity`] if the handshake has no identity
    ///   or an empty one. The session is left in `Connecting`; the caller
    ///   closes it.
    /// - [`LifecycleError::InvalidState`] if the connection is not in
    ///   `Connecting`.
    pub fn establish(
        &mut self,
        conn_id: u64,
        hello: &Hello,
        directory: &mut KeyDirectory,
    ) -> Result<(Identity, ConnectionHandle), LifecycleError> {
        let state = self.state(conn_id);
        if state != SessionState::Connecting {
            return Err(LifecycleError::InvalidState { state, operation: "establish" });
        }

        let identity = match &hello.identity {
            Some(identity) if !identity.is_empty() => identity.clone(),
            _ => return Err(LifecycleError::MissingIdentity),
        };

        self.next_generation += 1;
        let handle = ConnectionHandle { conn_id, generation: self.next_generation };
        directory.register(&identity, handle);

        if let Some(session) = self.sessions.get_mut(&conn_id) {
            session.state = SessionState::Established;
            session.binding = Some((identity.clone(), handle));
        }

        Ok((identity, handle))
    }

    /// Stop tracking `conn_id`.
    ///
    /// For an established connection the directory is compare-and-cleared
    /// and the departure is returned. Connections that never completed the
    /// handshake, and connections already closed, return `None`.
    pub fn disconnect(&mut self, conn_id: u64, directory: &mut KeyDirectory) -> Option<Departure> {
        let session = self.sessions.remove(&conn_id)?;
        let (identity, handle) = session.binding?;

        let went_offline = directory.mark_offline(identity.as_str(), handle);
        Some(Departure { identity, went_offline })
    }

    /// Current state of `conn_id`; untracked connections are `Closed`.
    pub fn state(&self, conn_id: u64) -> SessionState {
        self.sessions.get(&conn_id).map_or(SessionState::Closed, |session| session.state)
    }

    /// Identity bound to `conn_id`, if established.
    pub fn identity_of(&self, conn_id: u64) -> Option<&Identity> {
        self.sessions.get(&conn_id)?.binding.as_ref().map(|(identity, _)| identity)
    }

    /// Handles of every established connection.
    pub fn established_handles(&self) -> Vec<ConnectionHandle> {
        let mut handles: Vec<_> = self
            .sessions
            .values()
            .filter_map(|session| session.binding.as_ref().map(|(_, handle)| *handle))
            .collect();
        handles.sort_by_key(|handle| handle.generation);
        handles
    }

    /// Number of tracked connections, including ones still handshaking.
    pub fn count(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hello(identity: Option<&str>) -> Hello {
        Hello { version: 1, identity: identity.map(Identity::new) }
    }

    #[test]
    fn handshake_establishes_and_registers() {
        let mut lifecycle = ConnectionLifecycle::new();
        let mut directory = KeyDirectory::new();
        assert!(lifecycle.accept(7));
        assert_eq!(lifecycle.state(7), SessionState::Connecting);

        let (identity, handle) = lifecycle.establish(7, &hello(Some("alice")), &mut directory).unwrap();

        assert_eq!(identity, Identity::new("alice"));
        assert_eq!(handle.conn_id, 7);
        assert_eq!(lifecycle.state(7), SessionState::Established);
        assert_eq!(directory.live_handle("alice"), Some(handle));
    }

    #[test]
    fn missing_or_empty_identity_is_rejected() {
        let mut lifecycle = ConnectionLifecycle::new();
        let mut directory = KeyDirectory::new();
        lifecycle.accept(1);

        assert_eq!(
            lifecycle.establish(1, &hello(None), &mut directory),
            Err(LifecycleError::MissingIdentity)
        );
        assert_eq!(
            lifecycle.establish(1, &hello(Some("")), &mut directory),
            Err(LifecycleError::MissingIdentity)
        );
        assert!(directory.is_empty());
        assert_eq!(lifecycle.disconnect(1, &mut directory), None);
        assert_eq!(lifecycle.state(1), SessionState::Closed);
    }

    #[test]
    fn second_handshake_is_invalid() {
        let mut lifecycle = ConnectionLifecycle::new();
        let mut directory = KeyDirectory::new();
        lifecycle.accept(1);
        lifecycle.establish(1, &hello(Some("alice")), &mut directory).unwrap();

        let err = lifecycle.establish(1, &hello(Some("mallory")), &mut directory).unwrap_err();
        assert_eq!(
            err,
            LifecycleError::InvalidState { state: SessionState::Established, operation: "establish" }
        );
        assert!(directory.lookup("mallory").is_none());
    }

    #[test]
    fn disconnect_is_idempotent() {
        let mut lifecycle = ConnectionLifecycle::new();
        let mut directory = KeyDirectory::new();
        lifecycle.accept(1);
        lifecycle.establish(1, &hello(Some("alice")), &mut directory).unwrap();

        let departure = lifecycle.disconnect(1, &mut directory);
        assert_eq!(
            departure,
            Some(Departure { identity: Identity::new("alice"), went_offline: true })
        );
        assert_eq!(lifecycle.disconnect(1, &mut directory), None);
        assert!(!directory.lookup("alice").unwrap().is_online());
    }

    #[test]
    fn stale_connection_departs_without_going_offline() {
        let mut lifecycle = ConnectionLifecycle::new();
        let mut directory = KeyDirectory::new();
        lifecycle.accept(1);
        lifecycle.accept(2);
        lifecycle.establish(1, &hello(Some("alice")), &mut directory).unwrap();
        let (_, newer) = lifecycle.establish(2, &hello(Some("alice")), &mut directory).unwrap();

        let departure = lifecycle.disconnect(1, &mut directory).unwrap();

        assert!(!departure.went_offline);
        assert_eq!(directory.live_handle("alice"), Some(newer));
    }

    #[test]
    fn generations_increase() {
        let mut lifecycle = ConnectionLifecycle::new();
        let mut directory = KeyDirectory::new();
        lifecycle.accept(5);
        lifecycle.accept(3);
        let (_, first) = lifecycle.establish(5, &hello(Some("a")), &mut directory).unwrap();
        let (_, second) = lifecycle.establish(3, &hello(Some("b")), &mut directory).unwrap();

        assert!(second.generation > first.generation);
        assert_eq!(lifecycle.established_handles(), vec![first, second]);
    }

    #[test]
    fn duplicate_accept_is_refused() {
        let mut lifecycle = ConnectionLifecycle::new();
        assert!(lifecycle.accept(1));
        assert!(!lifecycle.accept(1));
        assert_eq!(lifecycle.count(), 1);
    }
}
