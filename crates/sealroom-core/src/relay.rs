//! Relay orchestrator.
//!
//! Turns transport events into actions. The relay owns every piece of routing
//! state ([`KeyDirectory`], [`RoomRegistry`], [`ConnectionLifecycle`],
//! [`PrekeyStore`]) and performs no I/O; the server runtime holds it behind a
//! single lock and executes the returned [`RelayAction`]s.
//!
//! ## Handshake
//!
//! The first frame on a connection must be `Hello` carrying a non-empty
//! identity. Anything else gets a `Goodbye` and the connection is closed.
//!
//! ## After the handshake
//!
//! Malformed payloads and server-only opcodes are logged and dropped. They
//! never close an established connection.

use std::collections::BTreeSet;

use sealroom_proto::{
    Frame, Identity, Payload, RoomName,
    payloads::{
        directory::{RegisterKey, UserList},
        message::{SendGroup, SendPrivate},
        room::RoomUpdate,
        session::{Goodbye, Hello, HelloReply},
    },
};

use crate::{
    directory::KeyDirectory,
    env::Environment,
    error::{LifecycleError, RelayError},
    lifecycle::{ConnectionLifecycle, SessionState},
    prekeys::PrekeyStore,
    presence::PresenceBroadcaster,
    rooms::RoomRegistry,
    router::{Delivery, MessageRouter},
};

/// Relay limits.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Connections beyond this many are refused at accept time
    pub max_connections: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self { max_connections: 10_000 }
    }
}

/// Input to the relay.
#[derive(Debug, Clone)]
pub enum RelayEvent {
    /// Transport accepted a new connection
    ConnectionAccepted {
        /// Transport-assigned connection ID
        conn_id: u64,
    },

    /// A frame arrived on a connection
    FrameReceived {
        /// Connection the frame arrived on
        conn_id: u64,
        /// The frame
        frame: Frame,
    },

    /// Transport reported the connection gone
    ConnectionClosed {
        /// Connection that closed
        conn_id: u64,
    },
}

/// Output of the relay, executed by the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayAction {
    /// Queue `payload` on `conn_id`. Best-effort: a full or dead queue drops
    /// it.
    Send {
        /// Destination connection
        conn_id: u64,
        /// Payload to frame and send
        payload: Payload,
    },

    /// Close the transport connection
    Close {
        /// Connection to close
        conn_id: u64,
        /// Reason for logs
        reason: String,
    },
}

/// The routing relay.
pub struct Relay<E>
where
    E: Environment,
{
    env: E,
    config: RelayConfig,
    directory: KeyDirectory,
    rooms: RoomRegistry,
    lifecycle: ConnectionLifecycle,
    prekeys: PrekeyStore,
}

impl<E> Relay<E>
where
    E: Environment,
{
    /// Create an empty relay.
    pub fn new(env: E, config: RelayConfig) -> Self {
        Self {
            env,
            config,
            directory: KeyDirectory::new(),
            rooms: RoomRegistry::new(),
            lifecycle: ConnectionLifecycle::new(),
            prekeys: PrekeyStore::new(),
        }
    }

    /// Process one event.
    ///
    /// # Errors
    ///
    /// - [`RelayError::DuplicateConnection`] if an accepted ID is still open
    /// - [`RelayError::UnknownConnection`] for a frame on a connection the
    ///   relay is not tracking
    ///
    /// Closing an unknown connection is not an error.
    pub fn process_event(&mut self, event: RelayEvent) -> Result<Vec<RelayAction>, RelayError> {
        match event {
            RelayEvent::ConnectionAccepted { conn_id } => self.handle_accept(conn_id),
            RelayEvent::FrameReceived { conn_id, frame } => self.handle_frame(conn_id, &frame),
            RelayEvent::ConnectionClosed { conn_id } => Ok(self.handle_disconnect(conn_id)),
        }
    }

    fn handle_accept(&mut self, conn_id: u64) -> Result<Vec<RelayAction>, RelayError> {
        if self.lifecycle.count() >= self.config.max_connections {
            tracing::warn!(
                conn_id,
                max = self.config.max_connections,
                "refusing connection: limit reached"
            );
            return Ok(reject(conn_id, "server full"));
        }

        if !self.lifecycle.accept(conn_id) {
            return Err(RelayError::DuplicateConnection(conn_id));
        }

        tracing::debug!(conn_id, "connection accepted");
        Ok(Vec::new())
    }

    fn handle_frame(&mut self, conn_id: u64, frame: &Frame) -> Result<Vec<RelayAction>, RelayError> {
        match self.lifecycle.state(conn_id) {
            SessionState::Closed => Err(RelayError::UnknownConnection(conn_id)),
            SessionState::Connecting => Ok(self.handle_handshake(conn_id, frame)),
            SessionState::Established => Ok(self.handle_established(conn_id, frame)),
        }
    }

    fn handle_handshake(&mut self, conn_id: u64, frame: &Frame) -> Vec<RelayAction> {
        let hello = match Payload::from_frame(frame) {
            Ok(Payload::Hello(hello)) => hello,
            Ok(other) => {
                tracing::warn!(conn_id, opcode = ?other.opcode(), "frame before handshake");
                return self.reject_handshake(conn_id, "handshake required");
            },
            Err(e) => {
                tracing::warn!(conn_id, error = %e, "malformed handshake");
                return self.reject_handshake(conn_id, "handshake required");
            },
        };

        self.establish(conn_id, &hello)
    }

    fn establish(&mut self, conn_id: u64, hello: &Hello) -> Vec<RelayAction> {
        let identity = match self.lifecycle.establish(conn_id, hello, &mut self.directory) {
            Ok((identity, _)) => identity,
            Err(LifecycleError::MissingIdentity) => {
                tracing::info!(conn_id, "rejected connection: missing identity");
                return self.reject_handshake(conn_id, "missing identity");
            },
            Err(e) => {
                tracing::warn!(conn_id, error = %e, "handshake failed");
                return self.reject_handshake(conn_id, "handshake failed");
            },
        };

        tracing::info!(conn_id, identity = %identity, "connection established");

        let mut actions = vec![RelayAction::Send {
            conn_id,
            payload: Payload::HelloReply(HelloReply { session_id: self.env.random_u64() }),
        }];
        actions.extend(PresenceBroadcaster::announce(
            &identity,
            true,
            &self.lifecycle.established_handles(),
        ));
        actions
    }

    fn reject_handshake(&mut self, conn_id: u64, reason: &str) -> Vec<RelayAction> {
        self.lifecycle.disconnect(conn_id, &mut self.directory);
        reject(conn_id, reason)
    }

    fn handle_established(&mut self, conn_id: u64, frame: &Frame) -> Vec<RelayAction> {
        let payload = match Payload::from_frame(frame) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(conn_id, error = %e, "dropping malformed frame");
                return Vec::new();
            },
        };

        let Some(identity) = self.lifecycle.identity_of(conn_id).cloned() else {
            return Vec::new();
        };

        match payload {
            Payload::Hello(_) => {
                tracing::debug!(conn_id, "ignoring repeated handshake");
                Vec::new()
            },
            Payload::Goodbye(Goodbye { reason }) => {
                tracing::info!(conn_id, identity = %identity, reason = %reason, "client goodbye");
                let mut actions = self.handle_disconnect(conn_id);
                actions.push(RelayAction::Close { conn_id, reason: "goodbye".to_string() });
                actions
            },
            Payload::RegisterKey(register) => {
                self.handle_register_key(conn_id, &identity, register);
                Vec::new()
            },
            Payload::ListUsers => vec![RelayAction::Send {
                conn_id,
                payload: Payload::UserList(UserList { users: self.directory.list_all() }),
            }],
            Payload::JoinRoom(join) => self.handle_join(&join.room, &identity),
            Payload::LeaveRoom(leave) => self.handle_leave(&leave.room, &identity),
            Payload::SendPrivate(SendPrivate { to, envelope }) => {
                let delivery = MessageRouter::new(&self.directory).route_private(&to, envelope);
                delivery_action(delivery).into_iter().collect()
            },
            Payload::SendGroup(SendGroup { room, packets }) => {
                MessageRouter::new(&self.directory)
                    .route_group(&room, packets)
                    .into_iter()
                    .filter_map(delivery_action)
                    .collect()
            },
            other => {
                tracing::warn!(conn_id, opcode = ?other.opcode(), "ignoring server-only opcode");
                Vec::new()
            },
        }
    }

    fn handle_register_key(&mut self, conn_id: u64, identity: &Identity, register: RegisterKey) {
        if register.identity != *identity {
            tracing::warn!(
                conn_id,
                identity = %identity,
                claimed = %register.identity,
                "ignoring key registration for another identity"
            );
            return;
        }

        self.directory.update_public_key(identity.as_str(), register.public_key);
        tracing::debug!(conn_id, identity = %identity, "public key registered");
    }

    fn handle_join(&mut self, room: &RoomName, identity: &Identity) -> Vec<RelayAction> {
        if room.is_empty() {
            return Vec::new();
        }

        let members = self.rooms.join(room, identity);
        tracing::debug!(room = %room, identity = %identity, members = members.len(), "joined room");
        self.room_update(room, &members)
    }

    fn handle_leave(&mut self, room: &RoomName, identity: &Identity) -> Vec<RelayAction> {
        if room.is_empty() {
            return Vec::new();
        }

        let remaining = self.rooms.leave(room.as_str(), identity.as_str());
        tracing::debug!(room = %room, identity = %identity, members = remaining.len(), "left room");
        self.room_update(room, &remaining)
    }

    fn room_update(&self, room: &RoomName, members: &BTreeSet<Identity>) -> Vec<RelayAction> {
        let payload = Payload::RoomUpdate(RoomUpdate {
            room: room.clone(),
            members: members.iter().cloned().collect(),
        });

        members
            .iter()
            .filter_map(|member| self.directory.live_handle(member.as_str()))
            .map(|handle| RelayAction::Send { conn_id: handle.conn_id, payload: payload.clone() })
            .collect()
    }

    fn handle_disconnect(&mut self, conn_id: u64) -> Vec<RelayAction> {
        let Some(departure) = self.lifecycle.disconnect(conn_id, &mut self.directory) else {
            return Vec::new();
        };

        tracing::info!(
            conn_id,
            identity = %departure.identity,
            went_offline = departure.went_offline,
            "connection closed"
        );

        if !departure.went_offline {
            return Vec::new();
        }

        PresenceBroadcaster::announce(
            &departure.identity,
            false,
            &self.lifecycle.established_handles(),
        )
    }

    /// Identity directory.
    pub fn directory(&self) -> &KeyDirectory {
        &self.directory
    }

    /// Room registry.
    pub fn rooms(&self) -> &RoomRegistry {
        &self.rooms
    }

    /// Prekey bundles.
    pub fn prekeys(&self) -> &PrekeyStore {
        &self.prekeys
    }

    /// Mutable prekey bundles, for the HTTP API.
    pub fn prekeys_mut(&mut self) -> &mut PrekeyStore {
        &mut self.prekeys
    }

    /// Lifecycle state of `conn_id`.
    pub fn session_state(&self, conn_id: u64) -> SessionState {
        self.lifecycle.state(conn_id)
    }

    /// Connections currently tracked (handshaking or established).
    pub fn connection_count(&self) -> usize {
        self.lifecycle.count()
    }

    /// Active limits.
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }
}

fn reject(conn_id: u64, reason: &str) -> Vec<RelayAction> {
    vec![
        RelayAction::Send {
            conn_id,
            payload: Payload::Goodbye(Goodbye { reason: reason.to_string() }),
        },
        RelayAction::Close { conn_id, reason: reason.to_string() },
    ]
}

fn delivery_action(delivery: Delivery) -> Option<RelayAction> {
    match delivery {
        Delivery::Forwarded { handle, payload, .. } => {
            Some(RelayAction::Send { conn_id: handle.conn_id, payload })
        },
        Delivery::Dropped { .. } => None,
    }
}
