//! Client state machine.
//!
//! The `Client` owns one identity's key pair for the lifetime of the value
//! (a fresh pair per client session), a cached directory snapshot, and the
//! member lists of the rooms it has joined. Room caches survive reconnects
//! because the relay keeps membership until an explicit leave.

use std::{
    collections::BTreeMap,
    time::{Duration, Instant},
};

use sealroom_core::Environment;
use sealroom_crypto::{KeyPair, NONCE_SIZE};
use sealroom_proto::{
    Envelope, Frame, FrameHeader, GroupPacket, Identity, Payload, PublicKey, RoomName,
    payloads::{
        directory::{Presence, RegisterKey, UserList},
        message::{GroupMessage, PrivateMessage, SendGroup, SendPrivate},
        room::{JoinRoom, LeaveRoom, RoomUpdate},
        session::{Goodbye, Hello, HelloReply},
    },
};

use crate::{
    error::ClientError,
    event::{ClientAction, ClientEvent},
};

/// How often the directory cache is refreshed while connected.
pub const DIRECTORY_REFRESH_INTERVAL: Duration = Duration::from_secs(3);

/// Session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// No session
    Disconnected,
    /// `Hello` sent, waiting for `HelloReply`
    Handshaking,
    /// Session established
    Connected {
        /// Relay-assigned session ID
        session_id: u64,
    },
}

/// Client state machine.
///
/// Pure state machine - returns actions, caller handles I/O.
///
/// # Type Parameters
///
/// - `E`: Environment implementation for time/randomness
pub struct Client<E: Environment> {
    env: E,
    identity: Identity,
    keys: KeyPair,
    state: ClientState,
    /// Last directory snapshot from the relay.
    directory: BTreeMap<Identity, Option<PublicKey>>,
    /// Joined rooms and their last known members.
    rooms: BTreeMap<RoomName, Vec<Identity>>,
    last_refresh: Option<Instant>,
}

impl<E: Environment> Client<E> {
    /// Create a client for `identity` with a freshly generated key pair.
    pub fn new(env: E, identity: Identity) -> Self {
        let mut seed = [0u8; 32];
        env.random_bytes(&mut seed);

        Self {
            env,
            identity,
            keys: KeyPair::from_seed(seed),
            state: ClientState::Disconnected,
            directory: BTreeMap::new(),
            rooms: BTreeMap::new(),
            last_refresh: None,
        }
    }

    /// Identity this client connects as.
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Public half of this client's key pair.
    pub fn public_key(&self) -> PublicKey {
        PublicKey::new(self.keys.public_key().to_vec())
    }

    /// Current session state.
    pub fn state(&self) -> ClientState {
        self.state
    }

    /// Returns true once the handshake has completed.
    pub fn is_connected(&self) -> bool {
        matches!(self.state, ClientState::Connected { .. })
    }

    /// Cached public key of `identity`, if it is in the directory snapshot
    /// and has published one.
    pub fn peer_key(&self, identity: &str) -> Option<&PublicKey> {
        self.directory.get(identity)?.as_ref()
    }

    /// Number of identities in the cached directory.
    pub fn directory_len(&self) -> usize {
        self.directory.len()
    }

    /// Cached members of a joined room.
    pub fn room_members(&self, room: &str) -> Option<&[Identity]> {
        self.rooms.get(room).map(Vec::as_slice)
    }

    /// Rooms joined and not yet left.
    pub fn joined_rooms(&self) -> impl Iterator<Item = &RoomName> {
        self.rooms.keys()
    }

    /// Process an event and return resulting actions.
    ///
    /// # Errors
    ///
    /// Returns `ClientError` if the event cannot be processed.
    pub fn handle(&mut self, event: ClientEvent) -> Result<Vec<ClientAction>, ClientError> {
        match event {
            ClientEvent::Connect => self.handle_connect(),
            ClientEvent::Tick { now } => self.handle_tick(now),
            ClientEvent::SendPrivate { to, plaintext } => self.handle_send_private(to, &plaintext),
            ClientEvent::SendGroup { room, plaintext } => self.handle_send_group(room, &plaintext),
            ClientEvent::JoinRoom { room } => self.handle_join_room(room),
            ClientEvent::LeaveRoom { room } => self.handle_leave_room(&room),
            ClientEvent::Disconnect => self.handle_disconnect(),
            ClientEvent::FrameReceived(frame) => self.handle_frame(&frame),
        }
    }

    fn handle_connect(&mut self) -> Result<Vec<ClientAction>, ClientError> {
        if self.state != ClientState::Disconnected {
            return Err(ClientError::InvalidState {
                reason: format!("connect while {:?}", self.state),
            });
        }

        self.state = ClientState::Handshaking;
        Ok(vec![send(Payload::Hello(Hello {
            version: FrameHeader::VERSION,
            identity: Some(self.identity.clone()),
        }))?])
    }

    /// Refresh the directory when the interval has elapsed.
    fn handle_tick(&mut self, now: Instant) -> Result<Vec<ClientAction>, ClientError> {
        if !self.is_connected() {
            return Ok(vec![]);
        }

        let due = self
            .last_refresh
            .is_none_or(|last| now.saturating_duration_since(last) >= DIRECTORY_REFRESH_INTERVAL);
        if !due {
            return Ok(vec![]);
        }

        self.last_refresh = Some(now);
        Ok(vec![send(Payload::ListUsers)?])
    }

    fn handle_send_private(
        &mut self,
        to: Identity,
        plaintext: &[u8],
    ) -> Result<Vec<ClientAction>, ClientError> {
        self.require_connected()?;

        let recipient_key = self
            .peer_key(to.as_str())
            .ok_or_else(|| ClientError::PeerNotFound { identity: to.clone() })?;
        let envelope = self.seal_for(recipient_key, plaintext)?;

        Ok(vec![send(Payload::SendPrivate(SendPrivate { to, envelope }))?])
    }

    /// One envelope per cached member, skipping self and members whose key is
    /// unknown or unusable.
    fn handle_send_group(
        &mut self,
        room: RoomName,
        plaintext: &[u8],
    ) -> Result<Vec<ClientAction>, ClientError> {
        self.require_connected()?;

        let members = self
            .rooms
            .get(room.as_str())
            .ok_or_else(|| ClientError::RoomNotJoined { room: room.clone() })?;

        let packets: Vec<GroupPacket> = members
            .iter()
            .filter(|member| **member != self.identity)
            .filter_map(|member| {
                let key = self.peer_key(member.as_str())?;
                let envelope = self.seal_for(key, plaintext).ok()?;
                Some(GroupPacket { to: member.clone(), envelope })
            })
            .collect();

        if packets.is_empty() {
            return Ok(vec![]);
        }

        Ok(vec![send(Payload::SendGroup(SendGroup { room, packets }))?])
    }

    fn handle_join_room(&mut self, room: RoomName) -> Result<Vec<ClientAction>, ClientError> {
        self.require_connected()?;
        if room.is_empty() {
            return Ok(vec![]);
        }

        self.rooms.entry(room.clone()).or_default();
        Ok(vec![send(Payload::JoinRoom(JoinRoom { room }))?])
    }

    fn handle_leave_room(&mut self, room: &RoomName) -> Result<Vec<ClientAction>, ClientError> {
        self.require_connected()?;
        if room.is_empty() {
            return Ok(vec![]);
        }

        // The relay does not send the leaver a final update.
        self.rooms.remove(room.as_str());
        Ok(vec![send(Payload::LeaveRoom(LeaveRoom { room: room.clone() }))?])
    }

    fn handle_disconnect(&mut self) -> Result<Vec<ClientAction>, ClientError> {
        if self.state == ClientState::Disconnected {
            return Ok(vec![]);
        }

        self.reset_session();
        Ok(vec![send(Payload::Goodbye(Goodbye { reason: "client disconnect".to_string() }))?])
    }

    fn handle_frame(&mut self, frame: &Frame) -> Result<Vec<ClientAction>, ClientError> {
        let payload = Payload::from_frame(frame)
            .map_err(|e| ClientError::InvalidFrame { reason: e.to_string() })?;

        match payload {
            Payload::HelloReply(reply) => self.handle_hello_reply(&reply),
            Payload::Goodbye(Goodbye { reason }) => {
                self.reset_session();
                Ok(vec![ClientAction::Disconnected { reason }])
            },
            Payload::UserList(UserList { users }) => {
                self.directory =
                    users.into_iter().map(|user| (user.identity, user.public_key)).collect();
                Ok(vec![])
            },
            Payload::Presence(Presence { identity, online }) => {
                Ok(vec![ClientAction::PresenceChanged { identity, online }])
            },
            Payload::RoomUpdate(update) => Ok(self.handle_room_update(update)),
            Payload::PrivateMessage(PrivateMessage { envelope }) => Ok(self.open(envelope, None)),
            Payload::GroupMessage(GroupMessage { room, envelope }) => {
                Ok(self.open(envelope, Some(room)))
            },
            other => Err(ClientError::InvalidFrame {
                reason: format!("unexpected opcode from relay: {:?}", other.opcode()),
            }),
        }
    }

    fn handle_hello_reply(&mut self, reply: &HelloReply) -> Result<Vec<ClientAction>, ClientError> {
        if self.state != ClientState::Handshaking {
            return Err(ClientError::InvalidFrame {
                reason: format!("HelloReply while {:?}", self.state),
            });
        }

        self.state = ClientState::Connected { session_id: reply.session_id };
        self.last_refresh = Some(self.env.now());

        Ok(vec![
            send(Payload::RegisterKey(RegisterKey {
                identity: self.identity.clone(),
                public_key: self.public_key(),
            }))?,
            send(Payload::ListUsers)?,
            ClientAction::Log {
                message: format!("connected as {} (session {:x})", self.identity, reply.session_id),
            },
        ])
    }

    fn handle_room_update(&mut self, update: RoomUpdate) -> Vec<ClientAction> {
        let RoomUpdate { room, members } = update;
        let Some(cached) = self.rooms.get_mut(room.as_str()) else {
            return vec![];
        };

        cached.clone_from(&members);
        vec![ClientAction::RoomMembersChanged { room, members }]
    }

    fn open(&self, envelope: Envelope, room: Option<RoomName>) -> Vec<ClientAction> {
        match sealroom_crypto::open(
            &envelope.ciphertext,
            &envelope.nonce,
            envelope.sender_public_key.as_bytes(),
            &self.keys,
        ) {
            Ok(plaintext) => vec![ClientAction::DeliverMessage {
                from: envelope.sender,
                room,
                plaintext,
                timestamp: envelope.timestamp,
            }],
            Err(_) => vec![],
        }
    }

    fn seal_for(&self, recipient: &PublicKey, plaintext: &[u8]) -> Result<Envelope, ClientError> {
        let mut nonce = [0u8; NONCE_SIZE];
        self.env.random_bytes(&mut nonce);

        let ciphertext = sealroom_crypto::seal(plaintext, &nonce, recipient.as_bytes(), &self.keys)?;

        Ok(Envelope {
            nonce: nonce.to_vec(),
            ciphertext,
            sender_public_key: self.public_key(),
            sender: self.identity.clone(),
            timestamp: self.env.unix_millis(),
        })
    }

    fn require_connected(&self) -> Result<(), ClientError> {
        if self.is_connected() { Ok(()) } else { Err(ClientError::NotConnected) }
    }

    fn reset_session(&mut self) {
        self.state = ClientState::Disconnected;
        self.last_refresh = None;
    }
}

fn send(payload: Payload) -> Result<ClientAction, ClientError> {
    Ok(ClientAction::Send(payload.into_frame()?))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicU8, Ordering},
    };

    use proptest::prelude::*;
    use sealroom_proto::{Opcode, UserRecord};

    use super::*;

    #[derive(Clone, Default)]
    struct TestEnv {
        counter: Arc<AtomicU8>,
    }

    impl Environment for TestEnv {
        fn now(&self) -> Instant {
            Instant::now()
        }

        fn unix_millis(&self) -> u64 {
            1_700_000_000_000
        }

        fn random_bytes(&self, buffer: &mut [u8]) {
            // Distinct per call so two clients get different keys
            let base = self.counter.fetch_add(1, Ordering::Relaxed);
            for (i, byte) in buffer.iter_mut().enumerate() {
                *byte = base.wrapping_mul(31).wrapping_add(i as u8);
            }
        }
    }

    fn frame(payload: Payload) -> Frame {
        payload.into_frame().unwrap()
    }

    fn opcodes(actions: &[ClientAction]) -> Vec<Opcode> {
        actions
            .iter()
            .filter_map(|action| match action {
                ClientAction::Send(frame) => frame.header.opcode_enum(),
                _ => None,
            })
            .collect()
    }

    fn sent_payload(action: &ClientAction) -> Payload {
        match action {
            ClientAction::Send(frame) => Payload::from_frame(frame).unwrap(),
            other => panic!("expected Send, got {other:?}"),
        }
    }

    fn connected(env: &TestEnv, name: &str) -> Client<TestEnv> {
        let mut client = Client::new(env.clone(), Identity::new(name));
        client.handle(ClientEvent::Connect).unwrap();
        client
            .handle(ClientEvent::FrameReceived(frame(Payload::HelloReply(HelloReply {
                session_id: 7,
            }))))
            .unwrap();
        client
    }

    fn directory(clients: &[&Client<TestEnv>]) -> ClientEvent {
        ClientEvent::FrameReceived(frame(Payload::UserList(UserList {
            users: clients
                .iter()
                .map(|c| UserRecord {
                    identity: c.identity().clone(),
                    public_key: Some(c.public_key()),
                })
                .collect(),
        })))
    }

    #[test]
    fn connect_sends_hello_with_identity() {
        let mut client = Client::new(TestEnv::default(), Identity::new("alice"));

        let actions = client.handle(ClientEvent::Connect).unwrap();

        assert_eq!(
            sent_payload(&actions[0]),
            Payload::Hello(Hello { version: 1, identity: Some(Identity::new("alice")) })
        );
        assert_eq!(client.state(), ClientState::Handshaking);
    }

    #[test]
    fn hello_reply_registers_key_and_polls() {
        let mut client = Client::new(TestEnv::default(), Identity::new("alice"));
        client.handle(ClientEvent::Connect).unwrap();

        let actions = client
            .handle(ClientEvent::FrameReceived(frame(Payload::HelloReply(HelloReply {
                session_id: 9,
            }))))
            .unwrap();

        assert_eq!(opcodes(&actions), vec![Opcode::RegisterKey, Opcode::ListUsers]);
        assert_eq!(client.state(), ClientState::Connected { session_id: 9 });
    }

    #[test]
    fn tick_refreshes_directory_every_interval() {
        let env = TestEnv::default();
        let mut client = connected(&env, "alice");
        let start = Instant::now() + Duration::from_secs(60);

        let first = client.handle(ClientEvent::Tick { now: start }).unwrap();
        let early = client
            .handle(ClientEvent::Tick { now: start + Duration::from_millis(2_999) })
            .unwrap();
        let due =
            client.handle(ClientEvent::Tick { now: start + DIRECTORY_REFRESH_INTERVAL }).unwrap();

        assert_eq!(opcodes(&first), vec![Opcode::ListUsers]);
        assert!(early.is_empty());
        assert_eq!(opcodes(&due), vec![Opcode::ListUsers]);
    }

    #[test]
    fn tick_while_disconnected_does_nothing() {
        let mut client = Client::new(TestEnv::default(), Identity::new("alice"));
        assert!(client.handle(ClientEvent::Tick { now: Instant::now() }).unwrap().is_empty());
    }

    #[test]
    fn private_send_to_unknown_peer_fails() {
        let env = TestEnv::default();
        let mut client = connected(&env, "alice");

        let result = client.handle(ClientEvent::SendPrivate {
            to: Identity::new("bob"),
            plaintext: b"hi".to_vec(),
        });

        assert!(matches!(result, Err(ClientError::PeerNotFound { .. })));
    }

    #[test]
    fn private_send_before_connect_fails() {
        let mut client = Client::new(TestEnv::default(), Identity::new("alice"));
        let result = client.handle(ClientEvent::SendPrivate {
            to: Identity::new("bob"),
            plaintext: b"hi".to_vec(),
        });
        assert!(matches!(result, Err(ClientError::NotConnected)));
    }

    #[test]
    fn private_message_round_trip() {
        let env = TestEnv::default();
        let mut alice = connected(&env, "alice");
        let mut bob = connected(&env, "bob");
        let users = directory(&[&alice, &bob]);
        alice.handle(users).unwrap();

        let actions = alice
            .handle(ClientEvent::SendPrivate {
                to: Identity::new("bob"),
                plaintext: b"halo".to_vec(),
            })
            .unwrap();
        let Payload::SendPrivate(SendPrivate { to, envelope }) = sent_payload(&actions[0]) else {
            panic!("expected SendPrivate");
        };
        assert_eq!(to, Identity::new("bob"));
        assert_ne!(envelope.ciphertext, b"halo");

        let delivered = bob
            .handle(ClientEvent::FrameReceived(frame(Payload::PrivateMessage(PrivateMessage {
                envelope,
            }))))
            .unwrap();

        assert_eq!(
            delivered,
            vec![ClientAction::DeliverMessage {
                from: Identity::new("alice"),
                room: None,
                plaintext: b"halo".to_vec(),
                timestamp: 1_700_000_000_000,
            }]
        );
    }

    #[test]
    fn undecryptable_envelope_is_discarded() {
        let env = TestEnv::default();
        let mut alice = connected(&env, "alice");
        let mut bob = connected(&env, "bob");
        let carol = connected(&env, "carol");
        alice.handle(directory(&[&carol])).unwrap();

        // Sealed for carol, delivered to bob.
        let actions = alice
            .handle(ClientEvent::SendPrivate {
                to: Identity::new("carol"),
                plaintext: b"secret".to_vec(),
            })
            .unwrap();
        let Payload::SendPrivate(SendPrivate { envelope, .. }) = sent_payload(&actions[0]) else {
            panic!("expected SendPrivate");
        };

        let delivered = bob
            .handle(ClientEvent::FrameReceived(frame(Payload::PrivateMessage(PrivateMessage {
                envelope,
            }))))
            .unwrap();

        assert!(delivered.is_empty());
        assert!(bob.is_connected());
    }

    #[test]
    fn group_send_seals_per_member_and_skips_self_and_keyless() {
        let env = TestEnv::default();
        let mut alice = connected(&env, "alice");
        let bob = connected(&env, "bob");
        let carol = connected(&env, "carol");
        alice.handle(directory(&[&alice, &bob, &carol])).unwrap();

        let room = RoomName::new("umum");
        alice.handle(ClientEvent::JoinRoom { room: room.clone() }).unwrap();
        alice
            .handle(ClientEvent::FrameReceived(frame(Payload::RoomUpdate(RoomUpdate {
                room: room.clone(),
                members: vec![
                    Identity::new("alice"),
                    Identity::new("bob"),
                    Identity::new("carol"),
                    Identity::new("dave"),
                ],
            }))))
            .unwrap();

        let actions = alice
            .handle(ClientEvent::SendGroup { room: room.clone(), plaintext: b"hai".to_vec() })
            .unwrap();

        let Payload::SendGroup(SendGroup { room: sent_room, packets }) = sent_payload(&actions[0])
        else {
            panic!("expected SendGroup");
        };
        assert_eq!(sent_room, room);
        let recipients: Vec<_> = packets.iter().map(|p| p.to.as_str()).collect();
        assert_eq!(recipients, vec!["bob", "carol"]);
        assert_ne!(packets[0].envelope.ciphertext, packets[1].envelope.ciphertext);
    }

    #[test]
    fn group_send_to_unjoined_room_fails() {
        let env = TestEnv::default();
        let mut alice = connected(&env, "alice");

        let result = alice
            .handle(ClientEvent::SendGroup { room: RoomName::new("umum"), plaintext: vec![1] });

        assert!(matches!(result, Err(ClientError::RoomNotJoined { .. })));
    }

    #[test]
    fn group_send_with_no_recipients_sends_nothing() {
        let env = TestEnv::default();
        let mut alice = connected(&env, "alice");
        let room = RoomName::new("umum");
        alice.handle(ClientEvent::JoinRoom { room: room.clone() }).unwrap();

        let actions = alice.handle(ClientEvent::SendGroup { room, plaintext: vec![1] }).unwrap();

        assert!(actions.is_empty());
    }

    #[test]
    fn leave_clears_cached_members() {
        let env = TestEnv::default();
        let mut alice = connected(&env, "alice");
        let room = RoomName::new("umum");
        alice.handle(ClientEvent::JoinRoom { room: room.clone() }).unwrap();
        alice
            .handle(ClientEvent::FrameReceived(frame(Payload::RoomUpdate(RoomUpdate {
                room: room.clone(),
                members: vec![Identity::new("alice"), Identity::new("bob")],
            }))))
            .unwrap();
        assert_eq!(alice.room_members("umum").map(<[Identity]>::len), Some(2));

        let actions = alice.handle(ClientEvent::LeaveRoom { room }).unwrap();

        assert_eq!(opcodes(&actions), vec![Opcode::LeaveRoom]);
        assert_eq!(alice.room_members("umum"), None);
    }

    #[test]
    fn update_for_unjoined_room_is_ignored() {
        let env = TestEnv::default();
        let mut alice = connected(&env, "alice");

        let actions = alice
            .handle(ClientEvent::FrameReceived(frame(Payload::RoomUpdate(RoomUpdate {
                room: RoomName::new("other"),
                members: vec![Identity::new("bob")],
            }))))
            .unwrap();

        assert!(actions.is_empty());
    }

    #[test]
    fn goodbye_from_relay_disconnects() {
        let env = TestEnv::default();
        let mut alice = connected(&env, "alice");

        let actions = alice
            .handle(ClientEvent::FrameReceived(frame(Payload::Goodbye(Goodbye {
                reason: "server full".to_string(),
            }))))
            .unwrap();

        assert_eq!(actions, vec![ClientAction::Disconnected { reason: "server full".to_string() }]);
        assert_eq!(alice.state(), ClientState::Disconnected);
    }

    #[test]
    fn unexpected_opcode_is_invalid_frame() {
        let env = TestEnv::default();
        let mut alice = connected(&env, "alice");

        let result = alice.handle(ClientEvent::FrameReceived(frame(Payload::ListUsers)));

        let err = result.unwrap_err();
        assert!(matches!(err, ClientError::InvalidFrame { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn presence_is_surfaced() {
        let env = TestEnv::default();
        let mut alice = connected(&env, "alice");

        let actions = alice
            .handle(ClientEvent::FrameReceived(frame(Payload::Presence(Presence {
                identity: Identity::new("bob"),
                online: false,
            }))))
            .unwrap();

        assert_eq!(
            actions,
            vec![ClientAction::PresenceChanged { identity: Identity::new("bob"), online: false }]
        );
    }

    proptest! {
        #[test]
        fn any_plaintext_survives_seal_and_open(
            plaintext in prop::collection::vec(any::<u8>(), 0..512)
        ) {
            let env = TestEnv::default();
            let mut alice = connected(&env, "alice");
            let mut bob = connected(&env, "bob");
            alice.handle(directory(&[&bob])).unwrap();

            let actions = alice
                .handle(ClientEvent::SendPrivate {
                    to: Identity::new("bob"),
                    plaintext: plaintext.clone(),
                })
                .unwrap();
            let Payload::SendPrivate(SendPrivate { envelope, .. }) = sent_payload(&actions[0])
            else {
                panic!("expected SendPrivate");
            };
            prop_assert_eq!(
                envelope.ciphertext.len(),
                plaintext.len() + sealroom_crypto::TAG_SIZE
            );

            let delivered = bob
                .handle(ClientEvent::FrameReceived(frame(Payload::PrivateMessage(PrivateMessage {
                    envelope,
                }))))
                .unwrap();

            prop_assert_eq!(
                delivered,
                vec![ClientAction::DeliverMessage {
                    from: Identity::new("alice"),
                    room: None,
                    plaintext,
                    timestamp: 1_700_000_000_000,
                }]
            );
        }
    }
}
