//! Relay tests

use std::time::Instant;

use sealroom_core::{
    DropReason, Environment, MessageRouter, Relay, RelayAction, RelayConfig, RelayError,
    RelayEvent, SessionState,
};
use sealroom_proto::{
    Envelope, Frame, FrameHeader, GroupPacket, Identity, Opcode, Payload, PublicKey, RoomName,
    UserRecord,
    payloads::{
        directory::{Presence, RegisterKey, UserList},
        message::{GroupMessage, PrivateMessage, SendGroup, SendPrivate},
        room::{JoinRoom, LeaveRoom, RoomUpdate},
        session::{Goodbye, Hello, HelloReply},
    },
};

// Fixed-output environment; the relay only uses it for session IDs.
#[derive(Clone)]
struct TestEnv;

impl Environment for TestEnv {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn unix_millis(&self) -> u64 {
        0
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        buffer.fill(0x42);
    }
}

const SESSION_ID: u64 = 0x4242_4242_4242_4242;

fn relay() -> Relay<TestEnv> {
    Relay::new(TestEnv, RelayConfig::default())
}

fn frame(payload: Payload) -> Frame {
    payload.into_frame().unwrap()
}

fn send(relay: &mut Relay<TestEnv>, conn_id: u64, payload: Payload) -> Vec<RelayAction> {
    relay.process_event(RelayEvent::FrameReceived { conn_id, frame: frame(payload) }).unwrap()
}

fn connect(relay: &mut Relay<TestEnv>, conn_id: u64, identity: &str) -> Vec<RelayAction> {
    relay.process_event(RelayEvent::ConnectionAccepted { conn_id }).unwrap();
    send(
        relay,
        conn_id,
        Payload::Hello(Hello { version: 1, identity: Some(Identity::new(identity)) }),
    )
}

fn close(relay: &mut Relay<TestEnv>, conn_id: u64) -> Vec<RelayAction> {
    relay.process_event(RelayEvent::ConnectionClosed { conn_id }).unwrap()
}

fn envelope(sender: &str, ciphertext: &[u8]) -> Envelope {
    Envelope {
        nonce: b"n".to_vec(),
        ciphertext: ciphertext.to_vec(),
        sender_public_key: PublicKey::new(b"K1".to_vec()),
        sender: Identity::new(sender),
        timestamp: 1_700_000_000_000,
    }
}

fn presence(identity: &str, online: bool) -> Payload {
    Payload::Presence(Presence { identity: Identity::new(identity), online })
}

fn sends_to(actions: &[RelayAction], conn_id: u64) -> Vec<Payload> {
    actions
        .iter()
        .filter_map(|action| match action {
            RelayAction::Send { conn_id: to, payload } if *to == conn_id => Some(payload.clone()),
            _ => None,
        })
        .collect()
}

#[test]
fn handshake_replies_and_announces_presence() {
    let mut relay = relay();
    connect(&mut relay, 1, "bob");

    let actions = connect(&mut relay, 2, "alice");

    assert_eq!(
        sends_to(&actions, 2),
        vec![
            Payload::HelloReply(HelloReply { session_id: SESSION_ID }),
            presence("alice", true),
        ]
    );
    assert_eq!(sends_to(&actions, 1), vec![presence("alice", true)]);
    assert_eq!(relay.session_state(2), SessionState::Established);
}

#[test]
fn handshake_without_identity_is_rejected() {
    let mut relay = relay();
    relay.process_event(RelayEvent::ConnectionAccepted { conn_id: 1 }).unwrap();

    let actions = send(&mut relay, 1, Payload::Hello(Hello { version: 1, identity: None }));

    assert_eq!(
        actions,
        vec![
            RelayAction::Send {
                conn_id: 1,
                payload: Payload::Goodbye(Goodbye { reason: "missing identity".to_string() }),
            },
            RelayAction::Close { conn_id: 1, reason: "missing identity".to_string() },
        ]
    );
    assert_eq!(relay.session_state(1), SessionState::Closed);
    assert!(relay.directory().is_empty());
}

#[test]
fn frame_before_handshake_is_rejected() {
    let mut relay = relay();
    relay.process_event(RelayEvent::ConnectionAccepted { conn_id: 1 }).unwrap();

    let actions = send(&mut relay, 1, Payload::JoinRoom(JoinRoom { room: RoomName::new("umum") }));

    assert!(actions.contains(&RelayAction::Close {
        conn_id: 1,
        reason: "handshake required".to_string()
    }));
    assert_eq!(relay.rooms().room_count(), 0);
}

#[test]
fn frame_on_unknown_connection_is_an_error() {
    let mut relay = relay();
    let result = relay.process_event(RelayEvent::FrameReceived {
        conn_id: 9,
        frame: frame(Payload::ListUsers),
    });
    assert_eq!(result.unwrap_err(), RelayError::UnknownConnection(9));
}

#[test]
fn duplicate_accept_is_an_error() {
    let mut relay = relay();
    relay.process_event(RelayEvent::ConnectionAccepted { conn_id: 1 }).unwrap();
    let result = relay.process_event(RelayEvent::ConnectionAccepted { conn_id: 1 });
    assert_eq!(result.unwrap_err(), RelayError::DuplicateConnection(1));
}

#[test]
fn connections_over_limit_are_refused() {
    let mut relay = Relay::new(TestEnv, RelayConfig { max_connections: 1 });
    connect(&mut relay, 1, "alice");

    let actions = relay.process_event(RelayEvent::ConnectionAccepted { conn_id: 2 }).unwrap();

    assert!(actions.contains(&RelayAction::Close { conn_id: 2, reason: "server full".to_string() }));
    assert_eq!(relay.connection_count(), 1);
}

#[test]
fn private_message_forwarded_verbatim() {
    // alice sends bob an envelope; bob's connection receives it unchanged.
    let mut relay = relay();
    connect(&mut relay, 1, "alice");
    connect(&mut relay, 2, "bob");

    let actions = send(
        &mut relay,
        1,
        Payload::SendPrivate(SendPrivate {
            to: Identity::new("bob"),
            envelope: envelope("alice", b"C"),
        }),
    );

    assert_eq!(
        actions,
        vec![RelayAction::Send {
            conn_id: 2,
            payload: Payload::PrivateMessage(PrivateMessage { envelope: envelope("alice", b"C") }),
        }]
    );
}

#[test]
fn private_message_to_offline_or_unknown_is_dropped_silently() {
    let mut relay = relay();
    connect(&mut relay, 1, "alice");
    connect(&mut relay, 2, "bob");
    close(&mut relay, 2);

    for to in ["bob", "zed"] {
        let actions = send(
            &mut relay,
            1,
            Payload::SendPrivate(SendPrivate {
                to: Identity::new(to),
                envelope: envelope("alice", b"C"),
            }),
        );
        assert!(actions.is_empty(), "{to}");
    }

    let router = MessageRouter::new(relay.directory());
    let delivery = router.route_private(&Identity::new("bob"), envelope("alice", b"C"));
    assert!(matches!(
        delivery,
        sealroom_core::Delivery::Dropped { reason: DropReason::OfflineDestination, .. }
    ));
}

#[test]
fn group_fan_out_skips_offline_members() {
    let mut relay = relay();
    connect(&mut relay, 1, "alice");
    connect(&mut relay, 2, "bob");
    connect(&mut relay, 3, "carol");
    close(&mut relay, 3);

    let room = RoomName::new("umum");
    let actions = send(
        &mut relay,
        1,
        Payload::SendGroup(SendGroup {
            room: room.clone(),
            packets: vec![
                GroupPacket { to: Identity::new("bob"), envelope: envelope("alice", b"e1") },
                GroupPacket { to: Identity::new("carol"), envelope: envelope("alice", b"e2") },
            ],
        }),
    );

    assert_eq!(
        actions,
        vec![RelayAction::Send {
            conn_id: 2,
            payload: Payload::GroupMessage(GroupMessage {
                room,
                envelope: envelope("alice", b"e1"),
            }),
        }]
    );
}

#[test]
fn join_and_leave_push_room_updates_to_live_members() {
    let mut relay = relay();
    connect(&mut relay, 1, "alice");
    connect(&mut relay, 2, "bob");
    let room = RoomName::new("umum");

    send(&mut relay, 1, Payload::JoinRoom(JoinRoom { room: room.clone() }));
    let actions = send(&mut relay, 2, Payload::JoinRoom(JoinRoom { room: room.clone() }));

    let update = Payload::RoomUpdate(RoomUpdate {
        room: room.clone(),
        members: vec![Identity::new("alice"), Identity::new("bob")],
    });
    assert_eq!(sends_to(&actions, 1), vec![update.clone()]);
    assert_eq!(sends_to(&actions, 2), vec![update]);

    let actions = send(&mut relay, 2, Payload::LeaveRoom(LeaveRoom { room: room.clone() }));

    let update = Payload::RoomUpdate(RoomUpdate { room, members: vec![Identity::new("alice")] });
    assert_eq!(actions, vec![RelayAction::Send { conn_id: 1, payload: update }]);
}

#[test]
fn empty_room_name_is_ignored() {
    let mut relay = relay();
    connect(&mut relay, 1, "alice");

    let actions = send(&mut relay, 1, Payload::JoinRoom(JoinRoom { room: RoomName::new("") }));

    assert!(actions.is_empty());
    assert_eq!(relay.rooms().room_count(), 0);
}

#[test]
fn membership_survives_disconnect() {
    let mut relay = relay();
    connect(&mut relay, 1, "alice");
    connect(&mut relay, 2, "bob");
    let room = RoomName::new("umum");
    send(&mut relay, 1, Payload::JoinRoom(JoinRoom { room: room.clone() }));
    send(&mut relay, 2, Payload::JoinRoom(JoinRoom { room: room.clone() }));

    close(&mut relay, 1);

    let members: Vec<_> = relay.rooms().members_of("umum").into_iter().collect();
    assert_eq!(members, vec![Identity::new("alice"), Identity::new("bob")]);
}

#[test]
fn disconnect_announces_offline_once() {
    let mut relay = relay();
    connect(&mut relay, 1, "alice");
    connect(&mut relay, 2, "bob");

    let actions = close(&mut relay, 1);
    assert_eq!(
        actions,
        vec![RelayAction::Send { conn_id: 2, payload: presence("alice", false) }]
    );

    assert!(close(&mut relay, 1).is_empty());
}

#[test]
fn stale_disconnect_does_not_clobber_reconnect() {
    let mut relay = relay();
    connect(&mut relay, 1, "alice");
    connect(&mut relay, 2, "alice");

    let actions = close(&mut relay, 1);

    assert!(actions.is_empty());
    let entry = relay.directory().lookup("alice").unwrap();
    assert_eq!(entry.connection.map(|handle| handle.conn_id), Some(2));
}

#[test]
fn goodbye_closes_and_announces() {
    let mut relay = relay();
    connect(&mut relay, 1, "alice");
    connect(&mut relay, 2, "bob");

    let actions = send(&mut relay, 1, Payload::Goodbye(Goodbye { reason: "bye".to_string() }));

    assert_eq!(
        actions,
        vec![
            RelayAction::Send { conn_id: 2, payload: presence("alice", false) },
            RelayAction::Close { conn_id: 1, reason: "goodbye".to_string() },
        ]
    );
    assert!(close(&mut relay, 1).is_empty());
}

#[test]
fn register_key_only_for_own_identity() {
    let mut relay = relay();
    connect(&mut relay, 1, "alice");
    connect(&mut relay, 2, "bob");

    send(
        &mut relay,
        1,
        Payload::RegisterKey(RegisterKey {
            identity: Identity::new("alice"),
            public_key: PublicKey::new(b"K1".to_vec()),
        }),
    );
    send(
        &mut relay,
        1,
        Payload::RegisterKey(RegisterKey {
            identity: Identity::new("bob"),
            public_key: PublicKey::new(b"evil".to_vec()),
        }),
    );

    let actions = send(&mut relay, 2, Payload::ListUsers);
    assert_eq!(
        actions,
        vec![RelayAction::Send {
            conn_id: 2,
            payload: Payload::UserList(UserList {
                users: vec![
                    UserRecord {
                        identity: Identity::new("alice"),
                        public_key: Some(PublicKey::new(b"K1".to_vec())),
                    },
                    UserRecord { identity: Identity::new("bob"), public_key: None },
                ],
            }),
        }]
    );
}

#[test]
fn key_survives_disconnect() {
    let mut relay = relay();
    connect(&mut relay, 1, "alice");
    send(
        &mut relay,
        1,
        Payload::RegisterKey(RegisterKey {
            identity: Identity::new("alice"),
            public_key: PublicKey::new(b"K1".to_vec()),
        }),
    );

    close(&mut relay, 1);

    let entry = relay.directory().lookup("alice").unwrap();
    assert_eq!(entry.public_key, Some(PublicKey::new(b"K1".to_vec())));
    assert!(!entry.is_online());
}

#[test]
fn malformed_frame_after_handshake_is_dropped() {
    let mut relay = relay();
    connect(&mut relay, 1, "alice");

    let garbage = Frame::new(FrameHeader::new(Opcode::JoinRoom), vec![0xff, 0xff, 0xff]);

    let actions =
        relay.process_event(RelayEvent::FrameReceived { conn_id: 1, frame: garbage }).unwrap();

    assert!(actions.is_empty());
    assert_eq!(relay.session_state(1), SessionState::Established);
}

#[test]
fn server_only_opcodes_are_ignored() {
    let mut relay = relay();
    connect(&mut relay, 1, "alice");

    let actions = send(&mut relay, 1, presence("mallory", true));

    assert!(actions.is_empty());
    assert!(relay.directory().lookup("mallory").is_none());
}
