//! Fuzz target for the [`Relay`] event loop
//!
//! Drives a relay with arbitrary interleavings of accepts, frames and closes
//! across a handful of connection IDs.
//!
//! # Strategy
//!
//! - Handshakes: valid, identity-less, and out-of-order `Hello`
//! - Identity collisions: several connections claiming one identity
//! - Garbage: raw bytes under any opcode, server-only opcodes from clients
//! - Churn: closes of unknown, handshaking and established connections
//!
//! # Invariants
//!
//! - NEVER panic
//! - Tracked connections never exceed `max_connections`
//! - `Established` ONLY reachable via a `Hello` with a non-empty identity
//! - Actions only address connections that were accepted
//! - A directory entry is online only while some established connection
//!   holds its handle
//! - Frames on an untracked connection are `UnknownConnection`

#![no_main]

use std::{collections::HashSet, time::Instant};

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use sealroom_core::{
    Environment, Relay, RelayAction, RelayConfig, RelayError, RelayEvent, SessionState,
};
use sealroom_proto::{
    Envelope, Frame, FrameHeader, GroupPacket, Identity, Opcode, Payload, PublicKey, RoomName,
    payloads::{
        directory::RegisterKey,
        message::{SendGroup, SendPrivate},
        room::{JoinRoom, LeaveRoom},
        session::{Goodbye, Hello},
    },
};

const MAX_CONNECTIONS: usize = 4;
const NAMES: [&str; 3] = ["alice", "bob", "carol"];

#[derive(Clone)]
struct FuzzEnv;

impl Environment for FuzzEnv {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn unix_millis(&self) -> u64 {
        0
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        buffer.fill(0x5a);
    }
}

#[derive(Debug, Arbitrary)]
enum FuzzEvent {
    Accept { conn: u8 },
    Close { conn: u8 },
    Frame { conn: u8, frame: FuzzedFrame },
}

#[derive(Debug, Arbitrary)]
enum FuzzedFrame {
    Hello { name: Option<u8> },
    Goodbye,
    RegisterKey { name: u8, key: Vec<u8> },
    ListUsers,
    JoinRoom { room: u8 },
    LeaveRoom { room: u8 },
    SendPrivate { to: u8, ciphertext: Vec<u8> },
    SendGroup { room: u8, to: Vec<u8> },
    Raw { opcode: u16, bytes: Vec<u8> },
}

fuzz_target!(|events: Vec<FuzzEvent>| {
    let mut relay = Relay::new(FuzzEnv, RelayConfig { max_connections: MAX_CONNECTIONS });
    let mut accepted: HashSet<u64> = HashSet::new();

    for event in events {
        let event = match event {
            FuzzEvent::Accept { conn } => {
                RelayEvent::ConnectionAccepted { conn_id: conn_id(conn) }
            },
            FuzzEvent::Close { conn } => RelayEvent::ConnectionClosed { conn_id: conn_id(conn) },
            FuzzEvent::Frame { conn, frame } => {
                RelayEvent::FrameReceived { conn_id: conn_id(conn), frame: build_frame(frame) }
            },
        };

        let (conn_id, before, was_hello) = match &event {
            RelayEvent::ConnectionAccepted { conn_id } => {
                accepted.insert(*conn_id);
                (*conn_id, relay.session_state(*conn_id), false)
            },
            RelayEvent::ConnectionClosed { conn_id } => {
                (*conn_id, relay.session_state(*conn_id), false)
            },
            RelayEvent::FrameReceived { conn_id, frame } => (
                *conn_id,
                relay.session_state(*conn_id),
                frame.header.opcode_enum() == Some(Opcode::Hello),
            ),
        };

        match relay.process_event(event.clone()) {
            Ok(actions) => {
                for action in &actions {
                    let target = match action {
                        RelayAction::Send { conn_id, .. } | RelayAction::Close { conn_id, .. } => {
                            *conn_id
                        },
                    };
                    assert!(accepted.contains(&target), "action for unaccepted {target:#x}");
                }
            },
            Err(RelayError::UnknownConnection(id)) => {
                assert_eq!(id, conn_id);
                assert_eq!(before, SessionState::Closed);
            },
            Err(RelayError::DuplicateConnection(id)) => {
                assert_eq!(id, conn_id);
                assert_ne!(before, SessionState::Closed);
            },
        }

        let after = relay.session_state(conn_id);
        if after == SessionState::Established && before != SessionState::Established {
            assert!(was_hello, "established without Hello");
            assert_eq!(before, SessionState::Connecting);
        }
        if matches!(event, RelayEvent::ConnectionClosed { .. }) {
            assert_eq!(after, SessionState::Closed);
        }

        assert!(relay.connection_count() <= MAX_CONNECTIONS);

        for name in NAMES {
            let Some(entry) = relay.directory().lookup(name) else {
                continue;
            };
            if let Some(handle) = entry.connection {
                assert_eq!(relay.session_state(handle.conn_id), SessionState::Established);
            }
        }
    }
});

fn conn_id(conn: u8) -> u64 {
    0x1000 + u64::from(conn % 6)
}

fn name(index: u8) -> Identity {
    Identity::new(NAMES[usize::from(index) % NAMES.len()])
}

fn room(index: u8) -> RoomName {
    RoomName::new(if index % 4 == 0 { String::new() } else { format!("room-{}", index % 4) })
}

fn envelope(ciphertext: Vec<u8>) -> Envelope {
    Envelope {
        nonce: vec![0; 24],
        ciphertext,
        sender_public_key: PublicKey::new(vec![1; 32]),
        sender: Identity::new("mallory"),
        timestamp: 0,
    }
}

fn build_frame(fuzzed: FuzzedFrame) -> Frame {
    let payload = match fuzzed {
        FuzzedFrame::Hello { name: identity } => Payload::Hello(Hello {
            version: FrameHeader::VERSION,
            identity: identity.map(name),
        }),
        FuzzedFrame::Goodbye => Payload::Goodbye(Goodbye { reason: "fuzz".to_string() }),
        FuzzedFrame::RegisterKey { name: index, key } => Payload::RegisterKey(RegisterKey {
            identity: name(index),
            public_key: PublicKey::new(key),
        }),
        FuzzedFrame::ListUsers => Payload::ListUsers,
        FuzzedFrame::JoinRoom { room: index } => Payload::JoinRoom(JoinRoom { room: room(index) }),
        FuzzedFrame::LeaveRoom { room: index } => {
            Payload::LeaveRoom(LeaveRoom { room: room(index) })
        },
        FuzzedFrame::SendPrivate { to, ciphertext } => {
            Payload::SendPrivate(SendPrivate { to: name(to), envelope: envelope(ciphertext) })
        },
        FuzzedFrame::SendGroup { room: index, to } => Payload::SendGroup(SendGroup {
            room: room(index),
            packets: to
                .into_iter()
                .map(|to| GroupPacket { to: name(to), envelope: envelope(vec![to]) })
                .collect(),
        }),
        FuzzedFrame::Raw { opcode, bytes } => {
            let header = FrameHeader::new(Opcode::from_u16(opcode).unwrap_or(Opcode::JoinRoom));
            return Frame::new(header, bytes);
        },
    };

    payload
        .into_frame()
        .unwrap_or_else(|_| Frame::new(FrameHeader::new(Opcode::Goodbye), Vec::new()))
}
