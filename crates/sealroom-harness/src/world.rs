//! In-process relay and clients.
//!
//! Every hop goes through one FIFO queue as encoded bytes. Nothing moves
//! until [`SimWorld::deliver_all`] drains the queue, which lets tests stage
//! interleavings (two connections for one identity, a close that lands after
//! a reconnect) deterministically.

use std::collections::VecDeque;

use sealroom_client::{Client, ClientAction, ClientEvent};
use sealroom_core::{Environment, Relay, RelayAction, RelayConfig, RelayError, RelayEvent};
use sealroom_proto::{Frame, Identity, RoomName};

use crate::{error::HarnessError, sim_env::SimEnv};

/// Index of a peer in a [`SimWorld`].
pub type PeerId = usize;

/// A message a peer's client opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Received {
    /// Sender identity from the envelope
    pub from: Identity,
    /// Room for group messages
    pub room: Option<RoomName>,
    /// Opened body
    pub plaintext: Vec<u8>,
    /// Sender timestamp
    pub timestamp: u64,
}

struct Peer {
    client: Client<SimEnv>,
    conn_id: Option<u64>,
    inbox: Vec<Received>,
    presence: Vec<(Identity, bool)>,
    disconnects: Vec<String>,
}

enum Transit {
    ToRelay { conn_id: u64, wire: Vec<u8> },
    ToPeer { peer: PeerId, conn_id: u64, wire: Vec<u8> },
    Closed { conn_id: u64 },
}

/// A relay and its clients, driven by explicit calls.
pub struct SimWorld {
    env: SimEnv,
    relay: Relay<SimEnv>,
    peers: Vec<Peer>,
    queue: VecDeque<Transit>,
    frames_delivered: usize,
}

impl SimWorld {
    /// Create an empty world seeded with `seed`.
    pub fn new(seed: u64) -> Self {
        Self::with_config(seed, RelayConfig::default())
    }

    /// Create an empty world with explicit relay limits.
    pub fn with_config(seed: u64, config: RelayConfig) -> Self {
        let env = SimEnv::with_seed(seed);
        Self {
            relay: Relay::new(env.clone(), config),
            env,
            peers: Vec::new(),
            queue: VecDeque::new(),
            frames_delivered: 0,
        }
    }

    /// Add a disconnected client for `identity`.
    ///
    /// Two peers may share an identity; they model two devices.
    pub fn add_peer(&mut self, identity: &str) -> PeerId {
        self.peers.push(Peer {
            client: Client::new(self.env.clone(), Identity::new(identity)),
            conn_id: None,
            inbox: Vec::new(),
            presence: Vec::new(),
            disconnects: Vec::new(),
        });
        self.peers.len() - 1
    }

    /// Open a transport connection and start the handshake.
    pub fn connect(&mut self, peer: PeerId) -> Result<(), HarnessError> {
        let actions = self.peer_mut(peer)?.client.handle(ClientEvent::Connect)?;

        let conn_id = self.env.random_u64();
        self.peer_mut(peer)?.conn_id = Some(conn_id);

        let relay_actions = self.relay.process_event(RelayEvent::ConnectionAccepted { conn_id })?;
        self.execute_relay(relay_actions)?;
        self.execute_client(peer, actions)
    }

    /// Say goodbye and let the relay close the connection.
    pub fn disconnect(&mut self, peer: PeerId) -> Result<(), HarnessError> {
        let actions = self.peer_mut(peer)?.client.handle(ClientEvent::Disconnect)?;
        self.execute_client(peer, actions)
    }

    /// Lose the transport without a goodbye.
    ///
    /// The relay learns about it when the queued close is delivered.
    pub fn drop_connection(&mut self, peer: PeerId) -> Result<(), HarnessError> {
        let state = self.peer_mut(peer)?;
        // The goodbye frame has nowhere to go.
        state.client.handle(ClientEvent::Disconnect)?;

        if let Some(conn_id) = state.conn_id.take() {
            self.queue.push_back(Transit::Closed { conn_id });
        }
        Ok(())
    }

    /// Join `room`.
    pub fn join(&mut self, peer: PeerId, room: &str) -> Result<(), HarnessError> {
        self.client_event(peer, ClientEvent::JoinRoom { room: RoomName::new(room) })
    }

    /// Leave `room`.
    pub fn leave(&mut self, peer: PeerId, room: &str) -> Result<(), HarnessError> {
        self.client_event(peer, ClientEvent::LeaveRoom { room: RoomName::new(room) })
    }

    /// Seal and send a private message.
    pub fn send_private(
        &mut self,
        peer: PeerId,
        to: &str,
        plaintext: &[u8],
    ) -> Result<(), HarnessError> {
        self.client_event(
            peer,
            ClientEvent::SendPrivate { to: Identity::new(to), plaintext: plaintext.to_vec() },
        )
    }

    /// Seal once per cached room member and send.
    pub fn send_group(
        &mut self,
        peer: PeerId,
        room: &str,
        plaintext: &[u8],
    ) -> Result<(), HarnessError> {
        self.client_event(
            peer,
            ClientEvent::SendGroup { room: RoomName::new(room), plaintext: plaintext.to_vec() },
        )
    }

    /// Advance virtual time and tick every client.
    pub fn advance(&mut self, by: std::time::Duration) -> Result<(), HarnessError> {
        self.env.advance(by);
        let now = self.env.now();

        for peer in 0..self.peers.len() {
            self.client_event(peer, ClientEvent::Tick { now })?;
        }
        Ok(())
    }

    /// Deliver queued frames until nothing is in flight.
    ///
    /// Returns the number of frames delivered.
    pub fn deliver_all(&mut self) -> Result<usize, HarnessError> {
        let before = self.frames_delivered;
        while let Some(transit) = self.queue.pop_front() {
            self.deliver(transit)?;
        }
        Ok(self.frames_delivered - before)
    }

    /// Frames or closes still in flight.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// The relay.
    pub fn relay(&self) -> &Relay<SimEnv> {
        &self.relay
    }

    /// Shared environment.
    pub fn env(&self) -> &SimEnv {
        &self.env
    }

    /// Number of peers.
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// A peer's client.
    pub fn client(&self, peer: PeerId) -> Result<&Client<SimEnv>, HarnessError> {
        Ok(&self.peer(peer)?.client)
    }

    /// Messages a peer has opened, in arrival order.
    pub fn inbox(&self, peer: PeerId) -> Result<&[Received], HarnessError> {
        Ok(&self.peer(peer)?.inbox)
    }

    /// Presence notifications a peer has seen, in arrival order.
    pub fn presence_log(&self, peer: PeerId) -> Result<&[(Identity, bool)], HarnessError> {
        Ok(&self.peer(peer)?.presence)
    }

    /// Reasons the relay gave when ending a peer's sessions.
    pub fn disconnect_reasons(&self, peer: PeerId) -> Result<&[String], HarnessError> {
        Ok(&self.peer(peer)?.disconnects)
    }

    /// A peer's open connection, if any.
    pub fn conn_id(&self, peer: PeerId) -> Result<Option<u64>, HarnessError> {
        Ok(self.peer(peer)?.conn_id)
    }

    fn client_event(&mut self, peer: PeerId, event: ClientEvent) -> Result<(), HarnessError> {
        let actions = self.peer_mut(peer)?.client.handle(event)?;
        self.execute_client(peer, actions)
    }

    fn deliver(&mut self, transit: Transit) -> Result<(), HarnessError> {
        match transit {
            Transit::ToRelay { conn_id, wire } => {
                let frame = Frame::decode(&wire)?;
                self.frames_delivered += 1;

                match self.relay.process_event(RelayEvent::FrameReceived { conn_id, frame }) {
                    Ok(actions) => self.execute_relay(actions),
                    // Read after close; the transport would have discarded it.
                    Err(RelayError::UnknownConnection(_)) => Ok(()),
                    Err(e) => Err(e.into()),
                }
            },
            Transit::ToPeer { peer, conn_id, wire } => {
                if self.peer(peer)?.conn_id != Some(conn_id) {
                    return Ok(());
                }

                let frame = Frame::decode(&wire)?;
                self.frames_delivered += 1;
                self.client_event(peer, ClientEvent::FrameReceived(frame))
            },
            Transit::Closed { conn_id } => {
                if let Some(peer) = self.peer_for(conn_id) {
                    self.peers[peer].conn_id = None;
                }

                let actions = self.relay.process_event(RelayEvent::ConnectionClosed { conn_id })?;
                self.execute_relay(actions)
            },
        }
    }

    fn execute_client(
        &mut self,
        peer: PeerId,
        actions: Vec<ClientAction>,
    ) -> Result<(), HarnessError> {
        for action in actions {
            let state = self.peer_mut(peer)?;
            match action {
                ClientAction::Send(frame) => {
                    let Some(conn_id) = state.conn_id else {
                        continue;
                    };
                    let wire = encode(&frame)?;
                    self.queue.push_back(Transit::ToRelay { conn_id, wire });
                },
                ClientAction::DeliverMessage { from, room, plaintext, timestamp } => {
                    state.inbox.push(Received { from, room, plaintext, timestamp });
                },
                ClientAction::PresenceChanged { identity, online } => {
                    state.presence.push((identity, online));
                },
                ClientAction::Disconnected { reason } => state.disconnects.push(reason),
                ClientAction::RoomMembersChanged { .. } | ClientAction::Log { .. } => {},
            }
        }
        Ok(())
    }

    fn execute_relay(&mut self, actions: Vec<RelayAction>) -> Result<(), HarnessError> {
        for action in actions {
            match action {
                RelayAction::Send { conn_id, payload } => {
                    let Some(peer) = self.peer_for(conn_id) else {
                        continue;
                    };
                    let wire = encode(&payload.into_frame()?)?;
                    self.queue.push_back(Transit::ToPeer { peer, conn_id, wire });
                },
                // Behind everything already queued for the connection.
                RelayAction::Close { conn_id, .. } => {
                    self.queue.push_back(Transit::Closed { conn_id });
                },
            }
        }
        Ok(())
    }

    fn peer_for(&self, conn_id: u64) -> Option<PeerId> {
        self.peers.iter().position(|peer| peer.conn_id == Some(conn_id))
    }

    fn peer(&self, peer: PeerId) -> Result<&Peer, HarnessError> {
        self.peers.get(peer).ok_or(HarnessError::UnknownPeer(peer))
    }

    fn peer_mut(&mut self, peer: PeerId) -> Result<&mut Peer, HarnessError> {
        self.peers.get_mut(peer).ok_or(HarnessError::UnknownPeer(peer))
    }
}

fn encode(frame: &Frame) -> Result<Vec<u8>, HarnessError> {
    let mut wire = Vec::with_capacity(frame.encoded_len());
    frame.encode(&mut wire)?;
    Ok(wire)
}
