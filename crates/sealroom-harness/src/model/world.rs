//! Model world - the reference relay and its clients.
//!
//! Tracks exactly the state a real client can observe: its session, its
//! directory snapshot (refreshed on connect and every
//! [`DIRECTORY_REFRESH_INTERVAL`]), the member lists of rooms it joined, and
//! the messages it opened.

use std::collections::{BTreeMap, BTreeSet};

use sealroom_client::DIRECTORY_REFRESH_INTERVAL;

use super::operation::{ClientId, ModelRoomId, Operation, OperationError, OperationResult};

/// Message as a model client sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelMessage {
    /// Sender's client ID.
    pub from: ClientId,
    /// Room for group messages.
    pub room: Option<ModelRoomId>,
    /// Message content.
    pub content: Vec<u8>,
}

/// Observable state for oracle comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservableState {
    /// Per-client session flag.
    pub connected: Vec<bool>,
    /// Per-client joined rooms with cached member lists.
    pub client_rooms: Vec<Vec<(ModelRoomId, Vec<ClientId>)>>,
    /// Per-client opened messages in arrival order.
    pub inboxes: Vec<Vec<ModelMessage>>,
    /// Relay membership per non-empty room.
    pub server_rooms: Vec<(ModelRoomId, Vec<ClientId>)>,
}

#[derive(Debug, Clone, Default)]
struct ModelClient {
    connected: bool,
    /// Key published at least once; keys outlive sessions.
    registered: bool,
    snapshot: BTreeSet<ClientId>,
    last_refresh_ms: u64,
    rooms: BTreeMap<ModelRoomId, Vec<ClientId>>,
    inbox: Vec<ModelMessage>,
}

/// Model world - the reference implementation.
#[derive(Debug, Clone)]
pub struct ModelWorld {
    clients: Vec<ModelClient>,
    membership: BTreeMap<ModelRoomId, BTreeSet<ClientId>>,
    now_ms: u64,
}

impl ModelWorld {
    /// Create a new model world with the given number of clients.
    pub fn new(num_clients: usize) -> Self {
        Self {
            clients: vec![ModelClient::default(); num_clients],
            membership: BTreeMap::new(),
            now_ms: 0,
        }
    }

    /// Number of clients in the world.
    pub fn num_clients(&self) -> usize {
        self.clients.len()
    }

    /// Returns true if `client` has a session.
    pub fn is_connected(&self, client: ClientId) -> bool {
        self.clients.get(usize::from(client)).is_some_and(|c| c.connected)
    }

    /// Relay-side members of `room`.
    pub fn members_of(&self, room: ModelRoomId) -> Vec<ClientId> {
        self.membership.get(&room).map(|m| m.iter().copied().collect()).unwrap_or_default()
    }

    /// Apply an operation and return the result.
    pub fn apply(&mut self, op: &Operation) -> OperationResult {
        match op {
            Operation::Connect { client_id } => self.apply_connect(*client_id),
            Operation::Disconnect { client_id } => self.apply_disconnect(*client_id),
            Operation::JoinRoom { client_id, room_id } => self.apply_join(*client_id, *room_id),
            Operation::LeaveRoom { client_id, room_id } => self.apply_leave(*client_id, *room_id),
            Operation::SendPrivate { client_id, to, content } => {
                self.apply_send_private(*client_id, *to, content.to_bytes())
            },
            Operation::SendGroup { client_id, room_id, content } => {
                self.apply_send_group(*client_id, *room_id, content.to_bytes())
            },
            Operation::AdvanceTime { millis } => {
                self.apply_advance(u64::from(*millis));
                OperationResult::Ok
            },
        }
    }

    /// Extract observable state for comparison.
    pub fn observable_state(&self) -> ObservableState {
        ObservableState {
            connected: self.clients.iter().map(|c| c.connected).collect(),
            client_rooms: self
                .clients
                .iter()
                .map(|c| c.rooms.iter().map(|(room, members)| (*room, members.clone())).collect())
                .collect(),
            inboxes: self.clients.iter().map(|c| c.inbox.clone()).collect(),
            server_rooms: self
                .membership
                .iter()
                .map(|(room, members)| (*room, members.iter().copied().collect()))
                .collect(),
        }
    }

    fn apply_connect(&mut self, client_id: ClientId) -> OperationResult {
        let now_ms = self.now_ms;
        let Some(client) = self.clients.get_mut(usize::from(client_id)) else {
            return OperationResult::Error(OperationError::InvalidClient);
        };
        if client.connected {
            return OperationResult::Error(OperationError::AlreadyConnected);
        }

        // The key is registered before the first directory listing.
        client.connected = true;
        client.registered = true;
        client.last_refresh_ms = now_ms;

        let snapshot = self.registered();
        self.clients[usize::from(client_id)].snapshot = snapshot;
        OperationResult::Ok
    }

    fn apply_disconnect(&mut self, client_id: ClientId) -> OperationResult {
        let Some(client) = self.clients.get_mut(usize::from(client_id)) else {
            return OperationResult::Error(OperationError::InvalidClient);
        };

        client.connected = false;
        OperationResult::Ok
    }

    fn apply_join(&mut self, client_id: ClientId, room: ModelRoomId) -> OperationResult {
        if let Err(e) = self.require_connected(client_id) {
            return OperationResult::Error(e);
        }

        self.clients[usize::from(client_id)].rooms.entry(room).or_default();
        self.membership.entry(room).or_default().insert(client_id);
        self.broadcast_room(room);
        OperationResult::Ok
    }

    fn apply_leave(&mut self, client_id: ClientId, room: ModelRoomId) -> OperationResult {
        if let Err(e) = self.require_connected(client_id) {
            return OperationResult::Error(e);
        }

        self.clients[usize::from(client_id)].rooms.remove(&room);
        if let Some(members) = self.membership.get_mut(&room) {
            members.remove(&client_id);
            if members.is_empty() {
                self.membership.remove(&room);
            }
        }
        self.broadcast_room(room);
        OperationResult::Ok
    }

    fn apply_send_private(
        &mut self,
        client_id: ClientId,
        to: ClientId,
        content: Vec<u8>,
    ) -> OperationResult {
        if usize::from(to) >= self.clients.len() {
            return OperationResult::Error(OperationError::InvalidClient);
        }
        if let Err(e) = self.require_connected(client_id) {
            return OperationResult::Error(e);
        }
        if !self.clients[usize::from(client_id)].snapshot.contains(&to) {
            return OperationResult::Error(OperationError::PeerNotFound);
        }

        self.deliver(to, ModelMessage { from: client_id, room: None, content });
        OperationResult::Ok
    }

    fn apply_send_group(
        &mut self,
        client_id: ClientId,
        room: ModelRoomId,
        content: Vec<u8>,
    ) -> OperationResult {
        if let Err(e) = self.require_connected(client_id) {
            return OperationResult::Error(e);
        }

        let sender = &self.clients[usize::from(client_id)];
        let Some(members) = sender.rooms.get(&room) else {
            return OperationResult::Error(OperationError::RoomNotJoined);
        };

        let recipients: Vec<ClientId> = members
            .iter()
            .copied()
            .filter(|member| *member != client_id && sender.snapshot.contains(member))
            .collect();

        for recipient in recipients {
            self.deliver(
                recipient,
                ModelMessage { from: client_id, room: Some(room), content: content.clone() },
            );
        }
        OperationResult::Ok
    }

    fn apply_advance(&mut self, millis: u64) {
        self.now_ms += millis;
        let interval = u64::try_from(DIRECTORY_REFRESH_INTERVAL.as_millis()).unwrap_or(u64::MAX);
        let registered = self.registered();

        for client in self.clients.iter_mut().filter(|c| c.connected) {
            if self.now_ms.saturating_sub(client.last_refresh_ms) >= interval {
                client.last_refresh_ms = self.now_ms;
                client.snapshot.clone_from(&registered);
            }
        }
    }

    /// Online members of `room` get the post-change member list.
    fn broadcast_room(&mut self, room: ModelRoomId) {
        let members = self.members_of(room);
        for member in &members {
            let client = &mut self.clients[usize::from(*member)];
            if !client.connected {
                continue;
            }
            if let Some(cached) = client.rooms.get_mut(&room) {
                cached.clone_from(&members);
            }
        }
    }

    /// Dropped when the recipient is offline.
    fn deliver(&mut self, to: ClientId, message: ModelMessage) {
        let recipient = &mut self.clients[usize::from(to)];
        if recipient.connected {
            recipient.inbox.push(message);
        }
    }

    fn registered(&self) -> BTreeSet<ClientId> {
        (0..self.clients.len())
            .filter(|i| self.clients[*i].registered)
            .filter_map(|i| ClientId::try_from(i).ok())
            .collect()
    }

    fn require_connected(&self, client_id: ClientId) -> Result<(), OperationError> {
        match self.clients.get(usize::from(client_id)) {
            None => Err(OperationError::InvalidClient),
            Some(client) if !client.connected => Err(OperationError::NotConnected),
            Some(_) => Ok(()),
        }
    }
}
