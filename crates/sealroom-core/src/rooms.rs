//! Room registry: room name -> member identities.
//!
//! Membership is keyed by identity, not connection. It changes only on an
//! explicit join or leave; a disconnect does not remove anyone. Rooms are
//! created on first join and pruned when the last member leaves.

use std::collections::{BTreeMap, BTreeSet};

use sealroom_proto::{Identity, RoomName};

/// Room membership owned by the relay.
#[derive(Debug, Default, Clone)]
pub struct RoomRegistry {
    rooms: BTreeMap<RoomName, BTreeSet<Identity>>,
}

impl RoomRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `identity` to `room`, creating the room if needed.
    ///
    /// Returns the member set after the join. Joining twice is a no-op.
    pub fn join(&mut self, room: &RoomName, identity: &Identity) -> BTreeSet<Identity> {
        let members = self.rooms.entry(room.clone()).or_default();
        members.insert(identity.clone());
        members.clone()
    }

    /// Remove `identity` from `room`.
    ///
    /// Returns the remaining members. Leaving a room you are not in (or one
    /// that does not exist) changes nothing.
    pub fn leave(&mut self, room: &str, identity: &str) -> BTreeSet<Identity> {
        let Some(members) = self.rooms.get_mut(room) else {
            return BTreeSet::new();
        };

        members.remove(identity);
        let remaining = members.clone();

        if remaining.is_empty() {
            self.rooms.remove(room);
        }

        remaining
    }

    /// Members of `room`; empty if the room is unknown.
    pub fn members_of(&self, room: &str) -> BTreeSet<Identity> {
        self.rooms.get(room).cloned().unwrap_or_default()
    }

    /// Returns true if `identity` is currently in `room`.
    pub fn is_member(&self, room: &str, identity: &str) -> bool {
        self.rooms.get(room).is_some_and(|members| members.contains(identity))
    }

    /// Rooms and their members, ordered by room name.
    pub fn iter(&self) -> impl Iterator<Item = (&RoomName, &BTreeSet<Identity>)> {
        self.rooms.iter()
    }

    /// Number of non-empty rooms.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(name: &str) -> Identity {
        Identity::new(name)
    }

    #[test]
    fn join_creates_room_and_returns_members() {
        let mut registry = RoomRegistry::new();
        let room = RoomName::new("umum");

        let members = registry.join(&room, &id("alice"));
        assert_eq!(members, BTreeSet::from([id("alice")]));

        let members = registry.join(&room, &id("bob"));
        assert_eq!(members, BTreeSet::from([id("alice"), id("bob")]));
    }

    #[test]
    fn rejoin_is_idempotent() {
        let mut registry = RoomRegistry::new();
        let room = RoomName::new("umum");

        registry.join(&room, &id("alice"));
        let members = registry.join(&room, &id("alice"));

        assert_eq!(members.len(), 1);
    }

    #[test]
    fn leave_removes_only_that_member() {
        let mut registry = RoomRegistry::new();
        let room = RoomName::new("umum");
        registry.join(&room, &id("alice"));
        registry.join(&room, &id("bob"));

        let remaining = registry.leave("umum", "alice");

        assert_eq!(remaining, BTreeSet::from([id("bob")]));
        assert!(!registry.is_member("umum", "alice"));
    }

    #[test]
    fn leave_as_non_member_is_noop() {
        let mut registry = RoomRegistry::new();
        registry.join(&RoomName::new("umum"), &id("alice"));

        let remaining = registry.leave("umum", "mallory");
        assert_eq!(remaining, BTreeSet::from([id("alice")]));

        assert!(registry.leave("nowhere", "alice").is_empty());
    }

    #[test]
    fn leaving_one_room_keeps_others() {
        let mut registry = RoomRegistry::new();
        registry.join(&RoomName::new("a"), &id("alice"));
        registry.join(&RoomName::new("b"), &id("alice"));

        registry.leave("a", "alice");

        assert!(registry.is_member("b", "alice"));
        assert!(registry.members_of("a").is_empty());
    }

    #[test]
    fn empty_rooms_are_pruned() {
        let mut registry = RoomRegistry::new();
        registry.join(&RoomName::new("umum"), &id("alice"));
        registry.leave("umum", "alice");

        assert_eq!(registry.room_count(), 0);
    }
}
