//! Message router: resolves destinations and forwards envelopes.
//!
//! Routing is a pure lookup against the [`KeyDirectory`]. Every destination
//! yields a [`Delivery`]: either the envelope (unchanged) paired with the live
//! connection it should go to, or a drop with the reason. Drops are the
//! normal outcome for offline recipients and are never surfaced to senders.
//!
//! Group dispatches are a list of individually sealed envelopes. Each is
//! routed on its own; one unreachable member does not affect the rest. The
//! room tag is copied onto forwarded messages for display and is not checked
//! against the [`RoomRegistry`](crate::RoomRegistry).

use sealroom_proto::{
    Envelope, GroupPacket, Identity, Payload, RoomName,
    payloads::message::{GroupMessage, PrivateMessage},
};

use crate::directory::{ConnectionHandle, KeyDirectory};

/// Why an envelope was not forwarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Destination never registered
    UnknownDestination,
    /// Destination is known but has no live connection
    OfflineDestination,
}

/// Outcome of routing one envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Send `payload` to `handle`
    Forwarded {
        /// Destination identity
        to: Identity,
        /// Live connection of the destination
        handle: ConnectionHandle,
        /// `PrivateMessage` or `GroupMessage` wrapping the envelope
        payload: Payload,
    },

    /// Envelope discarded
    Dropped {
        /// Destination identity
        to: Identity,
        /// Why it was discarded
        reason: DropReason,
    },
}

impl Delivery {
    /// Returns true if the envelope was forwarded.
    pub fn is_forwarded(&self) -> bool {
        matches!(self, Self::Forwarded { .. })
    }
}

/// Routes envelopes using a borrowed directory.
#[derive(Debug, Clone, Copy)]
pub struct MessageRouter<'a> {
    directory: &'a KeyDirectory,
}

impl<'a> MessageRouter<'a> {
    /// Create a router over `directory`.
    pub fn new(directory: &'a KeyDirectory) -> Self {
        Self { directory }
    }

    /// Route a private envelope to `to`.
    pub fn route_private(&self, to: &Identity, envelope: Envelope) -> Delivery {
        self.resolve(to, || Payload::PrivateMessage(PrivateMessage { envelope }))
    }

    /// Route every packet of a group dispatch independently.
    ///
    /// Returns one [`Delivery`] per packet, in input order.
    pub fn route_group(&self, room: &RoomName, packets: Vec<GroupPacket>) -> Vec<Delivery> {
        packets
            .into_iter()
            .map(|GroupPacket { to, envelope }| {
                self.resolve(&to, || {
                    Payload::GroupMessage(GroupMessage { room: room.clone(), envelope })
                })
            })
            .collect()
    }

    fn resolve(&self, to: &Identity, payload: impl FnOnce() -> Payload) -> Delivery {
        let Some(entry) = self.directory.lookup(to.as_str()) else {
            tracing::debug!(to = %to, "dropping envelope: unknown destination");
            return Delivery::Dropped { to: to.clone(), reason: DropReason::UnknownDestination };
        };

        match entry.connection {
            Some(handle) => Delivery::Forwarded { to: to.clone(), handle, payload: payload() },
            None => {
                tracing::debug!(to = %to, "dropping envelope: destination offline");
                Delivery::Dropped { to: to.clone(), reason: DropReason::OfflineDestination }
            },
        }
    }
}
