//! Presence fan-out.
//!
//! Presence is global: every established connection hears every transition,
//! including the connection the transition is about. Delivery is best-effort
//! per recipient.

use sealroom_proto::{Identity, Payload, payloads::directory::Presence};

use crate::{directory::ConnectionHandle, relay::RelayAction};

/// Builds presence notifications.
#[derive(Debug, Clone, Copy, Default)]
pub struct PresenceBroadcaster;

impl PresenceBroadcaster {
    /// One `Send` per recipient announcing `identity` as `online`.
    pub fn announce(
        identity: &Identity,
        online: bool,
        recipients: &[ConnectionHandle],
    ) -> Vec<RelayAction> {
        tracing::debug!(identity = %identity, online, recipients = recipients.len(), "presence");

        let payload = Payload::Presence(Presence { identity: identity.clone(), online });
        recipients
            .iter()
            .map(|handle| RelayAction::Send { conn_id: handle.conn_id, payload: payload.clone() })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn announce_reaches_every_recipient() {
        let recipients = [
            ConnectionHandle { conn_id: 1, generation: 1 },
            ConnectionHandle { conn_id: 2, generation: 2 },
        ];

        let actions = PresenceBroadcaster::announce(&Identity::new("alice"), true, &recipients);

        let expected = Payload::Presence(Presence { identity: Identity::new("alice"), online: true });
        assert_eq!(
            actions,
            vec![
                RelayAction::Send { conn_id: 1, payload: expected.clone() },
                RelayAction::Send { conn_id: 2, payload: expected },
            ]
        );
    }

    #[test]
    fn announce_with_no_connections_is_empty() {
        assert!(PresenceBroadcaster::announce(&Identity::new("alice"), false, &[]).is_empty());
    }
}
