//! Session payload types: handshake and disconnection.

use serde::{Deserialize, Serialize};

use crate::Identity;

/// Initial client handshake
///
/// The first frame on every connection. `identity` is the username the client
/// wants to be reachable as; a handshake without one is rejected and the
/// connection closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hello {
    /// Protocol version
    pub version: u8,
    /// Requested identity
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub identity: Option<Identity>,
}

/// Server response to an accepted [`Hello`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloReply {
    /// Connection-scoped session ID assigned by the server
    pub session_id: u64,
}

/// Graceful disconnect
///
/// Sent by a client before closing, or by the server when it rejects a
/// connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Goodbye {
    /// Reason for disconnect (for logging/debugging)
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hello_without_identity_omits_field() {
        let hello = Hello { version: 1, identity: None };

        let mut bytes = Vec::new();
        ciborium::ser::into_writer(&hello, &mut bytes).expect("encode");

        let value: ciborium::Value = ciborium::de::from_reader(&bytes[..]).expect("decode");
        let map = value.as_map().expect("map");
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn hello_decodes_missing_identity_as_none() {
        let mut bytes = Vec::new();
        ciborium::ser::into_writer(
            &ciborium::Value::Map(vec![(
                ciborium::Value::Text("version".to_string()),
                ciborium::Value::Integer(1u8.into()),
            )]),
            &mut bytes,
        )
        .expect("encode");

        let hello: Hello = ciborium::de::from_reader(&bytes[..]).expect("decode");
        assert_eq!(hello, Hello { version: 1, identity: None });
    }
}
