//! Client events and actions.

use std::time::Instant;

use sealroom_proto::{Frame, Identity, RoomName};

/// Input to the client state machine.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// Transport is up; start the handshake
    Connect,

    /// Time has passed; drives directory refresh
    Tick {
        /// Current time
        now: Instant,
    },

    /// Seal `plaintext` for a single peer
    SendPrivate {
        /// Recipient
        to: Identity,
        /// Message body
        plaintext: Vec<u8>,
    },

    /// Seal `plaintext` once per cached member of `room`
    SendGroup {
        /// Room to send to
        room: RoomName,
        /// Message body
        plaintext: Vec<u8>,
    },

    /// Join a room
    JoinRoom {
        /// Room to join
        room: RoomName,
    },

    /// Leave a room
    LeaveRoom {
        /// Room to leave
        room: RoomName,
    },

    /// Close the session gracefully
    Disconnect,

    /// A frame arrived from the relay
    FrameReceived(Frame),
}

/// Output of the client state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientAction {
    /// Write this frame to the relay
    Send(Frame),

    /// A message was opened
    DeliverMessage {
        /// Identity claimed by the envelope
        from: Identity,
        /// Room tag for group messages
        room: Option<RoomName>,
        /// Opened message body
        plaintext: Vec<u8>,
        /// Sender's wall-clock timestamp (milliseconds)
        timestamp: u64,
    },

    /// A peer came online or went offline
    PresenceChanged {
        /// Peer
        identity: Identity,
        /// New status
        online: bool,
    },

    /// Member list of a joined room changed
    RoomMembersChanged {
        /// Room
        room: RoomName,
        /// Current members
        members: Vec<Identity>,
    },

    /// The relay ended the session
    Disconnected {
        /// Reason given by the relay
        reason: String,
    },

    /// Diagnostic message for the application log
    Log {
        /// Message
        message: String,
    },
}
