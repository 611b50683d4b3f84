//! Room membership payload types.

use serde::{Deserialize, Serialize};

use crate::{Identity, RoomName};

/// Client joins a room (created on first join)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRoom {
    /// Room to join
    pub room: RoomName,
}

/// Client leaves a room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaveRoom {
    /// Room to leave
    pub room: RoomName,
}

/// Room member list after a join or leave
///
/// Member order carries no meaning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomUpdate {
    /// Room that changed
    pub room: RoomName,
    /// Current members
    pub members: Vec<Identity>,
}
