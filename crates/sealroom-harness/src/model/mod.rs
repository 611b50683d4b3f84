//! Reference model for model-based testing.
//!
//! The model captures what a relay with attached clients should do, with no
//! cryptography, framing, or queues. It is the oracle a [`SimWorld`] run is
//! checked against.
//!
//! # Design Principles
//!
//! - Simplicity: The model should be obviously correct
//! - Delivery is instant: each operation runs to quiescence
//! - Deterministic: Same inputs produce same outputs
//!
//! [`SimWorld`]: crate::SimWorld

pub mod operation;
mod world;

pub use operation::{
    ClientId, ModelRoomId, Operation, OperationError, OperationResult, SmallMessage, identity_name,
    room_name,
};
pub use world::{ModelMessage, ModelWorld, ObservableState};
