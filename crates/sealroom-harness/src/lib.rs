//! Deterministic simulation harness for Sealroom.
//!
//! [`SimWorld`] wires one [`Relay`](sealroom_core::Relay) to any number of
//! [`Client`](sealroom_client::Client)s without sockets. Frames are encoded
//! to bytes and decoded again on every hop so the wire codec is exercised,
//! and they travel through a single FIFO queue so a run is fully determined
//! by its seed and the order of calls.
//!
//! # Model-Based Testing
//!
//! The `model` module provides a reference implementation for model-based
//! testing. Operations are applied to both the model and a [`SimWorld`], and
//! their observable states are compared.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod model;
pub mod sim_env;
pub mod world;

pub use error::HarnessError;
pub use model::{
    ClientId, ModelMessage, ModelRoomId, ModelWorld, ObservableState, Operation, OperationError,
    OperationResult, SmallMessage,
};
pub use sim_env::SimEnv;
pub use world::{PeerId, Received, SimWorld};
