//! Sealroom client.
//!
//! A Sans-IO state machine: feed it [`ClientEvent`]s, execute the returned
//! [`ClientAction`]s. It owns the client's key pair, seals every outgoing
//! envelope for its recipient, keeps a cached copy of the relay's directory
//! and of the member lists of joined rooms, and opens incoming envelopes.
//!
//! Envelopes that fail to open are discarded without any action.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod client;
mod error;
mod event;

pub use client::{Client, ClientState, DIRECTORY_REFRESH_INTERVAL};
pub use error::ClientError;
pub use event::{ClientAction, ClientEvent};
