//! # Sealroom Protocol: Wire Format
//!
//! Binary framing and payload types for the Sealroom relay.
//!
//! ## Protocol Design
//!
//! - **FrameHeader**: 12 bytes of raw binary (Big Endian), parsed zero-copy so
//!   the relay can dispatch on the opcode before touching the payload
//! - **Payload**: Variable-length CBOR-encoded structured data
//!
//! The relay only ever moves [`Envelope`]s around. Nonces, ciphertext and
//! public keys are opaque byte strings at this layer; nothing here knows how
//! they were produced.
//!
//! ## Security Properties
//!
//! - **Size Limits**: Payloads are capped at
//!   [`FrameHeader::MAX_PAYLOAD_SIZE`] and the cap is checked before any
//!   payload bytes are read from the network.
//! - **Explicit Validation**: Parsing functions return `Result`; there is no
//!   unchecked fast path.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod errors;
pub mod frame;
pub mod header;
pub mod opcodes;
pub mod payloads;
pub mod types;

pub use errors::{ProtocolError, Result};
pub use frame::Frame;
pub use header::FrameHeader;
pub use opcodes::Opcode;
pub use payloads::Payload;
pub use types::{Envelope, GroupPacket, Identity, PublicKey, RoomName, UserRecord};
