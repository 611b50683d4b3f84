//! Sealroom routing core.
//!
//! Everything that decides where an encrypted envelope goes, with no I/O:
//!
//! ```text
//! sealroom-core
//!   ├─ KeyDirectory          (identity -> public key + live connection)
//!   ├─ RoomRegistry          (room -> member identities)
//!   ├─ PresenceBroadcaster   (online/offline fan-out)
//!   ├─ MessageRouter         (private and group envelope delivery)
//!   ├─ ConnectionLifecycle   (Connecting -> Established -> Closed)
//!   ├─ PrekeyStore           (opaque prekey bundles)
//!   └─ Relay                 (event in, actions out)
//! ```
//!
//! The relay never sees plaintext and never holds a private key. Envelopes
//! pass through unchanged; an envelope for an unknown or offline identity is
//! dropped and the sender is not told.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod directory;
pub mod env;
pub mod error;
pub mod lifecycle;
pub mod prekeys;
pub mod presence;
pub mod relay;
pub mod rooms;
pub mod router;

pub use directory::{ConnectionHandle, DirectoryEntry, KeyDirectory};
pub use env::Environment;
pub use error::{LifecycleError, RelayError};
pub use lifecycle::{ConnectionLifecycle, Departure, SessionState};
pub use prekeys::PrekeyStore;
pub use presence::PresenceBroadcaster;
pub use relay::{Relay, RelayAction, RelayConfig, RelayEvent};
pub use rooms::RoomRegistry;
pub use router::{Delivery, DropReason, MessageRouter};
