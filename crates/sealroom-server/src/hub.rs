//! Connection hub: the relay plus one bounded outbox per connection.
//!
//! The hub is the single serialization point for relay state. Every event
//! is processed and its actions executed under one lock. Executing a `Send`
//! never waits: frames are pushed with `try_send`, and a full or closed
//! outbox drops the frame. A slow recipient therefore only loses its own
//! frames and never stalls the relay.
//!
//! A close travels on its own `oneshot`, outside the frame queue, so it is
//! never lost to a full outbox. The writer sees it once the queued frames
//! are drained.

use std::{collections::HashMap, sync::Arc};

use bytes::{Bytes, BytesMut};
use sealroom_core::{Relay, RelayAction, RelayError, RelayEvent};
use tokio::sync::{mpsc, oneshot};

use crate::system_env::SystemEnv;

/// Hub shared between connection tasks and the HTTP API.
pub type SharedHub = Arc<tokio::sync::Mutex<Hub>>;

/// Hub side of a connection's outbox.
#[derive(Debug)]
pub struct Outbox {
    frames: mpsc::Sender<Bytes>,
    close: oneshot::Sender<String>,
}

/// Writer side of a connection's outbox.
#[derive(Debug)]
pub struct OutboxReader {
    frames: mpsc::Receiver<Bytes>,
    close: oneshot::Receiver<String>,
}

/// Create an outbox holding at most `capacity` frames.
///
/// `capacity` must be at least 1.
pub fn outbox(capacity: usize) -> (Outbox, OutboxReader) {
    let (frames_tx, frames_rx) = mpsc::channel(capacity);
    let (close_tx, close_rx) = oneshot::channel();
    (
        Outbox { frames: frames_tx, close: close_tx },
        OutboxReader { frames: frames_rx, close: close_rx },
    )
}

impl OutboxReader {
    /// Next queued frame, or `None` once the hub has let go of the outbox
    /// and everything queued has been read.
    pub async fn next_frame(&mut self) -> Option<Bytes> {
        self.frames.recv().await
    }

    /// Why the relay closed the connection, if it did.
    ///
    /// Meaningful after [`Self::next_frame`] returned `None`.
    pub fn close_reason(&mut self) -> Option<String> {
        self.close.try_recv().ok()
    }
}

/// Relay state plus outboxes.
pub struct Hub {
    relay: Relay<SystemEnv>,
    outboxes: HashMap<u64, Outbox>,
}

impl Hub {
    /// Wrap a relay.
    pub fn new(relay: Relay<SystemEnv>) -> Self {
        Self { relay, outboxes: HashMap::new() }
    }

    /// Wrap in the shared lock.
    pub fn shared(self) -> SharedHub {
        Arc::new(tokio::sync::Mutex::new(self))
    }

    /// The relay, for read-only queries.
    pub fn relay(&self) -> &Relay<SystemEnv> {
        &self.relay
    }

    /// The relay, for the prekey API.
    pub fn relay_mut(&mut self) -> &mut Relay<SystemEnv> {
        &mut self.relay
    }

    /// Accept `conn_id` with `outbox` as its outbox.
    ///
    /// On error the hub keeps nothing of `outbox`, and an existing outbox for
    /// the same ID is left untouched.
    ///
    /// # Errors
    ///
    /// [`RelayError::DuplicateConnection`] if `conn_id` is already in use.
    pub fn accept(&mut self, conn_id: u64, outbox: Outbox) -> Result<(), RelayError> {
        if self.outboxes.contains_key(&conn_id) {
            return Err(RelayError::DuplicateConnection(conn_id));
        }

        // Attached first so a refusal's Goodbye and close have somewhere to go.
        self.outboxes.insert(conn_id, outbox);
        if let Err(e) = self.process(RelayEvent::ConnectionAccepted { conn_id }) {
            self.outboxes.remove(&conn_id);
            return Err(e);
        }
        Ok(())
    }

    /// Drop the outbox for `conn_id`; its writer drains and exits.
    pub fn detach(&mut self, conn_id: u64) {
        self.outboxes.remove(&conn_id);
    }

    /// Process `event` and execute the resulting actions.
    ///
    /// # Errors
    ///
    /// Propagates [`RelayError`]; no actions are executed in that case.
    pub fn process(&mut self, event: RelayEvent) -> Result<(), RelayError> {
        let actions = self.relay.process_event(event)?;
        self.execute(actions);
        Ok(())
    }

    fn execute(&mut self, actions: Vec<RelayAction>) {
        for action in actions {
            match action {
                RelayAction::Send { conn_id, payload } => {
                    let opcode = payload.opcode();
                    let frame = match payload.into_frame() {
                        Ok(frame) => frame,
                        Err(e) => {
                            tracing::error!(conn_id, ?opcode, error = %e, "failed to encode frame");
                            continue;
                        },
                    };

                    let mut buf = BytesMut::with_capacity(frame.encoded_len());
                    if let Err(e) = frame.encode(&mut buf) {
                        tracing::error!(conn_id, ?opcode, error = %e, "failed to encode frame");
                        continue;
                    }

                    self.push(conn_id, buf.freeze());
                },
                RelayAction::Close { conn_id, reason } => {
                    tracing::info!(conn_id, reason = %reason, "closing connection");
                    let Some(outbox) = self.outboxes.remove(&conn_id) else {
                        tracing::debug!(conn_id, "no outbox; close dropped");
                        continue;
                    };
                    if outbox.close.send(reason).is_err() {
                        tracing::debug!(conn_id, "writer gone; close dropped");
                    }
                },
            }
        }
    }

    fn push(&self, conn_id: u64, frame: Bytes) {
        let Some(outbox) = self.outboxes.get(&conn_id) else {
            tracing::debug!(conn_id, "no outbox; dropping");
            return;
        };

        match outbox.frames.try_send(frame) {
            Ok(()) => {},
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::debug!(conn_id, "outbox full; dropping");
            },
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(conn_id, "outbox closed; dropping");
            },
        }
    }
}
