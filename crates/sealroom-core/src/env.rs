//! Environment abstraction for deterministic testing.
//!
//! The `Environment` trait decouples protocol logic from system resources
//! (time and randomness). The server supplies a system-backed implementation;
//! the simulation harness supplies a seeded one so runs are reproducible.
//!
//! # Invariants
//!
//! - Monotonicity: `now()` must never go backwards
//! - Determinism: Given the same seed, `random_bytes()` produces the same
//!   sequence
//! - Isolation: Implementations must not share global state

use std::time::Instant;

/// Abstract environment providing time and randomness.
///
/// # Security
///
/// Production implementations MUST draw `random_bytes()` from the OS entropy
/// pool. Nonces for sealing come from here.
pub trait Environment: Clone + Send + Sync + 'static {
    /// Returns the current monotonic time.
    fn now(&self) -> Instant;

    /// Returns wall-clock milliseconds since the Unix epoch.
    ///
    /// Only used for display timestamps; never for ordering.
    fn unix_millis(&self) -> u64;

    /// Fills the provided buffer with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a random `u64`.
    ///
    /// Convenience for connection and session IDs.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }
}
