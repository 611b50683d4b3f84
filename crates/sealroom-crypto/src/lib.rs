//! Sealroom Cryptographic Primitives
//!
//! Public-key authenticated encryption between two identities:
//!
//! ```text
//! shared = X25519(sender_secret, recipient_public)
//! key    = HKDF-SHA256(shared, info = "sealroom-box-v1" || lo(pk) || hi(pk))
//! box    = XChaCha20-Poly1305(key, nonce, plaintext, aad = sender_pk || recipient_pk)
//! ```
//!
//! Both directions of a pair derive the same key (the public keys are sorted
//! into the info string); the AAD binds the direction, so a box cannot be
//! replayed back to its sender.
//!
//! # Design
//!
//! All functions are pure. Key seeds and nonces are supplied by the caller,
//! which keeps the crate usable from deterministic simulations. The relay
//! never links this crate.
//!
//! # Security Properties
//!
//! - Sender Authentication: only the holder of the sender's secret key (or the
//!   recipient's) can produce a box that opens under the pair's key
//! - Integrity: any modification of ciphertext, nonce or either public key
//!   makes [`open`] fail
//! - Contributory Agreement: low-order peer keys are rejected

#![forbid(unsafe_code)]
#![deny(missing_docs)]

use chacha20poly1305::{
    KeyInit, XChaCha20Poly1305, XNonce,
    aead::{Aead, Payload},
};
use hkdf::Hkdf;
use sha2::Sha256;
use thiserror::Error;
use x25519_dalek::{PublicKey, StaticSecret};

/// Size of an X25519 public key.
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Size of a sealing nonce.
pub const NONCE_SIZE: usize = 24;

/// Poly1305 tag appended to every box.
pub const TAG_SIZE: usize = 16;

const KDF_INFO: &[u8] = b"sealroom-box-v1";

/// Errors from sealing and opening.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// Public key is not 32 bytes
    #[error("invalid public key length: expected {PUBLIC_KEY_SIZE}, got {0}")]
    InvalidPublicKey(usize),

    /// Nonce is not 24 bytes
    #[error("invalid nonce length: expected {NONCE_SIZE}, got {0}")]
    InvalidNonce(usize),

    /// Peer key is a low-order point
    #[error("non-contributory key agreement")]
    WeakKey,

    /// HKDF expansion failed
    #[error("key derivation failed")]
    KeyDerivation,

    /// AEAD encryption failed
    #[error("encryption failed")]
    Encryption,

    /// Authentication failed: wrong key, tampered box or wrong nonce
    #[error("decryption failed")]
    Decryption,
}

/// An X25519 key pair.
///
/// Secret material is zeroized on drop by `x25519-dalek`.
#[derive(Clone)]
pub struct KeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl KeyPair {
    /// Derive a key pair from 32 caller-supplied random bytes.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        let secret = StaticSecret::from(seed);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Public half, as sent over the wire.
    pub fn public_key(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.public.to_bytes()
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair").field("public", &self.public.as_bytes()).finish_non_exhaustive()
    }
}

/// Seal `plaintext` from `sender` to `recipient_public_key`.
///
/// `nonce` must be unique per key pair; callers draw it from their
/// environment's RNG.
pub fn seal(
    plaintext: &[u8],
    nonce: &[u8],
    recipient_public_key: &[u8],
    sender: &KeyPair,
) -> Result<Vec<u8>, CryptoError> {
    let recipient = parse_public_key(recipient_public_key)?;
    let nonce = parse_nonce(nonce)?;
    let cipher = pair_cipher(sender, &recipient)?;
    let aad = direction_aad(&sender.public, &recipient);

    cipher
        .encrypt(nonce, Payload { msg: plaintext, aad: &aad })
        .map_err(|_| CryptoError::Encryption)
}

/// Open a box sealed by `sender_public_key` for `recipient`.
///
/// Every failure mode (wrong keys, tampering, wrong nonce) collapses to
/// [`CryptoError::Decryption`] once the inputs are well-formed.
pub fn open(
    ciphertext: &[u8],
    nonce: &[u8],
    sender_public_key: &[u8],
    recipient: &KeyPair,
) -> Result<Vec<u8>, CryptoError> {
    let sender = parse_public_key(sender_public_key)?;
    let nonce = parse_nonce(nonce)?;
    let cipher = pair_cipher(recipient, &sender)?;
    let aad = direction_aad(&sender, &recipient.public);

    cipher
        .decrypt(nonce, Payload { msg: ciphertext, aad: &aad })
        .map_err(|_| CryptoError::Decryption)
}

fn parse_public_key(bytes: &[u8]) -> Result<PublicKey, CryptoError> {
    let bytes: [u8; PUBLIC_KEY_SIZE] =
        bytes.try_into().map_err(|_| CryptoError::InvalidPublicKey(bytes.len()))?;
    Ok(PublicKey::from(bytes))
}

fn parse_nonce(bytes: &[u8]) -> Result<&XNonce, CryptoError> {
    if bytes.len() != NONCE_SIZE {
        return Err(CryptoError::InvalidNonce(bytes.len()));
    }
    Ok(XNonce::from_slice(bytes))
}

fn pair_cipher(ours: &KeyPair, theirs: &PublicKey) -> Result<XChaCha20Poly1305, CryptoError> {
    let shared = ours.secret.diffie_hellman(theirs);
    if !shared.was_contributory() {
        return Err(CryptoError::WeakKey);
    }

    let (lo, hi) = if ours.public.as_bytes() <= theirs.as_bytes() {
        (ours.public.as_bytes(), theirs.as_bytes())
    } else {
        (theirs.as_bytes(), ours.public.as_bytes())
    };

    let mut info = Vec::with_capacity(KDF_INFO.len() + 2 * PUBLIC_KEY_SIZE);
    info.extend_from_slice(KDF_INFO);
    info.extend_from_slice(lo);
    info.extend_from_slice(hi);

    let mut key = [0u8; 32];
    Hkdf::<Sha256>::new(None, shared.as_bytes())
        .expand(&info, &mut key)
        .map_err(|_| CryptoError::KeyDerivation)?;

    XChaCha20Poly1305::new_from_slice(&key).map_err(|_| CryptoError::KeyDerivation)
}

fn direction_aad(sender: &PublicKey, recipient: &PublicKey) -> [u8; 2 * PUBLIC_KEY_SIZE] {
    let mut aad = [0u8; 2 * PUBLIC_KEY_SIZE];
    aad[..PUBLIC_KEY_SIZE].copy_from_slice(sender.as_bytes());
    aad[PUBLIC_KEY_SIZE..].copy_from_slice(recipient.as_bytes());
    aad
}
