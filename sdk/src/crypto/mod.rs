//! # Cryptographic Primitives
//!
//! Thin, typed wrappers around audited implementations:
//!
//! - **Ed25519** (`ed25519-dalek`) for account keys and transaction signatures.
//! - **AES-256-GCM** (`aes-gcm`) for sealing seeds at rest.
//! - **PBKDF2-HMAC-SHA256** (`pbkdf2`) for stretching passphrases.
//! - **SHA-256** (`sha2`) for transaction hashes.

pub mod encryption;
pub mod keys;

pub use encryption::{EncryptionError, SealedSecret};
pub use keys::{KeyError, KinKeypair, KinPublicKey, KinSignature};

use sha2::{Digest, Sha256};

/// SHA-256 digest of `data`.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}
