//! # Passphrase Sealing
//!
//! AES-256-GCM with a key stretched from the passphrase by
//! PBKDF2-HMAC-SHA256. Keystores use this to keep seeds encrypted at rest
//! and to re-encrypt them for export.
//!
//! ## Wire format
//!
//! [`seal`] returns `nonce || ciphertext` as one buffer: the first 12 bytes
//! are the random nonce, the rest is the ciphertext with the 16-byte GCM tag
//! appended. [`open`] expects the same layout. The salt and iteration count
//! travel separately (see [`SealedSecret`]).

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::config::{AES_KEY_LENGTH, AES_NONCE_LENGTH, KDF_SALT_LENGTH};

/// Sealing errors. "Wrong passphrase" and "corrupted ciphertext" are
/// indistinguishable on purpose.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncryptionError {
    #[error("encryption failed")]
    EncryptFailed,

    #[error("decryption failed -- wrong passphrase or corrupted ciphertext")]
    DecryptFailed,

    #[error("ciphertext too short: must be at least {AES_NONCE_LENGTH} bytes")]
    CiphertextTooShort,
}

/// A secret sealed under a passphrase, with everything needed to open it
/// again except the passphrase itself.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedSecret {
    /// `nonce || ciphertext || tag`.
    pub ciphertext: Vec<u8>,
    /// PBKDF2 salt.
    pub salt: [u8; KDF_SALT_LENGTH],
    /// PBKDF2 iteration count used when sealing.
    pub iterations: u32,
}

impl std::fmt::Debug for SealedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SealedSecret")
            .field("len", &self.ciphertext.len())
            .field("iterations", &self.iterations)
            .finish()
    }
}

impl SealedSecret {
    /// Seals `plaintext` under `passphrase` with a fresh random salt.
    pub fn seal(
        plaintext: &[u8],
        passphrase: &str,
        iterations: u32,
    ) -> Result<Self, EncryptionError> {
        let mut salt = [0u8; KDF_SALT_LENGTH];
        rand::rngs::OsRng.fill_bytes(&mut salt);

        let key = derive_key(passphrase, &salt, iterations);
        let ciphertext = seal(&key, plaintext)?;

        Ok(Self {
            ciphertext,
            salt,
            iterations,
        })
    }

    /// Opens the secret. The returned buffer is wiped on drop.
    pub fn open(&self, passphrase: &str) -> Result<Zeroizing<Vec<u8>>, EncryptionError> {
        let key = derive_key(passphrase, &self.salt, self.iterations);
        open(&key, &self.ciphertext).map(Zeroizing::new)
    }
}

/// Stretches a passphrase into an AES-256 key.
pub fn derive_key(
    passphrase: &str,
    salt: &[u8],
    iterations: u32,
) -> Zeroizing<[u8; AES_KEY_LENGTH]> {
    let mut key = Zeroizing::new([0u8; AES_KEY_LENGTH]);
    pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), salt, iterations.max(1), &mut key[..]);
    key
}

/// Encrypts with a random nonce and returns `nonce || ciphertext`.
pub fn seal(key: &[u8; AES_KEY_LENGTH], plaintext: &[u8]) -> Result<Vec<u8>, EncryptionError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| EncryptionError::EncryptFailed)?;

    let mut nonce_bytes = [0u8; AES_NONCE_LENGTH];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| EncryptionError::EncryptFailed)?;

    let mut out = Vec::with_capacity(AES_NONCE_LENGTH + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypts data produced by [`seal`].
pub fn open(key: &[u8; AES_KEY_LENGTH], data: &[u8]) -> Result<Vec<u8>, EncryptionError> {
    if data.len() < AES_NONCE_LENGTH {
        return Err(EncryptionError::CiphertextTooShort);
    }

    let (nonce_bytes, ciphertext) = data.split_at(AES_NONCE_LENGTH);
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| EncryptionError::DecryptFailed)?;

    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| EncryptionError::DecryptFailed)
}
