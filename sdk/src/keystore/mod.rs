//! # Keystores
//!
//! A [`KeyVault`] holds the signing keys of every local account, indexed by
//! position and sealed under a per-key passphrase. The account registry is
//! a cache on top of a vault; it never touches key bytes itself.
//!
//! Two implementations ship with the SDK:
//!
//! | Store              | Backing        | Removal policy                          |
//! |--------------------|----------------|-----------------------------------------|
//! | [`MemoryKeyStore`] | `Vec` in RAM   | later entries shift down one position   |
//! | [`SledKeyStore`]   | sled on disk   | positions are sparse and never reused   |
//!
//! Both enforce the same passphrase policy (see [`KeyStoreConfig`]) and
//! store the same [`KeyPair`] record.

pub mod export;
pub mod memory;
pub mod sled_store;

pub use export::{ExportedCrypto, ExportedKey};
pub use memory::MemoryKeyStore;
pub use sled_store::SledKeyStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::Zeroizing;

use crate::address::LedgerAddress;
use crate::config::{KeyStoreConfig, MAX_PASSPHRASE_LENGTH};
use crate::crypto::{EncryptionError, KinKeypair, KinPublicKey, SealedSecret};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised by keystores and the key records they hold.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyStoreError {
    /// The passphrase does not satisfy the store's policy.
    #[error("passphrase rejected: {0}")]
    PassphraseRejected(String),

    /// The passphrase does not open this key.
    #[error("passphrase does not unlock this key")]
    WrongPassphrase,

    #[error("no key stored at position {0}")]
    NotFound(usize),

    /// A stored record could not be decoded or does not match its public key.
    #[error("stored key is corrupt: {0}")]
    Corrupt(String),

    /// The backing store failed.
    #[error("storage error: {0}")]
    Storage(String),

    #[error("encryption error: {0}")]
    Encryption(#[from] EncryptionError),
}

impl From<sled::Error> for KeyStoreError {
    fn from(e: sled::Error) -> Self {
        KeyStoreError::Storage(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// KeyPair
// ---------------------------------------------------------------------------

/// One keystore record: a public key and its passphrase-sealed seed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPair {
    public_key: KinPublicKey,
    sealed_seed: SealedSecret,
    created_at: DateTime<Utc>,
}

impl KeyPair {
    /// Generates a fresh key and seals it under `passphrase`.
    pub fn generate(passphrase: &str, config: &KeyStoreConfig) -> Result<Self, KeyStoreError> {
        check_passphrase(passphrase, config)?;
        Self::seal(&KinKeypair::generate(), passphrase, config.kdf_iterations)
    }

    /// Seals an existing keypair under `passphrase`.
    pub fn seal(
        keypair: &KinKeypair,
        passphrase: &str,
        iterations: u32,
    ) -> Result<Self, KeyStoreError> {
        let seed = Zeroizing::new(keypair.seed());
        let sealed_seed = SealedSecret::seal(&seed[..], passphrase, iterations)?;
        Ok(Self {
            public_key: keypair.public_key(),
            sealed_seed,
            created_at: Utc::now(),
        })
    }

    pub fn public_key(&self) -> &KinPublicKey {
        &self.public_key
    }

    /// The ledger address of this key.
    pub fn address(&self) -> LedgerAddress {
        LedgerAddress::from_public_key(&self.public_key)
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Opens the sealed seed and rebuilds the signing keypair.
    ///
    /// Fails with [`KeyStoreError::WrongPassphrase`] if `passphrase` does not
    /// open the seed, and with [`KeyStoreError::Corrupt`] if the opened seed
    /// belongs to a different public key.
    pub fn unlock(&self, passphrase: &str) -> Result<KinKeypair, KeyStoreError> {
        let seed = self
            .sealed_seed
            .open(passphrase)
            .map_err(|_| KeyStoreError::WrongPassphrase)?;
        let keypair = KinKeypair::from_seed_slice(&seed)
            .map_err(|e| KeyStoreError::Corrupt(e.to_string()))?;
        if keypair.public_key() != self.public_key {
            return Err(KeyStoreError::Corrupt(
                "sealed seed does not match public key".into(),
            ));
        }
        Ok(keypair)
    }

    /// Returns `true` if `passphrase` unlocks this key.
    pub fn verify(&self, passphrase: &str) -> bool {
        self.unlock(passphrase).is_ok()
    }

    /// Re-encrypts the seed under `export_passphrase` for backup.
    pub fn export(
        &self,
        passphrase: &str,
        export_passphrase: &str,
    ) -> Result<ExportedKey, KeyStoreError> {
        let keypair = self.unlock(passphrase)?;
        ExportedKey::seal(&keypair, export_passphrase, self.sealed_seed.iterations)
    }
}

/// Applies the passphrase policy of `config`.
pub fn check_passphrase(passphrase: &str, config: &KeyStoreConfig) -> Result<(), KeyStoreError> {
    let len = passphrase.chars().count();
    if len < config.min_passphrase_len {
        return Err(KeyStoreError::PassphraseRejected(format!(
            "must be at least {} characters",
            config.min_passphrase_len
        )));
    }
    if len > MAX_PASSPHRASE_LENGTH {
        return Err(KeyStoreError::PassphraseRejected(format!(
            "must be at most {} characters",
            MAX_PASSPHRASE_LENGTH
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// KeyVault
// ---------------------------------------------------------------------------

/// Position-indexed, passphrase-guarded storage of signing keys.
///
/// Implementations must be safe to share between clients; every method
/// takes `&self` and does its own locking.
pub trait KeyVault: Send + Sync {
    /// Number of stored keys.
    fn count(&self) -> usize;

    /// The record at `index`, if one exists.
    fn entry(&self, index: usize) -> Option<KeyPair>;

    /// Occupied positions in ascending order.
    fn positions(&self) -> Vec<usize>;

    /// Generates and stores a new key. Returns its position and record.
    fn import_new_key(&self, passphrase: &str) -> Result<(usize, KeyPair), KeyStoreError>;

    /// Removes the record at `index`. Fails if there is none.
    fn remove(&self, index: usize) -> Result<(), KeyStoreError>;

    /// Returns `true` if a record exists at `index` and `passphrase` opens it.
    fn verify(&self, index: usize, passphrase: &str) -> bool {
        self.entry(index)
            .map(|kp| kp.verify(passphrase))
            .unwrap_or(false)
    }

    /// Removes every record.
    fn remove_all(&self) -> Result<(), KeyStoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast() -> KeyStoreConfig {
        KeyStoreConfig::insecure_fast()
    }

    #[test]
    fn generated_key_unlocks_with_its_passphrase() {
        let kp = KeyPair::generate("p1", &fast()).unwrap();
        let unlocked = kp.unlock("p1").unwrap();
        assert_eq!(&unlocked.public_key(), kp.public_key());
        assert_eq!(unlocked.address(), kp.address());
    }

    #[test]
    fn wrong_passphrase_is_reported() {
        let kp = KeyPair::generate("p1", &fast()).unwrap();
        assert_eq!(kp.unlock("p2").unwrap_err(), KeyStoreError::WrongPassphrase);
        assert!(!kp.verify("p2"));
        assert!(kp.verify("p1"));
    }

    #[test]
    fn empty_passphrase_rejected_by_default() {
        let err = KeyPair::generate("", &fast()).unwrap_err();
        assert!(matches!(err, KeyStoreError::PassphraseRejected(_)));
    }

    #[test]
    fn overlong_passphrase_rejected() {
        let long = "x".repeat(MAX_PASSPHRASE_LENGTH + 1);
        assert!(check_passphrase(&long, &fast()).is_err());
        assert!(check_passphrase(&long[1..], &fast()).is_ok());
    }

    #[test]
    fn minimum_length_is_configurable() {
        let cfg = KeyStoreConfig {
            min_passphrase_len: 8,
            ..fast()
        };
        assert!(check_passphrase("short", &cfg).is_err());
        assert!(check_passphrase("long enough", &cfg).is_ok());
    }

    #[test]
    fn mismatched_seed_is_corrupt() {
        let a = KeyPair::generate("p", &fast()).unwrap();
        let b = KeyPair::generate("p", &fast()).unwrap();
        let franken = KeyPair {
            public_key: a.public_key.clone(),
            sealed_seed: b.sealed_seed.clone(),
            created_at: a.created_at,
        };
        assert!(matches!(
            franken.unlock("p").unwrap_err(),
            KeyStoreError::Corrupt(_)
        ));
    }

    #[test]
    fn record_survives_bincode() {
        let kp = KeyPair::generate("p", &fast()).unwrap();
        let bytes = bincode::serialize(&kp).unwrap();
        let back: KeyPair = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, kp);
        assert!(back.verify("p"));
    }
}
