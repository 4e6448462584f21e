//! Portable key backups.
//!
//! An [`ExportedKey`] is a self-describing JSON document holding one seed
//! re-encrypted under an export passphrase chosen by the user:
//!
//! ```json
//! {
//!   "id": "5f0c...",
//!   "address": "GB3K...",
//!   "crypto": {
//!     "cipher": "aes-256-gcm",
//!     "ciphertext": "<hex nonce||ct||tag>",
//!     "kdf": "pbkdf2-hmac-sha256",
//!     "salt": "<hex>",
//!     "iterations": 100000
//!   },
//!   "created_at": "2026-01-01T00:00:00Z"
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use zeroize::Zeroizing;

use super::KeyStoreError;
use crate::address::LedgerAddress;
use crate::config::{EXPORT_CIPHER, EXPORT_KDF, KDF_SALT_LENGTH};
use crate::crypto::{KinKeypair, SealedSecret};

/// Cipher parameters of an exported key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportedCrypto {
    pub cipher: String,
    pub ciphertext: String,
    pub kdf: String,
    pub salt: String,
    pub iterations: u32,
}

/// A key backup, encrypted under an export passphrase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportedKey {
    pub id: Uuid,
    pub address: LedgerAddress,
    pub crypto: ExportedCrypto,
    pub created_at: DateTime<Utc>,
}

impl ExportedKey {
    /// Seals `keypair` under `export_passphrase`.
    pub fn seal(
        keypair: &KinKeypair,
        export_passphrase: &str,
        iterations: u32,
    ) -> Result<Self, KeyStoreError> {
        let seed = Zeroizing::new(keypair.seed());
        let sealed = SealedSecret::seal(&seed[..], export_passphrase, iterations)?;

        Ok(Self {
            id: Uuid::new_v4(),
            address: keypair.address(),
            crypto: ExportedCrypto {
                cipher: EXPORT_CIPHER.to_string(),
                ciphertext: hex::encode(&sealed.ciphertext),
                kdf: EXPORT_KDF.to_string(),
                salt: hex::encode(sealed.salt),
                iterations: sealed.iterations,
            },
            created_at: Utc::now(),
        })
    }

    /// Decrypts the backup and returns the signing keypair.
    pub fn unlock(&self, export_passphrase: &str) -> Result<KinKeypair, KeyStoreError> {
        if self.crypto.cipher != EXPORT_CIPHER || self.crypto.kdf != EXPORT_KDF {
            return Err(KeyStoreError::Corrupt(format!(
                "unsupported cipher suite {}/{}",
                self.crypto.cipher, self.crypto.kdf
            )));
        }

        let ciphertext = hex::decode(&self.crypto.ciphertext)
            .map_err(|e| KeyStoreError::Corrupt(format!("ciphertext: {e}")))?;
        let salt: [u8; KDF_SALT_LENGTH] = hex::decode(&self.crypto.salt)
            .ok()
            .and_then(|s| s.try_into().ok())
            .ok_or_else(|| KeyStoreError::Corrupt("salt".into()))?;

        let sealed = SealedSecret {
            ciphertext,
            salt,
            iterations: self.crypto.iterations,
        };
        let seed = sealed
            .open(export_passphrase)
            .map_err(|_| KeyStoreError::WrongPassphrase)?;
        let keypair = KinKeypair::from_seed_slice(&seed)
            .map_err(|e| KeyStoreError::Corrupt(e.to_string()))?;

        if keypair.address() != self.address {
            return Err(KeyStoreError::Corrupt(
                "decrypted key does not match address".into(),
            ));
        }
        Ok(keypair)
    }

    pub fn to_json(&self) -> Result<String, KeyStoreError> {
        serde_json::to_string_pretty(self).map_err(|e| KeyStoreError::Corrupt(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, KeyStoreError> {
        serde_json::from_str(json).map_err(|e| KeyStoreError::Corrupt(e.to_string()))
    }
}
