//! # Signing Keys
//!
//! Ed25519 keypairs for Kin accounts. A keypair only ever exists in
//! plaintext between a successful keystore unlock and the end of the
//! operation that needed it; at rest it is sealed (see
//! [`encryption`](super::encryption)).
//!
//! Key bytes are never logged and never appear in `Debug` output.

use ed25519_dalek::{Signature as DalekSignature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use thiserror::Error;
use zeroize::Zeroize;

use crate::address::LedgerAddress;

/// Errors from raw key handling. Vague on purpose: details about why key
/// material is invalid are of no use to a legitimate caller.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("invalid secret key bytes")]
    InvalidSecretKey,

    #[error("invalid public key bytes: not a valid Ed25519 point")]
    InvalidPublicKey,
}

/// An Ed25519 signing identity.
///
/// Deliberately not `Serialize`: the only way to persist one is through a
/// keystore, which seals the seed under a passphrase first.
pub struct KinKeypair {
    signing_key: SigningKey,
}

/// The public half of a [`KinKeypair`].
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KinPublicKey {
    bytes: [u8; 32],
}

/// A detached Ed25519 signature. Always 64 bytes when produced by this crate.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KinSignature {
    #[serde(with = "hex_bytes")]
    bytes: Vec<u8>,
}

impl KinKeypair {
    /// Generates a fresh keypair from the OS RNG.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Builds a keypair from a 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Builds a keypair from a seed slice, checking its length.
    pub fn from_seed_slice(seed: &[u8]) -> Result<Self, KeyError> {
        let mut arr: [u8; 32] = seed.try_into().map_err(|_| KeyError::InvalidSecretKey)?;
        let kp = Self::from_seed(&arr);
        arr.zeroize();
        Ok(kp)
    }

    /// Returns the raw 32-byte seed. Callers must zeroize their copy.
    pub fn seed(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    pub fn public_key(&self) -> KinPublicKey {
        KinPublicKey {
            bytes: self.signing_key.verifying_key().to_bytes(),
        }
    }

    /// The ledger address controlled by this keypair.
    pub fn address(&self) -> LedgerAddress {
        LedgerAddress::from_public_key(&self.public_key())
    }

    pub fn sign(&self, message: &[u8]) -> KinSignature {
        KinSignature {
            bytes: self.signing_key.sign(message).to_bytes().to_vec(),
        }
    }

    pub fn verify(&self, message: &[u8], signature: &KinSignature) -> bool {
        self.public_key().verify(message, signature)
    }
}

impl Clone for KinKeypair {
    fn clone(&self) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(&self.signing_key.to_bytes()),
        }
    }
}

impl fmt::Debug for KinKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KinKeypair(pub={})", self.address())
    }
}

// ---------------------------------------------------------------------------
// KinPublicKey
// ---------------------------------------------------------------------------

impl KinPublicKey {
    /// Wraps raw bytes without validating them as a curve point.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self { bytes }
    }

    /// Validates length and that the bytes decode to an Ed25519 point.
    pub fn try_from_slice(slice: &[u8]) -> Result<Self, KeyError> {
        let bytes: [u8; 32] = slice.try_into().map_err(|_| KeyError::InvalidPublicKey)?;
        VerifyingKey::from_bytes(&bytes).map_err(|_| KeyError::InvalidPublicKey)?;
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }

    /// Returns `true` if `signature` is a valid signature of `message`.
    pub fn verify(&self, message: &[u8], signature: &KinSignature) -> bool {
        let Ok(verifying_key) = VerifyingKey::from_bytes(&self.bytes) else {
            return false;
        };
        let Ok(sig_bytes) = <[u8; 64]>::try_from(signature.bytes.as_slice()) else {
            return false;
        };
        verifying_key
            .verify(message, &DalekSignature::from_bytes(&sig_bytes))
            .is_ok()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }
}

impl Hash for KinPublicKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bytes.hash(state);
    }
}

impl fmt::Debug for KinPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KinPublicKey({})", &self.to_hex()[..16])
    }
}

// ---------------------------------------------------------------------------
// KinSignature
// ---------------------------------------------------------------------------

impl KinSignature {
    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        Self {
            bytes: bytes.to_vec(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }
}

impl fmt::Debug for KinSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex_str = self.to_hex();
        if hex_str.len() >= 128 {
            write!(f, "KinSignature({}...{})", &hex_str[..8], &hex_str[120..])
        } else {
            write!(f, "KinSignature({})", hex_str)
        }
    }
}

/// Serde helper: signatures travel as hex strings in JSON envelopes.
mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}
