//! # Ledger Addresses & Assets
//!
//! A [`LedgerAddress`] is the public account identifier used on the ledger:
//! an Ed25519 public key in StrKey form.
//!
//! ```text
//! version byte (6 << 3) || public_key (32 bytes) || CRC16-XModem (2 bytes, LE)
//!     -> base32 (RFC 4648, no padding) -> GAQ4HYZJ5PSY...   (56 chars)
//! ```
//!
//! The checksum catches mistyped or truncated addresses before anything is
//! sent to the network. An [`Asset`] names a token by code and issuer.

use crc::{Crc, CRC_16_XMODEM};
use data_encoding::BASE32_NOPAD;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::config::KIN_ASSET_CODE;
use crate::crypto::keys::KinPublicKey;

/// StrKey version byte for account ids ("G...").
const ACCOUNT_ID_VERSION: u8 = 6 << 3;

/// Length of an encoded account id.
const ENCODED_LENGTH: usize = 56;

/// Length of the decoded payload: version + key + checksum.
const DECODED_LENGTH: usize = 35;

const CHECKSUM: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Reasons an address string can be rejected.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("invalid address length: expected {ENCODED_LENGTH} characters, got {0}")]
    InvalidLength(usize),

    #[error("address contains characters outside the base32 alphabet")]
    InvalidEncoding,

    #[error("address has version byte {0:#04x}, expected an account id")]
    InvalidVersion(u8),

    #[error("address checksum mismatch")]
    ChecksumMismatch,
}

// ---------------------------------------------------------------------------
// LedgerAddress
// ---------------------------------------------------------------------------

/// A validated ledger account address.
///
/// # Examples
///
/// ```
/// use kin_sdk::address::LedgerAddress;
/// use kin_sdk::crypto::KinKeypair;
///
/// let kp = KinKeypair::generate();
/// let address = kp.address();
/// assert!(address.as_str().starts_with('G'));
///
/// let parsed: LedgerAddress = address.as_str().parse().unwrap();
/// assert_eq!(parsed, address);
/// ```
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LedgerAddress {
    encoded: String,
    key: [u8; 32],
}

impl LedgerAddress {
    /// Encodes a public key as an account address.
    pub fn from_public_key(pk: &KinPublicKey) -> Self {
        let mut payload = Vec::with_capacity(DECODED_LENGTH);
        payload.push(ACCOUNT_ID_VERSION);
        payload.extend_from_slice(pk.as_bytes());
        let crc = CHECKSUM.checksum(&payload);
        payload.extend_from_slice(&crc.to_le_bytes());

        Self {
            encoded: BASE32_NOPAD.encode(&payload),
            key: *pk.as_bytes(),
        }
    }

    /// Parses and validates an encoded address.
    pub fn parse(s: &str) -> Result<Self, AddressError> {
        if s.len() != ENCODED_LENGTH {
            return Err(AddressError::InvalidLength(s.len()));
        }
        let payload = BASE32_NOPAD
            .decode(s.as_bytes())
            .map_err(|_| AddressError::InvalidEncoding)?;
        if payload.len() != DECODED_LENGTH {
            return Err(AddressError::InvalidEncoding);
        }
        if payload[0] != ACCOUNT_ID_VERSION {
            return Err(AddressError::InvalidVersion(payload[0]));
        }

        let (body, checksum) = payload.split_at(DECODED_LENGTH - 2);
        if CHECKSUM.checksum(body).to_le_bytes() != checksum {
            return Err(AddressError::ChecksumMismatch);
        }

        let mut key = [0u8; 32];
        key.copy_from_slice(&body[1..]);
        Ok(Self {
            encoded: s.to_string(),
            key,
        })
    }

    /// The public key this address encodes.
    pub fn public_key(&self) -> KinPublicKey {
        KinPublicKey::from_bytes(self.key)
    }

    pub fn as_str(&self) -> &str {
        &self.encoded
    }
}

impl FromStr for LedgerAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for LedgerAddress {
    type Error = AddressError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<LedgerAddress> for String {
    fn from(addr: LedgerAddress) -> Self {
        addr.encoded
    }
}

impl fmt::Display for LedgerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encoded)
    }
}

impl fmt::Debug for LedgerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LedgerAddress({})", self.encoded)
    }
}

// ---------------------------------------------------------------------------
// Asset
// ---------------------------------------------------------------------------

/// A token issued on the ledger, identified by code and issuer.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Asset {
    pub code: String,
    pub issuer: LedgerAddress,
}

impl Asset {
    pub fn new(code: impl Into<String>, issuer: LedgerAddress) -> Self {
        Self {
            code: code.into(),
            issuer,
        }
    }

    /// The Kin asset issued by `issuer`.
    pub fn kin(issuer: LedgerAddress) -> Self {
        Self::new(KIN_ASSET_CODE, issuer)
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.code, self.issuer)
    }
}

impl fmt::Debug for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Asset({})", self)
    }
}
