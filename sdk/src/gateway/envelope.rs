//! Signed transaction envelopes.
//!
//! A [`TransactionBody`] lists the operations one source account wants to
//! apply, together with its next sequence number and the fee it offers.
//! The signature covers the transaction hash:
//!
//! ```text
//! hash = SHA-256( SHA-256(network_passphrase) || bincode(body) )
//! ```
//!
//! Mixing in the network passphrase makes a signature valid on exactly one
//! network. The hex form of the same hash is the [`TransactionId`].

use serde::{Deserialize, Serialize};

use super::{GatewayError, TransactionId};
use crate::address::{Asset, LedgerAddress};
use crate::config::BASE_FEE_STROOPS;
use crate::crypto::{sha256, KinKeypair, KinSignature};
use crate::network::NetworkId;

/// A single ledger operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Opens a trustline so the source account can hold `asset`.
    ChangeTrust { asset: Asset },
    /// Moves `quarks` of `asset` from the source to `destination`.
    Payment {
        destination: LedgerAddress,
        asset: Asset,
        quarks: u64,
    },
}

/// The signed part of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionBody {
    pub source: LedgerAddress,
    pub sequence: u64,
    /// Total fee offered, in native units.
    pub fee: u64,
    pub operations: Vec<Operation>,
    pub memo: Option<String>,
}

impl TransactionBody {
    /// A body paying the base fee for each operation.
    pub fn new(
        source: LedgerAddress,
        sequence: u64,
        operations: Vec<Operation>,
        memo: Option<String>,
    ) -> Self {
        let fee = BASE_FEE_STROOPS * operations.len() as u64;
        Self {
            source,
            sequence,
            fee,
            operations,
            memo,
        }
    }

    /// The network-scoped hash that gets signed.
    pub fn hash(&self, network: &NetworkId) -> Result<[u8; 32], GatewayError> {
        let encoded = bincode::serialize(self).map_err(|e| GatewayError::Codec(e.to_string()))?;
        let mut preimage = Vec::with_capacity(32 + encoded.len());
        preimage.extend_from_slice(&network.network_hash());
        preimage.extend_from_slice(&encoded);
        Ok(sha256(&preimage))
    }

    /// Signs the body for `network`.
    pub fn sign(
        self,
        signer: &KinKeypair,
        network: &NetworkId,
    ) -> Result<SignedEnvelope, GatewayError> {
        let hash = self.hash(network)?;
        Ok(SignedEnvelope {
            body: self,
            signature: signer.sign(&hash),
        })
    }
}

/// A transaction body plus the source account's signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedEnvelope {
    pub body: TransactionBody,
    pub signature: KinSignature,
}

impl SignedEnvelope {
    pub fn id(&self, network: &NetworkId) -> Result<TransactionId, GatewayError> {
        Ok(TransactionId::from_hash(self.body.hash(network)?))
    }

    /// Checks the signature against the source account's key.
    pub fn verify(&self, network: &NetworkId) -> bool {
        match self.body.hash(network) {
            Ok(hash) => self.body.source.public_key().verify(&hash, &self.signature),
            Err(_) => false,
        }
    }
}
