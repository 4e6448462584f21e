//! # Ledger Gateways
//!
//! A [`LedgerGateway`] is the SDK's only path to the ledger network. It is
//! bound to one endpoint and one [`NetworkId`](crate::network::NetworkId)
//! and does three things: read balances, fund and activate accounts, and
//! submit payments signed by a local key.
//!
//! Two gateways ship with the SDK:
//!
//! - [`LocalLedger`] — an in-process reference ledger. Implements the trait
//!   directly, so tests and demos need no network.
//! - [`RpcGateway`] — talks JSON-RPC 2.0 over HTTP to a ledger server such
//!   as the one built by [`rpc_router`].
//!
//! Ledger rejections use the ledger's own result codes ([`PaymentError`],
//! [`TransactionError`]) so callers can tell "underfunded" from "no
//! destination" without parsing strings.

pub mod envelope;
pub mod local;
pub mod rpc;
pub mod server;

pub use envelope::{Operation, SignedEnvelope, TransactionBody};
pub use local::LocalLedger;
pub use rpc::{AccountInfo, RpcGateway};
pub use server::rpc_router;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::address::{Asset, LedgerAddress};
use crate::crypto::KinKeypair;

// ---------------------------------------------------------------------------
// Ledger result codes
// ---------------------------------------------------------------------------

/// Why the ledger rejected a payment operation.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentError {
    /// Bad amount or asset.
    #[error("malformed payment")]
    Malformed,

    /// The source does not hold enough of the asset.
    #[error("source account is underfunded")]
    Underfunded,

    #[error("source account has no trustline for the asset")]
    SrcNoTrust,

    #[error("destination account does not exist")]
    NoDestination,

    #[error("destination account has no trustline for the asset")]
    NoTrust,

    /// Crediting the destination would exceed its trustline limit.
    #[error("destination trustline is full")]
    LineFull,

    #[error("asset issuer does not exist")]
    NoIssuer,
}

/// Why the ledger rejected a transaction as a whole.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionError {
    #[error("source account does not exist")]
    NoAccount,

    /// The signature does not verify against the source account.
    #[error("bad authorization")]
    BadAuth,

    #[error("bad sequence number: expected {expected}, got {got}")]
    BadSequence { expected: u64, got: u64 },

    #[error("fee too low: minimum {minimum}")]
    InsufficientFee { minimum: u64 },

    /// Not enough native balance left to pay the fee.
    #[error("insufficient native balance for fee")]
    InsufficientBalance,

    #[error("malformed transaction: {0}")]
    Malformed(String),
}

// ---------------------------------------------------------------------------
// GatewayError
// ---------------------------------------------------------------------------

/// Everything that can go wrong between the SDK and the ledger.
///
/// The ledger-side variants travel over JSON-RPC unchanged (as the `data`
/// of an error response), so an [`RpcGateway`] reports exactly what a
/// [`LocalLedger`] would.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum GatewayError {
    #[error("account not found: {0}")]
    AccountNotFound(LedgerAddress),

    /// The account exists but cannot hold the asset yet.
    #[error("account has no trustline for {0}")]
    MissingTrustline(Asset),

    #[error("payment rejected: {0}")]
    Payment(PaymentError),

    #[error("transaction rejected: {0}")]
    Transaction(TransactionError),

    /// The test faucet declined the request.
    #[error("faucet refused: {0}")]
    FaucetRefused(String),

    #[error("endpoint serves network {actual:?}, expected {expected:?}")]
    NetworkMismatch { expected: String, actual: String },

    /// The endpoint could not be reached or returned a non-JSON reply.
    #[error("transport error: {0}")]
    Transport(String),

    /// A JSON-RPC error that is not a ledger rejection.
    #[error("rpc error {code}: {message}")]
    Rpc { code: i32, message: String },

    #[error("codec error: {0}")]
    Codec(String),
}

impl GatewayError {
    /// The payment result code, if this is a payment rejection.
    pub fn payment_error(&self) -> Option<PaymentError> {
        match self {
            GatewayError::Payment(code) => Some(*code),
            _ => None,
        }
    }
}

impl From<PaymentError> for GatewayError {
    fn from(e: PaymentError) -> Self {
        GatewayError::Payment(e)
    }
}

impl From<TransactionError> for GatewayError {
    fn from(e: TransactionError) -> Self {
        GatewayError::Transaction(e)
    }
}

// ---------------------------------------------------------------------------
// Requests & receipts
// ---------------------------------------------------------------------------

/// Hex-encoded transaction hash returned for every accepted transaction.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(String);

impl TransactionId {
    pub fn from_hash(hash: [u8; 32]) -> Self {
        Self(hex::encode(hash))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TransactionId({})", self.0)
    }
}

/// A payment of `quarks` of `asset` to `destination`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub destination: LedgerAddress,
    pub asset: Asset,
    pub quarks: u64,
    pub memo: Option<String>,
}

// ---------------------------------------------------------------------------
// LedgerGateway
// ---------------------------------------------------------------------------

/// Network-facing collaborator bound to one ledger endpoint.
#[async_trait]
pub trait LedgerGateway: Send + Sync {
    /// Balance of `asset` held by `address`, in quarks.
    async fn balance(&self, address: &LedgerAddress, asset: &Asset) -> Result<u64, GatewayError>;

    /// Creates the signer's account if needed and opens a trustline for
    /// `asset`. Returns the id of the trustline transaction.
    async fn fund_and_activate(
        &self,
        signer: &KinKeypair,
        asset: &Asset,
    ) -> Result<TransactionId, GatewayError>;

    /// Signs and submits a payment from the signer's account.
    async fn submit_payment(
        &self,
        signer: &KinKeypair,
        request: PaymentRequest,
    ) -> Result<TransactionId, GatewayError>;
}
