// Copyright (c) 2026 Kin SDK Contributors. MIT License.
// See LICENSE for details.

//! # Kin SDK — Client-Side Account Manager
//!
//! Create and store Kin accounts locally, and use them on any ledger
//! network (main, test, or one of your own) through one API.
//!
//! ## Architecture
//!
//! The crate is split along the seams between what we own and what we
//! talk to:
//!
//! - **client** — [`KinClient`], the façade. One endpoint, one network.
//! - **accounts** — [`KinAccounts`], the index-stable registry of handles.
//! - **account** — [`KinAccount`], one signing identity and its lifecycle.
//! - **keystore** — where keys live: [`MemoryKeyStore`], [`SledKeyStore`].
//! - **gateway** — how we reach the ledger: [`RpcGateway`], or the
//!   in-process [`LocalLedger`] for tests and demos.
//! - **network** — [`NetworkId`]: main, test, or custom.
//! - **crypto**, **address**, **amount** — the value types underneath.
//! - **config** — constants and keystore tunables.
//!
//! ## Calling conventions
//!
//! Every operation that touches the network is an `async fn`, with a
//! `_blocking` twin for synchronous callers and a `_with_callback` twin that
//! returns immediately and reports exactly once.
//!
//! ## Ground rules
//!
//! 1. A deleted account stays deleted. Every call on its handle fails.
//! 2. Index `i` means the same account for the life of the client.
//! 3. Collaborator errors are wrapped in [`KinError`] at the account
//!    boundary; nothing leaks through raw.
//! 4. Passphrases and key bytes never reach a log line.

pub mod account;
pub mod accounts;
pub mod address;
pub mod amount;
pub mod client;
pub mod config;
pub mod crypto;
pub mod error;
pub mod gateway;
pub mod keystore;
pub mod network;
pub mod runtime;

pub use account::KinAccount;
pub use accounts::KinAccounts;
pub use address::{AddressError, Asset, LedgerAddress};
pub use amount::Balance;
pub use client::{KinClient, KinClientBuilder};
pub use config::KeyStoreConfig;
pub use error::{ClientError, FailureCause, KinError};
pub use gateway::{
    GatewayError, LedgerGateway, LocalLedger, PaymentError, PaymentRequest, RpcGateway,
    TransactionError, TransactionId,
};
pub use keystore::{ExportedKey, KeyPair, KeyStoreError, KeyVault, MemoryKeyStore, SledKeyStore};
pub use network::NetworkId;
