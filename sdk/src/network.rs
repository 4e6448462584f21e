//! # Network Identity
//!
//! [`NetworkId`] selects which ledger network a client talks to. Each
//! network is identified by the Kin issuer account and the network
//! passphrase that gets mixed into every transaction hash, so a transaction
//! signed for one network can never be replayed on another.

use std::fmt;

use crate::address::{Asset, LedgerAddress};
use crate::config::{MAINNET_ISSUER, MAINNET_PASSPHRASE, TESTNET_ISSUER, TESTNET_PASSPHRASE};
use crate::crypto::sha256;

/// The ledger network a client is bound to.
///
/// Equality is intentionally narrow: `MainNet == MainNet` and
/// `TestNet == TestNet`, but a `Custom` network never compares equal to
/// anything, including an identical `Custom`. Comparisons are only used to
/// gate test-network conveniences such as the faucet, never to key state.
#[derive(Clone)]
pub enum NetworkId {
    /// The production network.
    MainNet,
    /// The public test network.
    TestNet,
    /// Any other network, described by its issuer and passphrase.
    Custom {
        issuer: LedgerAddress,
        network_passphrase: String,
    },
}

impl NetworkId {
    /// Convenience constructor for a custom network.
    pub fn custom(issuer: LedgerAddress, network_passphrase: impl Into<String>) -> Self {
        NetworkId::Custom {
            issuer,
            network_passphrase: network_passphrase.into(),
        }
    }

    /// The account that issues Kin on this network.
    pub fn issuer(&self) -> LedgerAddress {
        match self {
            NetworkId::MainNet => {
                LedgerAddress::parse(MAINNET_ISSUER).expect("static issuer is valid")
            }
            NetworkId::TestNet => {
                LedgerAddress::parse(TESTNET_ISSUER).expect("static issuer is valid")
            }
            NetworkId::Custom { issuer, .. } => issuer.clone(),
        }
    }

    /// The passphrase that scopes signatures to this network.
    pub fn network_passphrase(&self) -> &str {
        match self {
            NetworkId::MainNet => MAINNET_PASSPHRASE,
            NetworkId::TestNet => TESTNET_PASSPHRASE,
            NetworkId::Custom {
                network_passphrase, ..
            } => network_passphrase,
        }
    }

    /// SHA-256 of the network passphrase; prefixed to every transaction hash.
    pub fn network_hash(&self) -> [u8; 32] {
        sha256(self.network_passphrase().as_bytes())
    }

    /// The Kin asset on this network.
    pub fn asset(&self) -> Asset {
        Asset::kin(self.issuer())
    }

    /// Parses the names accepted on the command line: `main`, `test`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "main" | "mainnet" => Some(NetworkId::MainNet),
            "test" | "testnet" => Some(NetworkId::TestNet),
            _ => None,
        }
    }
}

impl PartialEq for NetworkId {
    fn eq(&self, other: &Self) -> bool {
        matches!(
            (self, other),
            (NetworkId::MainNet, NetworkId::MainNet) | (NetworkId::TestNet, NetworkId::TestNet)
        )
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkId::MainNet => f.write_str("main"),
            NetworkId::TestNet => f.write_str("test"),
            NetworkId::Custom { .. } => f.write_str("custom network"),
        }
    }
}

impl fmt::Debug for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkId::Custom {
                issuer,
                network_passphrase,
            } => f
                .debug_struct("Custom")
                .field("issuer", issuer)
                .field("network_passphrase", network_passphrase)
                .finish(),
            other => write!(f, "{}", other),
        }
    }
}
