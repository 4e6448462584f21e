//! # SDK Configuration & Constants
//!
//! Every magic number the SDK relies on lives here: the asset code, the
//! quark scale, the well-known network values, keystore KDF defaults and
//! the limits the ledger enforces on transactions.

// ---------------------------------------------------------------------------
// Asset
// ---------------------------------------------------------------------------

/// Asset code of the Kin token on the ledger.
pub const KIN_ASSET_CODE: &str = "KIN";

/// Number of fractional digits a Kin amount can carry.
pub const KIN_DECIMALS: u32 = 7;

/// Quarks (smallest unit) per Kin. Same scale as the ledger's native asset.
pub const QUARKS_PER_KIN: u64 = 10_000_000;

// ---------------------------------------------------------------------------
// Well-known networks
// ---------------------------------------------------------------------------

/// Kin issuer on the production network.
pub const MAINNET_ISSUER: &str = "GAQ4HYZJ5PSYBMHXAX75DKN4YGHFIEGZYBDTGFV7ZHYGQWVGFHOW75CB";

/// Kin issuer on the public test network.
pub const TESTNET_ISSUER: &str = "GCKG5WGBIJP74UDNRIRDFGENNIH5Y3KBI5IHREFAJKV4MQXLELT7EX6V";

/// Network passphrase of the production network.
pub const MAINNET_PASSPHRASE: &str = "Public Global Stellar Network ; September 2015";

/// Network passphrase of the public test network.
pub const TESTNET_PASSPHRASE: &str = "Test SDF Network ; September 2015";

// ---------------------------------------------------------------------------
// Keystore
// ---------------------------------------------------------------------------

/// PBKDF2-HMAC-SHA256 iterations used when sealing a new key.
pub const DEFAULT_KDF_ITERATIONS: u32 = 100_000;

/// Salt length for the passphrase KDF.
pub const KDF_SALT_LENGTH: usize = 16;

/// AES-256-GCM key length in bytes.
pub const AES_KEY_LENGTH: usize = 32;

/// AES-256-GCM nonce length in bytes.
pub const AES_NONCE_LENGTH: usize = 12;

/// Directory of the persistent keystore when the client is not given one.
pub const DEFAULT_KEYSTORE_DIR: &str = ".kin/keystore";

/// Shortest passphrase the keystores accept by default.
pub const DEFAULT_MIN_PASSPHRASE_LENGTH: usize = 1;

/// Longest passphrase the keystores accept.
pub const MAX_PASSPHRASE_LENGTH: usize = 1024;

/// Name of the cipher recorded in exported key blobs.
pub const EXPORT_CIPHER: &str = "aes-256-gcm";

/// Name of the KDF recorded in exported key blobs.
pub const EXPORT_KDF: &str = "pbkdf2-hmac-sha256";

// ---------------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------------

/// Maximum text memo length in bytes.
pub const MAX_MEMO_LENGTH: usize = 28;

/// Fee charged per transaction, in native units (stroops).
pub const BASE_FEE_STROOPS: u64 = 100;

/// Native balance the friendbot gives a freshly funded account: 10,000 lumens.
pub const FRIENDBOT_STARTING_BALANCE: u64 = 10_000 * QUARKS_PER_KIN;

/// Largest single faucet grant, in Kin.
pub const MAX_TEST_KIN_GRANT: u64 = 10_000;

// ---------------------------------------------------------------------------
// Endpoints
// ---------------------------------------------------------------------------

/// Default port of the sample JSON-RPC ledger server.
pub const DEFAULT_RPC_PORT: u16 = 8000;

/// Default endpoint the sample binary talks to.
pub const DEFAULT_RPC_URL: &str = "http://127.0.0.1:8000";

/// Path of the JSON-RPC route on the ledger server.
pub const RPC_PATH: &str = "/rpc";

// ---------------------------------------------------------------------------
// Runtime-configurable keystore parameters
// ---------------------------------------------------------------------------

/// Tunables shared by every keystore implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyStoreConfig {
    /// PBKDF2 iterations for newly sealed keys. Existing keys remember the
    /// count they were sealed with.
    pub kdf_iterations: u32,
    /// Passphrases shorter than this are rejected at import time.
    pub min_passphrase_len: usize,
}

impl Default for KeyStoreConfig {
    fn default() -> Self {
        Self {
            kdf_iterations: DEFAULT_KDF_ITERATIONS,
            min_passphrase_len: DEFAULT_MIN_PASSPHRASE_LENGTH,
        }
    }
}

impl KeyStoreConfig {
    /// A cheap configuration for tests and throwaway stores.
    pub fn insecure_fast() -> Self {
        Self {
            kdf_iterations: 1,
            ..Self::default()
        }
    }
}
