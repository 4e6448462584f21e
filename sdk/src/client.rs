//! # Kin Client
//!
//! [`KinClient`] binds one ledger endpoint and one [`NetworkId`] to a
//! gateway, a keystore and the account registry on top of it.
//!
//! ```no_run
//! use kin_sdk::{KinClient, NetworkId};
//!
//! let client = KinClient::new("http://127.0.0.1:8000", NetworkId::TestNet)?;
//! let account = client.add_account("correct horse")?;
//! account.activate_blocking("correct horse")?;
//! println!("{} holds {} KIN", account.public_address(), account.balance_blocking()?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Clients that share a keystore share its keys: deleting an account or
//! the whole keystore through one client is visible to every other.

use reqwest::Url;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{info, warn};

use crate::account::{AccountContext, KinAccount};
use crate::accounts::KinAccounts;
use crate::address::Asset;
use crate::config::{KeyStoreConfig, DEFAULT_KEYSTORE_DIR};
use crate::error::{ClientError, KinError};
use crate::gateway::{LedgerGateway, RpcGateway};
use crate::keystore::{KeyVault, SledKeyStore};
use crate::network::NetworkId;
use crate::runtime::Dispatcher;

/// Entry point of the SDK.
pub struct KinClient {
    url: Url,
    network_id: NetworkId,
    asset: Asset,
    vault: Arc<dyn KeyVault>,
    accounts: KinAccounts,
}

impl KinClient {
    /// A client with the default persistent keystore and a JSON-RPC gateway.
    pub fn new(url: &str, network_id: NetworkId) -> Result<Self, ClientError> {
        Self::builder(url, network_id).build()
    }

    pub fn builder(url: impl Into<String>, network_id: NetworkId) -> KinClientBuilder {
        KinClientBuilder {
            url: url.into(),
            network_id,
            keystore: None,
            keystore_dir: None,
            keystore_config: KeyStoreConfig::default(),
            gateway: None,
            runtime: None,
        }
    }

    /// Creates a new account protected by `passphrase`.
    pub fn add_account(&self, passphrase: &str) -> Result<Arc<KinAccount>, KinError> {
        self.accounts.create_account(passphrase)
    }

    /// Deletes the account at `index`. No-op for unknown indices.
    pub fn delete_account(&self, index: usize, passphrase: &str) -> Result<(), KinError> {
        self.accounts.delete_account(index, passphrase)
    }

    /// Destroys every key in the keystore and retires every handle.
    ///
    /// This is store-wide: keys created by other clients on the same
    /// keystore are destroyed too. It cannot be undone.
    ///
    /// Handles are retired only once the keystore is empty. If the wipe
    /// fails, every account stays live and the error is returned.
    pub fn delete_keystore(&self) -> Result<(), KinError> {
        self.vault
            .remove_all()
            .map_err(|e| KinError::AccountDeletionFailed(e.into()))?;
        self.accounts.retire_all();
        self.accounts.flush_cache();
        warn!(network = %self.network_id, "keystore deleted");
        Ok(())
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn network_id(&self) -> &NetworkId {
        &self.network_id
    }

    /// The Kin asset on this client's network.
    pub fn asset(&self) -> &Asset {
        &self.asset
    }

    pub fn accounts(&self) -> &KinAccounts {
        &self.accounts
    }
}

impl std::fmt::Debug for KinClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KinClient")
            .field("url", &self.url.as_str())
            .field("network_id", &self.network_id)
            .field("accounts", &self.accounts)
            .finish()
    }
}

/// Configures a [`KinClient`].
pub struct KinClientBuilder {
    url: String,
    network_id: NetworkId,
    keystore: Option<Arc<dyn KeyVault>>,
    keystore_dir: Option<PathBuf>,
    keystore_config: KeyStoreConfig,
    gateway: Option<Arc<dyn LedgerGateway>>,
    runtime: Option<Handle>,
}

impl KinClientBuilder {
    /// Uses `keystore` instead of opening the default one. Pass the same
    /// `Arc` to several clients to share keys between them.
    pub fn keystore(mut self, keystore: Arc<dyn KeyVault>) -> Self {
        self.keystore = Some(keystore);
        self
    }

    /// Opens the persistent keystore in `dir` instead of the default.
    pub fn keystore_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.keystore_dir = Some(dir.into());
        self
    }

    /// Tunables for a keystore opened by the builder.
    pub fn keystore_config(mut self, config: KeyStoreConfig) -> Self {
        self.keystore_config = config;
        self
    }

    /// Uses `gateway` instead of a JSON-RPC gateway to the client URL.
    pub fn gateway(mut self, gateway: Arc<dyn LedgerGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    /// Runs blocking and callback operations on `handle` instead of an
    /// owned runtime.
    pub fn runtime_handle(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    pub fn build(self) -> Result<KinClient, ClientError> {
        let url = parse_endpoint(&self.url)?;

        let vault: Arc<dyn KeyVault> = match self.keystore {
            Some(vault) => vault,
            None => {
                let dir = self
                    .keystore_dir
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_KEYSTORE_DIR));
                Arc::new(SledKeyStore::open(&dir, self.keystore_config)?)
            }
        };
        let gateway: Arc<dyn LedgerGateway> = match self.gateway {
            Some(gateway) => gateway,
            None => Arc::new(RpcGateway::new(&url, self.network_id.clone())),
        };
        let dispatcher = Arc::new(Dispatcher::new(self.runtime)?);

        let asset = self.network_id.asset();
        let accounts = KinAccounts::new(AccountContext {
            vault: Arc::clone(&vault),
            gateway,
            asset: asset.clone(),
            dispatcher,
        });

        info!(url = %url, network = %self.network_id, accounts = accounts.count(), "client ready");
        Ok(KinClient {
            url,
            network_id: self.network_id,
            asset,
            vault,
            accounts,
        })
    }
}

fn parse_endpoint(raw: &str) -> Result<Url, ClientError> {
    let invalid = |reason: String| ClientError::InvalidEndpoint {
        url: raw.to_string(),
        reason,
    };
    let url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(invalid(format!("unsupported scheme {other:?}"))),
    }
    if url.host_str().is_none() {
        return Err(invalid("missing host".into()));
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::LocalLedger;
    use crate::keystore::{KeyStoreError, MemoryKeyStore};

    fn memory_client(ledger: Arc<LocalLedger>, vault: Arc<dyn KeyVault>) -> KinClient {
        KinClient::builder("http://localhost:8000", ledger.network_id().clone())
            .keystore(vault)
            .gateway(ledger)
            .build()
            .unwrap()
    }

    fn memory() -> Arc<dyn KeyVault> {
        Arc::new(MemoryKeyStore::with_config(KeyStoreConfig::insecure_fast()))
    }

    #[test]
    fn malformed_urls_are_rejected() {
        for bad in ["not a url", "ftp://host", "http://"] {
            let err = KinClient::builder(bad, NetworkId::TestNet)
                .keystore(memory())
                .build()
                .unwrap_err();
            assert!(matches!(err, ClientError::InvalidEndpoint { .. }), "{bad}");
        }
    }

    #[test]
    fn accessors_reflect_configuration() {
        let ledger = Arc::new(LocalLedger::new(NetworkId::TestNet));
        let client = memory_client(ledger, memory());
        assert_eq!(client.url().as_str(), "http://localhost:8000/");
        assert_eq!(client.network_id(), &NetworkId::TestNet);
        assert_eq!(client.asset(), &NetworkId::TestNet.asset());
        assert_eq!(client.accounts().count(), 0);
    }

    #[test]
    fn default_gateway_is_built_from_url() {
        let client = KinClient::builder("http://127.0.0.1:1", NetworkId::MainNet)
            .keystore(memory())
            .build()
            .unwrap();
        assert_eq!(client.network_id().to_string(), "main");
    }

    #[test]
    fn persistent_keystore_dir() {
        let dir = tempfile::tempdir().unwrap();
        let address = {
            let client = KinClient::builder("http://localhost:8000", NetworkId::TestNet)
                .keystore_dir(dir.path())
                .keystore_config(KeyStoreConfig::insecure_fast())
                .build()
                .unwrap();
            client.add_account("p").unwrap().public_address().clone()
        };

        let client = KinClient::builder("http://localhost:8000", NetworkId::TestNet)
            .keystore_dir(dir.path())
            .keystore_config(KeyStoreConfig::insecure_fast())
            .build()
            .unwrap();
        assert_eq!(client.accounts().count(), 1);
        assert_eq!(client.accounts().get(0).unwrap().public_address(), &address);
    }

    #[test]
    fn delete_keystore_is_store_wide() {
        let ledger = Arc::new(LocalLedger::new(NetworkId::TestNet));
        let shared = memory();
        let first = memory_client(ledger.clone(), shared.clone());
        let second = memory_client(ledger, shared.clone());

        let a = first.add_account("a").unwrap();
        let b = second.add_account("b").unwrap();
        second.add_account("c").unwrap();
        first.delete_keystore().unwrap();

        assert!(a.is_deleted());
        assert_eq!(shared.count(), 0);
        assert!(first.accounts().get(0).is_none());

        // `second` no longer resolves any index once its keys are gone.
        second.accounts().flush_cache();
        assert_eq!(second.accounts().count(), 0);
        assert!(second.accounts().get(0).is_none());
        assert!(second.accounts().get(1).is_none());
        // A handle it had already given out is not retired, but cannot act.
        assert!(!b.is_deleted());
        assert_eq!(
            b.export_key_store("b", "x").unwrap_err(),
            KinError::InternalInconsistency
        );
    }

    #[test]
    fn lookup_notices_wiped_store_without_flush() {
        let ledger = Arc::new(LocalLedger::new(NetworkId::TestNet));
        let shared = memory();
        let first = memory_client(ledger.clone(), shared.clone());
        let second = memory_client(ledger, shared);

        second.add_account("b").unwrap();
        first.delete_keystore().unwrap();

        assert!(second.accounts().get(0).is_none());
        assert_eq!(second.accounts().count(), 0);
    }

    /// Memory store whose wipe always fails.
    struct StuckVault(MemoryKeyStore);

    impl KeyVault for StuckVault {
        fn count(&self) -> usize {
            self.0.count()
        }

        fn entry(&self, index: usize) -> Option<crate::keystore::KeyPair> {
            self.0.entry(index)
        }

        fn positions(&self) -> Vec<usize> {
            self.0.positions()
        }

        fn import_new_key(
            &self,
            passphrase: &str,
        ) -> Result<(usize, crate::keystore::KeyPair), KeyStoreError> {
            self.0.import_new_key(passphrase)
        }

        fn remove(&self, index: usize) -> Result<(), KeyStoreError> {
            self.0.remove(index)
        }

        fn remove_all(&self) -> Result<(), KeyStoreError> {
            Err(KeyStoreError::Storage("disk full".into()))
        }
    }

    #[test]
    fn failed_wipe_leaves_accounts_live() {
        let ledger = Arc::new(LocalLedger::new(NetworkId::TestNet));
        let vault: Arc<dyn KeyVault> = Arc::new(StuckVault(MemoryKeyStore::with_config(
            KeyStoreConfig::insecure_fast(),
        )));
        let client = memory_client(ledger, vault.clone());
        let a = client.add_account("a").unwrap();

        let err = client.delete_keystore().unwrap_err();
        assert_eq!(
            err,
            KinError::AccountDeletionFailed(
                KeyStoreError::Storage("disk full".into()).into()
            )
        );
        assert!(!a.is_deleted());
        assert_eq!(vault.count(), 1);

        // The surviving key keeps its index and its handle.
        client.accounts().flush_cache();
        assert_eq!(client.accounts().count(), 1);
        assert!(Arc::ptr_eq(&client.accounts().get(0).unwrap(), &a));
        assert!(client.accounts().get(1).is_none());
    }
}
