//! Process-local keystore.
//!
//! Records live in a dense vector. Removing position `i` shifts every later
//! record down by one, so positions are only stable until the next removal.
//! The account registry compensates by re-reading positions after each
//! deletion.

use parking_lot::RwLock;
use tracing::debug;

use super::{KeyPair, KeyStoreError, KeyVault};
use crate::config::KeyStoreConfig;

/// An in-memory [`KeyVault`]. Contents are lost when the store is dropped.
#[derive(Debug, Default)]
pub struct MemoryKeyStore {
    entries: RwLock<Vec<KeyPair>>,
    config: KeyStoreConfig,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: KeyStoreConfig) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            config,
        }
    }

    pub fn config(&self) -> &KeyStoreConfig {
        &self.config
    }
}

impl KeyVault for MemoryKeyStore {
    fn count(&self) -> usize {
        self.entries.read().len()
    }

    fn entry(&self, index: usize) -> Option<KeyPair> {
        self.entries.read().get(index).cloned()
    }

    fn positions(&self) -> Vec<usize> {
        (0..self.entries.read().len()).collect()
    }

    fn import_new_key(&self, passphrase: &str) -> Result<(usize, KeyPair), KeyStoreError> {
        // KDF work happens outside the lock.
        let record = KeyPair::generate(passphrase, &self.config)?;
        let mut entries = self.entries.write();
        entries.push(record.clone());
        let index = entries.len() - 1;
        debug!(index, address = %record.address(), "key imported into memory store");
        Ok((index, record))
    }

    fn remove(&self, index: usize) -> Result<(), KeyStoreError> {
        let mut entries = self.entries.write();
        if index >= entries.len() {
            return Err(KeyStoreError::NotFound(index));
        }
        entries.remove(index);
        debug!(index, remaining = entries.len(), "key removed from memory store");
        Ok(())
    }

    fn remove_all(&self) -> Result<(), KeyStoreError> {
        self.entries.write().clear();
        Ok(())
    }
}
