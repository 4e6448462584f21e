//! # Persistent Keystore
//!
//! A [`KeyVault`] backed by sled. Records survive restarts, and two clients
//! opening the same directory see the same keys.
//!
//! ## Tree Layout
//!
//! | Tree       | Key                   | Value                    |
//! |------------|-----------------------|--------------------------|
//! | `keys`     | `position` (8B BE)    | `bincode(KeyPair)`       |
//! | `metadata` | `next_position`       | `u64` (8B BE)            |
//!
//! Positions are big-endian so that sled's lexicographic order matches
//! numeric order and [`KeyVault::positions`] comes out sorted. The
//! `next_position` counter only ever grows: a removed position leaves a gap
//! and is never handed out again.

use sled::{Db, Tree};
use std::path::Path;
use tracing::{debug, warn};

use super::{KeyPair, KeyStoreError, KeyVault};
use crate::config::KeyStoreConfig;

const META_NEXT_POSITION: &[u8] = b"next_position";

/// A sled-backed [`KeyVault`] with sparse, stable positions.
#[derive(Debug, Clone)]
pub struct SledKeyStore {
    db: Db,
    keys: Tree,
    metadata: Tree,
    config: KeyStoreConfig,
}

impl SledKeyStore {
    /// Opens or creates a keystore at `path`.
    pub fn open<P: AsRef<Path>>(path: P, config: KeyStoreConfig) -> Result<Self, KeyStoreError> {
        let db = sled::open(path)?;
        Self::from_db(db, config)
    }

    /// A keystore that is deleted when dropped. Handy for tests.
    pub fn open_temporary(config: KeyStoreConfig) -> Result<Self, KeyStoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db, config)
    }

    fn from_db(db: Db, config: KeyStoreConfig) -> Result<Self, KeyStoreError> {
        let keys = db.open_tree("keys")?;
        let metadata = db.open_tree("metadata")?;
        Ok(Self {
            db,
            keys,
            metadata,
            config,
        })
    }

    pub fn config(&self) -> &KeyStoreConfig {
        &self.config
    }

    /// Reserves the next position. Atomic across clones sharing the `Db`.
    fn reserve_position(&self) -> Result<u64, KeyStoreError> {
        let updated = self.metadata.update_and_fetch(META_NEXT_POSITION, |old| {
            let next = old.map(decode_position).unwrap_or(0) + 1;
            Some(next.to_be_bytes().to_vec())
        })?;
        let next = updated.map(|v| decode_position(&v)).unwrap_or(1);
        Ok(next - 1)
    }

    fn decode_record(bytes: &[u8]) -> Result<KeyPair, KeyStoreError> {
        bincode::deserialize(bytes).map_err(|e| KeyStoreError::Corrupt(e.to_string()))
    }
}

fn decode_position(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    let n = bytes.len().min(8);
    buf[8 - n..].copy_from_slice(&bytes[bytes.len() - n..]);
    u64::from_be_bytes(buf)
}

impl KeyVault for SledKeyStore {
    fn count(&self) -> usize {
        self.keys.len()
    }

    fn entry(&self, index: usize) -> Option<KeyPair> {
        match self.keys.get((index as u64).to_be_bytes()) {
            Ok(Some(bytes)) => match Self::decode_record(&bytes) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(index, error = %e, "unreadable keystore record");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(index, error = %e, "keystore read failed");
                None
            }
        }
    }

    fn positions(&self) -> Vec<usize> {
        self.keys
            .iter()
            .keys()
            .filter_map(|k| k.ok())
            .map(|k| decode_position(&k) as usize)
            .collect()
    }

    fn import_new_key(&self, passphrase: &str) -> Result<(usize, KeyPair), KeyStoreError> {
        let record = KeyPair::generate(passphrase, &self.config)?;
        let bytes =
            bincode::serialize(&record).map_err(|e| KeyStoreError::Storage(e.to_string()))?;

        let position = self.reserve_position()?;
        self.keys.insert(position.to_be_bytes(), bytes)?;
        self.db.flush()?;

        debug!(position, address = %record.address(), "key imported into sled store");
        Ok((position as usize, record))
    }

    fn remove(&self, index: usize) -> Result<(), KeyStoreError> {
        match self.keys.remove((index as u64).to_be_bytes())? {
            Some(_) => {
                self.db.flush()?;
                debug!(index, "key removed from sled store");
                Ok(())
            }
            None => Err(KeyStoreError::NotFound(index)),
        }
    }

    fn remove_all(&self) -> Result<(), KeyStoreError> {
        self.keys.clear()?;
        self.db.flush()?;
        Ok(())
    }
}
