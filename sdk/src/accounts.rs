//! # Account Registry
//!
//! [`KinAccounts`] is an index-stable cache of [`KinAccount`] handles kept in
//! sync with the client's keystore.
//!
//! ## Slots
//!
//! ```text
//!   index:   0        1        2        3
//!          [ A ]    [ -- ]   [ C ]    [ D ]
//!            │                 │        │
//!   vault:  pos 0            pos 1    pos 2     (shifting store after deleting 1)
//! ```
//!
//! Each index owns one slot. Deleting an account empties its slot for good;
//! later indices never shift. The keystore may renumber its own positions
//! on removal, so each slot remembers the position of its key and the
//! registry re-reads the store (matching by public key) after every
//! deletion.
//!
//! ## Identity
//!
//! A slot holds at most one handle. Every lookup of a live index returns a
//! clone of that same `Arc`, so `Arc::ptr_eq` holds across lookups.
//!
//! ## Locking
//!
//! The slot vector sits behind a `parking_lot::RwLock`. Lookups of cached
//! handles share the read lock; creation, deletion and lazy handle
//! construction take the write lock.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::account::{AccountContext, KinAccount};
use crate::address::LedgerAddress;
use crate::error::{FailureCause, KinError};
use crate::keystore::{KeyPair, KeyStoreError, KeyVault};

struct SlotEntry {
    address: LedgerAddress,
    vault_index: usize,
    handle: Option<Arc<KinAccount>>,
}

/// `None` marks a deleted index or a gap in the keystore.
type Slot = Option<SlotEntry>;

/// The ordered set of local accounts of one client.
pub struct KinAccounts {
    slots: RwLock<Vec<Slot>>,
    ctx: AccountContext,
}

impl KinAccounts {
    pub(crate) fn new(ctx: AccountContext) -> Self {
        let slots = load_slots(ctx.vault.as_ref());
        debug!(slots = slots.len(), "account registry loaded");
        Self {
            slots: RwLock::new(slots),
            ctx,
        }
    }

    /// Creates a key under `passphrase` and returns the handle at the next
    /// free index.
    ///
    /// The key is sealed before the slot lock is taken, so lookups are not
    /// held up by key derivation.
    pub fn create_account(&self, passphrase: &str) -> Result<Arc<KinAccount>, KinError> {
        let (vault_index, record) = self
            .ctx
            .vault
            .import_new_key(passphrase)
            .map_err(|e| KinError::AccountCreationFailed(e.into()))?;
        let address = record.address();

        let mut slots = self.slots.write();
        // A resync running between the import and the lock may already have
        // adopted the new key.
        let adopted = slots
            .iter()
            .position(|s| s.as_ref().is_some_and(|e| e.address == address));
        if let Some(Some(SlotEntry {
            handle: Some(handle),
            ..
        })) = adopted.and_then(|i| slots.get(i))
        {
            return Ok(Arc::clone(handle));
        }
        let index = adopted.unwrap_or(slots.len());
        let handle = Arc::new(KinAccount::new(
            index,
            address.clone(),
            vault_index,
            self.ctx.clone(),
        ));
        let entry = SlotEntry {
            address: address.clone(),
            vault_index,
            handle: Some(Arc::clone(&handle)),
        };
        match adopted {
            Some(index) => slots[index] = Some(entry),
            None => slots.push(Some(entry)),
        }

        info!(index, %address, "account created");
        Ok(handle)
    }

    /// Deletes the account at `index` after checking `passphrase`.
    ///
    /// Out-of-range and already-empty indices are a no-op. On success the
    /// handle is retired and the slot stays empty forever.
    pub fn delete_account(&self, index: usize, passphrase: &str) -> Result<(), KinError> {
        let address = {
            let slots = self.slots.read();
            match slots.get(index) {
                Some(Some(entry)) => entry.address.clone(),
                _ => {
                    debug!(index, "delete of empty slot ignored");
                    return Ok(());
                }
            }
        };

        // Passphrase check runs without the slot lock held.
        let record = self
            .find_record(&address)
            .map(|(_, record)| record)
            .ok_or_else(|| {
                warn!(index, %address, "keystore entry missing");
                KinError::InternalInconsistency
            })?;
        if !record.verify(passphrase) {
            return Err(KinError::AccountDeletionFailed(FailureCause::KeyStore(
                KeyStoreError::WrongPassphrase,
            )));
        }

        let mut slots = self.slots.write();
        let Some(Some(entry)) = slots.get(index) else {
            debug!(index, "account deleted concurrently");
            return Ok(());
        };
        if entry.address != address {
            return Err(KinError::InternalInconsistency);
        }
        let position = self.locate(entry)?;
        self.ctx
            .vault
            .remove(position)
            .map_err(|e| KinError::AccountDeletionFailed(e.into()))?;

        if let Some(handle) = &entry.handle {
            handle.mark_deleted();
        }
        slots[index] = None;
        self.resync(&mut slots);

        info!(index, %address, "account deleted");
        Ok(())
    }

    /// Handle at `index`, or `None` for empty and unknown indices and for
    /// accounts whose key is no longer in the keystore.
    pub fn get(&self, index: usize) -> Option<Arc<KinAccount>> {
        {
            let slots = self.slots.read();
            match slots.get(index) {
                Some(Some(entry)) => {
                    if let Some(handle) = &entry.handle {
                        if self.key_at(entry.vault_index, &entry.address) {
                            return Some(Arc::clone(handle));
                        }
                    }
                }
                _ => return None,
            }
        }

        // Slow path under the write lock: re-check, follow a moved key, and
        // build the handle if no other caller got there first.
        let mut slots = self.slots.write();
        let slot = slots.get_mut(index)?;
        let entry = slot.as_mut()?;
        let Some(position) = self.position_of(entry) else {
            warn!(index, address = %entry.address, "keystore entry missing, slot emptied");
            *slot = None;
            return None;
        };
        entry.vault_index = position;
        if let Some(handle) = &entry.handle {
            handle.set_vault_index(position);
            return Some(Arc::clone(handle));
        }
        let handle = Arc::new(KinAccount::new(
            index,
            entry.address.clone(),
            position,
            self.ctx.clone(),
        ));
        entry.handle = Some(Arc::clone(&handle));
        debug!(index, "account handle materialized");
        Some(handle)
    }

    /// Number of live accounts.
    pub fn count(&self) -> usize {
        self.slots.read().iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Every live handle, in index order.
    pub fn all(&self) -> Vec<Arc<KinAccount>> {
        let len = self.slots.read().len();
        (0..len).filter_map(|i| self.get(i)).collect()
    }

    pub fn iter(&self) -> std::vec::IntoIter<Arc<KinAccount>> {
        self.all().into_iter()
    }

    /// Re-reads the keystore mapping and drops cached handles nobody else
    /// holds. The keystore itself is not modified.
    pub fn flush_cache(&self) {
        let mut slots = self.slots.write();
        for entry in slots.iter_mut().flatten() {
            if entry
                .handle
                .as_ref()
                .is_some_and(|h| Arc::strong_count(h) == 1)
            {
                entry.handle = None;
            }
        }
        self.resync(&mut slots);
        debug!(slots = slots.len(), "account cache flushed");
    }

    /// Retires every handle and empties every slot. Used once the whole
    /// keystore has been destroyed; the emptied indices are not handed out
    /// again.
    pub(crate) fn retire_all(&self) {
        let mut slots = self.slots.write();
        for slot in slots.iter_mut() {
            if let Some(handle) = slot.take().and_then(|entry| entry.handle) {
                handle.mark_deleted();
            }
        }
    }

    fn key_at(&self, position: usize, address: &LedgerAddress) -> bool {
        self.ctx
            .vault
            .entry(position)
            .is_some_and(|r| &r.address() == address)
    }

    /// Position and record of the key behind `address`, wherever it is.
    fn find_record(&self, address: &LedgerAddress) -> Option<(usize, KeyPair)> {
        self.ctx.vault.positions().into_iter().find_map(|p| {
            self.ctx
                .vault
                .entry(p)
                .filter(|r| &r.address() == address)
                .map(|r| (p, r))
        })
    }

    /// Current keystore position of a slot's key, if it still exists.
    fn position_of(&self, entry: &SlotEntry) -> Option<usize> {
        if self.key_at(entry.vault_index, &entry.address) {
            return Some(entry.vault_index);
        }
        self.find_record(&entry.address).map(|(p, _)| p)
    }

    fn locate(&self, entry: &SlotEntry) -> Result<usize, KinError> {
        self.position_of(entry).ok_or_else(|| {
            warn!(address = %entry.address, "keystore entry missing");
            KinError::InternalInconsistency
        })
    }

    /// Re-maps live slots onto the keystore's current positions, empties
    /// slots whose key is gone, and appends keys that appeared from
    /// elsewhere (e.g. another client on the same store).
    ///
    /// A handle whose slot is emptied here is not retired: callers still
    /// holding it get [`KinError::InternalInconsistency`].
    fn resync(&self, slots: &mut Vec<Slot>) {
        let mut by_address: HashMap<LedgerAddress, usize> = HashMap::new();
        let mut order = Vec::new();
        for position in self.ctx.vault.positions() {
            if let Some(record) = self.ctx.vault.entry(position) {
                let address = record.address();
                order.push(address.clone());
                by_address.insert(address, position);
            }
        }

        for (index, slot) in slots.iter_mut().enumerate() {
            let Some(entry) = slot else { continue };
            match by_address.remove(&entry.address) {
                Some(position) => {
                    if position != entry.vault_index {
                        debug!(index, from = entry.vault_index, to = position, "slot remapped");
                    }
                    entry.vault_index = position;
                    if let Some(handle) = &entry.handle {
                        handle.set_vault_index(position);
                    }
                }
                None => {
                    warn!(index, address = %entry.address, "keystore entry gone, slot emptied");
                    *slot = None;
                }
            }
        }

        for address in order {
            if let Some(position) = by_address.remove(&address) {
                debug!(index = slots.len(), position, "adopting keystore entry");
                slots.push(Some(SlotEntry {
                    address,
                    vault_index: position,
                    handle: None,
                }));
            }
        }
    }
}

/// Builds slots from the keystore, one per position. Gaps become empty.
fn load_slots(vault: &dyn KeyVault) -> Vec<Slot> {
    let positions = vault.positions();
    let len = positions.last().map(|p| p + 1).unwrap_or(0);
    let mut slots: Vec<Slot> = (0..len).map(|_| None).collect();
    for position in positions {
        if let Some(record) = vault.entry(position) {
            slots[position] = Some(SlotEntry {
                address: record.address(),
                vault_index: position,
                handle: None,
            });
        }
    }
    slots
}

impl std::fmt::Debug for KinAccounts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slots = self.slots.read();
        f.debug_struct("KinAccounts")
            .field("slots", &slots.len())
            .field("live", &slots.iter().filter(|s| s.is_some()).count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KeyStoreConfig;
    use crate::gateway::LocalLedger;
    use crate::keystore::{MemoryKeyStore, SledKeyStore};
    use crate::network::NetworkId;
    use crate::runtime::Dispatcher;
    use std::sync::mpsc;

    fn registry_with(vault: Arc<dyn KeyVault>) -> KinAccounts {
        let ledger = Arc::new(LocalLedger::new(NetworkId::TestNet));
        KinAccounts::new(AccountContext {
            vault,
            asset: ledger.asset().clone(),
            gateway: ledger,
            dispatcher: Arc::new(Dispatcher::new(None).unwrap()),
        })
    }

    fn memory() -> Arc<dyn KeyVault> {
        Arc::new(MemoryKeyStore::with_config(KeyStoreConfig::insecure_fast()))
    }

    fn sled() -> Arc<dyn KeyVault> {
        Arc::new(SledKeyStore::open_temporary(KeyStoreConfig::insecure_fast()).unwrap())
    }

    #[test]
    fn create_assigns_sequential_indices() {
        let reg = registry_with(memory());
        let a = reg.create_account("p").unwrap();
        let b = reg.create_account("p").unwrap();
        assert_eq!((a.index(), b.index()), (0, 1));
        assert_eq!(reg.count(), 2);
    }

    #[test]
    fn lookups_return_the_same_instance() {
        let reg = registry_with(memory());
        let created = reg.create_account("p").unwrap();
        let first = reg.get(0).unwrap();
        let second = reg.get(0).unwrap();
        assert!(Arc::ptr_eq(&created, &first));
        assert!(Arc::ptr_eq(&first, &second));
    }

    fn index_stability(vault: Arc<dyn KeyVault>) {
        let reg = registry_with(vault.clone());
        let a = reg.create_account("p0").unwrap();
        let b = reg.create_account("p1").unwrap();
        let c = reg.create_account("p2").unwrap();

        reg.delete_account(1, "p1").unwrap();

        assert!(Arc::ptr_eq(&reg.get(0).unwrap(), &a));
        assert!(reg.get(1).is_none());
        assert!(Arc::ptr_eq(&reg.get(2).unwrap(), &c));
        assert!(b.is_deleted());
        assert_eq!(reg.count(), 2);
        assert_eq!(vault.count(), 2);

        // The survivor can still find its key.
        reg.delete_account(2, "p2").unwrap();
        assert!(c.is_deleted());
        assert_eq!(vault.count(), 1);
    }

    #[test]
    fn index_stability_with_shifting_store() {
        index_stability(memory());
    }

    #[test]
    fn index_stability_with_sparse_store() {
        index_stability(sled());
    }

    #[test]
    fn delete_with_wrong_passphrase_keeps_account() {
        let reg = registry_with(memory());
        let a = reg.create_account("right").unwrap();
        let err = reg.delete_account(0, "wrong").unwrap_err();
        assert_eq!(
            err,
            KinError::AccountDeletionFailed(FailureCause::KeyStore(
                KeyStoreError::WrongPassphrase
            ))
        );
        assert!(!a.is_deleted());
        assert_eq!(reg.count(), 1);
    }

    #[test]
    fn delete_out_of_range_is_noop() {
        let reg = registry_with(memory());
        reg.create_account("p").unwrap();
        reg.delete_account(9, "p").unwrap();
        reg.delete_account(0, "p").unwrap();
        reg.delete_account(0, "p").unwrap();
        assert_eq!(reg.count(), 0);
    }

    #[test]
    fn failed_creation_is_reported() {
        let reg = registry_with(memory());
        let err = reg.create_account("").unwrap_err();
        assert!(matches!(
            err,
            KinError::AccountCreationFailed(FailureCause::KeyStore(
                KeyStoreError::PassphraseRejected(_)
            ))
        ));
        assert_eq!(reg.count(), 0);
    }

    #[test]
    fn existing_keys_are_loaded_lazily() {
        let vault = sled();
        vault.import_new_key("a").unwrap();
        vault.import_new_key("b").unwrap();
        vault.import_new_key("c").unwrap();
        vault.remove(1).unwrap();

        let reg = registry_with(vault.clone());
        assert_eq!(reg.count(), 2);
        assert!(reg.get(1).is_none());
        let c = reg.get(2).unwrap();
        assert_eq!(c.public_address(), &vault.entry(2).unwrap().address());
        assert!(Arc::ptr_eq(&c, &reg.get(2).unwrap()));
    }

    #[test]
    fn keys_added_by_another_client_are_adopted() {
        let vault = memory();
        let reg = registry_with(vault.clone());
        reg.create_account("mine").unwrap();
        vault.import_new_key("theirs").unwrap();

        reg.flush_cache();
        assert_eq!(reg.count(), 2);
        assert_eq!(
            reg.get(1).unwrap().public_address(),
            &vault.entry(1).unwrap().address()
        );
    }

    #[test]
    fn flush_keeps_handles_callers_still_hold() {
        let reg = registry_with(memory());
        let held = reg.create_account("p").unwrap();
        reg.create_account("p").unwrap();

        reg.flush_cache();
        assert!(Arc::ptr_eq(&held, &reg.get(0).unwrap()));
        assert_eq!(reg.all().len(), 2);
    }

    #[test]
    fn retire_all_marks_everything_deleted() {
        let reg = registry_with(memory());
        let a = reg.create_account("p").unwrap();
        let b = reg.create_account("p").unwrap();
        reg.retire_all();
        assert!(a.is_deleted() && b.is_deleted());
        assert!(reg.get(0).is_none());
        assert_eq!(reg.count(), 0);

        let c = reg.create_account("p").unwrap();
        assert_eq!(c.index(), 2);
    }

    #[test]
    fn slot_with_vanished_key_resolves_to_none() {
        let vault = memory();
        let reg = registry_with(vault.clone());
        let a = reg.create_account("p").unwrap();
        reg.create_account("p").unwrap();

        // Keys removed behind the registry's back.
        vault.remove(1).unwrap();
        assert!(reg.get(1).is_none());
        assert_eq!(reg.count(), 1);

        vault.remove(0).unwrap();
        reg.flush_cache();
        assert!(reg.get(0).is_none());
        assert_eq!(reg.count(), 0);
        assert!(!a.is_deleted());
        assert_eq!(
            a.export_key_store("p", "x").unwrap_err(),
            KinError::InternalInconsistency
        );
    }

    #[test]
    fn concurrent_lookups_share_one_handle() {
        let vault = memory();
        vault.import_new_key("p").unwrap();
        let reg = registry_with(vault);

        let seen: Vec<Arc<KinAccount>> = std::thread::scope(|s| {
            let workers: Vec<_> = (0..16)
                .map(|_| s.spawn(|| (0..50).map(|_| reg.get(0).unwrap()).collect::<Vec<_>>()))
                .collect();
            workers
                .into_iter()
                .flat_map(|w| w.join().unwrap())
                .collect()
        });

        let first = &seen[0];
        assert!(seen.iter().all(|h| Arc::ptr_eq(h, first)));
        assert!(Arc::ptr_eq(first, &reg.get(0).unwrap()));
    }

    #[test]
    fn interleaved_create_delete_and_lookup() {
        let vault = memory();
        let reg = registry_with(vault.clone());
        let originals: Vec<_> = (0..8).map(|_| reg.create_account("p").unwrap()).collect();

        let created = std::thread::scope(|s| {
            let deleter = s.spawn(|| {
                for index in (0..8).step_by(2) {
                    reg.delete_account(index, "p").unwrap();
                }
            });
            let creator = s.spawn(|| {
                (0..4)
                    .map(|_| reg.create_account("p").unwrap())
                    .collect::<Vec<_>>()
            });
            let reader = s.spawn(|| {
                for _ in 0..20 {
                    for index in 0..16 {
                        if let Some(handle) = reg.get(index) {
                            assert_eq!(handle.index(), index);
                        }
                    }
                }
            });
            deleter.join().unwrap();
            reader.join().unwrap();
            creator.join().unwrap()
        });

        for (index, original) in originals.iter().enumerate() {
            match reg.get(index) {
                Some(handle) => {
                    assert_eq!(index % 2, 1);
                    assert!(Arc::ptr_eq(&handle, original));
                }
                None => {
                    assert_eq!(index % 2, 0);
                    assert!(original.is_deleted());
                }
            }
        }

        let mut new_indices: Vec<_> = created.iter().map(|h| h.index()).collect();
        new_indices.sort_unstable();
        assert_eq!(new_indices, vec![8, 9, 10, 11]);
        for handle in &created {
            assert!(Arc::ptr_eq(handle, &reg.get(handle.index()).unwrap()));
        }

        assert_eq!(reg.count(), 8);
        assert_eq!(vault.count(), 8);
        for handle in reg.all() {
            handle.export_key_store("p", "x").unwrap();
        }
    }

    /// Memory store whose key generation waits until released.
    struct GatedVault {
        inner: MemoryKeyStore,
        entered: parking_lot::Mutex<mpsc::Sender<()>>,
        release: parking_lot::Mutex<mpsc::Receiver<()>>,
    }

    impl KeyVault for GatedVault {
        fn count(&self) -> usize {
            self.inner.count()
        }

        fn entry(&self, index: usize) -> Option<KeyPair> {
            self.inner.entry(index)
        }

        fn positions(&self) -> Vec<usize> {
            self.inner.positions()
        }

        fn import_new_key(&self, passphrase: &str) -> Result<(usize, KeyPair), KeyStoreError> {
            self.entered.lock().send(()).unwrap();
            self.release.lock().recv().unwrap();
            self.inner.import_new_key(passphrase)
        }

        fn remove(&self, index: usize) -> Result<(), KeyStoreError> {
            self.inner.remove(index)
        }

        fn remove_all(&self) -> Result<(), KeyStoreError> {
            self.inner.remove_all()
        }
    }

    #[test]
    fn lookups_proceed_while_a_key_is_sealed() {
        let inner = MemoryKeyStore::with_config(KeyStoreConfig::insecure_fast());
        inner.import_new_key("p0").unwrap();
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let reg = registry_with(Arc::new(GatedVault {
            inner,
            entered: parking_lot::Mutex::new(entered_tx),
            release: parking_lot::Mutex::new(release_rx),
        }));
        let existing = reg.get(0).unwrap();

        std::thread::scope(|s| {
            let creator = s.spawn(|| reg.create_account("p1"));
            entered_rx.recv().unwrap();

            // The creator is inside key generation; the registry stays open.
            assert!(Arc::ptr_eq(&reg.get(0).unwrap(), &existing));
            assert_eq!(reg.count(), 1);

            release_tx.send(()).unwrap();
            let created = creator.join().unwrap().unwrap();
            assert_eq!(created.index(), 1);
        });
        assert_eq!(reg.count(), 2);
    }
}
