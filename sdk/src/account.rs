//! # Account Handles
//!
//! A [`KinAccount`] is the caller's view of one local signing identity. It
//! wraps a keystore entry, knows its ledger address, and delegates balance,
//! activation and payment calls to the client's gateway.
//!
//! ## Lifecycle
//!
//! ```text
//!   Active ──delete_account / delete_keystore──> Deleted
//! ```
//!
//! The transition is one-way. A deleted handle stays valid memory for as
//! long as someone holds it, but every operation on it fails with
//! [`KinError::AccountDeleted`]. Local guards (deleted, amount, memo) run
//! before any I/O, so in the callback variants they are delivered on the
//! calling thread.
//!
//! ## Calling conventions
//!
//! | Async                  | Blocking                         | Callback                             |
//! |------------------------|----------------------------------|--------------------------------------|
//! | `balance().await`      | `balance_blocking()`             | `balance_with_callback(cb)`          |
//! | `activate(p).await`    | `activate_blocking(p)`           | `activate_with_callback(p, cb)`      |
//! | `send_transaction(..)` | `send_transaction_blocking(..)`  | `send_transaction_with_callback(..)` |

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::address::{Asset, LedgerAddress};
use crate::amount::{kin_to_quarks, quarks_to_kin, Balance};
use crate::config::MAX_MEMO_LENGTH;
use crate::error::{FailureCause, KinError};
use crate::gateway::{LedgerGateway, PaymentRequest, TransactionId};
use crate::keystore::{ExportedKey, KeyPair, KeyVault};
use crate::runtime::Dispatcher;

/// Shared dependencies a handle needs to do its job.
#[derive(Clone)]
pub(crate) struct AccountContext {
    pub vault: Arc<dyn KeyVault>,
    pub gateway: Arc<dyn LedgerGateway>,
    pub asset: Asset,
    pub dispatcher: Arc<Dispatcher>,
}

/// One local account.
///
/// Handles are created only by [`KinAccounts`](crate::KinAccounts); callers
/// receive `Arc` clones of the registry's instance.
pub struct KinAccount {
    index: usize,
    public_address: LedgerAddress,
    /// Last known keystore position. Keystores may renumber.
    vault_index: AtomicUsize,
    deleted: AtomicBool,
    ctx: AccountContext,
}

impl KinAccount {
    pub(crate) fn new(
        index: usize,
        public_address: LedgerAddress,
        vault_index: usize,
        ctx: AccountContext,
    ) -> Self {
        Self {
            index,
            public_address,
            vault_index: AtomicUsize::new(vault_index),
            deleted: AtomicBool::new(false),
            ctx,
        }
    }

    /// Registry index. Never changes.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn public_address(&self) -> &LedgerAddress {
        &self.public_address
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::Acquire)
    }

    pub(crate) fn mark_deleted(&self) {
        self.deleted.store(true, Ordering::Release);
    }

    pub(crate) fn set_vault_index(&self, position: usize) {
        self.vault_index.store(position, Ordering::Release);
    }

    fn ensure_live(&self) -> Result<(), KinError> {
        if self.is_deleted() {
            Err(KinError::AccountDeleted)
        } else {
            Ok(())
        }
    }

    /// The keystore record backing this handle.
    ///
    /// Tries the last known position first, then scans the store in case
    /// it renumbered. A record that is gone entirely means the store was
    /// changed behind the registry's back.
    fn key_record(&self) -> Result<KeyPair, KinError> {
        let own_key = self.public_address.public_key();
        let hint = self.vault_index.load(Ordering::Acquire);
        if let Some(record) = self.ctx.vault.entry(hint) {
            if record.public_key() == &own_key {
                return Ok(record);
            }
        }

        for position in self.ctx.vault.positions() {
            if let Some(record) = self.ctx.vault.entry(position) {
                if record.public_key() == &own_key {
                    debug!(index = self.index, position, "keystore entry moved");
                    self.set_vault_index(position);
                    return Ok(record);
                }
            }
        }

        warn!(index = self.index, address = %self.public_address, "keystore entry missing");
        Err(KinError::InternalInconsistency)
    }

    // -- Balance -------------------------------------------------------------

    /// Kin balance of this account.
    pub async fn balance(&self) -> Result<Balance, KinError> {
        self.ensure_live()?;
        let quarks = self
            .ctx
            .gateway
            .balance(&self.public_address, &self.ctx.asset)
            .await
            .map_err(|e| KinError::BalanceQueryFailed(e.into()))?;
        Ok(quarks_to_kin(quarks))
    }

    /// Blocking variant of [`balance`](Self::balance).
    pub fn balance_blocking(&self) -> Result<Balance, KinError> {
        self.ctx.dispatcher.block_on(self.balance())
    }

    /// Callback variant of [`balance`](Self::balance).
    pub fn balance_with_callback<F>(self: &Arc<Self>, callback: F)
    where
        F: FnOnce(Result<Balance, KinError>) + Send + 'static,
    {
        if let Err(e) = self.ensure_live() {
            return callback(Err(e));
        }
        let this = Arc::clone(self);
        self.ctx.dispatcher.spawn(async move {
            callback(this.balance().await);
        });
    }

    // -- Activation ----------------------------------------------------------

    /// Funds the account if needed and opens its trustline for Kin.
    pub async fn activate(&self, passphrase: &str) -> Result<TransactionId, KinError> {
        self.ensure_live()?;
        let record = self.key_record()?;
        let signer = record
            .unlock(passphrase)
            .map_err(|e| KinError::ActivationFailed(e.into()))?;

        let id = self
            .ctx
            .gateway
            .fund_and_activate(&signer, &self.ctx.asset)
            .await
            .map_err(|e| KinError::ActivationFailed(e.into()))?;

        info!(index = self.index, address = %self.public_address, tx = %id, "account activated");
        Ok(id)
    }

    /// Blocking variant of [`activate`](Self::activate).
    pub fn activate_blocking(&self, passphrase: &str) -> Result<TransactionId, KinError> {
        self.ctx.dispatcher.block_on(self.activate(passphrase))
    }

    /// Callback variant of [`activate`](Self::activate).
    pub fn activate_with_callback<F>(self: &Arc<Self>, passphrase: &str, callback: F)
    where
        F: FnOnce(Result<TransactionId, KinError>) + Send + 'static,
    {
        if let Err(e) = self.ensure_live() {
            return callback(Err(e));
        }
        let this = Arc::clone(self);
        let passphrase = passphrase.to_string();
        self.ctx.dispatcher.spawn(async move {
            callback(this.activate(&passphrase).await);
        });
    }

    // -- Payments ------------------------------------------------------------

    /// Checks the local preconditions of a payment and converts the amount.
    fn validate_payment(&self, kin: Balance, memo: Option<&str>) -> Result<u64, KinError> {
        self.ensure_live()?;
        if kin <= Balance::ZERO {
            return Err(KinError::InvalidAmount);
        }
        let quarks = kin_to_quarks(kin).ok_or(KinError::InvalidAmount)?;
        if memo.is_some_and(|m| m.len() > MAX_MEMO_LENGTH) {
            return Err(KinError::InvalidMemo {
                max: MAX_MEMO_LENGTH,
            });
        }
        Ok(quarks)
    }

    /// Sends `kin` to `to`, signed with the key unlocked by `passphrase`.
    ///
    /// Fails with [`KinError::InvalidAmount`] for zero, negative, or
    /// sub-quark amounts without contacting the ledger. A ledger rejection
    /// surfaces as [`KinError::PaymentFailed`]; use
    /// [`KinError::payment_error`] to see why.
    pub async fn send_transaction(
        &self,
        to: &LedgerAddress,
        kin: Balance,
        memo: Option<&str>,
        passphrase: &str,
    ) -> Result<TransactionId, KinError> {
        let quarks = self.validate_payment(kin, memo)?;
        let record = self.key_record()?;
        let signer = record
            .unlock(passphrase)
            .map_err(|e| KinError::PaymentFailed(FailureCause::KeyStore(e)))?;

        let request = PaymentRequest {
            destination: to.clone(),
            asset: self.ctx.asset.clone(),
            quarks,
            memo: memo.map(str::to_string),
        };
        let id = self
            .ctx
            .gateway
            .submit_payment(&signer, request)
            .await
            .map_err(|e| KinError::PaymentFailed(e.into()))?;

        info!(
            from = %self.public_address,
            to = %to,
            quarks,
            tx = %id,
            "payment sent"
        );
        Ok(id)
    }

    /// Blocking variant of [`send_transaction`](Self::send_transaction).
    pub fn send_transaction_blocking(
        &self,
        to: &LedgerAddress,
        kin: Balance,
        memo: Option<&str>,
        passphrase: &str,
    ) -> Result<TransactionId, KinError> {
        self.ctx
            .dispatcher
            .block_on(self.send_transaction(to, kin, memo, passphrase))
    }

    /// Callback variant of [`send_transaction`](Self::send_transaction).
    /// Local validation errors are delivered before this returns.
    pub fn send_transaction_with_callback<F>(
        self: &Arc<Self>,
        to: &LedgerAddress,
        kin: Balance,
        memo: Option<&str>,
        passphrase: &str,
        callback: F,
    ) where
        F: FnOnce(Result<TransactionId, KinError>) + Send + 'static,
    {
        if let Err(e) = self.validate_payment(kin, memo) {
            return callback(Err(e));
        }
        let this = Arc::clone(self);
        let to = to.clone();
        let memo = memo.map(str::to_string);
        let passphrase = passphrase.to_string();
        self.ctx.dispatcher.spawn(async move {
            let result = this
                .send_transaction(&to, kin, memo.as_deref(), &passphrase)
                .await;
            callback(result);
        });
    }

    // -- Backup --------------------------------------------------------------

    /// Exports this account's key re-encrypted under `export_passphrase`.
    pub fn export_key_store(
        &self,
        passphrase: &str,
        export_passphrase: &str,
    ) -> Result<ExportedKey, KinError> {
        self.ensure_live()?;
        let record = self.key_record()?;
        let exported = record
            .export(passphrase, export_passphrase)
            .map_err(KinError::KeyStore)?;
        info!(index = self.index, address = %self.public_address, "key exported");
        Ok(exported)
    }
}

impl std::fmt::Debug for KinAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KinAccount")
            .field("index", &self.index)
            .field("public_address", &self.public_address)
            .field("deleted", &self.is_deleted())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KeyStoreConfig;
    use crate::gateway::{GatewayError, LocalLedger, PaymentError};
    use crate::keystore::{KeyStoreError, MemoryKeyStore};
    use crate::network::NetworkId;
    use rust_decimal::Decimal;
    use std::sync::mpsc;
    use std::time::Duration;

    struct Fixture {
        ledger: Arc<LocalLedger>,
        vault: Arc<MemoryKeyStore>,
        ctx: AccountContext,
    }

    fn fixture() -> Fixture {
        let ledger = Arc::new(LocalLedger::new(NetworkId::TestNet));
        let vault = Arc::new(MemoryKeyStore::with_config(KeyStoreConfig::insecure_fast()));
        let ctx = AccountContext {
            vault: vault.clone(),
            gateway: ledger.clone(),
            asset: ledger.asset().clone(),
            dispatcher: Arc::new(Dispatcher::new(None).unwrap()),
        };
        Fixture { ledger, vault, ctx }
    }

    fn account(fx: &Fixture, passphrase: &str) -> Arc<KinAccount> {
        let (position, record) = fx.vault.import_new_key(passphrase).unwrap();
        Arc::new(KinAccount::new(
            position,
            record.address(),
            position,
            fx.ctx.clone(),
        ))
    }

    fn kin(s: &str) -> Balance {
        s.parse::<Decimal>().unwrap()
    }

    #[tokio::test]
    async fn balance_before_activation_fails() {
        let fx = fixture();
        let acct = account(&fx, "p");
        let err = acct.balance().await.unwrap_err();
        assert!(matches!(
            err,
            KinError::BalanceQueryFailed(FailureCause::Ledger(GatewayError::AccountNotFound(_)))
        ));
    }

    #[tokio::test]
    async fn activation_then_zero_balance() {
        let fx = fixture();
        let acct = account(&fx, "p");
        acct.activate("p").await.unwrap();
        assert_eq!(acct.balance().await.unwrap(), Decimal::ZERO);
    }

    #[tokio::test]
    async fn activation_with_wrong_passphrase() {
        let fx = fixture();
        let acct = account(&fx, "p");
        let err = acct.activate("q").await.unwrap_err();
        assert_eq!(
            err,
            KinError::ActivationFailed(FailureCause::KeyStore(KeyStoreError::WrongPassphrase))
        );
    }

    #[tokio::test]
    async fn payment_validation_happens_first() {
        let fx = fixture();
        let acct = account(&fx, "p");
        let to = account(&fx, "q").public_address().clone();

        for bad in ["0", "-1", "0.00000001"] {
            assert_eq!(
                acct.send_transaction(&to, kin(bad), None, "p").await,
                Err(KinError::InvalidAmount)
            );
        }
        let memo = "m".repeat(MAX_MEMO_LENGTH + 1);
        assert_eq!(
            acct.send_transaction(&to, kin("1"), Some(&memo), "p").await,
            Err(KinError::InvalidMemo { max: 28 })
        );
        assert_eq!(fx.ledger.transaction_count(), 0);
    }

    #[tokio::test]
    async fn underfunded_payment_exposes_ledger_reason() {
        let fx = fixture();
        let a = account(&fx, "a");
        let b = account(&fx, "b");
        a.activate("a").await.unwrap();
        b.activate("b").await.unwrap();

        let err = a
            .send_transaction(b.public_address(), kin("1"), None, "a")
            .await
            .unwrap_err();
        assert_eq!(err.payment_error(), Some(PaymentError::Underfunded));
    }

    #[tokio::test]
    async fn deleted_handle_rejects_everything() {
        let fx = fixture();
        let acct = account(&fx, "p");
        acct.mark_deleted();
        let to = acct.public_address().clone();

        assert_eq!(acct.balance().await, Err(KinError::AccountDeleted));
        assert_eq!(acct.activate("p").await, Err(KinError::AccountDeleted));
        assert_eq!(
            acct.send_transaction(&to, kin("1"), None, "p").await,
            Err(KinError::AccountDeleted)
        );
        assert_eq!(
            acct.export_key_store("p", "e").unwrap_err(),
            KinError::AccountDeleted
        );
    }

    #[tokio::test]
    async fn missing_keystore_entry_is_inconsistent() {
        let fx = fixture();
        let acct = account(&fx, "p");
        fx.vault.remove_all().unwrap();
        assert_eq!(
            acct.activate("p").await,
            Err(KinError::InternalInconsistency)
        );
    }

    #[tokio::test]
    async fn moved_keystore_entry_is_found_again() {
        let fx = fixture();
        let first = account(&fx, "a");
        let second = account(&fx, "b");
        fx.vault.remove(first.index()).unwrap();
        // `second` was at position 1 and is now at 0.
        second.activate("b").await.unwrap();
        assert_eq!(second.vault_index.load(Ordering::Acquire), 0);
    }

    #[test]
    fn export_checks_passphrase() {
        let fx = fixture();
        let acct = account(&fx, "p");
        let exported = acct.export_key_store("p", "backup").unwrap();
        assert_eq!(&exported.address, acct.public_address());
        assert_eq!(
            acct.export_key_store("wrong", "backup").unwrap_err(),
            KinError::KeyStore(KeyStoreError::WrongPassphrase)
        );
    }

    #[test]
    fn blocking_variants_run_on_owned_runtime() {
        let fx = fixture();
        let acct = account(&fx, "p");
        acct.activate_blocking("p").unwrap();
        assert_eq!(acct.balance_blocking().unwrap(), Decimal::ZERO);
        fx.ledger
            .request_test_kin(acct.public_address(), 5)
            .unwrap();
        assert_eq!(acct.balance_blocking().unwrap(), kin("5"));
    }

    #[test]
    fn callback_delivers_local_errors_synchronously() {
        let fx = fixture();
        let acct = account(&fx, "p");
        let to = acct.public_address().clone();
        let (tx, rx) = mpsc::channel();
        acct.send_transaction_with_callback(&to, kin("0"), None, "p", move |r| {
            tx.send(r).unwrap();
        });
        // Already delivered: no waiting needed.
        assert_eq!(rx.try_recv().unwrap(), Err(KinError::InvalidAmount));
    }

    #[test]
    fn callback_delivers_network_result_once() {
        let fx = fixture();
        let acct = account(&fx, "p");
        acct.activate_blocking("p").unwrap();

        let (tx, rx) = mpsc::channel();
        acct.balance_with_callback(move |r| {
            tx.send(r).unwrap();
        });
        let result = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(result, Ok(Decimal::ZERO));
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    }
}
