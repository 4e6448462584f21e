//! # Local Reference Ledger
//!
//! An in-process ledger with just enough rules to exercise the SDK end to
//! end: accounts with a native balance, a sequence number and per-asset
//! trustlines; a friendbot that creates accounts; signed envelopes; and
//! payments that fail with the same result codes a real ledger uses.
//!
//! ## Rules
//!
//! 1. The envelope's source must exist and its signature must verify
//!    against the network-scoped hash.
//! 2. `sequence` must be exactly the source's current sequence plus one.
//! 3. The fee must cover [`BASE_FEE_STROOPS`] per operation and is paid
//!    from the native balance.
//! 4. Operations apply all-or-nothing. A rejected transaction changes
//!    nothing, not even the sequence number.
//!
//! The issuer of the network's asset is implicit: it never needs an
//! account, and [`LocalLedger::issue`] mints directly into a trustline.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::{debug, info};

use super::envelope::{Operation, SignedEnvelope, TransactionBody};
use super::rpc::AccountInfo;
use super::{
    GatewayError, LedgerGateway, PaymentError, PaymentRequest, TransactionError, TransactionId,
};
use crate::address::{Asset, LedgerAddress};
use crate::config::{
    BASE_FEE_STROOPS, FRIENDBOT_STARTING_BALANCE, MAX_MEMO_LENGTH, MAX_TEST_KIN_GRANT,
    QUARKS_PER_KIN,
};
use crate::crypto::{sha256, KinKeypair};
use crate::network::NetworkId;

/// Largest amount a single trustline can hold.
pub const TRUSTLINE_LIMIT: u64 = i64::MAX as u64;

/// One account as the ledger sees it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerAccount {
    /// Native balance in stroops; pays fees.
    pub native: u64,
    pub sequence: u64,
    pub trustlines: HashMap<Asset, u64>,
}

#[derive(Debug, Default)]
struct LedgerState {
    accounts: HashMap<LedgerAddress, LedgerAccount>,
    /// Accepted transaction ids, oldest first.
    history: Vec<TransactionId>,
    mints: u64,
}

/// In-process ledger bound to one network.
#[derive(Debug)]
pub struct LocalLedger {
    network: NetworkId,
    asset: Asset,
    state: RwLock<LedgerState>,
}

impl LocalLedger {
    pub fn new(network: NetworkId) -> Self {
        let asset = network.asset();
        Self {
            network,
            asset,
            state: RwLock::new(LedgerState::default()),
        }
    }

    pub fn network_id(&self) -> &NetworkId {
        &self.network
    }

    /// The asset this ledger's issuer mints.
    pub fn asset(&self) -> &Asset {
        &self.asset
    }

    /// Snapshot of an account.
    pub fn account(&self, address: &LedgerAddress) -> Option<LedgerAccount> {
        self.state.read().accounts.get(address).cloned()
    }

    /// Account snapshot in wire form.
    pub fn account_info(&self, address: &LedgerAddress) -> Result<AccountInfo, GatewayError> {
        let account = self
            .account(address)
            .ok_or_else(|| GatewayError::AccountNotFound(address.clone()))?;
        Ok(AccountInfo::from_ledger(address.clone(), &account))
    }

    /// Number of accepted transactions.
    pub fn transaction_count(&self) -> usize {
        self.state.read().history.len()
    }

    // -- Friendbot & faucet --------------------------------------------------

    /// Creates `address` with the friendbot's starting balance.
    ///
    /// Funding an existing account is a no-op and returns `false`.
    pub fn fund(&self, address: &LedgerAddress) -> bool {
        let mut state = self.state.write();
        if state.accounts.contains_key(address) {
            return false;
        }
        state.accounts.insert(
            address.clone(),
            LedgerAccount {
                native: FRIENDBOT_STARTING_BALANCE,
                ..LedgerAccount::default()
            },
        );
        info!(%address, "friendbot funded account");
        true
    }

    /// Mints `quarks` of the ledger asset straight into `destination`.
    pub fn issue(
        &self,
        destination: &LedgerAddress,
        quarks: u64,
    ) -> Result<TransactionId, GatewayError> {
        if quarks == 0 {
            return Err(PaymentError::Malformed.into());
        }
        let mut state = self.state.write();
        let account = state
            .accounts
            .get_mut(destination)
            .ok_or(PaymentError::NoDestination)?;
        credit(account, &self.asset, quarks)?;

        state.mints += 1;
        let mut preimage = self.network.network_hash().to_vec();
        preimage.extend_from_slice(b"issue");
        preimage.extend_from_slice(destination.as_str().as_bytes());
        preimage.extend_from_slice(&quarks.to_be_bytes());
        preimage.extend_from_slice(&state.mints.to_be_bytes());
        let id = TransactionId::from_hash(sha256(&preimage));
        state.history.push(id.clone());

        info!(%destination, quarks, tx = %id, "issued");
        Ok(id)
    }

    /// Test faucet: grants whole `kin` to `destination`.
    ///
    /// Refused on the production network and above [`MAX_TEST_KIN_GRANT`].
    pub fn request_test_kin(
        &self,
        destination: &LedgerAddress,
        kin: u64,
    ) -> Result<TransactionId, GatewayError> {
        if self.network == NetworkId::MainNet {
            return Err(GatewayError::FaucetRefused(
                "no faucet on the main network".into(),
            ));
        }
        if kin == 0 || kin > MAX_TEST_KIN_GRANT {
            return Err(GatewayError::FaucetRefused(format!(
                "grant must be between 1 and {MAX_TEST_KIN_GRANT} KIN"
            )));
        }
        self.issue(destination, kin * QUARKS_PER_KIN)
    }

    // -- Transactions --------------------------------------------------------

    /// Next sequence number `address` must use.
    pub fn next_sequence(&self, address: &LedgerAddress) -> Result<u64, GatewayError> {
        self.account(address)
            .map(|a| a.sequence + 1)
            .ok_or_else(|| GatewayError::AccountNotFound(address.clone()))
    }

    /// Validates and applies a signed envelope.
    pub fn submit(&self, envelope: &SignedEnvelope) -> Result<TransactionId, GatewayError> {
        let body = &envelope.body;
        let id = envelope.id(&self.network)?;

        if let Some(memo) = &body.memo {
            if memo.len() > MAX_MEMO_LENGTH {
                return Err(TransactionError::Malformed(format!(
                    "memo longer than {MAX_MEMO_LENGTH} bytes"
                ))
                .into());
            }
        }
        if body.operations.is_empty() {
            return Err(TransactionError::Malformed("no operations".into()).into());
        }

        let mut state = self.state.write();

        let source = state
            .accounts
            .get(&body.source)
            .ok_or(TransactionError::NoAccount)?;
        if !envelope.verify(&self.network) {
            return Err(TransactionError::BadAuth.into());
        }
        if body.sequence != source.sequence + 1 {
            return Err(TransactionError::BadSequence {
                expected: source.sequence + 1,
                got: body.sequence,
            }
            .into());
        }
        let minimum = BASE_FEE_STROOPS * body.operations.len() as u64;
        if body.fee < minimum {
            return Err(TransactionError::InsufficientFee { minimum }.into());
        }
        if source.native < body.fee {
            return Err(TransactionError::InsufficientBalance.into());
        }

        // Apply to a scratch copy; commit only if every operation succeeds.
        let mut scratch = state.accounts.clone();
        self.apply(&mut scratch, body)?;
        state.accounts = scratch;
        state.history.push(id.clone());

        debug!(source = %body.source, sequence = body.sequence, tx = %id, "transaction applied");
        Ok(id)
    }

    fn apply(
        &self,
        accounts: &mut HashMap<LedgerAddress, LedgerAccount>,
        body: &TransactionBody,
    ) -> Result<(), GatewayError> {
        let source = accounts
            .get_mut(&body.source)
            .ok_or(TransactionError::NoAccount)?;
        source.sequence = body.sequence;
        source.native -= body.fee;

        for op in &body.operations {
            match op {
                Operation::ChangeTrust { asset } => {
                    if asset != &self.asset && !accounts.contains_key(&asset.issuer) {
                        return Err(TransactionError::Malformed(format!(
                            "asset {asset} has no issuer on this ledger"
                        ))
                        .into());
                    }
                    let source = accounts
                        .get_mut(&body.source)
                        .ok_or(TransactionError::NoAccount)?;
                    source.trustlines.entry(asset.clone()).or_insert(0);
                }
                Operation::Payment {
                    destination,
                    asset,
                    quarks,
                } => self.apply_payment(accounts, &body.source, destination, asset, *quarks)?,
            }
        }
        Ok(())
    }

    fn apply_payment(
        &self,
        accounts: &mut HashMap<LedgerAddress, LedgerAccount>,
        source: &LedgerAddress,
        destination: &LedgerAddress,
        asset: &Asset,
        quarks: u64,
    ) -> Result<(), GatewayError> {
        if quarks == 0 {
            return Err(PaymentError::Malformed.into());
        }
        if asset != &self.asset && !accounts.contains_key(&asset.issuer) {
            return Err(PaymentError::NoIssuer.into());
        }
        if !accounts.contains_key(destination) {
            return Err(PaymentError::NoDestination.into());
        }

        // The issuer sends from an unlimited supply and receives by burning.
        if source != &asset.issuer {
            let from = accounts
                .get_mut(source)
                .ok_or(TransactionError::NoAccount)?;
            let held = from
                .trustlines
                .get_mut(asset)
                .ok_or(PaymentError::SrcNoTrust)?;
            if *held < quarks {
                return Err(PaymentError::Underfunded.into());
            }
            *held -= quarks;
        }
        if destination != &asset.issuer {
            let to = accounts
                .get_mut(destination)
                .ok_or(PaymentError::NoDestination)?;
            credit(to, asset, quarks)?;
        }
        Ok(())
    }

    fn sign_and_submit(
        &self,
        signer: &KinKeypair,
        operations: Vec<Operation>,
        memo: Option<String>,
    ) -> Result<TransactionId, GatewayError> {
        let address = signer.address();
        let sequence = self.next_sequence(&address)?;
        let envelope =
            TransactionBody::new(address, sequence, operations, memo).sign(signer, &self.network)?;
        self.submit(&envelope)
    }
}

fn credit(account: &mut LedgerAccount, asset: &Asset, quarks: u64) -> Result<(), GatewayError> {
    let line = account
        .trustlines
        .get_mut(asset)
        .ok_or(PaymentError::NoTrust)?;
    let updated = line
        .checked_add(quarks)
        .filter(|v| *v <= TRUSTLINE_LIMIT)
        .ok_or(PaymentError::LineFull)?;
    *line = updated;
    Ok(())
}

#[async_trait]
impl LedgerGateway for LocalLedger {
    async fn balance(&self, address: &LedgerAddress, asset: &Asset) -> Result<u64, GatewayError> {
        let account = self
            .account(address)
            .ok_or_else(|| GatewayError::AccountNotFound(address.clone()))?;
        account
            .trustlines
            .get(asset)
            .copied()
            .ok_or_else(|| GatewayError::MissingTrustline(asset.clone()))
    }

    async fn fund_and_activate(
        &self,
        signer: &KinKeypair,
        asset: &Asset,
    ) -> Result<TransactionId, GatewayError> {
        self.fund(&signer.address());
        self.sign_and_submit(
            signer,
            vec![Operation::ChangeTrust {
                asset: asset.clone(),
            }],
            None,
        )
    }

    async fn submit_payment(
        &self,
        signer: &KinKeypair,
        request: PaymentRequest,
    ) -> Result<TransactionId, GatewayError> {
        self.sign_and_submit(
            signer,
            vec![Operation::Payment {
                destination: request.destination,
                asset: request.asset,
                quarks: request.quarks,
            }],
            request.memo,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> LocalLedger {
        LocalLedger::new(NetworkId::TestNet)
    }

    async fn activated(ledger: &LocalLedger) -> KinKeypair {
        let kp = KinKeypair::generate();
        ledger
            .fund_and_activate(&kp, &ledger.asset().clone())
            .await
            .unwrap();
        kp
    }

    fn pay(to: &KinKeypair, asset: &Asset, quarks: u64) -> PaymentRequest {
        PaymentRequest {
            destination: to.address(),
            asset: asset.clone(),
            quarks,
            memo: None,
        }
    }

    #[tokio::test]
    async fn unknown_account_has_no_balance() {
        let ledger = ledger();
        let kp = KinKeypair::generate();
        let err = ledger.balance(&kp.address(), ledger.asset()).await.unwrap_err();
        assert_eq!(err, GatewayError::AccountNotFound(kp.address()));
    }

    #[tokio::test]
    async fn funded_account_needs_trustline() {
        let ledger = ledger();
        let kp = KinKeypair::generate();
        assert!(ledger.fund(&kp.address()));
        assert!(!ledger.fund(&kp.address()));
        let err = ledger.balance(&kp.address(), ledger.asset()).await.unwrap_err();
        assert!(matches!(err, GatewayError::MissingTrustline(_)));
    }

    #[tokio::test]
    async fn activation_opens_trustline_and_charges_fee() {
        let ledger = ledger();
        let kp = activated(&ledger).await;
        assert_eq!(ledger.balance(&kp.address(), ledger.asset()).await.unwrap(), 0);

        let account = ledger.account(&kp.address()).unwrap();
        assert_eq!(account.sequence, 1);
        assert_eq!(account.native, FRIENDBOT_STARTING_BALANCE - BASE_FEE_STROOPS);
    }

    #[tokio::test]
    async fn payment_moves_exact_amount() {
        let ledger = ledger();
        let asset = ledger.asset().clone();
        let a = activated(&ledger).await;
        let b = activated(&ledger).await;
        ledger.issue(&a.address(), 100 * QUARKS_PER_KIN).unwrap();

        ledger
            .submit_payment(&a, pay(&b, &asset, 30 * QUARKS_PER_KIN))
            .await
            .unwrap();

        assert_eq!(
            ledger.balance(&a.address(), &asset).await.unwrap(),
            70 * QUARKS_PER_KIN
        );
        assert_eq!(
            ledger.balance(&b.address(), &asset).await.unwrap(),
            30 * QUARKS_PER_KIN
        );
    }

    #[tokio::test]
    async fn underfunded_payment_changes_nothing() {
        let ledger = ledger();
        let asset = ledger.asset().clone();
        let a = activated(&ledger).await;
        let b = activated(&ledger).await;
        let before = ledger.account(&a.address()).unwrap();

        let err = ledger.submit_payment(&a, pay(&b, &asset, 1)).await.unwrap_err();
        assert_eq!(err.payment_error(), Some(PaymentError::Underfunded));
        assert_eq!(ledger.account(&a.address()).unwrap(), before);
    }

    #[tokio::test]
    async fn payment_to_missing_or_untrusting_destination() {
        let ledger = ledger();
        let asset = ledger.asset().clone();
        let a = activated(&ledger).await;
        ledger.issue(&a.address(), 10).unwrap();

        let ghost = KinKeypair::generate();
        let err = ledger.submit_payment(&a, pay(&ghost, &asset, 1)).await.unwrap_err();
        assert_eq!(err.payment_error(), Some(PaymentError::NoDestination));

        ledger.fund(&ghost.address());
        let err = ledger.submit_payment(&a, pay(&ghost, &asset, 1)).await.unwrap_err();
        assert_eq!(err.payment_error(), Some(PaymentError::NoTrust));
    }

    #[tokio::test]
    async fn source_without_trustline() {
        let ledger = ledger();
        let asset = ledger.asset().clone();
        let a = KinKeypair::generate();
        ledger.fund(&a.address());
        let b = activated(&ledger).await;
        let err = ledger.submit_payment(&a, pay(&b, &asset, 1)).await.unwrap_err();
        assert_eq!(err.payment_error(), Some(PaymentError::SrcNoTrust));
    }

    #[tokio::test]
    async fn stale_sequence_is_rejected() {
        let ledger = ledger();
        let a = activated(&ledger).await;
        let body = TransactionBody::new(
            a.address(),
            1,
            vec![Operation::ChangeTrust {
                asset: ledger.asset().clone(),
            }],
            None,
        );
        let env = body.sign(&a, ledger.network_id()).unwrap();
        let err = ledger.submit(&env).unwrap_err();
        assert_eq!(
            err,
            GatewayError::Transaction(TransactionError::BadSequence {
                expected: 2,
                got: 1
            })
        );
    }

    #[tokio::test]
    async fn envelope_signed_for_other_network_is_rejected() {
        let ledger = ledger();
        let a = activated(&ledger).await;
        let body = TransactionBody::new(
            a.address(),
            2,
            vec![Operation::ChangeTrust {
                asset: ledger.asset().clone(),
            }],
            None,
        );
        let env = body.sign(&a, &NetworkId::MainNet).unwrap();
        assert_eq!(
            ledger.submit(&env).unwrap_err(),
            GatewayError::Transaction(TransactionError::BadAuth)
        );
    }

    #[tokio::test]
    async fn overlong_memo_is_malformed() {
        let ledger = ledger();
        let asset = ledger.asset().clone();
        let a = activated(&ledger).await;
        let b = activated(&ledger).await;
        ledger.issue(&a.address(), 10).unwrap();
        let mut req = pay(&b, &asset, 1);
        req.memo = Some("x".repeat(MAX_MEMO_LENGTH + 1));
        let err = ledger.submit_payment(&a, req).await.unwrap_err();
        assert!(matches!(
            err,
            GatewayError::Transaction(TransactionError::Malformed(_))
        ));
    }

    #[test]
    fn faucet_refused_on_main_net() {
        let ledger = LocalLedger::new(NetworkId::MainNet);
        let kp = KinKeypair::generate();
        ledger.fund(&kp.address());
        assert!(matches!(
            ledger.request_test_kin(&kp.address(), 10),
            Err(GatewayError::FaucetRefused(_))
        ));
    }

    #[tokio::test]
    async fn faucet_grants_whole_kin() {
        let ledger = ledger();
        let kp = activated(&ledger).await;
        ledger.request_test_kin(&kp.address(), 100).unwrap();
        assert_eq!(
            ledger.balance(&kp.address(), ledger.asset()).await.unwrap(),
            100 * QUARKS_PER_KIN
        );
        assert!(ledger
            .request_test_kin(&kp.address(), MAX_TEST_KIN_GRANT + 1)
            .is_err());
    }

    #[tokio::test]
    async fn trustline_limit_is_enforced() {
        let ledger = ledger();
        let kp = activated(&ledger).await;
        ledger.issue(&kp.address(), TRUSTLINE_LIMIT).unwrap();
        assert_eq!(
            ledger.issue(&kp.address(), 1).unwrap_err(),
            GatewayError::Payment(PaymentError::LineFull)
        );
    }
}
