//! # SDK Errors
//!
//! [`KinError`] is the single error type account and client operations
//! return. Keystore and gateway errors never escape on their own: they are
//! wrapped as the [`FailureCause`] of the operation that hit them, so the
//! variant says *what* failed and the cause says *why*.

use thiserror::Error;

use crate::gateway::{GatewayError, PaymentError};
use crate::keystore::KeyStoreError;

/// The collaborator error behind a failed operation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FailureCause {
    #[error("keystore: {0}")]
    KeyStore(#[from] KeyStoreError),

    #[error("ledger: {0}")]
    Ledger(#[from] GatewayError),
}

/// Errors returned by [`KinAccount`](crate::KinAccount),
/// [`KinAccounts`](crate::KinAccounts) and [`KinClient`](crate::KinClient).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KinError {
    #[error("account creation failed: {0}")]
    AccountCreationFailed(FailureCause),

    #[error("account deletion failed: {0}")]
    AccountDeletionFailed(FailureCause),

    #[error("account activation failed: {0}")]
    ActivationFailed(FailureCause),

    #[error("payment failed: {0}")]
    PaymentFailed(FailureCause),

    #[error("balance query failed: {0}")]
    BalanceQueryFailed(FailureCause),

    /// Zero, negative, or finer than one quark.
    #[error("invalid amount")]
    InvalidAmount,

    #[error("memo is longer than {max} bytes")]
    InvalidMemo { max: usize },

    /// The account was deleted; the handle is permanently unusable.
    #[error("account has been deleted")]
    AccountDeleted,

    /// The handle's keystore entry vanished or changed underneath it.
    #[error("internal inconsistency")]
    InternalInconsistency,

    /// Keystore failure outside the operations above (key export).
    #[error("keystore error: {0}")]
    KeyStore(KeyStoreError),

    #[error("unknown error")]
    Unknown,
}

impl KinError {
    /// The ledger's payment result code, if the ledger rejected a payment.
    pub fn payment_error(&self) -> Option<PaymentError> {
        match self {
            KinError::PaymentFailed(FailureCause::Ledger(e)) => e.payment_error(),
            _ => None,
        }
    }

    /// The wrapped collaborator error, if any.
    pub fn cause(&self) -> Option<&FailureCause> {
        match self {
            KinError::AccountCreationFailed(c)
            | KinError::AccountDeletionFailed(c)
            | KinError::ActivationFailed(c)
            | KinError::PaymentFailed(c)
            | KinError::BalanceQueryFailed(c) => Some(c),
            _ => None,
        }
    }
}

/// Errors building a [`KinClient`](crate::KinClient).
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid endpoint {url:?}: {reason}")]
    InvalidEndpoint { url: String, reason: String },

    #[error("keystore unavailable: {0}")]
    KeyStore(#[from] KeyStoreError),

    #[error("could not start runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payment_error_is_reachable_from_kin_error() {
        let err = KinError::PaymentFailed(FailureCause::Ledger(GatewayError::Payment(
            PaymentError::Underfunded,
        )));
        assert_eq!(err.payment_error(), Some(PaymentError::Underfunded));
        assert_eq!(KinError::InvalidAmount.payment_error(), None);
    }

    #[test]
    fn balance_failures_do_not_expose_payment_codes() {
        let err = KinError::BalanceQueryFailed(FailureCause::Ledger(GatewayError::Payment(
            PaymentError::Underfunded,
        )));
        assert_eq!(err.payment_error(), None);
        assert!(err.cause().is_some());
    }

    #[test]
    fn messages_name_the_operation_and_cause() {
        let err = KinError::AccountDeletionFailed(KeyStoreError::WrongPassphrase.into());
        let msg = err.to_string();
        assert!(msg.starts_with("account deletion failed"));
        assert!(msg.contains("passphrase"));
        assert_eq!(
            KinError::InvalidMemo { max: 28 }.to_string(),
            "memo is longer than 28 bytes"
        );
    }
}
