//! # Kin Amounts
//!
//! Callers deal in decimal Kin ([`Balance`]); the ledger deals in quarks,
//! the smallest unit, 10^-7 Kin. The conversion is exact: an amount with
//! more than seven fractional digits has no quark representation and is
//! rejected rather than rounded.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::config::{KIN_DECIMALS, QUARKS_PER_KIN};

/// A Kin quantity as seen by callers.
pub type Balance = Decimal;

/// Converts a quark count into Kin.
pub fn quarks_to_kin(quarks: u64) -> Balance {
    Decimal::from_i128_with_scale(quarks as i128, KIN_DECIMALS).normalize()
}

/// Converts a Kin amount into quarks.
///
/// Returns `None` for negative amounts, amounts with more than
/// [`KIN_DECIMALS`] fractional digits, and amounts that overflow `u64`.
pub fn kin_to_quarks(kin: Balance) -> Option<u64> {
    if kin.is_sign_negative() && !kin.is_zero() {
        return None;
    }
    let scaled = kin.checked_mul(Decimal::from(QUARKS_PER_KIN))?;
    if !scaled.fract().is_zero() {
        return None;
    }
    scaled.to_u64()
}
