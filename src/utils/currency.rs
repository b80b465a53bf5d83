//! Currency helpers for the gateway boundary.
//!
//! The domain keeps money as `BigDecimal` in major units (naira). The gateway
//! speaks integer minor units (kobo, 1 naira = 100 kobo), so conversion
//! happens only here.
use bigdecimal::{BigDecimal, RoundingMode};
use num_traits::{ToPrimitive, Zero};

/// Convert naira to kobo, rounding half-up to the nearest kobo.
pub fn to_minor_units(amount: &BigDecimal) -> Option<i64> {
    (amount * BigDecimal::from(100))
        .with_scale_round(0, RoundingMode::HalfUp)
        .to_i64()
}

/// Convert kobo to naira with two decimal places.
pub fn from_minor_units(kobo: i64) -> BigDecimal {
    (BigDecimal::from(kobo) / BigDecimal::from(100)).with_scale(2)
}

/// Platform fee and the company's net share for an escrowed amount.
pub fn split_platform_fee(amount: &BigDecimal, fee_percent: &BigDecimal) -> (BigDecimal, BigDecimal) {
    let fee = (amount * fee_percent / BigDecimal::from(100))
        .with_scale_round(2, RoundingMode::HalfUp);
    let net = amount - &fee;
    (fee, net)
}

pub fn is_positive(amount: &BigDecimal) -> bool {
    amount > &BigDecimal::zero()
}
