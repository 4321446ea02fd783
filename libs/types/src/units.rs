//! Exact base-unit conversion helpers
//!
//! Contract-visible amounts are 256-bit unsigned integers in token base
//! units. Conversion from display strings goes through `rust_decimal` so no
//! precision is lost on the way in; conversion back to `f64` is only used
//! for engine-side display state.

use crate::errors::ValidationError;
use alloy_primitives::U256;
use rust_decimal::prelude::*;
use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;

/// Parse a display amount string into base units at the given scale
///
/// Rejects negative values and values with more fractional digits than the
/// token's decimals.
pub fn parse_units(amount: &str, decimals: u8) -> Result<U256, ValidationError> {
    let value = Decimal::from_str(amount.trim())
        .map_err(|_| ValidationError::InvalidAmount(format!("unparseable amount: {amount}")))?;
    decimal_to_units(value, decimals)
}

/// Convert an `f64` into base units, rounding half-up at the token's scale
pub fn f64_to_units(value: f64, decimals: u8) -> Result<U256, ValidationError> {
    let decimal = Decimal::from_f64_retain(value)
        .ok_or_else(|| ValidationError::InvalidAmount(format!("non-finite amount: {value}")))?;
    let rounded =
        decimal.round_dp_with_strategy(decimals as u32, RoundingStrategy::MidpointAwayFromZero);
    decimal_to_units(rounded, decimals)
}

fn decimal_to_units(value: Decimal, decimals: u8) -> Result<U256, ValidationError> {
    if value.is_sign_negative() {
        return Err(ValidationError::InvalidAmount(format!(
            "amount must not be negative: {value}"
        )));
    }
    let value = value.normalize();
    if value.scale() > decimals as u32 {
        return Err(ValidationError::InvalidAmount(format!(
            "amount {value} has more than {decimals} fractional digits"
        )));
    }

    let mantissa = U256::from(value.mantissa().unsigned_abs());
    let shift = decimals as u32 - value.scale();
    mantissa
        .checked_mul(U256::from(10u64).pow(U256::from(shift)))
        .ok_or_else(|| ValidationError::AmountOverflow(value.to_string()))
}

/// Render base units as a display string, trimming trailing zeros
pub fn format_units(value: U256, decimals: u8) -> String {
    if decimals == 0 {
        return value.to_string();
    }
    let scale = U256::from(10u64).pow(U256::from(decimals as u64));
    let integral = value / scale;
    let fractional = value % scale;
    if fractional.is_zero() {
        return integral.to_string();
    }
    let frac = format!("{fractional:0>width$}", width = decimals as usize);
    format!("{integral}.{}", frac.trim_end_matches('0'))
}

/// Lossy conversion of a 256-bit integer to `f64`
pub fn u256_to_f64(value: U256) -> f64 {
    value
        .as_limbs()
        .iter()
        .enumerate()
        .map(|(i, limb)| (*limb as f64) * 2f64.powi(64 * i as i32))
        .sum()
}

/// Base units → display amount as `f64` (engine-side state only)
pub fn display_units(value: U256, decimals: u8) -> f64 {
    u256_to_f64(value) / 10f64.powi(decimals as i32)
}
