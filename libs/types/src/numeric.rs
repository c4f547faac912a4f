//! Base-unit amounts and checked fixed-point arithmetic
//!
//! Amounts are unsigned integers in an asset's smallest unit. The settlement
//! asset always uses 18 fractional digits; input assets carry their own
//! precision. Every helper here is checked: overflow is an error, never a wrap.

use crate::errors::MathError;

/// An amount in an asset's base units.
pub type Amount = u128;

/// Fractional digits of the settlement asset's canonical unit.
pub const SETTLEMENT_DECIMALS: u8 = 18;

/// Largest exponent for which `10^exp` fits an `Amount`.
pub const MAX_POW10_EXP: u32 = 38;

/// `10^exp`, or `Overflow` when it does not fit.
pub fn pow10(exp: u32) -> Result<Amount, MathError> {
    10u128.checked_pow(exp).ok_or(MathError::Overflow)
}

/// `a * b / denominator`, rounding down.
///
/// The multiplication is checked before it happens; a product that does not
/// fit is reported as `Overflow`.
pub fn mul_div(a: Amount, b: Amount, denominator: Amount) -> Result<Amount, MathError> {
    if denominator == 0 {
        return Err(MathError::DivisionByZero);
    }
    let product = a.checked_mul(b).ok_or(MathError::Overflow)?;
    Ok(product / denominator)
}

/// `whole * 10^decimals`: a whole-unit quantity expressed in base units.
pub fn units(whole: u64, decimals: u8) -> Result<Amount, MathError> {
    (whole as Amount)
        .checked_mul(pow10(decimals as u32)?)
        .ok_or(MathError::Overflow)
}

/// Checked addition reporting `Overflow`.
pub fn checked_add(a: Amount, b: Amount) -> Result<Amount, MathError> {
    a.checked_add(b).ok_or(MathError::Overflow)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_pow10_bounds() {
        assert_eq!(pow10(0), Ok(1));
        assert_eq!(pow10(18), Ok(1_000_000_000_000_000_000));
        assert!(pow10(MAX_POW10_EXP).is_ok());
        assert_eq!(pow10(MAX_POW10_EXP + 1), Err(MathError::Overflow));
    }

    #[test]
    fn test_mul_div_rounds_down() {
        assert_eq!(mul_div(10, 3, 4), Ok(7));
        assert_eq!(mul_div(0, 5, 7), Ok(0));
    }

    #[test]
    fn test_mul_div_rejects_overflow_before_dividing() {
        // The quotient would fit, the intermediate product does not.
        assert_eq!(mul_div(u128::MAX, 2, 4), Err(MathError::Overflow));
    }

    #[test]
    fn test_mul_div_zero_denominator() {
        assert_eq!(mul_div(1, 1, 0), Err(MathError::DivisionByZero));
    }

    #[test]
    fn test_units() {
        assert_eq!(units(2000, 6), Ok(2_000_000_000));
        assert_eq!(units(1, SETTLEMENT_DECIMALS), Ok(1_000_000_000_000_000_000));
    }

    proptest! {
        #[test]
        fn prop_mul_div_matches_wide_arithmetic(
            a in 0u64..u64::MAX,
            b in 0u64..u64::MAX,
            d in 1u64..u64::MAX,
        ) {
            let expected = (a as u128) * (b as u128) / (d as u128);
            prop_assert_eq!(mul_div(a as u128, b as u128, d as u128), Ok(expected));
        }
    }
}
