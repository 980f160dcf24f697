//! Exact fixed-point conversion between token base units and decimal strings.
//!
//! All integer math happens on U256; the float bridge (`to_f64`) exists only
//! for USD/APR arithmetic and goes through the exact decimal string first.

use alloy_primitives::U256;
use thiserror::Error;

/// A user-supplied amount that cannot be turned into base units.
///
/// Every variant is the same error kind from the caller's point of view:
/// the requested action is aborted before any on-chain call, never retried.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AmountError {
    #[error("amount is empty")]
    Empty,

    #[error("amount is not a decimal number")]
    NotANumber,

    #[error("amount must be greater than zero")]
    NotPositive,

    #[error("amount has more than {decimals} fractional digits")]
    TooPrecise { decimals: u8 },

    #[error("amount is too large")]
    Overflow,
}

/// 10^decimals as a U256 scale factor.
pub fn scale_factor(decimals: u8) -> U256 {
    U256::from(10u64).pow(U256::from(decimals))
}

/// Convert base units to an exact decimal string (e.g. 1_500_000 at 6 -> "1.5").
///
/// Trailing fractional zeros are trimmed; a whole number has no decimal point.
pub fn format_base_units(value: U256, decimals: u8) -> String {
    if decimals == 0 {
        return value.to_string();
    }

    let scale = scale_factor(decimals);
    let int_part = value / scale;
    let frac_part = value % scale;

    if frac_part.is_zero() {
        return int_part.to_string();
    }

    let frac = format!("{:0>width$}", frac_part, width = decimals as usize);
    let frac = frac.trim_end_matches('0');
    format!("{}.{}", int_part, frac)
}

/// Format base units for display, truncating (never rounding) the fraction
/// to `display_decimals` digits.
///
/// A non-zero value that would truncate to all zeros renders as a
/// `<0.000001`-style placeholder so a small balance never displays as "0".
pub fn format_display(value: U256, decimals: u8, display_decimals: u8) -> String {
    if value.is_zero() {
        return "0".to_string();
    }

    let scale = scale_factor(decimals);
    let int_part = value / scale;
    let frac_part = value % scale;

    let shown = if decimals == 0 || display_decimals == 0 {
        String::new()
    } else {
        let full = format!("{:0>width$}", frac_part, width = decimals as usize);
        let cut = (display_decimals as usize).min(full.len());
        full[..cut].trim_end_matches('0').to_string()
    };

    if int_part.is_zero() && shown.is_empty() {
        // Value is below the display resolution.
        return smallest_displayable(display_decimals);
    }

    if shown.is_empty() {
        int_part.to_string()
    } else {
        format!("{}.{}", int_part, shown)
    }
}

fn smallest_displayable(display_decimals: u8) -> String {
    if display_decimals == 0 {
        return "<1".to_string();
    }
    let mut s = String::from("<0.");
    for _ in 1..display_decimals {
        s.push('0');
    }
    s.push('1');
    s
}

/// Parse a decimal string into base units. Exact inverse of
/// [`format_base_units`] for strings with at most `decimals` fractional digits.
pub fn parse_base_units(input: &str, decimals: u8) -> Result<U256, AmountError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(AmountError::Empty);
    }

    let (int_str, frac_str) = match input.split_once('.') {
        Some((i, f)) => (i, f),
        None => (input, ""),
    };

    if int_str.is_empty() && frac_str.is_empty() {
        return Err(AmountError::NotANumber);
    }
    if !int_str.bytes().all(|b| b.is_ascii_digit())
        || !frac_str.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(AmountError::NotANumber);
    }
    if frac_str.len() > decimals as usize {
        return Err(AmountError::TooPrecise { decimals });
    }

    let int_part = if int_str.is_empty() {
        U256::ZERO
    } else {
        U256::from_str_radix(int_str, 10).map_err(|_| AmountError::Overflow)?
    };
    let frac_part = if frac_str.is_empty() {
        U256::ZERO
    } else {
        U256::from_str_radix(frac_str, 10).map_err(|_| AmountError::Overflow)?
    };

    let frac_scale = scale_factor(decimals - frac_str.len() as u8);
    let scaled_int = int_part
        .checked_mul(scale_factor(decimals))
        .ok_or(AmountError::Overflow)?;
    let scaled_frac = frac_part
        .checked_mul(frac_scale)
        .ok_or(AmountError::Overflow)?;

    scaled_int.checked_add(scaled_frac).ok_or(AmountError::Overflow)
}

/// Parse a transaction amount: same as [`parse_base_units`] but zero is
/// rejected as well.
pub fn parse_positive_base_units(input: &str, decimals: u8) -> Result<U256, AmountError> {
    let value = parse_base_units(input, decimals)?;
    if value.is_zero() {
        return Err(AmountError::NotPositive);
    }
    Ok(value)
}

/// Lossy conversion to f64 for USD math, via the exact decimal string.
pub fn to_f64(value: U256, decimals: u8) -> f64 {
    format_base_units(value, decimals).parse().unwrap_or(0.0)
}

// ============================================
// TESTS
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    fn u(n: u128) -> U256 {
        U256::from(n)
    }

    #[test]
    fn test_format_whole_and_fraction() {
        assert_eq!(format_base_units(u(2_000_000_000_000_000_000_000), 18), "2000");
        assert_eq!(format_base_units(u(1_500_000), 6), "1.5");
        assert_eq!(format_base_units(u(1), 18), "0.000000000000000001");
        assert_eq!(format_base_units(U256::ZERO, 18), "0");
        assert_eq!(format_base_units(u(42), 0), "42");
    }

    #[test]
    fn test_round_trip() {
        let cases: [(u128, u8); 6] = [
            (0, 18),
            (1, 18),
            (1_000_000_000_000_000_000, 18),
            (123_456_789, 6),
            (987_654_321_000, 8),
            (5, 0),
        ];
        for (v, d) in cases {
            let s = format_base_units(u(v), d);
            assert_eq!(parse_base_units(&s, d), Ok(u(v)), "round trip {s} @ {d}");
        }
    }

    #[test]
    fn test_parse_forms() {
        assert_eq!(parse_base_units("2.0", 18), Ok(u(2_000_000_000_000_000_000)));
        assert_eq!(parse_base_units(".5", 6), Ok(u(500_000)));
        assert_eq!(parse_base_units("5.", 6), Ok(u(5_000_000)));
        assert_eq!(parse_base_units(" 1 ", 2), Ok(u(100)));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(parse_base_units("", 18), Err(AmountError::Empty));
        assert_eq!(parse_base_units("   ", 18), Err(AmountError::Empty));
        assert_eq!(parse_base_units("abc", 18), Err(AmountError::NotANumber));
        assert_eq!(parse_base_units("1.2.3", 18), Err(AmountError::NotANumber));
        assert_eq!(parse_base_units("-1", 18), Err(AmountError::NotANumber));
        assert_eq!(parse_base_units("1e18", 18), Err(AmountError::NotANumber));
        assert_eq!(parse_base_units(".", 18), Err(AmountError::NotANumber));
        assert_eq!(
            parse_base_units("0.1234567", 6),
            Err(AmountError::TooPrecise { decimals: 6 })
        );
    }

    #[test]
    fn test_positive_amount_required() {
        assert_eq!(parse_positive_base_units("0", 18), Err(AmountError::NotPositive));
        assert_eq!(parse_positive_base_units("0.0", 18), Err(AmountError::NotPositive));
        assert_eq!(parse_positive_base_units("0.1", 6), Ok(u(100_000)));
    }

    #[test]
    fn test_display_truncates_not_rounds() {
        // 1.9999999 at 6 display decimals must not round up to 2
        let v = u(1_999_999_900_000_000_000);
        assert_eq!(format_display(v, 18, 6), "1.999999");
    }

    #[test]
    fn test_display_dust_placeholder() {
        // 1 wei is non-zero but invisible at 6 decimals
        assert_eq!(format_display(u(1), 18, 6), "<0.000001");
        assert_eq!(format_display(u(999_999_999_999), 18, 6), "<0.000001");
        // zero stays "0" - only *vanishing* non-zero values get the placeholder
        assert_eq!(format_display(U256::ZERO, 18, 6), "0");
        // at the resolution boundary the real digits win
        assert_eq!(format_display(u(1_000_000_000_000), 18, 6), "0.000001");
    }

    #[test]
    fn test_display_trims_trailing_zeros() {
        assert_eq!(format_display(u(2_000_000_000_000_000_000), 18, 6), "2");
        assert_eq!(format_display(u(2_500_000_000_000_000_000), 18, 6), "2.5");
    }

    #[test]
    fn test_to_f64() {
        assert_eq!(to_f64(u(2_000_000_000_000_000_000_000), 18), 2000.0);
        assert_eq!(to_f64(u(1_500_000), 6), 1.5);
    }
}
