//! # Display Formatting
//!
//! Rounding rules for token and USD amounts shown next to messages and costs.

use primitive_types::U256;

use crate::domain::MAX_TOKEN_DECIMALS;

/// Render a base-unit amount as whole tokens with thousands separators.
///
/// Rounds half-up to the nearest whole token. Zero renders as `"0"`.
/// Past [`MAX_TOKEN_DECIMALS`] every amount is below half a token.
pub fn format_token_amount(amount: U256, decimals: u8) -> String {
    if decimals > MAX_TOKEN_DECIMALS {
        return "0".to_string();
    }
    let unit = U256::exp10(decimals as usize);
    let (mut whole, rem) = amount.div_mod(unit);
    if !rem.is_zero() && rem >= unit - rem {
        whole = whole.saturating_add(U256::one());
    }
    group_thousands(&whole.to_string())
}

/// Render the USD value of a base-unit amount.
///
/// `None` when the amount is zero or the price is absent or zero.
pub fn format_usd_value(amount: U256, decimals: u8, usd_per_token: Option<f64>) -> Option<String> {
    let price = usd_per_token.filter(|p| *p > 0.0)?;
    if amount.is_zero() {
        return None;
    }

    let value = to_token_f64(amount, decimals) * price;
    if value < 0.01 {
        Some("<$0.01".to_string())
    } else {
        Some(format!("~${value:.2}"))
    }
}

/// Lossy conversion of a base-unit amount to whole tokens.
pub fn to_token_f64(amount: U256, decimals: u8) -> f64 {
    let raw = amount.to_string().parse::<f64>().unwrap_or(f64::MAX);
    raw / 10f64.powi(i32::from(decimals))
}

fn group_thousands(digits: &str) -> String {
    let len = digits.len();
    let mut out = String::with_capacity(len + len / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(whole: u64) -> U256 {
        U256::from(whole) * U256::exp10(18)
    }

    #[test]
    fn test_zero_amount() {
        assert_eq!(format_token_amount(U256::zero(), 18), "0");
    }

    #[test]
    fn test_thousands_separators() {
        assert_eq!(format_token_amount(tokens(1_234_567), 18), "1,234,567");
        assert_eq!(format_token_amount(tokens(999), 18), "999");
        assert_eq!(format_token_amount(tokens(1_000), 18), "1,000");
    }

    #[test]
    fn test_rounds_half_up() {
        let half = U256::exp10(17) * U256::from(5u64);
        assert_eq!(format_token_amount(tokens(10) + half, 18), "11");
        assert_eq!(format_token_amount(tokens(10) + half - U256::one(), 18), "10");
    }

    #[test]
    fn test_oversized_decimals_do_not_panic() {
        assert_eq!(format_token_amount(U256::one(), 80), "0");
        assert_eq!(format_token_amount(U256::MAX, 255), "0");
        assert_eq!(format_token_amount(U256::exp10(77), MAX_TOKEN_DECIMALS), "1");
    }

    #[test]
    fn test_usd_value() {
        assert_eq!(format_usd_value(tokens(1_000), 18, Some(0.0025)), Some("~$2.50".to_string()));
    }

    #[test]
    fn test_usd_below_one_cent() {
        assert_eq!(format_usd_value(tokens(1), 18, Some(0.001)), Some("<$0.01".to_string()));
    }

    #[test]
    fn test_usd_absent_when_price_missing_or_zero() {
        assert_eq!(format_usd_value(tokens(1), 18, None), None);
        assert_eq!(format_usd_value(tokens(1), 18, Some(0.0)), None);
        assert_eq!(format_usd_value(U256::zero(), 18, Some(1.0)), None);
    }
}
