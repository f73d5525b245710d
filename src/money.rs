use crate::error::{AppError, AppResult};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;

/// Largest absolute amount accepted from user input: 999,999,999.99.
pub const MAX_ABS_CENTS: i64 = 99_999_999_999;

/// Parses user-entered money ("12.34", "-5", "$1,250.00") into cents.
pub fn parse_cents(input: &str) -> AppResult<i64> {
    let cleaned: String = input
        .trim()
        .chars()
        .filter(|c| !matches!(c, ',' | '$' | '€' | '£' | ' '))
        .collect();

    if cleaned.is_empty() {
        return Err(AppError::validation("Amount is required"));
    }

    let amount = Decimal::from_str(&cleaned).map_err(|_| {
        AppError::validation(format!(
            "Invalid amount format {}. Please provide a valid decimal number.",
            input.trim()
        ))
    })?;

    if amount.normalize().scale() > 2 {
        return Err(AppError::validation(format!(
            "Amount {} has more than two decimal places",
            input.trim()
        )));
    }

    let cents = (amount * Decimal::ONE_HUNDRED)
        .to_i64()
        .filter(|c| c.abs() <= MAX_ABS_CENTS)
        .ok_or_else(|| AppError::validation(format!("Amount {} is too large", input.trim())))?;

    Ok(cents)
}

pub fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

pub fn format_money(cents: i64, symbol: &str) -> String {
    let abs = cents.unsigned_abs();
    let sign = if cents < 0 { "-" } else { "" };
    format!("{}{}{}.{:02}", sign, symbol, abs / 100, abs % 100)
}

/// `part` as a percentage of `whole`, to one decimal. Zero when `whole` is
/// not positive.
pub fn percent_of(part: i64, whole: i64) -> Decimal {
    if whole <= 0 {
        return Decimal::ZERO;
    }
    (Decimal::from(part) * Decimal::ONE_HUNDRED / Decimal::from(whole)).round_dp(1)
}

/// Rounds a fractional cent value half away from zero.
pub fn round_cents(value: Decimal) -> i64 {
    value
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .unwrap_or(if value.is_sign_negative() { i64::MIN } else { i64::MAX })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cents_plain_and_decorated() {
        assert_eq!(parse_cents("12.34").unwrap(), 1234);
        assert_eq!(parse_cents("5").unwrap(), 500);
        assert_eq!(parse_cents("0.5").unwrap(), 50);
        assert_eq!(parse_cents("-7.05").unwrap(), -705);
        assert_eq!(parse_cents("$1,250.00").unwrap(), 125_000);
        assert_eq!(parse_cents(" 3.10 ").unwrap(), 310);
    }

    #[test]
    fn test_parse_cents_rejects_sub_cent_precision() {
        let err = parse_cents("1.005").unwrap_err();
        assert!(err.to_string().contains("more than two decimal places"));
        // trailing zeros are not extra precision
        assert_eq!(parse_cents("1.500").unwrap(), 150);
    }

    #[test]
    fn test_parse_cents_boundaries() {
        assert_eq!(parse_cents("999999999.99").unwrap(), MAX_ABS_CENTS);
        assert!(parse_cents("1000000000.00").is_err());
        assert!(parse_cents("").is_err());
        assert!(parse_cents("abc").unwrap_err().to_string().contains("Invalid amount"));
    }

    #[test]
    fn test_format_cents() {
        assert_eq!(format_cents(1234), "12.34");
        assert_eq!(format_cents(-5), "-0.05");
        assert_eq!(format_cents(0), "0.00");
        assert_eq!(format_money(-1999, "$"), "-$19.99");
        assert_eq!(format_money(i64::MIN, "$"), "-$92233720368547758.08");
        assert_eq!(format_money(i64::MAX, "€"), "€92233720368547758.07");
    }

    #[test]
    fn test_percent_of() {
        assert_eq!(percent_of(250, 1000), Decimal::new(250, 1));
        assert_eq!(percent_of(1, 3), Decimal::new(333, 1));
        assert_eq!(percent_of(500, 0), Decimal::ZERO);
        assert_eq!(percent_of(500, -100), Decimal::ZERO);
    }

    #[test]
    fn test_round_cents_half_away_from_zero() {
        assert_eq!(round_cents(Decimal::new(25, 1)), 3);
        assert_eq!(round_cents(Decimal::new(-25, 1)), -3);
        assert_eq!(round_cents(Decimal::new(24, 1)), 2);
    }
}
