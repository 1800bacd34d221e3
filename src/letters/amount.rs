//! Permissive amount parsing.
//!
//! Missing, negative, or unparseable amounts become zero instead of failing
//! the request.

use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::Decimal;

/// Accepts `75000`, `75,000.50`, `Rs. 75,000`, `INR 75000`, `Amount: 75,000`.
static AMOUNT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:(?:amount|rs\.?|inr)\s*:?\s*)?([\d,]+(?:\.\d+)?)\s*$")
        .expect("amount pattern is valid")
});

/// Parse a JSON amount field.
pub fn parse_amount(value: &serde_json::Value) -> Decimal {
    let parsed = match value {
        serde_json::Value::Number(n) => Decimal::from_str(&n.to_string())
            .or_else(|_| Decimal::from_scientific(&n.to_string()))
            .ok(),
        serde_json::Value::String(s) => Some(parse_amount_str(s)),
        _ => None,
    };
    non_negative(parsed.unwrap_or(Decimal::ZERO))
}

/// Parse a free-text amount.
pub fn parse_amount_str(raw: &str) -> Decimal {
    let Some(caps) = AMOUNT_PATTERN.captures(raw) else {
        return Decimal::ZERO;
    };
    let digits = caps[1].replace(',', "");
    non_negative(Decimal::from_str(&digits).unwrap_or(Decimal::ZERO))
}

fn non_negative(amount: Decimal) -> Decimal {
    if amount.is_sign_negative() {
        Decimal::ZERO
    } else {
        amount
    }
}
