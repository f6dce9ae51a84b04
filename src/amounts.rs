//! Display formatting for fixed-point chain amounts.

use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};

use crate::config::{ARDOR_DECIMALS, WEI_DECIMALS};

const WEI_MIN_FRACTION_DIGITS: u32 = 2;
const WEI_MAX_FRACTION_DIGITS: u32 = 6;
const MAX_DECIMAL_SCALE: u32 = 28;

/// Parse `raw` (decimal, `0x` hex or scientific notation) and divide it by
/// `10^decimals` without going through floating point.
pub fn scaled_decimal(raw: &str, decimals: u32) -> Option<Decimal> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    let mut value = if let Some(hex) = s.strip_prefix("0x") {
        let n = i128::from_str_radix(hex, 16).ok()?;
        Decimal::try_from_i128_with_scale(n, 0).ok()?
    } else if s.contains(['e', 'E']) {
        Decimal::from_scientific(s).ok()?
    } else {
        Decimal::from_str(s).ok()?
    };

    let max_scale = MAX_DECIMAL_SCALE.saturating_sub(decimals);
    if value.scale() > max_scale {
        value = value.round_dp(max_scale);
    }
    value.set_scale(value.scale() + decimals).ok()?;
    Some(value)
}

pub fn wei_to_decimal(raw: &str) -> Option<Decimal> {
    scaled_decimal(raw, WEI_DECIMALS)
}

/// Format a fixed-point amount with `,` grouping and no trailing zeros.
/// Absent, empty and zero inputs render as `"0"`; unparseable input is echoed back.
pub fn format_amount(raw: Option<&str>, decimals: u32) -> String {
    let Some(s) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return "0".to_string();
    };
    match scaled_decimal(s, decimals) {
        Some(value) => format_decimal(value.normalize()),
        None => s.to_string(),
    }
}

/// [`format_amount`] with the Ardor default of 8 decimals.
pub fn format_nqt(raw: Option<&str>) -> String {
    format_amount(raw, ARDOR_DECIMALS)
}

/// Wei → display string with 2 to 6 fractional digits (truncated, not rounded).
pub fn format_wei(raw: Option<&str>) -> String {
    let Some(s) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return "0".to_string();
    };
    match wei_to_decimal(s) {
        Some(value) => format_decimal(bounded_fraction(value)),
        None => s.to_string(),
    }
}

/// Sum several wei amounts, skipping unparseable ones.
pub fn sum_wei<'a>(amounts: impl IntoIterator<Item = &'a str>) -> Decimal {
    amounts
        .into_iter()
        .filter_map(wei_to_decimal)
        .fold(Decimal::ZERO, |acc, v| acc + v)
}

/// Render an already-scaled wei total the same way [`format_wei`] does.
pub fn format_wei_decimal(value: Decimal) -> String {
    format_decimal(bounded_fraction(value))
}

fn bounded_fraction(value: Decimal) -> Decimal {
    let mut v = value
        .round_dp_with_strategy(WEI_MAX_FRACTION_DIGITS, RoundingStrategy::ToZero)
        .normalize();
    if v.scale() < WEI_MIN_FRACTION_DIGITS {
        v.rescale(WEI_MIN_FRACTION_DIGITS);
    }
    v
}

fn format_decimal(value: Decimal) -> String {
    let text = value.to_string();
    let (sign, unsigned) = match text.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", text.as_str()),
    };
    let (int_part, frac_part) = match unsigned.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (unsigned, None),
    };
    let grouped = group_thousands(int_part);
    match frac_part {
        Some(f) => format!("{sign}{grouped}.{f}"),
        None => format!("{sign}{grouped}"),
    }
}

fn group_thousands(digits: &str) -> String {
    let len = digits.len();
    let mut out = String::with_capacity(len + len / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
