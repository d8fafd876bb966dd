//! Display formatting for addresses, token magnitudes and percentages

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};

/// Shorten an address to `first6...last4`
///
/// Empty input renders as "Unknown"; addresses too short to shorten are
/// returned unchanged.
pub fn format_address(address: &str) -> String {
    if address.is_empty() {
        return "Unknown".to_string();
    }
    let chars: Vec<char> = address.chars().collect();
    if chars.len() <= 10 {
        return address.to_string();
    }
    let head: String = chars[..6].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

/// Group a number with thousands separators, keeping at most three
/// fraction digits (trailing zeros dropped)
pub fn format_number(value: Decimal) -> String {
    let rounded = value
        .round_dp_with_strategy(3, RoundingStrategy::MidpointAwayFromZero)
        .normalize();
    let text = rounded.abs().to_string();

    let (int_part, frac_part) = match text.split_once('.') {
        Some((int_part, frac_part)) => (int_part, Some(frac_part)),
        None => (text.as_str(), None),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3 + 5);
    if rounded.is_sign_negative() && !rounded.is_zero() {
        grouped.push('-');
    }
    for (i, digit) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    if let Some(frac) = frac_part {
        grouped.push('.');
        grouped.push_str(frac);
    }
    grouped
}

/// Format an integer counter with thousands separators
pub fn format_count(value: u64) -> String {
    format_number(Decimal::from(value))
}

/// Holder balance: two decimals, then grouped
pub fn format_balance(balance: Decimal) -> String {
    format_number(balance.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
}

/// Transaction amount with four decimals, e.g. "12.5000 tokens"
pub fn format_amount(amount: Decimal) -> String {
    let rounded = amount.round_dp_with_strategy(4, RoundingStrategy::MidpointAwayFromZero);
    format!("{:.4} tokens", rounded)
}

/// Supply share with three decimals, e.g. "12.346%"
pub fn format_percentage(percentage: Decimal) -> String {
    let rounded = percentage.round_dp_with_strategy(3, RoundingStrategy::MidpointAwayFromZero);
    format!("{:.3}%", rounded)
}

/// Wall-clock time of an event (feed views)
pub fn format_time(timestamp: &DateTime<Utc>) -> String {
    timestamp.format("%H:%M:%S").to_string()
}

/// Date and time of an event (wallet history)
pub fn format_datetime(timestamp: &DateTime<Utc>) -> String {
    timestamp.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// How concentrated a single holder's position is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConcentrationTier {
    /// At most 1% of supply
    Normal,
    /// Above 1%, at most 5%
    Elevated,
    /// Above 5% of supply
    High,
}

impl ConcentrationTier {
    pub fn for_percentage(percentage: Decimal) -> Self {
        if percentage > Decimal::from(5) {
            ConcentrationTier::High
        } else if percentage > Decimal::ONE {
            ConcentrationTier::Elevated
        } else {
            ConcentrationTier::Normal
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ConcentrationTier::Normal => "normal",
            ConcentrationTier::Elevated => "elevated",
            ConcentrationTier::High => "high",
        }
    }
}
