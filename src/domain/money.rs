use std::fmt;

/// Value is held as integer wei to avoid floating-point precision issues.
/// 1 ether = 10^18 wei, so 0.5 ether = 500_000_000_000_000_000 wei.
pub type Wei = u128;

/// Number of decimal places between wei and ether.
pub const ETHER_DECIMALS: usize = 18;

/// Wei in one ether.
pub const WEI_PER_ETHER: Wei = 1_000_000_000_000_000_000;

/// Format wei as an ether string, trimming trailing zeros but keeping at
/// least one decimal.
/// Example: 1_500_000_000_000_000_000 -> "1.5", 0 -> "0.0", 1 -> "0.000000000000000001"
pub fn format_ether(wei: Wei) -> String {
    let units = wei / WEI_PER_ETHER;
    let remainder = wei % WEI_PER_ETHER;
    let decimals = format!("{:0width$}", remainder, width = ETHER_DECIMALS);
    let trimmed = decimals.trim_end_matches('0');
    if trimmed.is_empty() {
        format!("{}.0", units)
    } else {
        format!("{}.{}", units, trimmed)
    }
}

/// Parse an ether string into wei.
/// Example: "1.0" -> 10^18, "0.5" -> 5 * 10^17, "2" -> 2 * 10^18
pub fn parse_ether(input: &str) -> Result<Wei, ParseEtherError> {
    let input = input.trim();
    if input.starts_with('-') {
        return Err(ParseEtherError::Negative);
    }

    let parts: Vec<&str> = input.split('.').collect();
    let (units_str, decimal_str) = match parts.len() {
        1 => (parts[0], ""),
        2 => (parts[0], parts[1]),
        _ => return Err(ParseEtherError::InvalidFormat),
    };

    if units_str.is_empty() && decimal_str.is_empty() {
        return Err(ParseEtherError::InvalidFormat);
    }
    if decimal_str.len() > ETHER_DECIMALS {
        return Err(ParseEtherError::TooManyDecimals);
    }
    if !units_str.chars().chain(decimal_str.chars()).all(|c| c.is_ascii_digit()) {
        return Err(ParseEtherError::InvalidFormat);
    }

    let units: Wei = if units_str.is_empty() {
        0
    } else {
        units_str.parse().map_err(|_| ParseEtherError::Overflow)?
    };

    // Right-pad the fraction to 18 digits: "5" means 0.5 ether
    let fraction: Wei = if decimal_str.is_empty() {
        0
    } else {
        format!("{:0<width$}", decimal_str, width = ETHER_DECIMALS)
            .parse()
            .map_err(|_| ParseEtherError::InvalidFormat)?
    };

    units
        .checked_mul(WEI_PER_ETHER)
        .and_then(|wei| wei.checked_add(fraction))
        .ok_or(ParseEtherError::Overflow)
}

/// Serde adapter writing wei as a decimal string, since u128 does not fit
/// JSON numbers or tagged/flattened serde content.
pub mod wei_string {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::Wei;

    pub fn serialize<S: Serializer>(wei: &Wei, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(wei)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Wei, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseEtherError {
    InvalidFormat,
    Negative,
    TooManyDecimals,
    Overflow,
}

impl fmt::Display for ParseEtherError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseEtherError::InvalidFormat => write!(f, "invalid amount format"),
            ParseEtherError::Negative => write!(f, "amount cannot be negative"),
            ParseEtherError::TooManyDecimals => {
                write!(f, "amount has more than {} decimal places", ETHER_DECIMALS)
            }
            ParseEtherError::Overflow => write!(f, "amount is too large"),
        }
    }
}

impl std::error::Error for ParseEtherError {}
