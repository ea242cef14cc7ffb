//! Kubernetes resource quantities.
//!
//! Quantities are kept in milli-units so CPU (`500m`, `1`, `0.5`) and memory
//! (`500Mi`, `1Gi`, `128M`) compare exactly without floating point.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// A parsed resource quantity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quantity {
    raw: String,
    millis: u128,
}

impl Quantity {
    /// Parse a quantity string.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(Error::Validation("Empty resource quantity".into()));
        }

        let split = trimmed
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(trimmed.len());
        let (number, suffix) = trimmed.split_at(split);

        let multiplier_millis = suffix_multiplier(suffix).ok_or_else(|| {
            Error::Validation(format!(
                "Invalid resource quantity '{}': unknown suffix '{}'",
                raw, suffix
            ))
        })?;

        let (whole, fraction) = match number.split_once('.') {
            Some((w, f)) => (w, f),
            None => (number, ""),
        };
        if whole.is_empty() && fraction.is_empty() {
            return Err(Error::Validation(format!(
                "Invalid resource quantity '{}': missing number",
                raw
            )));
        }
        if fraction.contains('.') || fraction.len() > 9 {
            return Err(Error::Validation(format!(
                "Invalid resource quantity '{}'",
                raw
            )));
        }

        let digits = format!("{}{}", whole, fraction);
        let mantissa: u128 = digits
            .parse()
            .map_err(|_| Error::Validation(format!("Invalid resource quantity '{}'", raw)))?;
        let scale = 10u128.pow(fraction.len() as u32);

        let scaled = mantissa
            .checked_mul(multiplier_millis)
            .ok_or_else(|| Error::Validation(format!("Resource quantity '{}' overflows", raw)))?;

        // Kubernetes rounds fractional milli-units up.
        let millis = scaled.div_ceil(scale);

        Ok(Self {
            raw: trimmed.to_string(),
            millis,
        })
    }

    /// Value in milli-units (millicores for CPU, milli-bytes for memory).
    pub fn millis(&self) -> u128 {
        self.millis
    }

    /// Value in whole units, rounded up.
    pub fn units_ceil(&self) -> u128 {
        self.millis.div_ceil(1000)
    }

    /// The string as written in the definition.
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

fn suffix_multiplier(suffix: &str) -> Option<u128> {
    const KI: u128 = 1024;
    let units: u128 = match suffix {
        "" => return Some(1000),
        "m" => return Some(1),
        "k" => 1_000,
        "M" => 1_000_000,
        "G" => 1_000_000_000,
        "T" => 1_000_000_000_000,
        "P" => 1_000_000_000_000_000,
        "E" => 1_000_000_000_000_000_000,
        "Ki" => KI,
        "Mi" => KI.pow(2),
        "Gi" => KI.pow(3),
        "Ti" => KI.pow(4),
        "Pi" => KI.pow(5),
        "Ei" => KI.pow(6),
        _ => return None,
    };
    Some(units * 1000)
}

impl FromStr for Quantity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl PartialOrd for Quantity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Quantity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.millis.cmp(&other.millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_quantities() {
        assert_eq!(Quantity::parse("500m").unwrap().millis(), 500);
        assert_eq!(Quantity::parse("1000m").unwrap().millis(), 1000);
        assert_eq!(Quantity::parse("1").unwrap().millis(), 1000);
        assert_eq!(Quantity::parse("0.5").unwrap().millis(), 500);
        assert_eq!(Quantity::parse("1000m").unwrap(), Quantity::parse("1").unwrap());
    }

    #[test]
    fn test_memory_quantities() {
        let mi = Quantity::parse("500Mi").unwrap();
        assert_eq!(mi.units_ceil(), 500 * 1024 * 1024);

        let gi = Quantity::parse("1Gi").unwrap();
        assert_eq!(gi.units_ceil(), 1024 * 1024 * 1024);
        assert!(mi < gi);

        assert_eq!(Quantity::parse("1.5Gi").unwrap().units_ceil(), 1536 * 1024 * 1024);
        assert_eq!(Quantity::parse("128M").unwrap().units_ceil(), 128_000_000);
    }

    #[test]
    fn test_decimal_and_binary_suffixes_differ() {
        let decimal = Quantity::parse("1G").unwrap();
        let binary = Quantity::parse("1Gi").unwrap();
        assert!(decimal < binary);
    }

    #[test]
    fn test_invalid_quantities() {
        assert!(Quantity::parse("").is_err());
        assert!(Quantity::parse("lots").is_err());
        assert!(Quantity::parse("10Xi").is_err());
        assert!(Quantity::parse("1.2.3").is_err());
        assert!(Quantity::parse("Mi").is_err());
    }

    #[test]
    fn test_display_keeps_original_text() {
        assert_eq!(Quantity::parse(" 500Mi ").unwrap().to_string(), "500Mi");
    }
}
