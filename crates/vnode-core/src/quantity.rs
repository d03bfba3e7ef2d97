//! Resource quantities
//!
//! Parses the quantity notation used for node capacity (`20`, `100Gi`,
//! `500m`, `1.5e3`). A [`Quantity`] keeps the string it was parsed from and
//! its value in thousandths of a unit, rounded up.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Mantissas longer than this are rejected rather than risking overflow
const MAX_MANTISSA_DIGITS: usize = 30;

/// Error returned when a string is not a valid quantity
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid quantity {input:?}: {reason}")]
pub struct ParseQuantityError {
    pub input: String,
    pub reason: &'static str,
}

impl ParseQuantityError {
    fn new(input: &str, reason: &'static str) -> Self {
        Self {
            input: input.to_string(),
            reason,
        }
    }
}

/// A parsed resource quantity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Quantity {
    raw: String,
    milli: i128,
}

impl Quantity {
    /// Parse a quantity string
    pub fn parse(input: &str) -> Result<Self, ParseQuantityError> {
        input.parse()
    }

    /// The string this quantity was parsed from
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Value in thousandths of a unit, rounded up
    pub fn milli_value(&self) -> i128 {
        self.milli
    }

    /// Value in whole units, rounded up
    pub fn value(&self) -> i128 {
        ceil_div(self.milli, 1000)
    }
}

impl PartialEq for Quantity {
    fn eq(&self, other: &Self) -> bool {
        self.milli == other.milli
    }
}

impl Eq for Quantity {}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl TryFrom<String> for Quantity {
    type Error = ParseQuantityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Quantity> for String {
    fn from(quantity: Quantity) -> Self {
        quantity.raw
    }
}

impl FromStr for Quantity {
    type Err = ParseQuantityError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        if input.is_empty() {
            return Err(ParseQuantityError::new(input, "empty string"));
        }

        let (negative, rest) = match input.as_bytes()[0] {
            b'-' => (true, &input[1..]),
            b'+' => (false, &input[1..]),
            _ => (false, input),
        };

        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (number, suffix) = rest.split_at(number_len);

        let (whole, fraction) = match number.split_once('.') {
            Some((whole, fraction)) => {
                if fraction.contains('.') {
                    return Err(ParseQuantityError::new(input, "more than one decimal point"));
                }
                (whole, fraction)
            }
            None => (number, ""),
        };
        if whole.is_empty() && fraction.is_empty() {
            return Err(ParseQuantityError::new(input, "missing numeric value"));
        }

        let digits = format!("{}{}", whole, fraction);
        let digits = digits.trim_start_matches('0');
        if digits.len() > MAX_MANTISSA_DIGITS {
            return Err(ParseQuantityError::new(input, "value out of range"));
        }
        let mut mantissa: i128 = if digits.is_empty() {
            0
        } else {
            digits
                .parse()
                .map_err(|_| ParseQuantityError::new(input, "malformed number"))?
        };
        if negative {
            mantissa = -mantissa;
        }

        let (binary_shift, decimal_exponent) = parse_suffix(suffix)
            .ok_or_else(|| ParseQuantityError::new(input, "unknown suffix"))?;

        let scaled = mantissa
            .checked_mul(1i128 << binary_shift)
            .ok_or_else(|| ParseQuantityError::new(input, "value out of range"))?;

        // Thousandths: shift the decimal exponent by three, minus the fractional digits.
        let power = i32::try_from(fraction.len())
            .ok()
            .and_then(|digits| decimal_exponent.checked_add(3)?.checked_sub(digits))
            .ok_or_else(|| ParseQuantityError::new(input, "value out of range"))?;
        let milli = if power >= 0 {
            10i128
                .checked_pow(power as u32)
                .and_then(|factor| scaled.checked_mul(factor))
                .ok_or_else(|| ParseQuantityError::new(input, "value out of range"))?
        } else {
            match 10i128.checked_pow(power.unsigned_abs()) {
                Some(divisor) => ceil_div(scaled, divisor),
                // Anything divided by more than 10^38 rounds up to at most one unit.
                None => i128::from(scaled > 0),
            }
        };

        Ok(Self {
            raw: input.to_string(),
            milli,
        })
    }
}

/// Returns (binary shift, decimal exponent) for a suffix
fn parse_suffix(suffix: &str) -> Option<(u32, i32)> {
    let parsed = match suffix {
        "" => (0, 0),
        "Ki" => (10, 0),
        "Mi" => (20, 0),
        "Gi" => (30, 0),
        "Ti" => (40, 0),
        "Pi" => (50, 0),
        "Ei" => (60, 0),
        "n" => (0, -9),
        "u" => (0, -6),
        "m" => (0, -3),
        "k" => (0, 3),
        "M" => (0, 6),
        "G" => (0, 9),
        "T" => (0, 12),
        "P" => (0, 15),
        "E" => (0, 18),
        _ => {
            let exponent = suffix
                .strip_prefix('e')
                .or_else(|| suffix.strip_prefix('E'))?;
            let unsigned = exponent
                .strip_prefix('+')
                .or_else(|| exponent.strip_prefix('-'))
                .unwrap_or(exponent);
            if unsigned.is_empty() || !unsigned.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            (0, exponent.parse::<i32>().ok()?)
        }
    };
    Some(parsed)
}

fn ceil_div(numerator: i128, divisor: i128) -> i128 {
    let quotient = numerator / divisor;
    if numerator % divisor != 0 && numerator > 0 {
        quotient + 1
    } else {
        quotient
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_integers() {
        let q = Quantity::parse("20").unwrap();
        assert_eq!(q.value(), 20);
        assert_eq!(q.milli_value(), 20_000);
        assert_eq!(q.to_string(), "20");
    }

    #[test]
    fn test_binary_suffixes() {
        assert_eq!(Quantity::parse("100Gi").unwrap().value(), 100 * (1 << 30));
        assert_eq!(Quantity::parse("1Ki").unwrap().value(), 1024);
        assert_eq!(Quantity::parse("1.5Mi").unwrap().value(), 1_572_864);
    }

    #[test]
    fn test_decimal_suffixes_and_exponents() {
        assert_eq!(Quantity::parse("500m").unwrap().milli_value(), 500);
        assert_eq!(Quantity::parse("2k").unwrap().value(), 2_000);
        assert_eq!(Quantity::parse("1.5e3").unwrap().value(), 1_500);
        assert_eq!(Quantity::parse("1E3").unwrap().value(), 1_000);
        assert_eq!(Quantity::parse("1E").unwrap().value(), 1_000_000_000_000_000_000);
        assert_eq!(Quantity::parse(".5").unwrap().milli_value(), 500);
    }

    #[test]
    fn test_small_values_round_up() {
        assert_eq!(Quantity::parse("1n").unwrap().milli_value(), 1);
        assert_eq!(Quantity::parse("1500m").unwrap().value(), 2);
        assert_eq!(Quantity::parse("0").unwrap().milli_value(), 0);
    }

    #[test]
    fn test_invalid_quantities() {
        for input in ["", "not-a-quantity", "Gi", "12Gb", "1.2.3", "1e", "--1", "1 Gi", "."] {
            assert!(Quantity::parse(input).is_err(), "{input:?} should not parse");
        }
    }

    #[test]
    fn test_extreme_exponents_are_out_of_range() {
        for input in ["1e2147483647", "1E2147483647", "1.2345e-2147483648"] {
            let err = Quantity::parse(input).unwrap_err();
            assert_eq!(err.reason, "value out of range", "{input:?}");
        }
    }

    #[test]
    fn test_equality_is_by_value() {
        assert_eq!(Quantity::parse("1").unwrap(), Quantity::parse("1000m").unwrap());
        assert_ne!(Quantity::parse("1").unwrap(), Quantity::parse("1Ki").unwrap());
    }

    #[test]
    fn test_serde_uses_string_form() {
        let q = Quantity::parse("100Gi").unwrap();
        assert_eq!(serde_json::to_string(&q).unwrap(), "\"100Gi\"");

        let back: Quantity = serde_json::from_str("\"100Gi\"").unwrap();
        assert_eq!(back, q);
        assert!(serde_json::from_str::<Quantity>("\"lots\"").is_err());
    }
}
