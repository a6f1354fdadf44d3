//! Resource quantities in the Kubernetes notation.
//!
//! A [`Quantity`] is a fixed-point number with an optional suffix:
//!
//! ```text
//! <quantity> ::= <signedNumber><suffix>
//! <suffix>   ::= <binarySI> | <decimalExponent> | <decimalSI>
//! <binarySI> ::= Ki | Mi | Gi | Ti | Pi | Ei
//! <decimalSI> ::= n | u | m | "" | k | M | G | T | P | E
//! <decimalExponent> ::= "e" <signedNumber> | "E" <signedNumber>
//! ```
//!
//! Quantities are stored as an integer count of milli-units. Values with
//! sub-milli precision are rounded up, so `milli_value` never under-reports.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One kibibyte.
pub const KI: i64 = 1 << 10;

/// One mebibyte.
pub const MI: i64 = 1 << 20;

/// One gibibyte.
pub const GI: i64 = 1 << 30;

const BINARY_SUFFIXES: [(&str, u32); 6] = [
    ("Ki", 10),
    ("Mi", 20),
    ("Gi", 30),
    ("Ti", 40),
    ("Pi", 50),
    ("Ei", 60),
];

const DECIMAL_SUFFIXES: [(&str, i32); 10] = [
    ("n", -9),
    ("u", -6),
    ("m", -3),
    ("", 0),
    ("k", 3),
    ("M", 6),
    ("G", 9),
    ("T", 12),
    ("P", 15),
    ("E", 18),
];

/// How a quantity prefers to be rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    /// Powers of 1024 (`Ki`, `Mi`, ...).
    BinarySI,
    /// Powers of 1000 (`m`, `k`, `M`, ...).
    DecimalSI,
    /// Scientific notation (`1e3`).
    DecimalExponent,
}

/// Errors produced while parsing or constructing a quantity.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QuantityError {
    /// The input was empty.
    #[error("empty quantity")]
    Empty,

    /// The numeric part could not be parsed.
    #[error("invalid number in quantity: {0}")]
    InvalidNumber(String),

    /// The suffix is not a known SI suffix or exponent.
    #[error("invalid suffix in quantity: {0}")]
    InvalidSuffix(String),

    /// The value does not fit in 64-bit milli-units.
    #[error("quantity out of range: {0}")]
    Overflow(String),
}

/// A resource quantity such as `1500m` CPU or `256Mi` memory.
///
/// Equality and ordering compare the numeric value only; the [`Format`]
/// affects rendering.
#[derive(Clone, Copy, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Quantity {
    milli: i64,
    format: Format,
}

/// Scale applied to the parsed mantissa.
enum Scale {
    Binary(u32),
    Decimal(i32),
}

impl Quantity {
    /// The zero quantity.
    #[must_use]
    pub const fn zero() -> Self {
        Self {
            milli: 0,
            format: Format::DecimalSI,
        }
    }

    /// Create a quantity from a whole-unit value.
    ///
    /// # Errors
    ///
    /// Returns `QuantityError::Overflow` if the value cannot be held in milli-units.
    pub fn new(value: i64, format: Format) -> Result<Self, QuantityError> {
        let milli = value
            .checked_mul(1000)
            .ok_or_else(|| QuantityError::Overflow(value.to_string()))?;
        Ok(Self { milli, format })
    }

    /// Create a quantity from a milli-unit value.
    #[must_use]
    pub const fn from_milli(milli: i64, format: Format) -> Self {
        Self { milli, format }
    }

    /// Parse a quantity string.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not a valid quantity or overflows.
    pub fn parse(input: &str) -> Result<Self, QuantityError> {
        let s = input.trim();
        if s.is_empty() {
            return Err(QuantityError::Empty);
        }

        let (negative, rest) = if let Some(r) = s.strip_prefix('-') {
            (true, r)
        } else if let Some(r) = s.strip_prefix('+') {
            (false, r)
        } else {
            (false, s)
        };

        let number_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (number, suffix) = rest.split_at(number_end);

        let (int_part, frac_part) = number.split_once('.').unwrap_or((number, ""));
        if (int_part.is_empty() && frac_part.is_empty()) || frac_part.contains('.') {
            return Err(QuantityError::InvalidNumber(input.to_string()));
        }

        let int_part = int_part.trim_start_matches('0');
        let frac_part = frac_part.trim_end_matches('0');
        let digits = format!("{int_part}{frac_part}");
        let mut mantissa: i128 = if digits.is_empty() {
            0
        } else {
            digits
                .parse()
                .map_err(|_| QuantityError::Overflow(input.to_string()))?
        };
        if negative {
            mantissa = -mantissa;
        }
        let frac_len = i32::try_from(frac_part.len())
            .map_err(|_| QuantityError::Overflow(input.to_string()))?;

        let (format, scale) = parse_suffix(suffix)?;
        let overflow = || QuantityError::Overflow(input.to_string());

        let (numerator, denominator) = match scale {
            Scale::Binary(bits) => {
                let num = mantissa
                    .checked_mul(1_i128 << bits)
                    .and_then(|n| n.checked_mul(1000))
                    .ok_or_else(overflow)?;
                (num, pow10(frac_len))
            }
            Scale::Decimal(exp) => {
                let shift = exp
                    .checked_add(3)
                    .and_then(|e| e.checked_sub(frac_len))
                    .ok_or_else(overflow)?;
                if shift >= 0 {
                    let factor = pow10(shift).ok_or_else(overflow)?;
                    (mantissa.checked_mul(factor).ok_or_else(overflow)?, Some(1))
                } else {
                    (mantissa, shift.checked_neg().and_then(pow10))
                }
            }
        };

        let milli = match denominator {
            Some(den) => ceil_div(numerator, den),
            // Denominator beyond i128: the value is a positive fraction of a milli-unit.
            None => i128::from(numerator > 0),
        };
        let milli = i64::try_from(milli).map_err(|_| overflow())?;

        Ok(Self { milli, format })
    }

    /// The value in milli-units, rounded up.
    #[must_use]
    pub const fn milli_value(&self) -> i64 {
        self.milli
    }

    /// The value in whole units, rounded up.
    #[must_use]
    pub const fn value(&self) -> i64 {
        let q = self.milli / 1000;
        if self.milli % 1000 > 0 {
            q + 1
        } else {
            q
        }
    }

    /// The preferred rendering format.
    #[must_use]
    pub const fn format(&self) -> Format {
        self.format
    }

    /// Whether the quantity is zero.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.milli == 0
    }
}

fn parse_suffix(suffix: &str) -> Result<(Format, Scale), QuantityError> {
    if let Some((_, bits)) = BINARY_SUFFIXES.iter().find(|(s, _)| *s == suffix) {
        return Ok((Format::BinarySI, Scale::Binary(*bits)));
    }
    if let Some((_, exp)) = DECIMAL_SUFFIXES.iter().find(|(s, _)| *s == suffix) {
        return Ok((Format::DecimalSI, Scale::Decimal(*exp)));
    }
    if suffix.len() > 1 && (suffix.starts_with('e') || suffix.starts_with('E')) {
        let exp: i32 = suffix[1..]
            .parse()
            .map_err(|_| QuantityError::InvalidSuffix(suffix.to_string()))?;
        return Ok((Format::DecimalExponent, Scale::Decimal(exp)));
    }
    Err(QuantityError::InvalidSuffix(suffix.to_string()))
}

fn pow10(exp: i32) -> Option<i128> {
    u32::try_from(exp).ok().and_then(|e| 10_i128.checked_pow(e))
}

fn ceil_div(numerator: i128, denominator: i128) -> i128 {
    let q = numerator / denominator;
    if numerator % denominator > 0 {
        q + 1
    } else {
        q
    }
}

impl FromStr for Quantity {
    type Err = QuantityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Quantity {
    type Error = QuantityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Quantity> for String {
    fn from(q: Quantity) -> Self {
        q.to_string()
    }
}

impl Default for Quantity {
    fn default() -> Self {
        Self::zero()
    }
}

impl PartialEq for Quantity {
    fn eq(&self, other: &Self) -> bool {
        self.milli == other.milli
    }
}

impl Eq for Quantity {}

impl Hash for Quantity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.milli.hash(state);
    }
}

impl PartialOrd for Quantity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Quantity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.milli.cmp(&other.milli)
    }
}

impl fmt::Debug for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Quantity({self})")
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.milli == 0 {
            return f.write_str("0");
        }
        if self.milli % 1000 != 0 {
            return write!(f, "{}m", self.milli);
        }
        let value = self.milli / 1000;

        match self.format {
            Format::BinarySI => {
                for (suffix, bits) in BINARY_SUFFIXES.iter().rev() {
                    let unit = 1_i64 << bits;
                    if value % unit == 0 {
                        return write!(f, "{}{suffix}", value / unit);
                    }
                }
                write!(f, "{value}")
            }
            Format::DecimalSI | Format::DecimalExponent => {
                let mut exp = 18;
                while exp > 0 {
                    let unit = 10_i64.pow(exp);
                    if value % unit == 0 {
                        let scaled = value / unit;
                        return if self.format == Format::DecimalExponent {
                            write!(f, "{scaled}e{exp}")
                        } else {
                            let suffix = DECIMAL_SUFFIXES
                                .iter()
                                .find(|(_, e)| i64::from(*e) == i64::from(exp))
                                .map_or("", |(s, _)| *s);
                            write!(f, "{scaled}{suffix}")
                        };
                    }
                    exp -= 3;
                }
                write!(f, "{value}")
            }
        }
    }
}
