//! Human-entered capacity strings ("500Mi", "2.5G", "1024").

use crate::{Error, Result};
use serde::de::{self, Deserialize, Deserializer, Visitor};
use std::fmt;
use std::str::FromStr;

/// Parse a capacity string into a byte count.
///
/// Accepts a decimal number, optionally fractional, immediately followed by
/// an optional unit. `Ki`, `Mi`, `Gi`, `Ti`, `Pi`, `Ei` are powers of 1024;
/// `K` (or `k`), `M`, `G`, `T`, `P`, `E` are powers of 1000. Without a unit
/// the number is already in bytes. Whole numbers are exact; fractional
/// products are rounded to the nearest byte.
pub fn parse_size(text: &str) -> Result<u64> {
    let text = text.trim();
    let invalid = || Error::InvalidSizeFormat(text.to_string());

    let split = text
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(text.len());
    let (number, unit) = text.split_at(split);
    if !is_decimal_number(number) {
        return Err(invalid());
    }

    let multiplier = unit_multiplier(unit).ok_or_else(invalid)?;
    if !number.contains('.') {
        let value: u64 = number.parse().map_err(|_| invalid())?;
        return value.checked_mul(multiplier).ok_or_else(invalid);
    }

    let value: f64 = number.parse().map_err(|_| invalid())?;
    let bytes = (value * multiplier as f64).round();
    if !bytes.is_finite() || bytes >= u64::MAX as f64 {
        return Err(invalid());
    }
    Ok(bytes as u64)
}

/// `<digits>` or `<digits>.<digits>`.
fn is_decimal_number(text: &str) -> bool {
    let all_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    match text.split_once('.') {
        Some((int, frac)) => all_digits(int) && all_digits(frac),
        None => all_digits(text),
    }
}

fn unit_multiplier(unit: &str) -> Option<u64> {
    if unit.is_empty() {
        return Some(1);
    }
    let (prefix, base) = match unit.strip_suffix('i') {
        Some(prefix) => (prefix, 1024u64),
        None => (unit, 1000u64),
    };
    let exponent = match prefix {
        "K" => 1,
        "k" if base == 1000 => 1,
        "M" => 2,
        "G" => 3,
        "T" => 4,
        "P" => 5,
        "E" => 6,
        _ => return None,
    };
    base.checked_pow(exponent)
}

/// A byte count parsed from a capacity string.
///
/// Deserializes from either a capacity string or a bare integer, so the
/// value can come from a TOML file as well as from an environment variable.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ByteSize(u64);

impl ByteSize {
    pub const fn new(bytes: u64) -> Self {
        Self(bytes)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl FromStr for ByteSize {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        parse_size(s).map(Self)
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<'de> Deserialize<'de> for ByteSize {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct ByteSizeVisitor;

        impl Visitor<'_> for ByteSizeVisitor {
            type Value = ByteSize;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a byte count or a size string such as \"500Mi\"")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<ByteSize, E> {
                v.parse().map_err(E::custom)
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<ByteSize, E> {
                Ok(ByteSize(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<ByteSize, E> {
                u64::try_from(v)
                    .map(ByteSize)
                    .map_err(|_| E::custom(format!("negative size: {v}")))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<ByteSize, E> {
                if !v.is_finite() || v < 0.0 || v >= u64::MAX as f64 {
                    return Err(E::custom(format!("size out of range: {v}")));
                }
                Ok(ByteSize(v.round() as u64))
            }
        }

        deserializer.deserialize_any(ByteSizeVisitor)
    }
}
