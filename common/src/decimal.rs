//! Scaled-integer amounts. Prices and quantities are exact integers under a
//! per-symbol precision, converted to/from decimal strings exactly once at
//! the edges. `rust_decimal` remains available in the workspace for ambient
//! (non-core) uses, but the order/trade hot path works in `ScaledAmount` so
//! residue rejection and overflow behavior are explicit rather than
//! inherited from a general decimal library.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An amount scaled by `10^precision`, stored as the underlying integer.
/// E.g. `ScaledAmount::from_str("0.2", 8)` stores `20_000_000`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ScaledAmount(pub i128);

#[derive(Debug, Error)]
pub enum ScaledAmountError {
    #[error("non-integer residue in {0:?} at precision {1}")]
    NonIntegerResidue(String, u32),
    #[error("invalid decimal string: {0:?}")]
    InvalidDecimal(String),
    #[error("amount overflow")]
    Overflow,
}

impl ScaledAmount {
    pub const ZERO: ScaledAmount = ScaledAmount(0);

    pub fn raw(value: i128) -> Self {
        ScaledAmount(value)
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Parse a decimal string ("123.456") into the scaled integer at the given
    /// precision, rejecting any fractional residue the precision cannot hold.
    pub fn parse(s: &str, precision: u32) -> Result<Self, ScaledAmountError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ScaledAmountError::InvalidDecimal(s.to_string()));
        }
        let negative = s.starts_with('-');
        let unsigned = s.strip_prefix('-').unwrap_or(s);
        let mut parts = unsigned.splitn(2, '.');
        let int_part = parts.next().unwrap_or("0");
        let frac_part = parts.next().unwrap_or("");
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(ScaledAmountError::InvalidDecimal(s.to_string()));
        }
        if !int_part.chars().all(|c| c.is_ascii_digit()) || !frac_part.chars().all(|c| c.is_ascii_digit()) {
            return Err(ScaledAmountError::InvalidDecimal(s.to_string()));
        }
        let precision = precision as usize;
        if frac_part.len() > precision {
            // reject non-zero residue beyond the allowed precision
            if frac_part[precision..].bytes().any(|b| b != b'0') {
                return Err(ScaledAmountError::NonIntegerResidue(s.to_string(), precision as u32));
            }
        }
        let mut frac_padded = frac_part.to_string();
        if frac_padded.len() > precision {
            frac_padded.truncate(precision);
        } else {
            while frac_padded.len() < precision {
                frac_padded.push('0');
            }
        }
        let int_val: i128 = int_part.parse().map_err(|_| ScaledAmountError::InvalidDecimal(s.to_string()))?;
        let frac_val: i128 = if frac_padded.is_empty() {
            0
        } else {
            frac_padded.parse().map_err(|_| ScaledAmountError::InvalidDecimal(s.to_string()))?
        };
        let scale = 10i128.checked_pow(precision as u32).ok_or(ScaledAmountError::Overflow)?;
        let mut value = int_val.checked_mul(scale).ok_or(ScaledAmountError::Overflow)?;
        value = value.checked_add(frac_val).ok_or(ScaledAmountError::Overflow)?;
        if negative {
            value = -value;
        }
        Ok(ScaledAmount(value))
    }

    /// Render back to a decimal string at the given precision.
    pub fn to_decimal_string(self, precision: u32) -> String {
        let precision = precision as usize;
        let negative = self.0 < 0;
        let abs = self.0.unsigned_abs();
        let scale = 10u128.pow(precision as u32);
        let int_part = abs / scale;
        let frac_part = abs % scale;
        let sign = if negative && (int_part != 0 || frac_part != 0) { "-" } else { "" };
        if precision == 0 {
            format!("{sign}{int_part}")
        } else {
            format!("{sign}{int_part}.{frac_part:0width$}", width = precision)
        }
    }

    /// `self * other / 10^other_precision`, used for price*qty -> notional.
    pub fn mul_div_pow10(self, other: ScaledAmount, divisor_precision: u32) -> Result<Self, ScaledAmountError> {
        let divisor = 10i128.checked_pow(divisor_precision).ok_or(ScaledAmountError::Overflow)?;
        let product = self.0.checked_mul(other.0).ok_or(ScaledAmountError::Overflow)?;
        Ok(ScaledAmount(product / divisor))
    }

    pub fn checked_add(self, other: ScaledAmount) -> Result<Self, ScaledAmountError> {
        self.0.checked_add(other.0).map(ScaledAmount).ok_or(ScaledAmountError::Overflow)
    }

    pub fn checked_sub(self, other: ScaledAmount) -> Result<Self, ScaledAmountError> {
        self.0.checked_sub(other.0).map(ScaledAmount).ok_or(ScaledAmountError::Overflow)
    }

    /// Saturating subtraction floored at zero — used for residual-unfreeze math
    /// where small clock/ordering skew could otherwise produce a negative amount.
    pub fn saturating_sub_floor_zero(self, other: ScaledAmount) -> Self {
        ScaledAmount((self.0 - other.0).max(0))
    }

    pub fn checked_rem(self, modulus: ScaledAmount) -> Option<i128> {
        if modulus.0 == 0 {
            None
        } else {
            Some(self.0 % modulus.0)
        }
    }
}

impl fmt::Display for ScaledAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ScaledAmount {
    type Err = ScaledAmountError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // raw-integer form, used for wire encodings that are already scaled
        s.parse::<i128>().map(ScaledAmount).map_err(|_| ScaledAmountError::InvalidDecimal(s.to_string()))
    }
}

impl Serialize for ScaledAmount {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Output, S::Error>
    where
    S: serde::Serializer,
    {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for ScaledAmount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
    D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse::<i128>().map(ScaledAmount).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_exact_precision() {
        let a = ScaledAmount::parse("0.2", 8).unwrap();
        assert_eq!(a.0, 20_000_000);
        assert_eq!(a.to_decimal_string(8), "0.20000000");
    }

    #[test]
    fn parses_integer_price() {
        let a = ScaledAmount::parse("100", 8).unwrap();
        assert_eq!(a.0, 100_00000000);
    }

    #[test]
    fn rejects_residue_beyond_precision() {
        let err = ScaledAmount::parse("0.123456789", 8).unwrap_err();
        assert!(matches!(err, ScaledAmountError::NonIntegerResidue(_, _)));
    }

    #[test]
    fn allows_trailing_zero_residue() {
        let a = ScaledAmount::parse("0.20000000000", 8).unwrap();
        assert_eq!(a.0, 20_000_000);
    }

    #[test]
    fn notional_computes_price_times_qty() {
        let price = ScaledAmount::parse("100", 8).unwrap();
        let qty = ScaledAmount::parse("0.2", 8).unwrap();
        let notional = price.mul_div_pow10(qty, 8).unwrap();
        assert_eq!(notional, ScaledAmount(20_00000000));
    }

    #[test]
    fn negative_round_trips() {
        let a = ScaledAmount::parse("-1.5", 2).unwrap();
        assert_eq!(a.0, -150);
        assert_eq!(a.to_decimal_string(2), "-1.50");
    }
}
