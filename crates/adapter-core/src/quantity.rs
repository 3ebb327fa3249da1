//! Fixed-point metric quantities.
//!
//! Values are kept as signed milli-units so that averaging and comparison
//! never go through floating point once a value has been collected.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

const MILLI_PER_UNIT: i64 = 1000;

/// A decimal quantity with milli-unit precision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Quantity {
    milli: i64,
}

impl Quantity {
    pub const ZERO: Quantity = Quantity { milli: 0 };

    /// A whole-unit quantity.
    pub fn from_int(value: i64) -> Self {
        Self {
            milli: value.saturating_mul(MILLI_PER_UNIT),
        }
    }

    /// A quantity expressed directly in milli-units.
    pub fn from_milli(milli: i64) -> Self {
        Self { milli }
    }

    /// Round a float to the nearest milli-unit.
    ///
    /// Returns `None` for NaN and infinities.
    pub fn from_f64(value: f64) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        let milli = (value * MILLI_PER_UNIT as f64).round();
        if milli > i64::MAX as f64 || milli < i64::MIN as f64 {
            return None;
        }
        Some(Self {
            milli: milli as i64,
        })
    }

    /// Whole-unit value, truncated toward zero.
    pub fn value(&self) -> i64 {
        self.milli / MILLI_PER_UNIT
    }

    pub fn milli_value(&self) -> i64 {
        self.milli
    }

    pub fn as_f64(&self) -> f64 {
        self.milli as f64 / MILLI_PER_UNIT as f64
    }

    /// Divide in milli-units, truncating toward zero.
    ///
    /// Returns `None` when `divisor` is zero.
    pub fn div_by(&self, divisor: i64) -> Option<Self> {
        self.milli.checked_div(divisor).map(Self::from_milli)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.milli % MILLI_PER_UNIT == 0 {
            write!(f, "{}", self.milli / MILLI_PER_UNIT)
        } else {
            write!(f, "{}m", self.milli)
        }
    }
}

impl FromStr for Quantity {
    type Err = CoreError;

    /// Parse `42`, `-3`, `1.5`, `300m`, `2k`, `1.5M` or `1G`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CoreError::InvalidQuantity(s.to_string());
        let s = s.trim();

        let (number, scale): (&str, i128) = match s.char_indices().last() {
            Some((idx, 'm')) => (&s[..idx], 1),
            Some((idx, 'k')) => (&s[..idx], 1_000_000),
            Some((idx, 'M')) => (&s[..idx], 1_000_000_000),
            Some((idx, 'G')) => (&s[..idx], 1_000_000_000_000),
            Some(_) => (s, MILLI_PER_UNIT as i128),
            None => return Err(invalid()),
        };

        let (negative, digits) = match number.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, number.strip_prefix('+').unwrap_or(number)),
        };
        let (whole, fraction) = digits.split_once('.').unwrap_or((digits, ""));
        if whole.is_empty() && fraction.is_empty() {
            return Err(invalid());
        }
        if !whole.chars().chain(fraction.chars()).all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }

        let whole: i128 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid())?
        };
        let mut milli = whole.checked_mul(scale).ok_or_else(invalid)?;

        if !fraction.is_empty() {
            // Digits beyond what the scale can represent are truncated.
            let mut divisor: i128 = 1;
            let mut frac_value: i128 = 0;
            for c in fraction.chars().take(18) {
                frac_value = frac_value * 10 + (c as i128 - '0' as i128);
                divisor *= 10;
            }
            milli = milli
                .checked_add(frac_value * scale / divisor)
                .ok_or_else(invalid)?;
        }

        if negative {
            milli = -milli;
        }
        let milli = i64::try_from(milli).map_err(|_| invalid())?;
        Ok(Self { milli })
    }
}

impl TryFrom<String> for Quantity {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Quantity> for String {
    fn from(q: Quantity) -> Self {
        q.to_string()
    }
}
