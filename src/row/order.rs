//! Order: Totally-ordered decimal sort keys.
//!
//! Rows carry their sort position as a decimal string (e.g. `"10.00"`) so a
//! new row can always be placed between two neighbours without renumbering.
//! Comparing the strings directly would put `"9.00"` after `"10.00"`, so the
//! value is parsed into normalized integer and fraction digits and compared
//! numerically without ever going through floating point.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error returned when a string is not a valid order value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrderError {
    /// The input was empty.
    #[error("order value is empty")]
    Empty,

    /// The input contained something other than digits and one decimal point.
    #[error("invalid order value: '{0}'")]
    Invalid(String),
}

/// A non-negative decimal sort key.
///
/// Stored normalized: the integer part has no leading zeros (`"0"` for
/// zero) and the fraction has no trailing zeros. With that normalization,
/// equal values have identical digits and ordering reduces to comparing
/// integer lengths, then digits.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Order {
    int: String,
    frac: String,
}

impl Order {
    /// Parse an order from its decimal string form.
    pub fn parse(s: &str) -> Result<Self, OrderError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(OrderError::Empty);
        }

        let (int, frac) = s.split_once('.').unwrap_or((s, ""));
        let digits_only = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
        if (int.is_empty() && frac.is_empty()) || !digits_only(int) || !digits_only(frac) {
            return Err(OrderError::Invalid(s.to_string()));
        }

        let int = int.trim_start_matches('0');
        let frac = frac.trim_end_matches('0');
        Ok(Self {
            int: if int.is_empty() { "0".to_string() } else { int.to_string() },
            frac: frac.to_string(),
        })
    }

    /// Create an order from a whole number.
    pub fn from_integer(value: u64) -> Self {
        Self {
            int: value.to_string(),
            frac: String::new(),
        }
    }

    /// Whether this order is a whole number.
    #[inline]
    pub fn is_integer(&self) -> bool {
        self.frac.is_empty()
    }
}

impl Ord for Order {
    fn cmp(&self, other: &Self) -> Ordering {
        self.int
            .len()
            .cmp(&other.int.len())
            .then_with(|| self.int.cmp(&other.int))
            .then_with(|| self.frac.cmp(&other.frac))
    }
}

impl PartialOrd for Order {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl FromStr for Order {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<u64> for Order {
    fn from(value: u64) -> Self {
        Self::from_integer(value)
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.frac.is_empty() {
            f.write_str(&self.int)
        } else {
            write!(f, "{}.{}", self.int, self.frac)
        }
    }
}

impl fmt::Debug for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Order({self})")
    }
}
