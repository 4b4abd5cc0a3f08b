//! # Money Module
//!
//! Provides the `Amount` type for balances and transfer amounts.
//!
//! ## Why Integer Minor Units?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  A float64 balance drifts:                                              │
//! │    100.00 - 0.10 - 0.20 = 99.69999999999999  ❌                         │
//! │                                                                         │
//! │  Across thousands of transfers the sum of all balances stops being     │
//! │  exactly conserved, and "balance >= amount" checks flip at the edges.  │
//! │                                                                         │
//! │  OUR SOLUTION: i64 minor units                                          │
//! │    10000 - 10 - 20 = 9970 (exactly 99.70)                               │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use teller_core::money::Amount;
//!
//! let balance = Amount::from_minor(10_000);        // 100.00
//! let amount = Amount::parse_major("15.50").unwrap();
//!
//! assert_eq!((balance - amount).minor(), 8_450);
//! assert_eq!(amount.to_string(), "15.50");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

use crate::error::ValidationError;
use crate::MINOR_UNITS_PER_MAJOR;

// =============================================================================
// Amount Type
// =============================================================================

/// A monetary value in the smallest currency unit.
///
/// ## Design Decisions
/// - **i64 (signed)**: balance deltas are negative for debits
/// - **Single field tuple struct**: zero-cost abstraction over i64
/// - **Checked helpers**: the transfer path uses `checked_add`/`checked_sub`
///   so an overflow is an error value, never a wrapped balance
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(i64);

impl Amount {
    /// Creates an amount from minor units.
    ///
    /// ```rust
    /// use teller_core::money::Amount;
    ///
    /// assert_eq!(Amount::from_minor(1550).minor(), 1550);
    /// ```
    #[inline]
    pub const fn from_minor(minor: i64) -> Self {
        Amount(minor)
    }

    /// Creates an amount from whole major units (`from_major(15)` is 15.00).
    #[inline]
    pub const fn from_major(major: i64) -> Self {
        Amount(major * MINOR_UNITS_PER_MAJOR)
    }

    /// Returns the value in minor units.
    #[inline]
    pub const fn minor(&self) -> i64 {
        self.0
    }

    /// Returns zero.
    #[inline]
    pub const fn zero() -> Self {
        Amount(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the value is strictly greater than zero.
    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Adds two amounts, returning `None` on overflow.
    #[inline]
    pub const fn checked_add(self, other: Amount) -> Option<Amount> {
        match self.0.checked_add(other.0) {
            Some(v) => Some(Amount(v)),
            None => None,
        }
    }

    /// Subtracts two amounts, returning `None` on overflow.
    #[inline]
    pub const fn checked_sub(self, other: Amount) -> Option<Amount> {
        match self.0.checked_sub(other.0) {
            Some(v) => Some(Amount(v)),
            None => None,
        }
    }

    /// Parses a decimal string in major units.
    ///
    /// ## Accepted Forms
    /// ```text
    /// "15"      → 1500
    /// "15.5"    → 1550
    /// "15.50"   → 1550
    /// "-3.25"   → -325   (parsed; rejected later by transfer validation)
    /// "15.505"  → error  (more precision than a minor unit)
    /// "1e3"     → error
    /// ```
    ///
    /// Parsing never goes through a float.
    pub fn parse_major(input: &str) -> Result<Amount, ValidationError> {
        let invalid = |reason: &str| ValidationError::InvalidFormat {
            field: "amount".to_string(),
            reason: reason.to_string(),
        };

        let trimmed = input.trim();
        let (negative, digits) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };

        let (whole, fraction) = match digits.split_once('.') {
            Some((w, f)) => (w, f),
            None => (digits, ""),
        };

        if whole.is_empty() && fraction.is_empty() {
            return Err(invalid("expected a number such as 15 or 15.50"));
        }
        if !whole.chars().all(|c| c.is_ascii_digit()) || !fraction.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid("only digits and a single decimal point are allowed"));
        }
        if fraction.len() > 2 {
            return Err(invalid("at most two decimal places are allowed"));
        }

        let whole_value: i64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid("value is too large"))?
        };
        // "5" → 50, "05" → 5, "" → 0
        let fraction_value: i64 = match fraction.len() {
            0 => 0,
            1 => i64::from(fraction.as_bytes()[0] - b'0') * 10,
            _ => fraction.parse().map_err(|_| invalid("invalid fraction"))?,
        };

        let minor = whole_value
            .checked_mul(MINOR_UNITS_PER_MAJOR)
            .and_then(|v| v.checked_add(fraction_value))
            .ok_or_else(|| invalid("value is too large"))?;

        Ok(Amount(if negative { -minor } else { minor }))
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Shows the amount in major units with two decimals (`1550` → `15.50`).
impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let per_major = MINOR_UNITS_PER_MAJOR as u64;
        write!(f, "{}{}.{:02}", sign, abs / per_major, abs % per_major)
    }
}

impl Default for Amount {
    fn default() -> Self {
        Amount::zero()
    }
}

impl From<i64> for Amount {
    fn from(minor: i64) -> Self {
        Amount(minor)
    }
}

impl Add for Amount {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Amount(self.0 + other.0)
    }
}

impl AddAssign for Amount {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Amount {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Amount(self.0 - other.0)
    }
}

impl SubAssign for Amount {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

/// Negation turns a credit into the matching debit delta.
impl Neg for Amount {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Amount(-self.0)
    }
}

impl Sum for Amount {
    fn sum<I: Iterator<Item = Amount>>(iter: I) -> Self {
        iter.fold(Amount::zero(), |acc, a| acc + a)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_from_major() {
        assert_eq!(Amount::from_major(100).minor(), 10_000);
        assert_eq!(Amount::from_major(0), Amount::zero());
    }

    #[rstest]
    #[case(1550, "15.50")]
    #[case(500, "5.00")]
    #[case(7, "0.07")]
    #[case(-325, "-3.25")]
    #[case(0, "0.00")]
    fn test_display(#[case] minor: i64, #[case] expected: &str) {
        assert_eq!(Amount::from_minor(minor).to_string(), expected);
    }

    #[rstest]
    #[case("15", 1500)]
    #[case("15.5", 1550)]
    #[case("15.50", 1550)]
    #[case("0.07", 7)]
    #[case(".5", 50)]
    #[case("-3.25", -325)]
    #[case(" 42 ", 4200)]
    fn test_parse_major_valid(#[case] input: &str, #[case] expected: i64) {
        assert_eq!(Amount::parse_major(input).unwrap().minor(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("-")]
    #[case(".")]
    #[case("15.505")]
    #[case("1e3")]
    #[case("12,50")]
    #[case("1.2.3")]
    #[case("99999999999999999999")]
    fn test_parse_major_invalid(#[case] input: &str) {
        let err = Amount::parse_major(input).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidFormat { .. }));
    }

    #[test]
    fn test_checked_arithmetic() {
        let max = Amount::from_minor(i64::MAX);
        assert_eq!(max.checked_add(Amount::from_minor(1)), None);
        assert_eq!(
            Amount::from_minor(100).checked_sub(Amount::from_minor(30)),
            Some(Amount::from_minor(70))
        );
    }

    #[test]
    fn test_neg_and_sum() {
        let debit = -Amount::from_minor(1500);
        assert!(debit.is_negative());

        let total: Amount = [100, 50, 25].into_iter().map(Amount::from_major).sum();
        assert_eq!(total.minor(), 17_500);
    }

    #[test]
    fn test_serde_is_plain_integer() {
        let json = serde_json::to_string(&Amount::from_minor(1550)).unwrap();
        assert_eq!(json, "1550");
    }
}
