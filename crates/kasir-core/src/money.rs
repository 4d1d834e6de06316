//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  Summing float subtotals:                                               │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌ total ≠ sum(lines)              │
//! │                                                                         │
//! │  OUR SOLUTION: Integer minor units                                      │
//! │    subtotal = price × qty      (exact)                                  │
//! │    total    = Σ subtotal       (exact)                                  │
//! │    The ledger invariant total == Σ subtotal holds bit-for-bit.          │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The only division in the system is for report averages, which round
//! half away from zero through [`Money::divide_rounded`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign};

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit.
///
/// ## Design Decisions
/// - **i64**: wide enough for any till; arithmetic on the commit path is checked
/// - **Transparent**: serializes as a bare integer, stored as INTEGER in SQLite
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(transparent))]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from minor units.
    ///
    /// ## Example
    /// ```rust
    /// use kasir_core::money::Money;
    ///
    /// let price = Money::from_minor(3500);
    /// assert_eq!(price.minor(), 3500);
    /// ```
    #[inline]
    pub const fn from_minor(minor: i64) -> Self {
        Money(minor)
    }

    /// Returns the value in minor units.
    #[inline]
    pub const fn minor(&self) -> i64 {
        self.0
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the value is negative.
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Adds two amounts, returning `None` on overflow.
    #[inline]
    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    /// Multiplies a unit price by a quantity, returning `None` on overflow.
    ///
    /// ## Example
    /// ```rust
    /// use kasir_core::money::Money;
    ///
    /// let unit_price = Money::from_minor(8000);
    /// assert_eq!(unit_price.checked_mul_quantity(3), Some(Money::from_minor(24000)));
    /// assert_eq!(Money::from_minor(i64::MAX).checked_mul_quantity(2), None);
    /// ```
    #[inline]
    pub fn checked_mul_quantity(self, qty: i64) -> Option<Money> {
        self.0.checked_mul(qty).map(Money)
    }

    /// Divides by a positive count, rounding half away from zero.
    ///
    /// Returns zero for a non-positive divisor, which is what an average over
    /// an empty set reports.
    ///
    /// ## Example
    /// ```rust
    /// use kasir_core::money::Money;
    ///
    /// assert_eq!(Money::from_minor(10).divide_rounded(4).minor(), 3); // 2.5 → 3
    /// assert_eq!(Money::from_minor(10).divide_rounded(3).minor(), 3); // 3.33 → 3
    /// assert_eq!(Money::from_minor(10).divide_rounded(0).minor(), 0);
    /// ```
    pub fn divide_rounded(self, divisor: i64) -> Money {
        if divisor <= 0 {
            return Money::zero();
        }

        // i128 so that doubling the numerator cannot overflow
        let numerator = self.0 as i128;
        let divisor = divisor as i128;
        let half = divisor / 2;
        let rounded = if numerator >= 0 {
            (numerator + half) / divisor
        } else {
            (numerator - half) / divisor
        };
        Money(rounded as i64)
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Display shows the raw minor-unit amount; presentation formatting is the
/// caller's concern.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), Add::add)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_from_minor() {
        let money = Money::from_minor(15000);
        assert_eq!(money.minor(), 15000);
        assert!(!money.is_zero());
        assert!(!money.is_negative());
    }

    #[test]
    fn test_display_is_minor_units() {
        assert_eq!(Money::from_minor(15000).to_string(), "15000");
        assert_eq!(Money::zero().to_string(), "0");
    }

    #[test]
    fn test_divide_rounded_negative_rounds_away_from_zero() {
        assert_eq!(Money::from_minor(-10).divide_rounded(4).minor(), -3);
        assert_eq!(Money::from_minor(-9).divide_rounded(4).minor(), -2);
    }

    #[test]
    fn test_sum() {
        let amounts = [Money::from_minor(7000), Money::from_minor(8000)];
        let total: Money = amounts.iter().sum();
        assert_eq!(total.minor(), 15000);
    }

    #[test]
    fn test_serializes_as_bare_integer() {
        let json = serde_json::to_string(&Money::from_minor(3500)).unwrap();
        assert_eq!(json, "3500");
    }

    proptest! {
        /// Rounded division never strays more than half a unit from the exact quotient.
        #[test]
        fn divide_rounded_within_half_unit(amount in -1_000_000_000i64..1_000_000_000, n in 1i64..10_000) {
            let q = Money::from_minor(amount).divide_rounded(n).minor() as i128;
            let exact_times_two = 2 * amount as i128;
            let diff = (2 * q * n as i128 - exact_times_two).abs();
            prop_assert!(diff <= n as i128);
        }
    }
}
