//! # Money Module
//!
//! Provides the `Money` type for order totals, modifier deltas and refund
//! amounts.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  REFUND THRESHOLD COMPARISONS MUST BE EXACT                             │
//! │                                                                         │
//! │  With floats:  100.00 might be stored as 99.99999999                   │
//! │                → a 100.00 refund could silently skip ops review        │
//! │                                                                         │
//! │  With cents:   10000 > 10000 is false, always                          │
//! │                → "amount > threshold" means exactly what it says       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use concourse_core::money::Money;
//!
//! let latte = Money::from_cents(450);
//! let oat_milk = Money::from_cents(60);
//!
//! let line_total = (latte + oat_milk).multiply_quantity(2);
//! assert_eq!(line_total.cents(), 1020);
//! assert_eq!(line_total.to_string(), "$10.20");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub, SubAssign};
use ts_rs::TS;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit (cents).
///
/// ## Where Money is Used
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  OrderItem.unit_price + Modifier.price_delta ──► line total             │
/// │                                                                         │
/// │  Σ line totals ──► Order.subtotal                                      │
/// │  subtotal − discount + service_fee ──► Order.total                     │
/// │                                                                         │
/// │  RefundRequest.amount ──► compared against ops approval threshold      │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents.
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Creates a Money value from whole currency units.
    ///
    /// ```rust
    /// use concourse_core::money::Money;
    ///
    /// assert_eq!(Money::from_units(100).cents(), 10_000);
    /// ```
    #[inline]
    pub const fn from_units(units: i64) -> Self {
        Money(units * 100)
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the whole-unit portion.
    #[inline]
    pub const fn units(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the minor unit portion (always 0-99).
    #[inline]
    pub const fn cents_part(&self) -> i64 {
        (self.0 % 100).abs()
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Multiplies money by a line-item quantity.
    ///
    /// Only for values already known to be in range; inbound amounts go
    /// through [`Money::checked_mul_quantity`].
    #[inline]
    pub const fn multiply_quantity(&self, qty: u32) -> Self {
        Money(self.0 * qty as i64)
    }

    /// `None` on overflow.
    #[inline]
    pub const fn checked_mul_quantity(&self, qty: u32) -> Option<Self> {
        match self.0.checked_mul(qty as i64) {
            Some(v) => Some(Money(v)),
            None => None,
        }
    }

    /// `None` on overflow.
    #[inline]
    pub const fn checked_add(&self, other: Money) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(v) => Some(Money(v)),
            None => None,
        }
    }

    /// `None` on overflow.
    #[inline]
    pub const fn checked_sub(&self, other: Money) -> Option<Self> {
        match self.0.checked_sub(other.0) {
            Some(v) => Some(Money(v)),
            None => None,
        }
    }

    /// Adds, clamping at the representable bounds.
    #[inline]
    pub const fn saturating_add(&self, other: Money) -> Self {
        Money(self.0.saturating_add(other.0))
    }

    /// Subtracts, flooring at zero. Used for remaining refundable balance.
    #[inline]
    pub const fn saturating_sub(&self, other: Money) -> Self {
        let diff = self.0.saturating_sub(other.0);
        if diff < 0 {
            Money(0)
        } else {
            Money(diff)
        }
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Debug-friendly display ("$12.50"). Localized formatting is the UI's job.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}${}.{:02}", sign, self.units().abs(), self.cents_part())
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
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

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + *m)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_units() {
        let money = Money::from_units(42);
        assert_eq!(money.cents(), 4200);
        assert_eq!(money.units(), 42);
        assert_eq!(money.cents_part(), 0);
    }

    #[test]
    fn test_display() {
        assert_eq!(Money::from_cents(1099).to_string(), "$10.99");
        assert_eq!(Money::from_cents(-550).to_string(), "-$5.50");
        assert_eq!(Money::zero().to_string(), "$0.00");
    }

    #[test]
    fn test_arithmetic_and_sum() {
        let a = Money::from_cents(1000);
        let b = Money::from_cents(250);
        assert_eq!((a + b).cents(), 1250);
        assert_eq!((a - b).cents(), 750);

        let total: Money = [a, b, b].iter().sum();
        assert_eq!(total.cents(), 1500);
    }

    #[test]
    fn test_saturating_sub() {
        let total = Money::from_cents(4200);
        assert_eq!(total.saturating_sub(Money::from_cents(1200)).cents(), 3000);
        assert_eq!(total.saturating_sub(Money::from_cents(9999)).cents(), 0);
    }

    #[test]
    fn test_checked_arithmetic_reports_overflow() {
        let huge = Money::from_cents(i64::MAX / 2 + 1);
        assert_eq!(huge.checked_mul_quantity(3), None);
        assert_eq!(huge.checked_add(huge), None);
        assert_eq!(Money::from_cents(i64::MIN).checked_sub(Money::from_cents(1)), None);
        assert_eq!(
            Money::from_cents(450).checked_mul_quantity(2),
            Some(Money::from_cents(900))
        );
        assert_eq!(huge.saturating_add(huge).cents(), i64::MAX);
    }

    #[test]
    fn test_threshold_comparison_is_exact() {
        let threshold = Money::from_units(100);
        assert!(!(Money::from_cents(10_000) > threshold));
        assert!(Money::from_cents(10_001) > threshold);
    }
}
