//! Decimal money amounts.
//!
//! The storefront trades in a single currency, so an amount is just a
//! [`Decimal`] with display and rounding helpers. Arithmetic never goes
//! through floating point.

use core::fmt;
use core::iter::Sum;
use core::ops::{Add, Mul};

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// A monetary amount in the store currency (dollars, not cents).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    /// Zero dollars.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Wrap a decimal amount.
    #[must_use]
    pub const fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    /// Build an amount from integer cents, e.g. `from_cents(1999)` is $19.99.
    #[must_use]
    pub fn from_cents(cents: i64) -> Self {
        Self(Decimal::new(cents, 2))
    }

    /// Build a whole-dollar amount.
    #[must_use]
    pub fn from_dollars(dollars: i64) -> Self {
        Self(Decimal::from(dollars))
    }

    /// The underlying decimal.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// Round half away from zero to whole cents.
    #[must_use]
    pub fn round_cents(&self) -> Self {
        Self(
            self.0
                .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero),
        )
    }

    /// Multiply by a percentage expressed as a whole number (8 means 8%).
    #[must_use]
    pub fn percent(&self, pct: u32) -> Self {
        Self(self.0 * Decimal::from(pct) / Decimal::ONE_HUNDRED)
    }

    /// Format for display with two decimals, e.g. `$19.99`.
    #[must_use]
    pub fn display(&self) -> String {
        format!("${:.2}", self.round_cents().0)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

impl From<Decimal> for Money {
    fn from(amount: Decimal) -> Self {
        Self(amount)
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Mul<u32> for Money {
    type Output = Self;

    fn mul(self, rhs: u32) -> Self::Output {
        Self(self.0 * Decimal::from(rhs))
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_cents() {
        assert_eq!(Money::from_cents(1999).display(), "$19.99");
        assert_eq!(Money::from_dollars(15).display(), "$15.00");
    }

    #[test]
    fn test_arithmetic() {
        let total: Money = [Money::from_dollars(20) * 2, Money::from_cents(550)]
            .into_iter()
            .sum();
        assert_eq!(total, Money::from_cents(4550));
    }

    #[test]
    fn test_percent_rounding() {
        // 8% of 33.33 = 2.6664
        let tax = Money::from_cents(3333).percent(8).round_cents();
        assert_eq!(tax, Money::from_cents(267));
    }

    #[test]
    fn test_deserializes_from_json_number() {
        let m: Money = serde_json::from_str("19.5").unwrap_or_default();
        assert_eq!(m, Money::from_cents(1950));
    }
}
