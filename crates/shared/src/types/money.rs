//! Money type in integer minor units.
//!
//! CRITICAL: Never use floating-point for money calculations.
//! Amounts are stored as an unsigned count of the smallest currency unit,
//! so a `Money` value can never be negative. Signed deltas are not
//! representable on purpose; callers subtract with [`Money::checked_sub`]
//! and treat `None` as a balance violation.

use serde::{Deserialize, Serialize};

/// A non-negative monetary amount in minor currency units.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(u64);

impl Money {
    /// The zero amount.
    pub const ZERO: Self = Self(0);

    /// Creates an amount from minor units.
    #[must_use]
    pub const fn from_minor(units: u64) -> Self {
        Self(units)
    }

    /// Returns the amount in minor units.
    #[must_use]
    pub const fn minor_units(self) -> u64 {
        self.0
    }

    /// Returns true if the amount is zero.
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Adds two amounts, returning `None` on overflow.
    #[must_use]
    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    /// Subtracts `other`, returning `None` if the result would be negative.
    #[must_use]
    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    /// Multiplies by a quantity, returning `None` on overflow.
    #[must_use]
    pub fn checked_mul(self, quantity: u32) -> Option<Self> {
        self.0.checked_mul(u64::from(quantity)).map(Self)
    }

    /// Returns `percent`% of this amount, rounded down to the minor unit.
    ///
    /// Returns `None` for percentages above 100.
    #[must_use]
    pub fn percent_of(self, percent: u8) -> Option<Self> {
        if percent > 100 {
            return None;
        }
        let scaled = u128::from(self.0) * u128::from(percent) / 100;
        // scaled <= self.0, so the conversion cannot fail
        u64::try_from(scaled).ok().map(Self)
    }

    /// Sums an iterator of amounts, returning `None` on overflow.
    pub fn checked_sum<I>(amounts: I) -> Option<Self>
    where
        I: IntoIterator<Item = Self>,
    {
        amounts
            .into_iter()
            .try_fold(Self::ZERO, |acc, amount| acc.checked_add(amount))
    }
}

impl From<u64> for Money {
    fn from(units: u64) -> Self {
        Self(units)
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_zero() {
        assert!(Money::ZERO.is_zero());
        assert_eq!(Money::default(), Money::ZERO);
        assert!(!Money::from_minor(1).is_zero());
    }

    #[test]
    fn test_checked_sub_never_goes_negative() {
        let small = Money::from_minor(100);
        let large = Money::from_minor(250);
        assert_eq!(large.checked_sub(small), Some(Money::from_minor(150)));
        assert_eq!(small.checked_sub(large), None);
        assert_eq!(small.checked_sub(small), Some(Money::ZERO));
    }

    #[test]
    fn test_checked_add_overflow() {
        assert_eq!(Money::from_minor(u64::MAX).checked_add(Money::from_minor(1)), None);
    }

    #[test]
    fn test_checked_mul() {
        assert_eq!(
            Money::from_minor(100_000_000).checked_mul(5),
            Some(Money::from_minor(500_000_000))
        );
        assert_eq!(Money::from_minor(u64::MAX).checked_mul(2), None);
    }

    #[test]
    fn test_percent_of() {
        let total = Money::from_minor(500_000_000);
        assert_eq!(total.percent_of(30), Some(Money::from_minor(150_000_000)));
        assert_eq!(Money::from_minor(10).percent_of(33), Some(Money::from_minor(3)));
        assert_eq!(total.percent_of(100), Some(total));
        assert_eq!(total.percent_of(101), None);
    }

    #[test]
    fn test_checked_sum() {
        let amounts = [Money::from_minor(1), Money::from_minor(2), Money::from_minor(3)];
        assert_eq!(Money::checked_sum(amounts), Some(Money::from_minor(6)));
        assert_eq!(Money::checked_sum(Vec::new()), Some(Money::ZERO));
    }

    #[test]
    fn test_serde_transparent() {
        let json = serde_json::to_string(&Money::from_minor(42)).unwrap();
        assert_eq!(json, "42");
        let back: Money = serde_json::from_str("42").unwrap();
        assert_eq!(back, Money::from_minor(42));
        assert!(serde_json::from_str::<Money>("-1").is_err());
    }
}
