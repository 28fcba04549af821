//! Property-based tests for Money arithmetic.

use proptest::prelude::*;

use super::money::Money;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// a + b - b == a whenever the addition does not overflow
    #[test]
    fn prop_add_then_sub_roundtrips(a in 0u64..u64::MAX / 2, b in 0u64..u64::MAX / 2) {
        let a = Money::from_minor(a);
        let b = Money::from_minor(b);
        let sum = a.checked_add(b).unwrap();
        prop_assert_eq!(sum.checked_sub(b), Some(a));
    }

    /// Subtraction succeeds exactly when the result is non-negative
    #[test]
    fn prop_sub_defined_iff_non_negative(a in any::<u64>(), b in any::<u64>()) {
        let result = Money::from_minor(a).checked_sub(Money::from_minor(b));
        prop_assert_eq!(result.is_some(), a >= b);
    }

    /// A percentage never exceeds the whole
    #[test]
    fn prop_percent_bounded(amount in any::<u64>(), percent in 0u8..=100) {
        let whole = Money::from_minor(amount);
        let part = whole.percent_of(percent).unwrap();
        prop_assert!(part <= whole);
    }
}
