//! Property-based tests for the debt ledger.

use chrono::Utc;
use dealerflow_shared::types::{
    DealerRequestId, DealershipId, ManufacturerId, Money, UserId, VehicleId,
};
use proptest::prelude::*;

use super::ledger::DebtLedger;
use super::types::{DebtItem, DebtStatus};
use crate::payment::{PaymentChannel, PaymentInput};

#[derive(Debug, Clone)]
enum Op {
    Accrue(u32, u64),
    Pay(u64),
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1u32..10, 1u64..1_000_000).prop_map(|(qty, price)| Op::Accrue(qty, price)),
        (0u64..5_000_000).prop_map(Op::Pay),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// remaining == total - paid and the status label agrees with the
    /// numbers after every call; totals never shrink.
    #[test]
    fn prop_remaining_and_status_consistent(ops in prop::collection::vec(arb_op(), 1..40)) {
        let mut debt = DebtLedger::open(DealershipId::new(), ManufacturerId::new(), Utc::now());

        for op in ops {
            let total_before = debt.total_amount();
            let paid_before = debt.paid_amount();
            match op {
                Op::Accrue(qty, price) => {
                    let item = DebtItem::new(
                        DealerRequestId::new(),
                        "REQ-000001",
                        VehicleId::new(),
                        "Red",
                        qty,
                        Money::from_minor(price),
                        Utc::now(),
                    ).unwrap();
                    DebtLedger::accrue(&mut debt, vec![item], Utc::now()).unwrap();
                }
                Op::Pay(amount) => {
                    let _ = DebtLedger::record_payment(
                        &mut debt,
                        PaymentInput::new(Money::from_minor(amount), PaymentChannel::Cash),
                        UserId::new(),
                        Utc::now(),
                    );
                }
            }

            prop_assert!(debt.total_amount() >= total_before);
            prop_assert!(debt.paid_amount() >= paid_before);
            prop_assert!(debt.paid_amount() <= debt.total_amount());
            prop_assert_eq!(
                debt.remaining_amount().minor_units(),
                debt.total_amount().minor_units() - debt.paid_amount().minor_units()
            );
            let expected = if debt.paid_amount().is_zero() {
                DebtStatus::Open
            } else if debt.remaining_amount().is_zero() {
                DebtStatus::Settled
            } else {
                DebtStatus::Partial
            };
            prop_assert_eq!(debt.status(), expected);
        }
    }
}
