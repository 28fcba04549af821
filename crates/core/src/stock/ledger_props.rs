//! Property-based tests for the stock ledger.

use chrono::Utc;
use dealerflow_shared::types::{DealershipId, OrderId, VehicleId};
use proptest::prelude::*;

use super::ledger::StockLedger;
use super::types::{StockEntry, StockKey, StockOwner};

#[derive(Debug, Clone)]
enum Op {
    Receive(u32),
    Sell(u32),
    Reserve(usize, u32),
    Release(usize),
    Commit(usize),
    Reverse(u32),
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1u32..5).prop_map(Op::Receive),
        (1u32..5).prop_map(Op::Sell),
        (0usize..3, 1u32..4).prop_map(|(order, qty)| Op::Reserve(order, qty)),
        (0usize..3).prop_map(Op::Release),
        (0usize..3).prop_map(Op::Commit),
        (1u32..3).prop_map(Op::Reverse),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Any sequence of ledger calls keeps remaining >= reserved >= 0 and
    /// remaining == total - sold.
    #[test]
    fn prop_remaining_never_negative(ops in prop::collection::vec(arb_op(), 1..60)) {
        let owner = StockOwner::Dealer(DealershipId::new());
        let key = StockKey::new(VehicleId::new(), "Red", owner).unwrap();
        let mut entry = StockEntry::empty(key, Utc::now());
        let orders = [OrderId::new(), OrderId::new(), OrderId::new()];

        for op in ops {
            let before = entry.clone();
            let result = match op {
                Op::Receive(qty) => StockLedger::receive(&mut entry, qty, Utc::now()),
                Op::Sell(qty) => StockLedger::decrement_on_sale(&mut entry, qty, Utc::now()),
                Op::Reserve(order, qty) => {
                    StockLedger::reserve(&mut entry, orders[order], qty, Utc::now())
                }
                Op::Release(order) => {
                    StockLedger::release(&mut entry, orders[order], Utc::now()).map(|_| ())
                }
                Op::Commit(order) => {
                    StockLedger::commit_reservation(&mut entry, orders[order], Utc::now())
                        .map(|_| ())
                }
                Op::Reverse(qty) => StockLedger::reverse_sale(&mut entry, qty, Utc::now()),
            };

            if result.is_err() {
                // failed calls leave quantities untouched
                prop_assert_eq!(entry.total_quantity(), before.total_quantity());
                prop_assert_eq!(entry.total_sold(), before.total_sold());
                prop_assert_eq!(entry.reserved(), before.reserved());
            }
            prop_assert!(entry.total_sold() <= entry.total_quantity());
            prop_assert_eq!(entry.remaining(), entry.total_quantity() - entry.total_sold());
            prop_assert!(entry.reserved() <= entry.remaining());
        }
    }
}
