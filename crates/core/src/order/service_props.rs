//! Property-based tests for the order state machine.

use chrono::{Duration, Utc};
use dealerflow_shared::types::{CustomerId, DealershipId, Money, UserId, VehicleId};
use proptest::prelude::*;

use super::service::OrderWorkflow;
use super::types::{
    ContractUpload, CreateOrder, DeliverOrder, Order, OrderItemInput, OrderStatus, PaymentMethod,
    Recipient,
};
use crate::history::{StatusHistoryEvent, creation_event, replay};
use crate::payment::{PaymentChannel, PaymentInput};
use crate::policy::UploadPolicy;

#[derive(Debug, Clone)]
enum Op {
    Confirm,
    Deposit(u64),
    FullPayment(u64),
    Deliver,
    Complete(i64),
    Cancel,
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::Confirm),
        (0u64..1_200).prop_map(Op::Deposit),
        (0u64..1_200).prop_map(Op::FullPayment),
        Just(Op::Deliver),
        (0i64..48).prop_map(Op::Complete),
        Just(Op::Cancel),
    ]
}

fn signed_order(total: u64) -> Order {
    let now = Utc::now();
    let mut order = OrderWorkflow::create(
        "ORD-000001".into(),
        CreateOrder {
            customer_id: CustomerId::new(),
            items: vec![OrderItemInput::new(VehicleId::new(), "Red", 1, Money::from_minor(total))],
            payment_method: PaymentMethod::Installment,
            notes: None,
        },
        UserId::new(),
        DealershipId::new(),
        now,
    )
    .unwrap();
    OrderWorkflow::upload_signed_contract(
        &mut order,
        vec![ContractUpload {
            filename: "signed.pdf".into(),
            content_type: "application/pdf".into(),
            size: 10,
            storage_ref: "contracts/signed.pdf".into(),
        }],
        &UploadPolicy::default(),
        now,
    )
    .unwrap();
    order
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    // =========================================================================
    // Payments never exceed the order total, and a failed call changes nothing
    // =========================================================================

    #[test]
    fn prop_paid_never_exceeds_final(
        total in 1u64..1_000,
        ops in prop::collection::vec(arb_op(), 1..30),
    ) {
        let mut order = signed_order(total);
        let actor = UserId::new();
        let start = Utc::now();

        for op in ops {
            let before = order.clone();
            let result = match op {
                Op::Confirm => OrderWorkflow::confirm(&mut order, start).map(|_| ()),
                Op::Deposit(amount) => OrderWorkflow::record_deposit(
                    &mut order,
                    PaymentInput::new(Money::from_minor(amount), PaymentChannel::Cash),
                    actor,
                    start,
                ).map(|_| ()),
                Op::FullPayment(amount) => OrderWorkflow::record_full_payment(
                    &mut order,
                    PaymentInput::new(Money::from_minor(amount), PaymentChannel::Cash),
                    actor,
                    start,
                ).map(|_| ()),
                Op::Deliver => OrderWorkflow::deliver(
                    &mut order,
                    DeliverOrder {
                        recipient: Recipient {
                            name: "A".into(),
                            phone: "1".into(),
                            relationship: None,
                        },
                        delivery_person: None,
                        notes: None,
                        actual_date: None,
                    },
                    start,
                ).map(|_| ()),
                Op::Complete(hours) => OrderWorkflow::complete(
                    &mut order,
                    Duration::hours(24),
                    start + Duration::hours(hours),
                ).map(|_| ()),
                Op::Cancel => OrderWorkflow::cancel(&mut order, "changed mind", start).map(|_| ()),
            };

            if result.is_err() {
                prop_assert_eq!(&order, &before);
            }
            prop_assert!(order.paid_amount() <= order.final_amount());
            if order.status() == OrderStatus::FullyPayment {
                prop_assert_eq!(order.paid_amount(), order.final_amount());
            }
        }
    }

    // =========================================================================
    // Replaying the emitted transitions reproduces the current status
    // =========================================================================

    #[test]
    fn prop_history_replay_matches_status(
        total in 1u64..1_000,
        ops in prop::collection::vec(arb_op(), 1..30),
    ) {
        let mut order = signed_order(total);
        let actor = UserId::new();
        let start = Utc::now();
        let id = order.id.into_inner();
        let mut log: Vec<StatusHistoryEvent> =
            vec![creation_event::<OrderStatus>(id, actor, start, None)];

        for op in ops {
            let transition = match op {
                Op::Confirm => OrderWorkflow::confirm(&mut order, start).ok(),
                Op::Deposit(amount) => OrderWorkflow::record_deposit(
                    &mut order,
                    PaymentInput::new(Money::from_minor(amount), PaymentChannel::Cash),
                    actor,
                    start,
                ).ok().and_then(|(_, transition)| transition),
                Op::FullPayment(amount) => OrderWorkflow::record_full_payment(
                    &mut order,
                    PaymentInput::new(Money::from_minor(amount), PaymentChannel::Cash),
                    actor,
                    start,
                ).ok().and_then(|(_, transition)| transition),
                Op::Deliver => OrderWorkflow::deliver(
                    &mut order,
                    DeliverOrder {
                        recipient: Recipient {
                            name: "A".into(),
                            phone: "1".into(),
                            relationship: None,
                        },
                        delivery_person: None,
                        notes: None,
                        actual_date: None,
                    },
                    start,
                ).ok(),
                Op::Complete(hours) => OrderWorkflow::complete(
                    &mut order,
                    Duration::hours(24),
                    start + Duration::hours(hours),
                ).ok(),
                Op::Cancel => OrderWorkflow::cancel(&mut order, "changed mind", start).ok(),
            };
            if let Some(transition) = transition {
                log.push(transition.into_event(id, actor, start, None));
            }
        }

        for (index, event) in log.iter_mut().enumerate() {
            event.sequence = index as u64 + 1;
        }
        prop_assert_eq!(replay::<OrderStatus>(&log).unwrap(), order.status());
    }
}
