//! Order state machine.
//!
//! Every function validates against the order's current state before it
//! mutates anything, so on `Err` the order is unchanged. Stock side effects
//! are planned by the engine; this module only moves the order itself.

use chrono::{DateTime, Duration, Utc};
use dealerflow_shared::types::{DealershipId, Money, OrderId, UserId};

use super::contract::screen_uploads;
use super::types::{
    Contract, ContractMeta, ContractStatus, ContractUpload, CreateOrder, DeliverOrder, Delivery,
    DeliveryStatus, Order, OrderItem, OrderStatus, UploadOutcome,
};
use crate::error::WorkflowError;
use crate::history::{StateMachine, Transition};
use crate::payment::{self, PaymentInput, PaymentKind, PaymentOutcome, PaymentRecord};
use crate::policy::{UploadPolicy, WorkflowPolicy};

/// Stateless service for order transitions.
pub struct OrderWorkflow;

impl OrderWorkflow {
    /// Builds a new order in `pending`.
    ///
    /// # Errors
    ///
    /// Returns a validation error if `items` is empty, any line is invalid,
    /// or the total overflows.
    pub fn create(
        code: String,
        input: CreateOrder,
        salesperson_id: UserId,
        dealership_id: DealershipId,
        now: DateTime<Utc>,
    ) -> Result<Order, WorkflowError> {
        if input.items.is_empty() {
            return Err(WorkflowError::validation("order must contain at least one item"));
        }
        let items = input
            .items
            .into_iter()
            .map(OrderItem::from_input)
            .collect::<Result<Vec<_>, _>>()?;
        let final_amount = Money::checked_sum(items.iter().map(|item| item.final_amount))
            .ok_or_else(|| WorkflowError::validation("order total overflow"))?;

        Ok(Order {
            id: OrderId::new(),
            code,
            customer_id: input.customer_id,
            salesperson_id,
            dealership_id,
            items,
            final_amount,
            paid_amount: Money::ZERO,
            payment_method: input.payment_method,
            status: OrderStatus::initial(),
            contract: Contract::default(),
            delivery: Delivery::default(),
            payments: Vec::new(),
            stock_allocations: Vec::new(),
            notes: input.notes,
            cancel_reason: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// `pending → confirmed`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` unless the order is pending.
    pub fn confirm(
        order: &mut Order,
        now: DateTime<Utc>,
    ) -> Result<Transition<OrderStatus>, WorkflowError> {
        Self::move_to(order, OrderStatus::Confirmed, now)
    }

    /// Issues a draft contract number. Status is unchanged.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` unless the order is pending.
    pub fn generate_contract(
        order: &mut Order,
        meta: ContractMeta,
        prefix: &str,
        now: DateTime<Utc>,
    ) -> Result<(), WorkflowError> {
        Self::require_status(order, &[OrderStatus::Pending], "contract_generated")?;
        order.contract.number = Some(format!("{prefix}{}", now.timestamp_millis()));
        order.contract.contract_date = Some(meta.contract_date.unwrap_or(now));
        order.contract.signing_location = meta.signing_location;
        order.contract.generated_at = Some(now);
        if order.contract.status == ContractStatus::Unsigned {
            order.contract.status = ContractStatus::Generated;
        }
        order.updated_at = now;
        Ok(())
    }

    /// Attaches signed-contract files.
    ///
    /// Each file is screened on its own; accepted files are attached even if
    /// others are refused, and the contract becomes `signed`.
    ///
    /// # Errors
    ///
    /// - `InvalidTransition` unless pending or confirmed
    /// - `Validation` if no file is offered or none is accepted
    pub fn upload_signed_contract(
        order: &mut Order,
        files: Vec<ContractUpload>,
        policy: &UploadPolicy,
        now: DateTime<Utc>,
    ) -> Result<UploadOutcome, WorkflowError> {
        Self::require_status(
            order,
            &[OrderStatus::Pending, OrderStatus::Confirmed],
            "contract_signed",
        )?;
        if files.is_empty() {
            return Err(WorkflowError::validation("no contract files submitted"));
        }

        let outcome = screen_uploads(files, &order.contract.files, policy, now);
        if outcome.accepted.is_empty() {
            let reasons: Vec<String> = outcome
                .rejected
                .iter()
                .map(|file| format!("{}: {}", file.filename, file.reason))
                .collect();
            return Err(WorkflowError::validation(format!(
                "no contract file accepted ({})",
                reasons.join("; ")
            )));
        }

        order.contract.files.extend(outcome.accepted.iter().cloned());
        order.contract.status = ContractStatus::Signed;
        order.contract.signed_at.get_or_insert(now);
        order.contract.uploaded_at = Some(now);
        order.updated_at = now;
        Ok(outcome)
    }

    /// Records a deposit.
    ///
    /// Moves `pending`/`confirmed` to `halfPayment`, or straight to
    /// `fullyPayment` if the deposit settles the whole balance. A retried
    /// call with a known idempotency key changes nothing.
    ///
    /// # Errors
    ///
    /// - `InvalidTransition` unless pending or confirmed
    /// - `Validation` without a signed contract or for a zero amount
    /// - `InsufficientBalance` if the amount exceeds the outstanding balance
    pub fn record_deposit(
        order: &mut Order,
        input: PaymentInput,
        recorded_by: UserId,
        now: DateTime<Utc>,
    ) -> Result<(PaymentOutcome, Option<Transition<OrderStatus>>), WorkflowError> {
        let key = input.idempotency_key.as_deref();
        if let Some(previous) = payment::find_replay(&order.payments, key) {
            return Ok((payment::check_replay(previous, PaymentKind::Deposit, &input)?, None));
        }
        if !matches!(order.status, OrderStatus::Pending | OrderStatus::Confirmed) {
            return Err(Self::invalid(order.status, OrderStatus::HalfPayment));
        }
        Self::require_payable(order, &input)?;

        let outstanding = order.outstanding();
        if input.amount > outstanding {
            return Err(WorkflowError::InsufficientBalance {
                requested: input.amount,
                remaining: outstanding,
            });
        }
        let target = if input.amount == outstanding {
            OrderStatus::FullyPayment
        } else {
            OrderStatus::HalfPayment
        };
        Self::apply_payment(order, input, PaymentKind::Deposit, recorded_by, target, now)
    }

    /// Records the payment that settles the order.
    ///
    /// # Errors
    ///
    /// - `InvalidTransition` unless pending, confirmed or halfPayment
    /// - `Validation` without a signed contract, for a zero amount, or if
    ///   the amount leaves a balance
    /// - `InsufficientBalance` if the amount exceeds the outstanding balance
    pub fn record_full_payment(
        order: &mut Order,
        input: PaymentInput,
        recorded_by: UserId,
        now: DateTime<Utc>,
    ) -> Result<(PaymentOutcome, Option<Transition<OrderStatus>>), WorkflowError> {
        let key = input.idempotency_key.as_deref();
        if let Some(previous) = payment::find_replay(&order.payments, key) {
            return Ok((payment::check_replay(previous, PaymentKind::FullPayment, &input)?, None));
        }
        if !order.status.accepts_payment() {
            return Err(Self::invalid(order.status, OrderStatus::FullyPayment));
        }
        Self::require_payable(order, &input)?;

        let outstanding = order.outstanding();
        if input.amount > outstanding {
            return Err(WorkflowError::InsufficientBalance {
                requested: input.amount,
                remaining: outstanding,
            });
        }
        if input.amount < outstanding {
            return Err(WorkflowError::validation(format!(
                "full payment must equal the outstanding balance of {outstanding}, got {}",
                input.amount
            )));
        }
        Self::apply_payment(
            order,
            input,
            PaymentKind::FullPayment,
            recorded_by,
            OrderStatus::FullyPayment,
            now,
        )
    }

    /// The default deposit for an order.
    #[must_use]
    pub fn suggested_deposit(order: &Order, policy: &WorkflowPolicy) -> Money {
        order
            .final_amount
            .percent_of(policy.default_deposit_percent)
            .unwrap_or(order.final_amount)
            .min(order.outstanding())
    }

    /// Plans a delivery date. Status is unchanged.
    ///
    /// # Errors
    ///
    /// - `InvalidTransition` unless halfPayment or fullyPayment
    /// - `Validation` for a date in the past
    pub fn schedule_delivery(
        order: &mut Order,
        scheduled_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), WorkflowError> {
        Self::require_status(
            order,
            &[OrderStatus::HalfPayment, OrderStatus::FullyPayment],
            "delivery_scheduled",
        )?;
        if scheduled_at < now {
            return Err(WorkflowError::validation("delivery date is in the past"));
        }
        order.delivery.status = DeliveryStatus::Scheduled;
        order.delivery.scheduled_at = Some(scheduled_at);
        order.updated_at = now;
        Ok(())
    }

    /// `fullyPayment → delivered`, starting the completion wait.
    ///
    /// # Errors
    ///
    /// - `InvalidTransition` unless fullyPayment
    /// - `Validation` for a missing recipient name or phone, or a future date
    pub fn deliver(
        order: &mut Order,
        input: DeliverOrder,
        now: DateTime<Utc>,
    ) -> Result<Transition<OrderStatus>, WorkflowError> {
        order.status.ensure_transition(OrderStatus::Delivered)?;

        let mut recipient = input.recipient;
        recipient.name = recipient.name.trim().to_string();
        recipient.phone = recipient.phone.trim().to_string();
        if recipient.name.is_empty() {
            return Err(WorkflowError::validation("recipient name is required"));
        }
        if recipient.phone.is_empty() {
            return Err(WorkflowError::validation("recipient phone is required"));
        }
        let delivered_at = input.actual_date.unwrap_or(now);
        if delivered_at > now {
            return Err(WorkflowError::validation("delivery date cannot be in the future"));
        }

        order.delivery.status = DeliveryStatus::Delivered;
        order.delivery.delivered_at = Some(delivered_at);
        order.delivery.recipient = Some(recipient);
        order.delivery.delivery_person = input.delivery_person;
        order.delivery.notes = input.notes;
        Self::move_to(order, OrderStatus::Delivered, now)
    }

    /// `delivered → completed`, no earlier than `wait` after delivery.
    ///
    /// # Errors
    ///
    /// - `InvalidTransition` unless delivered
    /// - `TooEarly` with the remaining wait if `wait` has not elapsed
    pub fn complete(
        order: &mut Order,
        wait: Duration,
        now: DateTime<Utc>,
    ) -> Result<Transition<OrderStatus>, WorkflowError> {
        order.status.ensure_transition(OrderStatus::Completed)?;
        let delivered_at = order
            .delivery
            .delivered_at
            .ok_or_else(|| WorkflowError::validation("order has no delivery timestamp"))?;

        let elapsed = now.signed_duration_since(delivered_at);
        if elapsed < wait {
            return Err(WorkflowError::TooEarly {
                action: "complete order",
                remaining: wait - elapsed,
            });
        }
        Self::move_to(order, OrderStatus::Completed, now)
    }

    /// Any non-terminal status → `cancelled`.
    ///
    /// Stock held or sold for the order is returned by the engine.
    ///
    /// # Errors
    ///
    /// - `Validation` for a blank reason
    /// - `InvalidTransition` from a terminal status
    pub fn cancel(
        order: &mut Order,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<Transition<OrderStatus>, WorkflowError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(WorkflowError::validation("cancellation reason is required"));
        }
        let transition = Self::move_to(order, OrderStatus::Cancelled, now)?;
        order.cancel_reason = Some(reason.to_string());
        Ok(transition)
    }

    fn require_payable(order: &Order, input: &PaymentInput) -> Result<(), WorkflowError> {
        if !order.contract.is_signed() {
            return Err(WorkflowError::validation(
                "a signed contract is required before recording payments",
            ));
        }
        if input.amount.is_zero() {
            return Err(WorkflowError::validation("payment amount must be positive"));
        }
        Ok(())
    }

    fn apply_payment(
        order: &mut Order,
        input: PaymentInput,
        kind: PaymentKind,
        recorded_by: UserId,
        target: OrderStatus,
        now: DateTime<Utc>,
    ) -> Result<(PaymentOutcome, Option<Transition<OrderStatus>>), WorkflowError> {
        order.status.ensure_transition(target)?;
        order.paid_amount = order
            .paid_amount
            .checked_add(input.amount)
            .ok_or_else(|| WorkflowError::validation("paid amount overflow"))?;
        let record = PaymentRecord::from_input(input, kind, recorded_by, now);
        order.payments.push(record.clone());
        let transition = Self::move_to(order, target, now)?;
        Ok((PaymentOutcome::Applied(record), Some(transition)))
    }

    fn move_to(
        order: &mut Order,
        to: OrderStatus,
        now: DateTime<Utc>,
    ) -> Result<Transition<OrderStatus>, WorkflowError> {
        let from = order.status;
        from.ensure_transition(to)?;
        order.status = to;
        order.updated_at = now;
        Ok(Transition { from, to })
    }

    fn require_status(
        order: &Order,
        allowed: &[OrderStatus],
        action: &'static str,
    ) -> Result<(), WorkflowError> {
        if allowed.contains(&order.status) {
            Ok(())
        } else {
            Err(WorkflowError::InvalidTransition {
                entity: OrderStatus::ENTITY,
                from: order.status.as_str(),
                to: action,
            })
        }
    }

    fn invalid(from: OrderStatus, to: OrderStatus) -> WorkflowError {
        WorkflowError::InvalidTransition {
            entity: OrderStatus::ENTITY,
            from: from.as_str(),
            to: to.as_str(),
        }
    }
}
