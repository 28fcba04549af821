//! Manufacturer debt ledger operations.

use chrono::{DateTime, Utc};
use dealerflow_shared::types::{DealershipId, DebtId, ManufacturerId, Money, UserId};

use super::types::{DebtItem, ManufacturerDebt};
use crate::error::WorkflowError;
use crate::payment::{self, PaymentInput, PaymentKind, PaymentOutcome, PaymentRecord};

/// Stateless debt ledger.
///
/// `total_amount` and `paid_amount` only ever grow, and `paid_amount`
/// never exceeds `total_amount`.
pub struct DebtLedger;

impl DebtLedger {
    /// Opens an empty ledger for a (dealership, manufacturer) pair.
    #[must_use]
    pub fn open(
        dealership_id: DealershipId,
        manufacturer_id: ManufacturerId,
        now: DateTime<Utc>,
    ) -> ManufacturerDebt {
        ManufacturerDebt {
            id: DebtId::new(),
            dealership_id,
            manufacturer_id,
            total_amount: Money::ZERO,
            paid_amount: Money::ZERO,
            items: Vec::new(),
            payments: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Appends delivered lines and grows `total_amount` by their sum.
    ///
    /// Returns the accrued amount.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an empty item list or on overflow.
    pub fn accrue(
        debt: &mut ManufacturerDebt,
        items: Vec<DebtItem>,
        now: DateTime<Utc>,
    ) -> Result<Money, WorkflowError> {
        if items.is_empty() {
            return Err(WorkflowError::validation("nothing to accrue"));
        }
        let accrued = Money::checked_sum(items.iter().map(|item| item.amount))
            .ok_or_else(|| WorkflowError::validation("accrued amount overflow"))?;
        let total = debt
            .total_amount
            .checked_add(accrued)
            .ok_or_else(|| WorkflowError::validation("debt total overflow"))?;

        debt.total_amount = total;
        debt.items.extend(items);
        debt.updated_at = now;
        Ok(accrued)
    }

    /// Applies a payment against the outstanding balance.
    ///
    /// A payment whose idempotency key was already applied is not applied
    /// again; the earlier record is returned as [`PaymentOutcome::Replayed`].
    ///
    /// # Errors
    ///
    /// - `Validation` for a zero amount or a reused key with another amount
    /// - `InsufficientBalance` if the amount exceeds `remaining_amount`
    pub fn record_payment(
        debt: &mut ManufacturerDebt,
        input: PaymentInput,
        recorded_by: UserId,
        now: DateTime<Utc>,
    ) -> Result<PaymentOutcome, WorkflowError> {
        let key = input.idempotency_key.as_deref();
        if let Some(previous) = payment::find_replay(&debt.payments, key) {
            return payment::check_replay(previous, PaymentKind::DebtPayment, &input);
        }
        if input.amount.is_zero() {
            return Err(WorkflowError::validation("payment amount must be positive"));
        }
        let remaining = debt.remaining_amount();
        if input.amount > remaining {
            return Err(WorkflowError::InsufficientBalance {
                requested: input.amount,
                remaining,
            });
        }

        // amount <= remaining, so this cannot overflow total
        debt.paid_amount = debt
            .paid_amount
            .checked_add(input.amount)
            .ok_or_else(|| WorkflowError::validation("paid amount overflow"))?;
        let record =
            PaymentRecord::from_input(input, PaymentKind::DebtPayment, recorded_by, now);
        debt.payments.push(record.clone());
        debt.updated_at = now;
        Ok(PaymentOutcome::Applied(record))
    }
}
