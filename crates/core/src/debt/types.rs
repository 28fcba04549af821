//! Manufacturer debt types.

use chrono::{DateTime, Utc};
use dealerflow_shared::types::{
    DealerRequestId, DealershipId, DebtId, ManufacturerId, Money, VehicleId,
};
use serde::{Deserialize, Serialize};

use crate::error::WorkflowError;
use crate::history::{EntityKind, StateMachine};
use crate::payment::PaymentRecord;

/// Settlement state, derived from the amounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebtStatus {
    /// Nothing paid yet.
    Open,
    /// Partly paid.
    Partial,
    /// Fully paid.
    Settled,
}

impl DebtStatus {
    /// Derives the status from the ledger totals.
    ///
    /// An empty ledger (`total = 0`) is reported as `Open`.
    #[must_use]
    pub fn derive(total: Money, paid: Money) -> Self {
        if paid.is_zero() {
            Self::Open
        } else if paid >= total {
            Self::Settled
        } else {
            Self::Partial
        }
    }
}

/// Status changes are recorded in history like any other state machine.
/// A settled ledger goes back to partial when a new delivery accrues.
impl StateMachine for DebtStatus {
    const ENTITY: EntityKind = EntityKind::ManufacturerDebt;

    fn initial() -> Self {
        Self::Open
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Partial => "partial",
            Self::Settled => "settled",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(Self::Open),
            "partial" => Some(Self::Partial),
            "settled" => Some(Self::Settled),
            _ => None,
        }
    }

    fn can_transition(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Open, Self::Partial | Self::Settled)
                | (Self::Partial, Self::Settled)
                | (Self::Settled, Self::Partial)
        )
    }

    fn is_terminal(self) -> bool {
        false
    }
}

/// One delivered request line owed to the manufacturer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebtItem {
    /// Request that delivered the goods.
    pub request_id: DealerRequestId,
    /// Human-readable request code.
    pub request_code: String,
    /// Vehicle model.
    pub vehicle_id: VehicleId,
    /// Color delivered.
    pub color: String,
    /// Units delivered.
    pub quantity: u32,
    /// Wholesale price per unit.
    pub unit_price: Money,
    /// `unit_price × quantity`.
    pub amount: Money,
    /// When the debt was accrued.
    pub accrued_at: DateTime<Utc>,
}

impl DebtItem {
    /// Creates an item, computing `amount`.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a zero quantity, a zero unit price or
    /// on overflow.
    pub fn new(
        request_id: DealerRequestId,
        request_code: impl Into<String>,
        vehicle_id: VehicleId,
        color: impl Into<String>,
        quantity: u32,
        unit_price: Money,
        accrued_at: DateTime<Utc>,
    ) -> Result<Self, WorkflowError> {
        if quantity == 0 {
            return Err(WorkflowError::validation("debt item quantity must be positive"));
        }
        if unit_price.is_zero() {
            return Err(WorkflowError::validation("debt item unit price must be positive"));
        }
        let amount = unit_price
            .checked_mul(quantity)
            .ok_or_else(|| WorkflowError::validation("debt item amount overflow"))?;
        Ok(Self {
            request_id,
            request_code: request_code.into(),
            vehicle_id,
            color: color.into(),
            quantity,
            unit_price,
            amount,
            accrued_at,
        })
    }
}

/// Running payable balance of one dealership towards one manufacturer.
///
/// Totals are only changed through [`crate::debt::DebtLedger`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManufacturerDebt {
    /// Ledger identifier.
    pub id: DebtId,
    /// Debtor dealership.
    pub dealership_id: DealershipId,
    /// Creditor manufacturer.
    pub manufacturer_id: ManufacturerId,
    pub(crate) total_amount: Money,
    pub(crate) paid_amount: Money,
    pub(crate) items: Vec<DebtItem>,
    pub(crate) payments: Vec<PaymentRecord>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
}

impl ManufacturerDebt {
    /// Everything ever accrued.
    #[must_use]
    pub fn total_amount(&self) -> Money {
        self.total_amount
    }

    /// Everything ever paid.
    #[must_use]
    pub fn paid_amount(&self) -> Money {
        self.paid_amount
    }

    /// `total_amount - paid_amount`.
    #[must_use]
    pub fn remaining_amount(&self) -> Money {
        self.total_amount
            .checked_sub(self.paid_amount)
            .unwrap_or(Money::ZERO)
    }

    /// Derived settlement status.
    #[must_use]
    pub fn status(&self) -> DebtStatus {
        DebtStatus::derive(self.total_amount, self.paid_amount)
    }

    /// Accrued lines, oldest first.
    #[must_use]
    pub fn items(&self) -> &[DebtItem] {
        &self.items
    }

    /// Payments, oldest first.
    #[must_use]
    pub fn payments(&self) -> &[PaymentRecord] {
        &self.payments
    }

    /// Read model with derived fields filled in.
    #[must_use]
    pub fn summary(&self) -> DebtSummary {
        DebtSummary {
            id: self.id,
            dealership_id: self.dealership_id,
            manufacturer_id: self.manufacturer_id,
            total_amount: self.total_amount,
            paid_amount: self.paid_amount,
            remaining_amount: self.remaining_amount(),
            status: self.status(),
            item_count: self.items.len(),
            payment_count: self.payments.len(),
            updated_at: self.updated_at,
        }
    }
}

/// Server-computed view of a debt ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebtSummary {
    /// Ledger identifier.
    pub id: DebtId,
    /// Debtor dealership.
    pub dealership_id: DealershipId,
    /// Creditor manufacturer.
    pub manufacturer_id: ManufacturerId,
    /// Everything accrued.
    pub total_amount: Money,
    /// Everything paid.
    pub paid_amount: Money,
    /// Outstanding balance.
    pub remaining_amount: Money,
    /// Derived status.
    pub status: DebtStatus,
    /// Number of accrued lines.
    pub item_count: usize,
    /// Number of payments.
    pub payment_count: usize,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(100, 0, DebtStatus::Open)]
    #[case(100, 40, DebtStatus::Partial)]
    #[case(100, 100, DebtStatus::Settled)]
    #[case(0, 0, DebtStatus::Open)]
    fn test_status_derivation(#[case] total: u64, #[case] paid: u64, #[case] expected: DebtStatus) {
        assert_eq!(
            DebtStatus::derive(Money::from_minor(total), Money::from_minor(paid)),
            expected
        );
    }

    #[test]
    fn test_debt_item_amount() {
        let item = DebtItem::new(
            DealerRequestId::new(),
            "REQ-000001",
            VehicleId::new(),
            "Red",
            5,
            Money::from_minor(20_000),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(item.amount, Money::from_minor(100_000));

        assert!(DebtItem::new(
            DealerRequestId::new(),
            "REQ-000001",
            VehicleId::new(),
            "Red",
            0,
            Money::from_minor(1),
            Utc::now(),
        )
        .is_err());
    }

    #[test]
    fn test_debt_item_rejects_zero_unit_price() {
        let result = DebtItem::new(
            DealerRequestId::new(),
            "REQ-000001",
            VehicleId::new(),
            "Red",
            5,
            Money::ZERO,
            Utc::now(),
        );
        assert!(matches!(result, Err(WorkflowError::Validation(_))));
    }
}
