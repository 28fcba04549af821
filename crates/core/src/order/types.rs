//! Order domain types.
//!
//! An order moves through these statuses:
//! - pending → confirmed (confirm)
//! - pending | confirmed → halfPayment (deposit)
//! - pending | confirmed | halfPayment → fullyPayment (full payment)
//! - fullyPayment → delivered (deliver)
//! - delivered → completed (complete, 24h after delivery)
//! - any non-terminal status → cancelled (cancel)

use chrono::{DateTime, Utc};
use dealerflow_shared::types::{
    ContractFileId, CustomerId, DealershipId, Money, OrderId, UserId, VehicleId,
};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::WorkflowError;
use crate::history::{EntityKind, StateMachine};
use crate::payment::PaymentRecord;
use crate::stock::{StockKey, normalize_color};

/// Order status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OrderStatus {
    /// Created by a salesperson; nothing paid yet.
    Pending,
    /// Confirmed by the dealership.
    Confirmed,
    /// A deposit has been recorded.
    #[serde(alias = "half_payment")]
    HalfPayment,
    /// The full price has been paid.
    #[serde(alias = "fully_paid", alias = "fully_payment")]
    FullyPayment,
    /// Handed over to the customer.
    Delivered,
    /// Closed after the post-delivery wait (terminal).
    Completed,
    /// Cancelled (terminal).
    #[serde(alias = "canceled")]
    Cancelled,
}

impl OrderStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [Self; 7] = [
        Self::Pending,
        Self::Confirmed,
        Self::HalfPayment,
        Self::FullyPayment,
        Self::Delivered,
        Self::Completed,
        Self::Cancelled,
    ];

    /// Returns true while payments may still be recorded.
    #[must_use]
    pub fn accepts_payment(&self) -> bool {
        matches!(self, Self::Pending | Self::Confirmed | Self::HalfPayment)
    }

    /// Returns true before the vehicles leave the dealership.
    #[must_use]
    pub fn is_pre_delivery(&self) -> bool {
        matches!(
            self,
            Self::Pending | Self::Confirmed | Self::HalfPayment | Self::FullyPayment
        )
    }
}

impl StateMachine for OrderStatus {
    const ENTITY: EntityKind = EntityKind::Order;

    fn initial() -> Self {
        Self::Pending
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::HalfPayment => "halfPayment",
            Self::FullyPayment => "fullyPayment",
            Self::Delivered => "delivered",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "confirmed" => Some(Self::Confirmed),
            "halfPayment" | "half_payment" => Some(Self::HalfPayment),
            "fullyPayment" | "fully_payment" | "fully_paid" => Some(Self::FullyPayment),
            "delivered" => Some(Self::Delivered),
            "completed" => Some(Self::Completed),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    fn can_transition(self, to: Self) -> bool {
        use OrderStatus::{
            Cancelled, Completed, Confirmed, Delivered, FullyPayment, HalfPayment, Pending,
        };
        matches!(
            (self, to),
            (Pending, Confirmed)
                | (Pending | Confirmed, HalfPayment)
                | (Pending | Confirmed | HalfPayment, FullyPayment)
                | (FullyPayment, Delivered)
                | (Delivered, Completed)
                | (
                    Pending | Confirmed | HalfPayment | FullyPayment | Delivered,
                    Cancelled
                )
        )
    }

    fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the customer pays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Paid by the customer directly.
    Cash,
    /// Financed.
    Installment,
}

/// A priced add-on (option or accessory) on an order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedExtra {
    /// Display name.
    pub name: String,
    /// Price for the whole line.
    pub price: Money,
}

/// Caller-supplied order line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItemInput {
    /// Vehicle model.
    pub vehicle_id: VehicleId,
    /// Color.
    pub color: String,
    /// Units; must be positive.
    pub quantity: u32,
    /// Price per unit.
    pub unit_price: Money,
    /// Discount per unit; may not exceed the unit price.
    #[serde(default)]
    pub discount: Money,
    /// Selected options.
    #[serde(default)]
    pub options: Vec<PricedExtra>,
    /// Selected accessories.
    #[serde(default)]
    pub accessories: Vec<PricedExtra>,
}

impl OrderItemInput {
    /// A plain line without discount or extras.
    #[must_use]
    pub fn new(
        vehicle_id: VehicleId,
        color: impl Into<String>,
        quantity: u32,
        unit_price: Money,
    ) -> Self {
        Self {
            vehicle_id,
            color: color.into(),
            quantity,
            unit_price,
            discount: Money::ZERO,
            options: Vec::new(),
            accessories: Vec::new(),
        }
    }
}

/// A validated order line with its computed amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    /// Vehicle model.
    pub vehicle_id: VehicleId,
    /// Color, trimmed.
    pub color: String,
    /// Units.
    pub quantity: u32,
    /// Price per unit.
    pub unit_price: Money,
    /// Discount per unit.
    pub discount: Money,
    /// Selected options.
    pub options: Vec<PricedExtra>,
    /// Selected accessories.
    pub accessories: Vec<PricedExtra>,
    /// `(unit_price - discount) × quantity + Σ options + Σ accessories`.
    pub final_amount: Money,
}

impl OrderItem {
    /// Validates a line and computes its final amount.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a zero quantity, a blank color, a
    /// discount above the unit price, or on overflow.
    pub fn from_input(input: OrderItemInput) -> Result<Self, WorkflowError> {
        if input.quantity == 0 {
            return Err(WorkflowError::validation("item quantity must be positive"));
        }
        let color = normalize_color(&input.color)?;
        let net_unit = input.unit_price.checked_sub(input.discount).ok_or_else(|| {
            WorkflowError::validation(format!(
                "discount {} exceeds unit price {}",
                input.discount, input.unit_price
            ))
        })?;

        let overflow = || WorkflowError::validation("item amount overflow");
        let extras = Money::checked_sum(
            input
                .options
                .iter()
                .chain(input.accessories.iter())
                .map(|extra| extra.price),
        )
        .ok_or_else(overflow)?;
        let final_amount = net_unit
            .checked_mul(input.quantity)
            .and_then(|lines| lines.checked_add(extras))
            .ok_or_else(overflow)?;

        Ok(Self {
            vehicle_id: input.vehicle_id,
            color,
            quantity: input.quantity,
            unit_price: input.unit_price,
            discount: input.discount,
            options: input.options,
            accessories: input.accessories,
            final_amount,
        })
    }
}

/// Input for creating an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrder {
    /// The buying customer.
    pub customer_id: CustomerId,
    /// Order lines; at least one.
    pub items: Vec<OrderItemInput>,
    /// Cash or installment.
    pub payment_method: PaymentMethod,
    /// Free-form notes.
    #[serde(default)]
    pub notes: Option<String>,
}

/// Contract sub-status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractStatus {
    /// No contract yet.
    #[default]
    Unsigned,
    /// A draft contract number has been issued.
    Generated,
    /// A signed copy has been uploaded.
    Signed,
}

/// Caller-supplied fields for a draft contract.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContractMeta {
    /// Contract date; defaults to now.
    #[serde(default)]
    pub contract_date: Option<DateTime<Utc>>,
    /// Where the contract will be signed.
    #[serde(default)]
    pub signing_location: Option<String>,
}

/// A signed-contract file held by external document storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractFile {
    /// File identifier.
    pub id: ContractFileId,
    /// Original filename.
    pub filename: String,
    /// MIME type.
    pub content_type: String,
    /// Size in bytes.
    pub size: u64,
    /// Reference into document storage.
    pub storage_ref: String,
    /// Upload time.
    pub uploaded_at: DateTime<Utc>,
}

/// One file offered for upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractUpload {
    /// Original filename.
    pub filename: String,
    /// MIME type as declared by the client.
    pub content_type: String,
    /// Size in bytes.
    pub size: u64,
    /// Reference into document storage.
    pub storage_ref: String,
}

/// A file that failed screening.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedFile {
    /// Original filename.
    pub filename: String,
    /// Why it was refused.
    pub reason: String,
}

/// Per-file result of a contract upload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadOutcome {
    /// Files attached to the order.
    pub accepted: Vec<ContractFile>,
    /// Files refused, with reasons.
    pub rejected: Vec<RejectedFile>,
}

/// Contract sub-record of an order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contract {
    /// Sub-status.
    pub status: ContractStatus,
    /// Draft contract number (`HD` + unix millis).
    pub number: Option<String>,
    /// Contract date.
    pub contract_date: Option<DateTime<Utc>>,
    /// Signing location.
    pub signing_location: Option<String>,
    /// When the draft was generated.
    pub generated_at: Option<DateTime<Utc>>,
    /// When the first signed copy was accepted.
    pub signed_at: Option<DateTime<Utc>>,
    /// When the last signed copy was accepted.
    pub uploaded_at: Option<DateTime<Utc>>,
    /// Signed-contract files.
    pub files: Vec<ContractFile>,
}

impl Contract {
    /// Returns true once a signed copy is on file.
    #[must_use]
    pub fn is_signed(&self) -> bool {
        self.status == ContractStatus::Signed
    }
}

/// Delivery sub-status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// No date set.
    #[default]
    NotScheduled,
    /// A date is planned.
    Scheduled,
    /// Handed over.
    Delivered,
}

/// Who received the vehicles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    /// Full name; required.
    pub name: String,
    /// Phone number; required.
    pub phone: String,
    /// Relationship to the customer, if not the customer.
    #[serde(default)]
    pub relationship: Option<String>,
}

/// Input for handing an order over.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliverOrder {
    /// Who received the vehicles.
    pub recipient: Recipient,
    /// Staff member who delivered.
    #[serde(default)]
    pub delivery_person: Option<String>,
    /// Free-form notes.
    #[serde(default)]
    pub notes: Option<String>,
    /// Actual hand-over time; defaults to now and may not be in the future.
    #[serde(default)]
    pub actual_date: Option<DateTime<Utc>>,
}

/// Delivery sub-record of an order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    /// Sub-status.
    pub status: DeliveryStatus,
    /// Planned date.
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Actual hand-over time; starts the completion wait.
    pub delivered_at: Option<DateTime<Utc>>,
    /// Who received the vehicles.
    pub recipient: Option<Recipient>,
    /// Staff member who delivered.
    pub delivery_person: Option<String>,
    /// Free-form notes.
    pub notes: Option<String>,
}

/// Whether allocated units are held or sold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationState {
    /// Soft-held on the stock row.
    Reserved,
    /// Counted in the row's `total_sold`.
    Sold,
}

/// Units of one stock row allocated to an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAllocation {
    /// The stock row.
    pub key: StockKey,
    /// Units allocated.
    pub quantity: u32,
    /// Held or sold.
    pub state: AllocationState,
}

/// A customer order.
///
/// Amounts and status are only changed through [`crate::order::OrderWorkflow`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Order identifier.
    pub id: OrderId,
    /// Human-readable code (`ORD-000001`).
    pub code: String,
    /// The buying customer.
    pub customer_id: CustomerId,
    /// Salesperson who created the order.
    pub salesperson_id: UserId,
    /// Owning dealership.
    pub dealership_id: DealershipId,
    /// Order lines.
    pub items: Vec<OrderItem>,
    pub(crate) final_amount: Money,
    pub(crate) paid_amount: Money,
    /// Cash or installment.
    pub payment_method: PaymentMethod,
    pub(crate) status: OrderStatus,
    /// Contract sub-record.
    pub contract: Contract,
    /// Delivery sub-record.
    pub delivery: Delivery,
    pub(crate) payments: Vec<PaymentRecord>,
    pub(crate) stock_allocations: Vec<StockAllocation>,
    /// Free-form notes.
    pub notes: Option<String>,
    /// Reason given on cancellation.
    pub cancel_reason: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Current status.
    #[must_use]
    pub fn status(&self) -> OrderStatus {
        self.status
    }

    /// Sum of line amounts.
    #[must_use]
    pub fn final_amount(&self) -> Money {
        self.final_amount
    }

    /// Amount paid so far.
    #[must_use]
    pub fn paid_amount(&self) -> Money {
        self.paid_amount
    }

    /// `final_amount - paid_amount`.
    #[must_use]
    pub fn outstanding(&self) -> Money {
        self.final_amount
            .checked_sub(self.paid_amount)
            .unwrap_or(Money::ZERO)
    }

    /// Payments, oldest first.
    #[must_use]
    pub fn payments(&self) -> &[PaymentRecord] {
        &self.payments
    }

    /// Stock rows held or sold for this order.
    #[must_use]
    pub fn stock_allocations(&self) -> &[StockAllocation] {
        &self.stock_allocations
    }

    /// Returns true if any stock is currently held for this order.
    #[must_use]
    pub fn has_reservations(&self) -> bool {
        self.stock_allocations
            .iter()
            .any(|allocation| allocation.state == AllocationState::Reserved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(OrderStatus::Pending, OrderStatus::Confirmed, true)]
    #[case(OrderStatus::Pending, OrderStatus::HalfPayment, true)]
    #[case(OrderStatus::Confirmed, OrderStatus::FullyPayment, true)]
    #[case(OrderStatus::HalfPayment, OrderStatus::FullyPayment, true)]
    #[case(OrderStatus::FullyPayment, OrderStatus::Delivered, true)]
    #[case(OrderStatus::Delivered, OrderStatus::Completed, true)]
    #[case(OrderStatus::Delivered, OrderStatus::Cancelled, true)]
    #[case(OrderStatus::Pending, OrderStatus::Delivered, false)]
    #[case(OrderStatus::HalfPayment, OrderStatus::Delivered, false)]
    #[case(OrderStatus::HalfPayment, OrderStatus::Confirmed, false)]
    #[case(OrderStatus::Completed, OrderStatus::Cancelled, false)]
    #[case(OrderStatus::Cancelled, OrderStatus::Pending, false)]
    fn test_transition_table(#[case] from: OrderStatus, #[case] to: OrderStatus, #[case] ok: bool) {
        assert_eq!(from.can_transition(to), ok);
    }

    #[test]
    fn test_terminal_statuses_have_no_exit() {
        for from in OrderStatus::ALL.into_iter().filter(|s| s.is_terminal()) {
            assert!(OrderStatus::ALL.iter().all(|to| !from.can_transition(*to)));
        }
    }

    #[test]
    fn test_status_aliases() {
        assert_eq!(OrderStatus::parse("fully_paid"), Some(OrderStatus::FullyPayment));
        assert_eq!(OrderStatus::parse("half_payment"), Some(OrderStatus::HalfPayment));
        assert_eq!(OrderStatus::parse("canceled"), Some(OrderStatus::Cancelled));
        let parsed: OrderStatus = serde_json::from_str("\"fully_paid\"").unwrap();
        assert_eq!(parsed, OrderStatus::FullyPayment);
        assert_eq!(serde_json::to_string(&OrderStatus::HalfPayment).unwrap(), "\"halfPayment\"");
    }

    #[test]
    fn test_item_final_amount() {
        let mut input = OrderItemInput::new(VehicleId::new(), " Red ", 2, Money::from_minor(1_000));
        input.discount = Money::from_minor(100);
        input.options.push(PricedExtra {
            name: "Sunroof".into(),
            price: Money::from_minor(50),
        });
        input.accessories.push(PricedExtra {
            name: "Floor mats".into(),
            price: Money::from_minor(25),
        });
        let item = OrderItem::from_input(input).unwrap();
        assert_eq!(item.final_amount, Money::from_minor(1_875));
        assert_eq!(item.color, "Red");
    }

    #[test]
    fn test_item_rejects_bad_lines() {
        let line = |color: &str, quantity| {
            OrderItemInput::new(VehicleId::new(), color, quantity, Money::from_minor(1))
        };
        assert!(OrderItem::from_input(line("Red", 0)).is_err());
        assert!(OrderItem::from_input(line(" ", 1)).is_err());
        let mut input = OrderItemInput::new(VehicleId::new(), "Red", 1, Money::from_minor(10));
        input.discount = Money::from_minor(11);
        assert!(OrderItem::from_input(input).is_err());
    }
}
