//! Dealer vehicle request types.

use chrono::{DateTime, Utc};
use dealerflow_shared::types::{
    DealerRequestId, DealershipId, ManufacturerId, Money, OrderId, UserId, VehicleId,
};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::history::{EntityKind, StateMachine};

/// Request status.
///
/// Valid transitions:
/// - pending → approved | rejected | canceled
/// - approved → in_progress | canceled
/// - in_progress → delivered
/// - delivered → completed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// Submitted by dealer staff.
    Pending,
    /// Approved by a dealer manager.
    Approved,
    /// Refused by a dealer manager (terminal).
    Rejected,
    /// Being fulfilled by the manufacturer.
    InProgress,
    /// Goods arrived at the dealership.
    Delivered,
    /// Closed by the dealership (terminal).
    Completed,
    /// Withdrawn before shipping (terminal).
    #[serde(alias = "cancelled")]
    Canceled,
}

impl RequestStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [Self; 7] = [
        Self::Pending,
        Self::Approved,
        Self::Rejected,
        Self::InProgress,
        Self::Delivered,
        Self::Completed,
        Self::Canceled,
    ];
}

impl StateMachine for RequestStatus {
    const ENTITY: EntityKind = EntityKind::DealerRequest;

    fn initial() -> Self {
        Self::Pending
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::InProgress => "in_progress",
            Self::Delivered => "delivered",
            Self::Completed => "completed",
            Self::Canceled => "canceled",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "in_progress" | "inprogress" => Some(Self::InProgress),
            "delivered" => Some(Self::Delivered),
            "completed" => Some(Self::Completed),
            "canceled" | "cancelled" => Some(Self::Canceled),
            _ => None,
        }
    }

    fn can_transition(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Pending, Self::Approved | Self::Rejected | Self::Canceled)
                | (Self::Approved, Self::InProgress | Self::Canceled)
                | (Self::InProgress, Self::Delivered)
                | (Self::Delivered, Self::Completed)
        )
    }

    fn is_terminal(self) -> bool {
        matches!(self, Self::Rejected | Self::Completed | Self::Canceled)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One requested line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestItem {
    /// Vehicle model.
    pub vehicle_id: VehicleId,
    /// Color.
    pub color: String,
    /// Units; must be positive.
    pub quantity: u32,
    /// Manufacturer wholesale price per unit.
    pub unit_price: Money,
}

/// Input for submitting a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRequest {
    /// Manufacturer asked for the vehicles.
    pub manufacturer_id: ManufacturerId,
    /// Requested lines; at least one.
    pub items: Vec<RequestItem>,
    /// Free-form notes.
    #[serde(default)]
    pub notes: Option<String>,
    /// Customer order this request was raised for.
    #[serde(default)]
    pub order_id: Option<OrderId>,
}

/// A dealership's request for vehicles from a manufacturer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DealerVehicleRequest {
    /// Request identifier.
    pub id: DealerRequestId,
    /// Human-readable code (`REQ-000001`).
    pub code: String,
    /// Staff member who submitted it.
    pub requested_by: UserId,
    /// Requesting dealership.
    pub dealership_id: DealershipId,
    /// Supplying manufacturer.
    pub manufacturer_id: ManufacturerId,
    pub(crate) items: Vec<RequestItem>,
    pub(crate) status: RequestStatus,
    /// Manager who approved or rejected it.
    pub decided_by: Option<UserId>,
    /// When it was approved or rejected.
    pub decided_at: Option<DateTime<Utc>>,
    /// Reason given on rejection.
    pub rejection_reason: Option<String>,
    /// Reason given on cancellation.
    pub cancel_reason: Option<String>,
    /// Linked customer order.
    pub order_id: Option<OrderId>,
    /// Free-form notes.
    pub notes: Option<String>,
    /// When the goods arrived.
    pub delivered_at: Option<DateTime<Utc>>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
}

impl DealerVehicleRequest {
    /// Current status.
    #[must_use]
    pub fn status(&self) -> RequestStatus {
        self.status
    }

    /// Requested lines; immutable once delivered.
    #[must_use]
    pub fn items(&self) -> &[RequestItem] {
        &self.items
    }

    /// Total requested units.
    #[must_use]
    pub fn total_quantity(&self) -> u64 {
        self.items.iter().map(|item| u64::from(item.quantity)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(RequestStatus::Pending, RequestStatus::Approved, true)]
    #[case(RequestStatus::Pending, RequestStatus::Rejected, true)]
    #[case(RequestStatus::Approved, RequestStatus::Approved, false)]
    #[case(RequestStatus::Approved, RequestStatus::InProgress, true)]
    #[case(RequestStatus::Approved, RequestStatus::Canceled, true)]
    #[case(RequestStatus::InProgress, RequestStatus::Canceled, false)]
    #[case(RequestStatus::InProgress, RequestStatus::Delivered, true)]
    #[case(RequestStatus::Pending, RequestStatus::Delivered, false)]
    #[case(RequestStatus::Delivered, RequestStatus::Completed, true)]
    #[case(RequestStatus::Rejected, RequestStatus::Approved, false)]
    fn test_transition_table(
        #[case] from: RequestStatus,
        #[case] to: RequestStatus,
        #[case] ok: bool,
    ) {
        assert_eq!(from.can_transition(to), ok);
    }

    #[test]
    fn test_parse_roundtrip() {
        for status in RequestStatus::ALL {
            assert_eq!(RequestStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(RequestStatus::parse("cancelled"), Some(RequestStatus::Canceled));
        assert_eq!(RequestStatus::parse("shipped"), None);
    }
}
