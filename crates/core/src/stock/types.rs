//! Stock ledger domain types.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use dealerflow_shared::types::{DealershipId, ManufacturerId, OrderId, VehicleId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::WorkflowError;

/// Which kind of party owns a stock pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerType {
    /// Stock held by the manufacturer.
    Manufacturer,
    /// Stock held by a dealership.
    Dealer,
}

/// The owner of a stock pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "owner_type", content = "owner_id", rename_all = "snake_case")]
pub enum StockOwner {
    /// Manufacturer pool.
    Manufacturer(ManufacturerId),
    /// Dealership pool.
    Dealer(DealershipId),
}

impl StockOwner {
    /// Returns the owner type.
    #[must_use]
    pub fn owner_type(&self) -> OwnerType {
        match self {
            Self::Manufacturer(_) => OwnerType::Manufacturer,
            Self::Dealer(_) => OwnerType::Dealer,
        }
    }

    /// Returns the raw owner id.
    #[must_use]
    pub fn owner_id(&self) -> Uuid {
        match self {
            Self::Manufacturer(id) => id.into_inner(),
            Self::Dealer(id) => id.into_inner(),
        }
    }
}

/// Identifies one stock row: (vehicle, color, owner).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StockKey {
    /// Vehicle model.
    pub vehicle_id: VehicleId,
    /// Color name, trimmed.
    pub color: String,
    /// Pool owner.
    pub owner: StockOwner,
}

impl StockKey {
    /// Creates a key, trimming the color.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the color is blank.
    pub fn new(
        vehicle_id: VehicleId,
        color: &str,
        owner: StockOwner,
    ) -> Result<Self, WorkflowError> {
        Ok(Self {
            vehicle_id,
            color: normalize_color(color)?,
            owner,
        })
    }
}

/// Trims a color name and rejects blanks.
pub(crate) fn normalize_color(color: &str) -> Result<String, WorkflowError> {
    let color = color.trim();
    if color.is_empty() {
        return Err(WorkflowError::validation("color is required"));
    }
    Ok(color.to_string())
}

/// Quantities for one (vehicle, color, owner) row.
///
/// Fields are only mutated through [`crate::stock::StockLedger`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockEntry {
    /// Row identity.
    pub key: StockKey,
    pub(crate) total_quantity: u32,
    pub(crate) total_sold: u32,
    pub(crate) reservations: BTreeMap<OrderId, u32>,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
}

impl StockEntry {
    /// Creates an empty row.
    #[must_use]
    pub fn empty(key: StockKey, now: DateTime<Utc>) -> Self {
        Self {
            key,
            total_quantity: 0,
            total_sold: 0,
            reservations: BTreeMap::new(),
            updated_at: now,
        }
    }

    /// Units ever received.
    #[must_use]
    pub fn total_quantity(&self) -> u32 {
        self.total_quantity
    }

    /// Units sold.
    #[must_use]
    pub fn total_sold(&self) -> u32 {
        self.total_sold
    }

    /// Units on hand: `total_quantity - total_sold`.
    #[must_use]
    pub fn remaining(&self) -> u32 {
        self.total_quantity.saturating_sub(self.total_sold)
    }

    /// Units soft-held for in-flight orders.
    #[must_use]
    pub fn reserved(&self) -> u32 {
        self.reservations.values().sum()
    }

    /// Units held for one order.
    #[must_use]
    pub fn reserved_for(&self, order_id: OrderId) -> u32 {
        self.reservations.get(&order_id).copied().unwrap_or(0)
    }

    /// Units that can still be sold or reserved.
    #[must_use]
    pub fn available(&self) -> u32 {
        self.remaining().saturating_sub(self.reserved())
    }

    /// A row counts as available for display only while units remain.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.remaining() > 0
    }
}

/// One color line of a vehicle's stock breakdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorStock {
    /// Color name.
    pub color: String,
    /// Units ever received.
    pub total: u32,
    /// Units sold.
    pub sold: u32,
    /// Units soft-held.
    pub reserved: u32,
    /// Units on hand.
    pub remaining: u32,
    /// True while `remaining > 0`.
    pub available: bool,
}

/// Server-computed stock view for one vehicle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockSummary {
    /// Vehicle model.
    pub vehicle_id: VehicleId,
    /// Per-color lines, sorted by color; zero-remaining lines are kept.
    pub colors: Vec<ColorStock>,
    /// Colors with `remaining > 0`.
    pub available_colors: Vec<String>,
    /// Sum of `remaining` over all colors.
    pub total_stock: u32,
}

/// Input for receiving units into a pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveStock {
    /// Vehicle model.
    pub vehicle_id: VehicleId,
    /// Color name.
    pub color: String,
    /// Pool owner.
    pub owner: StockOwner,
    /// Units received; must be positive.
    pub quantity: u32,
}
