//! Stock ledger operations.
//!
//! All functions are stateless and operate on a single [`StockEntry`] (or a
//! slice of rows for planning and reporting). Each one validates before it
//! mutates, so a failed call leaves the row untouched.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use dealerflow_shared::types::{DealershipId, OrderId, VehicleId};

use super::types::{ColorStock, StockEntry, StockKey, StockOwner, StockSummary};
use crate::error::WorkflowError;

/// Stateless stock ledger.
pub struct StockLedger;

impl StockLedger {
    /// Adds received units to a row.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a zero quantity or on overflow.
    pub fn receive(
        entry: &mut StockEntry,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> Result<(), WorkflowError> {
        if quantity == 0 {
            return Err(WorkflowError::validation("received quantity must be positive"));
        }
        entry.total_quantity = entry
            .total_quantity
            .checked_add(quantity)
            .ok_or_else(|| WorkflowError::validation("stock quantity overflow"))?;
        entry.updated_at = now;
        Ok(())
    }

    /// Soft-holds units for an order.
    ///
    /// # Errors
    ///
    /// Returns `InsufficientStock` if fewer than `quantity` units are available.
    pub fn reserve(
        entry: &mut StockEntry,
        order_id: OrderId,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> Result<(), WorkflowError> {
        if quantity == 0 {
            return Err(WorkflowError::validation("reserved quantity must be positive"));
        }
        Self::ensure_available(entry, quantity)?;
        *entry.reservations.entry(order_id).or_insert(0) += quantity;
        entry.updated_at = now;
        Ok(())
    }

    /// Drops an order's hold, returning the released units.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the order holds nothing on this row.
    pub fn release(
        entry: &mut StockEntry,
        order_id: OrderId,
        now: DateTime<Utc>,
    ) -> Result<u32, WorkflowError> {
        let released = entry.reservations.remove(&order_id).ok_or_else(|| {
            WorkflowError::validation(format!("order {order_id} holds no reservation"))
        })?;
        entry.updated_at = now;
        Ok(released)
    }

    /// Sells units that are not held by anyone.
    ///
    /// # Errors
    ///
    /// Returns `InsufficientStock` if fewer than `quantity` units are
    /// available; `remaining` never goes negative.
    pub fn decrement_on_sale(
        entry: &mut StockEntry,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> Result<(), WorkflowError> {
        if quantity == 0 {
            return Err(WorkflowError::validation("sold quantity must be positive"));
        }
        Self::ensure_available(entry, quantity)?;
        entry.total_sold += quantity;
        entry.updated_at = now;
        Ok(())
    }

    /// Converts an order's hold into a sale, returning the sold units.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the order holds nothing on this row.
    pub fn commit_reservation(
        entry: &mut StockEntry,
        order_id: OrderId,
        now: DateTime<Utc>,
    ) -> Result<u32, WorkflowError> {
        let held = entry.reserved_for(order_id);
        if held == 0 {
            return Err(WorkflowError::validation(format!(
                "order {order_id} holds no reservation"
            )));
        }
        // reserved units are always within remaining
        entry.reservations.remove(&order_id);
        entry.total_sold += held;
        entry.updated_at = now;
        Ok(held)
    }

    /// Reverses a previous sale. The only way `total_sold` decreases.
    ///
    /// # Errors
    ///
    /// Returns a validation error if more units are reversed than were sold.
    pub fn reverse_sale(
        entry: &mut StockEntry,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> Result<(), WorkflowError> {
        if quantity == 0 || quantity > entry.total_sold {
            return Err(WorkflowError::validation(format!(
                "cannot reverse {quantity} units, only {} sold",
                entry.total_sold
            )));
        }
        entry.total_sold -= quantity;
        entry.updated_at = now;
        Ok(())
    }

    /// Plans which rows cover `quantity` units of one vehicle color.
    ///
    /// The dealership's own pool is drawn first, then manufacturer pools in
    /// key order. Other dealerships' pools are never used.
    ///
    /// # Errors
    ///
    /// Returns `InsufficientStock` if all eligible rows together fall short.
    pub fn plan_sale(
        rows: &[&StockEntry],
        dealership_id: DealershipId,
        vehicle_id: VehicleId,
        color: &str,
        quantity: u32,
    ) -> Result<Vec<(StockKey, u32)>, WorkflowError> {
        let mut eligible: Vec<&StockEntry> = rows
            .iter()
            .copied()
            .filter(|row| row.key.vehicle_id == vehicle_id && row.key.color == color)
            .filter(|row| match row.key.owner {
                StockOwner::Dealer(owner) => owner == dealership_id,
                StockOwner::Manufacturer(_) => true,
            })
            .collect();
        eligible.sort_by_key(|row| {
            (
                !matches!(row.key.owner, StockOwner::Dealer(_)),
                row.key.clone(),
            )
        });

        let mut still_needed = quantity;
        let mut plan = Vec::new();
        for row in eligible {
            if still_needed == 0 {
                break;
            }
            let take = row.available().min(still_needed);
            if take > 0 {
                plan.push((row.key.clone(), take));
                still_needed -= take;
            }
        }

        if still_needed > 0 {
            return Err(WorkflowError::InsufficientStock {
                vehicle_id,
                color: color.to_string(),
                requested: quantity,
                available: quantity - still_needed,
            });
        }
        Ok(plan)
    }

    /// Builds the per-color breakdown for one vehicle across the given rows.
    #[must_use]
    pub fn breakdown(vehicle_id: VehicleId, rows: &[StockEntry]) -> StockSummary {
        let mut by_color: BTreeMap<&str, ColorStock> = BTreeMap::new();
        for row in rows.iter().filter(|row| row.key.vehicle_id == vehicle_id) {
            let line = by_color
                .entry(row.key.color.as_str())
                .or_insert_with(|| ColorStock {
                    color: row.key.color.clone(),
                    total: 0,
                    sold: 0,
                    reserved: 0,
                    remaining: 0,
                    available: false,
                });
            line.total = line.total.saturating_add(row.total_quantity());
            line.sold = line.sold.saturating_add(row.total_sold());
            line.reserved = line.reserved.saturating_add(row.reserved());
            line.remaining = line.remaining.saturating_add(row.remaining());
            line.available = line.remaining > 0;
        }

        let colors: Vec<ColorStock> = by_color.into_values().collect();
        let available_colors = colors
            .iter()
            .filter(|line| line.available)
            .map(|line| line.color.clone())
            .collect();
        let total_stock = colors
            .iter()
            .fold(0u32, |acc, line| acc.saturating_add(line.remaining));

        StockSummary {
            vehicle_id,
            colors,
            available_colors,
            total_stock,
        }
    }

    fn ensure_available(entry: &StockEntry, quantity: u32) -> Result<(), WorkflowError> {
        let available = entry.available();
        if available < quantity {
            return Err(WorkflowError::InsufficientStock {
                vehicle_id: entry.key.vehicle_id,
                color: entry.key.color.clone(),
                requested: quantity,
                available,
            });
        }
        Ok(())
    }
}
