//! Persistence abstraction.
//!
//! The engine reads aggregates through [`WorkflowStore`] and writes them
//! back as one atomic [`WriteBatch`] per operation. Every aggregate carries
//! a version; a batch whose expected versions no longer match is refused as
//! a whole.

mod locks;
mod memory;

use std::future::Future;

use dealerflow_shared::types::{
    DealerRequestId, DealershipId, DebtId, ManufacturerId, OrderId, VehicleId,
};
use thiserror::Error;
use uuid::Uuid;

use crate::dealer_request::DealerVehicleRequest;
use crate::debt::ManufacturerDebt;
use crate::history::{EntityKind, StatusHistoryEvent};
use crate::order::Order;
use crate::stock::{StockEntry, StockKey};

pub use locks::{AggregateKey, KeyLocks, LockSet};
pub use memory::MemoryStore;

/// Errors raised by a store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A staged write expected a version the store no longer holds.
    #[error("version conflict on {entity}")]
    VersionConflict {
        /// Description of the aggregate.
        entity: String,
    },

    /// The backend failed.
    #[error("store backend failure: {0}")]
    Backend(String),
}

/// An aggregate together with its optimistic-lock version.
///
/// Version 0 means "not yet stored".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<T> {
    /// The aggregate.
    pub value: T,
    /// Version as read.
    pub version: u64,
}

/// A write staged against the version it was read at.
#[derive(Debug, Clone)]
pub struct Staged<T> {
    /// New state.
    pub value: T,
    /// Version the caller read; 0 for an insert.
    pub expected_version: u64,
}

/// All writes of one operation, applied atomically or not at all.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    /// Orders to write.
    pub orders: Vec<Staged<Order>>,
    /// Dealer requests to write.
    pub requests: Vec<Staged<DealerVehicleRequest>>,
    /// Stock rows to write.
    pub stock: Vec<Staged<StockEntry>>,
    /// Debt ledgers to write.
    pub debts: Vec<Staged<ManufacturerDebt>>,
    /// History events to append; sequences are assigned on commit.
    pub events: Vec<StatusHistoryEvent>,
}

impl WriteBatch {
    /// Creates an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages an order write.
    pub fn put_order(&mut self, order: Order, expected_version: u64) -> &mut Self {
        self.orders.push(Staged {
            value: order,
            expected_version,
        });
        self
    }

    /// Stages a dealer request write.
    pub fn put_request(
        &mut self,
        request: DealerVehicleRequest,
        expected_version: u64,
    ) -> &mut Self {
        self.requests.push(Staged {
            value: request,
            expected_version,
        });
        self
    }

    /// Stages a stock row write.
    pub fn put_stock(&mut self, entry: StockEntry, expected_version: u64) -> &mut Self {
        self.stock.push(Staged {
            value: entry,
            expected_version,
        });
        self
    }

    /// Stages a debt ledger write.
    pub fn put_debt(&mut self, debt: ManufacturerDebt, expected_version: u64) -> &mut Self {
        self.debts.push(Staged {
            value: debt,
            expected_version,
        });
        self
    }

    /// Appends a history event.
    pub fn record(&mut self, event: StatusHistoryEvent) -> &mut Self {
        self.events.push(event);
        self
    }

    /// Returns true if nothing is staged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
            && self.requests.is_empty()
            && self.stock.is_empty()
            && self.debts.is_empty()
            && self.events.is_empty()
    }
}

/// Storage used by the workflow engine.
///
/// Reads return clones; nothing read is shared with the store. All writes
/// go through [`WorkflowStore::commit`].
pub trait WorkflowStore: Send + Sync + 'static {
    /// Next value of a per-kind counter, used for human-readable codes.
    fn next_sequence(
        &self,
        kind: EntityKind,
    ) -> impl Future<Output = Result<u64, StoreError>> + Send;

    /// Loads an order.
    fn get_order(
        &self,
        id: OrderId,
    ) -> impl Future<Output = Result<Option<Versioned<Order>>, StoreError>> + Send;

    /// Lists orders, optionally for one dealership.
    fn list_orders(
        &self,
        dealership_id: Option<DealershipId>,
    ) -> impl Future<Output = Result<Vec<Order>, StoreError>> + Send;

    /// Loads a dealer request.
    fn get_request(
        &self,
        id: DealerRequestId,
    ) -> impl Future<Output = Result<Option<Versioned<DealerVehicleRequest>>, StoreError>> + Send;

    /// Lists dealer requests, optionally for one dealership.
    fn list_requests(
        &self,
        dealership_id: Option<DealershipId>,
    ) -> impl Future<Output = Result<Vec<DealerVehicleRequest>, StoreError>> + Send;

    /// Loads one stock row.
    fn get_stock(
        &self,
        key: &StockKey,
    ) -> impl Future<Output = Result<Option<Versioned<StockEntry>>, StoreError>> + Send;

    /// Loads every stock row for a vehicle, optionally of one color.
    fn stock_for_vehicle(
        &self,
        vehicle_id: VehicleId,
        color: Option<&str>,
    ) -> impl Future<Output = Result<Vec<Versioned<StockEntry>>, StoreError>> + Send;

    /// Loads the debt ledger of a (dealership, manufacturer) pair.
    fn get_debt(
        &self,
        dealership_id: DealershipId,
        manufacturer_id: ManufacturerId,
    ) -> impl Future<Output = Result<Option<Versioned<ManufacturerDebt>>, StoreError>> + Send;

    /// Loads a debt ledger by id.
    fn get_debt_by_id(
        &self,
        id: DebtId,
    ) -> impl Future<Output = Result<Option<Versioned<ManufacturerDebt>>, StoreError>> + Send;

    /// Lists debt ledgers, optionally for one dealership.
    fn list_debts(
        &self,
        dealership_id: Option<DealershipId>,
    ) -> impl Future<Output = Result<Vec<ManufacturerDebt>, StoreError>> + Send;

    /// The history of one aggregate, in sequence order.
    fn history(
        &self,
        entity: EntityKind,
        entity_id: Uuid,
    ) -> impl Future<Output = Result<Vec<StatusHistoryEvent>, StoreError>> + Send;

    /// Applies a batch atomically.
    ///
    /// Fails with [`StoreError::VersionConflict`] if any staged write's
    /// expected version does not match, in which case nothing is written.
    fn commit(&self, batch: WriteBatch) -> impl Future<Output = Result<(), StoreError>> + Send;
}
