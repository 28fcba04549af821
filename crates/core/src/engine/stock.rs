//! Stock operations and the per-operation stock working set.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use dealerflow_shared::types::VehicleId;
use tracing::info;

use super::{WorkflowEngine, observe};
use crate::access::{AccessPolicy, ActorContext, Role};
use crate::error::{WorkflowError, WorkflowResult};
use crate::history::EntityKind;
use crate::stock::{ReceiveStock, StockEntry, StockKey, StockLedger, StockOwner, StockSummary};
use crate::store::{AggregateKey, WorkflowStore, WriteBatch};

/// Stock rows read for one operation, with the versions they were read at.
///
/// Only rows handed out through [`StockWorkset::row_mut`] or
/// [`StockWorkset::row_or_empty`] are written back.
pub(super) struct StockWorkset {
    rows: BTreeMap<StockKey, (StockEntry, u64)>,
    touched: BTreeSet<StockKey>,
}

impl StockWorkset {
    /// Loads every row of the given vehicle colors.
    pub(super) async fn load<S: WorkflowStore>(
        store: &S,
        colors: &BTreeSet<(VehicleId, String)>,
    ) -> WorkflowResult<Self> {
        let mut rows = BTreeMap::new();
        for (vehicle_id, color) in colors {
            for row in store.stock_for_vehicle(*vehicle_id, Some(color)).await? {
                rows.insert(row.value.key.clone(), (row.value, row.version));
            }
        }
        Ok(Self {
            rows,
            touched: BTreeSet::new(),
        })
    }

    /// Rows eligible for allocation planning.
    pub(super) fn candidates(&self) -> Vec<&StockEntry> {
        self.rows.values().map(|(entry, _)| entry).collect()
    }

    /// A loaded row, marked for write-back.
    pub(super) fn row_mut(&mut self, key: &StockKey) -> WorkflowResult<&mut StockEntry> {
        let (entry, _) = self.rows.get_mut(key).ok_or_else(|| {
            WorkflowError::not_found(
                EntityKind::StockEntry,
                format!("{} {} {:?}", key.vehicle_id, key.color, key.owner),
            )
        })?;
        self.touched.insert(key.clone());
        Ok(entry)
    }

    /// A loaded row, or a new empty one, marked for write-back.
    pub(super) fn row_or_empty(&mut self, key: StockKey, now: DateTime<Utc>) -> &mut StockEntry {
        self.touched.insert(key.clone());
        let (entry, _) = self
            .rows
            .entry(key.clone())
            .or_insert_with(|| (StockEntry::empty(key, now), 0));
        entry
    }

    /// Stages every touched row.
    pub(super) fn stage(self, batch: &mut WriteBatch) {
        let Self { mut rows, touched } = self;
        for key in touched {
            if let Some((entry, version)) = rows.remove(&key) {
                batch.put_stock(entry, version);
            }
        }
    }
}

/// Lock keys covering the given vehicle colors.
pub(super) fn stock_lock_keys(
    colors: &BTreeSet<(VehicleId, String)>,
) -> impl Iterator<Item = AggregateKey> + '_ {
    colors
        .iter()
        .map(|(vehicle_id, color)| AggregateKey::Stock(*vehicle_id, color.clone()))
}

impl<S: WorkflowStore> WorkflowEngine<S> {
    /// Adds received units to a stock pool.
    ///
    /// # Errors
    ///
    /// - `ForbiddenTransition` if the actor may not write the pool
    /// - `Validation` for a zero quantity or blank color
    #[tracing::instrument(
        skip_all,
        fields(actor = %actor.user_id, vehicle_id = %input.vehicle_id, quantity = input.quantity)
    )]
    pub async fn receive_stock(
        &self,
        actor: &ActorContext,
        input: ReceiveStock,
    ) -> WorkflowResult<StockEntry> {
        observe("receive stock", self.receive_stock_inner(actor, input).await)
    }

    async fn receive_stock_inner(
        &self,
        actor: &ActorContext,
        input: ReceiveStock,
    ) -> WorkflowResult<StockEntry> {
        AccessPolicy::require_stock_writer(actor, &input.owner, "receive stock")?;
        let key = StockKey::new(input.vehicle_id, &input.color, input.owner)?;
        let colors = BTreeSet::from([(key.vehicle_id, key.color.clone())]);

        let _lock = self.locks.acquire(stock_lock_keys(&colors)).await;
        let now = self.now();
        let mut stock = StockWorkset::load(self.store.as_ref(), &colors).await?;
        let entry = stock.row_or_empty(key, now);
        StockLedger::receive(entry, input.quantity, now)?;
        let received = entry.clone();

        let mut batch = WriteBatch::new();
        stock.stage(&mut batch);
        self.store.commit(batch).await?;

        info!(
            color = %received.key.color,
            remaining = received.remaining(),
            "Stock received"
        );
        Ok(received)
    }

    /// Per-color stock breakdown for a vehicle.
    ///
    /// With `owner` set, only that pool is reported. Without it, dealer
    /// staff see their own pool plus manufacturer pools; manufacturer staff
    /// and admins see every pool.
    ///
    /// # Errors
    ///
    /// Returns `ForbiddenTransition` when asking for another dealership's pool.
    #[tracing::instrument(skip_all, fields(actor = %actor.user_id, vehicle_id = %vehicle_id))]
    pub async fn stock_by_color(
        &self,
        actor: &ActorContext,
        vehicle_id: VehicleId,
        owner: Option<StockOwner>,
    ) -> WorkflowResult<StockSummary> {
        if let Some(StockOwner::Dealer(dealership_id)) = owner {
            observe(
                "read stock",
                AccessPolicy::require_reader(actor, dealership_id, "read stock"),
            )?;
        }

        let rows: Vec<StockEntry> = self
            .store
            .stock_for_vehicle(vehicle_id, None)
            .await?
            .into_iter()
            .map(|row| row.value)
            .filter(|entry| match owner {
                Some(owner) => entry.key.owner == owner,
                None => visible_to(actor, &entry.key.owner),
            })
            .collect();

        Ok(StockLedger::breakdown(vehicle_id, &rows))
    }
}

fn visible_to(actor: &ActorContext, owner: &StockOwner) -> bool {
    match owner {
        StockOwner::Manufacturer(_) => true,
        StockOwner::Dealer(dealership_id) => {
            actor.role >= Role::ManufacturerStaff || actor.belongs_to(*dealership_id)
        }
    }
}
