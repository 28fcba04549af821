//! In-memory store.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use dealerflow_shared::types::{
    DealerRequestId, DealershipId, DebtId, ManufacturerId, OrderId, VehicleId,
};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{StoreError, Versioned, WorkflowStore, WriteBatch};
use crate::dealer_request::DealerVehicleRequest;
use crate::debt::ManufacturerDebt;
use crate::history::{EntityKind, StatusHistoryEvent};
use crate::order::Order;
use crate::stock::{StockEntry, StockKey};

type DebtKey = (DealershipId, ManufacturerId);

#[derive(Default)]
struct Tables {
    orders: HashMap<OrderId, Versioned<Order>>,
    requests: HashMap<DealerRequestId, Versioned<DealerVehicleRequest>>,
    stock: BTreeMap<StockKey, Versioned<StockEntry>>,
    debts: HashMap<DebtKey, Versioned<ManufacturerDebt>>,
    debt_ids: HashMap<DebtId, DebtKey>,
    history: HashMap<(EntityKind, Uuid), Vec<StatusHistoryEvent>>,
    sequences: HashMap<EntityKind, u64>,
}

fn check_version(entity: String, current: Option<u64>, expected: u64) -> Result<(), StoreError> {
    if current.unwrap_or(0) == expected {
        Ok(())
    } else {
        Err(StoreError::VersionConflict { entity })
    }
}

/// A [`WorkflowStore`] held in process memory.
///
/// A single `RwLock` around all tables makes each commit atomic.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    fail_next_commit: AtomicBool,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next commit fail after validation, without writing.
    ///
    /// Used to check that a failed commit leaves no partial state.
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Total number of history events stored.
    pub async fn event_count(&self) -> usize {
        self.tables.read().await.history.values().map(Vec::len).sum()
    }
}

impl WorkflowStore for MemoryStore {
    async fn next_sequence(&self, kind: EntityKind) -> Result<u64, StoreError> {
        let mut tables = self.tables.write().await;
        let counter = tables.sequences.entry(kind).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Versioned<Order>>, StoreError> {
        Ok(self.tables.read().await.orders.get(&id).cloned())
    }

    async fn list_orders(
        &self,
        dealership_id: Option<DealershipId>,
    ) -> Result<Vec<Order>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .orders
            .values()
            .filter(|row| dealership_id.is_none_or(|id| row.value.dealership_id == id))
            .map(|row| row.value.clone())
            .collect())
    }

    async fn get_request(
        &self,
        id: DealerRequestId,
    ) -> Result<Option<Versioned<DealerVehicleRequest>>, StoreError> {
        Ok(self.tables.read().await.requests.get(&id).cloned())
    }

    async fn list_requests(
        &self,
        dealership_id: Option<DealershipId>,
    ) -> Result<Vec<DealerVehicleRequest>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .requests
            .values()
            .filter(|row| dealership_id.is_none_or(|id| row.value.dealership_id == id))
            .map(|row| row.value.clone())
            .collect())
    }

    async fn get_stock(&self, key: &StockKey) -> Result<Option<Versioned<StockEntry>>, StoreError> {
        Ok(self.tables.read().await.stock.get(key).cloned())
    }

    async fn stock_for_vehicle(
        &self,
        vehicle_id: VehicleId,
        color: Option<&str>,
    ) -> Result<Vec<Versioned<StockEntry>>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .stock
            .values()
            .filter(|row| row.value.key.vehicle_id == vehicle_id)
            .filter(|row| color.is_none_or(|color| row.value.key.color == color))
            .cloned()
            .collect())
    }

    async fn get_debt(
        &self,
        dealership_id: DealershipId,
        manufacturer_id: ManufacturerId,
    ) -> Result<Option<Versioned<ManufacturerDebt>>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .debts
            .get(&(dealership_id, manufacturer_id))
            .cloned())
    }

    async fn get_debt_by_id(
        &self,
        id: DebtId,
    ) -> Result<Option<Versioned<ManufacturerDebt>>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .debt_ids
            .get(&id)
            .and_then(|key| tables.debts.get(key))
            .cloned())
    }

    async fn list_debts(
        &self,
        dealership_id: Option<DealershipId>,
    ) -> Result<Vec<ManufacturerDebt>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .debts
            .values()
            .filter(|row| dealership_id.is_none_or(|id| row.value.dealership_id == id))
            .map(|row| row.value.clone())
            .collect())
    }

    async fn history(
        &self,
        entity: EntityKind,
        entity_id: Uuid,
    ) -> Result<Vec<StatusHistoryEvent>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .history
            .get(&(entity, entity_id))
            .cloned()
            .unwrap_or_default())
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;

        for staged in &batch.orders {
            let id = staged.value.id;
            check_version(
                format!("order {id}"),
                tables.orders.get(&id).map(|row| row.version),
                staged.expected_version,
            )?;
        }
        for staged in &batch.requests {
            let id = staged.value.id;
            check_version(
                format!("dealer request {id}"),
                tables.requests.get(&id).map(|row| row.version),
                staged.expected_version,
            )?;
        }
        for staged in &batch.stock {
            let key = &staged.value.key;
            check_version(
                format!("stock {} {}", key.vehicle_id, key.color),
                tables.stock.get(key).map(|row| row.version),
                staged.expected_version,
            )?;
        }
        for staged in &batch.debts {
            let key = (staged.value.dealership_id, staged.value.manufacturer_id);
            check_version(
                format!("debt {}", staged.value.id),
                tables.debts.get(&key).map(|row| row.version),
                staged.expected_version,
            )?;
        }

        if self.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Backend("injected commit failure".into()));
        }

        for staged in batch.orders {
            tables.orders.insert(
                staged.value.id,
                Versioned {
                    value: staged.value,
                    version: staged.expected_version + 1,
                },
            );
        }
        for staged in batch.requests {
            tables.requests.insert(
                staged.value.id,
                Versioned {
                    value: staged.value,
                    version: staged.expected_version + 1,
                },
            );
        }
        for staged in batch.stock {
            tables.stock.insert(
                staged.value.key.clone(),
                Versioned {
                    value: staged.value,
                    version: staged.expected_version + 1,
                },
            );
        }
        for staged in batch.debts {
            let key = (staged.value.dealership_id, staged.value.manufacturer_id);
            tables.debt_ids.insert(staged.value.id, key);
            tables.debts.insert(
                key,
                Versioned {
                    value: staged.value,
                    version: staged.expected_version + 1,
                },
            );
        }
        for mut event in batch.events {
            let log = tables
                .history
                .entry((event.entity, event.entity_id))
                .or_default();
            event.sequence = log.len() as u64 + 1;
            log.push(event);
        }

        Ok(())
    }
}
