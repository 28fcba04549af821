//! Per-aggregate async locks.
//!
//! Keys are always acquired in ascending [`AggregateKey`] order. The variant
//! order (order, request, stock, debt) is the lock hierarchy, so an
//! operation may take a second batch of keys later as long as all of them
//! sort after the keys it already holds.
//!
//! Entries live only while some operation holds or waits on them; the last
//! [`LockSet`] to release a key removes it from the table.

use std::sync::Arc;

use dashmap::DashMap;
use dealerflow_shared::types::{DealerRequestId, DealershipId, ManufacturerId, OrderId, VehicleId};
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Serialization key of one aggregate.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AggregateKey {
    /// One order.
    Order(OrderId),
    /// One dealer request.
    Request(DealerRequestId),
    /// All pools of one vehicle color.
    Stock(VehicleId, String),
    /// One (dealership, manufacturer) debt ledger.
    Debt(DealershipId, ManufacturerId),
}

type LockTable = DashMap<AggregateKey, Arc<Mutex<()>>>;

/// Guards held for the duration of one operation.
#[must_use = "locks are released when the set is dropped"]
pub struct LockSet {
    keys: Vec<AggregateKey>,
    guards: Vec<OwnedMutexGuard<()>>,
    table: Arc<LockTable>,
}

impl LockSet {
    /// Keys held, in acquisition order.
    #[must_use]
    pub fn keys(&self) -> &[AggregateKey] {
        &self.keys
    }
}

impl Drop for LockSet {
    fn drop(&mut self) {
        // guards hold their own Arc, so release them before pruning
        self.guards.clear();
        for key in &self.keys {
            self.table.remove_if(key, |_, mutex| Arc::strong_count(mutex) == 1);
        }
    }
}

/// Lock table keyed by aggregate.
#[derive(Default)]
pub struct KeyLocks {
    locks: Arc<LockTable>,
}

impl KeyLocks {
    /// Creates an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires every key, sorted and deduplicated.
    pub async fn acquire<I>(&self, keys: I) -> LockSet
    where
        I: IntoIterator<Item = AggregateKey>,
    {
        let mut keys: Vec<AggregateKey> = keys.into_iter().collect();
        keys.sort();
        keys.dedup();

        let mut guards = Vec::with_capacity(keys.len());
        for key in &keys {
            // clone the Arc so the DashMap shard lock is not held across the await
            let mutex = self
                .locks
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone();
            guards.push(mutex.lock_owned().await);
        }

        LockSet {
            keys,
            guards,
            table: Arc::clone(&self.locks),
        }
    }

    /// Number of keys currently held or awaited.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Returns true if no key is held or awaited.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
