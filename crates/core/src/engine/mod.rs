//! Workflow engine.
//!
//! The single entry point callers use. Each operation:
//! 1. checks the actor against the access policy,
//! 2. locks the aggregates it touches in hierarchy order,
//! 3. applies the state machines and ledgers to working copies,
//! 4. commits every changed aggregate plus its history in one batch.
//!
//! On any error nothing is committed.

mod debts;
mod orders;
mod requests;
mod stock;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, warn};
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::error::WorkflowResult;
use crate::history::{EntityKind, StatusHistoryEvent};
use crate::order::{Order, UploadOutcome};
use crate::payment::PaymentOutcome;
use crate::policy::WorkflowPolicy;
use crate::store::{KeyLocks, WorkflowStore};

/// The result of a payment call.
#[derive(Debug, Clone)]
pub struct PaymentReceipt<T> {
    /// The aggregate after the call.
    pub updated: T,
    /// Whether the payment was applied or replayed.
    pub outcome: PaymentOutcome,
}

/// The result of a signed-contract upload.
#[derive(Debug, Clone, Serialize)]
pub struct ContractUploadResult {
    /// The order after the upload.
    pub order: Order,
    /// Number of files attached.
    pub succeeded: usize,
    /// Number of files refused.
    pub failed: usize,
    /// Per-file details.
    pub outcome: UploadOutcome,
}

/// Orchestrates orders, dealer requests, stock and debt.
pub struct WorkflowEngine<S: WorkflowStore> {
    store: Arc<S>,
    locks: KeyLocks,
    clock: Arc<dyn Clock>,
    policy: WorkflowPolicy,
}

impl<S: WorkflowStore> WorkflowEngine<S> {
    /// Creates an engine using the system clock.
    #[must_use]
    pub fn new(store: Arc<S>, policy: WorkflowPolicy) -> Self {
        Self::with_clock(store, Arc::new(SystemClock), policy)
    }

    /// Creates an engine with an explicit clock.
    #[must_use]
    pub fn with_clock(store: Arc<S>, clock: Arc<dyn Clock>, policy: WorkflowPolicy) -> Self {
        Self {
            store,
            locks: KeyLocks::new(),
            clock,
            policy,
        }
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// The active policy.
    #[must_use]
    pub fn policy(&self) -> &WorkflowPolicy {
        &self.policy
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    async fn next_code(&self, kind: EntityKind, prefix: &str) -> WorkflowResult<String> {
        let sequence = self.store.next_sequence(kind).await?;
        Ok(format!("{prefix}-{sequence:06}"))
    }

    async fn history_of(
        &self,
        kind: EntityKind,
        entity_id: Uuid,
    ) -> WorkflowResult<Vec<StatusHistoryEvent>> {
        Ok(self.store.history(kind, entity_id).await?)
    }
}

/// Logs a rejected operation and passes the result through.
fn observe<T>(action: &'static str, result: WorkflowResult<T>) -> WorkflowResult<T> {
    if let Err(err) = &result {
        if err.status_code() >= 500 {
            error!(action, error = %err, "Workflow operation failed");
        } else {
            warn!(action, code = err.error_code(), error = %err, "Workflow operation rejected");
        }
    }
    result
}
