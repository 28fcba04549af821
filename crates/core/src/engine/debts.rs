//! Manufacturer debt operations.

use dealerflow_shared::types::{DealershipId, DebtId, ManufacturerId};
use tracing::info;

use super::{PaymentReceipt, WorkflowEngine, observe};
use crate::access::{AccessPolicy, ActorContext, Role};
use crate::debt::{DebtLedger, DebtSummary, ManufacturerDebt};
use crate::error::{WorkflowError, WorkflowResult};
use crate::history::{EntityKind, StateMachine, StatusHistoryEvent, Transition};
use crate::payment::{PaymentInput, PaymentOutcome, PaymentRecord};
use crate::store::{AggregateKey, Versioned, WorkflowStore, WriteBatch};

impl<S: WorkflowStore> WorkflowEngine<S> {
    /// Pays down a dealership's debt to a manufacturer.
    ///
    /// A retry carrying an already-applied idempotency key returns the
    /// earlier record without touching the ledger.
    ///
    /// # Errors
    ///
    /// - `ForbiddenTransition` unless the actor manages the dealership or
    ///   works for the manufacturer
    /// - `Validation` for a zero amount or a linked order of another
    ///   dealership
    /// - `InsufficientBalance` if the amount exceeds what is owed
    #[tracing::instrument(
        skip_all,
        fields(actor = %actor.user_id, debt_id = %debt_id, amount = %input.amount)
    )]
    pub async fn record_debt_payment(
        &self,
        actor: &ActorContext,
        debt_id: DebtId,
        input: PaymentInput,
    ) -> WorkflowResult<PaymentReceipt<ManufacturerDebt>> {
        observe(
            "record debt payment",
            self.record_debt_payment_inner(actor, debt_id, input).await,
        )
    }

    async fn record_debt_payment_inner(
        &self,
        actor: &ActorContext,
        debt_id: DebtId,
        input: PaymentInput,
    ) -> WorkflowResult<PaymentReceipt<ManufacturerDebt>> {
        let located = self.load_debt(debt_id).await?.value;
        let _lock = self
            .locks
            .acquire([AggregateKey::Debt(located.dealership_id, located.manufacturer_id)])
            .await;
        // reload under the lock
        let Versioned { value: mut debt, version } = self.load_debt(debt_id).await?;
        AccessPolicy::require_debt_payer(
            actor,
            debt.dealership_id,
            debt.manufacturer_id,
            "record debt payment",
        )?;

        if let Some(order_id) = input.linked_order_id {
            let order = self
                .store
                .get_order(order_id)
                .await?
                .ok_or_else(|| WorkflowError::not_found(EntityKind::Order, order_id))?;
            if order.value.dealership_id != debt.dealership_id {
                return Err(WorkflowError::validation(
                    "linked order belongs to another dealership",
                ));
            }
        }

        let now = self.now();
        let status_before = debt.status();
        let outcome = DebtLedger::record_payment(&mut debt, input, actor.user_id, now)?;

        if let PaymentOutcome::Applied(record) = &outcome {
            let mut batch = WriteBatch::new();
            if debt.status() != status_before {
                let change = Transition {
                    from: status_before,
                    to: debt.status(),
                };
                batch.record(change.into_event(
                    debt.id.into_inner(),
                    actor.user_id,
                    now,
                    Some(format!("payment {}", record.id)),
                ));
            }
            batch.put_debt(debt.clone(), version);
            self.store.commit(batch).await?;

            info!(
                paid = %debt.paid_amount(),
                remaining = %debt.remaining_amount(),
                status = debt.status().as_str(),
                "Debt payment recorded"
            );
        } else {
            info!(payment_id = %outcome.record().id, "Debt payment replayed");
        }

        Ok(PaymentReceipt {
            updated: debt,
            outcome,
        })
    }

    /// Loads a debt ledger the actor may read.
    pub async fn get_debt(
        &self,
        actor: &ActorContext,
        debt_id: DebtId,
    ) -> WorkflowResult<ManufacturerDebt> {
        let debt = self.load_debt(debt_id).await?.value;
        AccessPolicy::require_reader(actor, debt.dealership_id, "read debt")?;
        Ok(debt)
    }

    /// The ledger for a (dealership, manufacturer) pair, if one was opened.
    pub async fn find_debt(
        &self,
        actor: &ActorContext,
        dealership_id: DealershipId,
        manufacturer_id: ManufacturerId,
    ) -> WorkflowResult<Option<ManufacturerDebt>> {
        AccessPolicy::require_reader(actor, dealership_id, "read debt")?;
        Ok(self
            .store
            .get_debt(dealership_id, manufacturer_id)
            .await?
            .map(|debt| debt.value))
    }

    /// Debt summaries, largest balance first.
    ///
    /// Dealer staff only see their own dealership; manufacturer staff only
    /// see ledgers owed to their manufacturer.
    pub async fn list_debts(
        &self,
        actor: &ActorContext,
        dealership_id: Option<DealershipId>,
    ) -> WorkflowResult<Vec<DebtSummary>> {
        let scope = match (dealership_id, actor.role) {
            (Some(id), _) => {
                AccessPolicy::require_reader(actor, id, "list debts")?;
                Some(id)
            }
            (None, Role::ManufacturerStaff | Role::Admin) => None,
            (None, _) => Some(actor.dealership_id.ok_or_else(|| {
                WorkflowError::forbidden("list debts", "actor has no dealership")
            })?),
        };
        let mut summaries: Vec<DebtSummary> = self
            .store
            .list_debts(scope)
            .await?
            .iter()
            .filter(|debt| {
                actor.role != Role::ManufacturerStaff || actor.works_for(debt.manufacturer_id)
            })
            .map(ManufacturerDebt::summary)
            .collect();
        summaries.sort_by(|a, b| {
            b.remaining_amount
                .cmp(&a.remaining_amount)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(summaries)
    }

    /// Payments applied to a debt, oldest first.
    pub async fn debt_payment_history(
        &self,
        actor: &ActorContext,
        debt_id: DebtId,
    ) -> WorkflowResult<Vec<PaymentRecord>> {
        Ok(self.get_debt(actor, debt_id).await?.payments().to_vec())
    }

    /// The debt's status history, oldest first.
    pub async fn debt_history(
        &self,
        actor: &ActorContext,
        debt_id: DebtId,
    ) -> WorkflowResult<Vec<StatusHistoryEvent>> {
        self.get_debt(actor, debt_id).await?;
        self.history_of(EntityKind::ManufacturerDebt, debt_id.into_inner()).await
    }

    async fn load_debt(&self, debt_id: DebtId) -> WorkflowResult<Versioned<ManufacturerDebt>> {
        self.store
            .get_debt_by_id(debt_id)
            .await?
            .ok_or_else(|| WorkflowError::not_found(EntityKind::ManufacturerDebt, debt_id))
    }
}
