//! Dealer vehicle request operations.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use dealerflow_shared::types::{DealerRequestId, DealershipId, PageRequest, PageResponse};
use tracing::info;

use super::stock::{StockWorkset, stock_lock_keys};
use super::{WorkflowEngine, observe};
use crate::access::{AccessPolicy, ActorContext};
use crate::dealer_request::{DealerVehicleRequest, RequestStatus, RequestWorkflow, SubmitRequest};
use crate::debt::{DebtLedger, DebtStatus};
use crate::error::{WorkflowError, WorkflowResult};
use crate::history::{EntityKind, StatusHistoryEvent, Transition, creation_event};
use crate::stock::{StockKey, StockLedger};
use crate::store::{AggregateKey, Versioned, WorkflowStore, WriteBatch};

/// Who may move a request.
#[derive(Debug, Clone, Copy)]
enum RequestAccess {
    Member,
    Manager,
    Manufacturer,
}

impl RequestAccess {
    fn check(
        self,
        actor: &ActorContext,
        request: &DealerVehicleRequest,
        action: &'static str,
    ) -> WorkflowResult<()> {
        match self {
            Self::Member => {
                AccessPolicy::require_dealer_member(actor, request.dealership_id, action)
            }
            Self::Manager => {
                AccessPolicy::require_dealer_manager(actor, request.dealership_id, action)
            }
            Self::Manufacturer => {
                AccessPolicy::require_manufacturer(actor, request.manufacturer_id, action)
            }
        }
    }
}

impl<S: WorkflowStore> WorkflowEngine<S> {
    /// Files a restock request with a manufacturer.
    ///
    /// # Errors
    ///
    /// - `ForbiddenTransition` unless the actor is dealership staff
    /// - `Validation` for an invalid item list, or a linked order of
    ///   another dealership
    /// - `NotFound` for an unknown linked order
    #[tracing::instrument(skip_all, fields(actor = %actor.user_id))]
    pub async fn submit_request(
        &self,
        actor: &ActorContext,
        input: SubmitRequest,
    ) -> WorkflowResult<DealerVehicleRequest> {
        observe("submit request", self.submit_request_inner(actor, input).await)
    }

    async fn submit_request_inner(
        &self,
        actor: &ActorContext,
        input: SubmitRequest,
    ) -> WorkflowResult<DealerVehicleRequest> {
        let dealership_id = match actor.dealership_id {
            Some(id) if actor.role.is_dealer_role() => id,
            _ => {
                return Err(WorkflowError::forbidden(
                    "submit request",
                    "only dealership staff can request vehicles",
                ));
            }
        };
        if let Some(order_id) = input.order_id {
            let order = self
                .store
                .get_order(order_id)
                .await?
                .ok_or_else(|| WorkflowError::not_found(EntityKind::Order, order_id))?;
            if order.value.dealership_id != dealership_id {
                return Err(WorkflowError::validation(
                    "linked order belongs to another dealership",
                ));
            }
        }

        let now = self.now();
        let mut request =
            RequestWorkflow::submit(String::new(), input, actor.user_id, dealership_id, now)?;
        request.code = self.next_code(EntityKind::DealerRequest, "REQ").await?;

        let mut batch = WriteBatch::new();
        batch
            .record(creation_event::<RequestStatus>(
                request.id.into_inner(),
                actor.user_id,
                now,
                request.notes.clone(),
            ))
            .put_request(request.clone(), 0);
        self.store.commit(batch).await?;

        info!(
            request_id = %request.id,
            code = %request.code,
            units = request.total_quantity(),
            "Dealer request submitted"
        );
        Ok(request)
    }

    /// `pending → approved`, by a dealer manager of the requesting dealership.
    #[tracing::instrument(skip_all, fields(actor = %actor.user_id, request_id = %request_id))]
    pub async fn approve_request(
        &self,
        actor: &ActorContext,
        request_id: DealerRequestId,
    ) -> WorkflowResult<DealerVehicleRequest> {
        let approver = actor.user_id;
        let result = self
            .update_request(
                actor,
                request_id,
                RequestAccess::Manager,
                "approve request",
                None,
                |request, now| RequestWorkflow::approve(request, approver, now),
            )
            .await;
        let request = observe("approve request", result)?;
        info!(code = %request.code, "Dealer request approved");
        Ok(request)
    }

    /// `pending → rejected` with a reason.
    #[tracing::instrument(skip_all, fields(actor = %actor.user_id, request_id = %request_id))]
    pub async fn reject_request(
        &self,
        actor: &ActorContext,
        request_id: DealerRequestId,
        reason: &str,
    ) -> WorkflowResult<DealerVehicleRequest> {
        let approver = actor.user_id;
        let notes = Some(reason.trim().to_string());
        let result = self
            .update_request(
                actor,
                request_id,
                RequestAccess::Manager,
                "reject request",
                notes,
                |request, now| RequestWorkflow::reject(request, approver, reason, now),
            )
            .await;
        let request = observe("reject request", result)?;
        info!(code = %request.code, "Dealer request rejected");
        Ok(request)
    }

    /// `approved → in_progress`, by manufacturer staff.
    #[tracing::instrument(skip_all, fields(actor = %actor.user_id, request_id = %request_id))]
    pub async fn start_request(
        &self,
        actor: &ActorContext,
        request_id: DealerRequestId,
    ) -> WorkflowResult<DealerVehicleRequest> {
        let result = self
            .update_request(
                actor,
                request_id,
                RequestAccess::Manufacturer,
                "start request",
                None,
                |request, now| RequestWorkflow::mark_in_progress(request, now),
            )
            .await;
        observe("start request", result)
    }

    /// `in_progress → delivered`.
    ///
    /// Credits the dealership's stock pool and grows its debt to the
    /// manufacturer, committing request, stock and debt together.
    ///
    /// # Errors
    ///
    /// - `ForbiddenTransition` unless the actor is staff of the request's manufacturer
    /// - `InvalidTransition` unless the request is in progress
    /// - `ConcurrentModification` or `Storage` if the commit fails, in
    ///   which case neither stock nor debt changes
    #[tracing::instrument(skip_all, fields(actor = %actor.user_id, request_id = %request_id))]
    pub async fn deliver_request(
        &self,
        actor: &ActorContext,
        request_id: DealerRequestId,
        delivered_at: Option<DateTime<Utc>>,
    ) -> WorkflowResult<DealerVehicleRequest> {
        observe(
            "deliver request",
            self.deliver_request_inner(actor, request_id, delivered_at).await,
        )
    }

    async fn deliver_request_inner(
        &self,
        actor: &ActorContext,
        request_id: DealerRequestId,
        delivered_at: Option<DateTime<Utc>>,
    ) -> WorkflowResult<DealerVehicleRequest> {
        let _request_lock = self.locks.acquire([AggregateKey::Request(request_id)]).await;
        let Versioned { value: mut request, version } = self.load_request(request_id).await?;
        RequestAccess::Manufacturer.check(actor, &request, "deliver request")?;
        let now = self.now();
        let (transition, effects) =
            RequestWorkflow::mark_delivered(&mut request, delivered_at, now)?;

        let colors: BTreeSet<_> = effects
            .stock_credits
            .iter()
            .map(|credit| (credit.vehicle_id, credit.color.clone()))
            .collect();
        let debt_key = (request.dealership_id, request.manufacturer_id);
        let _ledger_lock = self
            .locks
            .acquire(stock_lock_keys(&colors).chain([AggregateKey::Debt(debt_key.0, debt_key.1)]))
            .await;

        let mut stock = StockWorkset::load(self.store.as_ref(), &colors).await?;
        for credit in effects.stock_credits {
            let key = StockKey::new(credit.vehicle_id, &credit.color, credit.owner)?;
            StockLedger::receive(stock.row_or_empty(key, now), credit.quantity, now)?;
        }

        let existing = self.store.get_debt(debt_key.0, debt_key.1).await?;
        let (mut debt, debt_version) = match existing {
            Some(Versioned { value, version }) => (value, version),
            None => (DebtLedger::open(debt_key.0, debt_key.1, now), 0),
        };
        let status_before = debt.status();
        let accrued = DebtLedger::accrue(&mut debt, effects.debt_items, now)?;

        let mut batch = WriteBatch::new();
        stock.stage(&mut batch);
        batch.record(transition.into_event(request.id.into_inner(), actor.user_id, now, None));
        let debt_notes = Some(format!("{} accrued from {}", accrued, request.code));
        if debt_version == 0 {
            batch.record(creation_event::<DebtStatus>(
                debt.id.into_inner(),
                actor.user_id,
                now,
                debt_notes,
            ));
        } else if debt.status() != status_before {
            let change = Transition {
                from: status_before,
                to: debt.status(),
            };
            batch.record(change.into_event(debt.id.into_inner(), actor.user_id, now, debt_notes));
        }
        batch
            .put_request(request.clone(), version)
            .put_debt(debt.clone(), debt_version);
        self.store.commit(batch).await?;

        info!(
            code = %request.code,
            %accrued,
            debt_total = %debt.total_amount(),
            "Dealer request delivered"
        );
        Ok(request)
    }

    /// `delivered → completed`, by the requesting dealership.
    #[tracing::instrument(skip_all, fields(actor = %actor.user_id, request_id = %request_id))]
    pub async fn complete_request(
        &self,
        actor: &ActorContext,
        request_id: DealerRequestId,
    ) -> WorkflowResult<DealerVehicleRequest> {
        let result = self
            .update_request(
                actor,
                request_id,
                RequestAccess::Member,
                "complete request",
                None,
                |request, now| RequestWorkflow::complete(request, now),
            )
            .await;
        observe("complete request", result)
    }

    /// Withdraws a request before it ships.
    #[tracing::instrument(skip_all, fields(actor = %actor.user_id, request_id = %request_id))]
    pub async fn cancel_request(
        &self,
        actor: &ActorContext,
        request_id: DealerRequestId,
        reason: Option<String>,
    ) -> WorkflowResult<DealerVehicleRequest> {
        let notes = reason.clone();
        let result = self
            .update_request(
                actor,
                request_id,
                RequestAccess::Member,
                "cancel request",
                notes,
                |request, now| RequestWorkflow::cancel(request, reason, now),
            )
            .await;
        let request = observe("cancel request", result)?;
        info!(code = %request.code, "Dealer request canceled");
        Ok(request)
    }

    /// Loads a request the actor may read.
    pub async fn get_request(
        &self,
        actor: &ActorContext,
        request_id: DealerRequestId,
    ) -> WorkflowResult<DealerVehicleRequest> {
        let request = self.load_request(request_id).await?.value;
        AccessPolicy::require_reader(actor, request.dealership_id, "read request")?;
        Ok(request)
    }

    /// Lists requests, newest first.
    ///
    /// Dealer staff only see their own dealership's requests.
    pub async fn list_requests(
        &self,
        actor: &ActorContext,
        dealership_id: Option<DealershipId>,
        status: Option<RequestStatus>,
        page: &PageRequest,
    ) -> WorkflowResult<PageResponse<DealerVehicleRequest>> {
        let scope = match dealership_id {
            Some(id) => {
                AccessPolicy::require_reader(actor, id, "list requests")?;
                Some(id)
            }
            None if actor.role.is_dealer_role() => Some(actor.dealership_id.ok_or_else(|| {
                WorkflowError::forbidden("list requests", "actor has no dealership")
            })?),
            None => None,
        };
        let mut requests: Vec<DealerVehicleRequest> = self
            .store
            .list_requests(scope)
            .await?
            .into_iter()
            .filter(|request| status.is_none_or(|status| request.status() == status))
            .collect();
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(page.paginate(requests))
    }

    /// The request's status history, oldest first.
    pub async fn request_history(
        &self,
        actor: &ActorContext,
        request_id: DealerRequestId,
    ) -> WorkflowResult<Vec<StatusHistoryEvent>> {
        self.get_request(actor, request_id).await?;
        self.history_of(EntityKind::DealerRequest, request_id.into_inner()).await
    }

    async fn load_request(
        &self,
        request_id: DealerRequestId,
    ) -> WorkflowResult<Versioned<DealerVehicleRequest>> {
        self.store
            .get_request(request_id)
            .await?
            .ok_or_else(|| WorkflowError::not_found(EntityKind::DealerRequest, request_id))
    }

    async fn update_request(
        &self,
        actor: &ActorContext,
        request_id: DealerRequestId,
        access: RequestAccess,
        action: &'static str,
        notes: Option<String>,
        apply: impl FnOnce(
            &mut DealerVehicleRequest,
            DateTime<Utc>,
        ) -> WorkflowResult<Transition<RequestStatus>>
        + Send,
    ) -> WorkflowResult<DealerVehicleRequest> {
        let _lock = self.locks.acquire([AggregateKey::Request(request_id)]).await;
        let Versioned { value: mut request, version } = self.load_request(request_id).await?;
        access.check(actor, &request, action)?;

        let now = self.now();
        let transition = apply(&mut request, now)?;

        let mut batch = WriteBatch::new();
        batch
            .record(transition.into_event(request.id.into_inner(), actor.user_id, now, notes))
            .put_request(request.clone(), version);
        self.store.commit(batch).await?;
        Ok(request)
    }
}
