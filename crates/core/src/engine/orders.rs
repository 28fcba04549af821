//! Order operations.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use dealerflow_shared::types::{
    DealershipId, Money, OrderId, PageRequest, PageResponse, VehicleId,
};
use tracing::info;

use super::stock::{StockWorkset, stock_lock_keys};
use super::{ContractUploadResult, PaymentReceipt, WorkflowEngine, observe};
use crate::access::{AccessPolicy, ActorContext};
use crate::error::{WorkflowError, WorkflowResult};
use crate::history::{EntityKind, StateMachine, StatusHistoryEvent, Transition, creation_event};
use crate::order::{
    AllocationState, ContractMeta, ContractUpload, CreateOrder, DeliverOrder, Order,
    OrderStatus, OrderWorkflow, StockAllocation,
};
use crate::payment::PaymentInput;
use crate::stock::{StockKey, StockLedger};
use crate::store::{AggregateKey, Versioned, WorkflowStore, WriteBatch};

/// Who may perform an order operation.
#[derive(Debug, Clone, Copy)]
enum OrderAccess {
    /// Staff or manager of the order's dealership.
    Member,
    /// Manager of the order's dealership.
    Manager,
}

impl OrderAccess {
    fn check(
        self,
        actor: &ActorContext,
        order: &Order,
        action: &'static str,
    ) -> WorkflowResult<()> {
        match self {
            Self::Member => {
                AccessPolicy::require_dealer_member(actor, order.dealership_id, action)
            }
            Self::Manager => {
                AccessPolicy::require_dealer_manager(actor, order.dealership_id, action)
            }
        }
    }
}

type OrderStep<T> = WorkflowResult<(T, Option<Transition<OrderStatus>>)>;

impl<S: WorkflowStore> WorkflowEngine<S> {
    /// Creates an order in `pending` for the actor's dealership.
    ///
    /// # Errors
    ///
    /// - `ForbiddenTransition` unless the actor is dealership staff
    /// - `Validation` for an empty or invalid item list
    #[tracing::instrument(skip_all, fields(actor = %actor.user_id))]
    pub async fn create_order(
        &self,
        actor: &ActorContext,
        input: CreateOrder,
    ) -> WorkflowResult<Order> {
        observe("create order", self.create_order_inner(actor, input).await)
    }

    async fn create_order_inner(
        &self,
        actor: &ActorContext,
        input: CreateOrder,
    ) -> WorkflowResult<Order> {
        let dealership_id = match actor.dealership_id {
            Some(id) if actor.role.is_dealer_role() => id,
            _ => {
                return Err(WorkflowError::forbidden(
                    "create order",
                    "only dealership staff can create orders",
                ));
            }
        };
        let now = self.now();
        let mut order =
            OrderWorkflow::create(String::new(), input, actor.user_id, dealership_id, now)?;
        order.code = self.next_code(EntityKind::Order, "ORD").await?;

        let mut batch = WriteBatch::new();
        batch
            .record(creation_event::<OrderStatus>(
                order.id.into_inner(),
                actor.user_id,
                now,
                order.notes.clone(),
            ))
            .put_order(order.clone(), 0);
        self.store.commit(batch).await?;

        info!(
            order_id = %order.id,
            code = %order.code,
            total = %order.final_amount(),
            "Order created"
        );
        Ok(order)
    }

    /// `pending → confirmed`, by a dealer manager.
    #[tracing::instrument(skip_all, fields(actor = %actor.user_id, order_id = %order_id))]
    pub async fn confirm_order(
        &self,
        actor: &ActorContext,
        order_id: OrderId,
    ) -> WorkflowResult<Order> {
        let result = self
            .update_order(
                actor,
                order_id,
                OrderAccess::Manager,
                "confirm order",
                None,
                |order, now| Ok(((), Some(OrderWorkflow::confirm(order, now)?))),
            )
            .await;
        let (order, ()) = observe("confirm order", result)?;
        info!(code = %order.code, "Order confirmed");
        Ok(order)
    }

    /// Issues a draft contract number for a pending order.
    #[tracing::instrument(skip_all, fields(actor = %actor.user_id, order_id = %order_id))]
    pub async fn generate_contract(
        &self,
        actor: &ActorContext,
        order_id: OrderId,
        meta: ContractMeta,
    ) -> WorkflowResult<Order> {
        let prefix = self.policy.contract_number_prefix.as_str();
        let result = self
            .update_order(
                actor,
                order_id,
                OrderAccess::Member,
                "generate contract",
                None,
                |order, now| {
                    OrderWorkflow::generate_contract(order, meta, prefix, now)?;
                    Ok(((), None))
                },
            )
            .await;
        let (order, ()) = observe("generate contract", result)?;
        info!(contract_number = ?order.contract.number, "Contract generated");
        Ok(order)
    }

    /// Attaches signed-contract files.
    ///
    /// Files are screened one by one; the order keeps the accepted ones and
    /// the result reports how many succeeded and failed.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if no file is accepted, in which case the order
    /// is unchanged.
    #[tracing::instrument(
        skip_all,
        fields(actor = %actor.user_id, order_id = %order_id, files = files.len())
    )]
    pub async fn upload_signed_contract(
        &self,
        actor: &ActorContext,
        order_id: OrderId,
        files: Vec<ContractUpload>,
    ) -> WorkflowResult<ContractUploadResult> {
        let uploads = &self.policy.uploads;
        let result = self
            .update_order(
                actor,
                order_id,
                OrderAccess::Member,
                "upload contract",
                None,
                |order, now| {
                    Ok((OrderWorkflow::upload_signed_contract(order, files, uploads, now)?, None))
                },
            )
            .await;
        let (order, outcome) = observe("upload contract", result)?;
        info!(
            accepted = outcome.accepted.len(),
            rejected = outcome.rejected.len(),
            "Signed contract uploaded"
        );
        Ok(ContractUploadResult {
            order,
            succeeded: outcome.accepted.len(),
            failed: outcome.rejected.len(),
            outcome,
        })
    }

    /// Records a deposit.
    #[tracing::instrument(
        skip_all,
        fields(actor = %actor.user_id, order_id = %order_id, amount = %input.amount)
    )]
    pub async fn record_deposit(
        &self,
        actor: &ActorContext,
        order_id: OrderId,
        input: PaymentInput,
    ) -> WorkflowResult<PaymentReceipt<Order>> {
        let recorded_by = actor.user_id;
        let result = self
            .update_order(
                actor,
                order_id,
                OrderAccess::Member,
                "record deposit",
                None,
                |order, now| OrderWorkflow::record_deposit(order, input, recorded_by, now),
            )
            .await;
        let (order, outcome) = observe("record deposit", result)?;
        info!(
            status = %order.status(),
            paid = %order.paid_amount(),
            applied = outcome.is_applied(),
            "Deposit recorded"
        );
        Ok(PaymentReceipt {
            updated: order,
            outcome,
        })
    }

    /// Records the payment that settles an order.
    #[tracing::instrument(
        skip_all,
        fields(actor = %actor.user_id, order_id = %order_id, amount = %input.amount)
    )]
    pub async fn record_full_payment(
        &self,
        actor: &ActorContext,
        order_id: OrderId,
        input: PaymentInput,
    ) -> WorkflowResult<PaymentReceipt<Order>> {
        let recorded_by = actor.user_id;
        let result = self
            .update_order(
                actor,
                order_id,
                OrderAccess::Member,
                "record full payment",
                None,
                |order, now| OrderWorkflow::record_full_payment(order, input, recorded_by, now),
            )
            .await;
        let (order, outcome) = observe("record full payment", result)?;
        info!(paid = %order.paid_amount(), applied = outcome.is_applied(), "Full payment recorded");
        Ok(PaymentReceipt {
            updated: order,
            outcome,
        })
    }

    /// The default deposit for an order.
    pub async fn suggested_deposit(
        &self,
        actor: &ActorContext,
        order_id: OrderId,
    ) -> WorkflowResult<Money> {
        let order = self.get_order(actor, order_id).await?;
        Ok(OrderWorkflow::suggested_deposit(&order, &self.policy))
    }

    /// Plans a delivery date.
    #[tracing::instrument(skip_all, fields(actor = %actor.user_id, order_id = %order_id))]
    pub async fn schedule_delivery(
        &self,
        actor: &ActorContext,
        order_id: OrderId,
        scheduled_at: DateTime<Utc>,
    ) -> WorkflowResult<Order> {
        let result = self
            .update_order(
                actor,
                order_id,
                OrderAccess::Member,
                "schedule delivery",
                None,
                |order, now| {
                    OrderWorkflow::schedule_delivery(order, scheduled_at, now)?;
                    Ok(((), None))
                },
            )
            .await;
        let (order, ()) = observe("schedule delivery", result)?;
        info!(%scheduled_at, "Delivery scheduled");
        Ok(order)
    }

    /// Soft-holds stock for every line of an order, all or nothing.
    ///
    /// # Errors
    ///
    /// - `InvalidTransition` once the order is delivered or closed
    /// - `Validation` if stock is already held for the order
    /// - `InsufficientStock` if any line cannot be covered
    #[tracing::instrument(skip_all, fields(actor = %actor.user_id, order_id = %order_id))]
    pub async fn reserve_order_stock(
        &self,
        actor: &ActorContext,
        order_id: OrderId,
    ) -> WorkflowResult<Order> {
        observe("reserve stock", self.reserve_order_stock_inner(actor, order_id).await)
    }

    async fn reserve_order_stock_inner(
        &self,
        actor: &ActorContext,
        order_id: OrderId,
    ) -> WorkflowResult<Order> {
        let _order_lock = self.locks.acquire([AggregateKey::Order(order_id)]).await;
        let Versioned { value: mut order, version } = self.load_order(order_id).await?;
        AccessPolicy::require_dealer_member(actor, order.dealership_id, "reserve stock")?;
        if !order.status().is_pre_delivery() {
            return Err(WorkflowError::InvalidTransition {
                entity: EntityKind::Order,
                from: order.status().as_str(),
                to: "stock_reserved",
            });
        }
        if order.has_reservations() {
            return Err(WorkflowError::validation("stock is already reserved for this order"));
        }

        let colors = item_colors(&order);
        let _stock_lock = self.locks.acquire(stock_lock_keys(&colors)).await;
        let now = self.now();
        let mut stock = StockWorkset::load(self.store.as_ref(), &colors).await?;

        for item in &order.items {
            let plan = StockLedger::plan_sale(
                &stock.candidates(),
                order.dealership_id,
                item.vehicle_id,
                &item.color,
                item.quantity,
            )?;
            for (key, quantity) in plan {
                StockLedger::reserve(stock.row_mut(&key)?, order.id, quantity, now)?;
                add_allocation(
                    &mut order.stock_allocations,
                    key,
                    quantity,
                    AllocationState::Reserved,
                );
            }
        }
        order.updated_at = now;

        let mut batch = WriteBatch::new();
        stock.stage(&mut batch);
        batch.put_order(order.clone(), version);
        self.store.commit(batch).await?;

        info!(rows = order.stock_allocations().len(), "Order stock reserved");
        Ok(order)
    }

    /// Drops every stock hold of an order.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if nothing is held.
    #[tracing::instrument(skip_all, fields(actor = %actor.user_id, order_id = %order_id))]
    pub async fn release_order_stock(
        &self,
        actor: &ActorContext,
        order_id: OrderId,
    ) -> WorkflowResult<Order> {
        observe("release stock", self.release_order_stock_inner(actor, order_id).await)
    }

    async fn release_order_stock_inner(
        &self,
        actor: &ActorContext,
        order_id: OrderId,
    ) -> WorkflowResult<Order> {
        let _order_lock = self.locks.acquire([AggregateKey::Order(order_id)]).await;
        let Versioned { value: mut order, version } = self.load_order(order_id).await?;
        AccessPolicy::require_dealer_member(actor, order.dealership_id, "release stock")?;
        if !order.has_reservations() {
            return Err(WorkflowError::validation("no stock is reserved for this order"));
        }

        let colors = allocation_colors(&order);
        let _stock_lock = self.locks.acquire(stock_lock_keys(&colors)).await;
        let now = self.now();
        let mut stock = StockWorkset::load(self.store.as_ref(), &colors).await?;
        return_stock(&mut order, &mut stock, now)?;
        order.updated_at = now;

        let mut batch = WriteBatch::new();
        stock.stage(&mut batch);
        batch.put_order(order.clone(), version);
        self.store.commit(batch).await?;

        info!("Order stock released");
        Ok(order)
    }

    /// `fullyPayment → delivered`, selling the order's stock.
    ///
    /// Held units are sold first; any remainder is taken from the
    /// dealership's pool, then from manufacturer pools.
    ///
    /// # Errors
    ///
    /// - `InvalidTransition` unless fully paid
    /// - `Validation` for a missing recipient name or phone
    /// - `InsufficientStock` if a line cannot be covered; nothing is sold
    #[tracing::instrument(skip_all, fields(actor = %actor.user_id, order_id = %order_id))]
    pub async fn deliver_order(
        &self,
        actor: &ActorContext,
        order_id: OrderId,
        input: DeliverOrder,
    ) -> WorkflowResult<Order> {
        observe("deliver order", self.deliver_order_inner(actor, order_id, input).await)
    }

    async fn deliver_order_inner(
        &self,
        actor: &ActorContext,
        order_id: OrderId,
        input: DeliverOrder,
    ) -> WorkflowResult<Order> {
        let _order_lock = self.locks.acquire([AggregateKey::Order(order_id)]).await;
        let Versioned { value: mut order, version } = self.load_order(order_id).await?;
        AccessPolicy::require_dealer_member(actor, order.dealership_id, "deliver order")?;
        let now = self.now();
        let transition = OrderWorkflow::deliver(&mut order, input, now)?;

        let mut colors = item_colors(&order);
        colors.extend(allocation_colors(&order));
        let _stock_lock = self.locks.acquire(stock_lock_keys(&colors)).await;
        let mut stock = StockWorkset::load(self.store.as_ref(), &colors).await?;
        sell_stock(&mut order, &mut stock, now)?;

        let notes = order
            .delivery
            .recipient
            .as_ref()
            .map(|recipient| format!("received by {}", recipient.name));
        let mut batch = WriteBatch::new();
        stock.stage(&mut batch);
        batch
            .record(transition.into_event(order.id.into_inner(), actor.user_id, now, notes))
            .put_order(order.clone(), version);
        self.store.commit(batch).await?;

        info!(code = %order.code, "Order delivered");
        Ok(order)
    }

    /// `delivered → completed`, no earlier than the configured wait.
    ///
    /// # Errors
    ///
    /// Returns `TooEarly` with the remaining wait before then.
    #[tracing::instrument(skip_all, fields(actor = %actor.user_id, order_id = %order_id))]
    pub async fn complete_order(
        &self,
        actor: &ActorContext,
        order_id: OrderId,
        notes: Option<String>,
    ) -> WorkflowResult<Order> {
        let wait = self.policy.completion_wait;
        let result = self
            .update_order(
                actor,
                order_id,
                OrderAccess::Member,
                "complete order",
                notes,
                |order, now| Ok(((), Some(OrderWorkflow::complete(order, wait, now)?))),
            )
            .await;
        let (order, ()) = observe("complete order", result)?;
        info!(code = %order.code, "Order completed");
        Ok(order)
    }

    /// Cancels an order, returning held or sold stock.
    ///
    /// # Errors
    ///
    /// - `Validation` for a blank reason
    /// - `InvalidTransition` from a terminal status
    #[tracing::instrument(skip_all, fields(actor = %actor.user_id, order_id = %order_id))]
    pub async fn cancel_order(
        &self,
        actor: &ActorContext,
        order_id: OrderId,
        reason: &str,
    ) -> WorkflowResult<Order> {
        observe("cancel order", self.cancel_order_inner(actor, order_id, reason).await)
    }

    async fn cancel_order_inner(
        &self,
        actor: &ActorContext,
        order_id: OrderId,
        reason: &str,
    ) -> WorkflowResult<Order> {
        let _order_lock = self.locks.acquire([AggregateKey::Order(order_id)]).await;
        let Versioned { value: mut order, version } = self.load_order(order_id).await?;
        AccessPolicy::require_dealer_member(actor, order.dealership_id, "cancel order")?;
        let now = self.now();
        let transition = OrderWorkflow::cancel(&mut order, reason, now)?;

        let colors = allocation_colors(&order);
        let _stock_lock = self.locks.acquire(stock_lock_keys(&colors)).await;
        let mut stock = StockWorkset::load(self.store.as_ref(), &colors).await?;
        return_stock(&mut order, &mut stock, now)?;

        let notes = order.cancel_reason.clone();
        let mut batch = WriteBatch::new();
        stock.stage(&mut batch);
        batch
            .record(transition.into_event(order.id.into_inner(), actor.user_id, now, notes))
            .put_order(order.clone(), version);
        self.store.commit(batch).await?;

        info!(code = %order.code, from = transition.from.as_str(), "Order cancelled");
        Ok(order)
    }

    /// Loads an order the actor may read.
    pub async fn get_order(
        &self,
        actor: &ActorContext,
        order_id: OrderId,
    ) -> WorkflowResult<Order> {
        let order = self.load_order(order_id).await?.value;
        AccessPolicy::require_reader(actor, order.dealership_id, "read order")?;
        Ok(order)
    }

    /// Lists a dealership's orders, newest first.
    pub async fn list_orders(
        &self,
        actor: &ActorContext,
        dealership_id: DealershipId,
        status: Option<OrderStatus>,
        page: &PageRequest,
    ) -> WorkflowResult<PageResponse<Order>> {
        AccessPolicy::require_reader(actor, dealership_id, "list orders")?;
        let mut orders: Vec<Order> = self
            .store
            .list_orders(Some(dealership_id))
            .await?
            .into_iter()
            .filter(|order| status.is_none_or(|status| order.status() == status))
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(page.paginate(orders))
    }

    /// The order's status history, oldest first.
    pub async fn order_history(
        &self,
        actor: &ActorContext,
        order_id: OrderId,
    ) -> WorkflowResult<Vec<StatusHistoryEvent>> {
        self.get_order(actor, order_id).await?;
        self.history_of(EntityKind::Order, order_id.into_inner()).await
    }

    async fn load_order(&self, order_id: OrderId) -> WorkflowResult<Versioned<Order>> {
        self.store
            .get_order(order_id)
            .await?
            .ok_or_else(|| WorkflowError::not_found(EntityKind::Order, order_id))
    }

    /// Locks, loads and checks one order, applies `apply` to a copy and
    /// commits it with the transition's history event. A call that changes
    /// nothing commits nothing.
    async fn update_order<T>(
        &self,
        actor: &ActorContext,
        order_id: OrderId,
        access: OrderAccess,
        action: &'static str,
        notes: Option<String>,
        apply: impl FnOnce(&mut Order, DateTime<Utc>) -> OrderStep<T> + Send,
    ) -> WorkflowResult<(Order, T)> {
        let _lock = self.locks.acquire([AggregateKey::Order(order_id)]).await;
        let Versioned { value: current, version } = self.load_order(order_id).await?;
        access.check(actor, &current, action)?;

        let now = self.now();
        let mut order = current.clone();
        let (value, transition) = apply(&mut order, now)?;
        if order == current {
            return Ok((order, value));
        }

        let mut batch = WriteBatch::new();
        if let Some(transition) = transition {
            batch.record(transition.into_event(order.id.into_inner(), actor.user_id, now, notes));
        }
        batch.put_order(order.clone(), version);
        self.store.commit(batch).await?;
        Ok((order, value))
    }
}

/// Vehicle colors named by the order's lines.
fn item_colors(order: &Order) -> BTreeSet<(VehicleId, String)> {
    order
        .items
        .iter()
        .map(|item| (item.vehicle_id, item.color.clone()))
        .collect()
}

/// Vehicle colors the order holds or has sold.
fn allocation_colors(order: &Order) -> BTreeSet<(VehicleId, String)> {
    order
        .stock_allocations
        .iter()
        .map(|allocation| (allocation.key.vehicle_id, allocation.key.color.clone()))
        .collect()
}

fn add_allocation(
    allocations: &mut Vec<StockAllocation>,
    key: StockKey,
    quantity: u32,
    state: AllocationState,
) {
    match allocations
        .iter_mut()
        .find(|allocation| allocation.key == key && allocation.state == state)
    {
        Some(existing) => existing.quantity += quantity,
        None => allocations.push(StockAllocation { key, quantity, state }),
    }
}

/// Turns holds into sales, then sells whatever the holds do not cover.
fn sell_stock(
    order: &mut Order,
    stock: &mut StockWorkset,
    now: DateTime<Utc>,
) -> WorkflowResult<()> {
    let mut held: Vec<((VehicleId, String), u32)> = Vec::new();
    for allocation in order
        .stock_allocations
        .iter_mut()
        .filter(|allocation| allocation.state == AllocationState::Reserved)
    {
        let sold = StockLedger::commit_reservation(stock.row_mut(&allocation.key)?, order.id, now)?;
        allocation.quantity = sold;
        allocation.state = AllocationState::Sold;
        held.push(((allocation.key.vehicle_id, allocation.key.color.clone()), sold));
    }

    for item in &order.items {
        let mut needed = item.quantity;
        for (_, units) in held
            .iter_mut()
            .filter(|((vehicle_id, color), _)| {
                *vehicle_id == item.vehicle_id && *color == item.color
            })
        {
            let used = (*units).min(needed);
            *units -= used;
            needed -= used;
        }
        if needed == 0 {
            continue;
        }
        let plan = StockLedger::plan_sale(
            &stock.candidates(),
            order.dealership_id,
            item.vehicle_id,
            &item.color,
            needed,
        )?;
        for (key, quantity) in plan {
            StockLedger::decrement_on_sale(stock.row_mut(&key)?, quantity, now)?;
            add_allocation(&mut order.stock_allocations, key, quantity, AllocationState::Sold);
        }
    }
    Ok(())
}

/// Releases holds and reverses sales, leaving the order with no allocations.
fn return_stock(
    order: &mut Order,
    stock: &mut StockWorkset,
    now: DateTime<Utc>,
) -> WorkflowResult<()> {
    for allocation in std::mem::take(&mut order.stock_allocations) {
        let row = stock.row_mut(&allocation.key)?;
        match allocation.state {
            AllocationState::Reserved => {
                StockLedger::release(row, order.id, now)?;
            }
            AllocationState::Sold => StockLedger::reverse_sale(row, allocation.quantity, now)?,
        }
    }
    Ok(())
}
