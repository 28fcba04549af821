//! Dealer vehicle request state machine.

use chrono::{DateTime, Utc};
use dealerflow_shared::types::{DealerRequestId, DealershipId, UserId};

use super::types::{DealerVehicleRequest, RequestItem, RequestStatus, SubmitRequest};
use crate::debt::DebtItem;
use crate::error::WorkflowError;
use crate::history::{StateMachine, Transition};
use crate::stock::{ReceiveStock, StockOwner, normalize_color};

/// Ledger effects of a delivered request, applied by the engine in one commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryEffects {
    /// Units credited to the dealership's pool.
    pub stock_credits: Vec<ReceiveStock>,
    /// Lines owed to the manufacturer.
    pub debt_items: Vec<DebtItem>,
}

/// Stateless service for dealer request transitions.
pub struct RequestWorkflow;

impl RequestWorkflow {
    /// Builds a new request in `pending`.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an empty item list, a zero quantity, a
    /// zero unit price or a blank color.
    pub fn submit(
        code: String,
        input: SubmitRequest,
        requested_by: UserId,
        dealership_id: DealershipId,
        now: DateTime<Utc>,
    ) -> Result<DealerVehicleRequest, WorkflowError> {
        if input.items.is_empty() {
            return Err(WorkflowError::validation("request must contain at least one item"));
        }
        let items = input
            .items
            .into_iter()
            .map(|item| {
                if item.quantity == 0 {
                    return Err(WorkflowError::validation("item quantity must be positive"));
                }
                if item.unit_price.is_zero() {
                    return Err(WorkflowError::validation("item unit price must be positive"));
                }
                Ok(RequestItem {
                    color: normalize_color(&item.color)?,
                    ..item
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(DealerVehicleRequest {
            id: DealerRequestId::new(),
            code,
            requested_by,
            dealership_id,
            manufacturer_id: input.manufacturer_id,
            items,
            status: RequestStatus::initial(),
            decided_by: None,
            decided_at: None,
            rejection_reason: None,
            cancel_reason: None,
            order_id: input.order_id,
            notes: input.notes,
            delivered_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// `pending → approved`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` unless pending, including a second approve.
    pub fn approve(
        request: &mut DealerVehicleRequest,
        approver: UserId,
        now: DateTime<Utc>,
    ) -> Result<Transition<RequestStatus>, WorkflowError> {
        let transition = Self::move_to(request, RequestStatus::Approved, now)?;
        request.decided_by = Some(approver);
        request.decided_at = Some(now);
        Ok(transition)
    }

    /// `pending → rejected`.
    ///
    /// # Errors
    ///
    /// - `Validation` for a blank reason
    /// - `InvalidTransition` unless pending
    pub fn reject(
        request: &mut DealerVehicleRequest,
        approver: UserId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<Transition<RequestStatus>, WorkflowError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(WorkflowError::validation("rejection reason is required"));
        }
        let transition = Self::move_to(request, RequestStatus::Rejected, now)?;
        request.decided_by = Some(approver);
        request.decided_at = Some(now);
        request.rejection_reason = Some(reason.to_string());
        Ok(transition)
    }

    /// `approved → in_progress`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` unless approved.
    pub fn mark_in_progress(
        request: &mut DealerVehicleRequest,
        now: DateTime<Utc>,
    ) -> Result<Transition<RequestStatus>, WorkflowError> {
        Self::move_to(request, RequestStatus::InProgress, now)
    }

    /// `in_progress → delivered`, returning the stock credits and debt lines
    /// the delivery produces.
    ///
    /// # Errors
    ///
    /// - `InvalidTransition` unless in progress
    /// - `Validation` for a future delivery date or an amount overflow
    pub fn mark_delivered(
        request: &mut DealerVehicleRequest,
        delivered_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<(Transition<RequestStatus>, DeliveryEffects), WorkflowError> {
        request.status.ensure_transition(RequestStatus::Delivered)?;
        let delivered_at = delivered_at.unwrap_or(now);
        if delivered_at > now {
            return Err(WorkflowError::validation("delivery date cannot be in the future"));
        }

        let owner = StockOwner::Dealer(request.dealership_id);
        let stock_credits = request
            .items
            .iter()
            .map(|item| ReceiveStock {
                vehicle_id: item.vehicle_id,
                color: item.color.clone(),
                owner,
                quantity: item.quantity,
            })
            .collect();
        let debt_items = request
            .items
            .iter()
            .map(|item| {
                DebtItem::new(
                    request.id,
                    request.code.clone(),
                    item.vehicle_id,
                    item.color.clone(),
                    item.quantity,
                    item.unit_price,
                    delivered_at,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let transition = Self::move_to(request, RequestStatus::Delivered, now)?;
        request.delivered_at = Some(delivered_at);
        Ok((
            transition,
            DeliveryEffects {
                stock_credits,
                debt_items,
            },
        ))
    }

    /// `delivered → completed`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` unless delivered.
    pub fn complete(
        request: &mut DealerVehicleRequest,
        now: DateTime<Utc>,
    ) -> Result<Transition<RequestStatus>, WorkflowError> {
        Self::move_to(request, RequestStatus::Completed, now)
    }

    /// `pending | approved → canceled`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` once the goods are in transit.
    pub fn cancel(
        request: &mut DealerVehicleRequest,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Transition<RequestStatus>, WorkflowError> {
        let transition = Self::move_to(request, RequestStatus::Canceled, now)?;
        request.cancel_reason = reason
            .map(|reason| reason.trim().to_string())
            .filter(|reason| !reason.is_empty());
        Ok(transition)
    }

    fn move_to(
        request: &mut DealerVehicleRequest,
        to: RequestStatus,
        now: DateTime<Utc>,
    ) -> Result<Transition<RequestStatus>, WorkflowError> {
        let from = request.status;
        from.ensure_transition(to)?;
        request.status = to;
        request.updated_at = now;
        Ok(Transition { from, to })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dealerflow_shared::types::{ManufacturerId, Money, VehicleId};

    fn submit_line(
        quantity: u32,
        unit_price: u64,
    ) -> Result<DealerVehicleRequest, WorkflowError> {
        RequestWorkflow::submit(
            "REQ-000001".into(),
            SubmitRequest {
                manufacturer_id: ManufacturerId::new(),
                items: vec![RequestItem {
                    vehicle_id: VehicleId::new(),
                    color: "Red".into(),
                    quantity,
                    unit_price: Money::from_minor(unit_price),
                }],
                notes: None,
                order_id: None,
            },
            UserId::new(),
            DealershipId::new(),
            Utc::now(),
        )
    }

    fn submitted(quantity: u32) -> DealerVehicleRequest {
        submit_line(quantity, 400_000_000).unwrap()
    }

    #[test]
    fn test_submit_rejects_zero_quantity() {
        assert!(matches!(submit_line(0, 1), Err(WorkflowError::Validation(_))));
    }

    #[test]
    fn test_submit_rejects_zero_unit_price() {
        assert!(matches!(submit_line(5, 0), Err(WorkflowError::Validation(_))));
    }

    #[test]
    fn test_double_approve_is_invalid() {
        let mut request = submitted(5);
        RequestWorkflow::approve(&mut request, UserId::new(), Utc::now()).unwrap();
        let err = RequestWorkflow::approve(&mut request, UserId::new(), Utc::now()).unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::InvalidTransition {
                from: "approved",
                to: "approved",
                ..
            }
        ));
    }

    #[test]
    fn test_reject_requires_reason() {
        let mut request = submitted(1);
        assert!(matches!(
            RequestWorkflow::reject(&mut request, UserId::new(), "  ", Utc::now()),
            Err(WorkflowError::Validation(_))
        ));
        assert_eq!(request.status(), RequestStatus::Pending);
        RequestWorkflow::reject(&mut request, UserId::new(), "budget frozen", Utc::now()).unwrap();
        assert_eq!(request.rejection_reason.as_deref(), Some("budget frozen"));
    }

    #[test]
    fn test_delivery_produces_credits_and_debt() {
        let mut request = submitted(5);
        RequestWorkflow::approve(&mut request, UserId::new(), Utc::now()).unwrap();
        RequestWorkflow::mark_in_progress(&mut request, Utc::now()).unwrap();
        let (transition, effects) =
            RequestWorkflow::mark_delivered(&mut request, None, Utc::now()).unwrap();

        assert_eq!(transition.to, RequestStatus::Delivered);
        assert_eq!(effects.stock_credits.len(), 1);
        assert_eq!(effects.stock_credits[0].quantity, 5);
        assert_eq!(effects.stock_credits[0].owner, StockOwner::Dealer(request.dealership_id));
        assert_eq!(effects.debt_items[0].amount, Money::from_minor(2_000_000_000));
    }

    #[test]
    fn test_cancel_only_before_transit() {
        let mut request = submitted(1);
        RequestWorkflow::approve(&mut request, UserId::new(), Utc::now()).unwrap();
        RequestWorkflow::mark_in_progress(&mut request, Utc::now()).unwrap();
        assert!(matches!(
            RequestWorkflow::cancel(&mut request, None, Utc::now()),
            Err(WorkflowError::InvalidTransition { .. })
        ));

        let mut pending = submitted(1);
        RequestWorkflow::cancel(&mut pending, Some("duplicate".into()), Utc::now()).unwrap();
        assert_eq!(pending.status(), RequestStatus::Canceled);
    }
}
