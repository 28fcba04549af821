//! Workflow error types.
//!
//! Every failure the engine can report is a variant of [`WorkflowError`].
//! Each variant carries a stable machine-readable code and maps to an
//! HTTP status so the API layer never has to inspect messages.

use chrono::Duration;
use dealerflow_shared::AppError;
use dealerflow_shared::types::{Money, VehicleId};
use thiserror::Error;

use crate::history::EntityKind;
use crate::store::StoreError;

/// Result type alias using `WorkflowError`.
pub type WorkflowResult<T> = Result<T, WorkflowError>;

/// Errors that can occur during workflow operations.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Malformed or missing input. No state was changed.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The requested state change is not legal from the current state.
    #[error("Invalid {entity} transition from {from} to {to}")]
    InvalidTransition {
        /// The aggregate whose state machine rejected the change.
        entity: EntityKind,
        /// The current status.
        from: &'static str,
        /// The attempted target status.
        to: &'static str,
    },

    /// The actor lacks the role or ownership the operation requires.
    #[error("Not allowed to {action}: {reason}")]
    ForbiddenTransition {
        /// The attempted operation.
        action: &'static str,
        /// Why the actor was refused.
        reason: String,
    },

    /// A time guard is not yet satisfied.
    #[error("Too early to {action}: {} hour(s) remaining", hours_rounded_up(.remaining))]
    TooEarly {
        /// The attempted operation.
        action: &'static str,
        /// How long the caller still has to wait.
        remaining: Duration,
    },

    /// Not enough unreserved stock for a sale or reservation.
    #[error(
        "Insufficient stock for vehicle {vehicle_id} in {color}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        /// The vehicle model.
        vehicle_id: VehicleId,
        /// The color requested.
        color: String,
        /// Units requested.
        requested: u32,
        /// Units that could be allocated.
        available: u32,
    },

    /// A payment would exceed the outstanding balance.
    #[error("Insufficient balance: amount {requested} exceeds outstanding {remaining}")]
    InsufficientBalance {
        /// The amount the caller tried to apply.
        requested: Money,
        /// The outstanding balance.
        remaining: Money,
    },

    /// Optimistic version check failed; the caller should retry.
    #[error("{entity} was modified concurrently, retry the operation")]
    ConcurrentModification {
        /// Description of the conflicting aggregate.
        entity: String,
    },

    /// Referenced entity does not exist.
    #[error("{entity} {id} not found")]
    NotFound {
        /// The kind of entity looked up.
        entity: EntityKind,
        /// The identifier that was not found.
        id: String,
    },

    /// The store failed for a reason unrelated to the request.
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Whole hours in `remaining`, rounded up so "23h 1m" reports 24.
fn hours_rounded_up(remaining: &Duration) -> i64 {
    let seconds = remaining.num_seconds().max(0);
    (seconds + 3599) / 3600
}

impl WorkflowError {
    /// Creates a validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(entity: EntityKind, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Creates a forbidden-transition error.
    #[must_use]
    pub fn forbidden(action: &'static str, reason: impl Into<String>) -> Self {
        Self::ForbiddenTransition {
            action,
            reason: reason.into(),
        }
    }

    /// For `TooEarly`, the remaining wait in whole hours (rounded up).
    #[must_use]
    pub fn remaining_hours(&self) -> Option<i64> {
        match self {
            Self::TooEarly { remaining, .. } => Some(hours_rounded_up(remaining)),
            _ => None,
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::ForbiddenTransition { .. } => 403,
            Self::NotFound { .. } => 404,
            Self::InvalidTransition { .. } | Self::ConcurrentModification { .. } => 409,
            Self::InsufficientStock { .. } | Self::InsufficientBalance { .. } => 422,
            Self::TooEarly { .. } => 425,
            Self::Storage(_) => 500,
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::ForbiddenTransition { .. } => "FORBIDDEN_TRANSITION",
            Self::TooEarly { .. } => "TOO_EARLY",
            Self::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            Self::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            Self::ConcurrentModification { .. } => "CONCURRENT_MODIFICATION",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Storage(_) => "STORAGE_ERROR",
        }
    }

    /// Returns true if retrying the same call is safe.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrentModification { .. })
    }
}

impl From<StoreError> for WorkflowError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::VersionConflict { entity } => Self::ConcurrentModification { entity },
            StoreError::Backend(message) => Self::Storage(message),
        }
    }
}

impl From<WorkflowError> for AppError {
    fn from(err: WorkflowError) -> Self {
        let message = err.to_string();
        match err {
            WorkflowError::Validation(_) => Self::Validation(message),
            WorkflowError::ForbiddenTransition { .. } => Self::Forbidden(message),
            WorkflowError::NotFound { .. } => Self::NotFound(message),
            WorkflowError::ConcurrentModification { .. } => Self::Conflict(message),
            WorkflowError::Storage(_) => Self::Storage(message),
            other => Self::BusinessRule {
                code: other.error_code(),
                status: other.status_code(),
                message,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_transition_error() {
        let err = WorkflowError::InvalidTransition {
            entity: EntityKind::Order,
            from: "pending",
            to: "completed",
        };
        assert_eq!(err.status_code(), 409);
        assert_eq!(err.error_code(), "INVALID_TRANSITION");
        assert!(err.to_string().contains("pending"));
        assert!(err.to_string().contains("completed"));
    }

    #[test]
    fn test_too_early_rounds_hours_up() {
        let err = WorkflowError::TooEarly {
            action: "complete order",
            remaining: Duration::hours(23),
        };
        assert_eq!(err.remaining_hours(), Some(23));
        assert_eq!(err.status_code(), 425);
        assert!(err.to_string().contains("23 hour(s)"));

        let err = WorkflowError::TooEarly {
            action: "complete order",
            remaining: Duration::minutes(1),
        };
        assert_eq!(err.remaining_hours(), Some(1));
    }

    #[test]
    fn test_remaining_hours_only_for_too_early() {
        assert_eq!(WorkflowError::validation("x").remaining_hours(), None);
    }

    #[test]
    fn test_forbidden_error() {
        let err = WorkflowError::forbidden("approve request", "dealer manager required");
        assert_eq!(err.status_code(), 403);
        assert_eq!(err.error_code(), "FORBIDDEN_TRANSITION");
    }

    #[test]
    fn test_ledger_errors_are_unprocessable() {
        let stock = WorkflowError::InsufficientStock {
            vehicle_id: VehicleId::new(),
            color: "Red".into(),
            requested: 2,
            available: 1,
        };
        let balance = WorkflowError::InsufficientBalance {
            requested: Money::from_minor(10),
            remaining: Money::from_minor(5),
        };
        assert_eq!(stock.status_code(), 422);
        assert_eq!(balance.status_code(), 422);
        assert_eq!(stock.error_code(), "INSUFFICIENT_STOCK");
        assert_eq!(balance.error_code(), "INSUFFICIENT_BALANCE");
    }

    #[test]
    fn test_store_conflict_maps_to_concurrent_modification() {
        let err: WorkflowError = StoreError::VersionConflict {
            entity: "order".into(),
        }
        .into();
        assert!(err.is_retryable());
        assert_eq!(err.error_code(), "CONCURRENT_MODIFICATION");
    }

    #[test]
    fn test_app_error_conversion_keeps_code() {
        let app: AppError = WorkflowError::TooEarly {
            action: "complete order",
            remaining: Duration::hours(2),
        }
        .into();
        assert_eq!(app.error_code(), "TOO_EARLY");
        assert_eq!(app.status_code(), 425);

        let app: AppError = WorkflowError::not_found(EntityKind::Order, "42").into();
        assert_eq!(app.error_code(), "NOT_FOUND");
        assert_eq!(app.status_code(), 404);
    }
}
