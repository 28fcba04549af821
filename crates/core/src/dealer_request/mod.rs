//! Dealer vehicle requests.
//!
//! A dealership asks a manufacturer for vehicles; delivery credits the
//! dealership's stock and accrues the manufacturer debt.

mod service;
mod types;

pub use service::{DeliveryEffects, RequestWorkflow};
pub use types::{DealerVehicleRequest, RequestItem, RequestStatus, SubmitRequest};
