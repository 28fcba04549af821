//! Core workflow logic for Dealerflow.
//!
//! Orders move from quote to delivery, dealerships restock from
//! manufacturers, and every sale, restock and payment flows through two
//! ledgers: per-color stock and per-manufacturer debt.
//!
//! # Modules
//!
//! - `order` - Customer order state machine, contracts, payments, delivery
//! - `dealer_request` - Dealer vehicle request state machine
//! - `stock` - Per-(vehicle, color, owner) stock ledger
//! - `debt` - Dealership-to-manufacturer debt ledger
//! - `engine` - Orchestrator that locks, applies and commits atomically
//! - `store` - Versioned persistence seam and the in-memory store
//! - `history` - Append-only status history and replay

pub mod access;
pub mod clock;
pub mod dealer_request;
pub mod debt;
pub mod engine;
pub mod error;
pub mod history;
pub mod order;
pub mod payment;
pub mod policy;
pub mod stock;
pub mod store;

pub use access::{AccessPolicy, ActorContext, Role};
pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{ContractUploadResult, PaymentReceipt, WorkflowEngine};
pub use error::{WorkflowError, WorkflowResult};
pub use policy::{UploadPolicy, WorkflowPolicy};
pub use store::{MemoryStore, WorkflowStore};
