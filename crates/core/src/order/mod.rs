//! Customer orders.
//!
//! The status machine lives in [`OrderWorkflow`]; contract upload screening
//! in [`screen_uploads`]. Stock and persistence are driven by the engine.

mod contract;
mod service;
mod types;

#[cfg(test)]
mod service_props;

pub use contract::screen_uploads;
pub use service::OrderWorkflow;
pub use types::{
    AllocationState, Contract, ContractFile, ContractMeta, ContractStatus, ContractUpload,
    CreateOrder, DeliverOrder, Delivery, DeliveryStatus, Order, OrderItem, OrderItemInput,
    OrderStatus, PaymentMethod, PricedExtra, Recipient, RejectedFile, StockAllocation,
    UploadOutcome,
};
