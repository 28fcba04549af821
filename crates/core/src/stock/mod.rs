//! Per-vehicle, per-color stock pools.
//!
//! A pool is owned by either a manufacturer or a dealership. Quantities are
//! only changed through [`StockLedger`]; derived figures (`remaining`,
//! `available`, the color breakdown) are computed here and never stored.

mod ledger;
mod types;

#[cfg(test)]
mod ledger_props;

pub use ledger::StockLedger;
pub(crate) use types::normalize_color;
pub use types::{
    ColorStock, OwnerType, ReceiveStock, StockEntry, StockKey, StockOwner, StockSummary,
};
