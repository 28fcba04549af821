//! Manufacturer debt ledger.
//!
//! One ledger per (dealership, manufacturer) pair accumulates the value of
//! delivered dealer requests and records payments against it.

mod ledger;
mod types;

#[cfg(test)]
mod ledger_props;

pub use ledger::DebtLedger;
pub use types::{DebtItem, DebtStatus, DebtSummary, ManufacturerDebt};
