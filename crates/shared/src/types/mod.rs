//! Common types used across the application.

pub mod id;
pub mod money;
pub mod pagination;
pub mod response;

#[cfg(test)]
mod money_props;

pub use id::*;
pub use money::Money;
pub use pagination::{PageMeta, PageRequest, PageResponse};
pub use response::ApiResponse;
