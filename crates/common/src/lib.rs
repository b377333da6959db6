//! Shared identifier types for the order lifecycle engine.

mod types;
mod version;

pub use types::{OrderId, OrderNumber, ProductId, UserId};
pub use version::Version;
