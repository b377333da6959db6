//! Persistence for the order lifecycle engine.
//!
//! Three stores, each with an in-memory and a PostgreSQL implementation:
//! - [`OrderStore`]: order documents with version-conditional updates
//! - [`InventoryStore`]: stock levels with atomic floor-at-zero adjustments
//! - [`UserStatsStore`]: idempotent per-user order counters

pub mod error;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::{InMemoryInventoryStore, InMemoryOrderStore, InMemoryUserStatsStore};
pub use postgres::PostgresStore;
pub use query::OrderQuery;
pub use store::{InventoryStore, OrderStore, OrderStoreExt, UserStatsStore};
