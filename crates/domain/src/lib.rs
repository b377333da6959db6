//! Domain layer for the grocery order lifecycle engine.
//!
//! This crate holds the pure model, with no I/O:
//! - Aggregate trait for decide/apply style entities
//! - Order aggregate with separate fulfillment and payment state machines
//! - Pricing policy computing order totals from price-snapshotted lines
//! - Inventory records and per-user order statistics

pub mod aggregate;
pub mod inventory;
pub mod order;
pub mod user;

pub use aggregate::{Aggregate, DomainEvent};
pub use common::{OrderId, OrderNumber, ProductId, UserId, Version};
pub use inventory::InventoryRecord;
pub use order::{
    Actor, Address, CardSummary, FulfillmentStatus, LineItem, Money, NewOrder, Order, OrderError,
    OrderEvent, OrderTotals, PaymentMethod, PaymentRecord, PaymentState, PaymentStatus,
    PricingPolicy, StatusHistoryEntry,
};
pub use user::{AdjustmentKind, StatsAdjustment, UserOrderStats};
