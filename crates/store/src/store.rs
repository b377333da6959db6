use async_trait::async_trait;
use common::{OrderId, OrderNumber, ProductId, UserId, Version};
use domain::{Aggregate, InventoryRecord, Order, StatsAdjustment, UserOrderStats};

use crate::{OrderQuery, Result, StoreError};

/// Durable home of order documents.
///
/// Writes are conditional on the version the caller loaded, so two writers
/// racing on the same order cannot both win.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Stores a newly placed order at version 1.
    ///
    /// Fails with `DuplicateOrderNumber` if the number is taken and with
    /// `ConcurrencyConflict` if the id already exists.
    async fn insert(&self, order: &Order) -> Result<Version>;

    /// Loads an order with its stored version set.
    async fn get(&self, order_id: OrderId) -> Result<Option<Order>>;

    /// Loads an order by its human-facing number.
    async fn get_by_number(&self, order_number: &OrderNumber) -> Result<Option<Order>>;

    /// Loads the order whose latest checkout session has this id.
    async fn find_by_checkout_session(&self, session_id: &str) -> Result<Option<Order>>;

    /// Replaces the stored order if it is still at `expected`.
    ///
    /// Returns the new version.
    async fn update(&self, order: &Order, expected: Version) -> Result<Version>;

    /// Lists orders matching a query, newest first.
    async fn list(&self, query: OrderQuery) -> Result<Vec<Order>>;
}

/// Extension trait providing convenience methods for order stores.
#[async_trait]
pub trait OrderStoreExt: OrderStore {
    /// Loads an order, failing with `OrderNotFound` if it does not exist.
    async fn require(&self, order_id: OrderId) -> Result<Order> {
        self.get(order_id)
            .await?
            .ok_or(StoreError::OrderNotFound(order_id))
    }

    /// Checks if an order exists.
    async fn exists(&self, order_id: OrderId) -> Result<bool> {
        Ok(self.get(order_id).await?.is_some())
    }
}

// Blanket implementation for all OrderStore implementations
impl<T: OrderStore + ?Sized> OrderStoreExt for T {}

/// Stock levels owned by the catalog.
///
/// Every write keeps `is_available_for_sale == (available_quantity > 0)`.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Reads the current stock and price of a product.
    async fn get_availability(&self, product_id: &ProductId) -> Result<Option<InventoryRecord>>;

    /// Creates or replaces a product's record.
    async fn upsert(&self, record: InventoryRecord) -> Result<()>;

    /// Atomically adds `delta` to the stock, flooring at zero.
    async fn adjust_quantity(&self, product_id: &ProductId, delta: i64)
    -> Result<InventoryRecord>;

    /// Atomically puts `quantity` units back and marks the product available.
    async fn restock(&self, product_id: &ProductId, quantity: u32) -> Result<InventoryRecord>;
}

/// Lifetime order counters per user.
#[async_trait]
pub trait UserStatsStore: Send + Sync {
    async fn get_stats(&self, user_id: UserId) -> Result<Option<UserOrderStats>>;

    /// Applies an adjustment at most once per `(order_id, kind)`.
    ///
    /// Returns true if the counters changed.
    async fn apply_adjustment(&self, adjustment: &StatsAdjustment) -> Result<bool>;
}

/// Checks that an order can be written: placed, with a number.
pub(crate) fn identity_of(order: &Order) -> Result<(OrderId, OrderNumber)> {
    match (order.id(), order.order_number()) {
        (Some(id), Some(number)) => Ok((id, number.clone())),
        _ => Err(StoreError::InvalidRecord(
            "order has not been placed".to_string(),
        )),
    }
}
