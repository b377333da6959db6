use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{OrderId, OrderNumber, ProductId, UserId, Version};
use domain::{Aggregate, InventoryRecord, Order, StatsAdjustment, UserOrderStats};
use tokio::sync::RwLock;

use crate::{
    OrderQuery, Result, StoreError,
    store::{InventoryStore, OrderStore, UserStatsStore, identity_of},
};

/// In-memory order store for tests and local runs.
///
/// Provides the same conditional-write semantics as the PostgreSQL store.
#[derive(Clone, Default)]
pub struct InMemoryOrderStore {
    orders: Arc<RwLock<HashMap<OrderId, Order>>>,
}

impl InMemoryOrderStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored orders.
    pub async fn order_count(&self) -> usize {
        self.orders.read().await.len()
    }

    /// Clears all orders.
    pub async fn clear(&self) {
        self.orders.write().await.clear();
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert(&self, order: &Order) -> Result<Version> {
        let (order_id, order_number) = identity_of(order)?;

        let mut orders = self.orders.write().await;

        if let Some(existing) = orders.get(&order_id) {
            return Err(StoreError::ConcurrencyConflict {
                order_id,
                expected: Version::initial(),
                actual: existing.version(),
            });
        }

        if orders
            .values()
            .any(|o| o.order_number() == Some(&order_number))
        {
            return Err(StoreError::DuplicateOrderNumber(order_number));
        }

        let mut stored = order.clone();
        stored.set_version(Version::first());
        orders.insert(order_id, stored);

        Ok(Version::first())
    }

    async fn get(&self, order_id: OrderId) -> Result<Option<Order>> {
        Ok(self.orders.read().await.get(&order_id).cloned())
    }

    async fn get_by_number(&self, order_number: &OrderNumber) -> Result<Option<Order>> {
        let orders = self.orders.read().await;
        Ok(orders
            .values()
            .find(|o| o.order_number() == Some(order_number))
            .cloned())
    }

    async fn find_by_checkout_session(&self, session_id: &str) -> Result<Option<Order>> {
        let orders = self.orders.read().await;
        Ok(orders
            .values()
            .find(|o| o.payment().checkout_session_id.as_deref() == Some(session_id))
            .cloned())
    }

    async fn update(&self, order: &Order, expected: Version) -> Result<Version> {
        let (order_id, _) = identity_of(order)?;

        let mut orders = self.orders.write().await;

        let current = orders
            .get(&order_id)
            .map(|o| o.version())
            .ok_or(StoreError::OrderNotFound(order_id))?;

        if current != expected {
            return Err(StoreError::ConcurrencyConflict {
                order_id,
                expected,
                actual: current,
            });
        }

        let next = expected.next();
        let mut stored = order.clone();
        stored.set_version(next);
        orders.insert(order_id, stored);

        Ok(next)
    }

    async fn list(&self, query: OrderQuery) -> Result<Vec<Order>> {
        let orders = self.orders.read().await;
        let mut matching: Vec<_> = orders
            .values()
            .filter(|o| query.matches(o))
            .cloned()
            .collect();

        // Newest first
        matching.sort_by(|a, b| b.created_at().cmp(&a.created_at()));

        let offset = query.offset.unwrap_or(0);
        let limit = query.limit.unwrap_or(usize::MAX);

        Ok(matching.into_iter().skip(offset).take(limit).collect())
    }
}

/// In-memory inventory ledger.
#[derive(Clone, Default)]
pub struct InMemoryInventoryStore {
    records: Arc<RwLock<HashMap<ProductId, InventoryRecord>>>,
}

impl InMemoryInventoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store seeded with records.
    pub fn with_records(records: impl IntoIterator<Item = InventoryRecord>) -> Self {
        let map = records
            .into_iter()
            .map(|r| (r.product_id().clone(), r))
            .collect();
        Self {
            records: Arc::new(RwLock::new(map)),
        }
    }
}

#[async_trait]
impl InventoryStore for InMemoryInventoryStore {
    async fn get_availability(&self, product_id: &ProductId) -> Result<Option<InventoryRecord>> {
        Ok(self.records.read().await.get(product_id).cloned())
    }

    async fn upsert(&self, record: InventoryRecord) -> Result<()> {
        self.records
            .write()
            .await
            .insert(record.product_id().clone(), record);
        Ok(())
    }

    async fn adjust_quantity(
        &self,
        product_id: &ProductId,
        delta: i64,
    ) -> Result<InventoryRecord> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(product_id)
            .ok_or_else(|| StoreError::ProductNotFound(product_id.clone()))?;
        record.adjust(delta);
        Ok(record.clone())
    }

    async fn restock(&self, product_id: &ProductId, quantity: u32) -> Result<InventoryRecord> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(product_id)
            .ok_or_else(|| StoreError::ProductNotFound(product_id.clone()))?;
        record.restock(quantity);
        Ok(record.clone())
    }
}

/// In-memory user stats.
#[derive(Clone, Default)]
pub struct InMemoryUserStatsStore {
    stats: Arc<RwLock<HashMap<UserId, UserOrderStats>>>,
}

impl InMemoryUserStatsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStatsStore for InMemoryUserStatsStore {
    async fn get_stats(&self, user_id: UserId) -> Result<Option<UserOrderStats>> {
        Ok(self.stats.read().await.get(&user_id).cloned())
    }

    async fn apply_adjustment(&self, adjustment: &StatsAdjustment) -> Result<bool> {
        let mut stats = self.stats.write().await;
        let entry = stats
            .entry(adjustment.user_id)
            .or_insert_with(|| UserOrderStats::new(adjustment.user_id));
        Ok(entry.apply(adjustment))
    }
}
