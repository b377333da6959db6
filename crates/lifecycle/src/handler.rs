//! Command handling against stored orders.

use common::{OrderId, Version};
use domain::{Aggregate, NewOrder, Order, OrderError, OrderEvent};
use store::{OrderStore, OrderStoreExt, StoreError};

use crate::error::{LifecycleError, Result};

/// Result of command execution.
#[derive(Debug)]
pub struct CommandResult {
    /// The order after applying the new events.
    pub order: Order,

    /// The events that were decided and saved.
    pub events: Vec<OrderEvent>,

    /// The stored version after the command.
    pub new_version: Version,
}

impl CommandResult {
    /// Returns true if the command changed nothing.
    pub fn is_noop(&self) -> bool {
        self.events.is_empty()
    }
}

/// Loads an order, runs a command against it and writes it back.
///
/// The write is conditional on the version that was loaded, so a concurrent
/// writer makes the second save fail with `ConcurrencyConflict` instead of
/// silently overwriting. Nothing is retried here.
#[derive(Clone)]
pub struct OrderCommandHandler<S: OrderStore> {
    store: S,
}

impl<S: OrderStore> OrderCommandHandler<S> {
    /// Creates a new command handler over the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Loads an order, failing with `OrderNotFound` if it does not exist.
    pub async fn load(&self, order_id: OrderId) -> Result<Order> {
        Ok(self.store.require(order_id).await?)
    }

    /// Places and stores a new order at version 1.
    #[tracing::instrument(skip(self, new), fields(order_id = %new.order_id, order_number = %new.order_number))]
    pub async fn create(&self, new: NewOrder) -> Result<CommandResult> {
        let mut order = Order::default();
        let events = order.place(new)?;
        order.apply_events(events.clone());

        let new_version = self.store.insert(&order).await?;
        order.set_version(new_version);

        Ok(CommandResult {
            order,
            events,
            new_version,
        })
    }

    /// Loads an order and executes a command against it.
    pub async fn execute<F>(&self, order_id: OrderId, command_fn: F) -> Result<CommandResult>
    where
        F: FnOnce(&Order) -> std::result::Result<Vec<OrderEvent>, OrderError>,
    {
        let order = self.load(order_id).await?;
        self.execute_on(order, command_fn).await
    }

    /// Executes a command against an order the caller already loaded.
    ///
    /// The save is conditional on `order.version()`.
    pub async fn execute_on<F>(&self, mut order: Order, command_fn: F) -> Result<CommandResult>
    where
        F: FnOnce(&Order) -> std::result::Result<Vec<OrderEvent>, OrderError>,
    {
        let current_version = order.version();

        let events = command_fn(&order)?;

        if events.is_empty() {
            return Ok(CommandResult {
                order,
                events: vec![],
                new_version: current_version,
            });
        }

        order.apply_events(events.clone());

        let new_version = match self.store.update(&order, current_version).await {
            Ok(version) => version,
            Err(err @ StoreError::ConcurrencyConflict { .. }) => {
                metrics::counter!("order_store_conflicts_total").increment(1);
                tracing::warn!(error = %err, "order was modified concurrently");
                return Err(LifecycleError::from(err));
            }
            Err(err) => return Err(err.into()),
        };
        order.set_version(new_version);

        Ok(CommandResult {
            order,
            events,
            new_version,
        })
    }
}

#[cfg(test)]
mod tests {
    use common::{OrderNumber, UserId};
    use domain::{
        Actor, Address, FulfillmentStatus, LineItem, Money, PaymentMethod, PaymentStatus,
        PricingPolicy,
    };
    use store::InMemoryOrderStore;

    use super::*;

    fn new_order() -> NewOrder {
        let items = vec![
            LineItem::snapshot("SKU-RICE", "Jasmine Rice", None, Money::from_cents(899), 2, None)
                .unwrap(),
        ];
        let totals = PricingPolicy::default()
            .price(&items, Money::zero(), Money::zero())
            .unwrap();
        NewOrder {
            order_id: OrderId::new(),
            order_number: OrderNumber::new("ORD-7-0001"),
            user_id: UserId::new(),
            items,
            totals,
            shipping_address: Address {
                full_name: "Sam Carter".to_string(),
                street: "9 Birch Rd".to_string(),
                apartment: None,
                city: "Boise".to_string(),
                state: "ID".to_string(),
                zip_code: "83702".to_string(),
                country: "US".to_string(),
                phone: None,
            },
            billing_address: None,
            payment_method: PaymentMethod::ProcessorCard,
            notes: None,
            actor: Actor::System,
        }
    }

    #[tokio::test]
    async fn test_create_stores_version_one() {
        let handler = OrderCommandHandler::new(InMemoryOrderStore::new());
        let result = handler.create(new_order()).await.unwrap();

        assert_eq!(result.new_version, Version::first());
        assert_eq!(result.events.len(), 1);
        assert_eq!(result.order.status(), FulfillmentStatus::Pending);

        let loaded = handler.load(result.order.id().unwrap()).await.unwrap();
        assert_eq!(loaded.version(), Version::first());
    }

    #[tokio::test]
    async fn test_execute_bumps_version() {
        let handler = OrderCommandHandler::new(InMemoryOrderStore::new());
        let order_id = handler.create(new_order()).await.unwrap().order.id().unwrap();

        let result = handler
            .execute(order_id, |o| o.fail_payment("expired", Actor::Processor))
            .await
            .unwrap();
        assert_eq!(result.new_version, Version::new(2));
        assert_eq!(result.order.payment_status(), PaymentStatus::Failed);
    }

    #[tokio::test]
    async fn test_noop_command_does_not_write() {
        let handler = OrderCommandHandler::new(InMemoryOrderStore::new());
        let order_id = handler.create(new_order()).await.unwrap().order.id().unwrap();

        let result = handler
            .execute(order_id, |o| o.clear_payment_request(Actor::System))
            .await
            .unwrap();
        assert!(result.is_noop());
        assert_eq!(result.new_version, Version::first());
    }

    #[tokio::test]
    async fn test_rejected_command_leaves_order_unchanged() {
        let handler = OrderCommandHandler::new(InMemoryOrderStore::new());
        let order_id = handler.create(new_order()).await.unwrap().order.id().unwrap();

        let result = handler
            .execute(order_id, |o| {
                o.advance(FulfillmentStatus::Shipped, None, None, Actor::System)
            })
            .await;
        assert!(matches!(result, Err(LifecycleError::InvalidTransition { .. })));

        let loaded = handler.load(order_id).await.unwrap();
        assert_eq!(loaded.version(), Version::first());
        assert_eq!(loaded.status_history().len(), 1);
    }

    #[tokio::test]
    async fn test_stale_order_conflicts() {
        let handler = OrderCommandHandler::new(InMemoryOrderStore::new());
        let order_id = handler.create(new_order()).await.unwrap().order.id().unwrap();

        let stale = handler.load(order_id).await.unwrap();
        handler
            .execute(order_id, |o| o.request_payment(Money::from_cents(500), Actor::System))
            .await
            .unwrap();

        let result = handler
            .execute_on(stale, |o| o.cancel("late", Actor::System))
            .await;
        assert!(matches!(
            result,
            Err(LifecycleError::ConcurrencyConflict { order_id: id }) if id == order_id
        ));
    }

    #[tokio::test]
    async fn test_missing_order() {
        let handler = OrderCommandHandler::new(InMemoryOrderStore::new());
        let result = handler
            .execute(OrderId::new(), |o| o.cancel("x", Actor::System))
            .await;
        assert!(matches!(result, Err(LifecycleError::OrderNotFound(_))));
    }
}
