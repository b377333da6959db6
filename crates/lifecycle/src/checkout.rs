//! Order creation.
//!
//! Checkout runs as three explicit phases:
//!
//! 1. [`CheckoutService::reserve`] validates the request against a live read
//!    of inventory, snapshots prices and computes totals. Nothing is written.
//! 2. [`CheckoutService::commit`] stores the order in `pending/pending`.
//! 3. [`CheckoutService::adjust_inventory`] decrements stock line by line.
//!
//! The phases are not transactional. Stock is read without a lock, so two
//! concurrent checkouts can both pass `reserve` against the same count; the
//! decrement then floors at zero. A decrement that fails after the order was
//! stored leaves the order valid and is reported, not undone.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use common::{OrderId, ProductId, UserId};
use domain::{
    Actor, Address, Aggregate, InventoryRecord, LineItem, Money, NewOrder, Order, PaymentMethod,
    PricingPolicy, StatsAdjustment, order::issue_order_number,
};
use futures_util::future::try_join_all;
use rust_decimal::Decimal;
use store::{InventoryStore, OrderStore, UserStatsStore};

use crate::config::LifecycleConfig;
use crate::error::{LifecycleError, Result};
use crate::handler::OrderCommandHandler;
use crate::services::{CartService, OrderNotifier, OrderSummary};

/// One requested line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutLine {
    pub product_id: ProductId,
    pub quantity: u32,
    /// Weight per unit, for produce sold by weight.
    pub weight: Option<Decimal>,
}

impl CheckoutLine {
    pub fn new(product_id: impl Into<ProductId>, quantity: u32) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
            weight: None,
        }
    }

    pub fn weighted(product_id: impl Into<ProductId>, quantity: u32, weight: Decimal) -> Self {
        Self {
            weight: Some(weight),
            ..Self::new(product_id, quantity)
        }
    }
}

/// A cart (or direct item list) being turned into an order.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub user_id: UserId,
    pub lines: Vec<CheckoutLine>,
    pub shipping_address: Address,
    pub billing_address: Option<Address>,
    pub payment_method: PaymentMethod,
    pub tip: Money,
    pub discount: Money,
    pub notes: Option<String>,
}

impl CheckoutRequest {
    pub fn new(user_id: UserId, lines: Vec<CheckoutLine>, shipping_address: Address) -> Self {
        Self {
            user_id,
            lines,
            shipping_address,
            billing_address: None,
            payment_method: PaymentMethod::ProcessorCard,
            tip: Money::zero(),
            discount: Money::zero(),
            notes: None,
        }
    }

    pub fn with_payment_method(mut self, payment_method: PaymentMethod) -> Self {
        self.payment_method = payment_method;
        self
    }

    pub fn with_tip(mut self, tip: Money) -> Self {
        self.tip = tip;
        self
    }

    pub fn with_discount(mut self, discount: Money) -> Self {
        self.discount = discount;
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// A validated, priced order that has not been stored yet.
#[derive(Debug, Clone)]
pub struct Reservation {
    pub new_order: NewOrder,
}

impl Reservation {
    pub fn order_id(&self) -> OrderId {
        self.new_order.order_id
    }

    pub fn total_amount(&self) -> Money {
        self.new_order.totals.total_amount
    }
}

/// Result of the best-effort stock decrement.
#[derive(Debug, Clone, Default)]
pub struct InventoryReport {
    /// Records as they stand after each successful decrement.
    pub adjusted: Vec<InventoryRecord>,
    /// Lines whose decrement failed, with the error text.
    pub failures: Vec<(ProductId, String)>,
}

impl InventoryReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// A stored order and what happened to its stock.
#[derive(Debug)]
pub struct PlacedOrder {
    pub order: Order,
    pub inventory: InventoryReport,
}

/// Turns carts into stored orders.
pub struct CheckoutService<O, I, U>
where
    O: OrderStore,
    I: InventoryStore,
    U: UserStatsStore,
{
    handler: OrderCommandHandler<O>,
    inventory: I,
    stats: U,
    pricing: PricingPolicy,
    notifier: Option<Arc<dyn OrderNotifier>>,
    cart: Option<Arc<dyn CartService>>,
}

impl<O, I, U> CheckoutService<O, I, U>
where
    O: OrderStore,
    I: InventoryStore,
    U: UserStatsStore,
{
    pub fn new(orders: O, inventory: I, stats: U, config: &LifecycleConfig) -> Self {
        Self {
            handler: OrderCommandHandler::new(orders),
            inventory,
            stats,
            pricing: config.pricing_policy(),
            notifier: None,
            cart: None,
        }
    }

    /// Announces every placed order on the given channel.
    pub fn with_notifier(mut self, notifier: Arc<dyn OrderNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Empties the customer's cart after each placed order.
    pub fn with_cart(mut self, cart: Arc<dyn CartService>) -> Self {
        self.cart = Some(cart);
        self
    }

    pub fn pricing(&self) -> &PricingPolicy {
        &self.pricing
    }

    /// Places an order: reserve, commit, adjust inventory, then side effects.
    ///
    /// Fails only if reservation or commit fails. Once the order is stored,
    /// inventory, user stats, notification and cart failures are logged and
    /// the order stands.
    #[tracing::instrument(skip(self, request), fields(user_id = %request.user_id, lines = request.lines.len()))]
    pub async fn place_order(&self, request: CheckoutRequest) -> Result<PlacedOrder> {
        let start = Instant::now();

        let result = self.place_order_inner(request).await;

        metrics::histogram!("checkout_duration_seconds").record(start.elapsed().as_secs_f64());
        match &result {
            Ok(_) => metrics::counter!("orders_placed_total").increment(1),
            Err(err) => {
                metrics::counter!("order_placement_failures_total", "reason" => err.kind())
                    .increment(1);
                tracing::info!(error = %err, "checkout rejected");
            }
        }

        result
    }

    async fn place_order_inner(&self, request: CheckoutRequest) -> Result<PlacedOrder> {
        let reservation = self.reserve(request).await?;
        let order = self.commit(reservation).await?;
        let inventory = self.adjust_inventory(&order).await;

        if let (Some(order_id), Some(user_id)) = (order.id(), order.user_id()) {
            self.record_stats(StatsAdjustment::placed(
                user_id,
                order_id,
                order.total_amount(),
            ))
            .await;

            if let Some(notifier) = &self.notifier
                && let Some(summary) = OrderSummary::of(&order)
                && let Err(err) = notifier.notify_new_order(&summary).await
            {
                tracing::warn!(%order_id, error = %err, "new order notification failed");
            }

            if let Some(cart) = &self.cart
                && let Err(err) = cart.clear_cart(user_id).await
            {
                tracing::warn!(%order_id, error = %err, "failed to clear cart");
            }
        }

        Ok(PlacedOrder { order, inventory })
    }

    /// Validates a request and prices it against current stock.
    #[tracing::instrument(skip(self, request), fields(user_id = %request.user_id))]
    pub async fn reserve(&self, request: CheckoutRequest) -> Result<Reservation> {
        if request.lines.is_empty() {
            return Err(LifecycleError::EmptyCart);
        }

        if let Some(field) = request.shipping_address.missing_field() {
            return Err(LifecycleError::InvalidAddress { field });
        }

        let lines = merge_lines(request.lines)?;

        let mut requested: HashMap<&ProductId, u32> = HashMap::new();
        for line in &lines {
            let total = requested.entry(&line.product_id).or_default();
            *total = total.saturating_add(line.quantity);
        }

        let mut product_ids: Vec<&ProductId> = Vec::new();
        let mut seen = HashSet::new();
        for line in &lines {
            if seen.insert(&line.product_id) {
                product_ids.push(&line.product_id);
            }
        }

        let records = try_join_all(
            product_ids
                .iter()
                .map(|product_id| self.inventory.get_availability(product_id)),
        )
        .await?;

        let mut catalog: HashMap<&ProductId, InventoryRecord> = HashMap::new();
        for (product_id, record) in product_ids.iter().zip(records) {
            let record = record.ok_or_else(|| LifecycleError::InvalidLine {
                product_id: product_id.to_string(),
                reason: "product not found".to_string(),
            })?;

            let wanted = requested.get(product_id).copied().unwrap_or_default();
            if !record.is_available_for_sale() || !record.can_fulfill(wanted) {
                return Err(LifecycleError::OutOfStock {
                    product_id: (*product_id).clone(),
                    requested: wanted,
                    available: record.available_quantity(),
                });
            }
            catalog.insert(*product_id, record);
        }

        let mut items = Vec::with_capacity(lines.len());
        for line in &lines {
            let Some(record) = catalog.get(&line.product_id) else {
                continue;
            };
            items.push(LineItem::snapshot(
                line.product_id.clone(),
                record.name(),
                record.category().map(str::to_string),
                record.unit_price(),
                line.quantity,
                line.weight,
            )?);
        }

        let totals = self.pricing.price(&items, request.tip, request.discount)?;

        tracing::debug!(
            subtotal = %totals.subtotal,
            tax = %totals.tax_amount,
            shipping = %totals.shipping_amount,
            total = %totals.total_amount,
            "order priced"
        );

        Ok(Reservation {
            new_order: NewOrder {
                order_id: OrderId::new(),
                order_number: issue_order_number(Utc::now()),
                user_id: request.user_id,
                items,
                totals,
                shipping_address: request.shipping_address,
                billing_address: request.billing_address,
                payment_method: request.payment_method,
                notes: request.notes,
                actor: Actor::Customer(request.user_id),
            },
        })
    }

    /// Stores a reserved order in `pending/pending`.
    #[tracing::instrument(skip(self, reservation), fields(order_id = %reservation.order_id()))]
    pub async fn commit(&self, reservation: Reservation) -> Result<Order> {
        let result = self.handler.create(reservation.new_order).await?;
        tracing::info!(
            order_number = ?result.order.order_number().map(|n| n.as_str()),
            total = %result.order.total_amount(),
            "order created"
        );
        Ok(result.order)
    }

    /// Decrements stock for every line of a stored order.
    ///
    /// Runs line by line and keeps going past failures; each failure is
    /// logged and counted so stock can be corrected by hand.
    #[tracing::instrument(skip(self, order), fields(order_id = ?order.id()))]
    pub async fn adjust_inventory(&self, order: &Order) -> InventoryReport {
        let mut report = InventoryReport::default();

        for item in order.items() {
            match self
                .inventory
                .adjust_quantity(&item.product_id, -i64::from(item.quantity))
                .await
            {
                Ok(record) => {
                    if !record.is_available_for_sale() {
                        tracing::info!(product_id = %item.product_id, "product sold out");
                    }
                    report.adjusted.push(record);
                }
                Err(err) => {
                    metrics::counter!("inventory_adjustment_failures_total").increment(1);
                    tracing::error!(
                        product_id = %item.product_id,
                        quantity = item.quantity,
                        error = %err,
                        "inventory decrement failed after order was stored"
                    );
                    report.failures.push((item.product_id.clone(), err.to_string()));
                }
            }
        }

        report
    }

    async fn record_stats(&self, adjustment: StatsAdjustment) {
        if let Err(err) = self.stats.apply_adjustment(&adjustment).await {
            tracing::warn!(
                user_id = %adjustment.user_id,
                order_id = %adjustment.order_id,
                error = %err,
                "failed to update user order stats"
            );
        }
    }
}

/// Folds repeated lines for the same product and weight into one line.
fn merge_lines(lines: Vec<CheckoutLine>) -> Result<Vec<CheckoutLine>> {
    let mut merged: Vec<CheckoutLine> = Vec::with_capacity(lines.len());

    for line in lines {
        if line.quantity == 0 {
            return Err(LifecycleError::InvalidLine {
                product_id: line.product_id.to_string(),
                reason: "quantity must be greater than 0".to_string(),
            });
        }

        match merged
            .iter_mut()
            .find(|m| m.product_id == line.product_id && m.weight == line.weight)
        {
            Some(existing) => {
                existing.quantity = existing.quantity.saturating_add(line.quantity);
            }
            None => merged.push(line),
        }
    }

    Ok(merged)
}

#[cfg(test)]
mod tests {
    use store::{InMemoryInventoryStore, InMemoryOrderStore, InMemoryUserStatsStore};

    use super::*;

    fn address() -> Address {
        Address {
            full_name: "Jo Park".to_string(),
            street: "44 Pine Ave".to_string(),
            apartment: Some("2B".to_string()),
            city: "Denver".to_string(),
            state: "CO".to_string(),
            zip_code: "80202".to_string(),
            country: "US".to_string(),
            phone: None,
        }
    }

    fn service() -> CheckoutService<InMemoryOrderStore, InMemoryInventoryStore, InMemoryUserStatsStore>
    {
        let inventory = InMemoryInventoryStore::with_records([
            InventoryRecord::new("SKU-MILK", "Whole Milk", Money::from_cents(349), 10)
                .with_category("dairy"),
            InventoryRecord::new("SKU-APPLE", "Gala Apples", Money::from_cents(199), 20)
                .with_category("produce"),
        ]);
        CheckoutService::new(
            InMemoryOrderStore::new(),
            inventory,
            InMemoryUserStatsStore::new(),
            &LifecycleConfig::default(),
        )
    }

    #[test]
    fn test_merge_lines_sums_duplicates() {
        let merged = merge_lines(vec![
            CheckoutLine::new("SKU-MILK", 1),
            CheckoutLine::new("SKU-APPLE", 2),
            CheckoutLine::new("SKU-MILK", 2),
        ])
        .unwrap();
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].quantity, 3);
    }

    #[test]
    fn test_merge_lines_keeps_distinct_weights_apart() {
        let merged = merge_lines(vec![
            CheckoutLine::weighted("SKU-APPLE", 1, Decimal::new(15, 1)),
            CheckoutLine::weighted("SKU-APPLE", 1, Decimal::new(20, 1)),
        ])
        .unwrap();
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_merge_lines_rejects_zero_quantity() {
        let result = merge_lines(vec![CheckoutLine::new("SKU-MILK", 0)]);
        assert!(matches!(result, Err(LifecycleError::InvalidLine { .. })));
    }

    #[tokio::test]
    async fn test_reserve_snapshots_prices() {
        let checkout = service();
        let request = CheckoutRequest::new(
            UserId::new(),
            vec![
                CheckoutLine::new("SKU-MILK", 2),
                CheckoutLine::weighted("SKU-APPLE", 2, Decimal::new(15, 1)),
            ],
            address(),
        )
        .with_tip(Money::from_cents(200));

        let reservation = checkout.reserve(request).await.unwrap();
        let new = &reservation.new_order;

        assert_eq!(new.items[0].unit_price.cents(), 349);
        assert_eq!(new.items[0].category.as_deref(), Some("dairy"));
        // 2 * $3.49 + $1.99 * 1.5 * 2
        assert_eq!(new.totals.subtotal.cents(), 698 + 597);
        assert_eq!(new.totals.tip_amount.cents(), 200);
        assert!(new.totals.is_balanced());
        assert!(new.order_number.as_str().starts_with("ORD-"));
    }

    #[tokio::test]
    async fn test_reserve_rejects_blank_address() {
        let checkout = service();
        let mut shipping = address();
        shipping.street = String::new();

        let result = checkout
            .reserve(CheckoutRequest::new(
                UserId::new(),
                vec![CheckoutLine::new("SKU-MILK", 1)],
                shipping,
            ))
            .await;
        assert!(matches!(
            result,
            Err(LifecycleError::InvalidAddress { field: "street" })
        ));
    }

    #[tokio::test]
    async fn test_reserve_counts_duplicate_lines_against_stock() {
        let checkout = service();
        let result = checkout
            .reserve(CheckoutRequest::new(
                UserId::new(),
                vec![
                    CheckoutLine::new("SKU-MILK", 6),
                    CheckoutLine::new("SKU-MILK", 5),
                ],
                address(),
            ))
            .await;
        assert!(matches!(
            result,
            Err(LifecycleError::OutOfStock {
                requested: 11,
                available: 10,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_reserve_unknown_product() {
        let checkout = service();
        let result = checkout
            .reserve(CheckoutRequest::new(
                UserId::new(),
                vec![CheckoutLine::new("SKU-GHOST", 1)],
                address(),
            ))
            .await;
        assert!(matches!(result, Err(LifecycleError::InvalidLine { .. })));
    }

    #[tokio::test]
    async fn test_reserve_rejects_discount_above_subtotal() {
        let checkout = service();
        let result = checkout
            .reserve(
                CheckoutRequest::new(
                    UserId::new(),
                    vec![CheckoutLine::new("SKU-MILK", 1)],
                    address(),
                )
                .with_discount(Money::from_cents(10_000)),
            )
            .await;
        assert!(matches!(
            result,
            Err(LifecycleError::InvalidAmount {
                field: "discount_amount",
                ..
            })
        ));
    }
}
