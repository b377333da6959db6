//! Realtime new-order notifications.

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use common::{OrderId, OrderNumber, UserId};
use domain::{Aggregate, Money, Order, PaymentMethod};
use serde::Serialize;

use crate::error::{LifecycleError, Result};

/// What the admin dashboard is told about a new order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderSummary {
    pub order_id: OrderId,
    pub order_number: OrderNumber,
    pub user_id: UserId,
    pub total_amount: Money,
    pub item_count: usize,
    pub payment_method: PaymentMethod,
}

impl OrderSummary {
    /// Summarizes a placed order. Returns None for an unplaced one.
    pub fn of(order: &Order) -> Option<Self> {
        Some(Self {
            order_id: order.id()?,
            order_number: order.order_number()?.clone(),
            user_id: order.user_id()?,
            total_amount: order.total_amount(),
            item_count: order.items().len(),
            payment_method: order.payment_method(),
        })
    }
}

/// Fire-and-forget push channel. Checkout logs and ignores failures.
#[async_trait]
pub trait OrderNotifier: Send + Sync {
    async fn notify_new_order(&self, summary: &OrderSummary) -> Result<()>;
}

#[derive(Debug, Default)]
struct InMemoryNotifierState {
    sent: Vec<OrderSummary>,
    fail_on_notify: bool,
}

/// In-memory notifier for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotifier {
    state: Arc<RwLock<InMemoryNotifierState>>,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_on_notify(&self, fail: bool) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .fail_on_notify = fail;
    }

    /// Returns every summary delivered so far.
    pub fn sent(&self) -> Vec<OrderSummary> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .sent
            .clone()
    }
}

#[async_trait]
impl OrderNotifier for InMemoryNotifier {
    async fn notify_new_order(&self, summary: &OrderSummary) -> Result<()> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);

        if state.fail_on_notify {
            return Err(LifecycleError::collaborator("notifier", "channel closed"));
        }

        state.sent.push(summary.clone());
        Ok(())
    }
}
