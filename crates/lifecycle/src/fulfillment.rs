//! Fulfillment progress and cancellation.

use common::{OrderId, ProductId};
use domain::{Actor, Aggregate, FulfillmentStatus, InventoryRecord, Order, StatsAdjustment};
use store::{InventoryStore, OrderStore, UserStatsStore};

use crate::error::Result;
use crate::handler::{CommandResult, OrderCommandHandler};

/// Outcome of a cancellation.
#[derive(Debug)]
pub struct Cancellation {
    pub order: Order,
    /// Records after their stock was put back.
    pub restocked: Vec<InventoryRecord>,
    /// Lines that could not be restocked, with the error text.
    pub restock_failures: Vec<(ProductId, String)>,
    /// True if the user's counters were reversed by this call.
    pub stats_reversed: bool,
}

/// Moves orders along the fulfillment axis.
pub struct FulfillmentService<O, I, U>
where
    O: OrderStore,
    I: InventoryStore,
    U: UserStatsStore,
{
    handler: OrderCommandHandler<O>,
    inventory: I,
    stats: U,
}

impl<O, I, U> FulfillmentService<O, I, U>
where
    O: OrderStore,
    I: InventoryStore,
    U: UserStatsStore,
{
    pub fn new(orders: O, inventory: I, stats: U) -> Self {
        Self {
            handler: OrderCommandHandler::new(orders),
            inventory,
            stats,
        }
    }

    /// Advances a paid order to `processing`, `shipped` or `delivered`.
    ///
    /// `confirmed` is only reached through a completed payment and
    /// `cancelled` only through [`FulfillmentService::cancel`].
    #[tracing::instrument(skip(self))]
    pub async fn advance(
        &self,
        order_id: OrderId,
        to: FulfillmentStatus,
        note: Option<String>,
        tracking_number: Option<String>,
        actor: Actor,
    ) -> Result<CommandResult> {
        let result = self
            .handler
            .execute(order_id, |o| o.advance(to, note, tracking_number, actor))
            .await?;
        tracing::info!(status = %result.order.status(), "fulfillment advanced");
        Ok(result)
    }

    /// Cancels a `pending` or `confirmed` order.
    ///
    /// The cancellation is stored first. Each line's stock is then put back
    /// (and the product forced available for sale) and the user's counters
    /// reversed. Failures in those follow-ups are logged and reported; the
    /// order stays cancelled. Money already captured is not refunded here.
    #[tracing::instrument(skip(self))]
    pub async fn cancel(
        &self,
        order_id: OrderId,
        reason: String,
        actor: Actor,
    ) -> Result<Cancellation> {
        let result = self
            .handler
            .execute(order_id, |o| o.cancel(reason, actor))
            .await?;
        let order = result.order;

        metrics::counter!("orders_cancelled_total").increment(1);
        tracing::info!(payment_status = %order.payment_status(), "order cancelled");

        let mut restocked = Vec::with_capacity(order.items().len());
        let mut restock_failures = Vec::new();
        for item in order.items() {
            match self.inventory.restock(&item.product_id, item.quantity).await {
                Ok(record) => restocked.push(record),
                Err(err) => {
                    metrics::counter!("inventory_adjustment_failures_total").increment(1);
                    tracing::error!(
                        product_id = %item.product_id,
                        quantity = item.quantity,
                        error = %err,
                        "restock failed after cancellation"
                    );
                    restock_failures.push((item.product_id.clone(), err.to_string()));
                }
            }
        }

        let stats_reversed = match (order.id(), order.user_id()) {
            (Some(order_id), Some(user_id)) => {
                let adjustment = StatsAdjustment::reversed(user_id, order_id, order.total_amount());
                match self.stats.apply_adjustment(&adjustment).await {
                    Ok(changed) => changed,
                    Err(err) => {
                        tracing::warn!(%user_id, error = %err, "failed to reverse user order stats");
                        false
                    }
                }
            }
            _ => false,
        };

        Ok(Cancellation {
            order,
            restocked,
            restock_failures,
            stats_reversed,
        })
    }
}
