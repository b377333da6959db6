//! Payment reconciliation.
//!
//! The reconciler is the only component that writes payment state. Adapter
//! outcomes, processor webhooks and admin payment operations all pass
//! through it, and it alone moves an order to `confirmed` by way of a
//! completed payment.

use common::OrderId;
use domain::{Actor, Aggregate, Money, Order, PaymentMethod};
use store::OrderStore;

use crate::error::{LifecycleError, Result};
use crate::handler::{CommandResult, OrderCommandHandler};
use crate::payment::{PaymentOutcome, WebhookAck, WebhookEvent, WebhookKind};

/// Applies payment outcomes to orders.
#[derive(Clone)]
pub struct Reconciler<S: OrderStore> {
    handler: OrderCommandHandler<S>,
}

impl<S: OrderStore> Reconciler<S> {
    pub fn new(store: S) -> Self {
        Self {
            handler: OrderCommandHandler::new(store),
        }
    }

    pub fn handler(&self) -> &OrderCommandHandler<S> {
        &self.handler
    }

    /// Applies an adapter outcome to the order it was computed against.
    ///
    /// A deferred outcome records the checkout session; a settled one
    /// records the capture, partial or full.
    pub async fn apply_outcome(
        &self,
        order: Order,
        outcome: &PaymentOutcome,
        actor: Actor,
    ) -> Result<CommandResult> {
        let outcome = outcome.clone();
        self.handler
            .execute_on(order, move |o| match outcome.session {
                Some(session) => {
                    o.open_checkout_session(session.id, session.amount, session.remaining_payment)
                }
                None => o.receive_payment(
                    outcome.rail,
                    outcome.settled_amount,
                    outcome.external_reference,
                    outcome.cards,
                    actor,
                ),
            })
            .await
    }

    /// Reconciles one processor webhook.
    ///
    /// Replays of a completion are acknowledged as `Duplicate` without
    /// touching the order. The settled check runs before the write, and the
    /// write itself is conditional on the loaded version, so two deliveries
    /// racing each other cannot both apply.
    #[tracing::instrument(skip(self, event), fields(event_id = %event.id, kind = event.kind().as_str()))]
    pub async fn handle_webhook(&self, event: &WebhookEvent) -> Result<WebhookAck> {
        let kind = event.kind();
        let result = match kind {
            WebhookKind::SessionCompleted => self.settle(event).await,
            WebhookKind::SessionExpired | WebhookKind::PaymentFailed => self.fail(event).await,
            WebhookKind::Unhandled => Ok(WebhookAck::Ignored {
                reason: format!("unhandled event type {}", event.event_type),
            }),
        };

        let outcome = match &result {
            Ok(ack) => ack.as_str(),
            Err(_) => "error",
        };
        metrics::counter!("webhook_events_total", "kind" => kind.as_str(), "outcome" => outcome)
            .increment(1);

        if let Err(err) = &result {
            tracing::error!(error = %err, reference = %event.reference(), "webhook left for manual reconciliation");
        }

        result
    }

    async fn locate(&self, event: &WebhookEvent) -> Result<Order> {
        let store = self.handler.store();

        if let Some(order_id) = event.order_id()
            && let Some(order) = store.get(order_id).await?
        {
            return Ok(order);
        }

        if let Some(session_id) = event.session_id.as_deref()
            && let Some(order) = store.find_by_checkout_session(session_id).await?
        {
            return Ok(order);
        }

        Err(LifecycleError::OrderNotFound(event.reference()))
    }

    async fn settle(&self, event: &WebhookEvent) -> Result<WebhookAck> {
        let order = self.locate(event).await?;
        let order_id = placed_id(&order)?;

        if order.payment_status().is_settled() {
            tracing::info!(%order_id, "payment already settled, acknowledging replay");
            return Ok(WebhookAck::Duplicate { order_id });
        }

        let session_id = event.session_id.clone();
        let payment_intent_id = event.payment_intent_id.clone();
        let remaining_payment = event.is_remaining_payment();

        let result = self
            .handler
            .execute_on(order, |o| {
                o.settle_in_full(
                    PaymentMethod::ProcessorCard,
                    session_id,
                    payment_intent_id,
                    remaining_payment,
                    Actor::Processor,
                )
            })
            .await;

        match result {
            Ok(result) if result.is_noop() => Ok(WebhookAck::Duplicate { order_id }),
            Ok(result) => {
                if result.order.refund_required() {
                    tracing::warn!(%order_id, "payment settled on a cancelled order, refund required");
                } else {
                    tracing::info!(%order_id, status = %result.order.status(), "payment settled");
                }
                Ok(WebhookAck::Applied { order_id })
            }
            Err(LifecycleError::ConcurrencyConflict { .. }) => {
                let current = self.handler.load(order_id).await?;
                if current.payment_status().is_settled() {
                    tracing::info!(%order_id, "concurrent delivery already settled the payment");
                    Ok(WebhookAck::Duplicate { order_id })
                } else {
                    Err(LifecycleError::ConcurrencyConflict { order_id })
                }
            }
            Err(err) => Err(err),
        }
    }

    /// Marks a pending payment failed. The order is neither cancelled nor
    /// restocked; abandoned sessions are followed up by staff.
    async fn fail(&self, event: &WebhookEvent) -> Result<WebhookAck> {
        let order = self.locate(event).await?;
        let order_id = placed_id(&order)?;
        let status = order.payment_status();
        let reason = event.failure_reason();

        let result = self
            .handler
            .execute_on(order, |o| o.fail_payment(reason, Actor::Processor))
            .await?;

        if result.is_noop() {
            tracing::info!(%order_id, payment_status = %status, "failure ignored, payment is not pending");
            return Ok(WebhookAck::Ignored {
                reason: format!("payment is {status}"),
            });
        }

        tracing::info!(%order_id, "payment marked failed");
        Ok(WebhookAck::Applied { order_id })
    }

    /// Records an admin request for an additional payment. Advisory only.
    #[tracing::instrument(skip(self))]
    pub async fn request_payment(
        &self,
        order_id: OrderId,
        amount: Money,
        actor: Actor,
    ) -> Result<CommandResult> {
        let result = self
            .handler
            .execute(order_id, |o| o.request_payment(amount, actor))
            .await?;
        tracing::info!(%amount, "payment requested");
        Ok(result)
    }

    /// Withdraws an outstanding payment request.
    #[tracing::instrument(skip(self))]
    pub async fn clear_payment_request(
        &self,
        order_id: OrderId,
        actor: Actor,
    ) -> Result<CommandResult> {
        self.handler
            .execute(order_id, |o| o.clear_payment_request(actor))
            .await
    }

    /// Refunds part or all of the captured amount.
    ///
    /// Only records the refund; moving the money back is done on the rail.
    #[tracing::instrument(skip(self))]
    pub async fn refund(
        &self,
        order_id: OrderId,
        amount: Money,
        reason: String,
        actor: Actor,
    ) -> Result<CommandResult> {
        let result = self
            .handler
            .execute(order_id, |o| o.refund(amount, reason, actor))
            .await?;
        tracing::info!(%amount, payment_status = %result.order.payment_status(), "refund recorded");
        Ok(result)
    }
}

fn placed_id(order: &Order) -> Result<OrderId> {
    order
        .id()
        .ok_or_else(|| LifecycleError::OrderNotFound("unplaced order".to_string()))
}
