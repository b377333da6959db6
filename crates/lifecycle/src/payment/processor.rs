//! Hosted checkout through the payment processor.

use std::collections::HashMap;

use async_trait::async_trait;
use domain::{Aggregate, Money, Order, PaymentMethod, PaymentStatus};

use super::webhook::{
    METADATA_ORDER_ID, METADATA_ORDER_NUMBER, METADATA_REMAINING_PAYMENT, METADATA_USER_ID,
};
use super::{CaptureRequest, CheckoutSession, PaymentAdapter, PaymentOutcome, ensure_capturable};
use crate::config::LifecycleConfig;
use crate::error::{LifecycleError, Result};
use crate::services::{PaymentProcessor, SessionRequest};

/// Opens processor checkout sessions. Never settles by itself.
///
/// The order's identity goes into the session metadata so the completion
/// webhook can be matched back to the order.
#[derive(Debug, Clone)]
pub struct ProcessorAdapter<P: PaymentProcessor> {
    processor: P,
    currency: String,
    success_url: String,
    cancel_url: String,
}

impl<P: PaymentProcessor> ProcessorAdapter<P> {
    pub fn new(processor: P, config: &LifecycleConfig) -> Self {
        Self {
            processor,
            currency: config.currency.clone(),
            success_url: config.checkout_success_url.clone(),
            cancel_url: config.checkout_cancel_url.clone(),
        }
    }
}

#[async_trait]
impl<P: PaymentProcessor> PaymentAdapter for ProcessorAdapter<P> {
    fn rail(&self) -> PaymentMethod {
        PaymentMethod::ProcessorCard
    }

    #[tracing::instrument(skip(self, order, request), fields(order_id = ?order.id()))]
    async fn capture(&self, order: &Order, request: &CaptureRequest) -> Result<PaymentOutcome> {
        ensure_capturable(order)?;

        let (Some(order_id), Some(order_number), Some(user_id)) =
            (order.id(), order.order_number(), order.user_id())
        else {
            return Err(LifecycleError::OrderNotFound("unplaced order".to_string()));
        };

        let amount = request
            .custom_amount
            .unwrap_or_else(|| order.outstanding_balance());
        if !amount.is_positive() {
            return Err(LifecycleError::InvalidAmount {
                field: "session_amount",
                reason: format!("{amount} must be greater than zero"),
            });
        }

        let remaining_payment =
            request.remaining_payment || order.payment_status() == PaymentStatus::Partial;

        let metadata = HashMap::from([
            (METADATA_ORDER_ID.to_string(), order_id.to_string()),
            (METADATA_ORDER_NUMBER.to_string(), order_number.to_string()),
            (METADATA_USER_ID.to_string(), user_id.to_string()),
            (
                METADATA_REMAINING_PAYMENT.to_string(),
                remaining_payment.to_string(),
            ),
        ]);

        let description = if remaining_payment {
            format!("Remaining payment for order {order_number}")
        } else {
            format!("Order {order_number}")
        };

        let session = self
            .processor
            .create_session(SessionRequest {
                amount,
                currency: self.currency.clone(),
                description,
                success_url: self.success_url.clone(),
                cancel_url: self.cancel_url.clone(),
                metadata,
            })
            .await
            .map_err(|err| LifecycleError::PaymentRejected {
                reason: err.to_string(),
            })?;

        tracing::info!(
            session_id = %session.id,
            %amount,
            remaining_payment,
            "checkout session opened"
        );

        Ok(PaymentOutcome {
            rail: PaymentMethod::ProcessorCard,
            settled_amount: Money::zero(),
            is_full_settlement: false,
            external_reference: Some(session.id.clone()),
            cards: Vec::new(),
            session: Some(CheckoutSession {
                id: session.id,
                url: session.url,
                amount,
                remaining_payment,
            }),
        })
    }
}
