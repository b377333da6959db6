//! Payment capture adapters.
//!
//! Every rail implements [`PaymentAdapter`]: it inspects the order and the
//! request and reports a [`PaymentOutcome`]. Adapters never write to the
//! order; the [`Reconciler`](crate::Reconciler) applies their outcomes.
//!
//! - [`ProcessorAdapter`] opens a hosted checkout session. Settlement
//!   arrives later as a webhook.
//! - [`OfflineCardAdapter`] settles a batch of manually keyed OTC or EBT
//!   cards synchronously, fully or partially.

pub mod offline;
pub mod processor;
pub mod service;
pub mod webhook;

use async_trait::async_trait;
use domain::{CardSummary, Money, Order, PaymentMethod};

use crate::error::{LifecycleError, Result};

pub use offline::{OfflineCardAdapter, OfflineCardEntry};
pub use processor::ProcessorAdapter;
pub use service::{CaptureResult, PaymentService};
pub use webhook::{WebhookAck, WebhookEvent, WebhookKind};

/// A request to collect money for an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRequest {
    pub rail: PaymentMethod,
    /// Amount for a hosted session; defaults to the outstanding balance.
    pub custom_amount: Option<Money>,
    /// Marks a hosted session as the top-up of an earlier partial payment.
    pub remaining_payment: bool,
    /// Card batch for the offline rails.
    pub cards: Vec<OfflineCardEntry>,
}

impl CaptureRequest {
    /// Hosted checkout for the outstanding balance.
    pub fn checkout() -> Self {
        Self {
            rail: PaymentMethod::ProcessorCard,
            custom_amount: None,
            remaining_payment: false,
            cards: Vec::new(),
        }
    }

    /// Hosted checkout for a specific amount, settling the rest of a partial payment.
    pub fn top_up(amount: Money) -> Self {
        Self {
            custom_amount: Some(amount),
            remaining_payment: true,
            ..Self::checkout()
        }
    }

    /// Manually keyed card batch on an offline rail.
    pub fn card_batch(rail: PaymentMethod, cards: Vec<OfflineCardEntry>) -> Self {
        Self {
            rail,
            custom_amount: None,
            remaining_payment: false,
            cards,
        }
    }
}

/// A hosted checkout session opened for an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
    pub amount: Money,
    pub remaining_payment: bool,
}

/// What an adapter collected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentOutcome {
    pub rail: PaymentMethod,
    /// Money captured now. Zero when settlement is deferred to a webhook.
    pub settled_amount: Money,
    /// True if `settled_amount` covers the outstanding balance.
    pub is_full_settlement: bool,
    pub external_reference: Option<String>,
    /// Masked cards of an offline batch.
    pub cards: Vec<CardSummary>,
    /// Set when the customer still has to pay on the processor's page.
    pub session: Option<CheckoutSession>,
}

impl PaymentOutcome {
    /// Returns `full`, `partial` or `deferred`, used as a metrics label.
    pub fn settlement(&self) -> &'static str {
        if self.session.is_some() {
            "deferred"
        } else if self.is_full_settlement {
            "full"
        } else {
            "partial"
        }
    }
}

/// A strategy for collecting money on one rail.
#[async_trait]
pub trait PaymentAdapter: Send + Sync {
    /// The rail this adapter serves.
    fn rail(&self) -> PaymentMethod;

    /// Collects payment for `order`, or fails with `PaymentRejected`.
    async fn capture(&self, order: &Order, request: &CaptureRequest) -> Result<PaymentOutcome>;
}

/// Refuses captures for cancelled or already settled orders.
pub(crate) fn ensure_capturable(order: &Order) -> Result<()> {
    if !order.is_placed() {
        return Err(LifecycleError::OrderNotFound("unplaced order".to_string()));
    }
    if order.status() == domain::FulfillmentStatus::Cancelled {
        return Err(LifecycleError::PaymentRejected {
            reason: "order is cancelled".to_string(),
        });
    }
    if !order.payment_status().accepts_capture() {
        return Err(LifecycleError::PaymentRejected {
            reason: format!("payment is already {}", order.payment_status()),
        });
    }
    Ok(())
}
