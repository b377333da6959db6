//! Processor webhook events.

use std::collections::HashMap;

use common::OrderId;
use serde::{Deserialize, Serialize};

/// Session metadata key carrying the order id.
pub const METADATA_ORDER_ID: &str = "order_id";
pub const METADATA_ORDER_NUMBER: &str = "order_number";
pub const METADATA_USER_ID: &str = "user_id";
/// `"true"` when the session tops up an earlier partial payment.
pub const METADATA_REMAINING_PAYMENT: &str = "remaining_payment";

/// What a webhook reports, as far as reconciliation cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookKind {
    /// The customer paid for the session.
    SessionCompleted,
    /// The session timed out unpaid.
    SessionExpired,
    /// A delayed payment method failed.
    PaymentFailed,
    /// Anything else the processor sends.
    Unhandled,
}

impl WebhookKind {
    pub fn parse(event_type: &str) -> Self {
        match event_type {
            "checkout.session.completed" | "checkout.session.async_payment_succeeded" => {
                WebhookKind::SessionCompleted
            }
            "checkout.session.expired" => WebhookKind::SessionExpired,
            "checkout.session.async_payment_failed" | "payment_intent.payment_failed" => {
                WebhookKind::PaymentFailed
            }
            _ => WebhookKind::Unhandled,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookKind::SessionCompleted => "session_completed",
            WebhookKind::SessionExpired => "session_expired",
            WebhookKind::PaymentFailed => "payment_failed",
            WebhookKind::Unhandled => "unhandled",
        }
    }
}

/// A verified webhook delivered by the processor.
///
/// The processor retries on timeout and does not preserve ordering, so the
/// same event may arrive more than once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub payment_intent_id: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl WebhookEvent {
    pub fn new(id: impl Into<String>, event_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            event_type: event_type.into(),
            session_id: None,
            payment_intent_id: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_payment_intent(mut self, payment_intent_id: impl Into<String>) -> Self {
        self.payment_intent_id = Some(payment_intent_id.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn kind(&self) -> WebhookKind {
        WebhookKind::parse(&self.event_type)
    }

    /// Returns the order id embedded at session creation, if readable.
    pub fn order_id(&self) -> Option<OrderId> {
        self.metadata
            .get(METADATA_ORDER_ID)
            .and_then(|id| OrderId::parse(id))
    }

    pub fn is_remaining_payment(&self) -> bool {
        self.metadata
            .get(METADATA_REMAINING_PAYMENT)
            .is_some_and(|flag| flag == "true")
    }

    /// Human-readable reason recorded on a failed payment.
    pub fn failure_reason(&self) -> String {
        match self.kind() {
            WebhookKind::SessionExpired => "Checkout session expired".to_string(),
            _ => format!("Processor reported {}", self.event_type),
        }
    }

    /// Best identifier for log lines and not-found errors.
    pub fn reference(&self) -> String {
        self.metadata
            .get(METADATA_ORDER_ID)
            .or(self.session_id.as_ref())
            .cloned()
            .unwrap_or_else(|| self.id.clone())
    }
}

/// How reconciliation disposed of a webhook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookAck {
    /// The order changed.
    Applied { order_id: OrderId },
    /// The order already reflected this outcome; nothing changed.
    Duplicate { order_id: OrderId },
    /// Acknowledged without touching any order.
    Ignored { reason: String },
}

impl WebhookAck {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookAck::Applied { .. } => "applied",
            WebhookAck::Duplicate { .. } => "duplicate",
            WebhookAck::Ignored { .. } => "ignored",
        }
    }
}
