//! Order domain events.

use chrono::{DateTime, Utc};
use common::{OrderId, OrderNumber, UserId};
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;

use super::{
    Actor, Address, CardSummary, FulfillmentStatus, LineItem, Money, OrderTotals, PaymentMethod,
};

/// Events that can occur on an order aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    /// Order was committed by checkout.
    OrderPlaced(OrderPlacedData),

    /// A hosted processor checkout session was opened.
    CheckoutSessionOpened(CheckoutSessionOpenedData),

    /// A capture left a balance outstanding.
    PaymentReceived(PaymentReceivedData),

    /// A capture settled the order in full.
    PaymentCompleted(PaymentCompletedData),

    /// The processor reported a failed or expired payment.
    PaymentFailed(PaymentFailedData),

    /// An admin requested an additional payment.
    PaymentRequested(PaymentRequestedData),

    /// An admin withdrew the payment request.
    PaymentRequestCleared(PaymentRequestClearedData),

    /// Fulfillment moved forward.
    FulfillmentAdvanced(FulfillmentAdvancedData),

    /// Order was cancelled.
    OrderCancelled(OrderCancelledData),

    /// Money was returned to the customer.
    PaymentRefunded(PaymentRefundedData),
}

impl DomainEvent for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderPlaced(_) => "OrderPlaced",
            OrderEvent::CheckoutSessionOpened(_) => "CheckoutSessionOpened",
            OrderEvent::PaymentReceived(_) => "PaymentReceived",
            OrderEvent::PaymentCompleted(_) => "PaymentCompleted",
            OrderEvent::PaymentFailed(_) => "PaymentFailed",
            OrderEvent::PaymentRequested(_) => "PaymentRequested",
            OrderEvent::PaymentRequestCleared(_) => "PaymentRequestCleared",
            OrderEvent::FulfillmentAdvanced(_) => "FulfillmentAdvanced",
            OrderEvent::OrderCancelled(_) => "OrderCancelled",
            OrderEvent::PaymentRefunded(_) => "PaymentRefunded",
        }
    }
}

/// Data for OrderPlaced event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderPlacedData {
    pub order_id: OrderId,
    pub order_number: OrderNumber,
    pub user_id: UserId,
    pub items: Vec<LineItem>,
    pub totals: OrderTotals,
    pub shipping_address: Address,
    pub billing_address: Address,
    pub payment_method: PaymentMethod,
    pub notes: Option<String>,
    pub actor: Actor,
    pub placed_at: DateTime<Utc>,
}

/// Data for CheckoutSessionOpened event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutSessionOpenedData {
    pub session_id: String,

    /// Amount the session will charge.
    pub amount: Money,

    /// True when the session pays off a partial balance.
    pub is_remaining_payment: bool,

    pub opened_at: DateTime<Utc>,
}

/// Data for PaymentReceived event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentReceivedData {
    pub rail: PaymentMethod,

    /// Amount captured by this payment.
    pub amount: Money,

    pub reference: Option<String>,

    #[serde(default)]
    pub cards: Vec<CardSummary>,

    /// Balance left after this payment.
    pub remaining_amount: Money,

    pub actor: Actor,
    pub received_at: DateTime<Utc>,
}

/// Data for PaymentCompleted event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentCompletedData {
    pub rail: PaymentMethod,

    /// Amount captured by this payment.
    pub amount: Money,

    pub reference: Option<String>,
    pub payment_intent_id: Option<String>,

    #[serde(default)]
    pub cards: Vec<CardSummary>,

    /// True when the payment settled a partial balance.
    pub was_remaining_payment: bool,

    pub actor: Actor,
    pub completed_at: DateTime<Utc>,
}

/// Data for PaymentFailed event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentFailedData {
    pub reason: String,
    pub actor: Actor,
    pub failed_at: DateTime<Utc>,
}

/// Data for PaymentRequested event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRequestedData {
    pub amount: Money,
    pub actor: Actor,
    pub requested_at: DateTime<Utc>,
}

/// Data for PaymentRequestCleared event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRequestClearedData {
    pub actor: Actor,
    pub cleared_at: DateTime<Utc>,
}

/// Data for FulfillmentAdvanced event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FulfillmentAdvancedData {
    pub to: FulfillmentStatus,
    pub note: Option<String>,

    /// Carrier tracking number, set when the order ships.
    pub tracking_number: Option<String>,

    pub actor: Actor,
    pub advanced_at: DateTime<Utc>,
}

/// Data for OrderCancelled event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCancelledData {
    pub reason: String,
    pub actor: Actor,
    pub cancelled_at: DateTime<Utc>,
}

/// Data for PaymentRefunded event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRefundedData {
    pub amount: Money,

    /// True when the refund brings the refunded total up to the amount paid.
    pub fully_refunded: bool,

    pub reason: String,
    pub actor: Actor,
    pub refunded_at: DateTime<Utc>,
}

// Convenience constructors for events
impl OrderEvent {
    /// Creates a CheckoutSessionOpened event.
    pub fn checkout_session_opened(
        session_id: impl Into<String>,
        amount: Money,
        is_remaining_payment: bool,
    ) -> Self {
        OrderEvent::CheckoutSessionOpened(CheckoutSessionOpenedData {
            session_id: session_id.into(),
            amount,
            is_remaining_payment,
            opened_at: Utc::now(),
        })
    }

    /// Creates a PaymentFailed event.
    pub fn payment_failed(reason: impl Into<String>, actor: Actor) -> Self {
        OrderEvent::PaymentFailed(PaymentFailedData {
            reason: reason.into(),
            actor,
            failed_at: Utc::now(),
        })
    }

    /// Creates a PaymentRequested event.
    pub fn payment_requested(amount: Money, actor: Actor) -> Self {
        OrderEvent::PaymentRequested(PaymentRequestedData {
            amount,
            actor,
            requested_at: Utc::now(),
        })
    }

    /// Creates a PaymentRequestCleared event.
    pub fn payment_request_cleared(actor: Actor) -> Self {
        OrderEvent::PaymentRequestCleared(PaymentRequestClearedData {
            actor,
            cleared_at: Utc::now(),
        })
    }

    /// Creates a FulfillmentAdvanced event.
    pub fn fulfillment_advanced(
        to: FulfillmentStatus,
        note: Option<String>,
        tracking_number: Option<String>,
        actor: Actor,
    ) -> Self {
        OrderEvent::FulfillmentAdvanced(FulfillmentAdvancedData {
            to,
            note,
            tracking_number,
            actor,
            advanced_at: Utc::now(),
        })
    }

    /// Creates an OrderCancelled event.
    pub fn order_cancelled(reason: impl Into<String>, actor: Actor) -> Self {
        OrderEvent::OrderCancelled(OrderCancelledData {
            reason: reason.into(),
            actor,
            cancelled_at: Utc::now(),
        })
    }

    /// Creates a PaymentRefunded event.
    pub fn payment_refunded(
        amount: Money,
        fully_refunded: bool,
        reason: impl Into<String>,
        actor: Actor,
    ) -> Self {
        OrderEvent::PaymentRefunded(PaymentRefundedData {
            amount,
            fully_refunded,
            reason: reason.into(),
            actor,
            refunded_at: Utc::now(),
        })
    }
}
