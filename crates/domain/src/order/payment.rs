//! Payment fields of an order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Money, PaymentMethod, PaymentStatus};

/// Masked record of one manually keyed card in an offline batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardSummary {
    pub holder_name: String,
    /// Last four digits, e.g. `****4242`, or `N/A` when nothing was keyed.
    pub masked_number: String,
    pub pin_provided: bool,
    pub amount: Money,
}

/// One capture applied to an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub rail: PaymentMethod,
    pub amount: Money,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub cards: Vec<CardSummary>,
    pub recorded_at: DateTime<Utc>,
}

/// Payment state carried by an order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentState {
    /// Rail the customer chose at checkout.
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    /// Sum of all captures applied so far.
    pub amount_paid: Money,
    /// Amount collected while the order was short of its total.
    pub partial_payment_amount: Money,
    /// Balance still owed after a partial payment.
    pub remaining_amount: Money,
    /// Admin-initiated top-up request; advisory only.
    pub requested_payment_amount: Option<Money>,
    pub requested_payment_at: Option<DateTime<Utc>>,
    /// Most recent hosted checkout session.
    pub checkout_session_id: Option<String>,
    /// Amount that session charges.
    #[serde(default)]
    pub checkout_session_amount: Option<Money>,
    pub payment_intent_id: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub refunded_amount: Money,
    #[serde(default)]
    pub records: Vec<PaymentRecord>,
}
