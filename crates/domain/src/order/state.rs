//! Fulfillment and payment state machines.
//!
//! The two axes are independent: an order can be `pending` for fulfillment
//! while its payment is `partial`, and a `cancelled` order can still carry a
//! `completed` payment that needs a manual refund.

use serde::{Deserialize, Serialize};

/// Fulfillment state of an order.
///
/// ```text
/// Pending ──► Confirmed ──► Processing ──► Shipped ──► Delivered
///    │            │
///    └────────────┴──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentStatus {
    /// Order placed, waiting for payment.
    #[default]
    Pending,

    /// Payment completed, order accepted for fulfillment.
    Confirmed,

    /// Order is being picked and packed.
    Processing,

    /// Order handed to the carrier.
    Shipped,

    /// Order received by the customer (terminal).
    Delivered,

    /// Order was cancelled (terminal).
    Cancelled,
}

impl FulfillmentStatus {
    /// Returns true if the allowed-transition table permits `self → next`.
    pub fn can_transition_to(&self, next: FulfillmentStatus) -> bool {
        use FulfillmentStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed)
                | (Pending, Cancelled)
                | (Confirmed, Processing)
                | (Confirmed, Cancelled)
                | (Processing, Shipped)
                | (Shipped, Delivered)
        )
    }

    /// Returns true if the order can still be cancelled.
    pub fn is_cancellable(&self) -> bool {
        self.can_transition_to(FulfillmentStatus::Cancelled)
    }

    /// Returns true if no further fulfillment transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FulfillmentStatus::Delivered | FulfillmentStatus::Cancelled
        )
    }

    /// Returns the persisted name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            FulfillmentStatus::Pending => "pending",
            FulfillmentStatus::Confirmed => "confirmed",
            FulfillmentStatus::Processing => "processing",
            FulfillmentStatus::Shipped => "shipped",
            FulfillmentStatus::Delivered => "delivered",
            FulfillmentStatus::Cancelled => "cancelled",
        }
    }

    /// Parses a persisted status name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(FulfillmentStatus::Pending),
            "confirmed" => Some(FulfillmentStatus::Confirmed),
            "processing" => Some(FulfillmentStatus::Processing),
            "shipped" => Some(FulfillmentStatus::Shipped),
            "delivered" => Some(FulfillmentStatus::Delivered),
            "cancelled" => Some(FulfillmentStatus::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for FulfillmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payment state of an order.
///
/// ```text
/// Pending ──┬──► Partial ──► Completed ──┬──► PartialRefund ──► Refunded
///           │                    ▲       └──────────────────────► Refunded
///           ├────────────────────┘
///           └──► Failed ──► Partial | Completed
/// ```
///
/// The normal capture path never moves a completed payment backwards; only
/// an explicit refund leaves `Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Nothing captured yet.
    #[default]
    Pending,

    /// Some money captured, a balance remains.
    Partial,

    /// Fully paid.
    Completed,

    /// The processor reported a failed or expired payment.
    Failed,

    /// Fully refunded by an admin (terminal).
    Refunded,

    /// Part of the captured amount was refunded.
    PartialRefund,
}

impl PaymentStatus {
    /// Returns true if the allowed-transition table permits `self → next`.
    ///
    /// `Partial → Partial` and `PartialRefund → PartialRefund` are allowed:
    /// another short payment or another partial refund keeps the status.
    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, next),
            (Pending, Partial)
                | (Pending, Completed)
                | (Pending, Failed)
                | (Partial, Partial)
                | (Partial, Completed)
                | (Failed, Partial)
                | (Failed, Completed)
                | (Completed, PartialRefund)
                | (Completed, Refunded)
                | (PartialRefund, PartialRefund)
                | (PartialRefund, Refunded)
        )
    }

    /// Returns true if a new capture may be applied in this state.
    pub fn accepts_capture(&self) -> bool {
        self.can_transition_to(PaymentStatus::Completed)
    }

    /// Returns true once the order has been paid in full at some point.
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Completed | PaymentStatus::PartialRefund | PaymentStatus::Refunded
        )
    }

    /// Returns the persisted name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Partial => "partial",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
            PaymentStatus::PartialRefund => "partial_refund",
        }
    }

    /// Parses a persisted status name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(PaymentStatus::Pending),
            "partial" => Some(PaymentStatus::Partial),
            "completed" => Some(PaymentStatus::Completed),
            "failed" => Some(PaymentStatus::Failed),
            "refunded" => Some(PaymentStatus::Refunded),
            "partial_refund" => Some(PaymentStatus::PartialRefund),
            _ => None,
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_FULFILLMENT: [FulfillmentStatus; 6] = [
        FulfillmentStatus::Pending,
        FulfillmentStatus::Confirmed,
        FulfillmentStatus::Processing,
        FulfillmentStatus::Shipped,
        FulfillmentStatus::Delivered,
        FulfillmentStatus::Cancelled,
    ];

    const ALL_PAYMENT: [PaymentStatus; 6] = [
        PaymentStatus::Pending,
        PaymentStatus::Partial,
        PaymentStatus::Completed,
        PaymentStatus::Failed,
        PaymentStatus::Refunded,
        PaymentStatus::PartialRefund,
    ];

    #[test]
    fn test_defaults_are_pending() {
        assert_eq!(FulfillmentStatus::default(), FulfillmentStatus::Pending);
        assert_eq!(PaymentStatus::default(), PaymentStatus::Pending);
    }

    #[test]
    fn test_fulfillment_happy_path() {
        assert!(FulfillmentStatus::Pending.can_transition_to(FulfillmentStatus::Confirmed));
        assert!(FulfillmentStatus::Confirmed.can_transition_to(FulfillmentStatus::Processing));
        assert!(FulfillmentStatus::Processing.can_transition_to(FulfillmentStatus::Shipped));
        assert!(FulfillmentStatus::Shipped.can_transition_to(FulfillmentStatus::Delivered));
    }

    #[test]
    fn test_cancellable_only_before_processing() {
        assert!(FulfillmentStatus::Pending.is_cancellable());
        assert!(FulfillmentStatus::Confirmed.is_cancellable());
        assert!(!FulfillmentStatus::Processing.is_cancellable());
        assert!(!FulfillmentStatus::Shipped.is_cancellable());
        assert!(!FulfillmentStatus::Delivered.is_cancellable());
        assert!(!FulfillmentStatus::Cancelled.is_cancellable());
    }

    #[test]
    fn test_fulfillment_never_skips_or_goes_back() {
        assert!(!FulfillmentStatus::Pending.can_transition_to(FulfillmentStatus::Shipped));
        assert!(!FulfillmentStatus::Shipped.can_transition_to(FulfillmentStatus::Pending));
        assert!(!FulfillmentStatus::Delivered.can_transition_to(FulfillmentStatus::Cancelled));
        for status in ALL_FULFILLMENT {
            assert!(!status.can_transition_to(status), "{status} self-loop");
        }
    }

    #[test]
    fn test_terminal_fulfillment_states() {
        for status in ALL_FULFILLMENT {
            let has_exit = ALL_FULFILLMENT.iter().any(|&n| status.can_transition_to(n));
            assert_eq!(status.is_terminal(), !has_exit, "{status}");
        }
    }

    #[test]
    fn test_completed_payment_never_regresses_through_capture() {
        assert!(!PaymentStatus::Completed.can_transition_to(PaymentStatus::Pending));
        assert!(!PaymentStatus::Completed.can_transition_to(PaymentStatus::Partial));
        assert!(!PaymentStatus::Completed.can_transition_to(PaymentStatus::Failed));
        assert!(!PaymentStatus::Completed.accepts_capture());
    }

    #[test]
    fn test_partial_cannot_fail() {
        assert!(!PaymentStatus::Partial.can_transition_to(PaymentStatus::Failed));
        assert!(PaymentStatus::Partial.can_transition_to(PaymentStatus::Completed));
    }

    #[test]
    fn test_failed_payment_can_be_retried() {
        assert!(PaymentStatus::Failed.accepts_capture());
        assert!(PaymentStatus::Failed.can_transition_to(PaymentStatus::Partial));
    }

    #[test]
    fn test_refunds_only_after_settlement() {
        assert!(PaymentStatus::Completed.can_transition_to(PaymentStatus::Refunded));
        assert!(PaymentStatus::Completed.can_transition_to(PaymentStatus::PartialRefund));
        assert!(PaymentStatus::PartialRefund.can_transition_to(PaymentStatus::Refunded));
        assert!(!PaymentStatus::Pending.can_transition_to(PaymentStatus::Refunded));
        assert!(!PaymentStatus::Partial.can_transition_to(PaymentStatus::PartialRefund));
        assert!(!PaymentStatus::Refunded.accepts_capture());
    }

    #[test]
    fn test_names_round_trip() {
        for status in ALL_FULFILLMENT {
            assert_eq!(FulfillmentStatus::parse(status.as_str()), Some(status));
        }
        for status in ALL_PAYMENT {
            assert_eq!(PaymentStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(PaymentStatus::parse("paid"), None);
    }

    #[test]
    fn test_serde_uses_snake_case() {
        let json = serde_json::to_string(&PaymentStatus::PartialRefund).unwrap();
        assert_eq!(json, "\"partial_refund\"");
        let status: FulfillmentStatus = serde_json::from_str("\"shipped\"").unwrap();
        assert_eq!(status, FulfillmentStatus::Shipped);
    }
}
