//! Order aggregate and related types.

mod aggregate;
mod events;
mod history;
mod payment;
mod pricing;
mod state;
mod value_objects;

pub use aggregate::{NewOrder, Order};
pub use events::{
    CheckoutSessionOpenedData, FulfillmentAdvancedData, OrderCancelledData, OrderEvent,
    OrderPlacedData, PaymentCompletedData, PaymentFailedData, PaymentReceivedData,
    PaymentRefundedData, PaymentRequestClearedData, PaymentRequestedData,
};
pub use history::{Actor, StatusHistoryEntry};
pub use payment::{CardSummary, PaymentRecord, PaymentState};
pub use pricing::{OrderTotals, PricingPolicy};
pub use state::{FulfillmentStatus, PaymentStatus};
pub use value_objects::{Address, LineItem, Money, PaymentMethod, issue_order_number};

use rust_decimal::Decimal;
use thiserror::Error;

/// Errors that can occur during order operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OrderError {
    /// Order has already been placed.
    #[error("Order already placed")]
    AlreadyPlaced,

    /// Command needs a placed order.
    #[error("Order has not been placed")]
    NotPlaced,

    /// Order has no items.
    #[error("Order has no items")]
    NoItems,

    /// Stored totals do not add up.
    #[error("Totals mismatch: expected {expected}, got {actual}")]
    TotalsMismatch { expected: Money, actual: Money },

    /// Fulfillment transition not in the allowed table.
    #[error("Invalid fulfillment transition from {from} to {to}")]
    InvalidTransition {
        from: FulfillmentStatus,
        to: FulfillmentStatus,
    },

    /// Payment transition not in the allowed table.
    #[error("Invalid payment transition from {from} to {to}")]
    InvalidPaymentTransition {
        from: PaymentStatus,
        to: PaymentStatus,
    },

    /// Payment is not accepting captures in its current state.
    #[error("Payment is {status} and does not accept further captures")]
    PaymentNotAccepted { status: PaymentStatus },

    /// Order has been cancelled.
    #[error("Order is cancelled")]
    OrderCancelled,

    /// Confirmation only happens through a completed payment.
    #[error("Order can only be confirmed by a completed payment")]
    ConfirmationRequiresPayment,

    /// Amount outside its allowed range.
    #[error("Invalid {field}: {amount}")]
    InvalidAmount { field: &'static str, amount: Money },

    /// Quantity of zero.
    #[error("Invalid quantity for {product_id}: {quantity} (must be greater than 0)")]
    InvalidQuantity { product_id: String, quantity: u32 },

    /// Non-positive weight on a weighted line.
    #[error("Invalid weight for {product_id}: {weight} (must be greater than 0)")]
    InvalidWeight { product_id: String, weight: Decimal },

    /// Arithmetic overflowed the cents range.
    #[error("Amount out of range")]
    AmountOutOfRange,
}
