//! Lifecycle error types.

use common::{OrderId, ProductId};
use domain::OrderError;
use store::StoreError;
use thiserror::Error;

/// Errors surfaced by the lifecycle services.
///
/// Nothing here is retried automatically; every failure goes back to the
/// caller or into the logs for manual reconciliation.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Not enough stock, or the product is not for sale.
    #[error("Out of stock: {product_id} (requested {requested}, available {available})")]
    OutOfStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    /// A required shipping field is blank.
    #[error("Invalid address: {field} is required")]
    InvalidAddress { field: &'static str },

    /// Checkout was called without lines.
    #[error("Cart is empty")]
    EmptyCart,

    /// A capture was refused.
    #[error("Payment rejected: {reason}")]
    PaymentRejected { reason: String },

    /// No order matches the given reference.
    #[error("Order not found: {0}")]
    OrderNotFound(String),

    /// The requested status change is not in the allowed table.
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// A checkout line is malformed.
    #[error("Invalid line for {product_id}: {reason}")]
    InvalidLine { product_id: String, reason: String },

    /// An amount is outside its allowed range.
    #[error("Invalid {field}: {reason}")]
    InvalidAmount { field: &'static str, reason: String },

    /// Another writer updated the order first.
    #[error("Order {order_id} was modified concurrently")]
    ConcurrencyConflict { order_id: OrderId },

    /// Persistence failure.
    #[error("Store error: {0}")]
    Store(StoreError),

    /// An external collaborator (processor, notifier, cart) failed.
    #[error("{service} error: {reason}")]
    Collaborator {
        service: &'static str,
        reason: String,
    },
}

impl LifecycleError {
    /// Returns true for failures the caller can correct (4xx-class).
    pub fn is_client_error(&self) -> bool {
        !matches!(
            self,
            LifecycleError::Store(_) | LifecycleError::Collaborator { .. }
        )
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            LifecycleError::OutOfStock { .. } => "out_of_stock",
            LifecycleError::InvalidAddress { .. } => "invalid_address",
            LifecycleError::EmptyCart => "empty_cart",
            LifecycleError::PaymentRejected { .. } => "payment_rejected",
            LifecycleError::OrderNotFound(_) => "order_not_found",
            LifecycleError::InvalidTransition { .. } => "invalid_transition",
            LifecycleError::InvalidLine { .. } => "invalid_line",
            LifecycleError::InvalidAmount { .. } => "invalid_amount",
            LifecycleError::ConcurrencyConflict { .. } => "concurrency_conflict",
            LifecycleError::Store(_) => "store",
            LifecycleError::Collaborator { .. } => "collaborator",
        }
    }

    pub(crate) fn collaborator(service: &'static str, reason: impl Into<String>) -> Self {
        LifecycleError::Collaborator {
            service,
            reason: reason.into(),
        }
    }
}

impl From<StoreError> for LifecycleError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ConcurrencyConflict { order_id, .. } => {
                LifecycleError::ConcurrencyConflict { order_id }
            }
            StoreError::OrderNotFound(order_id) => {
                LifecycleError::OrderNotFound(order_id.to_string())
            }
            other => LifecycleError::Store(other),
        }
    }
}

impl From<OrderError> for LifecycleError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::NoItems => LifecycleError::EmptyCart,
            OrderError::InvalidTransition { from, to } => LifecycleError::InvalidTransition {
                from: from.to_string(),
                to: to.to_string(),
            },
            OrderError::InvalidPaymentTransition { from, to } => {
                LifecycleError::InvalidTransition {
                    from: format!("payment {from}"),
                    to: format!("payment {to}"),
                }
            }
            OrderError::ConfirmationRequiresPayment => LifecycleError::InvalidTransition {
                from: "unpaid".to_string(),
                to: "confirmed".to_string(),
            },
            OrderError::AlreadyPlaced => LifecycleError::InvalidTransition {
                from: "placed".to_string(),
                to: "placed".to_string(),
            },
            OrderError::NotPlaced => LifecycleError::OrderNotFound("unplaced order".to_string()),
            OrderError::PaymentNotAccepted { status } => LifecycleError::PaymentRejected {
                reason: format!("payment is already {status}"),
            },
            OrderError::OrderCancelled => LifecycleError::PaymentRejected {
                reason: "order is cancelled".to_string(),
            },
            OrderError::InvalidAmount { field, amount } => LifecycleError::InvalidAmount {
                field,
                reason: format!("{amount} is out of range"),
            },
            OrderError::TotalsMismatch { expected, actual } => LifecycleError::InvalidAmount {
                field: "total_amount",
                reason: format!("expected {expected}, got {actual}"),
            },
            OrderError::AmountOutOfRange => LifecycleError::InvalidAmount {
                field: "total_amount",
                reason: "overflow".to_string(),
            },
            OrderError::InvalidQuantity {
                product_id,
                quantity,
            } => LifecycleError::InvalidLine {
                product_id,
                reason: format!("quantity {quantity} must be greater than 0"),
            },
            OrderError::InvalidWeight { product_id, weight } => LifecycleError::InvalidLine {
                product_id,
                reason: format!("weight {weight} must be greater than 0"),
            },
        }
    }
}

/// Convenience type alias for lifecycle results.
pub type Result<T> = std::result::Result<T, LifecycleError>;
