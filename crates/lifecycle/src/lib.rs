//! Order lifecycle and payment reconciliation services.
//!
//! This crate drives orders from cart to delivery:
//! - Checkout: reserve → commit → adjust inventory, then best-effort side effects
//! - Payment capture adapters for the processor and the offline card rails
//! - Reconciliation of adapter outcomes, processor webhooks and admin payment operations
//! - Fulfillment advancement and cancellation with restock
//!
//! Failures are never retried automatically. Anything that goes wrong after an
//! order was stored is logged and left for manual reconciliation.

pub mod checkout;
pub mod config;
pub mod error;
pub mod fulfillment;
pub mod handler;
pub mod payment;
pub mod reconciliation;
pub mod services;

pub use checkout::{
    CheckoutLine, CheckoutRequest, CheckoutService, InventoryReport, PlacedOrder, Reservation,
};
pub use config::LifecycleConfig;
pub use error::{LifecycleError, Result};
pub use fulfillment::{Cancellation, FulfillmentService};
pub use handler::{CommandResult, OrderCommandHandler};
pub use payment::{
    CaptureRequest, CaptureResult, CheckoutSession, OfflineCardAdapter, OfflineCardEntry,
    PaymentAdapter, PaymentOutcome, PaymentService, ProcessorAdapter, WebhookAck, WebhookEvent,
    WebhookKind,
};
pub use reconciliation::Reconciler;
pub use services::{
    CartService, InMemoryCartService, InMemoryNotifier, InMemoryPaymentProcessor, OrderNotifier,
    OrderSummary, PaymentProcessor, ProcessorSession, SessionRequest,
};
