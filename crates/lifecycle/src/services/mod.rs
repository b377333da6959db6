//! External collaborator traits and in-memory implementations.

pub mod cart;
pub mod notifier;
pub mod processor;

pub use cart::{CartService, InMemoryCartService};
pub use notifier::{InMemoryNotifier, OrderNotifier, OrderSummary};
pub use processor::{InMemoryPaymentProcessor, PaymentProcessor, ProcessorSession, SessionRequest};
