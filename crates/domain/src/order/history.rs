//! Audit trail entries.

use chrono::{DateTime, Utc};
use common::UserId;
use serde::{Deserialize, Serialize};

use super::{FulfillmentStatus, PaymentStatus};

/// Who caused a change to an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Actor {
    /// The shopper who owns the order.
    Customer(UserId),
    /// A staff member, identified by username.
    Admin(String),
    /// The payment processor, via webhook.
    Processor,
    /// The engine itself.
    System,
}

impl std::fmt::Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Actor::Customer(id) => write!(f, "customer:{id}"),
            Actor::Admin(name) => write!(f, "admin:{name}"),
            Actor::Processor => f.write_str("processor"),
            Actor::System => f.write_str("system"),
        }
    }
}

/// One entry of an order's append-only status history.
///
/// Both axes are recorded so a dispute can be read off a single entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    pub status: FulfillmentStatus,
    pub payment_status: PaymentStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub note: Option<String>,
    pub actor: Actor,
}

impl StatusHistoryEntry {
    pub fn new(
        status: FulfillmentStatus,
        payment_status: PaymentStatus,
        timestamp: DateTime<Utc>,
        note: impl Into<String>,
        actor: Actor,
    ) -> Self {
        Self {
            status,
            payment_status,
            timestamp,
            note: Some(note.into()),
            actor,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actor_serializes_with_kind_tag() {
        let json = serde_json::to_value(Actor::Admin("maria".to_string())).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "admin", "id": "maria"}));

        let json = serde_json::to_value(Actor::Processor).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "processor"}));
    }

    #[test]
    fn actor_display() {
        assert_eq!(Actor::System.to_string(), "system");
        assert_eq!(Actor::Admin("li".to_string()).to_string(), "admin:li");
    }
}
