//! Per-user lifetime order statistics.

use std::collections::BTreeSet;

use common::{OrderId, UserId};
use serde::{Deserialize, Serialize};

use crate::order::Money;

/// Direction of a stats adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentKind {
    /// Counted when the order was placed.
    Placed,
    /// Taken back when the order was cancelled.
    Reversed,
}

impl AdjustmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdjustmentKind::Placed => "placed",
            AdjustmentKind::Reversed => "reversed",
        }
    }
}

/// One idempotent change to a user's order counters, keyed by order and kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsAdjustment {
    pub user_id: UserId,
    pub order_id: OrderId,
    pub kind: AdjustmentKind,
    pub amount: Money,
}

impl StatsAdjustment {
    pub fn placed(user_id: UserId, order_id: OrderId, amount: Money) -> Self {
        Self {
            user_id,
            order_id,
            kind: AdjustmentKind::Placed,
            amount,
        }
    }

    pub fn reversed(user_id: UserId, order_id: OrderId, amount: Money) -> Self {
        Self {
            user_id,
            order_id,
            kind: AdjustmentKind::Reversed,
            amount,
        }
    }
}

/// A user's `total_orders` and `total_spent` counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserOrderStats {
    user_id: UserId,
    total_orders: u32,
    total_spent: Money,
    applied: BTreeSet<(OrderId, AdjustmentKind)>,
}

impl UserOrderStats {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            total_orders: 0,
            total_spent: Money::zero(),
            applied: BTreeSet::new(),
        }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn total_orders(&self) -> u32 {
        self.total_orders
    }

    pub fn total_spent(&self) -> Money {
        self.total_spent
    }

    /// Returns true if the adjustment has already been counted.
    pub fn has_applied(&self, order_id: OrderId, kind: AdjustmentKind) -> bool {
        self.applied.contains(&(order_id, kind))
    }

    /// Applies an adjustment at most once per `(order_id, kind)`.
    ///
    /// A reversal is only counted for an order whose placement was counted.
    /// Counters never drop below zero. Returns true if the counters changed.
    pub fn apply(&mut self, adjustment: &StatsAdjustment) -> bool {
        if self.has_applied(adjustment.order_id, adjustment.kind) {
            return false;
        }

        match adjustment.kind {
            AdjustmentKind::Placed => {
                self.total_orders = self.total_orders.saturating_add(1);
                self.total_spent += adjustment.amount;
            }
            AdjustmentKind::Reversed => {
                if !self.has_applied(adjustment.order_id, AdjustmentKind::Placed) {
                    return false;
                }
                self.total_orders = self.total_orders.saturating_sub(1);
                self.total_spent = self.total_spent.saturating_sub(adjustment.amount);
            }
        }

        self.applied.insert((adjustment.order_id, adjustment.kind));
        true
    }

    /// Rebuilds stats from stored counters and applied keys.
    pub fn from_parts(
        user_id: UserId,
        total_orders: u32,
        total_spent: Money,
        applied: impl IntoIterator<Item = (OrderId, AdjustmentKind)>,
    ) -> Self {
        Self {
            user_id,
            total_orders,
            total_spent,
            applied: applied.into_iter().collect(),
        }
    }
}
