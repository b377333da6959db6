//! Order totals.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{LineItem, Money, OrderError};

/// Totals computed once at placement and never recomputed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTotals {
    pub subtotal: Money,
    pub tax_amount: Money,
    pub shipping_amount: Money,
    pub tip_amount: Money,
    pub discount_amount: Money,
    pub total_amount: Money,
}

impl OrderTotals {
    /// Returns the total implied by the components.
    pub fn expected_total(&self) -> Money {
        self.subtotal + self.tax_amount + self.shipping_amount + self.tip_amount
            - self.discount_amount
    }

    /// Returns the implied total, or None if it overflows.
    pub fn checked_total(&self) -> Option<Money> {
        self.subtotal
            .checked_add(self.tax_amount)?
            .checked_add(self.shipping_amount)?
            .checked_add(self.tip_amount)?
            .checked_sub(self.discount_amount)
    }

    /// Returns true if `total = subtotal + tax + shipping + tip - discount`.
    pub fn is_balanced(&self) -> bool {
        self.expected_total() == self.total_amount
    }
}

/// Tax and shipping rules applied at checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingPolicy {
    /// Fraction of the subtotal charged as tax, e.g. `0.08`.
    pub tax_rate: Decimal,
    /// Subtotals at or above this ship free.
    pub free_shipping_threshold: Money,
    pub flat_shipping_fee: Money,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            tax_rate: Decimal::new(8, 2),
            free_shipping_threshold: Money::from_dollars(50),
            flat_shipping_fee: Money::from_cents(599),
        }
    }
}

impl PricingPolicy {
    /// Computes the totals for a set of snapshotted lines.
    pub fn price(
        &self,
        items: &[LineItem],
        tip: Money,
        discount: Money,
    ) -> Result<OrderTotals, OrderError> {
        if items.is_empty() {
            return Err(OrderError::NoItems);
        }
        if tip.is_negative() {
            return Err(OrderError::InvalidAmount {
                field: "tip_amount",
                amount: tip,
            });
        }

        let subtotal = items
            .iter()
            .try_fold(Money::zero(), |acc, item| acc.checked_add(item.line_subtotal))
            .ok_or(OrderError::AmountOutOfRange)?;

        if discount.is_negative() || discount > subtotal {
            return Err(OrderError::InvalidAmount {
                field: "discount_amount",
                amount: discount,
            });
        }

        let tax_amount = subtotal
            .scale(self.tax_rate)
            .ok_or(OrderError::AmountOutOfRange)?;

        let shipping_amount = if subtotal >= self.free_shipping_threshold {
            Money::zero()
        } else {
            self.flat_shipping_fee
        };

        let mut totals = OrderTotals {
            subtotal,
            tax_amount,
            shipping_amount,
            tip_amount: tip,
            discount_amount: discount,
            total_amount: Money::zero(),
        };
        totals.total_amount = totals
            .checked_total()
            .ok_or(OrderError::AmountOutOfRange)?;
        Ok(totals)
    }
}
