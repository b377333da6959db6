//! Value objects for the order domain.

use chrono::{DateTime, Utc};
use common::{OrderNumber, ProductId};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::OrderError;

/// Money amount represented in cents to avoid floating point issues.
///
/// The `checked_*` methods report overflow; the operators saturate instead
/// of panicking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money {
    /// Amount in cents (e.g., 1000 = $10.00)
    cents: i64,
}

impl Money {
    /// Creates a new Money amount from cents.
    pub fn from_cents(cents: i64) -> Self {
        Self { cents }
    }

    /// Creates a new Money amount from a whole dollar value.
    pub fn from_dollars(dollars: i64) -> Self {
        Self {
            cents: dollars.saturating_mul(100),
        }
    }

    /// Returns zero money.
    pub fn zero() -> Self {
        Self { cents: 0 }
    }

    /// Returns the amount in cents.
    pub fn cents(&self) -> i64 {
        self.cents
    }

    /// Returns the dollar portion (whole number).
    pub fn dollars(&self) -> i64 {
        self.cents / 100
    }

    /// Returns the cents portion (remainder after dollars).
    pub fn cents_part(&self) -> i64 {
        self.cents.abs() % 100
    }

    /// Returns true if the amount is positive.
    pub fn is_positive(&self) -> bool {
        self.cents > 0
    }

    /// Returns true if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.cents == 0
    }

    /// Returns true if the amount is negative.
    pub fn is_negative(&self) -> bool {
        self.cents < 0
    }

    /// Multiplies by a quantity. Returns None on overflow.
    pub fn multiply(&self, quantity: u32) -> Option<Money> {
        self.cents
            .checked_mul(i64::from(quantity))
            .map(Money::from_cents)
    }

    /// Adds, returning None on overflow.
    pub fn checked_add(&self, other: Money) -> Option<Money> {
        self.cents.checked_add(other.cents).map(Money::from_cents)
    }

    /// Subtracts, returning None on overflow.
    pub fn checked_sub(&self, other: Money) -> Option<Money> {
        self.cents.checked_sub(other.cents).map(Money::from_cents)
    }

    /// Multiplies by a decimal factor, rounding half away from zero to the cent.
    ///
    /// Returns None if the result does not fit in the cent range.
    pub fn scale(&self, factor: Decimal) -> Option<Money> {
        let scaled = Decimal::from(self.cents).checked_mul(factor)?;
        scaled
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_i64()
            .map(Money::from_cents)
    }

    /// Subtracts, flooring the result at zero.
    pub fn saturating_sub(&self, other: Money) -> Money {
        Money {
            cents: self.cents.saturating_sub(other.cents).max(0),
        }
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::zero()
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.cents < 0 {
            write!(f, "-${}.{:02}", self.dollars().abs(), self.cents_part())
        } else {
            write!(f, "${}.{:02}", self.dollars(), self.cents_part())
        }
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money {
            cents: self.cents.saturating_add(rhs.cents),
        }
    }
}

impl std::ops::Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Self) -> Self::Output {
        Money {
            cents: self.cents.saturating_sub(rhs.cents),
        }
    }
}

impl std::ops::AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.cents = self.cents.saturating_add(rhs.cents);
    }
}

impl std::ops::SubAssign for Money {
    fn sub_assign(&mut self, rhs: Self) {
        self.cents = self.cents.saturating_sub(rhs.cents);
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

/// Payment rail used to settle an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Card payment through the hosted processor checkout.
    #[default]
    ProcessorCard,

    /// Manually keyed over-the-counter benefit card.
    OfflineCardOtc,

    /// Manually keyed EBT card.
    OfflineCardEbt,
}

impl PaymentMethod {
    /// Returns true for the manually keyed rails.
    pub fn is_offline(&self) -> bool {
        !matches!(self, PaymentMethod::ProcessorCard)
    }

    /// Returns the persisted name of the method.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::ProcessorCard => "processor_card",
            PaymentMethod::OfflineCardOtc => "offline_card_otc",
            PaymentMethod::OfflineCardEbt => "offline_card_ebt",
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_country() -> String {
    "US".to_string()
}

/// Shipping or billing address snapshotted onto the order at placement.
///
/// Not a reference into the customer's address book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub full_name: String,
    pub street: String,
    #[serde(default)]
    pub apartment: Option<String>,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    #[serde(default = "default_country")]
    pub country: String,
    #[serde(default)]
    pub phone: Option<String>,
}

impl Address {
    /// Returns the first required field that is blank, if any.
    pub fn missing_field(&self) -> Option<&'static str> {
        [
            ("full_name", &self.full_name),
            ("street", &self.street),
            ("city", &self.city),
            ("state", &self.state),
            ("zip_code", &self.zip_code),
        ]
        .into_iter()
        .find(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| field)
    }
}

/// A line of an order, with the catalog price frozen at placement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    /// The product identifier.
    pub product_id: ProductId,

    /// Product name at placement time.
    pub name: String,

    /// Catalog category at placement time.
    #[serde(default)]
    pub category: Option<String>,

    /// Unit price at placement time (per unit, or per weight unit).
    pub unit_price: Money,

    /// Number of units ordered.
    pub quantity: u32,

    /// Weight per unit for produce sold by weight.
    #[serde(default)]
    pub weight: Option<Decimal>,

    /// Line total computed once at placement.
    pub line_subtotal: Money,
}

impl LineItem {
    /// Snapshots a catalog entry into an order line.
    ///
    /// Weighted lines cost `unit_price * weight * quantity`, plain lines
    /// `unit_price * quantity`.
    pub fn snapshot(
        product_id: impl Into<ProductId>,
        name: impl Into<String>,
        category: Option<String>,
        unit_price: Money,
        quantity: u32,
        weight: Option<Decimal>,
    ) -> Result<Self, OrderError> {
        let product_id = product_id.into();

        if quantity == 0 {
            return Err(OrderError::InvalidQuantity {
                product_id: product_id.to_string(),
                quantity,
            });
        }

        if unit_price.is_negative() {
            return Err(OrderError::InvalidAmount {
                field: "unit_price",
                amount: unit_price,
            });
        }

        let line_subtotal = match weight {
            Some(w) if w <= Decimal::ZERO => {
                return Err(OrderError::InvalidWeight {
                    product_id: product_id.to_string(),
                    weight: w,
                });
            }
            Some(w) => w
                .checked_mul(Decimal::from(quantity))
                .and_then(|factor| unit_price.scale(factor))
                .ok_or(OrderError::AmountOutOfRange)?,
            None => unit_price
                .multiply(quantity)
                .ok_or(OrderError::AmountOutOfRange)?,
        };

        Ok(Self {
            product_id,
            name: name.into(),
            category,
            unit_price,
            quantity,
            weight,
            line_subtotal,
        })
    }

    /// Returns true if the line is priced by weight.
    pub fn is_weighted(&self) -> bool {
        self.weight.is_some()
    }
}

/// Issues a human-facing order number: `ORD-<unix-millis>-<4 digits>`.
///
/// The millisecond prefix keeps numbers time-ordered; the random suffix
/// separates orders placed in the same millisecond.
pub fn issue_order_number(now: DateTime<Utc>) -> OrderNumber {
    let random = Uuid::new_v4().as_u128();
    let suffix = (random % 10_000) as u16;
    OrderNumber::new(format!("ORD-{}-{:04}", now.timestamp_millis(), suffix))
}
