//! Inventory ledger records.

use common::ProductId;
use serde::{Deserialize, Serialize};

use crate::order::Money;

/// Stock and price of one catalog product, as seen by checkout.
///
/// `is_available_for_sale` is always `available_quantity > 0`; every mutator
/// re-derives it, and so does deserialization, which ignores a stored flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "CatalogEntry")]
pub struct InventoryRecord {
    product_id: ProductId,
    name: String,
    category: Option<String>,
    unit_price: Money,
    available_quantity: u32,
    is_available_for_sale: bool,
}

/// Wire shape of a record. The availability flag is not read back.
#[derive(Deserialize)]
struct CatalogEntry {
    product_id: ProductId,
    name: String,
    #[serde(default)]
    category: Option<String>,
    unit_price: Money,
    available_quantity: u32,
}

impl From<CatalogEntry> for InventoryRecord {
    fn from(entry: CatalogEntry) -> Self {
        Self {
            category: entry.category,
            ..Self::new(
                entry.product_id,
                entry.name,
                entry.unit_price,
                entry.available_quantity,
            )
        }
    }
}

impl InventoryRecord {
    pub fn new(
        product_id: impl Into<ProductId>,
        name: impl Into<String>,
        unit_price: Money,
        available_quantity: u32,
    ) -> Self {
        Self {
            product_id: product_id.into(),
            name: name.into(),
            category: None,
            unit_price,
            available_quantity,
            is_available_for_sale: available_quantity > 0,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn product_id(&self) -> &ProductId {
        &self.product_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    pub fn unit_price(&self) -> Money {
        self.unit_price
    }

    pub fn available_quantity(&self) -> u32 {
        self.available_quantity
    }

    pub fn is_available_for_sale(&self) -> bool {
        self.is_available_for_sale
    }

    /// Returns true if `quantity` units can be sold right now.
    pub fn can_fulfill(&self, quantity: u32) -> bool {
        self.is_available_for_sale && self.available_quantity >= quantity
    }

    /// Adds `delta` (possibly negative) to the stock, flooring at zero.
    ///
    /// Returns the new quantity.
    pub fn adjust(&mut self, delta: i64) -> u32 {
        let next = (i64::from(self.available_quantity) + delta).clamp(0, i64::from(u32::MAX));
        self.set_quantity(next as u32);
        self.available_quantity
    }

    /// Puts `quantity` units back on the shelf.
    ///
    /// A positive restock always leaves the product available for sale, even
    /// if other orders still hold the stock it returned.
    pub fn restock(&mut self, quantity: u32) -> u32 {
        self.set_quantity(self.available_quantity.saturating_add(quantity));
        self.available_quantity
    }

    /// Replaces the price, e.g. after a catalog update.
    pub fn set_unit_price(&mut self, unit_price: Money) {
        self.unit_price = unit_price;
    }

    fn set_quantity(&mut self, quantity: u32) {
        self.available_quantity = quantity;
        self.is_available_for_sale = quantity > 0;
    }
}
