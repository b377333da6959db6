//! Shopping cart boundary.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use common::{ProductId, UserId};

use crate::error::{LifecycleError, Result};

/// The cart owned by the storefront. Checkout only ever empties it.
#[async_trait]
pub trait CartService: Send + Sync {
    async fn clear_cart(&self, user_id: UserId) -> Result<()>;
}

#[derive(Debug, Default)]
struct InMemoryCartState {
    carts: HashMap<UserId, Vec<(ProductId, u32)>>,
    fail_on_clear: bool,
}

/// In-memory cart service for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCartService {
    state: Arc<RwLock<InMemoryCartState>>,
}

impl InMemoryCartService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a product to a user's cart.
    pub fn add_item(&self, user_id: UserId, product_id: impl Into<ProductId>, quantity: u32) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .carts
            .entry(user_id)
            .or_default()
            .push((product_id.into(), quantity));
    }

    /// Returns the number of lines in a user's cart.
    pub fn line_count(&self, user_id: UserId) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .carts
            .get(&user_id)
            .map_or(0, Vec::len)
    }

    pub fn set_fail_on_clear(&self, fail: bool) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .fail_on_clear = fail;
    }
}

#[async_trait]
impl CartService for InMemoryCartService {
    async fn clear_cart(&self, user_id: UserId) -> Result<()> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);

        if state.fail_on_clear {
            return Err(LifecycleError::collaborator("cart", "cart service unavailable"));
        }

        state.carts.remove(&user_id);
        Ok(())
    }
}
