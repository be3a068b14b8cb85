use serde::Serialize;
use uuid::Uuid;

use crate::domain::cart::{CartError, CartSnapshot};
use crate::domain::money::Money;
use crate::error::AppError;
use super::Backends;

// ============================================================================
// Cart Service
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartView {
    #[serde(flatten)]
    pub cart: CartSnapshot,
    pub total: Money,
    pub total_quantity: u32,
}

impl From<CartSnapshot> for CartView {
    fn from(cart: CartSnapshot) -> Self {
        Self {
            total: cart.total(),
            total_quantity: cart.total_quantity(),
            cart,
        }
    }
}

pub struct CartService {
    backends: Backends,
}

impl CartService {
    pub fn new(backends: Backends) -> Self {
        Self { backends }
    }

    /// The user's cart; an empty, unsaved one if they never added anything
    pub async fn get_cart(&self, user_id: Uuid) -> Result<CartView, AppError> {
        let cart = self
            .backends
            .carts
            .cart_for_user(user_id)
            .await?
            .unwrap_or_else(|| CartSnapshot::new(user_id));
        Ok(cart.into())
    }

    pub async fn add_item(&self, user_id: Uuid, product_id: Uuid, quantity: u32) -> Result<CartView, AppError> {
        let product = self
            .backends
            .catalog
            .find_product(product_id)
            .await?
            .ok_or(CartError::ProductNotFound(product_id))?;

        let mut cart = self
            .backends
            .carts
            .cart_for_user(user_id)
            .await?
            .unwrap_or_else(|| CartSnapshot::new(user_id));

        cart.add_item(product_id, quantity, product.price, product.stock)?;
        self.backends.carts.save_cart(&cart).await?;

        tracing::debug!(
            user_id = %user_id,
            product_id = %product_id,
            quantity = quantity,
            "Product added to cart"
        );
        Ok(cart.into())
    }

    pub async fn update_quantity(&self, user_id: Uuid, product_id: Uuid, quantity: u32) -> Result<CartView, AppError> {
        let mut cart = self
            .backends
            .carts
            .cart_for_user(user_id)
            .await?
            .ok_or(CartError::CartNotFound)?;

        let available = self
            .backends
            .catalog
            .find_product(product_id)
            .await?
            .map(|product| product.stock)
            .ok_or(CartError::ProductNotFound(product_id))?;

        cart.set_quantity(product_id, quantity, available)?;
        self.backends.carts.save_cart(&cart).await?;
        Ok(cart.into())
    }

    pub async fn remove_item(&self, user_id: Uuid, product_id: Uuid) -> Result<CartView, AppError> {
        let mut cart = self
            .backends
            .carts
            .cart_for_user(user_id)
            .await?
            .ok_or(CartError::CartNotFound)?;

        cart.remove_item(product_id)?;
        self.backends.carts.save_cart(&cart).await?;
        Ok(cart.into())
    }

    /// Empty the cart. The flag is false when there was nothing to clear.
    pub async fn clear(&self, user_id: Uuid) -> Result<(CartView, bool), AppError> {
        match self.backends.carts.cart_for_user(user_id).await? {
            Some(mut cart) if !cart.is_empty() => {
                cart.clear();
                self.backends.carts.save_cart(&cart).await?;
                Ok((cart.into(), true))
            }
            Some(cart) => Ok((cart.into(), false)),
            None => Ok((CartSnapshot::new(user_id).into(), false)),
        }
    }
}
