use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::inventory::StockLine;
use crate::domain::money::Money;
use super::errors::CartError;

// ============================================================================
// Cart Snapshot
// ============================================================================
//
// One active cart per user. Created lazily on the first add, emptied (never
// deleted) when an order settles.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub product_id: Uuid,
    pub quantity: u32,
    pub price_at_add: Money,
}

impl CartItem {
    pub fn line_total(&self) -> Money {
        self.price_at_add * self.quantity
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartSnapshot {
    pub id: Uuid,
    pub user_id: Uuid,
    pub items: Vec<CartItem>,
    pub updated_at: DateTime<Utc>,
}

impl CartSnapshot {
    pub fn new(user_id: Uuid) -> Self {
        Self {
            id: Uuid::now_v7(),
            user_id,
            items: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn total(&self) -> Money {
        self.items.iter().map(CartItem::line_total).sum()
    }

    pub fn total_quantity(&self) -> u32 {
        self.items.iter().map(|item| item.quantity).sum()
    }

    pub fn quantity_of(&self, product_id: Uuid) -> u32 {
        self.items
            .iter()
            .find(|item| item.product_id == product_id)
            .map(|item| item.quantity)
            .unwrap_or(0)
    }

    /// Lines to reserve when this cart becomes an order
    pub fn stock_lines(&self) -> Vec<StockLine> {
        self.items
            .iter()
            .map(|item| StockLine::new(item.product_id, item.quantity))
            .collect()
    }

    /// Add `quantity` units, merging into an existing line for the same product.
    ///
    /// `available` is the product's current stock; the merged quantity may not
    /// exceed it. The price of an existing line is kept as first captured.
    pub fn add_item(
        &mut self,
        product_id: Uuid,
        quantity: u32,
        price: Money,
        available: u64,
    ) -> Result<(), CartError> {
        if quantity == 0 {
            return Err(CartError::ZeroQuantity);
        }

        let merged = self.quantity_of(product_id).saturating_add(quantity);
        if u64::from(merged) > available {
            return Err(CartError::QuantityExceedsStock {
                product_id,
                available,
                requested: merged,
            });
        }

        match self.items.iter_mut().find(|item| item.product_id == product_id) {
            Some(item) => item.quantity = merged,
            None => self.items.push(CartItem {
                product_id,
                quantity,
                price_at_add: price,
            }),
        }
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Set the quantity of an existing line. Zero removes the line.
    pub fn set_quantity(
        &mut self,
        product_id: Uuid,
        quantity: u32,
        available: u64,
    ) -> Result<(), CartError> {
        if quantity == 0 {
            return self.remove_item(product_id);
        }

        if u64::from(quantity) > available {
            return Err(CartError::QuantityExceedsStock {
                product_id,
                available,
                requested: quantity,
            });
        }

        let item = self
            .items
            .iter_mut()
            .find(|item| item.product_id == product_id)
            .ok_or(CartError::ItemNotInCart(product_id))?;
        item.quantity = quantity;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn remove_item(&mut self, product_id: Uuid) -> Result<(), CartError> {
        let before = self.items.len();
        self.items.retain(|item| item.product_id != product_id);
        if self.items.len() == before {
            return Err(CartError::ItemNotInCart(product_id));
        }
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_merges_existing_line() {
        let mut cart = CartSnapshot::new(Uuid::new_v4());
        let product = Uuid::new_v4();

        cart.add_item(product, 2, Money::cents(1000), 5).unwrap();
        cart.add_item(product, 1, Money::cents(1200), 5).unwrap();

        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.quantity_of(product), 3);
        // price stays as first captured
        assert_eq!(cart.total(), Money::cents(3000));
    }

    #[test]
    fn test_add_rejects_merged_quantity_over_stock() {
        let mut cart = CartSnapshot::new(Uuid::new_v4());
        let product = Uuid::new_v4();
        cart.add_item(product, 4, Money::cents(100), 5).unwrap();

        let err = cart.add_item(product, 2, Money::cents(100), 5).unwrap_err();
        assert!(matches!(err, CartError::QuantityExceedsStock { requested: 6, .. }));
        assert_eq!(cart.quantity_of(product), 4);
    }

    #[test]
    fn test_set_quantity_zero_removes_line() {
        let mut cart = CartSnapshot::new(Uuid::new_v4());
        let product = Uuid::new_v4();
        cart.add_item(product, 1, Money::cents(100), 5).unwrap();

        cart.set_quantity(product, 0, 5).unwrap();
        assert!(cart.is_empty());
    }

    #[test]
    fn test_remove_missing_item() {
        let mut cart = CartSnapshot::new(Uuid::new_v4());
        assert!(matches!(
            cart.remove_item(Uuid::new_v4()),
            Err(CartError::ItemNotInCart(_))
        ));
    }

    #[test]
    fn test_clear_keeps_identity() {
        let mut cart = CartSnapshot::new(Uuid::new_v4());
        let id = cart.id;
        cart.add_item(Uuid::new_v4(), 1, Money::cents(100), 1).unwrap();

        cart.clear();
        assert!(cart.is_empty());
        assert_eq!(cart.id, id);
        assert_eq!(cart.total(), Money::ZERO);
    }
}
