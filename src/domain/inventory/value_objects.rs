use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::money::Money;

// ============================================================================
// Inventory Value Objects
// ============================================================================

/// Catalog entry as seen by the order core. `stock` is the ledger's view at
/// read time and may be stale by the time a reservation is attempted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: Uuid,
    pub title: String,
    pub price: Money,
    pub thumbnail: String,
    pub stock: u64,
    pub seller_id: Option<Uuid>,
}

impl Product {
    /// Derived on read, never stored
    pub fn in_stock(&self) -> bool {
        self.stock > 0
    }
}

/// A quantity of one product moving in or out of the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockLine {
    pub product_id: Uuid,
    pub quantity: u32,
}

impl StockLine {
    pub fn new(product_id: Uuid, quantity: u32) -> Self {
        Self { product_id, quantity }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_stock_is_derived_from_stock() {
        let mut product = Product {
            id: Uuid::new_v4(),
            title: "Headphones".to_string(),
            price: Money::cents(4999),
            thumbnail: "img/headphones.png".to_string(),
            stock: 1,
            seller_id: Some(Uuid::new_v4()),
        };
        assert!(product.in_stock());

        product.stock = 0;
        assert!(!product.in_stock());
    }
}
