use uuid::Uuid;

// ============================================================================
// Inventory Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    #[error("Product not found: {0}")]
    ProductNotFound(Uuid),

    #[error("Insufficient stock for product {product_id}. Available: {available}, Requested: {requested}")]
    InsufficientStock {
        product_id: Uuid,
        available: u64,
        requested: u32,
    },

    #[error("Invalid stock quantity: {0}")]
    InvalidQuantity(u32),

    #[error("Inventory backend error: {0}")]
    Backend(String),
}
