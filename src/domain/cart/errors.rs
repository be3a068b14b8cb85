use uuid::Uuid;

// ============================================================================
// Cart Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum CartError {
    #[error("Cart not found")]
    CartNotFound,

    #[error("Product not found: {0}")]
    ProductNotFound(Uuid),

    #[error("Product not found in cart: {0}")]
    ItemNotInCart(Uuid),

    #[error("Quantity exceeds stock for product {product_id}. Available: {available}, Requested: {requested}")]
    QuantityExceedsStock {
        product_id: Uuid,
        available: u64,
        requested: u32,
    },

    #[error("Quantity must be at least 1")]
    ZeroQuantity,
}
