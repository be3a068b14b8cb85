use uuid::Uuid;

use super::value_objects::OrderStatus;

// ============================================================================
// Order Business Rule Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("Cannot change order status from {current} to {target}. Allowed transitions: {}", describe_allowed(.allowed))]
    InvalidTransition {
        current: OrderStatus,
        target: OrderStatus,
        allowed: Vec<OrderStatus>,
    },

    #[error("Delivery of orders with multiple sellers must be confirmed by an admin")]
    UnsupportedMultiSellerDelivery,

    #[error("Not authorized: {0}")]
    NotAuthorized(&'static str),

    #[error("Order items cannot be empty")]
    EmptyItems,

    #[error("Invalid item quantity for product {product_id}: {quantity}")]
    InvalidQuantity { product_id: Uuid, quantity: u32 },

    #[error("Product {0} appears more than once in the order")]
    DuplicateProduct(Uuid),

    #[error("Order already placed")]
    AlreadyPlaced,

    #[error("Aggregate not initialized")]
    NotInitialized,
}

fn describe_allowed(allowed: &[OrderStatus]) -> String {
    if allowed.is_empty() {
        return "none".to_string();
    }
    allowed
        .iter()
        .map(OrderStatus::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_transition_message_names_allowed_set() {
        let err = OrderError::InvalidTransition {
            current: OrderStatus::Pending,
            target: OrderStatus::Shipped,
            allowed: vec![OrderStatus::Confirmed, OrderStatus::Cancelled],
        };
        assert_eq!(
            err.to_string(),
            "Cannot change order status from pending to shipped. Allowed transitions: confirmed, cancelled"
        );

        let terminal = OrderError::InvalidTransition {
            current: OrderStatus::Cancelled,
            target: OrderStatus::Cancelled,
            allowed: vec![],
        };
        assert!(terminal.to_string().ends_with("Allowed transitions: none"));
    }
}
