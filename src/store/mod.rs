use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::cart::CartSnapshot;
use crate::domain::order::{Order, OrderEvent, OrderStatus};
use crate::event_sourcing::EventEnvelope;

pub mod memory;
pub mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PgStore;

// ============================================================================
// Persistence Contracts
// ============================================================================
//
// Orders are stored as whole documents (items embedded) with a version
// column. Every write names the version it was computed from; a mismatch
// means another writer got there first and the caller sees `Conflict`.
// The events that produced a write are appended in the same transaction.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Concurrent modification of order {order_id}: expected version {expected}")]
    Conflict { order_id: Uuid, expected: i64 },

    #[error("Order already exists: {0}")]
    Duplicate(Uuid),

    #[error("Document serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type OrderHistory = Vec<EventEnvelope<OrderEvent>>;

/// Whose orders a listing covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderScope {
    All,
    PlacedBy(Uuid),
    SoldBy(Uuid),
}

impl OrderScope {
    pub fn includes(&self, order: &Order) -> bool {
        match self {
            OrderScope::All => true,
            OrderScope::PlacedBy(user_id) => order.user_id == *user_id,
            OrderScope::SoldBy(seller_id) => order.contains_seller(*seller_id),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrderQuery {
    pub scope: OrderScope,
    pub status: Option<OrderStatus>,
    /// 1-based
    pub page: u32,
    pub limit: u32,
}

impl OrderQuery {
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }
}

/// One page of orders, newest first, plus the total matching count
#[derive(Debug, Clone)]
pub struct OrderPage {
    pub orders: Vec<Order>,
    pub total: u64,
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn insert(&self, order: &Order, events: &[EventEnvelope<OrderEvent>]) -> Result<(), StoreError>;

    async fn get(&self, order_id: Uuid) -> Result<Option<Order>, StoreError>;

    /// Replace the document if its stored version is still `expected_version`
    async fn save(
        &self,
        order: &Order,
        expected_version: i64,
        events: &[EventEnvelope<OrderEvent>],
    ) -> Result<(), StoreError>;

    /// Match against the stored payment reference or the provider intent reference
    async fn find_by_payment_reference(&self, reference: &str) -> Result<Option<Order>, StoreError>;

    async fn list(&self, query: &OrderQuery) -> Result<OrderPage, StoreError>;

    /// Orders whose stock hold expired at or before `now`
    async fn find_expired_holds(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Order>, StoreError>;

    async fn history(&self, order_id: Uuid) -> Result<OrderHistory, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

#[async_trait]
pub trait CartStore: Send + Sync {
    async fn cart_for_user(&self, user_id: Uuid) -> Result<Option<CartSnapshot>, StoreError>;

    async fn get_cart(&self, cart_id: Uuid) -> Result<Option<CartSnapshot>, StoreError>;

    async fn save_cart(&self, cart: &CartSnapshot) -> Result<(), StoreError>;

    /// Empty the cart in place; a missing cart is not an error
    async fn clear_cart(&self, cart_id: Uuid) -> Result<(), StoreError>;
}
