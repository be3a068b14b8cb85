use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::cart::CartSnapshot;
use crate::domain::inventory::{InventoryError, InventoryLedger, Product, ProductCatalog};
use crate::domain::money::Money;
use crate::domain::order::{Order, OrderEvent, StockHold};
use crate::event_sourcing::EventEnvelope;
use super::*;

// ============================================================================
// In-Memory Backend
// ============================================================================
//
// Stock counters are atomics: a reservation is a compare-and-swap loop that
// only succeeds when the subtraction does not underflow, so concurrent
// reserves on one product are linearizable without holding the map lock for
// writing.
//
// ============================================================================

struct ProductEntry {
    product: Product,
    stock: Arc<AtomicU64>,
}

#[derive(Default)]
struct OrderTable {
    orders: HashMap<Uuid, Order>,
    events: HashMap<Uuid, OrderHistory>,
}

#[derive(Default)]
struct CartTable {
    carts: HashMap<Uuid, CartSnapshot>,
    by_user: HashMap<Uuid, Uuid>,
}

#[derive(Default)]
pub struct InMemoryStore {
    products: RwLock<HashMap<Uuid, ProductEntry>>,
    carts: RwLock<CartTable>,
    orders: RwLock<OrderTable>,
    /// Number of upcoming `release` calls that fail, for exercising compensation
    failing_releases: AtomicU32,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a product and return its id
    pub async fn seed_product(
        &self,
        title: &str,
        price_cents: i64,
        stock: u64,
        seller_id: Option<Uuid>,
    ) -> Uuid {
        let product = Product {
            id: Uuid::now_v7(),
            title: title.to_string(),
            price: Money::cents(price_cents),
            thumbnail: format!("img/{}.png", title.to_lowercase()),
            stock,
            seller_id,
        };
        let id = product.id;
        self.insert_product(product).await;
        id
    }

    async fn insert_product(&self, product: Product) {
        let stock = Arc::new(AtomicU64::new(product.stock));
        self.products
            .write()
            .await
            .insert(product.id, ProductEntry { product, stock });
    }

    /// Make the next `count` releases fail with a backend error
    pub fn fail_next_releases(&self, count: u32) {
        self.failing_releases.store(count, Ordering::SeqCst);
    }

    async fn counter(&self, product_id: Uuid) -> Result<Arc<AtomicU64>, InventoryError> {
        self.products
            .read()
            .await
            .get(&product_id)
            .map(|entry| entry.stock.clone())
            .ok_or(InventoryError::ProductNotFound(product_id))
    }
}

// ============================================================================
// Inventory
// ============================================================================

#[async_trait]
impl InventoryLedger for InMemoryStore {
    async fn reserve(&self, product_id: Uuid, quantity: u32) -> Result<u64, InventoryError> {
        let counter = self.counter(product_id).await?;
        let requested = u64::from(quantity);

        match counter.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |stock| {
            stock.checked_sub(requested)
        }) {
            Ok(previous) => Ok(previous - requested),
            Err(available) => Err(InventoryError::InsufficientStock {
                product_id,
                available,
                requested: quantity,
            }),
        }
    }

    async fn release(&self, product_id: Uuid, quantity: u32) -> Result<u64, InventoryError> {
        let injected = self
            .failing_releases
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(InventoryError::Backend("injected release failure".to_string()));
        }

        let counter = self.counter(product_id).await?;
        let previous = counter.fetch_add(u64::from(quantity), Ordering::SeqCst);
        Ok(previous + u64::from(quantity))
    }

    async fn stock_of(&self, product_id: Uuid) -> Result<u64, InventoryError> {
        Ok(self.counter(product_id).await?.load(Ordering::SeqCst))
    }
}

#[async_trait]
impl ProductCatalog for InMemoryStore {
    async fn find_product(&self, product_id: Uuid) -> Result<Option<Product>, InventoryError> {
        let products = self.products.read().await;
        Ok(products.get(&product_id).map(|entry| {
            let mut product = entry.product.clone();
            product.stock = entry.stock.load(Ordering::SeqCst);
            product
        }))
    }

    async fn upsert_product(&self, product: &Product) -> Result<(), InventoryError> {
        self.insert_product(product.clone()).await;
        Ok(())
    }
}

// ============================================================================
// Carts
// ============================================================================

#[async_trait]
impl CartStore for InMemoryStore {
    async fn cart_for_user(&self, user_id: Uuid) -> Result<Option<CartSnapshot>, StoreError> {
        let table = self.carts.read().await;
        Ok(table
            .by_user
            .get(&user_id)
            .and_then(|cart_id| table.carts.get(cart_id))
            .cloned())
    }

    async fn get_cart(&self, cart_id: Uuid) -> Result<Option<CartSnapshot>, StoreError> {
        Ok(self.carts.read().await.carts.get(&cart_id).cloned())
    }

    async fn save_cart(&self, cart: &CartSnapshot) -> Result<(), StoreError> {
        let mut table = self.carts.write().await;
        table.by_user.insert(cart.user_id, cart.id);
        table.carts.insert(cart.id, cart.clone());
        Ok(())
    }

    async fn clear_cart(&self, cart_id: Uuid) -> Result<(), StoreError> {
        if let Some(cart) = self.carts.write().await.carts.get_mut(&cart_id) {
            cart.clear();
        }
        Ok(())
    }
}

// ============================================================================
// Orders
// ============================================================================

#[async_trait]
impl OrderRepository for InMemoryStore {
    async fn insert(&self, order: &Order, events: &[EventEnvelope<OrderEvent>]) -> Result<(), StoreError> {
        let mut table = self.orders.write().await;
        if table.orders.contains_key(&order.id) {
            return Err(StoreError::Duplicate(order.id));
        }
        table.orders.insert(order.id, order.clone());
        table.events.insert(order.id, events.to_vec());
        Ok(())
    }

    async fn get(&self, order_id: Uuid) -> Result<Option<Order>, StoreError> {
        Ok(self.orders.read().await.orders.get(&order_id).cloned())
    }

    async fn save(
        &self,
        order: &Order,
        expected_version: i64,
        events: &[EventEnvelope<OrderEvent>],
    ) -> Result<(), StoreError> {
        let mut table = self.orders.write().await;

        let current = table.orders.get(&order.id).map(|stored| stored.version);
        if current != Some(expected_version) {
            return Err(StoreError::Conflict {
                order_id: order.id,
                expected: expected_version,
            });
        }

        table.orders.insert(order.id, order.clone());
        table
            .events
            .entry(order.id)
            .or_default()
            .extend(events.iter().cloned());
        Ok(())
    }

    async fn find_by_payment_reference(&self, reference: &str) -> Result<Option<Order>, StoreError> {
        let table = self.orders.read().await;
        Ok(table
            .orders
            .values()
            .find(|order| {
                order.payment_reference.as_deref() == Some(reference)
                    || order
                        .payment_details
                        .as_ref()
                        .and_then(|details| details.intent_reference.as_deref())
                        == Some(reference)
            })
            .cloned())
    }

    async fn list(&self, query: &OrderQuery) -> Result<OrderPage, StoreError> {
        let table = self.orders.read().await;

        let mut matching: Vec<&Order> = table
            .orders
            .values()
            .filter(|order| query.scope.includes(order))
            .filter(|order| query.status.map_or(true, |status| order.status == status))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let total = matching.len() as u64;
        let orders = matching
            .into_iter()
            .skip(query.offset() as usize)
            .take(query.limit as usize)
            .cloned()
            .collect();

        Ok(OrderPage { orders, total })
    }

    async fn find_expired_holds(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Order>, StoreError> {
        let table = self.orders.read().await;
        Ok(table
            .orders
            .values()
            .filter(|order| matches!(order.stock_hold, StockHold::Held { .. }))
            .filter(|order| order.stock_hold.is_expired(now))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn history(&self, order_id: Uuid) -> Result<OrderHistory, StoreError> {
        Ok(self
            .orders
            .read()
            .await
            .events
            .get(&order_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::aggregate::tests::{item, place};
    use crate::domain::order::PaymentMethod;

    #[tokio::test]
    async fn test_concurrent_reserves_never_oversell() {
        let store = Arc::new(InMemoryStore::new());
        let product = store.seed_product("Widget", 100, 10, Some(Uuid::new_v4())).await;

        let mut handles = Vec::new();
        for _ in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move { store.reserve(product, 1).await.is_ok() }));
        }

        let mut granted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                granted += 1;
            }
        }

        assert_eq!(granted, 10);
        assert_eq!(store.stock_of(product).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failed_reserve_leaves_stock_untouched() {
        let store = InMemoryStore::new();
        let product = store.seed_product("Lamp", 100, 2, None).await;

        let err = store.reserve(product, 3).await.unwrap_err();
        assert!(matches!(err, InventoryError::InsufficientStock { available: 2, .. }));
        assert_eq!(store.stock_of(product).await.unwrap(), 2);

        let found = store.find_product(product).await.unwrap().unwrap();
        assert_eq!(found.stock, 2);
    }

    #[tokio::test]
    async fn test_save_rejects_stale_version() {
        let store = InMemoryStore::new();
        let order = place(Uuid::new_v4(), vec![item(Uuid::new_v4(), 1, 100)], PaymentMethod::CreditCard);
        store.insert(&order, &[]).await.unwrap();

        let mut updated = order.clone();
        updated.version = 2;
        store.save(&updated, 1, &[]).await.unwrap();

        let stale = store.save(&updated, 1, &[]).await;
        assert!(matches!(stale, Err(StoreError::Conflict { expected: 1, .. })));
    }

    #[tokio::test]
    async fn test_list_scopes_and_paginates_newest_first() {
        let store = InMemoryStore::new();
        let user = Uuid::new_v4();
        let seller = Uuid::new_v4();

        let mut ids = Vec::new();
        for _ in 0..3 {
            let order = place(user, vec![item(seller, 1, 100)], PaymentMethod::CashOnDelivery);
            ids.push(order.id);
            store.insert(&order, &[]).await.unwrap();
        }
        let other = place(Uuid::new_v4(), vec![item(Uuid::new_v4(), 1, 100)], PaymentMethod::CashOnDelivery);
        store.insert(&other, &[]).await.unwrap();

        let page = store
            .list(&OrderQuery { scope: OrderScope::PlacedBy(user), status: None, page: 1, limit: 2 })
            .await
            .unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.orders.len(), 2);
        assert_eq!(page.orders[0].id, ids[2]);

        let page = store
            .list(&OrderQuery { scope: OrderScope::SoldBy(seller), status: None, page: 2, limit: 2 })
            .await
            .unwrap();
        assert_eq!(page.orders.len(), 1);
    }

    #[tokio::test]
    async fn test_cart_clear_keeps_cart() {
        let store = InMemoryStore::new();
        let mut cart = CartSnapshot::new(Uuid::new_v4());
        cart.add_item(Uuid::new_v4(), 1, Money::cents(100), 5).unwrap();
        store.save_cart(&cart).await.unwrap();

        store.clear_cart(cart.id).await.unwrap();
        let stored = store.cart_for_user(cart.user_id).await.unwrap().unwrap();
        assert_eq!(stored.id, cart.id);
        assert!(stored.is_empty());
    }
}
