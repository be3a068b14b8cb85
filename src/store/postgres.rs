use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::domain::cart::CartSnapshot;
use crate::domain::inventory::{InventoryError, InventoryLedger, Product, ProductCatalog};
use crate::domain::money::Money;
use crate::domain::order::{Order, OrderEvent, StockHold};
use crate::event_sourcing::EventEnvelope;
use super::*;

// ============================================================================
// Postgres Backend
// ============================================================================
//
// - products.stock is a single integer updated in place; a reservation is a
//   conditional UPDATE that only matches rows with enough stock
// - orders are JSONB documents with a version column plus a few columns
//   lifted out for lookups (owner, sellers, payment references, hold expiry)
// - order_events is the append-only history written with each document
//
// ============================================================================

const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

type EventRow = (
    Uuid,
    Uuid,
    i64,
    String,
    Uuid,
    Option<Uuid>,
    Json<OrderEvent>,
    DateTime<Utc>,
);

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        tracing::info!(max_connections = max_connections, "Connected to Postgres");
        Ok(Self { pool })
    }

    /// Create tables and indexes if they do not exist yet
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        tracing::info!("Database schema ready");
        Ok(())
    }

    async fn append_events(
        tx: &mut Transaction<'_, Postgres>,
        events: &[EventEnvelope<OrderEvent>],
    ) -> Result<(), StoreError> {
        for envelope in events {
            sqlx::query(
                "INSERT INTO order_events
                    (event_id, order_id, sequence_number, event_type, correlation_id, actor_id, payload, recorded_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(envelope.event_id)
            .bind(envelope.aggregate_id)
            .bind(envelope.sequence_number)
            .bind(&envelope.event_type)
            .bind(envelope.correlation_id)
            .bind(envelope.actor_id)
            .bind(Json(&envelope.event_data))
            .bind(envelope.recorded_at)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }
}

fn backend(err: sqlx::Error) -> InventoryError {
    InventoryError::Backend(err.to_string())
}

fn hold_expiry(order: &Order) -> Option<DateTime<Utc>> {
    match order.stock_hold {
        StockHold::Held { expires_at } => Some(expires_at),
        StockHold::Committed | StockHold::Lapsed => None,
    }
}

fn intent_reference(order: &Order) -> Option<&str> {
    order
        .payment_details
        .as_ref()
        .and_then(|details| details.intent_reference.as_deref())
}

// ============================================================================
// Inventory
// ============================================================================

#[async_trait]
impl InventoryLedger for PgStore {
    async fn reserve(&self, product_id: Uuid, quantity: u32) -> Result<u64, InventoryError> {
        let remaining: Option<(i64,)> = sqlx::query_as(
            "UPDATE products
             SET stock = stock - $2, updated_at = NOW()
             WHERE id = $1 AND stock >= $2
             RETURNING stock",
        )
        .bind(product_id)
        .bind(i64::from(quantity))
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        if let Some((stock,)) = remaining {
            return Ok(stock.max(0) as u64);
        }

        // Nothing matched: either the product is missing or stock is short
        let available = self.stock_of(product_id).await?;
        Err(InventoryError::InsufficientStock {
            product_id,
            available,
            requested: quantity,
        })
    }

    async fn release(&self, product_id: Uuid, quantity: u32) -> Result<u64, InventoryError> {
        let updated: Option<(i64,)> = sqlx::query_as(
            "UPDATE products
             SET stock = stock + $2, updated_at = NOW()
             WHERE id = $1
             RETURNING stock",
        )
        .bind(product_id)
        .bind(i64::from(quantity))
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        updated
            .map(|(stock,)| stock.max(0) as u64)
            .ok_or(InventoryError::ProductNotFound(product_id))
    }

    async fn stock_of(&self, product_id: Uuid) -> Result<u64, InventoryError> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT stock FROM products WHERE id = $1")
            .bind(product_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;

        row.map(|(stock,)| stock.max(0) as u64)
            .ok_or(InventoryError::ProductNotFound(product_id))
    }
}

#[async_trait]
impl ProductCatalog for PgStore {
    async fn find_product(&self, product_id: Uuid) -> Result<Option<Product>, InventoryError> {
        let row: Option<(Uuid, String, i64, String, i64, Option<Uuid>)> = sqlx::query_as(
            "SELECT id, title, price_cents, thumbnail, stock, seller_id FROM products WHERE id = $1",
        )
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        Ok(row.map(|(id, title, price_cents, thumbnail, stock, seller_id)| Product {
            id,
            title,
            price: Money::cents(price_cents),
            thumbnail,
            stock: stock.max(0) as u64,
            seller_id,
        }))
    }

    async fn upsert_product(&self, product: &Product) -> Result<(), InventoryError> {
        let stock = i64::try_from(product.stock)
            .map_err(|_| InventoryError::Backend(format!("stock out of range for {}", product.id)))?;

        sqlx::query(
            "INSERT INTO products (id, title, price_cents, thumbnail, stock, seller_id)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (id) DO UPDATE
             SET title = EXCLUDED.title,
                 price_cents = EXCLUDED.price_cents,
                 thumbnail = EXCLUDED.thumbnail,
                 stock = EXCLUDED.stock,
                 seller_id = EXCLUDED.seller_id,
                 updated_at = NOW()",
        )
        .bind(product.id)
        .bind(&product.title)
        .bind(product.price.as_cents())
        .bind(&product.thumbnail)
        .bind(stock)
        .bind(product.seller_id)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(())
    }
}

// ============================================================================
// Carts
// ============================================================================

#[async_trait]
impl CartStore for PgStore {
    async fn cart_for_user(&self, user_id: Uuid) -> Result<Option<CartSnapshot>, StoreError> {
        let row: Option<(Json<CartSnapshot>,)> =
            sqlx::query_as("SELECT document FROM carts WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(Json(cart),)| cart))
    }

    async fn get_cart(&self, cart_id: Uuid) -> Result<Option<CartSnapshot>, StoreError> {
        let row: Option<(Json<CartSnapshot>,)> =
            sqlx::query_as("SELECT document FROM carts WHERE id = $1")
                .bind(cart_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(Json(cart),)| cart))
    }

    async fn save_cart(&self, cart: &CartSnapshot) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO carts (id, user_id, document, updated_at)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (id) DO UPDATE
             SET document = EXCLUDED.document, updated_at = EXCLUDED.updated_at",
        )
        .bind(cart.id)
        .bind(cart.user_id)
        .bind(Json(cart))
        .bind(cart.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn clear_cart(&self, cart_id: Uuid) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE carts
             SET document = jsonb_set(document, '{items}', '[]'::jsonb), updated_at = NOW()
             WHERE id = $1",
        )
        .bind(cart_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

// ============================================================================
// Orders
// ============================================================================

#[async_trait]
impl OrderRepository for PgStore {
    async fn insert(&self, order: &Order, events: &[EventEnvelope<OrderEvent>]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let sellers: Vec<Uuid> = order.sellers.iter().copied().collect();
        let inserted = sqlx::query(
            "INSERT INTO orders
                (id, user_id, sellers, status, payment_status, payment_reference, intent_reference,
                 hold_expires_at, version, document, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(order.id)
        .bind(order.user_id)
        .bind(&sellers)
        .bind(order.status.as_str())
        .bind(order.payment_status.as_str())
        .bind(order.payment_reference.as_deref())
        .bind(intent_reference(order))
        .bind(hold_expiry(order))
        .bind(order.version)
        .bind(Json(order))
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await;

        if let Err(err) = inserted {
            let duplicate = err
                .as_database_error()
                .is_some_and(|db| db.is_unique_violation());
            return Err(if duplicate { StoreError::Duplicate(order.id) } else { err.into() });
        }

        Self::append_events(&mut tx, events).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get(&self, order_id: Uuid) -> Result<Option<Order>, StoreError> {
        let row: Option<(Json<Order>,)> = sqlx::query_as("SELECT document FROM orders WHERE id = $1")
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(Json(order),)| order))
    }

    async fn save(
        &self,
        order: &Order,
        expected_version: i64,
        events: &[EventEnvelope<OrderEvent>],
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE orders
             SET status = $3, payment_status = $4, payment_reference = $5, intent_reference = $6,
                 hold_expires_at = $7, version = $8, document = $9, updated_at = $10
             WHERE id = $1 AND version = $2",
        )
        .bind(order.id)
        .bind(expected_version)
        .bind(order.status.as_str())
        .bind(order.payment_status.as_str())
        .bind(order.payment_reference.as_deref())
        .bind(intent_reference(order))
        .bind(hold_expiry(order))
        .bind(order.version)
        .bind(Json(order))
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(StoreError::Conflict {
                order_id: order.id,
                expected: expected_version,
            });
        }

        Self::append_events(&mut tx, events).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn find_by_payment_reference(&self, reference: &str) -> Result<Option<Order>, StoreError> {
        let row: Option<(Json<Order>,)> = sqlx::query_as(
            "SELECT document FROM orders
             WHERE payment_reference = $1 OR intent_reference = $1
             LIMIT 1",
        )
        .bind(reference)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(Json(order),)| order))
    }

    async fn list(&self, query: &OrderQuery) -> Result<OrderPage, StoreError> {
        let (placed_by, sold_by) = match query.scope {
            OrderScope::All => (None, None),
            OrderScope::PlacedBy(user_id) => (Some(user_id), None),
            OrderScope::SoldBy(seller_id) => (None, Some(seller_id)),
        };
        let status = query.status.map(|status| status.as_str());

        const FILTER: &str = "($1::uuid IS NULL OR user_id = $1)
             AND ($2::uuid IS NULL OR $2 = ANY(sellers))
             AND ($3::text IS NULL OR status = $3)";

        let (total,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM orders WHERE {FILTER}"))
            .bind(placed_by)
            .bind(sold_by)
            .bind(status)
            .fetch_one(&self.pool)
            .await?;

        let rows: Vec<(Json<Order>,)> = sqlx::query_as(&format!(
            "SELECT document FROM orders WHERE {FILTER}
             ORDER BY created_at DESC, id DESC
             LIMIT $4 OFFSET $5"
        ))
        .bind(placed_by)
        .bind(sold_by)
        .bind(status)
        .bind(i64::from(query.limit))
        .bind(query.offset() as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(OrderPage {
            orders: rows.into_iter().map(|(Json(order),)| order).collect(),
            total: total.max(0) as u64,
        })
    }

    async fn find_expired_holds(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Order>, StoreError> {
        let rows: Vec<(Json<Order>,)> = sqlx::query_as(
            "SELECT document FROM orders
             WHERE hold_expires_at IS NOT NULL AND hold_expires_at <= $1
             ORDER BY hold_expires_at
             LIMIT $2",
        )
        .bind(now)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(Json(order),)| order).collect())
    }

    async fn history(&self, order_id: Uuid) -> Result<OrderHistory, StoreError> {
        let rows: Vec<EventRow> = sqlx::query_as(
            "SELECT event_id, order_id, sequence_number, event_type, correlation_id, actor_id, payload, recorded_at
             FROM order_events
             WHERE order_id = $1
             ORDER BY sequence_number",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(
                |(event_id, aggregate_id, sequence_number, event_type, correlation_id, actor_id, Json(event_data), recorded_at)| {
                    EventEnvelope {
                        event_id,
                        aggregate_id,
                        sequence_number,
                        event_type,
                        event_data,
                        correlation_id,
                        actor_id,
                        recorded_at,
                    }
                },
            )
            .collect())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
