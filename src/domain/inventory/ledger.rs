use async_trait::async_trait;
use uuid::Uuid;

use crate::utils::{retry_with_backoff, RetryConfig};
use super::errors::InventoryError;
use super::value_objects::{Product, StockLine};

// ============================================================================
// Inventory Ledger - authoritative stock counter per product
// ============================================================================
//
// A reservation is an immediate, committed decrement. `reserve` must be an
// atomic conditional decrement: it succeeds only if the resulting stock is
// non-negative and otherwise leaves the counter untouched. `release` is a
// plain increment and is always safe to retry.
//
// ============================================================================

#[async_trait]
pub trait InventoryLedger: Send + Sync {
    /// Decrement stock by `quantity` if enough is available.
    /// Returns the stock remaining after the decrement.
    async fn reserve(&self, product_id: Uuid, quantity: u32) -> Result<u64, InventoryError>;

    /// Return `quantity` units to stock. Returns the new stock level.
    async fn release(&self, product_id: Uuid, quantity: u32) -> Result<u64, InventoryError>;

    async fn stock_of(&self, product_id: Uuid) -> Result<u64, InventoryError>;
}

/// Catalog lookups consumed by cart and order creation
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn find_product(&self, product_id: Uuid) -> Result<Option<Product>, InventoryError>;

    /// Insert or replace a catalog entry, stock included. Used for seeding.
    async fn upsert_product(&self, product: &Product) -> Result<(), InventoryError>;
}

/// Reserve every line or none of them.
///
/// On the first failure, everything reserved by this call is released again
/// before the error is returned.
pub async fn reserve_all(
    ledger: &dyn InventoryLedger,
    lines: &[StockLine],
) -> Result<(), InventoryError> {
    let mut reserved: Vec<StockLine> = Vec::with_capacity(lines.len());

    for line in lines {
        if line.quantity == 0 {
            compensate(ledger, &reserved).await;
            return Err(InventoryError::InvalidQuantity(line.quantity));
        }

        match ledger.reserve(line.product_id, line.quantity).await {
            Ok(remaining) => {
                tracing::debug!(
                    product_id = %line.product_id,
                    quantity = line.quantity,
                    remaining = remaining,
                    "Reserved stock"
                );
                reserved.push(*line);
            }
            Err(err) => {
                tracing::warn!(
                    product_id = %line.product_id,
                    quantity = line.quantity,
                    already_reserved = reserved.len(),
                    error = %err,
                    "Reservation failed, compensating earlier lines"
                );
                compensate(ledger, &reserved).await;
                return Err(err);
            }
        }
    }

    Ok(())
}

/// Give back the lines a failed `reserve_all` already took. The caller keeps
/// the reservation error; a compensation failure is only logged.
async fn compensate(ledger: &dyn InventoryLedger, reserved: &[StockLine]) {
    if let Err(err) = release_all(ledger, reserved).await {
        tracing::error!(
            lines = reserved.len(),
            error = %err,
            "Compensating release failed after a rejected reservation"
        );
    }
}

/// Release every line or none of them.
///
/// Each increment is retried with backoff. If a line still fails, the lines
/// already released by this call are reserved again and the release error is
/// returned, so the caller can retry the whole set later.
pub async fn release_exactly(
    ledger: &dyn InventoryLedger,
    lines: &[StockLine],
) -> Result<(), InventoryError> {
    let mut released: Vec<StockLine> = Vec::with_capacity(lines.len());

    for line in lines {
        let outcome = retry_with_backoff(RetryConfig::compensation(), |_attempt| {
            ledger.release(line.product_id, line.quantity)
        })
        .await
        .into_result();

        match outcome {
            Ok(_) => released.push(*line),
            Err(err) => {
                tracing::warn!(
                    product_id = %line.product_id,
                    quantity = line.quantity,
                    already_released = released.len(),
                    error = %err,
                    "Stock release failed, taking back earlier lines"
                );
                if let Err(take_back) = reserve_all(ledger, &released).await {
                    tracing::error!(
                        lines = released.len(),
                        error = %take_back,
                        "Could not take back released stock, units need manual reconciliation"
                    );
                }
                return Err(err);
            }
        }
    }

    Ok(())
}

/// Release every line, retrying each increment with backoff.
///
/// Lines are independent: a line that still fails after all retries does not
/// stop the remaining lines from being released. The first such failure is
/// returned once every line has been attempted.
pub async fn release_all(
    ledger: &dyn InventoryLedger,
    lines: &[StockLine],
) -> Result<(), InventoryError> {
    let mut first_failure = None;

    for line in lines {
        let outcome = retry_with_backoff(RetryConfig::compensation(), |_attempt| {
            ledger.release(line.product_id, line.quantity)
        })
        .await
        .into_result();

        if let Err(err) = outcome {
            tracing::error!(
                product_id = %line.product_id,
                quantity = line.quantity,
                error = %err,
                "Stock release failed, units need manual reconciliation"
            );
            first_failure.get_or_insert(err);
        }
    }

    match first_failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;

    #[tokio::test]
    async fn test_reserve_all_is_all_or_nothing() {
        let store = InMemoryStore::new();
        let a = store.seed_product("A", 500, 5, Some(Uuid::new_v4())).await;
        let b = store.seed_product("B", 700, 1, Some(Uuid::new_v4())).await;

        let lines = [StockLine::new(a, 2), StockLine::new(b, 3)];
        let result = reserve_all(&store, &lines).await;

        assert!(matches!(
            result,
            Err(InventoryError::InsufficientStock { available: 1, requested: 3, .. })
        ));
        assert_eq!(store.stock_of(a).await.unwrap(), 5);
        assert_eq!(store.stock_of(b).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_reserve_all_unknown_product_compensates() {
        let store = InMemoryStore::new();
        let a = store.seed_product("A", 500, 4, Some(Uuid::new_v4())).await;
        let missing = Uuid::new_v4();

        let result = reserve_all(&store, &[StockLine::new(a, 4), StockLine::new(missing, 1)]).await;

        assert!(matches!(result, Err(InventoryError::ProductNotFound(id)) if id == missing));
        assert_eq!(store.stock_of(a).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_reserve_all_keeps_shortage_when_compensation_fails() {
        let store = InMemoryStore::new();
        let a = store.seed_product("A", 500, 5, Some(Uuid::new_v4())).await;
        let b = store.seed_product("B", 700, 1, Some(Uuid::new_v4())).await;

        store.fail_next_releases(100);
        let result = reserve_all(&store, &[StockLine::new(a, 2), StockLine::new(b, 3)]).await;
        store.fail_next_releases(0);

        assert!(matches!(
            result,
            Err(InventoryError::InsufficientStock { available: 1, requested: 3, .. })
        ));
    }

    #[tokio::test]
    async fn test_release_exactly_takes_back_on_failure() {
        let store = InMemoryStore::new();
        let a = store.seed_product("A", 500, 0, Some(Uuid::new_v4())).await;
        let missing = Uuid::new_v4();

        let result = release_exactly(&store, &[StockLine::new(a, 2), StockLine::new(missing, 1)]).await;

        assert!(matches!(result, Err(InventoryError::ProductNotFound(id)) if id == missing));
        assert_eq!(store.stock_of(a).await.unwrap(), 0);

        release_exactly(&store, &[StockLine::new(a, 2)]).await.unwrap();
        assert_eq!(store.stock_of(a).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_release_all_returns_quantities() {
        let store = InMemoryStore::new();
        let a = store.seed_product("A", 500, 0, Some(Uuid::new_v4())).await;

        release_all(&store, &[StockLine::new(a, 3)]).await.unwrap();
        assert_eq!(store.stock_of(a).await.unwrap(), 3);
    }
}
