// ============================================================================
// Application Services
// ============================================================================
//
// Orchestration over the domain and the stores:
// - cart:                   the user's pending selection
// - order_lifecycle:        cart -> order, status changes, cancellation, reads
// - payment_reconciliation: provider callbacks and expired stock holds
//
// Multi-step operations compensate stock before returning an error.
//
// ============================================================================

use std::sync::Arc;
use uuid::Uuid;

use crate::domain::inventory::{release_exactly, reserve_all, InventoryLedger, ProductCatalog, StockLine};
use crate::domain::order::{CommandError, Executed, Order, OrderCommand, OrderCommandHandler, OrderEvent};
use crate::metrics::Metrics;
use crate::store::{CartStore, OrderRepository};

pub mod cart;
pub mod order_lifecycle;
pub mod payment_reconciliation;

pub use cart::{CartService, CartView};
pub use order_lifecycle::{CreateOrder, OrderLifecycleService, OrderListing, Pagination, PlacedOrder};
pub use payment_reconciliation::{PaymentReconciler, Reconciliation};

/// The storage contracts every service is built from
#[derive(Clone)]
pub struct Backends {
    pub ledger: Arc<dyn InventoryLedger>,
    pub catalog: Arc<dyn ProductCatalog>,
    pub carts: Arc<dyn CartStore>,
    pub orders: Arc<dyn OrderRepository>,
}

impl Backends {
    /// All four contracts served by one backend
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: InventoryLedger + ProductCatalog + CartStore + OrderRepository + 'static,
    {
        Self {
            ledger: store.clone(),
            catalog: store.clone(),
            carts: store.clone(),
            orders: store,
        }
    }
}

/// Run a command whose events may return stock to the ledger.
///
/// The stock is released before the order is written, so a release that
/// fails leaves the stored order untouched and the command can be retried.
/// If the write then fails (a lost version race, say) the released units are
/// reserved again before the error is returned.
pub(crate) async fn execute_releasing(
    handler: &OrderCommandHandler,
    ledger: &dyn InventoryLedger,
    metrics: &Metrics,
    order: Order,
    command: &OrderCommand,
    actor_id: Option<Uuid>,
) -> Result<Executed, CommandError> {
    let prepared = handler.prepare(order, command)?;
    let order_id = prepared.order().id;
    let (reason, lines) = released_stock(prepared.events());

    if !lines.is_empty() {
        if let Err(err) = release_exactly(ledger, &lines).await {
            metrics.record_compensation(reason, false);
            tracing::error!(
                order_id = %order_id,
                reason = reason,
                lines = lines.len(),
                error = %err,
                "Stock could not be returned, order left unchanged"
            );
            return Err(CommandError::Stock(err));
        }
    }

    match handler.commit(prepared, Uuid::new_v4(), actor_id).await {
        Ok(executed) => {
            if !lines.is_empty() {
                let units: u64 = lines.iter().map(|line| u64::from(line.quantity)).sum();
                metrics.record_units_released(reason, units);
                tracing::info!(order_id = %order_id, reason = reason, units = units, "Stock returned to ledger");
            }
            Ok(executed)
        }
        Err(err) => {
            if !lines.is_empty() {
                let taken_back = reserve_all(ledger, &lines).await;
                metrics.record_compensation(reason, taken_back.is_ok());
                match taken_back {
                    Ok(()) => tracing::warn!(
                        order_id = %order_id,
                        reason = reason,
                        error = %err,
                        "Order write failed, released stock taken back"
                    ),
                    Err(take_back) => tracing::error!(
                        order_id = %order_id,
                        reason = reason,
                        error = %err,
                        take_back_error = %take_back,
                        "Order write failed and released stock could not be taken back"
                    ),
                }
            }
            Err(err)
        }
    }
}

/// Lines returned by a command's events, labelled for metrics
fn released_stock(events: &[OrderEvent]) -> (&'static str, Vec<StockLine>) {
    let mut reason = "lapse";
    let mut lines = Vec::new();

    for event in events {
        let released = event.released_lines();
        if released.is_empty() {
            continue;
        }
        reason = match event {
            OrderEvent::Cancelled(_) => "cancellation",
            OrderEvent::Refunded(_) => "refund",
            _ => "lapse",
        };
        lines.extend_from_slice(released);
    }

    (reason, lines)
}
