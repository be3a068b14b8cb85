use std::sync::Arc;
use uuid::Uuid;

use crate::domain::inventory::InventoryError;
use crate::event_sourcing::{Aggregate, EventEnvelope};
use crate::store::{OrderRepository, StoreError};

use super::aggregate::Order;
use super::commands::OrderCommand;
use super::errors::OrderError;
use super::events::OrderEvent;

// ============================================================================
// Order Command Handler
// ============================================================================
//
// Orchestrates: Command → Aggregate → Events → Versioned document write
//
// A command that produces no events (an idempotent replay) writes nothing.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error(transparent)]
    Rejected(#[from] OrderError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// Released stock could not be returned; nothing was written
    #[error("stock release failed: {0}")]
    Stock(InventoryError),
}

/// Outcome of a command applied to a stored order
#[derive(Debug)]
pub struct Executed {
    pub order: Order,
    pub events: Vec<OrderEvent>,
}

pub struct OrderCommandHandler {
    repository: Arc<dyn OrderRepository>,
}

impl OrderCommandHandler {
    pub fn new(repository: Arc<dyn OrderRepository>) -> Self {
        Self { repository }
    }

    pub fn repository(&self) -> &Arc<dyn OrderRepository> {
        &self.repository
    }

    /// Create and persist a new order from a `PlaceOrder` command
    pub async fn place(
        &self,
        command: &OrderCommand,
        correlation_id: Uuid,
        actor_id: Option<Uuid>,
    ) -> Result<Order, CommandError> {
        let (order, events) = Order::place(command)?;
        let envelopes = wrap(order.id, 0, events, correlation_id, actor_id);

        self.repository.insert(&order, &envelopes).await?;

        tracing::debug!(
            order_id = %order.id,
            version = order.version,
            "Order persisted"
        );
        Ok(order)
    }

    /// Handle a command against an already loaded order and persist the
    /// resulting events, guarded by the version the order was loaded at
    pub async fn execute(
        &self,
        order: Order,
        command: &OrderCommand,
        correlation_id: Uuid,
        actor_id: Option<Uuid>,
    ) -> Result<Executed, CommandError> {
        let prepared = self.prepare(order, command)?;
        self.commit(prepared, correlation_id, actor_id).await
    }

    /// Handle a command and apply its events in memory without writing.
    ///
    /// Lets a caller act on the events (return stock, say) before they are
    /// committed.
    pub fn prepare(&self, mut order: Order, command: &OrderCommand) -> Result<Prepared, CommandError> {
        let expected_version = order.version();
        let events = order.execute(command)?;
        Ok(Prepared { order, events, expected_version })
    }

    /// Persist a prepared command, guarded by the version the order was
    /// loaded at. A command that produced no events writes nothing.
    pub async fn commit(
        &self,
        prepared: Prepared,
        correlation_id: Uuid,
        actor_id: Option<Uuid>,
    ) -> Result<Executed, CommandError> {
        let Prepared { order, events, expected_version } = prepared;
        if events.is_empty() {
            return Ok(Executed { order, events });
        }

        let envelopes = wrap(order.id, expected_version, events.clone(), correlation_id, actor_id);
        self.repository.save(&order, expected_version, &envelopes).await?;

        tracing::debug!(
            order_id = %order.id,
            from_version = expected_version,
            to_version = order.version,
            events = events.len(),
            "Order updated"
        );
        Ok(Executed { order, events })
    }
}

/// A handled command whose events are applied but not yet stored
#[derive(Debug)]
pub struct Prepared {
    order: Order,
    events: Vec<OrderEvent>,
    expected_version: i64,
}

impl Prepared {
    pub fn events(&self) -> &[OrderEvent] {
        &self.events
    }

    pub fn order(&self) -> &Order {
        &self.order
    }
}

fn wrap(
    order_id: Uuid,
    from_version: i64,
    events: Vec<OrderEvent>,
    correlation_id: Uuid,
    actor_id: Option<Uuid>,
) -> Vec<EventEnvelope<OrderEvent>> {
    events
        .into_iter()
        .zip(from_version + 1..)
        .map(|(event, seq)| EventEnvelope::new(order_id, seq, event, correlation_id).with_actor(actor_id))
        .collect()
}
