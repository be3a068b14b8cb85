use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::identity::Role;
use crate::domain::inventory::StockLine;
use crate::event_sourcing::DomainEvent;
use super::value_objects::*;

// ============================================================================
// Order Events - Domain Events for the Order Aggregate
// ============================================================================
//
// Events that move stock carry the exact lines they moved, so the history of
// an order explains every change to the ledger it caused.
//
// ============================================================================

/// Order Event - Union type for all order events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    Placed(OrderPlaced),
    StatusChanged(OrderStatusChanged),
    Cancelled(OrderCancelled),
    PaymentSucceeded(PaymentSucceeded),
    PaymentFailed(PaymentFailed),
    Refunded(PaymentRefunded),
    HoldLapsed(HoldLapsed),
}

impl DomainEvent for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::Placed(_) => "OrderPlaced",
            OrderEvent::StatusChanged(_) => "OrderStatusChanged",
            OrderEvent::Cancelled(_) => "OrderCancelled",
            OrderEvent::PaymentSucceeded(_) => "PaymentSucceeded",
            OrderEvent::PaymentFailed(_) => "PaymentFailed",
            OrderEvent::Refunded(_) => "PaymentRefunded",
            OrderEvent::HoldLapsed(_) => "StockHoldLapsed",
        }
    }
}

// ============================================================================
// Individual Event Types
// ============================================================================

/// Order Placed - stock for every item is already reserved
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct OrderPlaced {
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub cart_id: Uuid,
    pub items: Vec<OrderItem>,
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub payment_reference: Option<String>,
    pub stock_hold: StockHold,
    pub placed_at: DateTime<Utc>,
}

/// Order Status Changed - confirm, ship or deliver
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct OrderStatusChanged {
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub changed_by: Role,
    pub changed_at: DateTime<Utc>,
}

/// Order Cancelled - whole order or one seller's share of it
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct OrderCancelled {
    pub from: OrderStatus,
    pub resulting_status: OrderStatus,
    /// Products whose lines are now cancelled
    pub cancelled_products: Vec<Uuid>,
    /// Units that must go back to the ledger
    pub released: Vec<StockLine>,
    pub cancelled_by: Role,
    pub cancelled_at: DateTime<Utc>,
}

/// Payment Succeeded - checkout completed or intent succeeded
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSucceeded {
    pub details: PaymentDetails,
    /// Units taken from the ledger again because the hold had lapsed
    pub reacquired: Vec<StockLine>,
    pub hold_committed: bool,
    pub paid_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PaymentFailed {
    pub reason: Option<String>,
    pub failed_at: DateTime<Utc>,
}

/// Payment Refunded - every unit still held goes back to stock
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRefunded {
    pub released: Vec<StockLine>,
    pub refunded_at: DateTime<Utc>,
}

/// Stock Hold Lapsed - unpaid past its expiry, reservation returned
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct HoldLapsed {
    pub released: Vec<StockLine>,
    pub lapsed_at: DateTime<Utc>,
}

impl OrderEvent {
    /// Units this event returns to the ledger
    pub fn released_lines(&self) -> &[StockLine] {
        match self {
            OrderEvent::Cancelled(e) => &e.released,
            OrderEvent::Refunded(e) => &e.released,
            OrderEvent::HoldLapsed(e) => &e.released,
            _ => &[],
        }
    }
}
