use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::identity::Principal;
use crate::domain::inventory::StockLine;
use super::value_objects::*;

// ============================================================================
// Order Commands - Represent intent
// ============================================================================

#[derive(Debug, Clone)]
pub enum OrderCommand {
    /// Stock for `items` must already be reserved by the caller
    PlaceOrder {
        order_id: Uuid,
        user_id: Uuid,
        cart_id: Uuid,
        items: Vec<OrderItem>,
        shipping_address: ShippingAddress,
        payment_method: PaymentMethod,
        payment_reference: Option<String>,
        /// Expiry of the hold for deferred payment methods
        hold_expires_at: DateTime<Utc>,
    },
    ChangeStatus {
        target: OrderStatus,
        principal: Principal,
    },
    Cancel {
        principal: Principal,
    },
    /// `reacquired` lists units the caller took from the ledger again
    /// because the hold had lapsed
    RecordPaymentSuccess {
        details: PaymentDetails,
        reacquired: Vec<StockLine>,
    },
    RecordPaymentFailure {
        reason: Option<String>,
    },
    RecordRefund,
    LapseHold {
        now: DateTime<Utc>,
    },
}
