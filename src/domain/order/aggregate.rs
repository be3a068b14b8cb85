use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::identity::{Principal, Role};
use crate::domain::inventory::StockLine;
use crate::domain::money::Money;
use crate::event_sourcing::Aggregate;
use super::commands::OrderCommand;
use super::errors::OrderError;
use super::events::*;
use super::transitions::{cancellable_from, global_targets, required_predecessor, role_targets};
use super::value_objects::*;

// ============================================================================
// Order Aggregate - Domain Logic
// ============================================================================
//
// The order document is the fold of its events. Stock bookkeeping lives on
// the document itself:
// - `stock_hold` says whether the placement reservation is still held,
//   committed by payment, or lapsed back to the ledger
// - `released_products` lists products whose units were returned by a
//   cancellation or refund
//
// A line is outstanding (still owned by this order in the ledger) while the
// hold has not lapsed and its product has not been released.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    // Identity
    pub id: Uuid,
    pub version: i64,

    pub user_id: Uuid,
    pub cart_id: Uuid,
    pub items: Vec<OrderItem>,
    pub sellers: BTreeSet<Uuid>,
    pub total_price: Money,
    pub total_quantity: u32,

    pub status: OrderStatus,
    pub shipping_address: ShippingAddress,

    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub payment_reference: Option<String>,
    pub payment_details: Option<PaymentDetails>,

    pub stock_hold: StockHold,
    pub released_products: BTreeSet<Uuid>,

    // Audit Trail
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Validate a `PlaceOrder` command and build the new aggregate
    pub fn place(command: &OrderCommand) -> Result<(Self, Vec<OrderEvent>), OrderError> {
        let OrderCommand::PlaceOrder {
            order_id,
            user_id,
            cart_id,
            items,
            shipping_address,
            payment_method,
            payment_reference,
            hold_expires_at,
        } = command
        else {
            return Err(OrderError::NotInitialized);
        };

        Self::validate_items(items)?;

        let (payment_status, stock_hold) = if payment_method.is_deferred() {
            (PaymentStatus::Pending, StockHold::Held { expires_at: *hold_expires_at })
        } else {
            (PaymentStatus::Paid, StockHold::Committed)
        };

        let event = OrderEvent::Placed(OrderPlaced {
            order_id: *order_id,
            user_id: *user_id,
            cart_id: *cart_id,
            items: items.clone(),
            shipping_address: shipping_address.clone(),
            payment_method: *payment_method,
            payment_status,
            payment_reference: payment_reference.clone(),
            stock_hold,
            placed_at: Utc::now(),
        });

        let order = Self::apply_first_event(&event)?;
        Ok((order, vec![event]))
    }

    fn validate_items(items: &[OrderItem]) -> Result<(), OrderError> {
        if items.is_empty() {
            return Err(OrderError::EmptyItems);
        }

        let mut seen = BTreeSet::new();
        for item in items {
            if item.quantity == 0 {
                return Err(OrderError::InvalidQuantity {
                    product_id: item.product_id,
                    quantity: item.quantity,
                });
            }
            if !seen.insert(item.product_id) {
                return Err(OrderError::DuplicateProduct(item.product_id));
            }
        }

        Ok(())
    }

    pub fn is_owned_by(&self, user_id: Uuid) -> bool {
        self.user_id == user_id
    }

    pub fn contains_seller(&self, seller_id: Uuid) -> bool {
        self.sellers.contains(&seller_id)
    }

    /// Whether `principal` may read this order at all
    pub fn is_visible_to(&self, principal: &Principal) -> bool {
        match principal.role {
            Role::Admin => true,
            Role::Seller => self.contains_seller(principal.user_id),
            Role::User => self.is_owned_by(principal.user_id),
        }
    }

    pub fn seller_items(&self, seller_id: Uuid) -> impl Iterator<Item = &OrderItem> {
        self.items.iter().filter(move |item| item.seller_id == seller_id)
    }

    /// Units this order still holds in the ledger
    pub fn outstanding_lines(&self) -> Vec<StockLine> {
        if self.stock_hold == StockHold::Lapsed {
            return Vec::new();
        }
        self.items
            .iter()
            .filter(|item| !self.released_products.contains(&item.product_id))
            .map(OrderItem::stock_line)
            .collect()
    }

    /// Units to take from the ledger again when a payment lands after the
    /// hold lapsed. Empty when nothing needs re-reserving.
    pub fn lines_to_reacquire(&self) -> Vec<StockLine> {
        let settles = matches!(
            self.payment_status,
            PaymentStatus::Pending | PaymentStatus::Failed
        );
        if self.stock_hold != StockHold::Lapsed || !settles || self.status == OrderStatus::Cancelled {
            return Vec::new();
        }
        self.items
            .iter()
            .filter(|item| !self.released_products.contains(&item.product_id))
            .map(OrderItem::stock_line)
            .collect()
    }

    fn invalid_transition(&self, target: OrderStatus, allowed: &[OrderStatus]) -> OrderError {
        OrderError::InvalidTransition {
            current: self.status,
            target,
            allowed: allowed.to_vec(),
        }
    }

    fn authorize(&self, principal: &Principal, target: OrderStatus) -> Result<(), OrderError> {
        match principal.role {
            Role::Admin => Ok(()),
            Role::Seller if !self.contains_seller(principal.user_id) => {
                Err(OrderError::NotAuthorized("order has no items from this seller"))
            }
            Role::Seller => Ok(()),
            Role::User if target != OrderStatus::Cancelled => {
                Err(OrderError::NotAuthorized("users may only cancel their orders"))
            }
            Role::User if !self.is_owned_by(principal.user_id) => {
                Err(OrderError::NotAuthorized("order belongs to another user"))
            }
            Role::User => Ok(()),
        }
    }

    fn change_status(
        &self,
        target: OrderStatus,
        principal: &Principal,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.authorize(principal, target)?;

        let allowed = role_targets(principal.role, self.status);
        if !global_targets(self.status).contains(&target) || !allowed.contains(&target) {
            return Err(self.invalid_transition(target, allowed));
        }

        if let Some(required) = required_predecessor(target) {
            if self.status != required {
                return Err(self.invalid_transition(target, allowed));
            }
        }

        if principal.role == Role::Seller
            && target == OrderStatus::Delivered
            && self.sellers.len() > 1
        {
            return Err(OrderError::UnsupportedMultiSellerDelivery);
        }

        if target == OrderStatus::Cancelled {
            return self.cancellation(principal);
        }

        Ok(vec![OrderEvent::StatusChanged(OrderStatusChanged {
            from: self.status,
            to: target,
            changed_by: principal.role,
            changed_at: Utc::now(),
        })])
    }

    fn cancel(&self, principal: &Principal) -> Result<Vec<OrderEvent>, OrderError> {
        if self.status.is_terminal() {
            return Err(self.invalid_transition(OrderStatus::Cancelled, global_targets(self.status)));
        }

        self.authorize(principal, OrderStatus::Cancelled)?;

        if !cancellable_from(principal.role).contains(&self.status) {
            return Err(self.invalid_transition(
                OrderStatus::Cancelled,
                role_targets(principal.role, self.status),
            ));
        }

        self.cancellation(principal)
    }

    /// Build the cancellation for an already-authorized principal.
    ///
    /// A seller cancels only their own lines; when other sellers' lines
    /// remain live the order becomes `partially_cancelled`.
    fn cancellation(&self, principal: &Principal) -> Result<Vec<OrderEvent>, OrderError> {
        let live = |item: &&OrderItem| !self.released_products.contains(&item.product_id);

        let cancelled_products: Vec<Uuid> = match principal.role {
            Role::Seller => self
                .seller_items(principal.user_id)
                .filter(live)
                .map(|item| item.product_id)
                .collect(),
            Role::Admin | Role::User => self
                .items
                .iter()
                .filter(live)
                .map(|item| item.product_id)
                .collect(),
        };

        if cancelled_products.is_empty() {
            return Err(self.invalid_transition(OrderStatus::Cancelled, &[]));
        }

        let remaining_live = self
            .items
            .iter()
            .filter(live)
            .any(|item| !cancelled_products.contains(&item.product_id));

        let resulting_status = if remaining_live {
            OrderStatus::PartiallyCancelled
        } else {
            OrderStatus::Cancelled
        };

        let released = self
            .outstanding_lines()
            .into_iter()
            .filter(|line| cancelled_products.contains(&line.product_id))
            .collect();

        Ok(vec![OrderEvent::Cancelled(OrderCancelled {
            from: self.status,
            resulting_status,
            cancelled_products,
            released,
            cancelled_by: principal.role,
            cancelled_at: Utc::now(),
        })])
    }

    fn record_payment_success(
        &self,
        details: &PaymentDetails,
        reacquired: &[StockLine],
    ) -> Vec<OrderEvent> {
        if matches!(self.payment_status, PaymentStatus::Paid | PaymentStatus::Refunded) {
            return Vec::new();
        }

        let hold_committed = match self.stock_hold {
            StockHold::Held { .. } | StockHold::Committed => true,
            StockHold::Lapsed => !reacquired.is_empty(),
        };

        vec![OrderEvent::PaymentSucceeded(PaymentSucceeded {
            details: details.clone(),
            reacquired: reacquired.to_vec(),
            hold_committed,
            paid_at: Utc::now(),
        })]
    }
}

// ============================================================================
// Aggregate Trait Implementation
// ============================================================================

impl Aggregate for Order {
    type Event = OrderEvent;
    type Command = OrderCommand;
    type Error = OrderError;

    fn apply_first_event(event: &Self::Event) -> Result<Self, Self::Error> {
        match event {
            OrderEvent::Placed(e) => {
                let sellers = e.items.iter().map(|item| item.seller_id).collect();
                let total_price = e.items.iter().map(OrderItem::line_total).sum();
                let total_quantity = e.items.iter().map(|item| item.quantity).sum();

                Ok(Self {
                    id: e.order_id,
                    version: 1,
                    user_id: e.user_id,
                    cart_id: e.cart_id,
                    items: e.items.clone(),
                    sellers,
                    total_price,
                    total_quantity,
                    status: OrderStatus::Pending,
                    shipping_address: e.shipping_address.clone(),
                    payment_method: e.payment_method,
                    payment_status: e.payment_status,
                    payment_reference: e.payment_reference.clone(),
                    payment_details: None,
                    stock_hold: e.stock_hold,
                    released_products: BTreeSet::new(),
                    created_at: e.placed_at,
                    updated_at: e.placed_at,
                    paid_at: (e.payment_status == PaymentStatus::Paid).then_some(e.placed_at),
                    shipped_at: None,
                    delivered_at: None,
                    cancelled_at: None,
                })
            }
            _ => Err(OrderError::NotInitialized),
        }
    }

    fn apply_event(&mut self, event: &Self::Event) -> Result<(), Self::Error> {
        let at = match event {
            OrderEvent::Placed(_) => return Err(OrderError::AlreadyPlaced),
            OrderEvent::StatusChanged(e) => {
                self.status = e.to;
                match e.to {
                    OrderStatus::Shipped => self.shipped_at = Some(e.changed_at),
                    OrderStatus::Delivered => self.delivered_at = Some(e.changed_at),
                    _ => {}
                }
                e.changed_at
            }
            OrderEvent::Cancelled(e) => {
                self.status = e.resulting_status;
                self.released_products.extend(e.cancelled_products.iter().copied());
                if e.resulting_status == OrderStatus::Cancelled {
                    self.cancelled_at = Some(e.cancelled_at);
                }
                e.cancelled_at
            }
            OrderEvent::PaymentSucceeded(e) => {
                self.payment_status = PaymentStatus::Paid;
                self.payment_details = Some(e.details.clone());
                if e.hold_committed {
                    self.stock_hold = StockHold::Committed;
                }
                self.paid_at = Some(e.paid_at);
                e.paid_at
            }
            OrderEvent::PaymentFailed(e) => {
                self.payment_status = PaymentStatus::Failed;
                e.failed_at
            }
            OrderEvent::Refunded(e) => {
                self.payment_status = PaymentStatus::Refunded;
                self.released_products.extend(e.released.iter().map(|line| line.product_id));
                e.refunded_at
            }
            OrderEvent::HoldLapsed(e) => {
                self.stock_hold = StockHold::Lapsed;
                e.lapsed_at
            }
        };

        self.version += 1;
        self.updated_at = at;
        Ok(())
    }

    fn handle_command(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            OrderCommand::PlaceOrder { .. } => Err(OrderError::AlreadyPlaced),

            OrderCommand::ChangeStatus { target, principal } => {
                self.change_status(*target, principal)
            }

            OrderCommand::Cancel { principal } => self.cancel(principal),

            OrderCommand::RecordPaymentSuccess { details, reacquired } => {
                Ok(self.record_payment_success(details, reacquired))
            }

            OrderCommand::RecordPaymentFailure { reason } => {
                // Only an unsettled payment can fail
                if self.payment_status != PaymentStatus::Pending {
                    return Ok(Vec::new());
                }
                Ok(vec![OrderEvent::PaymentFailed(PaymentFailed {
                    reason: reason.clone(),
                    failed_at: Utc::now(),
                })])
            }

            OrderCommand::RecordRefund => {
                if self.payment_status == PaymentStatus::Refunded {
                    return Ok(Vec::new());
                }
                Ok(vec![OrderEvent::Refunded(PaymentRefunded {
                    released: self.outstanding_lines(),
                    refunded_at: Utc::now(),
                })])
            }

            OrderCommand::LapseHold { now } => {
                if !self.stock_hold.is_expired(*now) || self.payment_status == PaymentStatus::Paid {
                    return Ok(Vec::new());
                }
                Ok(vec![OrderEvent::HoldLapsed(HoldLapsed {
                    released: self.outstanding_lines(),
                    lapsed_at: *now,
                })])
            }
        }
    }

    fn aggregate_id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
