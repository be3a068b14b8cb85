use serde::Serialize;
use uuid::Uuid;

use crate::domain::identity::{Principal, Role};
use crate::domain::money::Money;
use super::aggregate::Order;
use super::value_objects::{OrderStatus, PaymentMethod, PaymentStatus};

// ============================================================================
// Read Views - computed on read, never persisted
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSummary {
    pub order_id: Uuid,
    pub total_price: Money,
    pub total_items: u32,
    pub status: OrderStatus,
}

impl From<&Order> for OrderSummary {
    fn from(order: &Order) -> Self {
        Self {
            order_id: order.id,
            total_price: order.total_price,
            total_items: order.total_quantity,
            status: order.status,
        }
    }
}

/// Order as seen by one seller: only their lines, plus their share of totals
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SellerOrderView {
    #[serde(flatten)]
    pub order: Order,
    pub seller_total_price: Money,
    pub seller_total_quantity: u32,
    pub is_partial_order: bool,
}

impl SellerOrderView {
    pub fn new(order: &Order, seller_id: Uuid) -> Self {
        let mut filtered = order.clone();
        filtered.items.retain(|item| item.seller_id == seller_id);

        Self {
            seller_total_price: filtered.items.iter().map(|item| item.line_total()).sum(),
            seller_total_quantity: filtered.items.iter().map(|item| item.quantity).sum(),
            is_partial_order: order.sellers.len() > 1,
            order: filtered,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FullOrderView {
    #[serde(flatten)]
    pub order: Order,
    pub order_summary: OrderSummary,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum OrderView {
    Full(FullOrderView),
    Seller(SellerOrderView),
}

impl OrderView {
    /// Shape an order for `principal`; sellers only see their own lines
    pub fn for_principal(order: &Order, principal: &Principal) -> Self {
        match principal.role {
            Role::Seller => OrderView::Seller(SellerOrderView::new(order, principal.user_id)),
            Role::Admin | Role::User => OrderView::Full(FullOrderView {
                order_summary: OrderSummary::from(order),
                order: order.clone(),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStatusView {
    pub order_id: Uuid,
    pub payment_status: PaymentStatus,
    pub payment_method: PaymentMethod,
    pub payment_reference: Option<String>,
    pub order_status: OrderStatus,
    pub total_price: Money,
}

impl From<&Order> for PaymentStatusView {
    fn from(order: &Order) -> Self {
        Self {
            order_id: order.id,
            payment_status: order.payment_status,
            payment_method: order.payment_method,
            payment_reference: order.payment_reference.clone(),
            order_status: order.status,
            total_price: order.total_price,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::aggregate::tests::{item, place};

    #[test]
    fn test_seller_view_filters_items_and_totals() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let order = place(
            Uuid::new_v4(),
            vec![item(a, 2, 500), item(b, 1, 300)],
            PaymentMethod::CreditCard,
        );

        let view = SellerOrderView::new(&order, a);
        assert_eq!(view.order.items.len(), 1);
        assert_eq!(view.seller_total_price, Money::cents(1000));
        assert_eq!(view.seller_total_quantity, 2);
        assert!(view.is_partial_order);
        // whole-order totals stay as placed
        assert_eq!(view.order.total_price, Money::cents(1300));

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["sellerTotalPrice"], 1000);
        assert_eq!(json["items"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_full_view_carries_summary() {
        let user = Uuid::new_v4();
        let order = place(user, vec![item(Uuid::new_v4(), 3, 100)], PaymentMethod::CashOnDelivery);

        let json = serde_json::to_value(OrderView::for_principal(&order, &Principal::user(user))).unwrap();
        assert_eq!(json["orderSummary"]["totalItems"], 3);
        assert_eq!(json["status"], "pending");
        assert_eq!(json["paymentStatus"], "paid");
    }
}
