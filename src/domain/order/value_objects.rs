use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::inventory::StockLine;
use crate::domain::money::Money;

// ============================================================================
// Order Value Objects
// ============================================================================

/// Line item snapshotted from the catalog at placement; immutable afterwards
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product_id: Uuid,
    pub seller_id: Uuid,
    pub quantity: u32,
    pub unit_price: Money,
    pub title: String,
    pub thumbnail: String,
}

impl OrderItem {
    pub fn line_total(&self) -> Money {
        self.unit_price * self.quantity
    }

    pub fn stock_line(&self) -> StockLine {
        StockLine::new(self.product_id, self.quantity)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Shipped,
    Delivered,
    Cancelled,
    PartiallyCancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
        OrderStatus::PartiallyCancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::PartiallyCancelled => "partially_cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == value)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    CreditCard,
    DebitCard,
    #[serde(alias = "stripe")]
    OnlineGateway,
    CashOnDelivery,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::CreditCard => "credit_card",
            PaymentMethod::DebitCard => "debit_card",
            PaymentMethod::OnlineGateway => "online_gateway",
            PaymentMethod::CashOnDelivery => "cash_on_delivery",
        }
    }

    /// Settled later by a provider callback rather than at placement
    pub fn is_deferred(&self) -> bool {
        !matches!(self, PaymentMethod::CashOnDelivery)
    }

    pub fn is_card(&self) -> bool {
        matches!(self, PaymentMethod::CreditCard | PaymentMethod::DebitCard)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddress {
    pub street: String,
    pub city: String,
    pub state: String,
    pub country: String,
    pub zip_code: String,
}

impl ShippingAddress {
    /// Field-level problems, empty when the address is usable
    pub fn problems(&self) -> Vec<String> {
        let fields = [
            ("street", &self.street, 200),
            ("city", &self.city, 100),
            ("state", &self.state, 100),
            ("country", &self.country, 100),
            ("zipCode", &self.zip_code, 20),
        ];

        let mut problems = Vec::new();
        for (name, value, max) in fields {
            let len = value.trim().chars().count();
            if len == 0 {
                problems.push(format!("shippingAddress.{name} is required"));
            } else if len > max {
                problems.push(format!("shippingAddress.{name} cannot exceed {max} characters"));
            }
        }
        problems
    }
}

/// Settlement metadata reported by the payment provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentDetails {
    pub amount: Option<Money>,
    pub currency: Option<String>,
    pub method: Option<String>,
    pub last4: Option<String>,
    pub brand: Option<String>,
    pub receipt_url: Option<String>,
    /// Provider intent reference, when it differs from the stored session reference
    pub intent_reference: Option<String>,
}

/// Lifecycle of the stock reserved at placement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum StockHold {
    /// Reserved for a deferred payment until `expires_at`
    Held {
        #[serde(rename = "expiresAt")]
        expires_at: DateTime<Utc>,
    },
    /// Payment settled (or cash on delivery); the decrement is final
    Committed,
    /// Expired unpaid; the reserved units went back to the ledger
    Lapsed,
}

impl StockHold {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self, StockHold::Held { expires_at } if *expires_at <= now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_names() {
        let json = serde_json::to_string(&OrderStatus::PartiallyCancelled).unwrap();
        assert_eq!(json, "\"partially_cancelled\"");
        assert_eq!(OrderStatus::parse("shipped"), Some(OrderStatus::Shipped));
        assert_eq!(OrderStatus::parse("refunded"), None);
    }

    #[test]
    fn test_payment_method_accepts_legacy_gateway_name() {
        let method: PaymentMethod = serde_json::from_str("\"stripe\"").unwrap();
        assert_eq!(method, PaymentMethod::OnlineGateway);
        assert!(method.is_deferred());
        assert!(!PaymentMethod::CashOnDelivery.is_deferred());
    }

    #[test]
    fn test_shipping_address_problems() {
        let address = ShippingAddress {
            street: "1 Main St".to_string(),
            city: " ".to_string(),
            state: "CA".to_string(),
            country: "US".to_string(),
            zip_code: "9".repeat(21),
        };

        let problems = address.problems();
        assert_eq!(problems.len(), 2);
        assert!(problems[0].contains("city"));
        assert!(problems[1].contains("zipCode"));
    }

    #[test]
    fn test_stock_hold_expiry() {
        let now = Utc::now();
        let held = StockHold::Held { expires_at: now };
        assert!(held.is_expired(now));
        assert!(!StockHold::Committed.is_expired(now));

        let json = serde_json::to_value(held).unwrap();
        assert_eq!(json["state"], "held");
        assert!(json.get("expiresAt").is_some());
    }
}
