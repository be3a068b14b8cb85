use std::collections::HashMap;

use serde::Deserialize;
use uuid::Uuid;

use crate::domain::money::Money;
use crate::domain::order::PaymentDetails;
use super::PaymentError;

// ============================================================================
// Provider Callback Events
// ============================================================================
//
// Wire format: {"id": "...", "type": "...", "data": {"object": {...}}}
// Amounts are in minor units. Event types outside the four we act on are
// acknowledged and ignored.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentEventKind {
    CheckoutCompleted,
    PaymentSucceeded,
    PaymentFailed,
    ChargeRefunded,
}

impl PaymentEventKind {
    pub fn from_type(event_type: &str) -> Option<Self> {
        match event_type {
            "checkout.session.completed" => Some(Self::CheckoutCompleted),
            "payment_intent.succeeded" => Some(Self::PaymentSucceeded),
            "payment_intent.payment_failed" => Some(Self::PaymentFailed),
            "charge.refunded" => Some(Self::ChargeRefunded),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CheckoutCompleted => "checkout_completed",
            Self::PaymentSucceeded => "payment_succeeded",
            Self::PaymentFailed => "payment_failed",
            Self::ChargeRefunded => "charge_refunded",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PaymentEvent {
    pub event_id: String,
    pub kind: PaymentEventKind,
    /// Provider reference used to find the order
    pub reference: String,
    /// Order id carried in the provider metadata, if any
    pub order_hint: Option<Uuid>,
    pub details: PaymentDetails,
    pub failure_reason: Option<String>,
}

#[derive(Debug, Clone)]
pub enum ParsedEvent {
    Payment(PaymentEvent),
    Ignored { event_id: String, event_type: String },
}

// ============================================================================
// Raw provider shapes
// ============================================================================

#[derive(Deserialize)]
struct RawEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: RawData,
}

#[derive(Deserialize)]
struct RawData {
    object: serde_json::Value,
}

#[derive(Deserialize)]
struct CheckoutSessionObject {
    id: String,
    payment_intent: Option<String>,
    amount_total: Option<i64>,
    currency: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

#[derive(Deserialize)]
struct PaymentIntentObject {
    id: String,
    amount: Option<i64>,
    amount_received: Option<i64>,
    currency: Option<String>,
    #[serde(default)]
    payment_method_types: Vec<String>,
    charges: Option<ChargeList>,
    last_payment_error: Option<LastPaymentError>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

#[derive(Deserialize)]
struct ChargeList {
    #[serde(default)]
    data: Vec<ChargeObject>,
}

#[derive(Deserialize)]
struct ChargeObject {
    id: String,
    payment_intent: Option<String>,
    amount_refunded: Option<i64>,
    currency: Option<String>,
    receipt_url: Option<String>,
    payment_method_details: Option<PaymentMethodDetails>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

#[derive(Deserialize)]
struct PaymentMethodDetails {
    card: Option<CardDetails>,
}

#[derive(Deserialize)]
struct CardDetails {
    last4: Option<String>,
    brand: Option<String>,
}

#[derive(Deserialize)]
struct LastPaymentError {
    message: Option<String>,
    code: Option<String>,
}

fn order_hint(metadata: &HashMap<String, String>) -> Option<Uuid> {
    metadata
        .get("orderId")
        .or_else(|| metadata.get("order_id"))
        .and_then(|raw| Uuid::parse_str(raw).ok())
}

fn object<T: for<'de> Deserialize<'de>>(value: serde_json::Value) -> Result<T, PaymentError> {
    serde_json::from_value(value).map_err(|e| PaymentError::MalformedPayload(e.to_string()))
}

/// Parse a verified webhook body
pub fn parse_event(body: &[u8]) -> Result<ParsedEvent, PaymentError> {
    let raw: RawEvent =
        serde_json::from_slice(body).map_err(|e| PaymentError::MalformedPayload(e.to_string()))?;

    let Some(kind) = PaymentEventKind::from_type(&raw.event_type) else {
        return Ok(ParsedEvent::Ignored {
            event_id: raw.id,
            event_type: raw.event_type,
        });
    };

    let event = match kind {
        PaymentEventKind::CheckoutCompleted => {
            let session: CheckoutSessionObject = object(raw.data.object)?;
            PaymentEvent {
                event_id: raw.id,
                kind,
                order_hint: order_hint(&session.metadata),
                details: PaymentDetails {
                    amount: session.amount_total.map(Money::cents),
                    currency: session.currency,
                    method: Some("card".to_string()),
                    intent_reference: session.payment_intent,
                    ..PaymentDetails::default()
                },
                reference: session.id,
                failure_reason: None,
            }
        }
        PaymentEventKind::PaymentSucceeded | PaymentEventKind::PaymentFailed => {
            let intent: PaymentIntentObject = object(raw.data.object)?;
            let charge = intent.charges.as_ref().and_then(|list| list.data.first());
            let card = charge
                .and_then(|c| c.payment_method_details.as_ref())
                .and_then(|details| details.card.as_ref());
            let failure_reason = intent
                .last_payment_error
                .as_ref()
                .and_then(|err| err.message.clone().or_else(|| err.code.clone()));

            PaymentEvent {
                event_id: raw.id,
                kind,
                order_hint: order_hint(&intent.metadata),
                details: PaymentDetails {
                    amount: intent.amount_received.or(intent.amount).map(Money::cents),
                    currency: intent.currency.clone(),
                    method: intent.payment_method_types.first().cloned(),
                    last4: card.and_then(|c| c.last4.clone()),
                    brand: card.and_then(|c| c.brand.clone()),
                    receipt_url: charge.and_then(|c| c.receipt_url.clone()),
                    intent_reference: Some(intent.id.clone()),
                },
                reference: intent.id,
                failure_reason,
            }
        }
        PaymentEventKind::ChargeRefunded => {
            let charge: ChargeObject = object(raw.data.object)?;
            PaymentEvent {
                event_id: raw.id,
                kind,
                order_hint: order_hint(&charge.metadata),
                details: PaymentDetails {
                    amount: charge.amount_refunded.map(Money::cents),
                    currency: charge.currency,
                    receipt_url: charge.receipt_url,
                    intent_reference: charge.payment_intent.clone(),
                    ..PaymentDetails::default()
                },
                reference: charge.payment_intent.unwrap_or(charge.id),
                failure_reason: None,
            }
        }
    };

    Ok(ParsedEvent::Payment(event))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> ParsedEvent {
        parse_event(value.to_string().as_bytes()).unwrap()
    }

    #[test]
    fn test_checkout_completed_uses_session_reference() {
        let order_id = Uuid::new_v4();
        let parsed = parse(json!({
            "id": "evt_1",
            "type": "checkout.session.completed",
            "data": {"object": {
                "id": "cs_123",
                "payment_intent": "pi_123",
                "amount_total": 2599,
                "currency": "usd",
                "metadata": {"orderId": order_id.to_string()}
            }}
        }));

        let ParsedEvent::Payment(event) = parsed else { panic!("expected payment event") };
        assert_eq!(event.kind, PaymentEventKind::CheckoutCompleted);
        assert_eq!(event.reference, "cs_123");
        assert_eq!(event.order_hint, Some(order_id));
        assert_eq!(event.details.amount, Some(Money::cents(2599)));
        assert_eq!(event.details.intent_reference.as_deref(), Some("pi_123"));
    }

    #[test]
    fn test_intent_succeeded_extracts_card_details() {
        let parsed = parse(json!({
            "id": "evt_2",
            "type": "payment_intent.succeeded",
            "data": {"object": {
                "id": "pi_9",
                "amount": 1000,
                "currency": "usd",
                "payment_method_types": ["card"],
                "charges": {"data": [{
                    "id": "ch_1",
                    "receipt_url": "https://receipts.example.test/1",
                    "payment_method_details": {"card": {"last4": "4242", "brand": "visa"}}
                }]}
            }}
        }));

        let ParsedEvent::Payment(event) = parsed else { panic!("expected payment event") };
        assert_eq!(event.reference, "pi_9");
        assert_eq!(event.details.last4.as_deref(), Some("4242"));
        assert_eq!(event.details.brand.as_deref(), Some("visa"));
        assert_eq!(event.details.method.as_deref(), Some("card"));
    }

    #[test]
    fn test_refund_resolves_through_payment_intent() {
        let parsed = parse(json!({
            "id": "evt_3",
            "type": "charge.refunded",
            "data": {"object": {"id": "ch_7", "payment_intent": "pi_7", "amount_refunded": 500}}
        }));

        let ParsedEvent::Payment(event) = parsed else { panic!("expected payment event") };
        assert_eq!(event.kind, PaymentEventKind::ChargeRefunded);
        assert_eq!(event.reference, "pi_7");
    }

    #[test]
    fn test_failure_reason_and_unknown_types() {
        let parsed = parse(json!({
            "id": "evt_4",
            "type": "payment_intent.payment_failed",
            "data": {"object": {"id": "pi_4", "last_payment_error": {"code": "card_declined"}}}
        }));
        let ParsedEvent::Payment(event) = parsed else { panic!("expected payment event") };
        assert_eq!(event.failure_reason.as_deref(), Some("card_declined"));

        let ignored = parse(json!({"id": "evt_5", "type": "customer.created", "data": {"object": {}}}));
        assert!(matches!(ignored, ParsedEvent::Ignored { ref event_type, .. } if event_type == "customer.created"));
    }

    #[test]
    fn test_malformed_payload() {
        assert!(matches!(parse_event(b"not json"), Err(PaymentError::MalformedPayload(_))));
    }
}
