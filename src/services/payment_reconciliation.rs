use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::inventory::{release_all, reserve_all, StockLine};
use crate::domain::order::*;
use crate::error::AppError;
use crate::metrics::Metrics;
use crate::payments::{ParsedEvent, PaymentEvent, PaymentEventKind};
use crate::store::StoreError;
use super::{execute_releasing, Backends};

// ============================================================================
// Payment Reconciliation
// ============================================================================
//
// Applies verified provider callbacks to orders. Every command is a no-op
// when the order already reflects the event, so duplicate and out-of-order
// deliveries are safe. A write that loses a version race is retried against
// the freshly loaded order.
//
// Also lapses stock holds of deferred-payment orders left unpaid past their
// expiry, returning the units to the ledger.
//
// ============================================================================

const MAX_ATTEMPTS: u32 = 3;
const LAPSE_BATCH: usize = 100;

/// What happened to one provider event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    Applied { order_id: Uuid, kind: PaymentEventKind },
    /// The order already reflected the event
    Unchanged { order_id: Uuid, kind: PaymentEventKind },
    /// No order matches the event's reference
    Unresolved { reference: String },
    /// An event type we do not act on
    Ignored { event_type: String },
}

impl Reconciliation {
    pub fn outcome(&self) -> &'static str {
        match self {
            Reconciliation::Applied { .. } => "applied",
            Reconciliation::Unchanged { .. } => "unchanged",
            Reconciliation::Unresolved { .. } => "unresolved",
            Reconciliation::Ignored { .. } => "ignored",
        }
    }
}

pub struct PaymentReconciler {
    backends: Backends,
    handler: OrderCommandHandler,
    metrics: Arc<Metrics>,
}

impl PaymentReconciler {
    pub fn new(backends: Backends, metrics: Arc<Metrics>) -> Self {
        Self {
            handler: OrderCommandHandler::new(backends.orders.clone()),
            backends,
            metrics,
        }
    }

    pub async fn handle(&self, parsed: ParsedEvent) -> Result<Reconciliation, AppError> {
        let event = match parsed {
            ParsedEvent::Payment(event) => event,
            ParsedEvent::Ignored { event_id, event_type } => {
                tracing::debug!(event_id = %event_id, event_type = %event_type, "Ignoring provider event");
                self.metrics.record_webhook("other", "ignored");
                return Ok(Reconciliation::Ignored { event_type });
            }
        };

        let result = self.reconcile(&event).await;
        let outcome = match &result {
            Ok(reconciliation) => reconciliation.outcome(),
            Err(_) => "error",
        };
        self.metrics.record_webhook(event.kind.as_str(), outcome);
        result
    }

    async fn reconcile(&self, event: &PaymentEvent) -> Result<Reconciliation, AppError> {
        let Some(order_id) = self.resolve(event).await? else {
            tracing::warn!(
                event_id = %event.event_id,
                kind = event.kind.as_str(),
                reference = %event.reference,
                "No order matches payment event, dropping"
            );
            return Ok(Reconciliation::Unresolved { reference: event.reference.clone() });
        };

        let executed = self.apply_with_retry(order_id, event).await?;
        if executed.events.is_empty() {
            tracing::debug!(
                order_id = %order_id,
                event_id = %event.event_id,
                kind = event.kind.as_str(),
                "Payment event already reflected"
            );
            return Ok(Reconciliation::Unchanged { order_id, kind: event.kind });
        }

        match event.kind {
            PaymentEventKind::CheckoutCompleted | PaymentEventKind::PaymentSucceeded => {
                // Settlement stands even if the cart cannot be emptied
                if let Err(err) = self.backends.carts.clear_cart(executed.order.cart_id).await {
                    tracing::warn!(
                        order_id = %order_id,
                        cart_id = %executed.order.cart_id,
                        error = %err,
                        "Failed to clear cart after payment"
                    );
                }
            }
            PaymentEventKind::ChargeRefunded | PaymentEventKind::PaymentFailed => {}
        }

        tracing::info!(
            order_id = %order_id,
            event_id = %event.event_id,
            kind = event.kind.as_str(),
            payment_status = %executed.order.payment_status,
            "Payment event applied"
        );
        Ok(Reconciliation::Applied { order_id, kind: event.kind })
    }

    /// Match on the provider reference, then on the order id in the metadata
    async fn resolve(&self, event: &PaymentEvent) -> Result<Option<Uuid>, AppError> {
        if let Some(order) = self.backends.orders.find_by_payment_reference(&event.reference).await? {
            return Ok(Some(order.id));
        }

        match event.order_hint {
            Some(order_id) => Ok(self.backends.orders.get(order_id).await?.map(|order| order.id)),
            None => Ok(None),
        }
    }

    async fn apply_with_retry(&self, order_id: Uuid, event: &PaymentEvent) -> Result<Executed, AppError> {
        let mut attempt = 0;
        loop {
            attempt += 1;

            let order = self
                .backends
                .orders
                .get(order_id)
                .await?
                .ok_or_else(|| AppError::NotFound("Order not found".to_string()))?;

            match self.apply(order, event).await {
                Err(CommandError::Store(StoreError::Conflict { .. })) if attempt < MAX_ATTEMPTS => {
                    tracing::debug!(order_id = %order_id, attempt = attempt, "Order changed concurrently, reloading");
                }
                result => return result.map_err(AppError::from),
            }
        }
    }

    async fn apply(&self, order: Order, event: &PaymentEvent) -> Result<Executed, CommandError> {
        let correlation_id = Uuid::new_v4();

        let command = match event.kind {
            PaymentEventKind::CheckoutCompleted | PaymentEventKind::PaymentSucceeded => {
                let reacquired = self.reacquire(&order).await;
                let command = OrderCommand::RecordPaymentSuccess {
                    details: event.details.clone(),
                    reacquired: reacquired.clone(),
                };

                let result = self.handler.execute(order, &command, correlation_id, None).await;
                let recorded = matches!(&result, Ok(executed) if !executed.events.is_empty());
                if !recorded && !reacquired.is_empty() {
                    self.give_back(&reacquired).await;
                }
                return result;
            }
            PaymentEventKind::PaymentFailed => OrderCommand::RecordPaymentFailure {
                reason: event.failure_reason.clone(),
            },
            PaymentEventKind::ChargeRefunded => {
                return execute_releasing(
                    &self.handler,
                    self.backends.ledger.as_ref(),
                    &self.metrics,
                    order,
                    &OrderCommand::RecordRefund,
                    None,
                )
                .await;
            }
        };

        self.handler.execute(order, &command, correlation_id, None).await
    }

    /// Take the order's units from the ledger again after its hold lapsed.
    ///
    /// When the stock is gone the payment is still recorded; the order stays
    /// without a committed hold and is logged for manual follow-up.
    async fn reacquire(&self, order: &Order) -> Vec<StockLine> {
        let lines = order.lines_to_reacquire();
        if lines.is_empty() {
            return lines;
        }

        match reserve_all(self.backends.ledger.as_ref(), &lines).await {
            Ok(()) => {
                tracing::info!(order_id = %order.id, lines = lines.len(), "Re-reserved stock for late payment");
                lines
            }
            Err(err) => {
                self.metrics.record_reservation_failure("late_payment");
                tracing::error!(
                    order_id = %order.id,
                    error = %err,
                    "Payment arrived after hold lapsed and stock is no longer available"
                );
                Vec::new()
            }
        }
    }

    async fn give_back(&self, lines: &[StockLine]) {
        let result = release_all(self.backends.ledger.as_ref(), lines).await;
        self.metrics.record_compensation("reacquire", result.is_ok());
        if let Err(err) = result {
            tracing::error!(error = %err, "Re-reserved stock could not be returned");
        }
    }

    // ========================================================================
    // Hold expiry
    // ========================================================================

    /// Lapse every hold that expired at or before `now`. Returns how many
    /// orders were lapsed.
    pub async fn lapse_expired_holds(&self, now: DateTime<Utc>) -> Result<usize, AppError> {
        let expired = self.backends.orders.find_expired_holds(now, LAPSE_BATCH).await?;
        let mut lapsed = 0;

        for order in expired {
            let order_id = order.id;
            let executed = match execute_releasing(
                &self.handler,
                self.backends.ledger.as_ref(),
                &self.metrics,
                order,
                &OrderCommand::LapseHold { now },
                None,
            )
            .await
            {
                Ok(executed) => executed,
                // Paid or cancelled in the meantime; the next sweep sees the new state
                Err(CommandError::Store(StoreError::Conflict { .. })) => continue,
                // Still held and already logged; the next sweep retries the release
                Err(CommandError::Stock(_)) => continue,
                Err(err) => return Err(err.into()),
            };

            if executed.events.is_empty() {
                continue;
            }

            self.metrics.holds_lapsed.inc();
            lapsed += 1;
            tracing::info!(order_id = %order_id, "Unpaid stock hold lapsed");
        }

        Ok(lapsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::identity::Principal;
    use crate::domain::inventory::InventoryLedger;
    use crate::payments::SandboxGateway;
    use crate::services::order_lifecycle::tests::{cart_with, fixture, request, Fixture};
    use crate::store::{CartStore, InMemoryStore, OrderRepository};
    use chrono::Duration;

    fn reconciler(f: &Fixture) -> PaymentReconciler {
        PaymentReconciler::new(Backends::from_store(f.store.clone()), f.metrics.clone())
    }

    fn succeeded(reference: &str) -> ParsedEvent {
        ParsedEvent::Payment(PaymentEvent {
            event_id: format!("evt_{}", Uuid::new_v4().simple()),
            kind: PaymentEventKind::PaymentSucceeded,
            reference: reference.to_string(),
            order_hint: None,
            details: PaymentDetails {
                last4: Some("4242".to_string()),
                intent_reference: Some(reference.to_string()),
                ..PaymentDetails::default()
            },
            failure_reason: None,
        })
    }

    fn event(kind: PaymentEventKind, reference: &str) -> ParsedEvent {
        ParsedEvent::Payment(PaymentEvent {
            event_id: "evt_test".to_string(),
            kind,
            reference: reference.to_string(),
            order_hint: None,
            details: PaymentDetails::default(),
            failure_reason: None,
        })
    }

    /// A card order for 2 of a 5-unit product
    async fn card_order(f: &Fixture) -> (Order, Uuid) {
        let user = Uuid::new_v4();
        let product = f.store.seed_product("Kettle", 3000, 5, Some(Uuid::new_v4())).await;
        let cart = cart_with(&f.store, user, &[(product, 2)]).await;
        let placed = f
            .service
            .create_order(&Principal::user(user), request(cart.id, PaymentMethod::CreditCard))
            .await
            .unwrap();
        (placed.order_details, product)
    }

    async fn stored(store: &InMemoryStore, order_id: Uuid) -> Order {
        store.get(order_id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_replayed_success_commits_once() {
        let f = fixture();
        let reconciler = reconciler(&f);
        let (order, product) = card_order(&f).await;
        let reference = SandboxGateway::intent_reference(&order);

        let first = reconciler.handle(succeeded(&reference)).await.unwrap();
        let second = reconciler.handle(succeeded(&reference)).await.unwrap();

        assert_eq!(first, Reconciliation::Applied { order_id: order.id, kind: PaymentEventKind::PaymentSucceeded });
        assert_eq!(second.outcome(), "unchanged");
        assert_eq!(f.store.stock_of(product).await.unwrap(), 3);

        let order = stored(&f.store, order.id).await;
        assert_eq!(order.payment_status, PaymentStatus::Paid);
        assert_eq!(order.stock_hold, StockHold::Committed);
        assert_eq!(order.payment_details.unwrap().last4.as_deref(), Some("4242"));
        assert!(f.store.get_cart(order.cart_id).await.unwrap().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_success_after_lapse_reserves_again() {
        let f = fixture();
        let reconciler = reconciler(&f);
        let (order, product) = card_order(&f).await;

        let lapsed = reconciler.lapse_expired_holds(Utc::now() + Duration::hours(1)).await.unwrap();
        assert_eq!(lapsed, 1);
        assert_eq!(f.store.stock_of(product).await.unwrap(), 5);

        reconciler.handle(succeeded(&SandboxGateway::intent_reference(&order))).await.unwrap();

        assert_eq!(f.store.stock_of(product).await.unwrap(), 3);
        assert_eq!(stored(&f.store, order.id).await.stock_hold, StockHold::Committed);
    }

    #[tokio::test]
    async fn test_late_payment_without_stock_is_still_recorded() {
        let f = fixture();
        let reconciler = reconciler(&f);
        let (order, product) = card_order(&f).await;

        reconciler.lapse_expired_holds(Utc::now() + Duration::hours(1)).await.unwrap();
        f.store.reserve(product, 5).await.unwrap();

        let outcome = reconciler.handle(succeeded(&SandboxGateway::intent_reference(&order))).await.unwrap();

        assert_eq!(outcome.outcome(), "applied");
        let order = stored(&f.store, order.id).await;
        assert_eq!(order.payment_status, PaymentStatus::Paid);
        assert_eq!(order.stock_hold, StockHold::Lapsed);
        assert_eq!(f.store.stock_of(product).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unexpired_holds_are_kept() {
        let f = fixture();
        let reconciler = reconciler(&f);
        let (_, product) = card_order(&f).await;

        assert_eq!(reconciler.lapse_expired_holds(Utc::now()).await.unwrap(), 0);
        assert_eq!(f.store.stock_of(product).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_refund_on_delivered_order_restores_stock() {
        let f = fixture();
        let reconciler = reconciler(&f);
        let (order, product) = card_order(&f).await;
        let reference = SandboxGateway::intent_reference(&order);
        reconciler.handle(succeeded(&reference)).await.unwrap();

        let admin = Principal::admin(Uuid::new_v4());
        for target in [OrderStatus::Confirmed, OrderStatus::Shipped, OrderStatus::Delivered] {
            f.service.change_status(&admin, order.id, target).await.unwrap();
        }

        reconciler.handle(event(PaymentEventKind::ChargeRefunded, &reference)).await.unwrap();
        assert_eq!(f.store.stock_of(product).await.unwrap(), 5);

        // A second refund notification changes nothing
        let again = reconciler.handle(event(PaymentEventKind::ChargeRefunded, &reference)).await.unwrap();
        assert_eq!(again.outcome(), "unchanged");
        assert_eq!(f.store.stock_of(product).await.unwrap(), 5);
        assert_eq!(stored(&f.store, order.id).await.payment_status, PaymentStatus::Refunded);
    }

    #[tokio::test]
    async fn test_redelivered_refund_restores_stock_after_release_failure() {
        let f = fixture();
        let reconciler = reconciler(&f);
        let (order, product) = card_order(&f).await;
        let reference = SandboxGateway::intent_reference(&order);
        reconciler.handle(succeeded(&reference)).await.unwrap();

        f.store.fail_next_releases(10);
        let first = reconciler.handle(event(PaymentEventKind::ChargeRefunded, &reference)).await;
        f.store.fail_next_releases(0);

        assert!(matches!(first, Err(AppError::Internal(_))));
        assert_eq!(stored(&f.store, order.id).await.payment_status, PaymentStatus::Paid);
        assert_eq!(f.store.stock_of(product).await.unwrap(), 3);

        let second = reconciler.handle(event(PaymentEventKind::ChargeRefunded, &reference)).await.unwrap();
        assert_eq!(second.outcome(), "applied");
        assert_eq!(f.store.stock_of(product).await.unwrap(), 5);
        assert_eq!(stored(&f.store, order.id).await.payment_status, PaymentStatus::Refunded);
    }

    #[tokio::test]
    async fn test_lapse_waits_for_a_working_ledger() {
        let f = fixture();
        let reconciler = reconciler(&f);
        let (order, product) = card_order(&f).await;
        let later = Utc::now() + Duration::hours(1);

        f.store.fail_next_releases(10);
        assert_eq!(reconciler.lapse_expired_holds(later).await.unwrap(), 0);
        f.store.fail_next_releases(0);
        assert!(matches!(stored(&f.store, order.id).await.stock_hold, StockHold::Held { .. }));
        assert_eq!(f.store.stock_of(product).await.unwrap(), 3);

        assert_eq!(reconciler.lapse_expired_holds(later).await.unwrap(), 1);
        assert_eq!(f.store.stock_of(product).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_refund_after_cancellation_does_not_double_release() {
        let f = fixture();
        let reconciler = reconciler(&f);
        let (order, product) = card_order(&f).await;
        let reference = SandboxGateway::intent_reference(&order);
        reconciler.handle(succeeded(&reference)).await.unwrap();

        f.service.cancel(&Principal::user(order.user_id), order.id).await.unwrap();
        assert_eq!(f.store.stock_of(product).await.unwrap(), 5);

        reconciler.handle(event(PaymentEventKind::ChargeRefunded, &reference)).await.unwrap();
        assert_eq!(f.store.stock_of(product).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_failure_only_applies_while_unsettled() {
        let f = fixture();
        let reconciler = reconciler(&f);
        let (order, _) = card_order(&f).await;
        let reference = SandboxGateway::intent_reference(&order);

        let failed = reconciler.handle(event(PaymentEventKind::PaymentFailed, &reference)).await.unwrap();
        assert_eq!(failed.outcome(), "applied");
        assert_eq!(stored(&f.store, order.id).await.payment_status, PaymentStatus::Failed);

        // A retry of the payment can still succeed
        reconciler.handle(succeeded(&reference)).await.unwrap();
        let late_failure = reconciler.handle(event(PaymentEventKind::PaymentFailed, &reference)).await.unwrap();
        assert_eq!(late_failure.outcome(), "unchanged");
        assert_eq!(stored(&f.store, order.id).await.payment_status, PaymentStatus::Paid);
    }

    #[tokio::test]
    async fn test_unknown_reference_is_dropped() {
        let f = fixture();
        let reconciler = reconciler(&f);

        let outcome = reconciler.handle(succeeded("pi_unknown")).await.unwrap();
        assert_eq!(outcome, Reconciliation::Unresolved { reference: "pi_unknown".to_string() });
    }

    #[tokio::test]
    async fn test_order_hint_resolves_when_reference_does_not() {
        let f = fixture();
        let reconciler = reconciler(&f);
        let (order, _) = card_order(&f).await;

        let ParsedEvent::Payment(mut payment) = succeeded("cs_from_elsewhere") else { unreachable!() };
        payment.order_hint = Some(order.id);

        let outcome = reconciler.handle(ParsedEvent::Payment(payment)).await.unwrap();
        assert_eq!(outcome.outcome(), "applied");
        assert_eq!(stored(&f.store, order.id).await.payment_status, PaymentStatus::Paid);
    }

    #[tokio::test]
    async fn test_other_event_types_are_ignored() {
        let f = fixture();
        let outcome = reconciler(&f)
            .handle(ParsedEvent::Ignored {
                event_id: "evt_9".to_string(),
                event_type: "customer.created".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(outcome.outcome(), "ignored");
    }
}
