use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::domain::order::Order;
use crate::metrics::Metrics;
use crate::utils::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState};
use super::PaymentError;

// ============================================================================
// Payment Gateway
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntent {
    pub reference: String,
    pub client_secret: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSession {
    pub reference: String,
    pub url: String,
}

/// What the client needs to complete a deferred payment
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaymentSetup {
    #[serde(rename = "payment_intent")]
    Intent(PaymentIntent),
    #[serde(rename = "checkout_session")]
    Checkout(CheckoutSession),
}

impl PaymentSetup {
    pub fn reference(&self) -> &str {
        match self {
            PaymentSetup::Intent(intent) => &intent.reference,
            PaymentSetup::Checkout(session) => &session.reference,
        }
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Card payments: the client confirms the intent with `client_secret`
    async fn create_intent(&self, order: &Order) -> Result<PaymentIntent, PaymentError>;

    /// Hosted checkout: the client is redirected to `url`
    async fn create_checkout_session(&self, order: &Order) -> Result<CheckoutSession, PaymentError>;
}

// ============================================================================
// Sandbox Gateway - deterministic provider stand-in
// ============================================================================
//
// References are derived from the order id, so a webhook for an order can be
// produced without talking to anything.
//
// ============================================================================

#[derive(Debug, Default)]
pub struct SandboxGateway {
    checkout_base_url: String,
    /// Upcoming calls that fail as if the provider were down
    failing_calls: AtomicU32,
}

impl SandboxGateway {
    pub fn new(checkout_base_url: impl Into<String>) -> Self {
        Self {
            checkout_base_url: checkout_base_url.into(),
            failing_calls: AtomicU32::new(0),
        }
    }

    pub fn fail_next_calls(&self, count: u32) {
        self.failing_calls.store(count, Ordering::SeqCst);
    }

    pub fn intent_reference(order: &Order) -> String {
        format!("pi_{}", order.id.simple())
    }

    pub fn session_reference(order: &Order) -> String {
        format!("cs_{}", order.id.simple())
    }

    fn check_outage(&self) -> Result<(), PaymentError> {
        let failing = self
            .failing_calls
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(PaymentError::Unavailable("sandbox outage".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl PaymentGateway for SandboxGateway {
    async fn create_intent(&self, order: &Order) -> Result<PaymentIntent, PaymentError> {
        self.check_outage()?;
        if order.total_price.as_cents() <= 0 {
            return Err(PaymentError::Rejected("amount must be positive".to_string()));
        }

        let reference = Self::intent_reference(order);
        tracing::info!(
            order_id = %order.id,
            reference = %reference,
            amount = order.total_price.as_cents(),
            "Sandbox payment intent created"
        );

        Ok(PaymentIntent {
            client_secret: format!("{reference}_secret"),
            reference,
        })
    }

    async fn create_checkout_session(&self, order: &Order) -> Result<CheckoutSession, PaymentError> {
        self.check_outage()?;
        if order.total_price.as_cents() <= 0 {
            return Err(PaymentError::Rejected("amount must be positive".to_string()));
        }

        let reference = Self::session_reference(order);
        tracing::info!(
            order_id = %order.id,
            reference = %reference,
            amount = order.total_price.as_cents(),
            "Sandbox checkout session created"
        );

        Ok(CheckoutSession {
            url: format!("{}/{}", self.checkout_base_url.trim_end_matches('/'), reference),
            reference,
        })
    }
}

// ============================================================================
// Guarded Gateway - circuit breaker around the provider
// ============================================================================

pub struct GuardedGateway {
    inner: Arc<dyn PaymentGateway>,
    circuit_breaker: CircuitBreaker,
    metrics: Option<Arc<Metrics>>,
}

impl GuardedGateway {
    pub fn new(inner: Arc<dyn PaymentGateway>, config: CircuitBreakerConfig) -> Self {
        Self {
            inner,
            circuit_breaker: CircuitBreaker::new("payment_gateway", config),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub async fn circuit_state(&self) -> CircuitState {
        self.circuit_breaker.state().await
    }

    pub async fn failure_count(&self) -> u32 {
        self.circuit_breaker.failure_count().await
    }

    async fn record_state(&self) {
        if let Some(metrics) = &self.metrics {
            let state = self.circuit_breaker.state().await;
            metrics.set_circuit_breaker_state(self.circuit_breaker.name(), state);
        }
    }

    fn unwrap_breaker(err: CircuitBreakerError<PaymentError>) -> PaymentError {
        match err {
            CircuitBreakerError::CircuitOpen(name) => {
                PaymentError::Unavailable(format!("{name} circuit is open"))
            }
            CircuitBreakerError::OperationFailed(err) => err,
        }
    }
}

#[async_trait]
impl PaymentGateway for GuardedGateway {
    async fn create_intent(&self, order: &Order) -> Result<PaymentIntent, PaymentError> {
        let result = self
            .circuit_breaker
            .call(self.inner.create_intent(order))
            .await
            .map_err(Self::unwrap_breaker);
        self.record_state().await;
        result
    }

    async fn create_checkout_session(&self, order: &Order) -> Result<CheckoutSession, PaymentError> {
        let result = self
            .circuit_breaker
            .call(self.inner.create_checkout_session(order))
            .await
            .map_err(Self::unwrap_breaker);
        self.record_state().await;
        result
    }
}
