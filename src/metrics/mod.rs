// Private module declaration
mod server;

use prometheus::{
    HistogramOpts, HistogramVec, IntCounter, IntCounterVec,
    IntGauge, IntGaugeVec, Opts, Registry,
};

use crate::utils::CircuitState;

// Re-export for public API
pub use server::metrics_handler;

// ============================================================================
// Metrics Module - Prometheus metrics for observability
// ============================================================================
//
// Provides metrics for:
// - Order placement, status transitions and cancellations
// - Stock reservation failures and units returned to the ledger
// - Payment webhook outcomes
// - Compensating actions and their failures
// - Circuit breaker state and actor health
//
// All metrics are registered with one registry and scraped via /metrics
// ============================================================================

/// Central metrics registry for the entire application
pub struct Metrics {
    registry: Registry,

    // Order Lifecycle Metrics
    pub orders_created: IntCounterVec,
    pub order_transitions: IntCounterVec,
    pub order_cancellations: IntCounterVec,
    pub operation_duration: HistogramVec,

    // Inventory Metrics
    pub stock_reservation_failures: IntCounterVec,
    pub stock_units_released: IntCounterVec,
    pub holds_lapsed: IntCounter,

    // Payment Metrics
    pub webhook_events: IntCounterVec,

    // Compensation Metrics
    pub compensations: IntCounterVec,
    pub compensation_failures: IntCounterVec,

    // Circuit Breaker Metrics
    pub circuit_breaker_state: IntGaugeVec,

    // Actor Metrics
    pub actor_health_status: IntGauge,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        // Order Lifecycle Metrics
        let orders_created = IntCounterVec::new(
            Opts::new("orders_created_total", "Total orders placed"),
            &["payment_method"],
        )?;
        registry.register(Box::new(orders_created.clone()))?;

        let order_transitions = IntCounterVec::new(
            Opts::new("order_transitions_total", "Order status transitions"),
            &["from_status", "to_status", "role"],
        )?;
        registry.register(Box::new(order_transitions.clone()))?;

        let order_cancellations = IntCounterVec::new(
            Opts::new("order_cancellations_total", "Order cancellations by scope"),
            &["scope", "role"],
        )?;
        registry.register(Box::new(order_cancellations.clone()))?;

        let operation_duration = HistogramVec::new(
            HistogramOpts::new("order_operation_duration_seconds", "Order operation duration")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["operation"],
        )?;
        registry.register(Box::new(operation_duration.clone()))?;

        // Inventory Metrics
        let stock_reservation_failures = IntCounterVec::new(
            Opts::new("stock_reservation_failures_total", "Failed stock reservations"),
            &["reason"],
        )?;
        registry.register(Box::new(stock_reservation_failures.clone()))?;

        let stock_units_released = IntCounterVec::new(
            Opts::new("stock_units_released_total", "Units returned to the ledger"),
            &["reason"],
        )?;
        registry.register(Box::new(stock_units_released.clone()))?;

        let holds_lapsed = IntCounter::new(
            "stock_holds_lapsed_total",
            "Unpaid stock holds released after expiry",
        )?;
        registry.register(Box::new(holds_lapsed.clone()))?;

        // Payment Metrics
        let webhook_events = IntCounterVec::new(
            Opts::new("payment_webhook_events_total", "Payment webhook deliveries"),
            &["event_type", "outcome"],
        )?;
        registry.register(Box::new(webhook_events.clone()))?;

        // Compensation Metrics
        let compensations = IntCounterVec::new(
            Opts::new("compensations_total", "Compensating stock releases performed"),
            &["operation"],
        )?;
        registry.register(Box::new(compensations.clone()))?;

        let compensation_failures = IntCounterVec::new(
            Opts::new("compensation_failures_total", "Compensating releases that failed after all retries"),
            &["operation"],
        )?;
        registry.register(Box::new(compensation_failures.clone()))?;

        // Circuit Breaker Metrics
        let circuit_breaker_state = IntGaugeVec::new(
            Opts::new("circuit_breaker_state", "Circuit breaker state (0=Closed, 1=Open, 2=HalfOpen)"),
            &["breaker"],
        )?;
        registry.register(Box::new(circuit_breaker_state.clone()))?;

        // Actor Metrics
        let actor_health_status = IntGauge::new(
            "actor_health_status",
            "System health status (0=Unhealthy, 1=Degraded, 2=Healthy)",
        )?;
        registry.register(Box::new(actor_health_status.clone()))?;

        Ok(Self {
            registry,
            orders_created,
            order_transitions,
            order_cancellations,
            operation_duration,
            stock_reservation_failures,
            stock_units_released,
            holds_lapsed,
            webhook_events,
            compensations,
            compensation_failures,
            circuit_breaker_state,
            actor_health_status,
        })
    }

    /// Get the Prometheus registry for exposing metrics via HTTP
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_order_created(&self, payment_method: &str) {
        self.orders_created.with_label_values(&[payment_method]).inc();
    }

    pub fn record_transition(&self, from: &str, to: &str, role: &str) {
        self.order_transitions.with_label_values(&[from, to, role]).inc();
    }

    pub fn record_cancellation(&self, partial: bool, role: &str) {
        let scope = if partial { "partial" } else { "full" };
        self.order_cancellations.with_label_values(&[scope, role]).inc();
    }

    pub fn observe_operation(&self, operation: &str, duration_secs: f64) {
        self.operation_duration.with_label_values(&[operation]).observe(duration_secs);
    }

    pub fn record_reservation_failure(&self, reason: &str) {
        self.stock_reservation_failures.with_label_values(&[reason]).inc();
    }

    pub fn record_units_released(&self, reason: &str, units: u64) {
        self.stock_units_released.with_label_values(&[reason]).inc_by(units);
    }

    pub fn record_webhook(&self, event_type: &str, outcome: &str) {
        self.webhook_events.with_label_values(&[event_type, outcome]).inc();
    }

    pub fn record_compensation(&self, operation: &str, success: bool) {
        if success {
            self.compensations.with_label_values(&[operation]).inc();
        } else {
            self.compensation_failures.with_label_values(&[operation]).inc();
        }
    }

    pub fn set_circuit_breaker_state(&self, breaker: &str, state: CircuitState) {
        let value = match state {
            CircuitState::Closed => 0,
            CircuitState::Open => 1,
            CircuitState::HalfOpen => 2,
        };
        self.circuit_breaker_state.with_label_values(&[breaker]).set(value);
    }
}
