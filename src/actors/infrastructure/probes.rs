use std::sync::Arc;

use async_trait::async_trait;

use crate::actors::core::{ComponentHealth, HealthCheck, HealthStatus};
use crate::payments::GuardedGateway;
use crate::store::OrderRepository;
use crate::utils::CircuitState;

// ============================================================================
// Health Probes
// ============================================================================

/// Payment provider health as seen through its circuit breaker
pub struct PaymentGatewayProbe {
    gateway: Arc<GuardedGateway>,
}

impl PaymentGatewayProbe {
    pub fn new(gateway: Arc<GuardedGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl HealthCheck for PaymentGatewayProbe {
    fn component_name(&self) -> &'static str {
        "payment_gateway"
    }

    async fn check_health(&self) -> ComponentHealth {
        let state = self.gateway.circuit_state().await;
        let status = match state {
            CircuitState::Closed => HealthStatus::Healthy,
            CircuitState::HalfOpen => HealthStatus::Degraded("Circuit breaker half-open".to_string()),
            CircuitState::Open => HealthStatus::Unhealthy("Circuit breaker open".to_string()),
        };

        let failures = self.gateway.failure_count().await;
        ComponentHealth::new(self.component_name(), status)
            .with_details(format!("circuit={}, consecutive_failures={failures}", state.as_str()))
    }
}

/// Order store reachability
pub struct StoreProbe {
    repository: Arc<dyn OrderRepository>,
}

impl StoreProbe {
    pub fn new(repository: Arc<dyn OrderRepository>) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl HealthCheck for StoreProbe {
    fn component_name(&self) -> &'static str {
        "order_store"
    }

    async fn check_health(&self) -> ComponentHealth {
        let status = match self.repository.ping().await {
            Ok(()) => HealthStatus::Healthy,
            Err(e) => HealthStatus::Unhealthy(e.to_string()),
        };
        ComponentHealth::new(self.component_name(), status)
    }
}
