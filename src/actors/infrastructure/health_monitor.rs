use kameo::Actor;
use kameo::message::{Context, Message};
use kameo::actor::ActorRef;
use kameo::error::Infallible;
use kameo::reply::{Reply, ReplyError};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use chrono::{DateTime, Utc};
use crate::actors::core::{ComponentHealth, HealthCheck, HealthStatus};
use crate::metrics::Metrics;

// ============================================================================
// Health Monitor Actor - Aggregates dependency health
// ============================================================================
//
// Responsibilities:
// - Poll every registered probe on a fixed interval
// - Keep the latest result per component
// - Derive the system-wide status served by the health endpoint
// - Mirror the overall status into the `actor_health_status` gauge
//
// ============================================================================

// ============================================================================
// Messages
// ============================================================================

#[derive(Debug)]
pub struct UpdateHealth {
    pub health: ComponentHealth,
}

#[derive(Debug)]
pub struct GetSystemHealth;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemHealth {
    pub overall_status: HealthStatus,
    pub components: BTreeMap<String, ComponentHealth>,
    pub check_time: DateTime<Utc>,
}

// Implement Reply for SystemHealth to use it as a message reply type
impl Reply for SystemHealth {
    type Ok = Self;
    type Error = Infallible;
    type Value = Self;

    fn to_result(self) -> Result<Self, Infallible> {
        Ok(self)
    }

    fn into_any_err(self) -> Option<Box<dyn ReplyError>> {
        None
    }

    fn into_value(self) -> Self::Value {
        self
    }
}

// ============================================================================
// Health Monitor Actor
// ============================================================================

pub struct HealthMonitorActor {
    components: BTreeMap<String, ComponentHealth>,
    probes: Vec<Arc<dyn HealthCheck>>,
    interval: Duration,
    metrics: Option<Arc<Metrics>>,
}

impl HealthMonitorActor {
    pub fn new(probes: Vec<Arc<dyn HealthCheck>>, interval: Duration) -> Self {
        Self {
            components: BTreeMap::new(),
            probes,
            interval,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn compute_overall_status(&self) -> HealthStatus {
        let mut has_degraded = false;
        let mut unhealthy_components = Vec::new();

        for (name, health) in &self.components {
            match &health.status {
                HealthStatus::Unhealthy(msg) => {
                    unhealthy_components.push(format!("{}: {}", name, msg));
                }
                HealthStatus::Degraded(_) => {
                    has_degraded = true;
                }
                HealthStatus::Healthy => {}
            }
        }

        if !unhealthy_components.is_empty() {
            HealthStatus::Unhealthy(unhealthy_components.join(", "))
        } else if has_degraded {
            HealthStatus::Degraded("Some components degraded".to_string())
        } else {
            HealthStatus::Healthy
        }
    }
}

impl Actor for HealthMonitorActor {
    type Args = Self;
    type Error = Infallible;

    async fn on_start(
        state: Self::Args,
        actor_ref: ActorRef<Self>
    ) -> Result<Self, Self::Error> {
        tracing::info!(
            probes = state.probes.len(),
            interval_secs = state.interval.as_secs(),
            "HealthMonitorActor started"
        );

        let probes = state.probes.clone();
        let period = state.interval;
        let actor_ref_clone = actor_ref.clone();

        // Schedule periodic health checks
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;

                for probe in &probes {
                    let health = probe.check_health().await;

                    // Fire and forget - use tell
                    if actor_ref_clone.tell(UpdateHealth { health }).send().await.is_err() {
                        tracing::debug!("HealthMonitorActor stopped, ending health checks");
                        return;
                    }
                }
            }
        });

        Ok(state)
    }
}

// ============================================================================
// Message Handlers
// ============================================================================

impl Message<UpdateHealth> for HealthMonitorActor {
    type Reply = ();

    async fn handle(&mut self, msg: UpdateHealth, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        let health = msg.health;

        let changed = self
            .components
            .get(&health.name)
            .is_none_or(|previous| previous.status != health.status);
        if changed && !health.status.is_healthy() {
            tracing::warn!(
                component = %health.name,
                status = ?health.status,
                details = ?health.details,
                "Component health changed"
            );
        } else {
            tracing::debug!(
                component = %health.name,
                status = ?health.status,
                "Updated component health"
            );
        }

        self.components.insert(health.name.clone(), health);

        if let Some(metrics) = &self.metrics {
            metrics.actor_health_status.set(self.compute_overall_status().gauge_value());
        }
    }
}

impl Message<GetSystemHealth> for HealthMonitorActor {
    type Reply = SystemHealth;

    async fn handle(&mut self, _msg: GetSystemHealth, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        let overall_status = self.compute_overall_status();

        SystemHealth {
            overall_status,
            components: self.components.clone(),
            check_time: Utc::now(),
        }
    }
}
