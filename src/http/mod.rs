// ============================================================================
// HTTP Surface
// ============================================================================
//
// All business routes live under /api and answer with the shared envelope;
// /metrics serves the Prometheus text format.
//
// - orders:   create, status changes, cancellation, reads, listings
// - cart:     the caller's cart
// - checkout: signed payment provider callbacks
// - auth:     logout (token revocation)
// - health:   aggregated dependency health
//
// ============================================================================

use std::sync::Arc;

use actix_web::web;
use kameo::actor::ActorRef;

use crate::actors::HealthMonitorActor;
use crate::auth::JwtAuthenticator;
use crate::error::AppError;
use crate::metrics::{metrics_handler, Metrics};
use crate::payments::SignatureVerifier;
use crate::services::{CartService, OrderLifecycleService, PaymentReconciler};

mod auth;
mod cart;
mod checkout;
pub mod envelope;
pub mod extractors;
mod health;
mod orders;

pub use envelope::ApiResponse;
pub use extractors::{Authenticated, BearerToken};

/// Everything a handler needs, shared across workers
#[derive(Clone)]
pub struct AppState {
    pub orders: Arc<OrderLifecycleService>,
    pub carts: Arc<CartService>,
    pub reconciler: Arc<PaymentReconciler>,
    pub authenticator: Arc<JwtAuthenticator>,
    pub verifier: Arc<SignatureVerifier>,
    pub health: ActorRef<HealthMonitorActor>,
    pub metrics: Arc<Metrics>,
}

/// Register state, extractor error handling and every route
pub fn configure(state: AppState) -> impl FnOnce(&mut web::ServiceConfig) {
    move |cfg| {
        cfg.app_data(web::Data::new(state.metrics.clone()))
            .app_data(web::Data::new(state))
            .app_data(web::JsonConfig::default().error_handler(|err, _req| {
                AppError::validation(format!("Invalid request body: {err}")).into()
            }))
            .app_data(web::QueryConfig::default().error_handler(|err, _req| {
                AppError::validation(format!("Invalid query parameters: {err}")).into()
            }))
            .app_data(web::PathConfig::default().error_handler(|err, _req| {
                AppError::validation(format!("Invalid path parameter: {err}")).into()
            }))
            .route("/metrics", web::get().to(metrics_handler))
            .service(
                web::scope("/api")
                    .configure(orders::routes)
                    .configure(cart::routes)
                    .configure(checkout::routes)
                    .configure(auth::routes)
                    .configure(health::routes),
            );
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::actors::{HealthMonitorActor, PaymentGatewayProbe};
    use crate::auth::token::tests::{token_for, SECRET};
    use crate::auth::TokenBlocklist;
    use crate::domain::identity::Principal;
    use crate::payments::{GuardedGateway, SandboxGateway};
    use crate::services::Backends;
    use crate::store::InMemoryStore;
    use crate::utils::CircuitBreakerConfig;
    use kameo::Actor;
    use std::time::Duration;

    pub(crate) const WEBHOOK_SECRET: &str = "whsec_test";

    pub(crate) struct Harness {
        pub state: AppState,
        pub store: Arc<InMemoryStore>,
    }

    impl Harness {
        pub(crate) fn bearer(&self, principal: Principal) -> (&'static str, String) {
            ("Authorization", format!("Bearer {}", token_for(&self.state.authenticator, principal)))
        }
    }

    pub(crate) fn harness() -> Harness {
        let store = Arc::new(InMemoryStore::new());
        let backends = Backends::from_store(store.clone());
        let metrics = Arc::new(Metrics::new().unwrap());

        let gateway = Arc::new(
            GuardedGateway::new(
                Arc::new(SandboxGateway::new("https://pay.example.test/checkout")),
                CircuitBreakerConfig::default(),
            )
            .with_metrics(metrics.clone()),
        );
        let health = HealthMonitorActor::spawn(HealthMonitorActor::new(
            vec![Arc::new(PaymentGatewayProbe::new(gateway.clone()))],
            Duration::from_secs(3600),
        ));

        let state = AppState {
            orders: Arc::new(OrderLifecycleService::new(
                backends.clone(),
                gateway,
                metrics.clone(),
                chrono::Duration::minutes(30),
            )),
            carts: Arc::new(CartService::new(backends.clone())),
            reconciler: Arc::new(PaymentReconciler::new(backends, metrics.clone())),
            authenticator: Arc::new(JwtAuthenticator::new(SECRET, Arc::new(TokenBlocklist::new()))),
            verifier: Arc::new(SignatureVerifier::new(WEBHOOK_SECRET, 300)),
            health,
            metrics,
        };

        Harness { state, store }
    }
}
