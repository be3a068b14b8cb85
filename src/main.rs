use actix_web::{App, HttpServer};
use anyhow::Context;
use kameo::Actor;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod actors;
mod auth;
mod config;
mod domain;
mod error;
mod event_sourcing;
mod http;
mod metrics;
mod payments;
mod services;
mod store;
mod utils;

use actors::{HealthCheck, HealthMonitorActor, PaymentGatewayProbe, ReservationReaper, StoreProbe};
use auth::{JwtAuthenticator, TokenBlocklist};
use config::AppConfig;
use domain::inventory::{Product, ProductCatalog};
use payments::{GuardedGateway, SandboxGateway, SignatureVerifier};
use services::{Backends, CartService, OrderLifecycleService, PaymentReconciler};
use store::{InMemoryStore, PgStore};

/// How often the health monitor polls its probes
const HEALTH_CHECK_INTERVAL: std::time::Duration = std::time::Duration::from_secs(10);

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with environment-based filtering
    // Default to INFO level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,marketplace_orders=debug"))
        )
        .init();

    let config = AppConfig::from_env()?;
    error::enable_diagnostics(config.environment.is_development());
    tracing::info!(environment = ?config.environment, "Starting marketplace order service");

    // === 1. Metrics ===
    let metrics = Arc::new(metrics::Metrics::new()?);
    tracing::info!("Metrics registry created with {} metrics", metrics.registry().gather().len());

    // === 2. Storage backend ===
    let backends = match &config.database.url {
        Some(url) => {
            let store = PgStore::connect(url, config.database.max_connections)
                .await
                .context("connecting to Postgres")?;
            store.migrate().await.context("applying schema")?;
            Backends::from_store(Arc::new(store))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store");
            Backends::from_store(Arc::new(InMemoryStore::new()))
        }
    };

    if let Some(path) = &config.catalog_seed_path {
        seed_catalog(backends.catalog.as_ref(), path).await?;
    }

    // === 3. Payment collaborator (with circuit breaker) ===
    let gateway = Arc::new(
        GuardedGateway::new(
            Arc::new(SandboxGateway::new(config.payment.checkout_base_url.clone())),
            config.payment.circuit_breaker(),
        )
        .with_metrics(metrics.clone()),
    );
    let verifier = Arc::new(SignatureVerifier::new(
        config.payment.webhook_secret.clone(),
        config.payment.webhook_tolerance_secs,
    ));

    // === 4. Services ===
    let hold = chrono::Duration::from_std(config.reservation.hold).context("reservation hold out of range")?;
    let orders = Arc::new(OrderLifecycleService::new(
        backends.clone(),
        gateway.clone(),
        metrics.clone(),
        hold,
    ));
    let carts = Arc::new(CartService::new(backends.clone()));
    let reconciler = Arc::new(PaymentReconciler::new(backends.clone(), metrics.clone()));

    let blocklist = Arc::new(TokenBlocklist::new());
    let authenticator = Arc::new(JwtAuthenticator::new(&config.jwt_secret, blocklist.clone()));

    // === 5. Background actors ===
    let probes: Vec<Arc<dyn HealthCheck>> = vec![
        Arc::new(PaymentGatewayProbe::new(gateway)),
        Arc::new(StoreProbe::new(backends.orders.clone())),
    ];
    let health = HealthMonitorActor::spawn(
        HealthMonitorActor::new(probes, HEALTH_CHECK_INTERVAL).with_metrics(metrics.clone()),
    );
    let _reaper = ReservationReaper::spawn(ReservationReaper::new(
        reconciler.clone(),
        blocklist,
        config.reservation.reaper_interval,
    ));

    // === 6. HTTP server ===
    let state = http::AppState {
        orders,
        carts,
        reconciler,
        authenticator,
        verifier,
        health,
        metrics,
    };

    let (host, port) = config.bind_address();
    tracing::info!(host = %host, port = port, "HTTP server listening");

    HttpServer::new(move || App::new().configure(http::configure(state.clone())))
        .bind((host.as_str(), port))
        .with_context(|| format!("binding {host}:{port}"))?
        .run()
        .await?;

    tracing::info!("HTTP server stopped");
    Ok(())
}

/// Load products (stock included) from a JSON array
async fn seed_catalog(catalog: &dyn ProductCatalog, path: &str) -> anyhow::Result<()> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading catalog seed {path}"))?;
    let products: Vec<Product> =
        serde_json::from_str(&raw).with_context(|| format!("parsing catalog seed {path}"))?;

    for product in &products {
        catalog.upsert_product(product).await?;
    }

    tracing::info!(products = products.len(), path = %path, "Catalog seeded");
    Ok(())
}
