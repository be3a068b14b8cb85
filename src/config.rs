use std::env;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::utils::CircuitBreakerConfig;

// ============================================================================
// Configuration - loaded from the environment (and `.env` if present)
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Test,
}

impl Environment {
    fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "development" | "dev" => Environment::Development,
            "test" => Environment::Test,
            _ => Environment::Production,
        }
    }

    pub fn is_development(&self) -> bool {
        *self == Environment::Development
    }
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Postgres when set, in-memory store otherwise
    pub url: Option<String>,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct PaymentConfig {
    pub webhook_secret: String,
    pub webhook_tolerance_secs: i64,
    pub checkout_base_url: String,
    pub circuit_failure_threshold: u32,
    pub circuit_timeout: Duration,
}

impl PaymentConfig {
    pub fn circuit_breaker(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.circuit_failure_threshold,
            timeout: self.circuit_timeout,
            success_threshold: 2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReservationConfig {
    /// How long a deferred-payment order holds its stock
    pub hold: Duration,
    /// How often the reaper looks for expired holds
    pub reaper_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: Environment,
    pub http: HttpConfig,
    pub database: DatabaseConfig,
    pub jwt_secret: String,
    pub payment: PaymentConfig,
    pub reservation: ReservationConfig,
    /// JSON file of products to load at startup
    pub catalog_seed_path: Option<String>,
}

fn parsed<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{name} has an invalid value: {raw:?}")),
        Err(_) => Ok(default),
    }
}

fn required_secret(name: &str) -> Result<String> {
    let value = env::var(name).with_context(|| format!("{name} must be set"))?;
    if value.trim().is_empty() {
        bail!("{name} must not be empty");
    }
    Ok(value)
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            environment: Environment::parse(&env::var("APP_ENV").unwrap_or_else(|_| "production".to_string())),
            http: HttpConfig {
                host: env::var("HTTP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: parsed("HTTP_PORT", 8080)?,
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").ok().filter(|url| !url.trim().is_empty()),
                max_connections: parsed("DATABASE_MAX_CONNECTIONS", 10)?,
            },
            jwt_secret: required_secret("JWT_SECRET")?,
            payment: PaymentConfig {
                webhook_secret: required_secret("WEBHOOK_SECRET")?,
                webhook_tolerance_secs: parsed("WEBHOOK_TOLERANCE_SECS", 300)?,
                checkout_base_url: env::var("CHECKOUT_BASE_URL")
                    .unwrap_or_else(|_| "https://checkout.sandbox.local/pay".to_string()),
                circuit_failure_threshold: parsed("PAYMENT_CB_FAILURE_THRESHOLD", 5)?,
                circuit_timeout: Duration::from_secs(parsed("PAYMENT_CB_TIMEOUT_SECS", 30)?),
            },
            reservation: ReservationConfig {
                hold: Duration::from_secs(parsed("RESERVATION_HOLD_SECS", 30 * 60)?),
                reaper_interval: Duration::from_secs(parsed("REAPER_INTERVAL_SECS", 60)?),
            },
            catalog_seed_path: env::var("CATALOG_SEED_PATH").ok(),
        })
    }

    pub fn bind_address(&self) -> (String, u16) {
        (self.http.host.clone(), self.http.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_parsing() {
        assert!(Environment::parse("Development").is_development());
        assert_eq!(Environment::parse("test"), Environment::Test);
        assert_eq!(Environment::parse("staging"), Environment::Production);
    }

    #[test]
    fn test_parsed_falls_back_to_default() {
        let value: u32 = parsed("MARKETPLACE_ORDERS_UNSET_FOR_TEST", 7).unwrap();
        assert_eq!(value, 7);
    }
}
