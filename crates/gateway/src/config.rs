//! Gateway configuration loaded from environment variables.

use std::time::Duration;

use crate::loader::{DEFAULT_MAX_BATCH_SIZE, LoaderConfig};

/// Gateway configuration with defaults for local development.
///
/// Reads from environment variables:
/// - `HOST` / `PORT`: bind address (default: `0.0.0.0:8080`)
/// - `USER_SERVICE_URL`, `ORDER_SERVICE_URL`, `PAYMENT_SERVICE_URL`
/// - `BATCH_WINDOW_MS`: coalescing window (default: `5`)
/// - `MAX_BATCH_SIZE`: keys per downstream call (default: `100`)
/// - `DOWNSTREAM_TIMEOUT_MS`: per downstream request (default: `5000`)
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    pub user_service_url: String,
    pub order_service_url: String,
    pub payment_service_url: String,
    pub batch_window: Duration,
    pub max_batch_size: usize,
    pub downstream_timeout: Duration,
}

impl GatewayConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("HOST").unwrap_or(defaults.host),
            port: env_parse("PORT").unwrap_or(defaults.port),
            user_service_url: std::env::var("USER_SERVICE_URL")
                .unwrap_or(defaults.user_service_url),
            order_service_url: std::env::var("ORDER_SERVICE_URL")
                .unwrap_or(defaults.order_service_url),
            payment_service_url: std::env::var("PAYMENT_SERVICE_URL")
                .unwrap_or(defaults.payment_service_url),
            batch_window: env_parse("BATCH_WINDOW_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.batch_window),
            max_batch_size: env_parse("MAX_BATCH_SIZE").unwrap_or(defaults.max_batch_size),
            downstream_timeout: env_parse("DOWNSTREAM_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.downstream_timeout),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn loader_config(&self) -> LoaderConfig {
        LoaderConfig {
            window: self.batch_window,
            max_batch_size: self.max_batch_size,
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            user_service_url: "http://localhost:8083".to_string(),
            order_service_url: "http://localhost:8081".to_string(),
            payment_service_url: "http://localhost:8082".to_string(),
            batch_window: Duration::from_millis(5),
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            downstream_timeout: Duration::from_millis(5000),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
