//! Service configuration loaded from environment variables.

use std::time::Duration;

use payments::DEFAULT_SETTLEMENT_DELAY;

/// Settings shared by the order and payment services.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default `0.0.0.0`)
/// - `PORT`: listen port (default depends on the service)
/// - `DATABASE_URL`: PostgreSQL connection string; unset selects the in-memory repository
/// - `AMQP_URL`: broker URL; unset disables publishing and consuming
/// - `EVENT_EXCHANGE`: topic exchange name (default `events`)
/// - `SERVICE_NAME`: producer name stamped on envelopes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    pub database_url: Option<String>,
    pub amqp_url: Option<String>,
    pub exchange: String,
    pub service_name: String,
}

impl ServiceConfig {
    pub const DEFAULT_EXCHANGE: &str = "events";

    /// Loads configuration, falling back to `default_port` and `default_service`.
    pub fn from_env(default_port: u16, default_service: &str) -> Self {
        Self {
            host: env_or("HOST", "0.0.0.0"),
            port: env_parse("PORT").unwrap_or(default_port),
            database_url: env_opt("DATABASE_URL"),
            amqp_url: env_opt("AMQP_URL"),
            exchange: env_or("EVENT_EXCHANGE", Self::DEFAULT_EXCHANGE),
            service_name: env_or("SERVICE_NAME", default_service),
        }
    }

    /// Defaults for the order service.
    pub fn orders() -> Self {
        Self::new(8081, "order-service")
    }

    /// Defaults for the payment service.
    pub fn payments() -> Self {
        Self::new(8082, "payment-service")
    }

    fn new(port: u16, service_name: &str) -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port,
            database_url: None,
            amqp_url: None,
            exchange: Self::DEFAULT_EXCHANGE.to_string(),
            service_name: service_name.to_string(),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Which payment provider the payment service talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProviderKind {
    /// Settle locally after a short delay.
    #[default]
    None,
    Mock,
    Stripe,
}

impl std::str::FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "" | "none" => Ok(ProviderKind::None),
            "mock" => Ok(ProviderKind::Mock),
            "stripe" => Ok(ProviderKind::Stripe),
            other => Err(format!("unknown payment provider: {other}")),
        }
    }
}

/// Payment service configuration.
///
/// Adds to [`ServiceConfig`]:
/// - `PAYMENT_PROVIDER`: `none`, `mock` or `stripe` (default `none`)
/// - `STRIPE_SECRET_KEY`, `STRIPE_API_BASE`
/// - `SETTLEMENT_DELAY_MS`: local settlement delay without a provider (default `100`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentConfig {
    pub service: ServiceConfig,
    pub provider: ProviderKind,
    pub stripe_secret_key: Option<String>,
    pub stripe_api_base: String,
    pub settlement_delay: Duration,
}

impl PaymentConfig {
    pub fn from_env() -> Self {
        let provider = match std::env::var("PAYMENT_PROVIDER") {
            Ok(value) => value.parse().unwrap_or_else(|e: String| {
                tracing::warn!(error = %e, "falling back to local settlement");
                ProviderKind::None
            }),
            Err(_) => ProviderKind::None,
        };

        Self {
            service: ServiceConfig::from_env(8082, "payment-service"),
            provider,
            stripe_secret_key: env_opt("STRIPE_SECRET_KEY"),
            stripe_api_base: env_or("STRIPE_API_BASE", payments::provider::DEFAULT_API_BASE),
            settlement_delay: env_parse("SETTLEMENT_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_SETTLEMENT_DELAY),
        }
    }
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            service: ServiceConfig::payments(),
            provider: ProviderKind::None,
            stripe_secret_key: None,
            stripe_api_base: payments::provider::DEFAULT_API_BASE.to_string(),
            settlement_delay: DEFAULT_SETTLEMENT_DELAY,
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_defaults() {
        let orders = ServiceConfig::orders();
        assert_eq!(orders.port, 8081);
        assert_eq!(orders.service_name, "order-service");
        assert_eq!(orders.exchange, "events");
        assert!(orders.database_url.is_none());
        assert!(orders.amqp_url.is_none());

        let payments = ServiceConfig::payments();
        assert_eq!(payments.port, 8082);
        assert_eq!(payments.service_name, "payment-service");
    }

    #[test]
    fn test_addr_formatting() {
        let config = ServiceConfig {
            host: "127.0.0.1".to_string(),
            ..ServiceConfig::orders()
        };
        assert_eq!(config.addr(), "127.0.0.1:8081");
    }

    #[test]
    fn test_provider_kind_parsing() {
        assert_eq!("none".parse::<ProviderKind>().unwrap(), ProviderKind::None);
        assert_eq!("Mock".parse::<ProviderKind>().unwrap(), ProviderKind::Mock);
        assert_eq!("stripe".parse::<ProviderKind>().unwrap(), ProviderKind::Stripe);
        assert!("paypal".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn test_payment_defaults() {
        let config = PaymentConfig::default();
        assert_eq!(config.provider, ProviderKind::None);
        assert_eq!(config.settlement_delay, Duration::from_millis(100));
        assert_eq!(config.stripe_api_base, "https://api.stripe.com");
    }
}
