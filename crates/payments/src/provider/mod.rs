//! External payment processors.
//!
//! The service only talks to a processor through [`PaymentProvider`]. Two
//! implementations ship with the crate: [`MockPaymentProvider`], a
//! deterministic in-process double, and [`StripeProvider`], which speaks the
//! Stripe REST API over `reqwest`.

mod mock;
mod stripe;

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use thiserror::Error;

pub use mock::MockPaymentProvider;
pub use stripe::{DEFAULT_API_BASE, StripeProvider};

/// Errors returned by a payment provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transport failure (connect, timeout, TLS).
    #[error("HTTP error: {0}")]
    Http(String),

    /// The provider answered with a non-success status.
    #[error("API error (status {status_code}): {message}")]
    Api { status_code: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    /// The provider refused the operation.
    #[error("Rejected by provider: {0}")]
    Rejected(String),

    #[error("Provider unavailable: {0}")]
    Unavailable(String),
}

/// A provider-side payment intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentIntent {
    pub intent_id: String,
    pub client_secret: String,
}

/// Result of confirming an intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirmation {
    Succeeded { transaction_id: String },
    Declined { reason: String },
}

/// Result of a refund request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefundOutcome {
    Refunded { refund_id: String },
    Rejected { reason: String },
}

/// Capability every payment processor offers.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Short name stored on payments handled by this provider.
    fn name(&self) -> &'static str;

    async fn create_payment_intent(
        &self,
        amount: Decimal,
        currency: &str,
    ) -> Result<PaymentIntent, ProviderError>;

    async fn confirm_payment(&self, intent_id: &str) -> Result<Confirmation, ProviderError>;

    /// Refunds `amount` (in `currency`) of the charge behind `transaction_id`.
    async fn refund(
        &self,
        transaction_id: &str,
        amount: Decimal,
        currency: &str,
    ) -> Result<RefundOutcome, ProviderError>;
}

const ZERO_DECIMAL_CURRENCIES: &[&str] = &[
    "BIF", "CLP", "DJF", "GNF", "JPY", "KMF", "KRW", "MGA", "PYG", "RWF", "UGX", "VND", "VUV",
    "XAF", "XOF", "XPF",
];

/// Converts a decimal amount into the integer minor units providers expect
/// (cents for USD, yen for JPY).
pub fn to_minor_units(amount: Decimal, currency: &str) -> Result<i64, ProviderError> {
    let upper = currency.to_uppercase();
    let scaled = if ZERO_DECIMAL_CURRENCIES.contains(&upper.as_str()) {
        Some(amount)
    } else {
        amount.checked_mul(Decimal::ONE_HUNDRED)
    };
    scaled
        .and_then(|minor| minor.round().to_i64())
        .ok_or_else(|| ProviderError::Config(format!("amount out of range: {amount}")))
}
