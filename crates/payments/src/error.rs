use common::{ErrorKind, OrderId, PaymentId};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::payment::PaymentStatus;
use crate::provider::ProviderError;

/// Errors that can occur during payment operations.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// Amount not positive, finer than cents, or above the storable maximum.
    #[error(
        "Invalid payment amount: {0} (must be greater than 0, with at most 2 decimal places and at most {max})",
        max = common::money::MAX_AMOUNT
    )]
    InvalidAmount(Decimal),

    /// Currency is not a three-letter code.
    #[error("Invalid currency: {0} (expected a 3-letter code such as USD)")]
    InvalidCurrency(String),

    /// Refund amount outside `(0, amount]`.
    #[error("Invalid refund amount: {requested} (payment amount is {available})")]
    InvalidRefundAmount { requested: Decimal, available: Decimal },

    /// Unknown status name.
    #[error("Invalid payment status: {0}")]
    InvalidStatus(String),

    /// Unknown payment method name.
    #[error("Invalid payment method: {0}")]
    InvalidMethod(String),

    /// The order already has a payment.
    #[error("Payment already exists for order {0}")]
    AlreadyExists(OrderId),

    /// `process` called on a payment that is not pending.
    #[error("Payment cannot be processed in {0} status")]
    NotPending(PaymentStatus),

    /// `refund` called on a payment that did not succeed.
    #[error("Only successful payments can be refunded")]
    NotRefundable(PaymentStatus),

    /// Payment not found.
    #[error("Payment not found: {0}")]
    NotFound(PaymentId),

    /// No payment belongs to the order.
    #[error("Payment not found for order: {0}")]
    NotFoundForOrder(OrderId),

    /// The payment provider failed or rejected the call.
    #[error("Payment provider error: {0}")]
    Provider(#[from] ProviderError),

    /// The settlement task was cancelled before it finished.
    #[error("Payment settlement aborted: {0}")]
    Aborted(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl PaymentError {
    /// Category of the error, used for HTTP mapping and retry decisions.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PaymentError::InvalidAmount(_)
            | PaymentError::InvalidCurrency(_)
            | PaymentError::InvalidRefundAmount { .. }
            | PaymentError::InvalidStatus(_)
            | PaymentError::InvalidMethod(_) => ErrorKind::InvalidInput,
            PaymentError::AlreadyExists(_)
            | PaymentError::NotPending(_)
            | PaymentError::NotRefundable(_) => ErrorKind::Conflict,
            PaymentError::NotFound(_) | PaymentError::NotFoundForOrder(_) => ErrorKind::NotFound,
            PaymentError::Provider(_) => ErrorKind::ServiceUnavailable,
            PaymentError::Database(_) => ErrorKind::Database,
            PaymentError::Aborted(_) => ErrorKind::Internal,
        }
    }
}

/// Convenience type alias for payment results.
pub type Result<T> = std::result::Result<T, PaymentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds() {
        assert_eq!(
            PaymentError::InvalidAmount(Decimal::ZERO).kind(),
            ErrorKind::InvalidInput
        );
        assert_eq!(
            PaymentError::InvalidCurrency("usdollar".into()).kind(),
            ErrorKind::InvalidInput
        );
        assert_eq!(
            PaymentError::AlreadyExists(OrderId::new()).kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            PaymentError::NotPending(PaymentStatus::Success).kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            PaymentError::Provider(ProviderError::Unavailable("down".into())).kind(),
            ErrorKind::ServiceUnavailable
        );
        assert!(
            PaymentError::Provider(ProviderError::Unavailable("down".into()))
                .kind()
                .is_retryable()
        );
    }

    #[test]
    fn refund_message_is_stable() {
        let err = PaymentError::NotRefundable(PaymentStatus::Pending);
        assert_eq!(err.to_string(), "Only successful payments can be refunded");
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }
}
