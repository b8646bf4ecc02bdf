//! Payment aggregate implementation.

use chrono::{DateTime, Utc};
use common::money::{fits_money_column, is_currency_code};
use common::{OrderId, PaymentId, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{CreatePayment, DEFAULT_CURRENCY, PaymentMethod, PaymentStatus};
use crate::PaymentError;

/// Payment aggregate root. One payment exists per order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub order_id: OrderId,
    pub user_id: UserId,
    pub amount: Decimal,
    pub currency: String,
    pub status: PaymentStatus,
    pub method: PaymentMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Provider-side reference: the payment intent id once one is opened.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// Validates a create command and builds a `pending` payment.
    pub fn create(cmd: CreatePayment) -> Result<Payment, PaymentError> {
        if cmd.amount <= Decimal::ZERO || !fits_money_column(cmd.amount) {
            return Err(PaymentError::InvalidAmount(cmd.amount));
        }

        let currency = cmd
            .currency
            .map(|c| c.trim().to_uppercase())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| DEFAULT_CURRENCY.to_string());
        if !is_currency_code(&currency) {
            return Err(PaymentError::InvalidCurrency(currency));
        }

        let now = Utc::now();
        Ok(Payment {
            id: PaymentId::new(),
            order_id: cmd.order_id,
            user_id: cmd.user_id,
            amount: cmd.amount,
            currency,
            status: PaymentStatus::Pending,
            method: cmd.method,
            description: cmd.description,
            transaction_id: None,
            provider: None,
            failure_reason: None,
            paid_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Records the provider intent backing this payment.
    pub fn attach_intent(&mut self, provider: &str, intent_id: String) {
        self.provider = Some(provider.to_string());
        self.transaction_id = Some(intent_id);
    }

    /// Moves a pending payment to `processing`.
    pub fn start_processing(&mut self, at: DateTime<Utc>) -> Result<(), PaymentError> {
        if !self.status.can_process() {
            return Err(PaymentError::NotPending(self.status));
        }
        self.status = PaymentStatus::Processing;
        self.updated_at = at;
        Ok(())
    }

    /// Returns a `processing` payment to `pending` when the outcome of an
    /// attempt could not be saved.
    pub fn reset_to_pending(&mut self, at: DateTime<Utc>) {
        self.status = PaymentStatus::Pending;
        self.updated_at = at;
    }

    pub fn succeed(&mut self, transaction_id: Option<String>, at: DateTime<Utc>) {
        if transaction_id.is_some() {
            self.transaction_id = transaction_id;
        }
        self.status = PaymentStatus::Success;
        self.failure_reason = None;
        self.paid_at = Some(at);
        self.updated_at = at;
    }

    pub fn fail(&mut self, reason: impl Into<String>, at: DateTime<Utc>) {
        self.status = PaymentStatus::Failed;
        self.failure_reason = Some(reason.into());
        self.updated_at = at;
    }

    /// Checks that `amount` can be refunded and marks the payment refunded.
    pub fn refund(&mut self, amount: Decimal, at: DateTime<Utc>) -> Result<(), PaymentError> {
        self.ensure_refundable(amount)?;
        self.status = PaymentStatus::Refunded;
        self.updated_at = at;
        Ok(())
    }

    pub fn ensure_refundable(&self, amount: Decimal) -> Result<(), PaymentError> {
        if !self.status.can_refund() {
            return Err(PaymentError::NotRefundable(self.status));
        }
        if amount <= Decimal::ZERO || amount > self.amount {
            return Err(PaymentError::InvalidRefundAmount {
                requested: amount,
                available: self.amount,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payment() -> Payment {
        Payment::create(CreatePayment::new(
            OrderId::new(),
            UserId::new(),
            Decimal::new(4999, 2),
        ))
        .unwrap()
    }

    #[test]
    fn test_create_defaults() {
        let payment = payment();
        assert_eq!(payment.status, PaymentStatus::Pending);
        assert_eq!(payment.currency, "USD");
        assert_eq!(payment.method, PaymentMethod::Card);
        assert!(payment.transaction_id.is_none());
    }

    #[test]
    fn test_create_rejects_non_positive_amount() {
        for amount in [Decimal::ZERO, Decimal::NEGATIVE_ONE] {
            let result = Payment::create(CreatePayment::new(OrderId::new(), UserId::new(), amount));
            assert!(matches!(result, Err(PaymentError::InvalidAmount(_))));
        }
    }

    #[test]
    fn test_create_rejects_amounts_the_store_cannot_hold() {
        let too_precise = Decimal::new(10005, 3);
        let too_large = common::money::MAX_AMOUNT + Decimal::new(1, 2);
        for amount in [too_precise, too_large, Decimal::MAX] {
            let result = Payment::create(CreatePayment::new(OrderId::new(), UserId::new(), amount));
            assert!(
                matches!(result, Err(PaymentError::InvalidAmount(a)) if a == amount),
                "{amount}"
            );
        }

        let at_max = Payment::create(CreatePayment::new(
            OrderId::new(),
            UserId::new(),
            common::money::MAX_AMOUNT,
        ))
        .unwrap();
        assert_eq!(at_max.amount, common::money::MAX_AMOUNT);
    }

    #[test]
    fn test_create_rejects_bad_currency() {
        for currency in ["EURO", "$", "u5d"] {
            let result = Payment::create(
                CreatePayment::new(OrderId::new(), UserId::new(), Decimal::ONE)
                    .with_currency(currency),
            );
            assert!(
                matches!(result, Err(PaymentError::InvalidCurrency(_))),
                "{currency}"
            );
        }
    }

    #[test]
    fn test_currency_is_normalised() {
        let payment = Payment::create(
            CreatePayment::new(OrderId::new(), UserId::new(), Decimal::ONE).with_currency(" eur "),
        )
        .unwrap();
        assert_eq!(payment.currency, "EUR");
    }

    #[test]
    fn test_processing_requires_pending() {
        let mut payment = payment();
        payment.start_processing(Utc::now()).unwrap();
        assert_eq!(payment.status, PaymentStatus::Processing);

        let err = payment.start_processing(Utc::now()).unwrap_err();
        assert!(matches!(err, PaymentError::NotPending(PaymentStatus::Processing)));
    }

    #[test]
    fn test_reset_allows_another_attempt() {
        let mut payment = payment();
        payment.start_processing(Utc::now()).unwrap();
        payment.reset_to_pending(Utc::now());
        assert_eq!(payment.status, PaymentStatus::Pending);
        payment.start_processing(Utc::now()).unwrap();
    }

    #[test]
    fn test_succeed_keeps_existing_transaction_id() {
        let mut payment = payment();
        payment.attach_intent("mock", "pi_1".into());
        payment.succeed(None, Utc::now());
        assert_eq!(payment.transaction_id.as_deref(), Some("pi_1"));
        assert!(payment.paid_at.is_some());
    }

    #[test]
    fn test_refund_rules() {
        let mut payment = payment();
        assert!(matches!(
            payment.refund(payment.amount, Utc::now()),
            Err(PaymentError::NotRefundable(PaymentStatus::Pending))
        ));

        payment.succeed(Some("ch_1".into()), Utc::now());
        assert!(matches!(
            payment.refund(payment.amount + Decimal::ONE, Utc::now()),
            Err(PaymentError::InvalidRefundAmount { .. })
        ));
        payment.refund(Decimal::TEN, Utc::now()).unwrap();
        assert_eq!(payment.status, PaymentStatus::Refunded);
    }
}
