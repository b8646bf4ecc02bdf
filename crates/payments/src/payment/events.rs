//! Events produced and consumed by the payment service.

use chrono::{DateTime, Utc};
use common::{OrderId, PaymentId, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Payment;

pub const PAYMENT_SUCCESS: &str = "payment.success";
pub const PAYMENT_FAILED: &str = "payment.failed";

pub const ORDER_CREATED: &str = "order.created";

/// Payload of `payment.success`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSucceeded {
    pub payment_id: PaymentId,
    pub order_id: OrderId,
    pub user_id: UserId,
    pub amount: Decimal,
    pub currency: String,
    pub transaction_id: Option<String>,
    pub paid_at: DateTime<Utc>,
}

impl From<&Payment> for PaymentSucceeded {
    fn from(payment: &Payment) -> Self {
        Self {
            payment_id: payment.id,
            order_id: payment.order_id,
            user_id: payment.user_id,
            amount: payment.amount,
            currency: payment.currency.clone(),
            transaction_id: payment.transaction_id.clone(),
            paid_at: payment.paid_at.unwrap_or(payment.updated_at),
        }
    }
}

/// Payload of `payment.failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentFailed {
    pub payment_id: PaymentId,
    pub order_id: OrderId,
    pub user_id: UserId,
    pub amount: Decimal,
    pub currency: String,
    pub failure_reason: String,
    pub failed_at: DateTime<Utc>,
}

impl From<&Payment> for PaymentFailed {
    fn from(payment: &Payment) -> Self {
        Self {
            payment_id: payment.id,
            order_id: payment.order_id,
            user_id: payment.user_id,
            amount: payment.amount,
            currency: payment.currency.clone(),
            failure_reason: payment.failure_reason.clone().unwrap_or_default(),
            failed_at: payment.updated_at,
        }
    }
}

/// The fields of `order.created` this service reads.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OrderPlaced {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub total_amount: Decimal,
    #[serde(default)]
    pub currency: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CreatePayment;

    #[test]
    fn test_payment_success_wire_shape() {
        let mut payment = Payment::create(CreatePayment::new(
            OrderId::new(),
            UserId::new(),
            Decimal::new(1050, 2),
        ))
        .unwrap();
        payment.succeed(Some("pi_123".into()), Utc::now());

        let json = serde_json::to_value(PaymentSucceeded::from(&payment)).unwrap();
        assert_eq!(json["amount"], "10.50");
        assert_eq!(json["transaction_id"], "pi_123");
        assert_eq!(json["order_id"], payment.order_id.to_string());
        assert!(json["paid_at"].is_string());
    }

    #[test]
    fn test_order_placed_reads_order_created_payload() {
        let order_id = OrderId::new();
        let placed: OrderPlaced = serde_json::from_value(serde_json::json!({
            "order_id": order_id.to_string(),
            "user_id": "0c9d8e7f-6a5b-4c3d-2e1f-0a9b8c7d6e5f",
            "total_amount": "64.97",
            "currency": "USD",
            "status": "pending",
            "created_at": "2024-01-01T00:00:00Z"
        }))
        .unwrap();
        assert_eq!(placed.order_id, order_id);
        assert_eq!(placed.total_amount, Decimal::new(6497, 2));
    }
}
