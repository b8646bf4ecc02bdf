//! Payment commands and queries.

use common::{OrderId, UserId};
use rust_decimal::Decimal;
use serde::Deserialize;

use super::{PaymentMethod, PaymentStatus};

/// Command to open a payment for an order.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatePayment {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub amount: Decimal,

    /// ISO currency code; `USD` when omitted.
    #[serde(default)]
    pub currency: Option<String>,

    #[serde(default)]
    pub method: PaymentMethod,

    #[serde(default)]
    pub description: Option<String>,

    /// Client-side token for card payments. With a provider configured, a
    /// token makes creation open a payment intent straight away.
    #[serde(default)]
    pub payment_token: Option<String>,
}

impl CreatePayment {
    /// Creates a card payment command in the default currency.
    pub fn new(order_id: OrderId, user_id: UserId, amount: Decimal) -> Self {
        Self {
            order_id,
            user_id,
            amount,
            currency: None,
            method: PaymentMethod::Card,
            description: None,
            payment_token: None,
        }
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = Some(currency.into());
        self
    }

    pub fn with_method(mut self, method: PaymentMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.payment_token = Some(token.into());
        self
    }
}

/// Filter and page for listing payments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPayments {
    pub user_id: Option<UserId>,
    pub status: Option<PaymentStatus>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl ListPayments {
    pub const DEFAULT_LIMIT: u32 = 20;
    pub const MAX_LIMIT: u32 = 100;

    /// Page size, defaulted and clamped to `1..=MAX_LIMIT`.
    pub fn limit(&self) -> u32 {
        self.limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT)
    }

    pub fn offset(&self) -> u32 {
        self.offset.unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_payment_from_json_defaults_to_card() {
        let cmd: CreatePayment = serde_json::from_value(serde_json::json!({
            "order_id": "7f4e4b52-3b0e-4c5f-9d9a-1c2b3d4e5f60",
            "user_id": "0c9d8e7f-6a5b-4c3d-2e1f-0a9b8c7d6e5f",
            "amount": 42.5
        }))
        .unwrap();
        assert_eq!(cmd.method, PaymentMethod::Card);
        assert_eq!(cmd.amount, Decimal::new(425, 1));
        assert!(cmd.payment_token.is_none());
    }

    #[test]
    fn test_list_limit_is_clamped() {
        let query = ListPayments {
            limit: Some(1000),
            ..Default::default()
        };
        assert_eq!(query.limit(), 100);
        assert_eq!(ListPayments::default().limit(), 20);
    }
}
