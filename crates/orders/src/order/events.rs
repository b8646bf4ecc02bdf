//! Events produced and consumed by the order service.

use chrono::{DateTime, Utc};
use common::{OrderId, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{Order, OrderStatus};

pub const ORDER_CREATED: &str = "order.created";
pub const ORDER_STATUS_CHANGED: &str = "order.status_changed";

pub const PAYMENT_SUCCESS: &str = "payment.success";
pub const PAYMENT_FAILED: &str = "payment.failed";
pub const USER_CREATED: &str = "user.created";

/// Payload of `order.created`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCreated {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub total_amount: Decimal,
    pub currency: String,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

impl From<&Order> for OrderCreated {
    fn from(order: &Order) -> Self {
        Self {
            order_id: order.id,
            user_id: order.user_id,
            total_amount: order.total_amount,
            currency: order.currency.clone(),
            status: order.status,
            created_at: order.created_at,
        }
    }
}

/// Payload of `order.status_changed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatusChanged {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub old_status: OrderStatus,
    pub new_status: OrderStatus,
    pub changed_at: DateTime<Utc>,
}

/// The fields of `payment.success` / `payment.failed` this service reads.
///
/// Unknown fields are ignored so the payment service can extend its payloads.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PaymentOutcome {
    pub order_id: OrderId,
    #[serde(default)]
    pub payment_id: Option<String>,
    #[serde(default)]
    pub failure_reason: Option<String>,
}
