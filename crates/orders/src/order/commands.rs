//! Order commands and queries.

use common::UserId;
use serde::Deserialize;

use super::{NewOrderItem, OrderStatus};

/// Command to create a new order.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrder {
    /// The customer placing the order.
    pub user_id: UserId,

    /// Items to order; must not be empty.
    pub items: Vec<NewOrderItem>,

    /// Where the order ships to.
    pub shipping_address: String,

    /// Free-form notes.
    #[serde(default)]
    pub notes: Option<String>,

    /// ISO currency code; `USD` when omitted.
    #[serde(default)]
    pub currency: Option<String>,
}

impl CreateOrder {
    /// Creates a command with the default currency and no notes.
    pub fn new(
        user_id: UserId,
        items: Vec<NewOrderItem>,
        shipping_address: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            items,
            shipping_address: shipping_address.into(),
            notes: None,
            currency: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = Some(currency.into());
        self
    }
}

/// Filter and page for listing orders.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOrders {
    pub user_id: Option<UserId>,
    pub status: Option<OrderStatus>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl ListOrders {
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

    pub fn for_user(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
            ..Default::default()
        }
    }
}
