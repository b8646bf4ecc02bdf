//! Order aggregate implementation.

use chrono::{DateTime, Utc};
use common::money::{MAX_AMOUNT, fits_money_column, is_currency_code};
use common::{OrderId, OrderItemId, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{CreateOrder, DEFAULT_CURRENCY, OrderItem, OrderStatus};
use crate::OrderError;

/// Order aggregate root.
///
/// The total is derived from the items when the order is created and never
/// edited afterwards; only the status changes over the order's life.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub status: OrderStatus,
    pub total_amount: Decimal,
    pub currency: String,
    pub shipping_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub items: Vec<OrderItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Validates a create command and builds a `pending` order.
    pub fn create(cmd: CreateOrder) -> Result<Order, OrderError> {
        if cmd.items.is_empty() {
            return Err(OrderError::NoItems);
        }
        if cmd.shipping_address.trim().is_empty() {
            return Err(OrderError::ShippingAddressRequired);
        }

        let id = OrderId::new();
        let mut items = Vec::with_capacity(cmd.items.len());
        for item in cmd.items {
            if item.quantity < 1 {
                return Err(OrderError::InvalidQuantity {
                    product_id: item.product_id,
                    quantity: item.quantity,
                });
            }
            if item.unit_price <= Decimal::ZERO || !fits_money_column(item.unit_price) {
                return Err(OrderError::InvalidPrice {
                    product_id: item.product_id,
                    price: item.unit_price,
                });
            }
            items.push(OrderItem {
                id: OrderItemId::new(),
                order_id: id,
                product_id: item.product_id,
                product_name: item.product_name,
                quantity: item.quantity,
                unit_price: item.unit_price,
            });
        }

        let currency = cmd
            .currency
            .map(|c| c.trim().to_uppercase())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| DEFAULT_CURRENCY.to_string());
        if !is_currency_code(&currency) {
            return Err(OrderError::InvalidCurrency(currency));
        }

        let now = Utc::now();
        let mut order = Order {
            id,
            user_id: cmd.user_id,
            status: OrderStatus::Pending,
            total_amount: Decimal::ZERO,
            currency,
            shipping_address: cmd.shipping_address,
            notes: cmd.notes,
            items,
            created_at: now,
            updated_at: now,
        };
        order.total_amount = order.items_total()?;
        Ok(order)
    }

    /// Sum of `unit_price * quantity` over all items.
    ///
    /// Fails with `TotalTooLarge` when the sum exceeds what the `total_amount`
    /// column can hold, including sums too large for a `Decimal`.
    pub fn items_total(&self) -> Result<Decimal, OrderError> {
        self.items
            .iter()
            .try_fold(Decimal::ZERO, |total, item| {
                item.subtotal().and_then(|subtotal| total.checked_add(subtotal))
            })
            .filter(|total| *total <= MAX_AMOUNT)
            .ok_or(OrderError::TotalTooLarge)
    }

    /// Moves the order to `next`.
    ///
    /// Returns the previous status, or `None` if the order already is in
    /// `next` (nothing changes). Fails with `InvalidTransition` when `next`
    /// is not reachable from the current status.
    pub fn transition_to(
        &mut self,
        next: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<OrderStatus>, OrderError> {
        if self.status == next {
            return Ok(None);
        }
        if !self.status.can_transition_to(next) {
            return Err(OrderError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        let previous = self.status;
        self.status = next;
        self.updated_at = at;
        Ok(Some(previous))
    }
}
