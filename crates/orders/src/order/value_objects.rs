//! Value objects for the order domain.

use common::{OrderId, OrderItemId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Currency used when the caller does not pick one.
pub const DEFAULT_CURRENCY: &str = "USD";

/// An item as submitted by the caller, before it belongs to an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrderItem {
    /// Product identifier (SKU).
    pub product_id: String,

    /// Human-readable product name.
    pub product_name: String,

    /// Quantity ordered.
    pub quantity: i32,

    /// Price per unit.
    pub unit_price: Decimal,
}

impl NewOrderItem {
    pub fn new(
        product_id: impl Into<String>,
        product_name: impl Into<String>,
        quantity: i32,
        unit_price: Decimal,
    ) -> Self {
        Self {
            product_id: product_id.into(),
            product_name: product_name.into(),
            quantity,
            unit_price,
        }
    }
}

/// A line of a stored order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub product_id: String,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
}

impl OrderItem {
    /// Returns the total price for this item (quantity * unit_price), or
    /// `None` when the product does not fit a `Decimal`.
    pub fn subtotal(&self) -> Option<Decimal> {
        self.unit_price.checked_mul(Decimal::from(self.quantity))
    }
}
