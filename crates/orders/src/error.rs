use common::{ErrorKind, OrderId};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::order::OrderStatus;

/// Errors that can occur during order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    /// Order has no items.
    #[error("Order must contain at least one item")]
    NoItems,

    /// Item quantity below one.
    #[error("Invalid quantity for product {product_id}: {quantity} (must be at least 1)")]
    InvalidQuantity { product_id: String, quantity: i32 },

    /// Item price not positive, finer than cents, or above the storable maximum.
    #[error(
        "Invalid unit price for product {product_id}: {price} (must be greater than 0, with at most 2 decimal places and at most {max})",
        max = common::money::MAX_AMOUNT
    )]
    InvalidPrice { product_id: String, price: Decimal },

    /// The items add up to more than an order total can hold.
    #[error("Order total exceeds the maximum amount of {}", common::money::MAX_AMOUNT)]
    TotalTooLarge,

    /// Currency is not a three-letter code.
    #[error("Invalid currency: {0} (expected a 3-letter code such as USD)")]
    InvalidCurrency(String),

    /// Missing shipping address.
    #[error("Shipping address is required")]
    ShippingAddressRequired,

    /// Unknown status name.
    #[error("Invalid order status: {0}")]
    InvalidStatus(String),

    /// The requested status is not reachable from the current one.
    #[error("Invalid status transition: cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// Order not found.
    #[error("Order not found: {0}")]
    NotFound(OrderId),

    /// An order with this id is already stored.
    #[error("Order already exists: {0}")]
    AlreadyExists(OrderId),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl OrderError {
    /// Category of the error, used for HTTP mapping and retry decisions.
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrderError::NoItems
            | OrderError::InvalidQuantity { .. }
            | OrderError::InvalidPrice { .. }
            | OrderError::TotalTooLarge
            | OrderError::InvalidCurrency(_)
            | OrderError::ShippingAddressRequired
            | OrderError::InvalidStatus(_) => ErrorKind::InvalidInput,
            OrderError::InvalidTransition { .. } | OrderError::AlreadyExists(_) => {
                ErrorKind::Conflict
            }
            OrderError::NotFound(_) => ErrorKind::NotFound,
            OrderError::Database(_) => ErrorKind::Database,
        }
    }
}

/// Convenience type alias for order results.
pub type Result<T> = std::result::Result<T, OrderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds() {
        assert_eq!(OrderError::NoItems.kind(), ErrorKind::InvalidInput);
        assert_eq!(
            OrderError::InvalidCurrency("EURO".into()).kind(),
            ErrorKind::InvalidInput
        );
        assert_eq!(
            OrderError::InvalidTransition {
                from: OrderStatus::Delivered,
                to: OrderStatus::Pending
            }
            .kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            OrderError::NotFound(OrderId::new()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            OrderError::Database(sqlx::Error::PoolTimedOut).kind(),
            ErrorKind::Database
        );
    }

    #[test]
    fn total_message_names_the_ceiling() {
        assert_eq!(
            OrderError::TotalTooLarge.to_string(),
            "Order total exceeds the maximum amount of 9999999999.99"
        );
    }

    #[test]
    fn transition_message_names_both_states() {
        let err = OrderError::InvalidTransition {
            from: OrderStatus::Shipped,
            to: OrderStatus::Cancelled,
        };
        assert_eq!(
            err.to_string(),
            "Invalid status transition: cannot move order from shipped to cancelled"
        );
    }
}
