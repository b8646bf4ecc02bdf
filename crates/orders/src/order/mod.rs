//! Order aggregate and related types.

mod aggregate;
mod commands;
pub mod events;
mod status;
mod value_objects;

pub use aggregate::Order;
pub use commands::{CreateOrder, ListOrders};
pub use events::{OrderCreated, OrderStatusChanged, PaymentOutcome};
pub use status::OrderStatus;
pub use value_objects::{DEFAULT_CURRENCY, NewOrderItem, OrderItem};
