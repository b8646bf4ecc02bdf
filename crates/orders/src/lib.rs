//! Order service domain.
//!
//! This crate provides:
//! - the `Order` aggregate with its validated status machine
//! - `OrderRepository` with in-memory and PostgreSQL implementations
//! - `OrderService`, which persists orders and publishes `order.created` /
//!   `order.status_changed`
//! - the consumer that moves orders forward on `payment.success` /
//!   `payment.failed`

pub mod error;
pub mod handlers;
pub mod memory;
pub mod order;
pub mod postgres;
pub mod repository;
pub mod service;

pub use error::{OrderError, Result};
pub use handlers::{CONSUMER_QUEUE, SUBSCRIPTIONS, order_dispatcher};
pub use memory::InMemoryOrderRepository;
pub use order::{
    CreateOrder, DEFAULT_CURRENCY, ListOrders, NewOrderItem, Order, OrderCreated, OrderItem,
    OrderStatus, OrderStatusChanged, PaymentOutcome, events,
};
pub use postgres::PostgresOrderRepository;
pub use repository::OrderRepository;
pub use service::OrderService;
