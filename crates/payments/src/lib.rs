//! Payment service domain.
//!
//! This crate provides:
//! - the `Payment` aggregate and its status rules
//! - `PaymentProvider`, the abstraction over external payment processors, with
//!   a deterministic mock and a Stripe-style HTTP implementation
//! - `PaymentRepository` with in-memory and PostgreSQL implementations
//! - `PaymentService`, which creates, processes and refunds payments and
//!   publishes `payment.success` / `payment.failed`
//! - the consumer that opens a payment for every `order.created`

pub mod error;
pub mod handlers;
pub mod memory;
pub mod payment;
pub mod postgres;
pub mod provider;
pub mod repository;
pub mod service;

pub use error::{PaymentError, Result};
pub use handlers::{CONSUMER_QUEUE, SUBSCRIPTIONS, payment_dispatcher};
pub use memory::InMemoryPaymentRepository;
pub use payment::{
    CreatePayment, ListPayments, OrderPlaced, Payment, PaymentFailed, PaymentMethod,
    PaymentStatus, PaymentSucceeded, events,
};
pub use postgres::PostgresPaymentRepository;
pub use provider::{
    Confirmation, MockPaymentProvider, PaymentIntent, PaymentProvider, ProviderError,
    RefundOutcome, StripeProvider,
};
pub use repository::PaymentRepository;
pub use service::{DEFAULT_SETTLEMENT_DELAY, PaymentService};
