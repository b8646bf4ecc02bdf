//! Asynchronous messaging for the order fulfillment services.
//!
//! This crate provides:
//! - `EventEnvelope`, the immutable JSON message every service publishes
//! - `MessageBus`, a broker client abstraction with an AMQP implementation
//!   (`AmqpBus`) and an in-process one (`InMemoryBus`) for tests and local runs
//! - `EventPublisher`, which stamps envelopes with the producing service and
//!   routes them as `<service>.<event-type>`
//! - `EventDispatcher`, which maps event types to handlers and turns handler
//!   outcomes into ack / requeue / drop decisions
//!
//! Delivery is at-least-once. Handlers must be idempotent.

pub mod amqp;
pub mod bus;
pub mod dispatcher;
pub mod envelope;
pub mod error;
pub mod memory;
pub mod publisher;

pub use amqp::AmqpBus;
pub use bus::{
    Acknowledge, Delivery, DeliveryStream, MessageBus, QueueHandle, declare_subscription,
};
pub use dispatcher::{
    Disposition, EventDispatcher, EventHandler, HandlerContext, HandlerError, Unprocessable,
    handler_fn,
};
pub use envelope::{EventEnvelope, EventEnvelopeBuilder, TraceId, routing_key};
pub use error::{BusError, Result};
pub use memory::{InMemoryBus, QueueStats};
pub use publisher::EventPublisher;
