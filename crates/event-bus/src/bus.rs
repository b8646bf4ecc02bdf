use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;

use crate::{EventEnvelope, Result};

/// A declared queue.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueueHandle {
    name: String,
}

impl QueueHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Settles a single delivery with the broker.
#[async_trait]
pub trait Acknowledge: Send + Sync {
    /// Positive acknowledgment: the message is removed from the queue.
    async fn ack(&self) -> Result<()>;

    /// Negative acknowledgment. With `requeue` the broker redelivers the
    /// message; without it the message is dropped (or dead-lettered by the
    /// broker, if the queue is configured that way).
    async fn nack(&self, requeue: bool) -> Result<()>;
}

/// A raw message delivered from a queue, not yet decoded.
pub struct Delivery {
    /// Message body.
    pub data: Vec<u8>,

    /// Routing key the message was published with.
    pub routing_key: String,

    /// True if the broker delivered this message before.
    pub redelivered: bool,

    acker: Box<dyn Acknowledge>,
}

impl Delivery {
    pub fn new(
        data: Vec<u8>,
        routing_key: impl Into<String>,
        redelivered: bool,
        acker: Box<dyn Acknowledge>,
    ) -> Self {
        Self {
            data,
            routing_key: routing_key.into(),
            redelivered,
            acker,
        }
    }

    pub async fn ack(self) -> Result<()> {
        self.acker.ack().await
    }

    pub async fn nack(self, requeue: bool) -> Result<()> {
        self.acker.nack(requeue).await
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("routing_key", &self.routing_key)
            .field("redelivered", &self.redelivered)
            .field("len", &self.data.len())
            .finish()
    }
}

/// A stream of deliveries from one queue.
pub type DeliveryStream = Pin<Box<dyn Stream<Item = Result<Delivery>> + Send>>;

/// Broker client.
///
/// Declarations are durable and idempotent: declaring an existing exchange,
/// queue or binding again is a no-op. Consumers must settle every delivery
/// with `ack` or `nack`.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Declares a durable topic exchange.
    async fn declare_exchange(&self, name: &str) -> Result<()>;

    /// Declares a durable queue.
    async fn declare_queue(&self, name: &str) -> Result<QueueHandle>;

    /// Binds a queue to an exchange with a topic pattern
    /// (`*` matches one word, `#` matches zero or more words).
    async fn bind_queue(&self, queue: &QueueHandle, exchange: &str, pattern: &str) -> Result<()>;

    /// Publishes an envelope to an exchange under a routing key.
    async fn publish(&self, exchange: &str, routing_key: &str, envelope: &EventEnvelope)
    -> Result<()>;

    /// Starts consuming a queue with manual acknowledgment.
    async fn consume(&self, queue: &QueueHandle, consumer_tag: &str) -> Result<DeliveryStream>;

    /// Closes the connection. Delivery streams end afterwards.
    async fn close(&self) -> Result<()>;
}

impl std::fmt::Debug for dyn MessageBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MessageBus")
    }
}

/// Declares the exchange and the queue, then binds every pattern.
///
/// Safe to call on every startup.
pub async fn declare_subscription(
    bus: &dyn MessageBus,
    exchange: &str,
    queue: &str,
    patterns: &[&str],
) -> Result<QueueHandle> {
    bus.declare_exchange(exchange).await?;
    let handle = bus.declare_queue(queue).await?;
    for pattern in patterns {
        bus.bind_queue(&handle, exchange, pattern).await?;
    }
    tracing::info!(%exchange, %queue, ?patterns, "subscription declared");
    Ok(handle)
}
