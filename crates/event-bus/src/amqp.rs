//! AMQP 0.9.1 broker client (RabbitMQ) built on `lapin`.

use async_trait::async_trait;
use futures_util::StreamExt;
use lapin::acker::Acker;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions, BasicQosOptions,
    ConfirmSelectOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};

use crate::bus::{Acknowledge, Delivery, DeliveryStream, MessageBus, QueueHandle};
use crate::{BusError, EventEnvelope, Result};

/// Unacknowledged deliveries a consumer may hold at once.
const DEFAULT_PREFETCH: u16 = 16;

/// Persistent delivery mode.
const PERSISTENT: u8 = 2;

/// Message bus backed by a single AMQP connection and channel.
///
/// Publishing waits for publisher confirms, so `publish` returning `Ok`
/// means the broker accepted the message.
#[derive(Clone)]
pub struct AmqpBus {
    connection: std::sync::Arc<Connection>,
    channel: Channel,
}

impl AmqpBus {
    /// Connects to the broker, opens a channel and enables publisher confirms.
    #[tracing::instrument(skip(url))]
    pub async fn connect(url: &str) -> Result<Self> {
        let connection = Connection::connect(url, ConnectionProperties::default())
            .await
            .map_err(|e| BusError::Connection(e.to_string()))?;

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| BusError::Connection(e.to_string()))?;

        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|e| BusError::Connection(e.to_string()))?;

        channel
            .basic_qos(DEFAULT_PREFETCH, BasicQosOptions::default())
            .await
            .map_err(|e| BusError::Connection(e.to_string()))?;

        tracing::info!("connected to AMQP broker");
        Ok(Self {
            connection: std::sync::Arc::new(connection),
            channel,
        })
    }
}

#[async_trait]
impl MessageBus for AmqpBus {
    async fn declare_exchange(&self, name: &str) -> Result<()> {
        self.channel
            .exchange_declare(
                name,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| BusError::Declare(format!("exchange '{name}': {e}")))
    }

    async fn declare_queue(&self, name: &str) -> Result<QueueHandle> {
        self.channel
            .queue_declare(
                name,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| BusError::Declare(format!("queue '{name}': {e}")))?;
        Ok(QueueHandle::new(name))
    }

    async fn bind_queue(&self, queue: &QueueHandle, exchange: &str, pattern: &str) -> Result<()> {
        self.channel
            .queue_bind(
                queue.name(),
                exchange,
                pattern,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| {
                BusError::Declare(format!(
                    "binding '{}' -> '{exchange}' ({pattern}): {e}",
                    queue.name()
                ))
            })
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        envelope: &EventEnvelope,
    ) -> Result<()> {
        let payload = envelope.to_bytes()?;
        let properties = BasicProperties::default()
            .with_content_type("application/json".into())
            .with_delivery_mode(PERSISTENT)
            .with_correlation_id(envelope.trace_id.as_str().into())
            .with_timestamp(envelope.timestamp.timestamp().max(0) as u64)
            .with_app_id(envelope.service.as_str().into())
            .with_kind(envelope.event_type.as_str().into());

        let confirm = self
            .channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions::default(),
                &payload,
                properties,
            )
            .await
            .map_err(|e| BusError::Publish(e.to_string()))?;

        let confirmation = confirm
            .await
            .map_err(|e| BusError::Publish(format!("confirmation failed: {e}")))?;

        if confirmation.is_nack() {
            return Err(BusError::Publish(format!(
                "broker rejected message {routing_key}"
            )));
        }
        Ok(())
    }

    async fn consume(&self, queue: &QueueHandle, consumer_tag: &str) -> Result<DeliveryStream> {
        let consumer = self
            .channel
            .basic_consume(
                queue.name(),
                consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| BusError::Consume(format!("queue '{}': {e}", queue.name())))?;

        let stream = consumer.map(|result| {
            result
                .map(|delivery| {
                    Delivery::new(
                        delivery.data,
                        delivery.routing_key.as_str(),
                        delivery.redelivered,
                        Box::new(AmqpAcker(delivery.acker)),
                    )
                })
                .map_err(|e| BusError::Consume(e.to_string()))
        });

        Ok(Box::pin(stream))
    }

    async fn close(&self) -> Result<()> {
        self.channel
            .close(200, "shutdown")
            .await
            .map_err(|e| BusError::Connection(e.to_string()))?;
        self.connection
            .close(200, "shutdown")
            .await
            .map_err(|e| BusError::Connection(e.to_string()))
    }
}

struct AmqpAcker(Acker);

#[async_trait]
impl Acknowledge for AmqpAcker {
    async fn ack(&self) -> Result<()> {
        self.0
            .ack(BasicAckOptions::default())
            .await
            .map_err(|e| BusError::Acknowledge(e.to_string()))
    }

    async fn nack(&self, requeue: bool) -> Result<()> {
        self.0
            .nack(BasicNackOptions {
                requeue,
                multiple: false,
            })
            .await
            .map_err(|e| BusError::Acknowledge(e.to_string()))
    }
}
