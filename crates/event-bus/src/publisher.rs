use std::sync::Arc;

use serde::Serialize;

use crate::{BusError, EventEnvelope, MessageBus, Result, TraceId, routing_key};

/// Publishes domain events on behalf of one service.
///
/// Every envelope is stamped with the service name and routed as
/// `<service>.<event-type>` on the configured exchange. A publisher built
/// with [`EventPublisher::disabled`] has no broker behind it and rejects
/// every publish with [`BusError::Disabled`].
#[derive(Clone, Debug)]
pub struct EventPublisher {
    bus: Option<Arc<dyn MessageBus>>,
    exchange: String,
    service: String,
}

impl EventPublisher {
    pub fn new(
        bus: Arc<dyn MessageBus>,
        exchange: impl Into<String>,
        service: impl Into<String>,
    ) -> Self {
        Self {
            bus: Some(bus),
            exchange: exchange.into(),
            service: service.into(),
        }
    }

    /// A publisher for a service running without a broker connection.
    pub fn disabled(service: impl Into<String>) -> Self {
        Self {
            bus: None,
            exchange: String::new(),
            service: service.into(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.bus.is_some()
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    /// Wraps `payload` in an envelope and publishes it.
    ///
    /// Returns the published envelope.
    #[tracing::instrument(skip(self, payload), fields(service = %self.service))]
    pub async fn publish<T: Serialize>(
        &self,
        event_type: &str,
        payload: &T,
        trace_id: &TraceId,
    ) -> Result<EventEnvelope> {
        let Some(bus) = &self.bus else {
            return Err(BusError::Disabled(self.service.clone()));
        };

        let envelope = EventEnvelope::builder()
            .event_type(event_type)
            .service(self.service.as_str())
            .trace_id(trace_id.clone())
            .payload(payload)?
            .build()?;

        let key = routing_key(&self.service, event_type);
        match bus.publish(&self.exchange, &key, &envelope).await {
            Ok(()) => {
                metrics::counter!("events_published_total", "event_type" => event_type.to_string())
                    .increment(1);
                tracing::debug!(routing_key = %key, %trace_id, "event published");
                Ok(envelope)
            }
            Err(e) => {
                metrics::counter!("events_publish_failed_total", "event_type" => event_type.to_string())
                    .increment(1);
                Err(e)
            }
        }
    }
}
