use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use uuid::Uuid;

use crate::{BusError, Result};

/// Correlation id carried by every envelope and propagated from the request
/// (or consumed event) that caused it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TraceId(String);

impl TraceId {
    /// Creates a new random trace id.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wraps an existing trace id, e.g. one received in a request header.
    pub fn from_string(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the trace id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TraceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TraceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Builds the routing key `<producing-service>.<event-type>`.
pub fn routing_key(service: &str, event_type: &str) -> String {
    format!("{service}.{event_type}")
}

/// The message published on the bus.
///
/// Envelopes are immutable once published; consumers only read them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// The event type (e.g. "order.created").
    #[serde(rename = "type")]
    pub event_type: String,

    /// The event payload as JSON.
    pub payload: serde_json::Value,

    /// When the event was produced.
    pub timestamp: DateTime<Utc>,

    /// Name of the producing service (e.g. "order-service").
    pub service: String,

    /// Correlation id of the request or event that caused this one.
    pub trace_id: TraceId,
}

impl EventEnvelope {
    /// Creates a new envelope builder.
    pub fn builder() -> EventEnvelopeBuilder {
        EventEnvelopeBuilder::default()
    }

    /// Returns the routing key this envelope is published under.
    pub fn routing_key(&self) -> String {
        routing_key(&self.service, &self.event_type)
    }

    /// Deserializes the payload into a typed event.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }

    /// Encodes the envelope as JSON bytes for the wire.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decodes an envelope received from the wire.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }
}

/// Builder for constructing event envelopes.
#[derive(Debug, Default)]
pub struct EventEnvelopeBuilder {
    event_type: Option<String>,
    payload: Option<serde_json::Value>,
    timestamp: Option<DateTime<Utc>>,
    service: Option<String>,
    trace_id: Option<TraceId>,
}

impl EventEnvelopeBuilder {
    /// Sets the event type.
    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    /// Sets the payload from a serializable value.
    pub fn payload<T: Serialize>(mut self, payload: &T) -> Result<Self> {
        self.payload = Some(serde_json::to_value(payload)?);
        Ok(self)
    }

    /// Sets the payload from a raw JSON value.
    pub fn payload_raw(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Sets the timestamp. If not set, the current time will be used.
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Sets the producing service.
    pub fn service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    /// Sets the trace id. If not set, a new one is generated.
    pub fn trace_id(mut self, trace_id: TraceId) -> Self {
        self.trace_id = Some(trace_id);
        self
    }

    /// Builds the envelope, failing if event type, payload or service is missing.
    pub fn build(self) -> Result<EventEnvelope> {
        Ok(EventEnvelope {
            event_type: self
                .event_type
                .ok_or(BusError::InvalidEnvelope("event_type is required"))?,
            payload: self
                .payload
                .ok_or(BusError::InvalidEnvelope("payload is required"))?,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            service: self
                .service
                .ok_or(BusError::InvalidEnvelope("service is required"))?,
            trace_id: self.trace_id.unwrap_or_default(),
        })
    }
}
