use thiserror::Error;

/// Errors that can occur when talking to the message broker.
#[derive(Debug, Error)]
pub enum BusError {
    /// The broker could not be reached.
    #[error("Connection error: {0}")]
    Connection(String),

    /// An exchange, queue or binding could not be declared.
    #[error("Declare error: {0}")]
    Declare(String),

    /// A message could not be published or was not confirmed.
    #[error("Publish error: {0}")]
    Publish(String),

    /// A consumer could not be started or the delivery stream failed.
    #[error("Consume error: {0}")]
    Consume(String),

    /// An ack or nack could not be sent.
    #[error("Acknowledge error: {0}")]
    Acknowledge(String),

    /// The envelope is missing required fields.
    #[error("Invalid envelope: {0}")]
    InvalidEnvelope(&'static str),

    /// Publishing is disabled because no broker connection exists.
    #[error("Event bus is disabled for service {0}")]
    Disabled(String),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;
