//! Error definitions shared by the MQTT bridge, the sensor generator and the HTTP facade

use thiserror::Error;

/// Errors raised by broker operations and the sensor pipeline
///
/// None of these are retried inside the crate. The HTTP layer turns every
/// variant into a non-2xx response carrying the display text.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Broker unreachable, session refused or no session present
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Sending a message failed
    #[error("Failed to publish to '{topic}': {reason}")]
    PublishError { topic: String, reason: String },

    /// Registering a broker subscription failed
    #[error("Failed to subscribe to '{topic}': {reason}")]
    SubscriptionError { topic: String, reason: String },

    /// A sensor reading could not be encoded
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// QoS outside of 0..=2
    #[error("Invalid QoS level {0}, expected 0, 1 or 2")]
    InvalidQos(u8),

    /// Invalid broker settings
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

pub type BridgeResult<T> = Result<T, BridgeError>;
