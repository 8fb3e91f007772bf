use chrono::{DateTime, Local};
use rumqttc::QoS;
use std::fmt;

use crate::error::{BridgeError, BridgeResult};

/// A message delivered by the broker for one of our subscriptions
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: u8,
    pub received_at: DateTime<Local>,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>, qos: QoS) -> Self {
        InboundMessage {
            topic: topic.into(),
            payload: payload.into(),
            qos: qos_level(qos),
            received_at: Local::now(),
        }
    }

    /// Payload as text, invalid UTF-8 is replaced
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

impl fmt::Display for InboundMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let text = self.text();
        let preview: String = text.chars().take(40).collect();
        write!(
            f,
            "{} [{}] {}",
            self.received_at.format("%H:%M:%S"),
            self.topic,
            preview
        )
    }
}

pub fn qos_from_level(level: u8) -> BridgeResult<QoS> {
    match level {
        0 => Ok(QoS::AtMostOnce),
        1 => Ok(QoS::AtLeastOnce),
        2 => Ok(QoS::ExactlyOnce),
        other => Err(BridgeError::InvalidQos(other)),
    }
}

pub fn qos_level(qos: QoS) -> u8 {
    match qos {
        QoS::AtMostOnce => 0,
        QoS::AtLeastOnce => 1,
        QoS::ExactlyOnce => 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qos_levels_map_both_ways() {
        for level in 0..=2 {
            assert_eq!(qos_level(qos_from_level(level).unwrap()), level);
        }
        assert!(matches!(qos_from_level(3), Err(BridgeError::InvalidQos(3))));
    }

    #[test]
    fn display_truncates_long_payloads() {
        let msg = InboundMessage::new("t", "x".repeat(100), QoS::AtMostOnce);
        let rendered = msg.to_string();
        assert!(rendered.contains("[t]"));
        assert!(rendered.ends_with(&"x".repeat(40)));
        assert!(!rendered.contains(&"x".repeat(41)));
    }

    #[test]
    fn text_is_lossy() {
        let msg = InboundMessage::new("t", vec![b'p', 0xff, b'g'], QoS::AtMostOnce);
        assert_eq!(msg.text(), "p\u{fffd}g");
    }
}
