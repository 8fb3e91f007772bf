use crate::error::{BridgeError, BridgeResult};
use rumqttc::MqttOptions;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_PORT: u16 = 1883;

/// Broker settings and the default topic/QoS used when a request omits them
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct MqttConfig {
    /// Broker address, e.g. "tcp://localhost:1883"
    pub broker_url: String,
    pub client_id: String,
    /// Default topic for publish, subscribe and the sensor generator
    pub topic: String,
    /// Default QoS level (0, 1 or 2)
    pub qos: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pw: Option<String>,
    pub keep_alive_secs: u64,
    /// Upper bound for waiting on the broker's CONNACK
    pub connect_timeout_secs: u64,
    /// Capacity of the request channel between client and event loop
    pub channel_capacity: usize,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker_url: "tcp://localhost:1883".to_string(),
            client_id: "sensorstream".to_string(),
            topic: "sensors/temperature".to_string(),
            qos: 1,
            user: None,
            pw: None,
            keep_alive_secs: 5,
            connect_timeout_secs: 10,
            channel_capacity: 100,
        }
    }
}

impl MqttConfig {
    /// Splits the broker URL into host and port
    ///
    /// Accepts `tcp://`, `mqtt://` or no scheme. TLS schemes are rejected since
    /// the transport is plain TCP only.
    pub fn broker_address(&self) -> BridgeResult<(String, u16)> {
        let (scheme, rest) = match self.broker_url.find("://") {
            Some(pos) => (&self.broker_url[..pos], &self.broker_url[pos + 3..]),
            None => ("tcp", self.broker_url.as_str()),
        };

        match scheme.to_lowercase().as_str() {
            "tcp" | "mqtt" => {}
            "ssl" | "tls" | "mqtts" => {
                return Err(BridgeError::ConfigError(format!(
                    "TLS broker URLs are not supported: {}",
                    self.broker_url
                )))
            }
            other => {
                return Err(BridgeError::ConfigError(format!(
                    "Unknown broker URL scheme '{}'",
                    other
                )))
            }
        }

        let rest = rest.trim_end_matches('/');
        let (host, port) = match rest.rfind(':') {
            Some(colon) => {
                let port = rest[colon + 1..].parse::<u16>().map_err(|_| {
                    BridgeError::ConfigError(format!(
                        "Invalid port in broker URL: {}",
                        self.broker_url
                    ))
                })?;
                (&rest[..colon], port)
            }
            None => (rest, DEFAULT_PORT),
        };

        if host.is_empty() {
            return Err(BridgeError::ConfigError(format!(
                "Missing host in broker URL: {}",
                self.broker_url
            )));
        }

        Ok((host.to_string(), port))
    }

    /// Builds rumqttc options for a clean (non-persistent) session
    pub fn mqtt_options(&self) -> BridgeResult<MqttOptions> {
        let (host, port) = self.broker_address()?;

        let mut options = MqttOptions::new(self.client_id.clone(), host, port);
        options
            .set_keep_alive(Duration::from_secs(self.keep_alive_secs.max(5)))
            .set_clean_session(true);

        if let Some(user) = &self.user {
            options.set_credentials(user.clone(), self.pw.clone().unwrap_or_default());
        }

        Ok(options)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}
