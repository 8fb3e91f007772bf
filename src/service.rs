//! Single owner of all runtime state
//!
//! Every HTTP handler receives a clone of [`MqttService`]; the clones share the
//! same connection, bridge and generator through `Arc`s.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::Config;
use crate::mqtt::subscriber::DELIVERY_PACING;
use crate::mqtt::{BrokerConnection, Publisher, SubscriberBridge};
use crate::sensor::SensorGenerator;

#[derive(Clone)]
pub struct MqttService {
    pub config: Arc<Config>,
    pub connection: Arc<BrokerConnection>,
    pub publisher: Publisher,
    pub subscriber: Arc<SubscriberBridge>,
    pub sensor: Arc<SensorGenerator<Publisher>>,
}

impl MqttService {
    pub fn new(config: Config) -> Self {
        Self::with_pacing(config, DELIVERY_PACING)
    }

    /// Same as [`MqttService::new`] with a custom delay between streamed messages
    pub fn with_pacing(config: Config, pacing: Duration) -> Self {
        let connection = Arc::new(BrokerConnection::new(config.mqtt.clone()));
        let publisher = Publisher::new(connection.clone());
        let subscriber = Arc::new(SubscriberBridge::with_pacing(
            connection.clone(),
            config.http.broadcast_capacity,
            pacing,
        ));
        let sensor = Arc::new(SensorGenerator::new(
            Arc::new(publisher.clone()),
            config.sensor_target(),
            config.sensor_interval(),
        ));

        MqttService {
            config: Arc::new(config),
            connection,
            publisher,
            subscriber,
            sensor,
        }
    }

    /// Per-call topic/QoS with the configured defaults filling the gaps
    pub fn resolve_target(&self, topic: Option<String>, qos: Option<u8>) -> (String, u8) {
        (
            topic
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| self.config.mqtt.topic.clone()),
            qos.unwrap_or(self.config.mqtt.qos),
        )
    }

    /// Stops the sensor loop and closes the broker session
    pub async fn shutdown(&self) {
        if self.sensor.is_running() {
            self.sensor.stop();
        }

        if self.connection.is_connected().await {
            if let Err(e) = self.connection.disconnect().await {
                warn!("Broker session did not close cleanly: {}", e);
            }
        }
        info!("Service shut down");
    }
}
