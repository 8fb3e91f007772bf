use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, Outgoing, Packet, QoS};
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::config::MqttConfig;
use super::message::InboundMessage;
use crate::error::{BridgeError, BridgeResult};

const MAX_ERROR_MESSAGES: usize = 20;
const WORKER_SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Callback invoked on the event-loop worker for every delivered message
///
/// Must not block: the worker cannot poll the broker while it runs.
pub type DeliveryHandler = Arc<dyn Fn(InboundMessage) + Send + Sync>;

#[derive(Clone, Copy, Default, Debug, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct MqttStatus {
    pub connection_state: ConnectionState,
    pub error_messages: Vec<String>,
    pub messages_received: usize,
    pub messages_sent: usize,
    pub last_activity: Option<DateTime<Local>>,
}

impl MqttStatus {
    fn push_error(&mut self, message: String) {
        if self.error_messages.len() >= MAX_ERROR_MESSAGES {
            self.error_messages.remove(0);
        }
        self.error_messages.push(message);
    }

    fn record_received(&mut self) {
        self.messages_received += 1;
        self.last_activity = Some(Local::now());
    }

    fn record_sent(&mut self) {
        self.messages_sent += 1;
        self.last_activity = Some(Local::now());
    }
}

struct Session {
    client: AsyncClient,
    worker: JoinHandle<()>,
}

impl Session {
    /// Sends DISCONNECT and waits briefly for the worker to wind down
    async fn close(self) -> BridgeResult<()> {
        let result = self
            .client
            .disconnect()
            .await
            .map_err(|e| BridgeError::ConnectionError(e.to_string()));

        let mut worker = self.worker;
        if tokio::time::timeout(WORKER_SHUTDOWN_GRACE, &mut worker)
            .await
            .is_err()
        {
            debug!("Event loop worker did not stop in time, aborting it");
            worker.abort();
            let _ = worker.await;
        }

        result
    }
}

/// Owns the session with the MQTT broker
///
/// Connecting, disconnecting and reconnecting are driven by the caller only.
/// When the event loop reports an error the worker logs the lost connection
/// and stops; nothing reconnects on its own.
pub struct BrokerConnection {
    config: MqttConfig,
    session: RwLock<Option<Session>>,
    status: Arc<RwLock<MqttStatus>>,
    handler: Arc<RwLock<Option<DeliveryHandler>>>,
    subscriptions: RwLock<HashMap<String, QoS>>,
}

impl BrokerConnection {
    pub fn new(config: MqttConfig) -> Self {
        BrokerConnection {
            config,
            session: RwLock::new(None),
            status: Arc::new(RwLock::new(MqttStatus::default())),
            handler: Arc::new(RwLock::new(None)),
            subscriptions: RwLock::new(HashMap::new()),
        }
    }

    /// Opens a clean session and starts the event-loop worker
    ///
    /// Waits for the broker's CONNACK, bounded by `connect_timeout_secs`. Any
    /// existing session is closed first. Subscriptions registered earlier are
    /// issued again because a clean session does not keep them.
    pub async fn connect(&self) -> BridgeResult<()> {
        let mut session = self.session.write().await;

        if let Some(stale) = session.take() {
            debug!("Closing previous session before connecting");
            if let Err(e) = stale.close().await {
                debug!("Previous session did not close cleanly: {}", e);
            }
        }

        self.set_state(ConnectionState::Connecting).await;
        info!(
            "Connecting to MQTT broker {} as '{}'",
            self.config.broker_url, self.config.client_id
        );

        let options = match self.config.mqtt_options() {
            Ok(options) => options,
            Err(e) => {
                self.record_failure(&e).await;
                return Err(e);
            }
        };
        let (client, mut event_loop) = AsyncClient::new(options, self.config.channel_capacity);

        let handshake =
            match tokio::time::timeout(self.config.connect_timeout(), await_connack(&mut event_loop))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(BridgeError::ConnectionError(format!(
                    "Timed out after {}s waiting for CONNACK",
                    self.config.connect_timeout_secs
                ))),
            };

        if let Err(e) = handshake {
            error!("Failed to connect to {}: {}", self.config.broker_url, e);
            self.record_failure(&e).await;
            return Err(e);
        }

        {
            let mut status = self.status.write().await;
            status.connection_state = ConnectionState::Connected;
            status.last_activity = Some(Local::now());
        }

        let worker = tokio::spawn(run_event_loop(
            event_loop,
            self.status.clone(),
            self.handler.clone(),
        ));

        let subscriptions = self.subscriptions.read().await.clone();
        for (topic, qos) in subscriptions {
            match client.subscribe(topic.clone(), qos).await {
                Ok(_) => info!("Restored subscription to {}", topic),
                Err(e) => warn!("Failed to restore subscription to {}: {}", topic, e),
            }
        }

        *session = Some(Session { client, worker });
        info!("Connected to MQTT broker {}", self.config.broker_url);
        Ok(())
    }

    pub async fn disconnect(&self) -> BridgeResult<()> {
        let mut session = self.session.write().await;

        let Some(active) = session.take() else {
            warn!("Disconnect requested but no broker session exists");
            return Err(BridgeError::ConnectionError(
                "not connected to a broker".to_string(),
            ));
        };

        info!("Disconnecting from MQTT broker {}", self.config.broker_url);
        let result = active.close().await;
        self.set_state(ConnectionState::Disconnected).await;

        match &result {
            Ok(_) => info!("Disconnected from MQTT broker"),
            Err(e) => {
                error!("Disconnect failed: {}", e);
                self.status.write().await.push_error(e.to_string());
            }
        }
        result
    }

    /// Connects unless a live session already exists
    pub async fn reconnect(&self) -> BridgeResult<()> {
        if self.is_connected().await {
            info!("Reconnect requested while connected, nothing to do");
            return Ok(());
        }
        self.connect().await
    }

    pub async fn is_connected(&self) -> bool {
        self.status.read().await.connection_state == ConnectionState::Connected
    }

    pub async fn status(&self) -> MqttStatus {
        self.status.read().await.clone()
    }

    pub async fn publish(&self, topic: &str, qos: QoS, payload: Vec<u8>) -> BridgeResult<()> {
        let publish_error = |reason: String| BridgeError::PublishError {
            topic: topic.to_string(),
            reason,
        };

        let session = self.session.read().await;
        let connected = self.is_connected().await;
        let client = match session.as_ref() {
            Some(active) if connected => &active.client,
            _ => return Err(publish_error("not connected to a broker".to_string())),
        };

        client
            .publish(topic, qos, false, payload)
            .await
            .map_err(|e| publish_error(e.to_string()))?;

        self.status.write().await.record_sent();
        Ok(())
    }

    /// Registers a broker subscription and remembers it for later reconnects
    pub async fn subscribe(&self, topic: &str, qos: QoS) -> BridgeResult<()> {
        let subscription_error = |reason: String| BridgeError::SubscriptionError {
            topic: topic.to_string(),
            reason,
        };

        let session = self.session.read().await;
        let connected = self.is_connected().await;
        let client = match session.as_ref() {
            Some(active) if connected => &active.client,
            _ => return Err(subscription_error("not connected to a broker".to_string())),
        };

        client
            .subscribe(topic, qos)
            .await
            .map_err(|e| subscription_error(e.to_string()))?;

        self.subscriptions
            .write()
            .await
            .insert(topic.to_string(), qos);
        Ok(())
    }

    /// Installs the callback the worker runs for each delivered message
    pub async fn set_handler(&self, handler: DeliveryHandler) {
        *self.handler.write().await = Some(handler);
    }

    pub async fn has_handler(&self) -> bool {
        self.handler.read().await.is_some()
    }

    async fn set_state(&self, state: ConnectionState) {
        self.status.write().await.connection_state = state;
    }

    async fn record_failure(&self, err: &BridgeError) {
        let mut status = self.status.write().await;
        status.connection_state = ConnectionState::Failed;
        status.push_error(err.to_string());
    }
}

async fn await_connack(event_loop: &mut EventLoop) -> BridgeResult<()> {
    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                return if ack.code == ConnectReturnCode::Success {
                    Ok(())
                } else {
                    Err(BridgeError::ConnectionError(format!(
                        "Broker refused connection: {:?}",
                        ack.code
                    )))
                };
            }
            Ok(_) => continue,
            Err(e) => return Err(BridgeError::ConnectionError(e.to_string())),
        }
    }
}

async fn run_event_loop(
    mut event_loop: EventLoop,
    status: Arc<RwLock<MqttStatus>>,
    handler: Arc<RwLock<Option<DeliveryHandler>>>,
) {
    debug!("MQTT event loop worker started");

    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let message =
                    InboundMessage::new(publish.topic, publish.payload.to_vec(), publish.qos);
                debug!("Message received: {}", message);
                status.write().await.record_received();

                let handler = handler.read().await.clone();
                match handler {
                    Some(deliver) => deliver(message),
                    None => debug!("No delivery handler installed, dropping message"),
                }
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                warn!("Broker sent DISCONNECT");
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                debug!("DISCONNECT sent, stopping event loop worker");
                status.write().await.connection_state = ConnectionState::Disconnected;
                break;
            }
            Ok(event) => debug!("MQTT event: {:?}", event),
            Err(e) => {
                warn!("Connection lost: {}", e);
                let mut status = status.write().await;
                status.connection_state = ConnectionState::Disconnected;
                status.push_error(format!("Connection lost: {}", e));
                break;
            }
        }
    }

    debug!("MQTT event loop worker stopped");
}
