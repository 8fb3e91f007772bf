//! Bridge from broker deliveries to pull-based consumer streams
//!
//! The connection worker pushes each delivered message through the installed
//! [`DeliveryHandler`], which only enqueues it on a broadcast channel. Every
//! consumer attached with [`SubscriberBridge::subscribe_to_messages`] holds its
//! own receiver, so it sees messages in delivery order from the moment it
//! attached and dropping it leaves the other consumers untouched.
//!
//! ```text
//! EventLoop worker ─[handler]→ broadcast::Sender ─┬→ MessageStream (SSE client A)
//!                                                 └→ MessageStream (SSE client B)
//! ```

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{BoxStream, StreamExt};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, error, info, warn};

use super::connection::{BrokerConnection, DeliveryHandler};
use super::message::{qos_from_level, InboundMessage};
use crate::error::BridgeResult;

/// Delay applied before each message handed to a consumer
pub const DELIVERY_PACING: Duration = Duration::from_millis(100);

pub const DEFAULT_BROADCAST_CAPACITY: usize = 256;

/// Ordered stream of delivered messages for one consumer
pub type MessageStream = BoxStream<'static, InboundMessage>;

pub struct SubscriberBridge {
    connection: Arc<BrokerConnection>,
    sender: broadcast::Sender<InboundMessage>,
    pacing: Duration,
}

impl SubscriberBridge {
    pub fn with_pacing(
        connection: Arc<BrokerConnection>,
        capacity: usize,
        pacing: Duration,
    ) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        SubscriberBridge {
            connection,
            sender,
            pacing,
        }
    }

    /// Registers interest in `topic` with the broker
    ///
    /// The delivery handler is installed on the first call.
    pub async fn subscribe(&self, topic: &str, qos: u8) -> BridgeResult<()> {
        let qos = qos_from_level(qos)?;

        if !self.connection.has_handler().await {
            debug!("Installing delivery handler on broker connection");
            self.connection.set_handler(self.delivery_handler()).await;
        }

        if let Err(e) = self.connection.subscribe(topic, qos).await {
            error!("Error during MQTT subscription: {}", e);
            return Err(e);
        }

        info!("Subscribed to topic: {}", topic);
        Ok(())
    }

    /// Handler that enqueues every delivery on the broadcast channel
    pub fn delivery_handler(&self) -> DeliveryHandler {
        let sender = self.sender.clone();
        Arc::new(move |message: InboundMessage| {
            debug!("Forwarding message from topic {}", message.topic);
            if sender.send(message).is_err() {
                debug!("No stream consumers attached, message dropped");
            }
        })
    }

    /// Attaches a new consumer, starting at the next delivered message
    pub fn subscribe_to_messages(&self) -> MessageStream {
        let receiver = self.sender.subscribe();
        info!(
            "Subscribed to the message stream ({} consumers)",
            self.sender.receiver_count()
        );
        paced_stream(receiver, self.pacing)
    }

    pub fn consumer_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

struct DetachGuard;

impl Drop for DetachGuard {
    fn drop(&mut self) {
        debug!("Message stream consumer detached");
    }
}

fn paced_stream(
    mut receiver: broadcast::Receiver<InboundMessage>,
    pacing: Duration,
) -> MessageStream {
    let stream = async_stream::stream! {
        let _guard = DetachGuard;
        loop {
            match receiver.recv().await {
                Ok(message) => {
                    tokio::time::sleep(pacing).await;
                    yield message;
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Stream consumer fell behind, {} messages dropped", skipped);
                }
                Err(RecvError::Closed) => {
                    info!("Message stream complete");
                    break;
                }
            }
        }
    };
    stream.boxed()
}
