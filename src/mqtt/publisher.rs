use std::future::Future;
use std::sync::Arc;

use tracing::{debug, error};

use super::connection::BrokerConnection;
use super::message::qos_from_level;
use crate::error::BridgeResult;

/// Anything that can hand a message to the broker
///
/// The sensor generator is written against this trait so its loop can run
/// without a live broker.
pub trait Publish: Send + Sync + 'static {
    fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        qos: u8,
    ) -> impl Future<Output = BridgeResult<()>> + Send;
}

/// Sends messages over the shared broker connection
#[derive(Clone)]
pub struct Publisher {
    connection: Arc<BrokerConnection>,
}

impl Publisher {
    pub fn new(connection: Arc<BrokerConnection>) -> Self {
        Publisher { connection }
    }
}

impl Publish for Publisher {
    /// Returns once the message is queued on the client; acknowledgement
    /// handling is left to the requested QoS
    async fn publish(&self, topic: &str, payload: Vec<u8>, qos: u8) -> BridgeResult<()> {
        let qos = qos_from_level(qos)?;
        let size = payload.len();

        match self.connection.publish(topic, qos, payload).await {
            Ok(_) => {
                debug!("Published {} bytes to {} ({:?})", size, topic, qos);
                Ok(())
            }
            Err(e) => {
                error!("Failed to publish to {}: {}", topic, e);
                Err(e)
            }
        }
    }
}
