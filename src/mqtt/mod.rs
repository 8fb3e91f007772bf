//! # MQTT Integration Module
//!
//! Owns everything that talks to the broker: the connection lifecycle, outbound
//! publishing and the bridge that turns broker deliveries into consumer streams.
//!
//! ## Module Architecture
//!
//! ```text
//! mqtt/
//! ├── config.rs      - Broker settings, URL parsing, rumqttc options
//! ├── message.rs     - Inbound message representation and QoS mapping
//! ├── connection.rs  - Session lifecycle, event-loop worker, status counters
//! ├── publisher.rs   - Publish trait and broker-backed publisher
//! └── subscriber.rs  - Broker subscription and broadcast fan-out to streams
//! ```
//!
//! ## Threads of Control
//!
//! The rumqttc event loop runs on its own tokio task per session. It is the only
//! place deliveries originate; it calls the installed handler, which enqueues on
//! a broadcast channel and returns. Publishing and subscribing happen on the
//! caller's task through the cloned `AsyncClient`.
//!
//! ## Failure Policy
//!
//! Nothing in this module retries. A lost connection is logged and recorded in
//! [`connection::MqttStatus`]; getting back online is an explicit `reconnect()`.

pub mod config;
pub mod connection;
pub mod message;
pub mod publisher;
pub mod subscriber;

pub use config::MqttConfig;
pub use connection::{BrokerConnection, ConnectionState, DeliveryHandler, MqttStatus};
pub use message::InboundMessage;
pub use publisher::{Publish, Publisher};
pub use subscriber::{MessageStream, SubscriberBridge};
