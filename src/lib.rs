//! MQTT publish/subscribe bridge with an HTTP/SSE facade and a synthetic
//! temperature sensor.

pub mod config;
pub mod error;
pub mod http;
pub mod mqtt;
pub mod sensor;
pub mod service;
