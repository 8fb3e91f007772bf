//! HTTP facade over the broker bridge and the sensor generator
//!
//! ```text
//! POST /mqtt/message      publish one message
//! GET  /mqtt/subscribe    subscribe and stream deliveries as SSE
//! GET  /mqtt/messages     attach to the delivery stream only
//! POST /mqtt/disconnect
//! POST /mqtt/reconnect
//! GET  /mqtt/status
//! POST /sensor/:toggle    start | stop
//! ```

mod events;
mod handlers;

use axum::{
    routing::{get, post},
    Router,
};

use crate::service::MqttService;

pub use handlers::{StatusReport, TargetParams};

pub fn router(service: MqttService) -> Router {
    Router::new()
        .route("/mqtt/message", post(handlers::publish_message))
        .route("/mqtt/subscribe", get(handlers::subscribe))
        .route("/mqtt/messages", get(handlers::messages))
        .route("/mqtt/disconnect", post(handlers::disconnect))
        .route("/mqtt/reconnect", post(handlers::reconnect))
        .route("/mqtt/status", get(handlers::status))
        .route("/sensor/:toggle", post(handlers::toggle_sensor))
        .with_state(service)
}
