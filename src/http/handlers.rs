use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{sse::Sse, IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use super::events::{error_events, message_events, sse, EventStream};
use crate::error::BridgeError;
use crate::mqtt::{MqttStatus, Publish};
use crate::sensor::PublishTarget;
use crate::service::MqttService;

#[derive(Debug, Deserialize)]
pub struct PublishParams {
    pub message: String,
    pub topic: Option<String>,
    pub qos: Option<u8>,
}

/// Optional overrides of the configured topic and QoS
#[derive(Debug, Default, Deserialize)]
pub struct TargetParams {
    pub topic: Option<String>,
    pub qos: Option<u8>,
}

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub mqtt: MqttStatus,
    pub stream_consumers: usize,
    pub sensor_running: bool,
}

fn failure(context: &str, err: BridgeError) -> Response {
    let status = match err {
        BridgeError::InvalidQos(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, format!("{}: {}", context, err)).into_response()
}

pub async fn publish_message(
    State(service): State<MqttService>,
    Query(params): Query<PublishParams>,
) -> Response {
    let (topic, qos) = service.resolve_target(params.topic, params.qos);

    match service
        .publisher
        .publish(&topic, params.message.clone().into_bytes(), qos)
        .await
    {
        Ok(()) => format!(
            "Message published to topic '{}': {}",
            topic, params.message
        )
        .into_response(),
        Err(e) => failure("Error publishing message", e),
    }
}

/// Streams deliveries after registering `topic` with the broker
///
/// The consumer is attached before the broker subscription so the first
/// delivery cannot slip past it.
pub async fn subscribe(
    State(service): State<MqttService>,
    Query(params): Query<TargetParams>,
) -> Sse<EventStream> {
    let (topic, qos) = service.resolve_target(params.topic, params.qos);
    let messages = service.subscriber.subscribe_to_messages();

    match service.subscriber.subscribe(&topic, qos).await {
        Ok(()) => sse(message_events(messages)),
        Err(e) => {
            drop(messages);
            sse(error_events(format!("Error subscribing to topic '{}': {}", topic, e)))
        }
    }
}

pub async fn messages(State(service): State<MqttService>) -> Sse<EventStream> {
    sse(message_events(service.subscriber.subscribe_to_messages()))
}

pub async fn disconnect(State(service): State<MqttService>) -> Response {
    match service.connection.disconnect().await {
        Ok(()) => "Disconnected from MQTT broker.".into_response(),
        Err(e) => failure("Error disconnecting", e),
    }
}

pub async fn reconnect(State(service): State<MqttService>) -> Response {
    if let Err(e) = service.connection.reconnect().await {
        error!("Reconnect failed: {}", e);
        return failure("Error reconnecting", e);
    }

    if service.connection.is_connected().await {
        "Reconnected to MQTT broker.".into_response()
    } else {
        failure(
            "Error reconnecting",
            BridgeError::ConnectionError("broker session closed right after connecting".into()),
        )
    }
}

pub async fn status(State(service): State<MqttService>) -> Json<StatusReport> {
    Json(StatusReport {
        mqtt: service.connection.status().await,
        stream_consumers: service.subscriber.consumer_count(),
        sensor_running: service.sensor.is_running(),
    })
}

pub async fn toggle_sensor(
    State(service): State<MqttService>,
    Path(toggle): Path<String>,
    Query(params): Query<TargetParams>,
) -> Response {
    match toggle.as_str() {
        "start" => {
            let target = if params.topic.is_none() && params.qos.is_none() {
                None
            } else {
                let default = service.sensor.default_target();
                Some(PublishTarget {
                    topic: params
                        .topic
                        .filter(|t| !t.is_empty())
                        .unwrap_or_else(|| default.topic.clone()),
                    qos: params.qos.unwrap_or(default.qos),
                })
            };

            if let Some(qos) = target.as_ref().map(|t| t.qos).filter(|q| *q > 2) {
                return failure("Error starting sensor", BridgeError::InvalidQos(qos));
            }

            service.sensor.start(target);
            "Sensor streaming started.".into_response()
        }
        "stop" => {
            service.sensor.stop();
            "Sensor streaming stopped.".into_response()
        }
        other => {
            warn!("Rejected sensor toggle '{}'", other);
            (
                StatusCode::BAD_REQUEST,
                "Invalid toggle parameter. Use 'start' or 'stop'.",
            )
                .into_response()
        }
    }
}
