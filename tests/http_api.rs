//! Requests against the router with an unreachable broker

use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use sensorstream::config::Config;
use sensorstream::http::router;
use sensorstream::mqtt::MqttConfig;
use sensorstream::service::MqttService;
use tower::ServiceExt;

fn offline_service() -> MqttService {
    let config = Config {
        mqtt: MqttConfig {
            broker_url: "tcp://127.0.0.1:1".to_string(),
            connect_timeout_secs: 2,
            ..MqttConfig::default()
        },
        ..Config::default()
    };
    MqttService::with_pacing(config, Duration::ZERO)
}

async fn send(app: Router, method: &str, uri: &str) -> (StatusCode, String) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

#[tokio::test]
async fn publish_without_broker_is_server_error() {
    let app = router(offline_service());
    let (status, body) = send(app, "POST", "/mqtt/message?message=hello").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body.starts_with("Error publishing message: "), "{}", body);
}

#[tokio::test]
async fn publish_with_invalid_qos_is_bad_request() {
    let app = router(offline_service());
    let (status, body) = send(app, "POST", "/mqtt/message?message=hello&qos=7").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("Invalid QoS level 7"), "{}", body);
}

#[tokio::test]
async fn publish_without_message_is_rejected() {
    let app = router(offline_service());
    let (status, _) = send(app, "POST", "/mqtt/message?topic=a").await;

    assert!(status.is_client_error());
}

#[tokio::test]
async fn disconnect_without_session_fails() {
    let app = router(offline_service());
    let (status, body) = send(app, "POST", "/mqtt/disconnect").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body.starts_with("Error disconnecting: "), "{}", body);
}

#[tokio::test]
async fn reconnect_to_unreachable_broker_fails() {
    let service = offline_service();
    let (status, body) = send(router(service.clone()), "POST", "/mqtt/reconnect").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body.starts_with("Error reconnecting: "), "{}", body);
    assert!(!service.connection.is_connected().await);
}

#[tokio::test]
async fn sensor_toggle_starts_and_stops() {
    let service = offline_service();

    let (status, body) = send(router(service.clone()), "POST", "/sensor/start").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "Sensor streaming started.");

    // Publishing fails without a broker, which ends the loop on its own
    let (status, body) = send(router(service.clone()), "POST", "/sensor/stop").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "Sensor streaming stopped.");
    assert!(!service.sensor.is_running());
}

#[tokio::test]
async fn unknown_sensor_toggle_is_rejected() {
    let service = offline_service();
    let (status, body) = send(router(service.clone()), "POST", "/sensor/pause").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "Invalid toggle parameter. Use 'start' or 'stop'.");
    assert!(!service.sensor.is_running());
}

#[tokio::test]
async fn sensor_start_with_invalid_qos_is_rejected() {
    let service = offline_service();
    let (status, _) = send(router(service.clone()), "POST", "/sensor/start?qos=5").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(!service.sensor.is_running());
}

#[tokio::test]
async fn status_reports_disconnected_state() {
    let app = router(offline_service());
    let (status, body) = send(app, "GET", "/mqtt/status").await;

    assert_eq!(status, StatusCode::OK);
    let report: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(report["mqtt"]["connection_state"], "Disconnected");
    assert_eq!(report["stream_consumers"], 0);
    assert_eq!(report["sensor_running"], false);
}

#[tokio::test]
async fn subscribe_failure_sends_one_error_event() {
    let service = offline_service();
    let (status, body) = send(router(service.clone()), "GET", "/mqtt/subscribe?topic=lab/x").await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("event: error"), "{}", body);
    assert!(body.contains("Error subscribing to topic 'lab/x'"), "{}", body);
    assert_eq!(service.subscriber.consumer_count(), 0);
}
