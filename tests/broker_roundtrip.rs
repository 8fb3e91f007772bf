//! End-to-end checks against an embedded rumqttd broker on loopback

use std::sync::OnceLock;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use futures::StreamExt;
use sensorstream::config::Config;
use sensorstream::http::router;
use sensorstream::mqtt::MqttConfig;
use sensorstream::sensor::SensorReading;
use sensorstream::service::MqttService;
use tower::ServiceExt;

const BROKER_ADDR: &str = "127.0.0.1:18831";

const BROKER_CONFIG: &str = r#"
id = 0

[router]
max_connections = 64
max_outgoing_packet_count = 200
max_segment_size = 104857600
max_segment_count = 10

[v4.1]
name = "v4-1"
listen = "127.0.0.1:18831"
next_connection_delay_ms = 1

[v4.1.connections]
connection_timeout_ms = 60000
max_payload_size = 20480
max_inflight_count = 100
dynamic_filters = true
"#;

static BROKER: OnceLock<()> = OnceLock::new();

async fn embedded_broker() {
    BROKER.get_or_init(|| {
        let config: rumqttd::Config = toml::from_str(BROKER_CONFIG).unwrap();
        let mut broker = rumqttd::Broker::new(config);
        std::thread::spawn(move || {
            if let Err(e) = broker.start() {
                panic!("embedded broker stopped: {:?}", e);
            }
        });
    });

    for _ in 0..50 {
        if tokio::net::TcpStream::connect(BROKER_ADDR).await.is_ok() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("embedded broker did not start listening on {}", BROKER_ADDR);
}

async fn connected_service(client_id: &str) -> MqttService {
    embedded_broker().await;

    let config = Config {
        mqtt: MqttConfig {
            broker_url: format!("tcp://{}", BROKER_ADDR),
            client_id: format!("sensorstream-{}", client_id),
            ..MqttConfig::default()
        },
        ..Config::default()
    };
    let service = MqttService::with_pacing(config, Duration::ZERO);
    service.connection.connect().await.unwrap();
    service
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
async fn published_ping_is_delivered_once() {
    let service = connected_service("ping").await;
    let topic = "roundtrip/ping";

    let mut messages = service.subscriber.subscribe_to_messages();
    service.subscriber.subscribe(topic, 1).await.unwrap();

    let (status, body) = send(
        router(service.clone()),
        "POST",
        "/mqtt/message?message=ping&topic=roundtrip/ping",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "Message published to topic 'roundtrip/ping': ping");

    let message = tokio::time::timeout(Duration::from_secs(5), messages.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(message.topic, topic);
    assert_eq!(message.text(), "ping");

    let duplicate = tokio::time::timeout(Duration::from_millis(800), messages.next()).await;
    assert!(duplicate.is_err(), "ping was delivered twice");

    service.shutdown().await;
}

#[tokio::test]
async fn publish_confirmation_survives_disconnect_and_reconnect() {
    let service = connected_service("reconnect").await;
    let publish = "/mqtt/message?message=back&topic=roundtrip/reconnect";

    let (status, before) = send(router(service.clone()), "POST", publish).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(router(service.clone()), "POST", "/mqtt/disconnect").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "Disconnected from MQTT broker.");
    assert!(!service.connection.is_connected().await);

    for _ in 0..2 {
        let (status, body) = send(router(service.clone()), "POST", "/mqtt/reconnect").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Reconnected to MQTT broker.");
    }
    assert!(service.connection.is_connected().await);

    let (status, after) = send(router(service.clone()), "POST", publish).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(after, before);

    service.shutdown().await;
}

#[tokio::test]
async fn sensor_readings_arrive_as_json() {
    let service = connected_service("sensor").await;
    let topic = "roundtrip/sensor";

    let mut messages = service.subscriber.subscribe_to_messages();
    service.subscriber.subscribe(topic, 1).await.unwrap();

    let (status, body) = send(
        router(service.clone()),
        "POST",
        "/sensor/start?topic=roundtrip/sensor",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "Sensor streaming started.");

    let message = tokio::time::timeout(Duration::from_secs(5), messages.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(message.topic, topic);
    let reading: SensorReading = serde_json::from_slice(&message.payload).unwrap();
    assert!((-20.0..50.0).contains(&reading.value));
    assert_eq!(reading.timestamp.len(), 19);

    let (status, body) = send(router(service.clone()), "POST", "/sensor/stop").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "Sensor streaming stopped.");

    service.shutdown().await;
}
