use color_eyre::{eyre::eyre, Result};
use sensorstream::config::Config;
use sensorstream::http;
use sensorstream::service::MqttService;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let config = Config::load_or_init().await?;
    let bind_addr = config.http.bind_addr.clone();
    let service = MqttService::new(config);

    // Broker outages at startup are not fatal, /mqtt/reconnect can recover
    match service.connection.connect().await {
        Ok(()) => info!(
            "Connected to MQTT broker at {}",
            service.config.mqtt.broker_url
        ),
        Err(e) => error!("Initial broker connection failed: {}", e),
    }

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| eyre!("Failed to bind {}: {}", bind_addr, e))?;
    info!("HTTP facade listening on {}", bind_addr);

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Ctrl-C received, shutting down"),
            Err(e) => error!("Unable to listen for shutdown signal: {}", e),
        }
        signal_token.cancel();
    });

    let server_token = shutdown.clone();
    axum::serve(listener, http::router(service.clone()))
        .with_graceful_shutdown(async move { server_token.cancelled().await })
        .await
        .map_err(|e| eyre!("HTTP server error: {}", e))?;

    service.shutdown().await;
    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
