//! Service configuration
//!
//! Loaded from a TOML file with three sections (`[mqtt]`, `[http]`, `[sensor]`).
//! The file lives at `$SENSORSTREAM_CONFIG` or, when unset, under the user's
//! config directory. A file holding the defaults is written on first start so
//! there is always something to edit. Every field has a default, so partial
//! files are fine.

use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::mqtt::subscriber::DEFAULT_BROADCAST_CAPACITY;
use crate::mqtt::MqttConfig;
use crate::sensor::PublishTarget;

pub const CONFIG_ENV: &str = "SENSORSTREAM_CONFIG";
const CONFIG_DIR: &str = "sensorstream";
const CONFIG_FILE: &str = "config.toml";

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub mqtt: MqttConfig,
    pub http: HttpConfig,
    pub sensor: SensorConfig,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct HttpConfig {
    /// Address the HTTP facade listens on
    pub bind_addr: String,
    /// Messages buffered per stream consumer before the oldest are dropped
    pub broadcast_capacity: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            broadcast_capacity: DEFAULT_BROADCAST_CAPACITY,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct SensorConfig {
    pub interval_ms: u64,
    /// Falls back to `mqtt.topic`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    /// Falls back to `mqtt.qos`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qos: Option<u8>,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            topic: None,
            qos: None,
        }
    }
}

impl Config {
    /// Where the configuration is read from
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return PathBuf::from(path);
        }

        let mut path = dirs::config_dir().unwrap_or_else(|| {
            warn!("Could not determine config directory, using current directory");
            PathBuf::from(".")
        });
        path.push(CONFIG_DIR);
        path.push(CONFIG_FILE);
        path
    }

    /// Writes the default configuration if no file exists at `path`
    pub async fn ensure_default_config(path: &Path) -> Result<()> {
        if tokio::fs::try_exists(path)
            .await
            .map_err(|e| eyre!("Failed to check if config file exists: {}", e))?
        {
            debug!("Config file found at {}", path.display());
            return Ok(());
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| eyre!("Failed to create config directory: {}", e))?;
        }

        let content = toml::to_string_pretty(&Config::default())
            .map_err(|e| eyre!("Failed to serialize default config: {}", e))?;
        tokio::fs::write(path, content)
            .await
            .map_err(|e| eyre!("Failed to write default config file: {}", e))?;

        info!("Default configuration written to {}", path.display());
        Ok(())
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    pub async fn load_or_init() -> Result<Self> {
        let path = Self::config_path();
        Self::ensure_default_config(&path).await?;
        Self::load(&path).await
    }

    pub fn sensor_target(&self) -> PublishTarget {
        PublishTarget {
            topic: self
                .sensor
                .topic
                .clone()
                .unwrap_or_else(|| self.mqtt.topic.clone()),
            qos: self.sensor.qos.unwrap_or(self.mqtt.qos),
        }
    }

    pub fn sensor_interval(&self) -> Duration {
        Duration::from_millis(self.sensor.interval_ms)
    }
}
