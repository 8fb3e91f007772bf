//! Synthetic temperature reading

use chrono::NaiveDateTime;
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Lower bound of generated values (inclusive)
pub const MIN_VALUE: f64 = -20.0;
/// Upper bound of generated values (exclusive)
pub const MAX_VALUE: f64 = 50.0;

/// One sensor sample as published to the broker
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    /// Identity of the simulated sensor that produced the sample
    pub uuid: Uuid,
    /// Local time, formatted as `YYYY-MM-DD HH:MM:SS`
    pub timestamp: String,
    /// Temperature in degrees Celsius
    pub value: f64,
}

impl SensorReading {
    pub fn sample<R: Rng>(uuid: Uuid, taken_at: NaiveDateTime, rng: &mut R) -> Self {
        SensorReading {
            uuid,
            timestamp: taken_at.format(TIMESTAMP_FORMAT).to_string(),
            value: rng.gen_range(MIN_VALUE..MAX_VALUE),
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}
