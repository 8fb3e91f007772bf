//! Sensor generator with a statum state machine per publishing cycle
//!
//! The generator itself is either Stopped or Running. While Running, a tokio
//! task repeats one cycle per interval:
//!
//! ```text
//! Sampling ──► Encoding(reading) ──► Publishing(payload) ──► Sampling
//!                    │                        │
//!                    └── serialize error ─────┴── publish error ──► loop ends
//! ```
//!
//! The running flag is an atomic run token: `0` means Stopped, any other value
//! names the run that may keep looping. A loop exits at its next check once the
//! token no longer carries its own id, so a quick stop/start pair never leaves
//! two loops publishing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use statum::{machine, state};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::reading::SensorReading;
use crate::error::{BridgeError, BridgeResult};
use crate::mqtt::Publish;

/// Topic and QoS a run publishes to
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublishTarget {
    pub topic: String,
    pub qos: u8,
}

#[state]
#[derive(Debug, Clone)]
pub enum CycleState {
    Sampling,
    Encoding(SensorReading),
    Publishing(Vec<u8>),
}

#[machine]
#[derive(Debug)]
pub struct SensorCycle<S: CycleState> {
    sensor_id: Uuid,
    target: PublishTarget,
    last_taken_at: Option<NaiveDateTime>,
}

impl<S: CycleState> SensorCycle<S> {
    pub fn sensor_id(&self) -> Uuid {
        self.sensor_id
    }

    pub fn target(&self) -> &PublishTarget {
        &self.target
    }

    fn missing_state_data(&self, what: &str) -> BridgeError {
        BridgeError::PublishError {
            topic: self.target.topic.clone(),
            reason: format!("sensor cycle has no {}", what),
        }
    }
}

impl SensorCycle<Sampling> {
    pub fn create(target: PublishTarget) -> Self {
        Self::new(Uuid::new_v4(), target, None)
    }

    /// Takes a reading, never going back in time within one run
    pub fn sample(mut self) -> SensorCycle<Encoding> {
        let now = Local::now().naive_local();
        let taken_at = match self.last_taken_at {
            Some(last) if last > now => last,
            _ => now,
        };
        self.last_taken_at = Some(taken_at);

        let reading = SensorReading::sample(self.sensor_id, taken_at, &mut rand::thread_rng());
        debug!("Sampled reading {:?}", reading);
        self.transition_with(reading)
    }
}

impl SensorCycle<Encoding> {
    pub fn encode(self) -> BridgeResult<SensorCycle<Publishing>> {
        // Encoding is only reached through `sample`, which always attaches a reading
        let Some(reading) = self.get_state_data() else {
            return Err(self.missing_state_data("reading"));
        };
        let payload = reading.to_json()?;
        Ok(self.transition_with(payload))
    }
}

impl SensorCycle<Publishing> {
    pub async fn publish<P: Publish>(self, publisher: &P) -> BridgeResult<SensorCycle<Sampling>> {
        // Publishing is only reached through `encode`, which always attaches a payload
        let Some(payload) = self.get_state_data().cloned() else {
            return Err(self.missing_state_data("payload"));
        };

        let text = String::from_utf8_lossy(&payload).into_owned();
        publisher
            .publish(&self.target.topic, payload, self.target.qos)
            .await?;
        info!("Published sensor data: {}", text);

        Ok(self.transition())
    }
}

struct RunToken {
    active: Arc<AtomicU64>,
    run: u64,
}

impl RunToken {
    fn is_current(&self) -> bool {
        self.active.load(Ordering::SeqCst) == self.run
    }

    /// Clears the flag if this run still owns it
    fn finish(&self) -> bool {
        self.active
            .compare_exchange(self.run, 0, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

/// Starts and stops the background loop that publishes synthetic readings
pub struct SensorGenerator<P: Publish> {
    publisher: Arc<P>,
    default_target: PublishTarget,
    interval: Duration,
    active_run: Arc<AtomicU64>,
    next_run: AtomicU64,
}

impl<P: Publish> SensorGenerator<P> {
    pub fn new(publisher: Arc<P>, default_target: PublishTarget, interval: Duration) -> Self {
        SensorGenerator {
            publisher,
            default_target,
            interval,
            active_run: Arc::new(AtomicU64::new(0)),
            next_run: AtomicU64::new(1),
        }
    }

    pub fn default_target(&self) -> &PublishTarget {
        &self.default_target
    }

    pub fn is_running(&self) -> bool {
        self.active_run.load(Ordering::SeqCst) != 0
    }

    /// Spawns the loop unless one is already running
    ///
    /// Returns `false` (and logs a warning) when already Running.
    pub fn start(&self, target: Option<PublishTarget>) -> bool {
        let run = self.next_run.fetch_add(1, Ordering::SeqCst);

        if self
            .active_run
            .compare_exchange(0, run, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("Sensor streaming is already running.");
            return false;
        }

        let target = target.unwrap_or_else(|| self.default_target.clone());
        let token = RunToken {
            active: self.active_run.clone(),
            run,
        };

        tokio::spawn(stream_sensor_values(
            self.publisher.clone(),
            target,
            self.interval,
            token,
        ));

        info!("Sensor streaming started.");
        true
    }

    /// Asks the running loop to exit at its next check
    ///
    /// Returns `false` (and logs a warning) when already Stopped.
    pub fn stop(&self) -> bool {
        if self.active_run.swap(0, Ordering::SeqCst) == 0 {
            warn!("Sensor streaming is not running.");
            return false;
        }

        info!("Sensor streaming stopping...");
        true
    }
}

async fn stream_sensor_values<P: Publish>(
    publisher: Arc<P>,
    target: PublishTarget,
    interval: Duration,
    token: RunToken,
) {
    let mut cycle = SensorCycle::create(target);
    info!(
        "Sensor {} publishing to '{}' (QoS {}) every {} ms",
        cycle.sensor_id(),
        cycle.target().topic,
        cycle.target().qos,
        interval.as_millis()
    );

    let mut published: u64 = 0;

    while token.is_current() {
        let encoding = cycle.sample();

        let publishing = match encoding.encode() {
            Ok(publishing) => publishing,
            Err(e) => {
                error!("Failed to serialize sensor data: {}", e);
                break;
            }
        };

        cycle = match publishing.publish(publisher.as_ref()).await {
            Ok(sampling) => sampling,
            Err(e) => {
                error!("Failed to publish sensor data: {}", e);
                break;
            }
        };
        published += 1;

        tokio::time::sleep(interval).await;
    }

    if token.finish() {
        warn!("Sensor streaming stopped after an error");
    }
    info!("Sensor streaming loop exited after {} readings", published);
}
