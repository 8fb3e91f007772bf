//! Synthetic sensor data
//!
//! [`reading::SensorReading`] is the JSON document published to the broker;
//! [`generator::SensorGenerator`] owns the background loop producing one
//! reading per interval.

pub mod generator;
pub mod reading;

pub use generator::{PublishTarget, SensorGenerator};
pub use reading::SensorReading;
