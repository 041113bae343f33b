use chrono::DateTime;
use serde::Deserialize;

use crate::Metadata;

/// One value list as handed over by the monitoring agent.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MeasurementEvent {
    pub plugin: String,
    #[serde(default)]
    pub plugin_instance: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(rename = "type_instance", default)]
    pub kind_instance: String,
    #[serde(default)]
    pub host: String,
    /// Seconds since the Unix epoch
    pub time: f64,
    #[serde(default)]
    pub interval: f64,
    pub values: Vec<f64>,
    #[serde(default)]
    pub meta: Metadata,
}
impl MeasurementEvent {
    /// UTC, no offset, microsecond precision.
    pub fn iso_timestamp(&self) -> Option<String> {
        iso_timestamp(self.time)
    }
}

pub fn iso_timestamp(epoch_secs: f64) -> Option<String> {
    if !epoch_secs.is_finite() {
        return None;
    }
    let micros = (epoch_secs * 1e6).round();
    if micros.abs() >= i64::MAX as f64 {
        return None;
    }
    let micros = micros as i64;
    let secs = micros.div_euclid(1_000_000);
    let nanos = u32::try_from(micros.rem_euclid(1_000_000) * 1000).ok()?;
    let time = DateTime::from_timestamp(secs, nanos)?;
    Some(time.format("%Y-%m-%dT%H:%M:%S%.6f").to_string())
}
