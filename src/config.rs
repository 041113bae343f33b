//! Configuration file handling
//!
//! ```toml
//! batch_size = 10
//! flush_interval = "10s"
//! meter_type = "generic"
//!
//! [auth]
//! token = "..."
//! [auth.endpoints]
//! gnocchi = "http://gnocchi:8041"
//!
//! [units]
//! "cpu.percent" = "%"
//!
//! [meters.load]
//! name = "cpu.load"
//! unit = "percent"
//! ```

use std::{collections::HashMap, path::Path, time::Duration};

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};

use crate::{
    auth::METRIC_SERVICE,
    meter::{DefaultMeter, FixedMeter, Meters},
    metadata::DEFAULT_METADATA_URL,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Samples buffered per metric before a write is issued
    pub batch_size: usize,
    #[serde(with = "humantime_serde")]
    pub flush_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Resource type the host is registered under
    pub meter_type: String,
    pub auth: AuthConfig,
    pub metadata: MetadataConfig,
    pub units: HashMap<String, String>,
    pub meters: HashMap<String, MeterConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub token: String,
    pub endpoints: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    pub url: String,
    /// Skips the metadata service when set
    pub node_id: Option<String>,
    pub region: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MeterConfig {
    pub name: Option<String>,
    pub unit: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            batch_size: 1,
            flush_interval: Duration::from_secs(10),
            request_timeout: Duration::from_secs(5),
            meter_type: "generic".to_string(),
            auth: AuthConfig::default(),
            metadata: MetadataConfig::default(),
            units: HashMap::new(),
            meters: HashMap::new(),
        }
    }
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_METADATA_URL.to_string(),
            node_id: None,
            region: None,
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.batch_size >= 1, "batch_size must be at least 1");
        ensure!(
            !self.flush_interval.is_zero(),
            "flush_interval must be greater than zero"
        );
        ensure!(
            self.auth.endpoints.contains_key(METRIC_SERVICE),
            "auth.endpoints.{METRIC_SERVICE} is required"
        );
        Ok(())
    }

    pub fn meters(&self) -> Meters {
        let default = DefaultMeter::new(self.units.clone());
        let mut meters = Meters::new(default.clone());
        for (plugin, meter) in &self.meters {
            meters.register(
                plugin.clone(),
                Box::new(FixedMeter::new(
                    meter.name.clone(),
                    meter.unit.clone(),
                    default.clone(),
                )),
            );
        }
        meters
    }
}
