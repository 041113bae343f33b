use std::sync::Arc;

pub mod auth;
pub mod buf;
pub mod codec;
pub mod config;
pub mod error;
pub mod event;
pub mod exporter;
pub mod flusher;
pub mod metadata;
pub mod meter;
pub mod resolver;
pub mod transport;
pub mod writer;

pub type MetricKey = String;
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// One measurement point, ready to be serialized into a measures payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub value: f64,
    pub timestamp: String,
    pub unit: Option<String>,
    pub metric_name: MetricKey,
    pub metadata: Arc<Metadata>,
}
