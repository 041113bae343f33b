use thiserror::Error;

use crate::MetricKey;

/// Why a request to the metric store did not succeed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FailureDetail {
    #[error("HTTP {code}{}", with_body(.body))]
    Status { code: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),
}

fn with_body(body: &str) -> String {
    if body.is_empty() {
        String::new()
    } else {
        format!(": {body}")
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("no endpoint registered for service {service}")]
    UnknownService { service: String },
}

#[derive(Error, Debug)]
pub enum SendError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("no resource could be resolved for this host")]
    NoResource,

    #[error("could not create metric {name}: {detail}")]
    CreateMetric { name: MetricKey, detail: FailureDetail },

    #[error("write to metric {metric_id} failed: {detail}")]
    Write {
        metric_id: String,
        detail: FailureDetail,
    },

    #[error("unexpected response from {url}: {reason}")]
    Protocol { url: String, reason: String },

    #[error("failed to encode measures: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum WriteError {
    #[error("timestamp {0} is out of range")]
    InvalidTimestamp(f64),

    #[error("failed to send batch of {metric}: {source}")]
    Send {
        metric: MetricKey,
        #[source]
        source: SendError,
    },
}

/// Every key whose batch could not be sent during a flush.
#[derive(Error, Debug)]
#[error("{} of {attempted} batches failed to send", .failures.len())]
pub struct FlushError {
    pub attempted: usize,
    pub failures: Vec<(MetricKey, SendError)>,
}
