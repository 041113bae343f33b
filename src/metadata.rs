//! Host identity lookups.
//!
//! A failed lookup never aborts the send path: it reads as "unknown" and the
//! caller decides how degraded it is willing to run.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::transport::{Outcome, Request, Transport};

pub const DEFAULT_METADATA_URL: &str = "http://169.254.169.254/openstack/latest";

pub trait HostMetadata: core::fmt::Debug + Send + Sync {
    fn region(&self) -> Option<String>;
    fn node_id(&self) -> Option<String>;
}

/// Identity pinned in configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticMetadata {
    pub node_id: Option<String>,
    pub region: Option<String>,
}
impl HostMetadata for StaticMetadata {
    fn region(&self) -> Option<String> {
        self.region.clone()
    }
    fn node_id(&self) -> Option<String> {
        self.node_id.clone()
    }
}

/// Reads the OpenStack metadata documents.
///
/// Chameleon deployments nest their vendor data under a `chameleon` key of
/// `vendor_data2.json`; everywhere else the same keys sit at the top of
/// `vendor_data.json`.
#[derive(Debug)]
pub struct HttpMetadata {
    transport: Arc<dyn Transport>,
    base_url: String,
    meter_type: String,
}
impl HttpMetadata {
    pub fn new(transport: Arc<dyn Transport>, base_url: &str, meter_type: &str) -> Self {
        Self {
            transport,
            base_url: base_url.trim_end_matches('/').to_owned(),
            meter_type: meter_type.to_owned(),
        }
    }

    fn document(&self, name: &str) -> Option<Value> {
        let url = format!("{}/{}", self.base_url, name);
        match self.transport.execute(Request::get(&url)) {
            Outcome::Success(body) => match serde_json::from_str(&body) {
                Ok(doc) => Some(doc),
                Err(e) => {
                    debug!(%url, "metadata document is not JSON: {e}");
                    None
                }
            },
            outcome => {
                debug!(%url, ?outcome, "metadata document unavailable");
                None
            }
        }
    }

    fn vendor_data(&self) -> Option<Value> {
        if let Some(Value::Object(mut doc)) = self.document("vendor_data2.json") {
            if let Some(nested) = doc.remove("chameleon") {
                return Some(nested);
            }
        }
        self.document("vendor_data.json")
    }
}
impl HostMetadata for HttpMetadata {
    fn region(&self) -> Option<String> {
        string_field(self.vendor_data()?, "region")
    }

    fn node_id(&self) -> Option<String> {
        let node_id = if self.meter_type == "cuda" {
            string_field(self.vendor_data()?, "node")
        } else {
            string_field(self.document("meta_data.json")?, "uuid")
        };
        debug!(?node_id, "node identity");
        node_id
    }
}

fn string_field(doc: Value, key: &str) -> Option<String> {
    match doc.get(key)? {
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}
