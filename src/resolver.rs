//! Remote identity of this host's resource and of each metric it reports.
//!
//! Everything resolved here is cached for the lifetime of the resolver; the
//! only way a cached metric id is replaced is [`MetricResolver::recreate`],
//! used when the store reports the id as unknown. The session is the one
//! exception: a rejected token drops it and the next call authenticates again.

use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::{
    auth::{AuthProvider, Session, METRIC_SERVICE},
    error::SendError,
    metadata::HostMetadata,
    transport::{Outcome, Request, Transport},
    MetricKey,
};

pub const ARCHIVE_POLICY: &str = "high";

#[derive(Debug, Deserialize)]
struct RemoteMetric {
    id: String,
    name: String,
    #[serde(default)]
    unit: Option<String>,
}

#[derive(Debug)]
pub struct MetricResolver {
    transport: Arc<dyn Transport>,
    auth: Arc<dyn AuthProvider>,
    metadata: Arc<dyn HostMetadata>,
    resource_type: String,
    region: OnceCell<Option<String>>,
    session: RwLock<Option<Arc<Session>>>,
    resource_id: Mutex<Option<String>>,
    metric_ids: DashMap<MetricKey, String>,
}
impl MetricResolver {
    pub fn new(
        transport: Arc<dyn Transport>,
        auth: Arc<dyn AuthProvider>,
        metadata: Arc<dyn HostMetadata>,
        resource_type: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            auth,
            metadata,
            resource_type: resource_type.into(),
            region: OnceCell::new(),
            session: RwLock::new(None),
            resource_id: Mutex::new(None),
            metric_ids: DashMap::new(),
        }
    }

    /// Authenticates on first use. A failed attempt is retried on the next call.
    pub fn session(&self) -> Result<Arc<Session>, SendError> {
        if let Some(session) = self.session.read().as_ref() {
            return Ok(Arc::clone(session));
        }
        let mut slot = self.session.write();
        if let Some(session) = slot.as_ref() {
            return Ok(Arc::clone(session));
        }
        let region = self.region.get_or_init(|| self.metadata.region());
        let token = self.auth.token()?;
        let endpoint = self
            .auth
            .service_endpoint(METRIC_SERVICE, region.as_deref())?;
        info!(%endpoint, ?region, "authenticated against metric store");
        let session = Arc::new(Session { token, endpoint });
        *slot = Some(Arc::clone(&session));
        Ok(session)
    }

    /// Drops `rejected` so the next call authenticates again. A session
    /// another caller already replaced is left alone.
    pub fn invalidate_session(&self, rejected: &Session) {
        let mut slot = self.session.write();
        if slot.as_ref().is_some_and(|s| s.token == rejected.token) {
            warn!("metric store rejected the token, dropping the session");
            *slot = None;
        }
    }

    fn note_rejection(&self, session: &Session, outcome: &Outcome) {
        if let Outcome::Unauthorized(_) = outcome {
            self.invalidate_session(session);
        }
    }

    pub fn cached(&self, name: &str) -> Option<String> {
        self.metric_ids.get(name).map(|id| id.value().clone())
    }

    /// Blocking I/O on a cache miss
    pub fn resolve_or_create(&self, name: &str, unit: Option<&str>) -> Result<String, SendError> {
        if let Some(id) = self.cached(name) {
            return Ok(id);
        }
        debug!(metric = name, "no known id, resolving");
        let session = self.session()?;
        let resource_id = self.resource_id(&session)?;
        let metric_id = match self.lookup_metric(&session, &resource_id, name, unit) {
            Some(id) => id,
            None => self.create_metric(&session, &resource_id, name, unit)?,
        };
        self.metric_ids.insert(name.to_owned(), metric_id.clone());
        Ok(metric_id)
    }

    /// Creates the metric without looking it up first and replaces the cached id.
    pub fn recreate(&self, name: &str, unit: Option<&str>) -> Result<String, SendError> {
        let session = self.session()?;
        let resource_id = self.resource_id(&session)?;
        let metric_id = self.create_metric(&session, &resource_id, name, unit)?;
        self.metric_ids.insert(name.to_owned(), metric_id.clone());
        Ok(metric_id)
    }

    fn resource_url(&self, session: &Session) -> String {
        format!("{}/v1/resource/{}", session.endpoint, self.resource_type)
    }

    fn metrics_url(&self, session: &Session, resource_id: &str) -> String {
        format!("{}/{}/metric/", self.resource_url(session), resource_id)
    }

    /// Resolves or creates the host's resource. Concurrent callers wait for
    /// the first one; only a successful resolution is kept.
    fn resource_id(&self, session: &Session) -> Result<String, SendError> {
        let mut slot = self.resource_id.lock();
        if let Some(id) = slot.as_ref() {
            return Ok(id.clone());
        }
        let Some(node_id) = self.metadata.node_id() else {
            warn!("host has no node identity, metrics cannot be attached to a resource");
            return Err(SendError::NoResource);
        };
        let id = match self.get_resource(session, &node_id) {
            Some(id) => id,
            None => {
                debug!(%node_id, "resource does not exist, creating it now");
                self.create_resource(session, &node_id)
                    .ok_or(SendError::NoResource)?
            }
        };
        *slot = Some(id.clone());
        Ok(id)
    }

    fn get_resource(&self, session: &Session, node_id: &str) -> Option<String> {
        let url = format!("{}/{}", self.resource_url(session), node_id);
        match self.transport.execute(Request::get(&url).token(&session.token)) {
            Outcome::Success(body) => {
                let id = parse_id(&body);
                debug!(?id, "resource lookup");
                id
            }
            Outcome::NotFound(_) => None,
            outcome => {
                self.note_rejection(session, &outcome);
                debug!(%node_id, detail = %outcome.into_failure(), "resource lookup failed");
                None
            }
        }
    }

    fn create_resource(&self, session: &Session, node_id: &str) -> Option<String> {
        let url = self.resource_url(session);
        let body = json!({ "id": node_id }).to_string();
        match self
            .transport
            .execute(Request::post(&url, &body).token(&session.token))
        {
            Outcome::Success(body) => {
                let id = parse_id(&body);
                info!(%node_id, resource_id = ?id, "created resource");
                id
            }
            Outcome::Conflict(_) => {
                debug!(%node_id, "resource was created concurrently, resolving it again");
                self.get_resource(session, node_id)
            }
            outcome => {
                self.note_rejection(session, &outcome);
                warn!(%node_id, detail = %outcome.into_failure(), "failed to create resource");
                None
            }
        }
    }

    /// Any failure reads as "no such metric", which sends the caller down the
    /// create path.
    fn lookup_metric(
        &self,
        session: &Session,
        resource_id: &str,
        name: &str,
        unit: Option<&str>,
    ) -> Option<String> {
        let url = self.metrics_url(session, resource_id);
        let body = match self.transport.execute(Request::get(&url).token(&session.token)) {
            Outcome::Success(body) => body,
            outcome => {
                self.note_rejection(session, &outcome);
                warn!(metric = name, detail = %outcome.into_failure(), "metric lookup failed, treating it as absent");
                return None;
            }
        };
        let metrics: Vec<RemoteMetric> = match serde_json::from_str(&body) {
            Ok(metrics) => metrics,
            Err(e) => {
                warn!(metric = name, "unreadable metric listing, treating it as absent: {e}");
                return None;
            }
        };
        metrics
            .into_iter()
            .find(|m| m.name == name && m.unit.as_deref() == unit)
            .map(|m| m.id)
    }

    fn create_metric(
        &self,
        session: &Session,
        resource_id: &str,
        name: &str,
        unit: Option<&str>,
    ) -> Result<String, SendError> {
        let url = self.metrics_url(session, resource_id);
        let mut body = serde_json::Map::new();
        body.insert(
            name.to_owned(),
            json!({ "archive_policy_name": ARCHIVE_POLICY, "unit": unit }),
        );
        let body = Value::Object(body).to_string();
        match self
            .transport
            .execute(Request::post(&url, &body).token(&session.token))
        {
            Outcome::Success(resp) => {
                let id = parse_created_metric(&resp, name).ok_or_else(|| SendError::Protocol {
                    url: url.clone(),
                    reason: format!("no id for metric {name} in response"),
                })?;
                info!(metric = name, metric_id = %id, "created metric");
                Ok(id)
            }
            Outcome::Conflict(body) => {
                debug!(metric = name, "metric already exists, resolving it again");
                self.lookup_metric(session, resource_id, name, unit)
                    .ok_or_else(|| SendError::CreateMetric {
                        name: name.to_owned(),
                        detail: Outcome::Conflict(body).into_failure(),
                    })
            }
            outcome => {
                self.note_rejection(session, &outcome);
                Err(SendError::CreateMetric {
                    name: name.to_owned(),
                    detail: outcome.into_failure(),
                })
            }
        }
    }
}

fn parse_id(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value.get("id")?.as_str().map(str::to_owned)
}

/// Accepts either the created metric itself or the resource's metric list.
fn parse_created_metric(body: &str, name: &str) -> Option<String> {
    match serde_json::from_str::<Value>(body).ok()? {
        Value::Array(metrics) => metrics
            .iter()
            .find(|m| m.get("name").and_then(Value::as_str) == Some(name))
            .and_then(|m| m.get("id")?.as_str())
            .map(str::to_owned),
        value => value.get("id")?.as_str().map(str::to_owned),
    }
}
