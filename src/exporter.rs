use std::sync::Arc;

use tracing::{debug, info};

use crate::{
    codec::encode_measures,
    error::SendError,
    resolver::MetricResolver,
    transport::{Outcome, Request, Transport},
    Sample,
};

#[derive(Debug)]
pub struct PayloadSender {
    resolver: Arc<MetricResolver>,
    transport: Arc<dyn Transport>,
}
impl PayloadSender {
    pub fn new(resolver: Arc<MetricResolver>, transport: Arc<dyn Transport>) -> Self {
        Self {
            resolver,
            transport,
        }
    }

    pub fn resolver(&self) -> &MetricResolver {
        &self.resolver
    }

    /// Blocking I/O
    ///
    /// A write the store answers with "not found" is retried exactly once
    /// against a freshly created metric, and a rejected token is replaced once
    /// per write. Every other failure is returned as is.
    pub fn send(
        &self,
        metric_name: &str,
        batch: &[Sample],
        unit: Option<&str>,
    ) -> Result<(), SendError> {
        debug!(metric = metric_name, samples = batch.len(), "sending batch");
        let payload = encode_measures(batch)?;
        let metric_id = self.resolver.resolve_or_create(metric_name, unit)?;
        match self.write(&metric_id, &payload)? {
            Outcome::Success(_) => Ok(()),
            Outcome::NotFound(_) => {
                debug!(metric = metric_name, %metric_id, "metric not found, creating a new one");
                let metric_id = self.resolver.recreate(metric_name, unit)?;
                info!(metric = metric_name, %metric_id, "retrying write");
                match self.write(&metric_id, &payload)? {
                    Outcome::Success(_) => Ok(()),
                    outcome => Err(SendError::Write {
                        metric_id,
                        detail: outcome.into_failure(),
                    }),
                }
            }
            outcome => Err(SendError::Write {
                metric_id,
                detail: outcome.into_failure(),
            }),
        }
    }

    fn write(&self, metric_id: &str, payload: &str) -> Result<Outcome, SendError> {
        match self.write_once(metric_id, payload)? {
            Outcome::Unauthorized(_) => {
                info!(%metric_id, "authenticating again and retrying write");
                self.write_once(metric_id, payload)
            }
            outcome => Ok(outcome),
        }
    }

    fn write_once(&self, metric_id: &str, payload: &str) -> Result<Outcome, SendError> {
        let session = self.resolver.session()?;
        let url = session.measures_url(metric_id);
        let outcome = self
            .transport
            .execute(Request::post(&url, payload).token(&session.token));
        if let Outcome::Unauthorized(_) = outcome {
            self.resolver.invalidate_session(&session);
        }
        Ok(outcome)
    }
}
