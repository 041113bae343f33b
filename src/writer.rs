use std::sync::Arc;

use tracing::{debug, warn};

use crate::{
    auth::StaticAuth,
    buf::SampleBuffer,
    config::Config,
    error::{FlushError, SendError, WriteError},
    event::MeasurementEvent,
    exporter::PayloadSender,
    metadata::{HostMetadata, HttpMetadata, StaticMetadata},
    meter::Meters,
    resolver::MetricResolver,
    transport::{HttpTransport, Transport},
    Sample,
};

/// Entry point for the monitoring agent: buffers samples and sends them in
/// batches on the calling thread.
#[derive(Debug)]
pub struct BatchWriter {
    meters: Meters,
    buffer: SampleBuffer,
    sender: PayloadSender,
    batch_size: usize,
}
impl BatchWriter {
    pub fn new(meters: Meters, sender: PayloadSender, batch_size: usize) -> Self {
        Self {
            meters,
            buffer: SampleBuffer::new(),
            sender,
            batch_size,
        }
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        config.validate()?;
        let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(config.request_timeout));
        let auth = StaticAuth::new(config.auth.token.clone(), config.auth.endpoints.clone());
        let metadata: Arc<dyn HostMetadata> = match &config.metadata.node_id {
            Some(node_id) => Arc::new(StaticMetadata {
                node_id: Some(node_id.clone()),
                region: config.metadata.region.clone(),
            }),
            None => Arc::new(HttpMetadata::new(
                Arc::clone(&transport),
                &config.metadata.url,
                &config.meter_type,
            )),
        };
        let resolver = MetricResolver::new(
            Arc::clone(&transport),
            Arc::new(auth),
            metadata,
            config.meter_type.clone(),
        );
        let sender = PayloadSender::new(Arc::new(resolver), transport);
        Ok(Self::new(config.meters(), sender, config.batch_size))
    }

    pub fn sender(&self) -> &PayloadSender {
        &self.sender
    }

    pub fn pending(&self, metric_name: &str) -> usize {
        self.buffer.pending(metric_name)
    }

    /// Blocking I/O when the event fills its metric's batch
    pub fn write(&self, event: &MeasurementEvent) -> Result<(), WriteError> {
        let meter = self.meters.get(&event.plugin);
        let metric_name = meter.meter_name(event);
        let unit = meter.unit(event);
        let timestamp = event
            .iso_timestamp()
            .ok_or(WriteError::InvalidTimestamp(event.time))?;
        debug!(plugin = %event.plugin, metric = %metric_name, "writing");

        let metadata = Arc::new(event.meta.clone());
        let samples = event
            .values
            .iter()
            .copied()
            .filter(|value| {
                let finite = value.is_finite();
                if !finite {
                    debug!(metric = %metric_name, value, "skipping non-finite value");
                }
                finite
            })
            .map(|value| Sample {
                value,
                timestamp: timestamp.clone(),
                unit: unit.clone(),
                metric_name: metric_name.clone(),
                metadata: Arc::clone(&metadata),
            })
            .collect::<Vec<_>>();

        let Some(batch) = self.buffer.add(&metric_name, samples, self.batch_size) else {
            return Ok(());
        };
        self.send(&metric_name, &batch, unit.as_deref())
            .map_err(|source| WriteError::Send {
                metric: metric_name,
                source,
            })
    }

    /// Sends every buffered sample regardless of batch size.
    ///
    /// A failing metric does not keep the others from being sent.
    pub fn flush(&self) -> Result<(), FlushError> {
        let pending = self.buffer.drain_all();
        let mut attempted = 0;
        let mut failures = vec![];
        for (metric_name, batch) in pending {
            if batch.is_empty() {
                continue;
            }
            attempted += 1;
            let unit = batch.first().and_then(|sample| sample.unit.clone());
            if let Err(e) = self.send(&metric_name, &batch, unit.as_deref()) {
                failures.push((metric_name, e));
            }
        }
        if failures.is_empty() {
            return Ok(());
        }
        Err(FlushError {
            attempted,
            failures,
        })
    }

    fn send(&self, metric_name: &str, batch: &[Sample], unit: Option<&str>) -> Result<(), SendError> {
        let result = self.sender.send(metric_name, batch, unit);
        if let Err(e) = &result {
            warn!(
                metric = metric_name,
                samples = batch.len(),
                "dropping batch: {e}"
            );
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::{
        auth::METRIC_SERVICE,
        meter::DefaultMeter,
        transport::{
            fake::{FakeGnocchi, FakeTransport, ENDPOINT},
            Method, Outcome,
        },
    };

    fn writer(transport: Arc<FakeTransport>, batch_size: usize) -> BatchWriter {
        let auth = StaticAuth::new(
            "token",
            HashMap::from([(METRIC_SERVICE.to_string(), ENDPOINT.to_string())]),
        );
        let metadata = StaticMetadata {
            node_id: Some("node-1".into()),
            region: None,
        };
        let resolver = MetricResolver::new(
            transport.clone(),
            Arc::new(auth),
            Arc::new(metadata),
            "generic",
        );
        let units = HashMap::from([("cpu.load".to_string(), "percent".to_string())]);
        let sender = PayloadSender::new(Arc::new(resolver), transport);
        BatchWriter::new(Meters::new(DefaultMeter::new(units)), sender, batch_size)
    }

    fn event(plugin: &str, kind: &str, time: f64, values: Vec<f64>) -> MeasurementEvent {
        MeasurementEvent {
            plugin: plugin.into(),
            kind: kind.into(),
            host: "localhost".into(),
            time,
            interval: 10.0,
            values,
            ..Default::default()
        }
    }

    fn writes_to(transport: &FakeTransport, store: &FakeGnocchi, name: &str) -> usize {
        let ids = store
            .state()
            .metrics
            .iter()
            .filter(|m| m.name == name)
            .map(|m| format!("/v1/metric/{}/measures", m.id))
            .collect::<Vec<_>>();
        transport
            .requests()
            .iter()
            .filter(|r| r.method == Method::Post && ids.iter().any(|id| r.url.ends_with(id)))
            .count()
    }

    #[test]
    fn test_third_write_sends_full_batch_and_flush_sends_rest() {
        let store = FakeGnocchi::new();
        let transport = store.transport();
        let writer = writer(transport.clone(), 3);

        writer.write(&event("cpu", "load", 1.0, vec![0.5])).unwrap();
        writer.write(&event("memory", "used", 1.0, vec![512.0])).unwrap();
        writer.write(&event("cpu", "load", 2.0, vec![0.6])).unwrap();
        assert_eq!(writes_to(&transport, &store, "cpu.load"), 0);
        writer.write(&event("cpu", "load", 3.0, vec![0.7])).unwrap();
        assert_eq!(writes_to(&transport, &store, "cpu.load"), 1);
        assert_eq!(writer.pending("cpu.load"), 0);
        assert_eq!(
            store.state().measures_of("cpu.load"),
            vec![
                json!({"value": 0.5, "timestamp": "1970-01-01T00:00:01.000000"}),
                json!({"value": 0.6, "timestamp": "1970-01-01T00:00:02.000000"}),
                json!({"value": 0.7, "timestamp": "1970-01-01T00:00:03.000000"}),
            ]
        );
        assert_eq!(store.state().metrics[0].unit.as_deref(), Some("percent"));

        writer.flush().unwrap();
        assert_eq!(writes_to(&transport, &store, "cpu.load"), 1);
        assert_eq!(writes_to(&transport, &store, "memory.used"), 1);
        assert_eq!(store.state().measures_of("memory.used").len(), 1);
    }

    #[test]
    fn test_one_sample_per_value() {
        let store = FakeGnocchi::new();
        let writer = writer(store.transport(), 10);
        writer.write(&event("interface", "if_octets", 5.0, vec![1.0, 2.0])).unwrap();
        assert_eq!(writer.pending("interface.if_octets"), 2);
    }

    #[test]
    fn test_non_finite_values_are_skipped() {
        let store = FakeGnocchi::new();
        let writer = writer(store.transport(), 2);
        writer
            .write(&event("cpu", "load", 1.0, vec![f64::NAN, 1.0, f64::INFINITY]))
            .unwrap();
        assert_eq!(writer.pending("cpu.load"), 1);
    }

    #[test]
    fn test_invalid_timestamp_buffers_nothing() {
        let store = FakeGnocchi::new();
        let writer = writer(store.transport(), 1);
        let err = writer
            .write(&event("cpu", "load", f64::NAN, vec![1.0]))
            .unwrap_err();
        assert!(matches!(err, WriteError::InvalidTimestamp(_)));
        assert_eq!(writer.pending("cpu.load"), 0);
    }

    #[test]
    fn test_send_failure_reaches_caller_and_drops_batch() {
        let store = FakeGnocchi::new();
        store
            .state()
            .write_script
            .insert("cpu.load".into(), [Outcome::from_status(500, String::new())].into());
        let writer = writer(store.transport(), 1);
        let err = writer.write(&event("cpu", "load", 1.0, vec![1.0])).unwrap_err();
        assert!(matches!(err, WriteError::Send { ref metric, .. } if metric == "cpu.load"));
        assert_eq!(writer.pending("cpu.load"), 0);
        writer.flush().unwrap();
        assert!(store.state().measures_of("cpu.load").is_empty());
    }

    #[test]
    fn test_flush_isolates_failing_metrics() {
        let store = FakeGnocchi::new();
        store
            .state()
            .write_script
            .insert("disk.octets".into(), [Outcome::from_status(400, "bad".into())].into());
        let writer = writer(store.transport(), 100);
        writer.write(&event("cpu", "load", 1.0, vec![1.0])).unwrap();
        writer.write(&event("disk", "octets", 1.0, vec![2.0])).unwrap();
        writer.write(&event("memory", "used", 1.0, vec![3.0])).unwrap();

        let err = writer.flush().unwrap_err();
        assert_eq!(err.attempted, 3);
        assert_eq!(err.failures.len(), 1);
        assert_eq!(err.failures[0].0, "disk.octets");
        let state = store.state();
        assert_eq!(state.measures_of("cpu.load").len(), 1);
        assert_eq!(state.measures_of("memory.used").len(), 1);
    }

    #[test]
    fn test_flush_with_nothing_pending_sends_nothing() {
        let store = FakeGnocchi::new();
        let transport = store.transport();
        let writer = writer(transport.clone(), 3);
        writer.flush().unwrap();
        assert!(transport.requests().is_empty());
    }

    #[test]
    fn test_concurrent_writers_lose_nothing() {
        const THREADS: usize = 4;
        const EVENTS: usize = 50;
        let store = FakeGnocchi::new();
        let writer = Arc::new(writer(store.transport(), 7));
        let handles = (0..THREADS)
            .map(|t| {
                let writer = Arc::clone(&writer);
                std::thread::spawn(move || {
                    for i in 0..EVENTS {
                        let time = (t * EVENTS + i) as f64;
                        writer.write(&event("cpu", "load", time, vec![time])).unwrap();
                    }
                })
            })
            .collect::<Vec<_>>();
        for handle in handles {
            handle.join().unwrap();
        }
        writer.flush().unwrap();
        let mut values = store
            .state()
            .measures_of("cpu.load")
            .iter()
            .map(|m| m["value"].as_f64().unwrap() as usize)
            .collect::<Vec<_>>();
        values.sort_unstable();
        assert_eq!(values, (0..THREADS * EVENTS).collect::<Vec<_>>());
    }
}
