use serde::Serialize;

use crate::Sample;

#[derive(Debug, Serialize)]
struct Measure<'a> {
    value: f64,
    timestamp: &'a str,
}

/// Measures payload: `[{"value": .., "timestamp": ..}, ..]` in batch order.
pub fn encode_measures(samples: &[Sample]) -> serde_json::Result<String> {
    let measures = samples
        .iter()
        .map(|sample| Measure {
            value: sample.value,
            timestamp: &sample.timestamp,
        })
        .collect::<Vec<_>>();
    serde_json::to_string(&measures)
}
