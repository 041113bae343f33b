use std::collections::HashMap;

use parking_lot::Mutex;

use crate::{MetricKey, Sample};

pub type Batch<T = Sample> = Vec<T>;

/// Pending samples per metric, flushed in whole batches.
///
/// Every operation takes the same lock, so an entry is either swapped out
/// completely or not at all: a sample ends up in exactly one returned batch.
#[derive(Debug)]
pub struct SampleBuffer<T = Sample> {
    entries: Mutex<HashMap<MetricKey, Batch<T>>>,
}
impl<T> SampleBuffer<T> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Appends `samples` under `key`.
    ///
    /// Returns the whole entry, leaving an empty one behind, once it holds at
    /// least `limit` samples. A `limit` of zero behaves like one.
    pub fn add(
        &self,
        key: &str,
        samples: impl IntoIterator<Item = T>,
        limit: usize,
    ) -> Option<Batch<T>> {
        let limit = limit.max(1);
        let mut entries = self.entries.lock();
        let entry = entries.entry(key.to_owned()).or_default();
        entry.extend(samples);
        if entry.len() < limit {
            return None;
        }
        Some(std::mem::take(entry))
    }

    /// Takes everything buffered, across all keys.
    pub fn drain_all(&self) -> HashMap<MetricKey, Batch<T>> {
        std::mem::take(&mut *self.entries.lock())
    }

    pub fn pending(&self, key: &str) -> usize {
        self.entries.lock().get(key).map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().values().all(Vec::is_empty)
    }
}
impl<T> Default for SampleBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}
