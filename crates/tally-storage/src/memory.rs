use crate::error::{Result, StorageError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use tally_common::{Metric, MetricKind, MetricValue};

/// Point-in-time copy of every gauge and counter.
///
/// Serializes to the snapshot file format `{"gauges":{...},"counters":{...}}`.
/// Keys are kept sorted so equal snapshots serialize to identical bytes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub gauges: BTreeMap<String, f64>,
    #[serde(default)]
    pub counters: BTreeMap<String, i64>,
}

impl Snapshot {
    pub fn is_empty(&self) -> bool {
        self.gauges.is_empty() && self.counters.is_empty()
    }

    fn kind_of(&self, id: &str) -> Option<MetricKind> {
        if self.gauges.contains_key(id) {
            Some(MetricKind::Gauge)
        } else if self.counters.contains_key(id) {
            Some(MetricKind::Counter)
        } else {
            None
        }
    }

    fn merge(&mut self, metric: &Metric) -> MetricValue {
        match metric.value {
            MetricValue::Gauge(v) => {
                self.gauges.insert(metric.id.clone(), v);
                MetricValue::Gauge(v)
            }
            MetricValue::Counter(delta) => {
                let total = self.counters.entry(metric.id.clone()).or_insert(0);
                *total = total.saturating_add(delta);
                MetricValue::Counter(*total)
            }
        }
    }
}

/// Concurrency-safe in-memory gauges and counters.
///
/// A single mutex guards both maps; every mutation and every snapshot takes
/// it, so a reader never observes half of a batch.
#[derive(Debug, Default)]
pub struct MetricStore {
    inner: Mutex<Snapshot>,
}

impl MetricStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the maps, recovering from a poisoned Mutex if necessary.
    fn lock(&self) -> MutexGuard<'_, Snapshot> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Replaces the stored gauge value.
    pub fn set_gauge(&self, id: &str, value: f64) {
        self.lock().gauges.insert(id.to_string(), value);
    }

    /// Adds `delta` to the counter, starting from zero. Returns the new total.
    pub fn set_counter(&self, id: &str, delta: i64) -> i64 {
        let mut inner = self.lock();
        let total = inner.counters.entry(id.to_string()).or_insert(0);
        *total = total.saturating_add(delta);
        *total
    }

    pub fn get_gauge(&self, id: &str) -> Option<f64> {
        self.lock().gauges.get(id).copied()
    }

    pub fn get_counter(&self, id: &str) -> Option<i64> {
        self.lock().counters.get(id).copied()
    }

    pub fn get(&self, kind: MetricKind, id: &str) -> Option<MetricValue> {
        match kind {
            MetricKind::Gauge => self.get_gauge(id).map(MetricValue::Gauge),
            MetricKind::Counter => self.get_counter(id).map(MetricValue::Counter),
        }
    }

    pub fn snapshot_all(&self) -> Snapshot {
        self.lock().clone()
    }

    /// Replaces the whole store, e.g. with restored state.
    pub fn replace(&self, snapshot: Snapshot) {
        *self.lock() = snapshot;
    }

    /// Merges one metric and returns it carrying the now-current value.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::KindConflict`] if the id is stored under the
    /// other kind; the store is left untouched.
    pub fn apply(&self, metric: &Metric) -> Result<Metric> {
        let mut inner = self.lock();
        check_kind(&inner, &metric.id, metric.kind())?;
        let value = inner.merge(metric);
        Ok(Metric {
            id: metric.id.clone(),
            value,
        })
    }

    /// Merges a batch under one lock acquisition.
    ///
    /// The batch is validated first: if any record conflicts with the store or
    /// with another record of the batch, nothing is applied.
    pub fn apply_batch(&self, metrics: &[Metric]) -> Result<()> {
        let mut inner = self.lock();

        let mut seen: HashMap<&str, MetricKind> = HashMap::with_capacity(metrics.len());
        for metric in metrics {
            check_kind(&inner, &metric.id, metric.kind())?;
            match seen.insert(metric.id.as_str(), metric.kind()) {
                Some(existing) if existing != metric.kind() => {
                    return Err(StorageError::KindConflict {
                        id: metric.id.clone(),
                        existing,
                    });
                }
                _ => {}
            }
        }

        for metric in metrics {
            inner.merge(metric);
        }
        Ok(())
    }
}

fn check_kind(snapshot: &Snapshot, id: &str, kind: MetricKind) -> Result<()> {
    match snapshot.kind_of(id) {
        Some(existing) if existing != kind => Err(StorageError::KindConflict {
            id: id.to_string(),
            existing,
        }),
        _ => Ok(()),
    }
}
