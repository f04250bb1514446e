// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Central, process-wide registry of telemetry entities and metric sets.
//!
//! An "entity" is anything telemetry can be scoped to: the engine itself, a
//! pipeline, a node, or a channel endpoint. Nodes register one or more
//! metric sets against an entity; the registry tracks live registrations so
//! they can be unregistered on teardown, and aggregates reported snapshots
//! so the admin surface can render current values.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use prometheus::{IntGauge, Registry};

use crate::attributes::AttributeSetHandler;
use crate::metrics::{MetricSet, MetricSetHandler, MetricSetSnapshot};

/// Opaque handle to a registered entity (engine, pipeline, node, or channel).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityKey(u64);

/// Opaque handle to a registered metric set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MetricSetKey(u64);

struct Inner {
    next_entity: AtomicU64,
    next_metric_set: AtomicU64,
    entities: Mutex<HashMap<u64, String>>,
    metric_sets: Mutex<HashMap<u64, u64>>,
    latest: Mutex<HashMap<String, MetricSetSnapshot>>,
    prometheus_registry: Registry,
    gauges: Mutex<HashMap<String, IntGauge>>,
}

/// Cloneable handle to the telemetry registry; cheap to pass around.
#[derive(Clone)]
pub struct TelemetryRegistryHandle {
    inner: Arc<Inner>,
}

impl Debug for TelemetryRegistryHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryRegistryHandle")
            .field("entity_count", &self.entity_count())
            .field("metric_set_count", &self.metric_set_count())
            .finish()
    }
}

/// Public-facing alias used by the admin surface to query registered
/// metrics without exposing registration methods meant for engine internals.
pub type MetricsRegistryHandle = TelemetryRegistryHandle;

impl Default for TelemetryRegistryHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryRegistryHandle {
    /// Creates a fresh, empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                next_entity: AtomicU64::new(1),
                next_metric_set: AtomicU64::new(1),
                entities: Mutex::new(HashMap::new()),
                metric_sets: Mutex::new(HashMap::new()),
                latest: Mutex::new(HashMap::new()),
                prometheus_registry: Registry::new(),
                gauges: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Registers an entity described by `attrs`, returning its key.
    #[must_use]
    pub fn register_entity(&self, attrs: impl AttributeSetHandler) -> EntityKey {
        let id = self.inner.next_entity.fetch_add(1, Ordering::Relaxed);
        let label = attrs.descriptor().name.to_owned();
        let _ = self.inner.entities.lock().insert(id, label);
        EntityKey(id)
    }

    /// Removes an entity from the registry. Idempotent.
    pub fn unregister_entity(&self, key: EntityKey) -> Result<(), crate::error::Error> {
        let _ = self.inner.entities.lock().remove(&key.0);
        Ok(())
    }

    /// Registers a fresh, zero-valued metric set tied to `entity_key`.
    #[must_use]
    pub fn register_metric_set_for_entity<T>(&self, entity_key: EntityKey) -> MetricSet<T>
    where
        T: MetricSetHandler + Default + Debug + Send + Sync,
    {
        let id = self.inner.next_metric_set.fetch_add(1, Ordering::Relaxed);
        let _ = self
            .inner
            .metric_sets
            .lock()
            .insert(id, entity_key.0);
        MetricSet::new(MetricSetKey(id), T::default())
    }

    /// Registers a fresh metric set tied to a brand-new entity described by
    /// `attrs`. Used by tests and call sites that build nodes outside the
    /// normal pipeline-build entity scoping.
    #[must_use]
    pub fn register_metric_set<T>(&self, attrs: impl AttributeSetHandler) -> MetricSet<T>
    where
        T: MetricSetHandler + Default + Debug + Send + Sync,
    {
        let entity_key = self.register_entity(attrs);
        self.register_metric_set_for_entity(entity_key)
    }

    /// Removes a metric set from the registry. Idempotent.
    pub fn unregister_metric_set(&self, key: MetricSetKey) -> Result<(), crate::error::Error> {
        let _ = self.inner.metric_sets.lock().remove(&key.0);
        let _ = self.inner.latest.lock().remove(&key.0);
        Ok(())
    }

    /// Number of currently registered entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.inner.entities.lock().len()
    }

    /// Number of currently registered metric sets.
    #[must_use]
    pub fn metric_set_count(&self) -> usize {
        self.inner.metric_sets.lock().len()
    }

    /// Records a reported snapshot and mirrors its values into the
    /// Prometheus registry backing [`Self::prometheus_text`].
    ///
    /// The metric set key isn't carried on the wire snapshot (nodes may be
    /// torn down by the time it's collected), so values are aggregated by
    /// metric-set name and field; this sacrifices per-node labels in favor
    /// of a dependency-free aggregation story, documented as a deliberate
    /// simplification.
    pub fn record_snapshot(&self, snapshot: MetricSetSnapshot) {
        for (field, value) in &snapshot.values {
            let key = format!(
                "otap_{}_{}",
                sanitize(snapshot.name),
                sanitize(field)
            );
            let mut gauges = self.inner.gauges.lock();
            let gauge = gauges.entry(key.clone()).or_insert_with(|| {
                let gauge = IntGauge::new(key.clone(), snapshot.name).expect("valid metric name");
                let _ = self.inner.prometheus_registry.register(Box::new(gauge.clone()));
                gauge
            });
            gauge.set(*value);
        }
        let _ = self
            .inner
            .latest
            .lock()
            .insert(snapshot.name.to_owned(), snapshot);
    }

    /// Renders all recorded metrics using the standard Prometheus text
    /// exposition format.
    #[must_use]
    pub fn prometheus_text(&self) -> String {
        use prometheus::{Encoder, TextEncoder};
        let encoder = TextEncoder::new();
        let metric_families = self.inner.prometheus_registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .unwrap_or_default();
        String::from_utf8(buffer).unwrap_or_default()
    }

    /// Returns an iterator over the most recently reported snapshot for
    /// every metric set currently tracked by the collector.
    #[must_use]
    pub fn iter_metrics(&self) -> MetricsIterator {
        let values: Vec<MetricSetSnapshot> = self.inner.latest.lock().values().cloned().collect();
        MetricsIterator {
            values: values.into_iter(),
        }
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Iterator over the latest [`MetricSetSnapshot`] of every tracked metric
/// set, returned by [`TelemetryRegistryHandle::iter_metrics`].
pub struct MetricsIterator {
    values: std::vec::IntoIter<MetricSetSnapshot>,
}

impl Iterator for MetricsIterator {
    type Item = MetricSetSnapshot;

    fn next(&mut self) -> Option<Self::Item> {
        self.values.next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{AttributesDescriptor, MetricsDescriptor};

    #[derive(Debug, Default)]
    struct DummyAttrs;

    impl AttributeSetHandler for DummyAttrs {
        fn descriptor(&self) -> &'static AttributesDescriptor {
            static D: AttributesDescriptor = AttributesDescriptor {
                name: "dummy",
                fields: &[],
            };
            &D
        }

        fn attribute_values(&self) -> Vec<crate::attributes::AttributeValue> {
            Vec::new()
        }
    }

    #[derive(Debug, Default)]
    struct DummyMetrics;

    impl MetricSetHandler for DummyMetrics {
        fn descriptor(&self) -> &'static MetricsDescriptor {
            static D: MetricsDescriptor = MetricsDescriptor {
                name: "dummy.metrics",
                fields: &[],
            };
            &D
        }

        fn snapshot(&self) -> Vec<(&'static str, i64)> {
            Vec::new()
        }
    }

    #[test]
    fn register_and_unregister_round_trips() {
        let registry = TelemetryRegistryHandle::new();
        let entity = registry.register_entity(DummyAttrs);
        assert_eq!(registry.entity_count(), 1);
        let metrics = registry.register_metric_set_for_entity::<DummyMetrics>(entity);
        assert_eq!(registry.metric_set_count(), 1);
        registry.unregister_metric_set(metrics.metric_set_key()).unwrap();
        registry.unregister_entity(entity).unwrap();
        assert_eq!(registry.entity_count(), 0);
        assert_eq!(registry.metric_set_count(), 0);
    }
}
