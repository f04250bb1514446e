// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Metric sets: named groups of instruments tied to a registered entity.

use std::ops::{Deref, DerefMut};

use crate::descriptor::MetricsDescriptor;
use crate::registry::MetricSetKey;

/// Implemented by every metric set (hand-written or generated by
/// `#[otap_df_telemetry_macros::metric_set]`).
pub trait MetricSetHandler: std::fmt::Debug {
    /// Static description of the fields this metric set exposes.
    fn descriptor(&self) -> &'static MetricsDescriptor;

    /// Current value of every field, in descriptor field order.
    fn snapshot(&self) -> Vec<(&'static str, i64)>;
}

/// A metric set bound to a registry entry, so that its values can be
/// collected and its registration cleaned up when the owning node or
/// channel is torn down.
#[derive(Debug)]
pub struct MetricSet<T> {
    key: MetricSetKey,
    inner: T,
}

impl<T> MetricSet<T> {
    /// Wraps an already-constructed metric struct with its registry key.
    #[must_use]
    pub const fn new(key: MetricSetKey, inner: T) -> Self {
        Self { key, inner }
    }

    /// Returns the registry key this metric set was registered under.
    #[must_use]
    pub const fn metric_set_key(&self) -> MetricSetKey {
        self.key
    }
}

impl<T: MetricSetHandler> MetricSet<T> {
    /// Takes a point-in-time snapshot of this metric set's values.
    #[must_use]
    pub fn snapshot(&self) -> MetricSetSnapshot {
        MetricSetSnapshot {
            name: self.inner.descriptor().name,
            values: self.inner.snapshot(),
        }
    }
}

impl<T> Deref for MetricSet<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T> DerefMut for MetricSet<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.inner
    }
}

/// A point-in-time snapshot of one metric set's values, as sent to the
/// metrics aggregator via a [`crate::reporter::MetricsReporter`].
#[derive(Debug, Clone)]
pub struct MetricSetSnapshot {
    /// Name of the metric set this snapshot was taken from.
    pub name: &'static str,
    /// Field values at the time the snapshot was taken.
    pub values: Vec<(&'static str, i64)>,
}
