// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Configuration for the telemetry subsystem.

use serde::{Deserialize, Serialize};

/// How frequently the metrics aggregator drains reported snapshots into the
/// registry.
fn default_collection_interval_ms() -> u64 {
    1_000
}

/// Capacity of the bounded channel nodes use to report metric snapshots.
fn default_channel_capacity() -> usize {
    4_096
}

/// Top-level telemetry configuration, loaded alongside the pipeline config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Interval, in milliseconds, between metrics-collection passes.
    pub collection_interval_ms: u64,
    /// Capacity of the metrics-reporting channel.
    pub channel_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            collection_interval_ms: default_collection_interval_ms(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl Config {
    /// Whether any metrics consumer is configured. Always `true` today: the
    /// registry's Prometheus text endpoint is always active.
    #[must_use]
    pub const fn has_readers(&self) -> bool {
        true
    }
}
