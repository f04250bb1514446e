// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Health policy configuration.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Policy controlling aggregate probes and using the per-core `ProbePolicy`.
#[derive(Debug, Clone)]
pub struct AggregationPolicy {
    /// Mapping of per-core phases to probes.
    pub core_probe: ProbePolicy,
    /// Quorum for livez across cores.
    pub live_quorum: Quorum,
    /// Quorum for readyz across cores.
    pub ready_quorum: Quorum,
}

/// Defaults: live if *any* core is live; ready when *all* non-deleted cores are ready.
pub const DEFAULT_AGGREGATION_POLICY: AggregationPolicy = AggregationPolicy {
    core_probe: DEFAULT_PROBE_POLICY,
    live_quorum: Quorum::AtLeast(1),
    ready_quorum: Quorum::All,
};

/// Serializable health policy declared alongside a pipeline's other policies.
///
/// Overrides which phases count toward readiness for this pipeline; liveness
/// phases and cross-core quorums stay at their [`DEFAULT_AGGREGATION_POLICY`]
/// values, since nothing in this configuration surface needs to tune them yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct HealthPolicy {
    /// Phases in which a pipeline instance is considered ready to serve traffic.
    #[serde(default = "default_ready_if")]
    pub ready_if: Vec<PhaseKind>,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            ready_if: default_ready_if(),
        }
    }
}

fn default_ready_if() -> Vec<PhaseKind> {
    DEFAULT_READY_IF.to_vec()
}

/// Quorum expresses how many cores must satisfy a predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
#[allow(variant_size_differences)]
pub enum Quorum {
    /// All non-deleted cores must satisfy the predicate.
    All,
    /// At least an absolute number of non-deleted cores must satisfy the predicate.
    AtLeast(usize),
    /// At least this percentage (0..=100) of non-deleted cores must satisfy the predicate.
    Percent(u8),
}

/// Coarse discriminant for `Phase`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum PhaseKind {
    /// Initial state, not yet started.
    Pending,
    /// In the process of starting.
    Starting,
    /// Fully started and operational.
    Running,
    /// In the process of applying a live update.
    Updating,
    /// In the process of rolling back a failed update.
    RollingBack,
    /// In the process of draining in-flight work before stopping.
    Draining,
    /// Fully stopped (not running).
    Stopped,
    /// Permanently rejected for configuration reasons.
    Rejected,
    /// Failed due to a runtime error.
    Failed,
    /// In the process of being deleted.
    Deleting,
    /// Fully deleted (not running, not recoverable).
    Deleted,
}

/// Declarative mapping of phases to Kubernetes probes.
/// - `live_if`: pipeline instance is considered alive (the pod/process is functional/manageable).
/// - `ready_if`: instance is ready to accept traffic/work.
#[derive(Debug, Clone)]
pub struct ProbePolicy {
    /// Phases in which the instance is considered alive.
    pub live_if: &'static [PhaseKind],
    /// Phases in which the instance is considered ready.
    pub ready_if: &'static [PhaseKind],
}

/// Default policy:
/// - live in all states except `Deleted`
/// - ready in `Running` (and optionally `Updating`).
pub const DEFAULT_LIVE_IF: &[PhaseKind] = &[
    PhaseKind::Pending,
    PhaseKind::Starting,
    PhaseKind::Running,
    PhaseKind::Updating,
    PhaseKind::RollingBack,
    PhaseKind::Draining,
    PhaseKind::Stopped,
    PhaseKind::Rejected,
    PhaseKind::Failed,
    PhaseKind::Deleting,
];

/// Flip `Updating` off here if you do not want readiness during updates.
pub const DEFAULT_READY_IF: &[PhaseKind] = &[PhaseKind::Running, PhaseKind::Updating];

const DEFAULT_PROBE_POLICY: ProbePolicy = ProbePolicy {
    live_if: DEFAULT_LIVE_IF,
    ready_if: DEFAULT_READY_IF,
};

impl ProbePolicy {
    /// Check if the given phase kind is considered live.
    #[inline]
    #[must_use]
    pub fn is_live<K: Into<PhaseKind>>(&self, k: K) -> bool {
        self.live_if.contains(&k.into())
    }

    /// Check if the given phase kind is considered ready.
    #[inline]
    #[must_use]
    pub fn is_ready<K: Into<PhaseKind>>(&self, k: K) -> bool {
        self.ready_if.contains(&k.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ready_if_matches_running_and_updating() {
        assert_eq!(
            HealthPolicy::default().ready_if,
            vec![PhaseKind::Running, PhaseKind::Updating]
        );
    }

    #[test]
    fn deserializes_ready_if_override() {
        let policy: HealthPolicy = serde_yaml::from_str("ready_if: [Running]").unwrap();
        assert_eq!(policy.ready_if, vec![PhaseKind::Running]);
    }
}
