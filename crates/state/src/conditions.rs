// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Kubernetes-style condition types used to describe the observed state of a
//! deployed pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The aspect of a pipeline's lifecycle a [`Condition`] reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConditionKind {
    /// Whether the pipeline's configuration was admitted (validated and
    /// scheduled onto a core).
    Accepted,
    /// Whether the pipeline is currently running and serving data.
    Ready,
    /// Whether the pipeline has fully drained and stopped.
    Drained,
}

/// Tri-state status for a [`Condition`], mirroring the Kubernetes condition
/// convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionStatus {
    /// The condition holds.
    True,
    /// The condition does not hold.
    False,
    /// The condition could not be determined (e.g. no runtime report yet).
    Unknown,
}

/// Machine-readable reason backing a condition's status, used to let
/// consumers (health probes, dashboards) distinguish benign transitional
/// states from genuine failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionReason {
    /// The pipeline has been configured but no core has reported in yet.
    Pending,
    /// A start request was issued but the pipeline thread hasn't admitted yet.
    StartRequested,
    /// The pipeline passed admission and is running normally.
    Admitted,
    /// The pipeline is running and serving data.
    Running,
    /// The pipeline is in the process of being deleted.
    Deleting,
    /// The pipeline is being forcibly torn down ahead of its normal drain.
    ForceDeleting,
    /// The pipeline has been fully removed.
    Deleted,
    /// No runtime instance exists for this pipeline core assignment.
    NoPipelineRuntime,
    /// Admission of the pipeline's configuration failed.
    AdmissionError,
    /// The pipeline terminated because of a runtime error or panic.
    RuntimeError,
}

/// A single observed condition, analogous to a Kubernetes object condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Which aspect of pipeline lifecycle this condition reports on.
    pub kind: ConditionKind,
    /// Current status of the condition.
    pub status: ConditionStatus,
    /// Machine-readable reason for the current status, if known.
    pub reason: Option<ConditionReason>,
    /// Human-readable detail, if any.
    pub message: Option<String>,
    /// When the condition last changed status.
    pub last_transition_time: Option<DateTime<Utc>>,
}

impl Condition {
    /// Builds a condition in the `Unknown` status with no reported runtime.
    #[must_use]
    pub const fn pending(kind: ConditionKind) -> Self {
        Self {
            kind,
            status: ConditionStatus::Unknown,
            reason: Some(ConditionReason::NoPipelineRuntime),
            message: None,
            last_transition_time: None,
        }
    }
}
