// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Aggregated, per-pipeline observed state, built up from per-core lifecycle
//! events reported by the controller.

use std::collections::HashMap;

use chrono::Utc;
use otap_df_config::CoreId;
use serde::Serialize;

use crate::conditions::{Condition, ConditionKind, ConditionReason, ConditionStatus};

/// Observed lifecycle state for a single core a pipeline is scheduled on.
#[derive(Debug, Clone, Serialize)]
struct CoreState {
    accepted: Condition,
    ready: Condition,
    drained: Condition,
}

impl CoreState {
    fn pending() -> Self {
        Self {
            accepted: Condition::pending(ConditionKind::Accepted),
            ready: Condition::pending(ConditionKind::Ready),
            drained: Condition::pending(ConditionKind::Drained),
        }
    }
}

/// Observed state of a pipeline across every core it's scheduled on.
///
/// The controller schedules one pipeline runtime per assigned core; this
/// type aggregates their individually-reported conditions into a single
/// per-pipeline view so health probes don't need to reason about core
/// topology.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStatus {
    expected_cores: usize,
    core_states: HashMap<CoreId, CoreState>,
}

impl PipelineStatus {
    /// Creates an observed-state tracker expecting `expected_cores` runtime
    /// instances to report in.
    #[must_use]
    pub fn new(expected_cores: usize) -> Self {
        Self {
            expected_cores,
            core_states: HashMap::new(),
        }
    }

    /// Number of cores this pipeline is expected to run on.
    #[must_use]
    pub const fn total_cores(&self) -> usize {
        self.expected_cores
    }

    fn core_mut(&mut self, core_id: CoreId) -> &mut CoreState {
        self.core_states.entry(core_id).or_insert_with(CoreState::pending)
    }

    /// Records that the pipeline on `core_id` was admitted successfully.
    pub fn record_admitted(&mut self, core_id: CoreId, message: Option<String>) {
        let now = Utc::now();
        let core = self.core_mut(core_id);
        core.accepted = Condition {
            kind: ConditionKind::Accepted,
            status: ConditionStatus::True,
            reason: Some(ConditionReason::Admitted),
            message,
            last_transition_time: Some(now),
        };
    }

    /// Records that the pipeline on `core_id` is running and serving data.
    pub fn record_ready(&mut self, core_id: CoreId, message: Option<String>) {
        let now = Utc::now();
        let core = self.core_mut(core_id);
        core.ready = Condition {
            kind: ConditionKind::Ready,
            status: ConditionStatus::True,
            reason: Some(ConditionReason::Running),
            message,
            last_transition_time: Some(now),
        };
    }

    /// Records that the pipeline on `core_id` drained to completion.
    pub fn record_drained(&mut self, core_id: CoreId, message: Option<String>) {
        let now = Utc::now();
        let core = self.core_mut(core_id);
        core.ready = Condition {
            kind: ConditionKind::Ready,
            status: ConditionStatus::False,
            reason: Some(ConditionReason::Deleted),
            message: message.clone(),
            last_transition_time: Some(now),
        };
        core.drained = Condition {
            kind: ConditionKind::Drained,
            status: ConditionStatus::True,
            reason: Some(ConditionReason::Deleted),
            message,
            last_transition_time: Some(now),
        };
    }

    /// Records that the pipeline on `core_id` terminated because of a
    /// runtime error.
    pub fn record_runtime_error(&mut self, core_id: CoreId, message: String) {
        let now = Utc::now();
        let core = self.core_mut(core_id);
        core.ready = Condition {
            kind: ConditionKind::Ready,
            status: ConditionStatus::False,
            reason: Some(ConditionReason::RuntimeError),
            message: Some(message),
            last_transition_time: Some(now),
        };
    }

    /// Merges the per-core conditions into one aggregated [`Condition`] per
    /// [`ConditionKind`]: `True` only if every reporting core agrees,
    /// otherwise the worst observed status/reason wins.
    #[must_use]
    pub fn conditions(&self) -> Vec<Condition> {
        [ConditionKind::Accepted, ConditionKind::Ready, ConditionKind::Drained]
            .into_iter()
            .map(|kind| self.aggregate(kind))
            .collect()
    }

    fn aggregate(&self, kind: ConditionKind) -> Condition {
        if self.core_states.is_empty() {
            return Condition::pending(kind);
        }

        let mut worst: Option<Condition> = None;
        for state in self.core_states.values() {
            let condition = match kind {
                ConditionKind::Accepted => &state.accepted,
                ConditionKind::Ready => &state.ready,
                ConditionKind::Drained => &state.drained,
            };
            let rank = status_rank(condition.status);
            let replace = match &worst {
                None => true,
                Some(current) => rank < status_rank(current.status),
            };
            if replace {
                worst = Some(condition.clone());
            }
        }
        worst.unwrap_or_else(|| Condition::pending(kind))
    }
}

/// Lower rank sorts first: a single `False`/`Unknown` core should make the
/// aggregated condition non-`True`.
const fn status_rank(status: ConditionStatus) -> u8 {
    match status {
        ConditionStatus::False => 0,
        ConditionStatus::Unknown => 1,
        ConditionStatus::True => 2,
    }
}
