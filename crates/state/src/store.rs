// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Central store of observed pipeline state, fed by lifecycle events reported
//! from every pipeline-core thread and exposed read-only to the admin
//! surface.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use otap_df_config::{DeployedPipelineKey, PipelineKey};
use otap_df_telemetry::event::{EngineEvent, ObservedEventReporter};
use tokio_util::sync::CancellationToken;

use crate::error::Error;
use crate::pipeline_status::PipelineStatus;

type StateMap = Arc<Mutex<HashMap<PipelineKey, PipelineStatus>>>;

fn pipeline_key_of(deployed: &DeployedPipelineKey) -> PipelineKey {
    PipelineKey::new(deployed.pipeline_group_id.clone(), deployed.pipeline_id.clone())
}

/// Owns the observed-state map and the channel lifecycle events arrive on.
///
/// One instance is created at controller startup; [`Self::handle`] gives the
/// admin surface read-only access, [`Self::reporter`] gives pipeline threads
/// a way to publish events, and [`Self::run`] drives the aggregation loop
/// until cancelled.
pub struct ObservedStateStore {
    state: StateMap,
    events_tx: flume::Sender<EngineEvent>,
    events_rx: flume::Receiver<EngineEvent>,
}

impl Default for ObservedStateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ObservedStateStore {
    /// Creates an empty store with its own event channel.
    #[must_use]
    pub fn new() -> Self {
        let (events_tx, events_rx) = flume::unbounded();
        Self {
            state: Arc::new(Mutex::new(HashMap::new())),
            events_tx,
            events_rx,
        }
    }

    /// Returns a cloneable, read-only handle onto the observed state.
    #[must_use]
    pub fn handle(&self) -> ObservedStateHandle {
        ObservedStateHandle {
            state: self.state.clone(),
        }
    }

    /// Returns a reporter pipeline threads use to publish lifecycle events.
    #[must_use]
    pub fn reporter(&self) -> ObservedEventReporter {
        ObservedEventReporter::new(self.events_tx.clone())
    }

    /// Registers that `pipeline` is expected to run on `expected_cores`
    /// cores, so health probes can tell "not yet reported" apart from "not
    /// deployed at all".
    pub fn register_pipeline(&self, pipeline: PipelineKey, expected_cores: usize) {
        let mut state = self.state.lock().expect("observed state lock poisoned");
        let _ = state
            .entry(pipeline)
            .or_insert_with(|| PipelineStatus::new(expected_cores));
    }

    /// Drains reported events into the state map until `cancellation_token`
    /// fires or every reporter has been dropped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EventChannelClosed`] if the channel closes while the
    /// store is still expected to be running (i.e. not via cancellation).
    pub async fn run(self, cancellation_token: CancellationToken) -> Result<(), Error> {
        loop {
            tokio::select! {
                biased;
                () = cancellation_token.cancelled() => return Ok(()),
                event = self.events_rx.recv_async() => {
                    match event {
                        Ok(event) => self.apply(event),
                        Err(_) => return Ok(()),
                    }
                }
            }
        }
    }

    fn apply(&self, event: EngineEvent) {
        let mut state = self.state.lock().expect("observed state lock poisoned");
        match event {
            EngineEvent::Admitted { pipeline, message } => {
                let key = pipeline_key_of(&pipeline);
                state
                    .entry(key)
                    .or_insert_with(|| PipelineStatus::new(1))
                    .record_admitted(pipeline.core_id, message);
            }
            EngineEvent::Ready { pipeline, message } => {
                let key = pipeline_key_of(&pipeline);
                state
                    .entry(key)
                    .or_insert_with(|| PipelineStatus::new(1))
                    .record_ready(pipeline.core_id, message);
            }
            EngineEvent::Drained { pipeline, message } => {
                let key = pipeline_key_of(&pipeline);
                state
                    .entry(key)
                    .or_insert_with(|| PipelineStatus::new(1))
                    .record_drained(pipeline.core_id, message);
            }
            EngineEvent::PipelineRuntimeError {
                pipeline, message, ..
            } => {
                let key = pipeline_key_of(&pipeline);
                state
                    .entry(key)
                    .or_insert_with(|| PipelineStatus::new(1))
                    .record_runtime_error(pipeline.core_id, message);
            }
        }
    }
}

/// Cheap-to-clone, read-only handle onto the observed-state map.
#[derive(Clone)]
pub struct ObservedStateHandle {
    state: StateMap,
}

impl ObservedStateHandle {
    /// Returns a point-in-time copy of every tracked pipeline's status.
    #[must_use]
    pub fn snapshot(&self) -> HashMap<PipelineKey, PipelineStatus> {
        self.state.lock().expect("observed state lock poisoned").clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    fn deployed_key(core_id: usize) -> DeployedPipelineKey {
        DeployedPipelineKey {
            pipeline_group_id: "group".into(),
            pipeline_id: "pipe".into(),
            core_id,
        }
    }

    #[tokio::test]
    async fn applies_events_until_cancelled() {
        let store = ObservedStateStore::new();
        let handle = store.handle();
        let reporter = store.reporter();
        let token = CancellationToken::new();
        let run_token = token.clone();
        let run_handle = tokio::spawn(store.run(run_token));

        reporter.report(EngineEvent::admitted(deployed_key(0), None));
        reporter.report(EngineEvent::ready(deployed_key(0), None));

        for _ in 0..100 {
            let snapshot = handle.snapshot();
            if snapshot
                .get(&PipelineKey::new("group".into(), "pipe".into()))
                .map(|status| status.total_cores() > 0 || !status.conditions().is_empty())
                .unwrap_or(false)
            {
                break;
            }
            tokio::task::yield_now().await;
        }

        let key = PipelineKey::new("group".into(), "pipe".into());
        let status = handle.snapshot().remove(&key).expect("pipeline tracked");
        let ready = status
            .conditions()
            .into_iter()
            .find(|c| c.kind == crate::conditions::ConditionKind::Ready)
            .expect("ready condition present");
        assert_eq!(ready.status, crate::conditions::ConditionStatus::True);

        token.cancel();
        run_handle.await.unwrap().unwrap();
    }
}
