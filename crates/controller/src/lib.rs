// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! OTAP Dataflow Engine Controller
//!
//! This controller is responsible for deploying, managing, and monitoring pipeline groups
//! within the current process.
//!
//! Each pipeline configuration declares its CPU requirements through
//! `policies.resources.core_allocation`.
//! Based on this policy, the controller allocates CPU cores and spawns one dedicated
//! thread per assigned core. Threads are pinned to distinct CPU cores, following a
//! strict thread-per-core model.
//!
//! A pipeline deployed on `n` cores results in `n` worker threads. Hot data paths are
//! fully contained within each thread to maximize CPU cache locality and minimize
//! cross-thread contention. Inter-thread communication is restricted to control
//! messages and internal telemetry only.
//!
//! By default, pipelines are expected to run on dedicated CPU cores. It is possible
//! to deploy multiple pipeline configurations on the same cores, primarily for
//! consolidation, testing, or transitional deployments. This comes at the cost of
//! reduced efficiency, especially cache locality. Even in this mode, pipeline
//! instances run in independent threads and do not share mutable data structures.
//!
//! Pipelines do not perform implicit work stealing, dynamic scheduling, or automatic
//! load balancing across threads. Any form of cross-pipeline or cross-thread data
//! exchange must be explicitly modeled.
//!
//! In the future, controller-managed named channels will be introduced as the
//! recommended mechanism to implement explicit load balancing and routing schemes
//! within the engine. These channels will complement the existing SO_REUSEPORT-based
//! load balancing mechanism already supported at the receiver level on operating
//! systems that provide it.
//!
//! Pipelines can be gracefully shut down by sending control messages through their
//! control channels.
//!
//! Future work includes:
//! - TODO: Complete status and health checks for pipelines
//! - TODO: Auto-restart threads in case of panic
//! - TODO: Live pipeline updates
//! - TODO: Better resource control

use crate::error::Error;
use crate::thread_task::spawn_thread_local_task;
use core_affinity::CoreId;
use otap_df_config::engine::OtelDataflowSpec;
use otap_df_config::policy::CoreAllocation;
use otap_df_config::{DeployedPipelineKey, PipelineKey, pipeline::PipelineConfig};
use otap_df_engine::PipelineFactory;
use otap_df_engine::context::{ControllerContext, PipelineContext};
use otap_df_engine::control::{
    PipelineAdminSender, PipelineCtrlMsgReceiver, PipelineCtrlMsgSender, pipeline_ctrl_msg_channel,
};
use otap_df_engine::entity_context::set_pipeline_entity_key;
use otap_df_engine::error::{Error as EngineError, error_summary_from};
use otap_df_state::store::ObservedStateStore;
use otap_df_telemetry::event::{EngineEvent, ErrorSummary, ObservedEventReporter};
use otap_df_telemetry::reporter::MetricsReporter;
use otap_df_telemetry::{Config as MetricsConfig, MetricsSystem, otel_info, otel_warn};
use std::sync::Arc;
use std::thread;

/// Error types and helpers for the controller module.
pub mod error;
/// Utilities to spawn async tasks on dedicated threads with graceful shutdown.
pub mod thread_task;

/// Controller for managing pipelines in a thread-per-core model.
///
/// # Thread Safety
/// This struct is designed to be used in multi-threaded contexts. Each pipeline is run on a
/// dedicated thread pinned to a CPU core.
/// Intended for use as a long-lived process controller.
pub struct Controller<PData: 'static + Clone + Send + Sync + std::fmt::Debug> {
    /// The pipeline factory used to build runtime pipelines.
    pipeline_factory: &'static PipelineFactory<PData>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunMode {
    ParkMainThread,
    ShutdownWhenDone,
}

impl<PData: 'static + Clone + Send + Sync + std::fmt::Debug> Controller<PData> {
    /// Creates a new controller with the given pipeline factory.
    pub const fn new(pipeline_factory: &'static PipelineFactory<PData>) -> Self {
        Self { pipeline_factory }
    }

    /// Starts the controller with the given engine configurations.
    pub fn run_forever(&self, engine_config: OtelDataflowSpec) -> Result<(), Error> {
        self.run_with_mode(engine_config, RunMode::ParkMainThread)
    }

    /// Starts the controller with the given engine configurations.
    ///
    /// Runs until pipelines are shut down, then closes telemetry/admin services.
    pub fn run_till_shutdown(&self, engine_config: OtelDataflowSpec) -> Result<(), Error> {
        self.run_with_mode(engine_config, RunMode::ShutdownWhenDone)
    }

    fn run_with_mode(
        &self,
        engine_config: OtelDataflowSpec,
        run_mode: RunMode,
    ) -> Result<(), Error> {
        let num_pipeline_groups = engine_config.groups.len();
        let resolved_config = engine_config.resolve();
        // The dedicated engine observability pipeline (if configured) is not deployed by
        // this controller: the collector reports its own process telemetry through the
        // admin surface instead of running a second internal pipeline.
        let (engine, pipelines, _observability_pipeline) = resolved_config.into_parts();
        let num_pipelines = pipelines.len();
        let admin_settings = engine.http_admin.clone().unwrap_or_default();
        otel_info!(
            "controller.start",
            num_pipeline_groups = num_pipeline_groups,
            num_pipelines = num_pipelines
        );

        // Create the metrics system and observed event store shared by every pipeline thread.
        let metrics_system = MetricsSystem::new(MetricsConfig::default());
        let telemetry_registry = metrics_system.registry();
        let metrics_reporter = metrics_system.reporter();
        let controller_ctx = ControllerContext::new(telemetry_registry.clone());

        let obs_state_store = ObservedStateStore::new();
        let obs_state_handle = obs_state_store.handle();
        let engine_evt_reporter = obs_state_store.reporter();

        let pipeline_count = pipelines.len();
        let all_cores =
            core_affinity::get_core_ids().ok_or_else(|| Error::CoreDetectionUnavailable)?;
        let available_core_ids = if pipeline_count == 0 {
            Vec::new()
        } else {
            all_cores
        };

        let metrics_collection_handle = spawn_thread_local_task("metrics-aggregator", {
            move |_cancellation_token| metrics_system.run_collection_loop()
        })?;

        // Resolve core allocation and register every pipeline's expected core count with the
        // observed state store before handing the store off to its background task.
        let mut deployments = Vec::with_capacity(pipelines.len());
        for pipeline_entry in pipelines {
            let requested_cores = Self::select_cores_for_allocation(
                available_core_ids.clone(),
                &pipeline_entry.policies.resources.core_allocation,
            )?;
            obs_state_store.register_pipeline(
                PipelineKey::new(
                    pipeline_entry.pipeline_group_id.clone(),
                    pipeline_entry.pipeline_id.clone(),
                ),
                requested_cores.len(),
            );
            deployments.push((pipeline_entry, requested_cores));
        }

        // Start the observed state store background task
        let obs_state_join_handle = spawn_thread_local_task(
            "observed-state-store",
            move |cancellation_token| obs_state_store.run(cancellation_token),
        )?;

        let mut threads = Vec::new();
        let mut ctrl_msg_senders = Vec::new();

        // TODO: We do not have proper thread::current().id assignment.
        let mut next_thread_id: usize = 1;

        for (pipeline_entry, requested_cores) in deployments {
            let channel_capacity_policy = pipeline_entry.policies.channel_capacity;
            let pipeline_group_id = pipeline_entry.pipeline_group_id;
            let pipeline_id = pipeline_entry.pipeline_id;
            let pipeline = pipeline_entry.pipeline;
            let num_cores = requested_cores.len();

            for core_id in requested_cores {
                let pipeline_key = DeployedPipelineKey {
                    pipeline_group_id: pipeline_group_id.clone(),
                    pipeline_id: pipeline_id.clone(),
                    core_id: core_id.id,
                };
                let (pipeline_ctrl_msg_tx, pipeline_ctrl_msg_rx) =
                    pipeline_ctrl_msg_channel(channel_capacity_policy.control.pipeline);
                ctrl_msg_senders.push(pipeline_ctrl_msg_tx.clone());

                let pipeline_config = pipeline.clone();
                let pipeline_factory = self.pipeline_factory;
                let thread_id = next_thread_id;
                next_thread_id += 1;
                let pipeline_handle = controller_ctx.pipeline_context_with(
                    pipeline_group_id.clone(),
                    pipeline_id.clone(),
                    core_id.id,
                    num_cores,
                    thread_id,
                );
                let metrics_reporter = metrics_reporter.clone();

                let thread_name = format!(
                    "pipeline-{}-{}-core-{}",
                    pipeline_group_id.as_ref(),
                    pipeline_id.as_ref(),
                    core_id.id
                );

                let run_key = pipeline_key.clone();
                let engine_evt_reporter = engine_evt_reporter.clone();
                let handle = thread::Builder::new()
                    .name(thread_name.clone())
                    .spawn(move || {
                        Self::run_pipeline_thread(
                            run_key,
                            core_id,
                            pipeline_config,
                            pipeline_factory,
                            pipeline_handle,
                            engine_evt_reporter,
                            metrics_reporter,
                            pipeline_ctrl_msg_tx,
                            pipeline_ctrl_msg_rx,
                        )
                    })
                    .map_err(|e| Error::ThreadSpawnError {
                        thread_name: thread_name.clone(),
                        source: e,
                    })?;

                threads.push((thread_name, thread_id, pipeline_key, handle));
            }
        }

        // Drop the original metrics sender so only pipeline threads hold references
        drop(metrics_reporter);

        // Start the admin HTTP server
        let admin_server_handle = spawn_thread_local_task("http-admin", move |cancellation_token| {
            // Convert the concrete senders to trait objects for the admin crate
            let admin_senders: Vec<Arc<dyn PipelineAdminSender>> = ctrl_msg_senders
                .into_iter()
                .map(|sender| Arc::new(sender) as Arc<dyn PipelineAdminSender>)
                .collect();

            otap_df_admin::run(
                admin_settings,
                obs_state_handle,
                admin_senders,
                telemetry_registry,
                cancellation_token,
            )
        })?;

        // Wait for all pipeline threads to finish and collect their results
        let mut results: Vec<Result<(), Error>> = Vec::with_capacity(threads.len());
        for (thread_name, thread_id, pipeline_key, handle) in threads {
            match handle.join() {
                Ok(Ok(_)) => {
                    engine_evt_reporter.report(EngineEvent::drained(pipeline_key, None));
                }
                Ok(Err(e)) => {
                    let err_summary: ErrorSummary = error_summary_from_gen(&e);
                    engine_evt_reporter.report(EngineEvent::pipeline_runtime_error(
                        pipeline_key.clone(),
                        "Pipeline encountered a runtime error.",
                        err_summary,
                    ));
                    results.push(Err(e));
                }
                Err(e) => {
                    let err_summary = ErrorSummary::Pipeline {
                        error_kind: "panic".into(),
                        message: "The pipeline panicked during execution.".into(),
                        source: Some(format!("{e:?}")),
                    };
                    engine_evt_reporter.report(EngineEvent::pipeline_runtime_error(
                        pipeline_key.clone(),
                        "The pipeline panicked during execution.",
                        err_summary,
                    ));
                    // Thread join failed, handle the error
                    let core_id = pipeline_key.core_id;
                    return Err(Error::ThreadPanic {
                        thread_name,
                        thread_id,
                        core_id,
                        panic_message: format!("{e:?}"),
                    });
                }
            }
        }

        // Check if any pipeline threads returned an error
        if let Some(err) = results.into_iter().find_map(Result::err) {
            return Err(err);
        }

        // In standard engine mode we keep the main thread parked after startup.
        if run_mode == RunMode::ParkMainThread {
            thread::park();
        }

        // All pipelines have finished; shut down the admin HTTP server and metrics/state tasks.
        admin_server_handle.shutdown_and_join()?;
        metrics_collection_handle.shutdown_and_join()?;
        obs_state_join_handle.shutdown_and_join()?;

        Ok(())
    }

    /// Selects which CPU cores to use based on the given allocation.
    fn select_cores_for_allocation(
        mut available_core_ids: Vec<CoreId>,
        core_allocation: &CoreAllocation,
    ) -> Result<Vec<CoreId>, Error> {
        available_core_ids.sort_by_key(|c| c.id);

        let max_core_id = available_core_ids.iter().map(|c| c.id).max().unwrap_or(0);
        let num_cores = available_core_ids.len();

        match core_allocation {
            CoreAllocation::AllCores => Ok(available_core_ids),
            CoreAllocation::CoreCount { count } => {
                if *count == 0 {
                    Ok(available_core_ids)
                } else if *count > num_cores {
                    Err(Error::InvalidCoreAllocation {
                        alloc: core_allocation.clone(),
                        message: format!(
                            "Requested {} cores but only {} cores available on this system",
                            count, num_cores
                        ),
                        available: available_core_ids.iter().map(|c| c.id).collect(),
                    })
                } else {
                    Ok(available_core_ids.into_iter().take(*count).collect())
                }
            }
            CoreAllocation::CoreSet { set } => {
                // Validate all ranges first
                for r in set.iter() {
                    if r.start > r.end {
                        return Err(Error::InvalidCoreAllocation {
                            alloc: core_allocation.clone(),
                            message: format!(
                                "Invalid core range: start ({}) is greater than end ({})",
                                r.start, r.end
                            ),
                            available: available_core_ids.iter().map(|c| c.id).collect(),
                        });
                    }
                    if r.start > max_core_id {
                        return Err(Error::InvalidCoreAllocation {
                            alloc: core_allocation.clone(),
                            message: format!(
                                "Core ID {} exceeds available cores (system has cores 0-{})",
                                r.start, max_core_id
                            ),
                            available: available_core_ids.iter().map(|c| c.id).collect(),
                        });
                    }
                    if r.end > max_core_id {
                        return Err(Error::InvalidCoreAllocation {
                            alloc: core_allocation.clone(),
                            message: format!(
                                "Core ID {} exceeds available cores (system has cores 0-{})",
                                r.end, max_core_id
                            ),
                            available: available_core_ids.iter().map(|c| c.id).collect(),
                        });
                    }
                }

                // Check for overlapping ranges
                for (i, r1) in set.iter().enumerate() {
                    for r2 in set.iter().skip(i + 1) {
                        // Two ranges overlap if they share any common cores
                        if r1.start <= r2.end && r2.start <= r1.end {
                            let overlap_start = r1.start.max(r2.start);
                            let overlap_end = r1.end.min(r2.end);
                            return Err(Error::InvalidCoreAllocation {
                                alloc: core_allocation.clone(),
                                message: format!(
                                    "Core ranges overlap: {}-{} and {}-{} share cores {}-{}",
                                    r1.start, r1.end, r2.start, r2.end, overlap_start, overlap_end
                                ),
                                available: available_core_ids.iter().map(|c| c.id).collect(),
                            });
                        }
                    }
                }

                // Filter cores in range
                let selected: Vec<_> = available_core_ids
                    .into_iter()
                    // Naively check if each interval contains the point
                    // This problem is known as the "Interval Stabbing Problem"
                    // and has more efficient but more complex solutions
                    .filter(|c| set.iter().any(|r| r.start <= c.id && c.id <= r.end))
                    .collect();

                if selected.is_empty() {
                    return Err(Error::InvalidCoreAllocation {
                        alloc: core_allocation.clone(),
                        message: "No available cores in the specified ranges".to_owned(),
                        available: core_affinity::get_core_ids()
                            .unwrap_or_default()
                            .iter()
                            .map(|c| c.id)
                            .collect(),
                    });
                }

                Ok(selected)
            }
        }
    }

    /// Runs a single pipeline in the current thread.
    fn run_pipeline_thread(
        pipeline_key: DeployedPipelineKey,
        core_id: CoreId,
        pipeline_config: PipelineConfig,
        pipeline_factory: &'static PipelineFactory<PData>,
        pipeline_context: PipelineContext,
        obs_evt_reporter: ObservedEventReporter,
        metrics_reporter: MetricsReporter,
        pipeline_ctrl_msg_tx: PipelineCtrlMsgSender,
        pipeline_ctrl_msg_rx: PipelineCtrlMsgReceiver,
    ) -> Result<Vec<()>, Error> {
        // Pin thread to specific core. As much as possible, we pin
        // before allocating memory.
        if !core_affinity::set_for_current(core_id) {
            // Continue execution even if pinning fails.
            // This is acceptable because the OS will still schedule the thread, but performance may be less predictable.
            otel_warn!(
                "core_affinity.set_failed",
                message = "Failed to set core affinity for pipeline thread. Performance may be less predictable."
            );
        }

        // The controller creates a pipeline instance into a dedicated thread. The corresponding
        // entity is registered here for proper context tracking and set into thread-local storage
        // in order to be accessible by all components within this thread.
        let pipeline_entity_key = pipeline_context.register_pipeline_entity();
        let _pipeline_entity_guard =
            set_pipeline_entity_key(pipeline_context.metrics_registry(), pipeline_entity_key);

        obs_evt_reporter.report(EngineEvent::admitted(
            pipeline_key.clone(),
            Some("Pipeline admission successful.".to_owned()),
        ));

        // Build the runtime pipeline from the configuration. This collector runs no internal
        // telemetry receiver, so `None` is passed unconditionally.
        let runtime_pipeline = pipeline_factory
            .build(pipeline_context.clone(), pipeline_config.clone(), None)
            .map_err(|e| Error::PipelineRuntimeError {
                source: Box::new(e),
            })?;

        obs_evt_reporter.report(EngineEvent::ready(
            pipeline_key.clone(),
            Some("Pipeline initialization successful.".to_owned()),
        ));

        // Start the pipeline (this will use the current thread's Tokio runtime)
        runtime_pipeline
            .run_forever(
                pipeline_key,
                pipeline_context,
                obs_evt_reporter,
                metrics_reporter,
                pipeline_ctrl_msg_tx,
                pipeline_ctrl_msg_rx,
            )
            .map_err(|e| Error::PipelineRuntimeError {
                source: Box::new(e),
            })
    }
}

fn error_summary_from_gen(error: &Error) -> ErrorSummary {
    match error {
        Error::PipelineRuntimeError { source } => {
            if let Some(engine_error) = source.downcast_ref::<EngineError>() {
                error_summary_from(engine_error)
            } else {
                ErrorSummary::Pipeline {
                    error_kind: "runtime".into(),
                    message: source.to_string(),
                    source: None,
                }
            }
        }
        _ => ErrorSummary::Pipeline {
            error_kind: "runtime".into(),
            message: error.to_string(),
            source: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use otap_df_config::policy::CoreRange;

    fn available_core_ids() -> Vec<CoreId> {
        vec![
            CoreId { id: 0 },
            CoreId { id: 1 },
            CoreId { id: 2 },
            CoreId { id: 3 },
            CoreId { id: 4 },
            CoreId { id: 5 },
            CoreId { id: 6 },
            CoreId { id: 7 },
        ]
    }

    fn to_ids(v: &[CoreId]) -> Vec<usize> {
        v.iter().map(|c| c.id).collect()
    }

    #[test]
    fn select_all_cores_by_default() {
        let core_allocation = CoreAllocation::AllCores;
        let available_core_ids = available_core_ids();
        let expected_core_ids = available_core_ids.clone();
        let result =
            Controller::<()>::select_cores_for_allocation(available_core_ids, &core_allocation)
                .unwrap();
        assert_eq!(to_ids(&result), to_ids(&expected_core_ids));
    }

    #[test]
    fn select_limited_by_num_cores() {
        let core_allocation = CoreAllocation::CoreCount { count: 4 };
        let available_core_ids = available_core_ids();
        let result = Controller::<()>::select_cores_for_allocation(
            available_core_ids.clone(),
            &core_allocation,
        )
        .unwrap();
        assert_eq!(result.len(), 4);
        let expected_ids: Vec<usize> = available_core_ids
            .into_iter()
            .take(4)
            .map(|c| c.id)
            .collect();
        assert_eq!(to_ids(&result), expected_ids);
    }

    #[test]
    fn select_with_valid_single_core_range() {
        let available_core_ids = available_core_ids();
        let first_id = available_core_ids[0].id;
        let core_allocation = CoreAllocation::CoreSet {
            set: vec![CoreRange {
                start: first_id,
                end: first_id,
            }],
        };
        let result =
            Controller::<()>::select_cores_for_allocation(available_core_ids, &core_allocation)
                .unwrap();
        assert_eq!(to_ids(&result), vec![first_id]);
    }

    #[test]
    fn select_with_valid_multi_core_range() {
        let core_allocation = CoreAllocation::CoreSet {
            set: vec![
                CoreRange { start: 2, end: 5 },
                CoreRange { start: 6, end: 6 },
            ],
        };
        let available_core_ids = available_core_ids();
        let result =
            Controller::<()>::select_cores_for_allocation(available_core_ids, &core_allocation)
                .unwrap();
        assert_eq!(to_ids(&result), vec![2, 3, 4, 5, 6]);
    }

    #[test]
    fn select_with_inverted_range_errors() {
        let core_allocation = CoreAllocation::CoreSet {
            set: vec![CoreRange { start: 2, end: 1 }],
        };
        let available_core_ids = available_core_ids();
        let err =
            Controller::<()>::select_cores_for_allocation(available_core_ids, &core_allocation)
                .unwrap_err();
        match err {
            Error::InvalidCoreAllocation { alloc, .. } => {
                assert_eq!(alloc, core_allocation);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn select_with_out_of_bounds_range_errors() {
        let start = 100;
        let end = 110;
        let core_allocation = CoreAllocation::CoreSet {
            set: vec![CoreRange { start, end }],
        };
        let available_core_ids = available_core_ids();
        let err =
            Controller::<()>::select_cores_for_allocation(available_core_ids, &core_allocation)
                .unwrap_err();
        match err {
            Error::InvalidCoreAllocation { alloc, .. } => {
                assert_eq!(alloc, core_allocation);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn select_with_zero_count_uses_all_cores() {
        let core_allocation = CoreAllocation::CoreCount { count: 0 };
        let available_core_ids = available_core_ids();
        let expected_core_ids = available_core_ids.clone();
        let result =
            Controller::<()>::select_cores_for_allocation(available_core_ids, &core_allocation)
                .unwrap();
        assert_eq!(to_ids(&result), to_ids(&expected_core_ids));
    }

    #[test]
    fn select_with_overlapping_ranges_errors() {
        let core_allocation = CoreAllocation::CoreSet {
            set: vec![
                CoreRange { start: 2, end: 5 },
                CoreRange { start: 4, end: 7 },
            ],
        };
        let available_core_ids = available_core_ids();
        let err =
            Controller::<()>::select_cores_for_allocation(available_core_ids, &core_allocation)
                .unwrap_err();
        match err {
            Error::InvalidCoreAllocation { alloc, message, .. } => {
                assert_eq!(alloc, core_allocation);
                assert!(
                    message.contains("overlap"),
                    "Expected overlap error message, got: {}",
                    message
                );
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn select_with_fully_overlapping_ranges_errors() {
        let core_allocation = CoreAllocation::CoreSet {
            set: vec![
                CoreRange { start: 2, end: 6 },
                CoreRange { start: 3, end: 5 },
            ],
        };
        let available_core_ids = available_core_ids();
        let err =
            Controller::<()>::select_cores_for_allocation(available_core_ids, &core_allocation)
                .unwrap_err();
        match err {
            Error::InvalidCoreAllocation { alloc, message, .. } => {
                assert_eq!(alloc, core_allocation);
                assert!(
                    message.contains("overlap"),
                    "Expected overlap error message, got: {}",
                    message
                );
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn select_with_identical_ranges_errors() {
        let core_allocation = CoreAllocation::CoreSet {
            set: vec![
                CoreRange { start: 3, end: 5 },
                CoreRange { start: 3, end: 5 },
            ],
        };
        let available_core_ids = available_core_ids();
        let err =
            Controller::<()>::select_cores_for_allocation(available_core_ids, &core_allocation)
                .unwrap_err();
        match err {
            Error::InvalidCoreAllocation { alloc, message, .. } => {
                assert_eq!(alloc, core_allocation);
                assert!(
                    message.contains("overlap"),
                    "Expected overlap error message, got: {}",
                    message
                );
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn select_with_adjacent_ranges_succeeds() {
        // Adjacent but non-overlapping ranges should work
        let core_allocation = CoreAllocation::CoreSet {
            set: vec![
                CoreRange { start: 2, end: 3 },
                CoreRange { start: 4, end: 5 },
            ],
        };
        let available_core_ids = available_core_ids();
        let result =
            Controller::<()>::select_cores_for_allocation(available_core_ids, &core_allocation)
                .unwrap();
        assert_eq!(to_ids(&result), vec![2, 3, 4, 5]);
    }

    #[test]
    fn select_with_multiple_overlapping_ranges_errors() {
        let core_allocation = CoreAllocation::CoreSet {
            set: vec![
                CoreRange { start: 1, end: 3 },
                CoreRange { start: 2, end: 4 },
                CoreRange { start: 5, end: 6 },
            ],
        };
        let available_core_ids = available_core_ids();
        let err =
            Controller::<()>::select_cores_for_allocation(available_core_ids, &core_allocation)
                .unwrap_err();
        match err {
            Error::InvalidCoreAllocation { alloc, message, .. } => {
                assert_eq!(alloc, core_allocation);
                assert!(
                    message.contains("overlap"),
                    "Expected overlap error message, got: {}",
                    message
                );
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
