// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Lifecycle events and captured log records observed by the controller.

use otap_df_config::DeployedPipelineKey;

/// A structured summary of an error, suitable for attaching to an
/// [`EngineEvent`] without requiring the full error type to be `Clone`.
#[derive(Debug, Clone)]
pub enum ErrorSummary {
    /// An error that occurred while building or running a pipeline.
    Pipeline {
        /// Coarse classification of the error (e.g. `"runtime"`, `"panic"`, `"config"`).
        error_kind: String,
        /// Human-readable message.
        message: String,
        /// Optional nested source error, rendered as a string.
        source: Option<String>,
    },
}

/// A lifecycle event for a deployed pipeline instance, reported to the
/// observed-state store.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// The pipeline passed admission checks and its thread was spawned.
    Admitted {
        /// The pipeline this event concerns.
        pipeline: DeployedPipelineKey,
        /// Optional human-readable detail.
        message: Option<String>,
    },
    /// The pipeline finished building its node graph and started running.
    Ready {
        /// The pipeline this event concerns.
        pipeline: DeployedPipelineKey,
        /// Optional human-readable detail.
        message: Option<String>,
    },
    /// The pipeline ran to completion without error.
    Drained {
        /// The pipeline this event concerns.
        pipeline: DeployedPipelineKey,
        /// Optional human-readable detail.
        message: Option<String>,
    },
    /// The pipeline terminated because of a runtime error or panic.
    PipelineRuntimeError {
        /// The pipeline this event concerns.
        pipeline: DeployedPipelineKey,
        /// Human-readable message.
        message: String,
        /// Structured error detail.
        error: ErrorSummary,
    },
}

impl EngineEvent {
    /// Builds an [`EngineEvent::Admitted`] event.
    #[must_use]
    pub const fn admitted(pipeline: DeployedPipelineKey, message: Option<String>) -> Self {
        Self::Admitted { pipeline, message }
    }

    /// Builds an [`EngineEvent::Ready`] event.
    #[must_use]
    pub const fn ready(pipeline: DeployedPipelineKey, message: Option<String>) -> Self {
        Self::Ready { pipeline, message }
    }

    /// Builds an [`EngineEvent::Drained`] event.
    #[must_use]
    pub const fn drained(pipeline: DeployedPipelineKey, message: Option<String>) -> Self {
        Self::Drained { pipeline, message }
    }

    /// Builds an [`EngineEvent::PipelineRuntimeError`] event.
    #[must_use]
    pub fn pipeline_runtime_error(
        pipeline: DeployedPipelineKey,
        message: impl Into<String>,
        error: ErrorSummary,
    ) -> Self {
        Self::PipelineRuntimeError {
            pipeline,
            message: message.into(),
            error,
        }
    }
}

/// Cheap-to-clone handle used to report [`EngineEvent`]s to the observed
/// state store. Reporting never blocks: if the store's channel is full or
/// gone, the event is silently dropped.
#[derive(Clone, Debug)]
pub struct ObservedEventReporter {
    sender: Option<flume::Sender<EngineEvent>>,
}

impl ObservedEventReporter {
    /// Creates a reporter that forwards events over `sender`.
    #[must_use]
    pub const fn new(sender: flume::Sender<EngineEvent>) -> Self {
        Self {
            sender: Some(sender),
        }
    }

    /// Creates a reporter that silently discards every event. Used in tests
    /// and standalone node harnesses that don't run an observed-state store.
    #[must_use]
    pub const fn noop() -> Self {
        Self { sender: None }
    }

    /// Reports an event, best-effort.
    pub fn report(&self, event: EngineEvent) {
        if let Some(sender) = &self.sender {
            let _ = sender.try_send(event);
        }
    }
}

/// A captured structured log record, as emitted by the `otel_*!` macros and
/// forwarded to the internal telemetry receiver when configured.
#[derive(Debug, Clone)]
pub struct ObservedEvent {
    /// Event name (e.g. `"controller.start"`).
    pub name: &'static str,
    /// Severity level (`"DEBUG"`, `"INFO"`, `"WARN"`, `"ERROR"`).
    pub level: &'static str,
    /// Rendered message, if any.
    pub message: Option<String>,
    /// Additional structured fields, rendered as strings.
    pub fields: Vec<(&'static str, String)>,
}
