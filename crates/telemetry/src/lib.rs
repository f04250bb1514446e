// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Explicit telemetry handle for the pipeline engine.
//!
//! Every node and controller thread in the engine is handed telemetry
//! capability explicitly, rather than reaching for ambient globals: a
//! [`registry::TelemetryRegistryHandle`] to register entities and metric
//! sets, and a [`reporter::MetricsReporter`] to publish snapshots. This
//! crate owns that registry plus the `otel_*!` structured-logging macros
//! used throughout the engine.

pub mod attributes;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod event;
pub mod instrument;
pub mod metrics;
pub mod registry;
pub mod reporter;

pub use attributes::{AttributeSetHandler, AttributeValue};
pub use config::Config;
pub use descriptor::{
    AttributeField, AttributeValueType, AttributesDescriptor, Instrument, MetricsDescriptor,
    MetricsField,
};
pub use error::Error;
pub use event::{EngineEvent, ErrorSummary, ObservedEvent, ObservedEventReporter};
pub use instrument::{Counter, Gauge, ObserveCounter, ObserveUpDownCounter};
pub use metrics::{MetricSet, MetricSetHandler, MetricSetSnapshot};
pub use registry::{EntityKey, MetricSetKey, MetricsRegistryHandle, TelemetryRegistryHandle};
pub use reporter::MetricsReporter;

/// Plugin URN of the internal telemetry receiver: a receiver that, when
/// present in a pipeline's node graph, consumes the controller's own
/// structured logs and metric snapshots as pipeline data. Kept as a routing
/// constant even though no receiver currently registers under it.
pub const INTERNAL_TELEMETRY_RECEIVER_URN: &str = "urn:otel:internal:otlp:receiver";

/// Per-pipeline settings handed to the internal telemetry receiver factory,
/// if one is present in the node graph. Opaque to everything else.
#[derive(Debug, Clone, Default)]
pub struct InternalTelemetrySettings {
    /// Capacity of the channel the receiver drains observed events from.
    pub channel_capacity: usize,
}

/// Owns the metrics registry, the reporting channel's receiving half, and
/// the background task that drains reported snapshots into the registry.
///
/// Constructed once per controller (or once per test harness); cloning the
/// registry or reporter handles is how every other part of the engine gets
/// access to telemetry.
#[derive(Debug)]
pub struct MetricsSystem {
    registry: TelemetryRegistryHandle,
    reporter: MetricsReporter,
    receiver: flume::Receiver<MetricSetSnapshot>,
}

impl Default for MetricsSystem {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl MetricsSystem {
    /// Builds a fresh registry and reporting channel sized per `config`.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let (receiver, reporter) = MetricsReporter::create_new_and_receiver(config.channel_capacity);
        Self {
            registry: TelemetryRegistryHandle::new(),
            reporter,
            receiver,
        }
    }

    /// Returns a cloneable handle to the metrics registry.
    #[must_use]
    pub fn registry(&self) -> MetricsRegistryHandle {
        self.registry.clone()
    }

    /// Returns a cloneable reporter that nodes use to publish snapshots.
    #[must_use]
    pub fn reporter(&self) -> MetricsReporter {
        self.reporter.clone()
    }

    /// Consumes this system, returning the future that drains reported
    /// snapshots into the registry until every reporter is dropped.
    ///
    /// Intended to be spawned onto a runtime once, at controller startup.
    pub fn run_collection_loop(
        self,
    ) -> impl std::future::Future<Output = Result<(), Error>> + Send + 'static {
        let registry = self.registry;
        let receiver = self.receiver;
        async move {
            while let Ok(snapshot) = receiver.recv_async().await {
                registry.record_snapshot(snapshot);
            }
            Ok(())
        }
    }
}

/// Shared implementation behind the `otel_debug!`/`otel_info!`/`otel_warn!`/
/// `otel_error!` macros: normalizes both call syntaxes onto a `tracing`
/// event tagged with the event name.
#[doc(hidden)]
#[macro_export]
macro_rules! __otel_event {
    ($level:expr, $name:expr $(,)?) => {
        ::tracing::event!(target: "otel", $level, name = $name)
    };
    ($level:expr, $name:expr, $($rest:tt)*) => {
        ::tracing::event!(target: "otel", $level, name = $name, $($rest)*)
    };
}

/// Emits a structured debug-level event.
///
/// Accepts either `otel_debug!(name: "event.name", key = value, ...)` or the
/// shorthand `otel_debug!("event.name", key = value, ...)`.
#[macro_export]
macro_rules! otel_debug {
    (name: $name:expr $(, $($rest:tt)*)?) => {
        $crate::__otel_event!(::tracing::Level::DEBUG, $name $(, $($rest)*)?)
    };
    ($name:expr $(, $($rest:tt)*)?) => {
        $crate::__otel_event!(::tracing::Level::DEBUG, $name $(, $($rest)*)?)
    };
}

/// Emits a structured info-level event. See [`otel_debug!`] for syntax.
#[macro_export]
macro_rules! otel_info {
    (name: $name:expr $(, $($rest:tt)*)?) => {
        $crate::__otel_event!(::tracing::Level::INFO, $name $(, $($rest)*)?)
    };
    ($name:expr $(, $($rest:tt)*)?) => {
        $crate::__otel_event!(::tracing::Level::INFO, $name $(, $($rest)*)?)
    };
}

/// Emits a structured warn-level event. See [`otel_debug!`] for syntax.
#[macro_export]
macro_rules! otel_warn {
    (name: $name:expr $(, $($rest:tt)*)?) => {
        $crate::__otel_event!(::tracing::Level::WARN, $name $(, $($rest)*)?)
    };
    ($name:expr $(, $($rest:tt)*)?) => {
        $crate::__otel_event!(::tracing::Level::WARN, $name $(, $($rest)*)?)
    };
}

/// Emits a structured error-level event. See [`otel_debug!`] for syntax.
#[macro_export]
macro_rules! otel_error {
    (name: $name:expr $(, $($rest:tt)*)?) => {
        $crate::__otel_event!(::tracing::Level::ERROR, $name $(, $($rest)*)?)
    };
    ($name:expr $(, $($rest:tt)*)?) => {
        $crate::__otel_event!(::tracing::Level::ERROR, $name $(, $($rest)*)?)
    };
}

/// Opens a debug-level tracing span. Accepts the same field syntax as
/// `tracing::debug_span!`.
#[macro_export]
macro_rules! otel_debug_span {
    ($name:expr $(, $($rest:tt)*)?) => {
        ::tracing::span!(target: "otel", ::tracing::Level::DEBUG, $name $(, $($rest)*)?)
    };
}

/// Opens an info-level tracing span. Accepts the same field syntax as
/// `tracing::info_span!`.
#[macro_export]
macro_rules! otel_info_span {
    ($name:expr $(, $($rest:tt)*)?) => {
        ::tracing::span!(target: "otel", ::tracing::Level::INFO, $name $(, $($rest)*)?)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn metrics_system_collects_reported_snapshots() {
        let system = MetricsSystem::default();
        let registry = system.registry();
        let reporter = system.reporter();
        let handle = tokio::spawn(system.run_collection_loop());

        reporter
            .try_report_snapshot(MetricSetSnapshot {
                name: "test.metrics",
                values: vec![("count", 3)],
            })
            .unwrap();

        // Give the collector a turn to drain the channel.
        for _ in 0..100 {
            if registry.iter_metrics().any(|s| s.name == "test.metrics") {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(registry.iter_metrics().any(|s| s.name == "test.metrics"));

        drop(reporter);
        let result = handle.await.unwrap();
        assert!(result.is_ok());
    }

    #[test]
    fn otel_macros_compile_with_both_syntaxes() {
        let endpoint = "127.0.0.1:4317".to_string();
        otel_info!(name: "admin_server_listening", endpoint = endpoint.as_str(), message = "listening");
        otel_debug!("condense_attributes_processor.processing", input_items = 4);
        otel_warn!("pipeline.degraded");
        otel_error!("pipeline.failed", message = "boom");
    }
}
