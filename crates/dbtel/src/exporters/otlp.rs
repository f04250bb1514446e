// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! OTLP exporter (`spec.md` §6): serializes a [`Batch`] to the standard
//! OTLP/gRPC or OTLP/HTTP wire form and hands it to a transport.
//!
//! The gRPC/HTTP transports themselves are out of scope (`spec.md` §
//! OVERVIEW Out-of-scope: "assumed to exist as libraries exposing
//! `Export(batch)`"), so this node depends on the narrow [`transport::OtlpTransport`]
//! seam instead of embedding `tonic`/`reqwest` directly, the way the
//! receivers in `crate::db` depend on [`crate::db::DbConnection`] rather
//! than a concrete driver.

use crate::processors::error_monitor::{self, ErrorMonitor, ReportedError};
use crate::DBTEL_EXPORTER_FACTORIES;
use async_trait::async_trait;
use linkme::distributed_slice;
use otap_df_config::error::Error as ConfigError;
use otap_df_config::node::NodeUserConfig;
use otap_df_engine::config::ExporterConfig;
use otap_df_engine::context::PipelineContext;
use otap_df_engine::control::NodeControlMsg;
use otap_df_engine::error::Error;
use otap_df_engine::exporter::ExporterWrapper;
use otap_df_engine::local::exporter as local;
use otap_df_engine::message::{Message, MessageChannel};
use otap_df_engine::node::NodeId;
use otap_df_engine::terminal_state::TerminalState;
use otap_df_engine::ExporterFactory;
use otap_df_pdata::Batch;
use otap_df_telemetry::instrument::Counter;
use otap_df_telemetry::metrics::MetricSet;
use otap_df_telemetry::otel_warn;
use otap_df_telemetry_macros::metric_set;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// The URN for the OTLP exporter.
pub const OTLP_EXPORTER_URN: &str = "urn:otel:dbtel:otlp:exporter";

/// Wire protocol to encode with.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    /// OTLP/gRPC.
    Grpc,
    /// OTLP/HTTP (protobuf body).
    Http,
}

/// Configuration for [`OtlpExporter`].
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Target collector endpoint, e.g. `http://localhost:4317`.
    pub endpoint: String,
    /// Wire protocol.
    pub protocol: Protocol,
    /// Integration-error monitor side-car configuration (`spec.md` §4.8).
    pub error_monitor: error_monitor::Config,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:4317".to_owned(),
            protocol: Protocol::Grpc,
            error_monitor: error_monitor::Config::default(),
        }
    }
}

/// Self-metrics for [`OtlpExporter`].
#[metric_set(name = "dbtel.otlp_exporter.metrics")]
#[derive(Debug, Default, Clone)]
pub struct OtlpExporterMetrics {
    /// Batches exported successfully.
    #[metric(unit = "{batch}")]
    pub batches_ok: Counter<u64>,
    /// Batches that failed to export.
    #[metric(unit = "{batch}")]
    pub batches_failed: Counter<u64>,
    /// Records (metric points, log records, or spans) exported.
    #[metric(unit = "{record}")]
    pub records_exported: Counter<u64>,
}

/// OTLP exporter. See module docs and `spec.md` §6.
pub struct OtlpExporter {
    config: Config,
    metrics: MetricSet<OtlpExporterMetrics>,
    transport: Box<dyn transport::OtlpTransport>,
    error_monitor: ErrorMonitor,
}

/// Factory function to create an [`OtlpExporter`].
pub fn create_otlp_exporter(
    pipeline_ctx: PipelineContext,
    node: NodeId,
    node_config: Arc<NodeUserConfig>,
    exporter_config: &ExporterConfig,
) -> Result<ExporterWrapper<Batch>, ConfigError> {
    Ok(ExporterWrapper::local(
        OtlpExporter::from_config(pipeline_ctx, &node_config.config)?,
        node,
        node_config,
        exporter_config,
    ))
}

/// Registers [`OtlpExporter`] as a dbtel exporter factory.
#[allow(unsafe_code)]
#[distributed_slice(DBTEL_EXPORTER_FACTORIES)]
pub static OTLP_EXPORTER_FACTORY: ExporterFactory<Batch> = ExporterFactory {
    name: OTLP_EXPORTER_URN,
    create: |pipeline_ctx, node, node_config, exp_cfg| {
        create_otlp_exporter(pipeline_ctx, node, node_config, exp_cfg)
    },
};

impl OtlpExporter {
    /// Creates a new exporter from an explicit config and transport.
    #[must_use]
    pub fn new(pipeline_ctx: PipelineContext, config: Config, transport: Box<dyn transport::OtlpTransport>) -> Self {
        let error_monitor = ErrorMonitor::new(pipeline_ctx.clone(), config.error_monitor.clone());
        Self {
            config,
            metrics: pipeline_ctx.register_metrics::<OtlpExporterMetrics>(),
            transport,
            error_monitor,
        }
    }

    /// Creates a new exporter from a JSON configuration object, with a
    /// no-op transport until the external transport-providing seam is
    /// wired in (`spec.md` OVERVIEW Out-of-scope).
    pub fn from_config(pipeline_ctx: PipelineContext, config: &serde_json::Value) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_value(config.clone())
            .map_err(|e| ConfigError::InvalidUserConfig { error: e.to_string() })?;
        Ok(Self::new(pipeline_ctx, config, Box::new(transport::fake::FakeTransport::new())))
    }

    async fn export(&mut self, mut batch: Batch) -> Result<(), transport::TransportError> {
        if self.error_monitor.is_exporter_disabled() {
            return Err(transport::TransportError::Failed("exporter disabled by error monitor".to_owned()));
        }
        if let Some(max_items) = self.error_monitor.batch_size_override() {
            truncate_batch(&mut batch, max_items);
        }
        let record_count = batch.len();
        let result = self.transport.export(&self.config.endpoint, self.config.protocol, &batch).await;
        match &result {
            Ok(()) => self.error_monitor.report_success(),
            Err(e) => {
                let _ = self.error_monitor.report_error(ReportedError {
                    message: e.to_string(),
                    metric_name: None,
                    batch_size: record_count,
                });
            }
        }
        result?;
        self.metrics.records_exported.add(record_count as u64);
        Ok(())
    }
}

#[async_trait(?Send)]
impl local::Exporter<Batch> for OtlpExporter {
    async fn start(
        mut self: Box<Self>,
        mut msg_chan: MessageChannel<Batch>,
        _effect_handler: local::EffectHandler<Batch>,
    ) -> Result<TerminalState, Error> {
        loop {
            match msg_chan.recv().await? {
                Message::Control(NodeControlMsg::CollectTelemetry { mut metrics_reporter }) => {
                    let _ = metrics_reporter.report(&mut self.metrics);
                }
                Message::Control(NodeControlMsg::Shutdown { .. }) => {
                    return Ok(TerminalState::new([self.metrics.snapshot()]));
                }
                Message::Control(_) => {}
                Message::PData(batch) => match self.export(batch).await {
                    Ok(()) => self.metrics.batches_ok.add(1),
                    Err(e) => {
                        // A single failed export does not bring down the exporter task;
                        // the integration-error monitor (`spec.md` §4.8) reacts to the
                        // resulting failure rate instead.
                        self.metrics.batches_failed.add(1);
                        otel_warn!("otlp_exporter.export_failed", error = e.to_string());
                    }
                },
            }
        }
    }
}

/// Caps each signal's record count at `max_items`, applying the integration
/// error monitor's `reduce_batch_size` action (`spec.md` §4.8).
fn truncate_batch(batch: &mut Batch, max_items: usize) {
    match batch {
        Batch::Metrics(mb) => mb.metrics.truncate(max_items),
        Batch::Logs(lb) => lb.records.truncate(max_items),
        Batch::Traces(tb) => tb.spans.truncate(max_items),
    }
}

/// The transport seam: encoding and sending an OTLP batch over the wire is
/// an external concern (`spec.md` OVERVIEW Out-of-scope).
pub mod transport {
    use super::{Batch, Protocol};
    use async_trait::async_trait;
    use thiserror::Error;

    /// Errors a transport implementation may report.
    #[derive(Debug, Error, Clone)]
    pub enum TransportError {
        /// The export call did not complete within its deadline.
        #[error("export timed out")]
        Timeout,
        /// The remote endpoint rejected or failed the export.
        #[error("transport error: {0}")]
        Failed(String),
    }

    /// Sends an encoded OTLP batch to a collector endpoint. A real
    /// deployment wires this to `tonic` (gRPC) or an HTTP client; tests use
    /// an in-memory fake.
    #[async_trait(?Send)]
    pub trait OtlpTransport {
        /// Encodes and sends `batch` to `endpoint` over `protocol`.
        async fn export(&self, endpoint: &str, protocol: Protocol, batch: &Batch) -> Result<(), TransportError>;
    }

    /// In-memory, scriptable `OtlpTransport`. Used by exporter tests, and
    /// also as the exporter's placeholder transport until an external
    /// transport-providing extension seam is wired in.
    pub mod fake {
        use super::*;
        use std::cell::RefCell;

        /// A canned `OtlpTransport` that records every call it receives.
        #[derive(Default)]
        pub struct FakeTransport {
            calls: RefCell<Vec<(String, Protocol)>>,
            fail_next: RefCell<bool>,
        }

        impl FakeTransport {
            /// Creates a transport with no canned failures.
            #[must_use]
            pub fn new() -> Self {
                Self::default()
            }

            /// Makes the next `export` call fail.
            pub fn fail_next_call(&self) {
                *self.fail_next.borrow_mut() = true;
            }

            /// Number of `export` calls observed so far.
            #[must_use]
            pub fn call_count(&self) -> usize {
                self.calls.borrow().len()
            }
        }

        #[async_trait(?Send)]
        impl OtlpTransport for FakeTransport {
            async fn export(&self, endpoint: &str, protocol: Protocol, _batch: &Batch) -> Result<(), TransportError> {
                if self.fail_next.replace(false) {
                    return Err(TransportError::Failed("scripted failure".to_owned()));
                }
                self.calls.borrow_mut().push((endpoint.to_owned(), protocol));
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use otap_df_engine::context::ControllerContext;
    use otap_df_pdata::{AttributeSet, LogBatch, LogRecord, Severity};
    use otap_df_telemetry::registry::MetricsRegistryHandle;

    fn test_pipeline_context() -> PipelineContext {
        let controller_ctx = ControllerContext::new(MetricsRegistryHandle::new());
        controller_ctx.pipeline_context_with("test_grp".into(), "test_pipeline".into(), 0, 1, 0)
    }

    fn one_record_batch() -> Batch {
        Batch::Logs(LogBatch {
            records: vec![LogRecord::new(0, Severity::Info, "SELECT 1", AttributeSet::new())],
        })
    }

    #[tokio::test]
    async fn export_forwards_batch_to_transport_and_counts_records() {
        let transport = transport::fake::FakeTransport::new();
        let mut exporter = OtlpExporter::new(test_pipeline_context(), Config::default(), Box::new(transport));
        exporter.export(one_record_batch()).await.expect("export succeeds");
        assert_eq!(exporter.metrics.records_exported.get(), 1);
    }

    #[tokio::test]
    async fn transport_failure_is_surfaced_to_the_caller() {
        let transport = transport::fake::FakeTransport::new();
        transport.fail_next_call();
        let mut exporter = OtlpExporter::new(test_pipeline_context(), Config::default(), Box::new(transport));
        let err = exporter.export(one_record_batch()).await;
        assert!(err.is_err());
    }
}
