// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Debug sink (`spec.md` §6): writes a short, human-readable summary of
//! every batch to stdout or a file, for local inspection without a real
//! backend. Grounded on the OTLP debug exporter's `OutputWriter`
//! (`crates/otlp/src/debug_exporter/exporter.rs`).

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
use otap_df_telemetry_macros::metric_set;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// The URN for the debug sink.
pub const DEBUG_SINK_URN: &str = "urn:otel:dbtel:debug:exporter";

/// How much detail to print per batch.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Verbosity {
    /// One line per batch: signal kind and record count.
    Summary,
    /// One line per record within the batch.
    Detailed,
}

/// Configuration for [`DebugSink`].
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Level of detail to print.
    pub verbosity: Verbosity,
    /// Destination file path; `None` writes to stdout.
    pub output_path: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            verbosity: Verbosity::Summary,
            output_path: None,
        }
    }
}

/// Self-metrics for [`DebugSink`].
#[metric_set(name = "dbtel.debug_sink.metrics")]
#[derive(Debug, Default, Clone)]
pub struct DebugSinkMetrics {
    /// Batches printed.
    #[metric(unit = "{batch}")]
    pub batches_printed: Counter<u64>,
}

/// Debug sink. See module docs and `spec.md` §6.
pub struct DebugSink {
    config: Config,
    metrics: MetricSet<DebugSinkMetrics>,
    writer: Box<dyn AsyncWrite + Unpin>,
}

/// Factory function to create a [`DebugSink`].
pub fn create_debug_sink(
    pipeline_ctx: PipelineContext,
    node: NodeId,
    node_config: Arc<NodeUserConfig>,
    exporter_config: &ExporterConfig,
) -> Result<ExporterWrapper<Batch>, ConfigError> {
    Ok(ExporterWrapper::local(
        DebugSink::from_config(pipeline_ctx, &node_config.config)?,
        node,
        node_config,
        exporter_config,
    ))
}

/// Registers [`DebugSink`] as a dbtel exporter factory.
#[allow(unsafe_code)]
#[distributed_slice(DBTEL_EXPORTER_FACTORIES)]
pub static DEBUG_SINK_FACTORY: ExporterFactory<Batch> = ExporterFactory {
    name: DEBUG_SINK_URN,
    create: |pipeline_ctx, node, node_config, exp_cfg| create_debug_sink(pipeline_ctx, node, node_config, exp_cfg),
};

impl DebugSink {
    /// Creates a new sink from an explicit config and writer.
    #[must_use]
    pub fn new(pipeline_ctx: PipelineContext, config: Config, writer: Box<dyn AsyncWrite + Unpin>) -> Self {
        Self {
            config,
            metrics: pipeline_ctx.register_metrics::<DebugSinkMetrics>(),
            writer,
        }
    }

    /// Creates a new sink from a JSON configuration object, opening
    /// `output_path` (or stdout) synchronously.
    pub fn from_config(pipeline_ctx: PipelineContext, config: &serde_json::Value) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_value(config.clone())
            .map_err(|e| ConfigError::InvalidUserConfig { error: e.to_string() })?;
        let writer: Box<dyn AsyncWrite + Unpin> = match &config.output_path {
            Some(path) => {
                let file = std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(|e| ConfigError::InvalidUserConfig {
                        error: format!("failed to open debug sink output file {path}: {e}"),
                    })?;
                Box::new(tokio::fs::File::from_std(file))
            }
            None => Box::new(tokio::io::stdout()),
        };
        Ok(Self::new(pipeline_ctx, config, writer))
    }

    /// Renders `batch` as text, one line per record in `Detailed` mode.
    fn render(&self, batch: &Batch) -> String {
        let mut out = String::new();
        match (self.config.verbosity, batch) {
            (Verbosity::Summary, _) => {
                let _ = writeln!(out, "[{}] {} record(s)", batch.signal_name(), batch.len());
            }
            (Verbosity::Detailed, Batch::Metrics(mb)) => {
                for m in &mb.metrics {
                    for p in &m.points {
                        let _ = writeln!(out, "[metrics] {} = {} @ {}", m.name, p.value, p.timestamp_ms);
                    }
                }
            }
            (Verbosity::Detailed, Batch::Logs(lb)) => {
                for r in &lb.records {
                    let _ = writeln!(out, "[logs] {:?} {}", r.severity, r.body);
                }
            }
            (Verbosity::Detailed, Batch::Traces(tb)) => {
                for s in &tb.spans {
                    let _ = writeln!(out, "[traces] {} ({}ms)", s.name, s.end_time_ms - s.start_time_ms);
                }
            }
        }
        out
    }

    async fn print(&mut self, batch: &Batch) -> Result<(), std::io::Error> {
        let text = self.render(batch);
        self.writer.write_all(text.as_bytes()).await?;
        self.writer.flush().await
    }
}

#[async_trait(?Send)]
impl local::Exporter<Batch> for DebugSink {
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
                Message::PData(batch) => {
                    let _ = self.print(&batch).await;
                    self.metrics.batches_printed.add(1);
                }
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

    fn test_sink(config: Config) -> DebugSink {
        DebugSink::new(test_pipeline_context(), config, Box::new(tokio::io::sink()))
    }

    fn one_record_batch() -> Batch {
        Batch::Logs(LogBatch {
            records: vec![LogRecord::new(0, Severity::Warn, "SELECT 1", AttributeSet::new())],
        })
    }

    #[test]
    fn summary_mode_prints_one_line_with_the_record_count() {
        let sink = test_sink(Config::default());
        let rendered = sink.render(&one_record_batch());
        assert_eq!(rendered.trim(), "[logs] 1 record(s)");
    }

    #[test]
    fn detailed_mode_prints_the_record_body() {
        let sink = test_sink(Config {
            verbosity: Verbosity::Detailed,
            ..Config::default()
        });
        let rendered = sink.render(&one_record_batch());
        assert!(rendered.contains("SELECT 1"));
    }

    #[tokio::test]
    async fn print_increments_no_metric_itself_but_writes_without_error() {
        let mut sink = test_sink(Config::default());
        sink.print(&one_record_batch()).await.expect("print succeeds");
    }
}
