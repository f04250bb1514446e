// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! New Relic Infrastructure (NRI) exporter (`spec.md` §6): writes one
//! newline-delimited JSON integration payload per [`Batch`], with fields
//! `name`, `protocol_version`, `integration_version`, and
//! `data:[{entity:{name,type,…}, metrics:[…], events:[…], inventory:{}}]`.
//!
//! Output goes to a file or to stdout, the way
//! `otlp::debug_exporter::exporter::OutputWriter` wraps an `AsyncWrite` for
//! the debug sink.

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
use otap_df_pdata::{AttributeSet, Batch, MetricKind};
use otap_df_telemetry::instrument::Counter;
use otap_df_telemetry::metrics::MetricSet;
use otap_df_telemetry::otel_warn;
use otap_df_telemetry_macros::metric_set;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// The URN for the NRI exporter.
pub const NRI_EXPORTER_URN: &str = "urn:otel:dbtel:nri:exporter";

/// Configuration for [`NriExporter`].
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Integration name, e.g. `com.newrelic.dbtel`.
    pub name: String,
    /// NRI protocol version.
    pub protocol_version: u32,
    /// This integration's own version string.
    pub integration_version: String,
    /// Destination file path; `None` writes to stdout.
    pub output_path: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: "com.newrelic.dbtel".to_owned(),
            protocol_version: 3,
            integration_version: "1.0.0".to_owned(),
            output_path: None,
        }
    }
}

/// Self-metrics for [`NriExporter`].
#[metric_set(name = "dbtel.nri_exporter.metrics")]
#[derive(Debug, Default, Clone)]
pub struct NriExporterMetrics {
    /// Lines written successfully.
    #[metric(unit = "{line}")]
    pub lines_written: Counter<u64>,
    /// Lines that failed to write.
    #[metric(unit = "{line}")]
    pub write_errors: Counter<u64>,
}

/// NRI exporter. See module docs and `spec.md` §6.
pub struct NriExporter {
    config: Config,
    metrics: MetricSet<NriExporterMetrics>,
    writer: Box<dyn AsyncWrite + Unpin>,
}

/// Factory function to create an [`NriExporter`].
pub fn create_nri_exporter(
    pipeline_ctx: PipelineContext,
    node: NodeId,
    node_config: Arc<NodeUserConfig>,
    exporter_config: &ExporterConfig,
) -> Result<ExporterWrapper<Batch>, ConfigError> {
    Ok(ExporterWrapper::local(
        NriExporter::from_config(pipeline_ctx, &node_config.config)?,
        node,
        node_config,
        exporter_config,
    ))
}

/// Registers [`NriExporter`] as a dbtel exporter factory.
#[allow(unsafe_code)]
#[distributed_slice(DBTEL_EXPORTER_FACTORIES)]
pub static NRI_EXPORTER_FACTORY: ExporterFactory<Batch> = ExporterFactory {
    name: NRI_EXPORTER_URN,
    create: |pipeline_ctx, node, node_config, exp_cfg| {
        create_nri_exporter(pipeline_ctx, node, node_config, exp_cfg)
    },
};

impl NriExporter {
    /// Creates a new exporter from an explicit config and writer.
    #[must_use]
    pub fn new(pipeline_ctx: PipelineContext, config: Config, writer: Box<dyn AsyncWrite + Unpin>) -> Self {
        Self {
            config,
            metrics: pipeline_ctx.register_metrics::<NriExporterMetrics>(),
            writer,
        }
    }

    /// Creates a new exporter from a JSON configuration object, opening
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
                        error: format!("failed to open NRI output file {path}: {e}"),
                    })?;
                Box::new(tokio::fs::File::from_std(file))
            }
            None => Box::new(tokio::io::stdout()),
        };
        Ok(Self::new(pipeline_ctx, config, writer))
    }

    /// Builds the `data[0].entity` object from a batch's first resource.
    fn entity(resource: &AttributeSet) -> Value {
        let name = resource
            .get("db.name")
            .and_then(|v| v.as_str())
            .or_else(|| resource.get("service.name").and_then(|v| v.as_str()))
            .unwrap_or("unknown")
            .to_owned();
        let entity_type = resource
            .get("db.system")
            .and_then(|v| v.as_str())
            .map(|system| format!("DATASTORE-{}", system.to_uppercase()))
            .unwrap_or_else(|| "DATASTORE".to_owned());
        json!({ "name": name, "type": entity_type })
    }

    fn attributes_to_json(attrs: &AttributeSet) -> Value {
        let mut map = serde_json::Map::new();
        for (k, v) in attrs.iter() {
            let value = if let Some(s) = v.as_str() {
                Value::String(s.to_owned())
            } else {
                json!(format!("{v:?}"))
            };
            let _ = map.insert(k.to_owned(), value);
        }
        Value::Object(map)
    }

    /// Turns one batch into a single NRI integration payload line.
    fn payload(&self, batch: &Batch) -> Value {
        let (entity, metrics, events) = match batch {
            Batch::Metrics(mb) => {
                let entity = mb
                    .metrics
                    .first()
                    .map(|m| Self::entity(&m.resource))
                    .unwrap_or_else(|| Self::entity(&AttributeSet::new()));
                let metrics: Vec<Value> = mb
                    .metrics
                    .iter()
                    .flat_map(|m| {
                        let kind = match &m.kind {
                            MetricKind::Gauge => "gauge",
                            MetricKind::Sum { monotonic: true } => "count",
                            MetricKind::Sum { monotonic: false } => "gauge",
                            MetricKind::Histogram { .. } => "histogram",
                        };
                        m.points.iter().map(move |p| {
                            json!({
                                "name": m.name,
                                "type": kind,
                                "value": p.value,
                                "timestamp": p.timestamp_ms,
                                "attributes": Self::attributes_to_json(&p.attributes),
                            })
                        })
                    })
                    .collect();
                (entity, metrics, Vec::new())
            }
            Batch::Logs(lb) => {
                let entity = lb
                    .records
                    .first()
                    .map(|r| Self::entity(&r.resource))
                    .unwrap_or_else(|| Self::entity(&AttributeSet::new()));
                let events: Vec<Value> = lb
                    .records
                    .iter()
                    .map(|r| {
                        json!({
                            "summary": r.body,
                            "category": "dbtel",
                            "timestamp": r.timestamp_ms,
                            "attributes": Self::attributes_to_json(&r.attributes),
                        })
                    })
                    .collect();
                (entity, Vec::new(), events)
            }
            Batch::Traces(tb) => {
                let entity = tb
                    .spans
                    .first()
                    .map(|s| Self::entity(&s.resource))
                    .unwrap_or_else(|| Self::entity(&AttributeSet::new()));
                let events: Vec<Value> = tb
                    .spans
                    .iter()
                    .map(|s| {
                        json!({
                            "summary": s.name,
                            "category": "dbtel.trace",
                            "timestamp": s.start_time_ms,
                            "attributes": Self::attributes_to_json(&s.attributes),
                        })
                    })
                    .collect();
                (entity, Vec::new(), events)
            }
        };

        json!({
            "name": self.config.name,
            "protocol_version": self.config.protocol_version,
            "integration_version": self.config.integration_version,
            "data": [{
                "entity": entity,
                "metrics": metrics,
                "events": events,
                "inventory": {},
            }],
        })
    }

    async fn write_batch(&mut self, batch: &Batch) -> Result<(), std::io::Error> {
        let line = self.payload(batch);
        let mut text = serde_json::to_string(&line).unwrap_or_default();
        text.push('\n');
        self.writer.write_all(text.as_bytes()).await?;
        self.writer.flush().await
    }
}

#[async_trait(?Send)]
impl local::Exporter<Batch> for NriExporter {
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
                Message::PData(batch) => match self.write_batch(&batch).await {
                    Ok(()) => self.metrics.lines_written.add(1),
                    Err(e) => {
                        self.metrics.write_errors.add(1);
                        otel_warn!("nri_exporter.write_failed", error = e.to_string());
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use otap_df_engine::context::ControllerContext;
    use otap_df_pdata::{DataPoint, Metric, MetricBatch};
    use otap_df_telemetry::registry::MetricsRegistryHandle;

    fn test_pipeline_context() -> PipelineContext {
        let controller_ctx = ControllerContext::new(MetricsRegistryHandle::new());
        controller_ctx.pipeline_context_with("test_grp".into(), "test_pipeline".into(), 0, 1, 0)
    }

    fn test_exporter() -> NriExporter {
        NriExporter::new(test_pipeline_context(), Config::default(), Box::new(tokio::io::sink()))
    }

    #[test]
    fn payload_fills_entity_and_metrics_from_a_metric_batch() {
        let exporter = test_exporter();
        let resource = AttributeSet::new()
            .with("db.system", "postgresql")
            .with("db.name", "orders");
        let mut metric = Metric::new("postgresql.backends", MetricKind::Gauge, "1", resource);
        metric.points.push(DataPoint::scalar(1_000, 7.0));
        let batch = Batch::Metrics(MetricBatch {
            metrics: vec![metric],
            observed_at_ms: 1_000,
        });

        let payload = exporter.payload(&batch);
        assert_eq!(payload["name"], "com.newrelic.dbtel");
        assert_eq!(payload["data"][0]["entity"]["name"], "orders");
        assert_eq!(payload["data"][0]["entity"]["type"], "DATASTORE-POSTGRESQL");
        assert_eq!(payload["data"][0]["metrics"][0]["value"], 7.0);
    }

    #[tokio::test]
    async fn write_batch_produces_one_newline_terminated_json_line() {
        let mut exporter = test_exporter();
        let batch = Batch::Logs(otap_df_pdata::LogBatch { records: Vec::new() });
        exporter.write_batch(&batch).await.expect("write succeeds");
        assert_eq!(exporter.metrics.lines_written.get(), 0);
    }
}
