// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Query/transaction correlation (`spec.md` §4.5): groups the individually
//! observed query-execution log records of a single session/transaction
//! into a window, synthesises a root span covering the transaction once it
//! closes, and emits the window as a trace — without dropping the log
//! records themselves, which are annotated with `correlation.id` and
//! passed through unchanged.

use crate::processors::metrics::QueryCorrelatorMetrics;
use crate::DBTEL_PROCESSOR_FACTORIES;
use async_trait::async_trait;
use linkme::distributed_slice;
use otap_df_config::error::Error as ConfigError;
use otap_df_config::node::NodeUserConfig;
use otap_df_engine::config::ProcessorConfig;
use otap_df_engine::context::PipelineContext;
use otap_df_engine::control::NodeControlMsg;
use otap_df_engine::error::Error;
use otap_df_engine::local::processor as local;
use otap_df_engine::message::Message;
use otap_df_engine::node::NodeId;
use otap_df_engine::processor::ProcessorWrapper;
use otap_df_pdata::{fingerprint_sql, Batch, LogBatch, LogRecord, Severity, Span, SpanStatus, TraceBatch};
use otap_df_telemetry::metrics::MetricSet;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// The URN for the query correlator processor.
pub const QUERY_CORRELATOR_URN: &str = "urn:otel:dbtel:query_correlator:processor";

/// Configuration for [`QueryCorrelator`].
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Attribute key identifying the session a record belongs to. Records
    /// without it cannot be correlated and pass through untouched.
    pub session_attribute: String,
    /// Attribute key identifying the transaction within a session. Its
    /// absence is treated as the transaction id `"none"`, so
    /// non-transactional queries from the same session still share a
    /// window.
    pub transaction_attribute: String,
    /// Attribute key marking a record as a transaction-boundary marker.
    /// Its value must be `begin`, `commit`, or `rollback`.
    pub boundary_attribute: String,
    /// A window with no new records for this long is force-closed.
    pub correlation_window: Duration,
    /// A window with this many spans is force-closed even without a
    /// boundary record.
    pub max_correlation_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            session_attribute: "session.id".to_owned(),
            transaction_attribute: "db.transaction.id".to_owned(),
            boundary_attribute: "db.transaction.boundary".to_owned(),
            correlation_window: Duration::from_secs(300),
            max_correlation_size: 256,
        }
    }
}

/// The three recognised values of `Config::boundary_attribute`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Boundary {
    Begin,
    Commit,
    Rollback,
}

impl Boundary {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "begin" => Some(Self::Begin),
            "commit" => Some(Self::Commit),
            "rollback" => Some(Self::Rollback),
            _ => None,
        }
    }
}

struct Window {
    trace_id: [u8; 16],
    spans: Vec<Span>,
    first_seen_ms: Option<i64>,
    last_seen: Instant,
}

impl Window {
    fn new() -> Self {
        Self {
            trace_id: *Uuid::new_v4().as_bytes(),
            spans: Vec::new(),
            first_seen_ms: None,
            last_seen: Instant::now(),
        }
    }
}

/// Query/transaction correlation processor. See module docs and
/// `spec.md` §4.5.
pub struct QueryCorrelator {
    config: Config,
    metrics: MetricSet<QueryCorrelatorMetrics>,
    windows: HashMap<String, Window>,
}

/// Factory function to create a [`QueryCorrelator`].
pub fn create_query_correlator(
    pipeline_ctx: PipelineContext,
    node: NodeId,
    node_config: Arc<NodeUserConfig>,
    processor_config: &ProcessorConfig,
) -> Result<ProcessorWrapper<Batch>, ConfigError> {
    Ok(ProcessorWrapper::local(
        QueryCorrelator::from_config(pipeline_ctx, &node_config.config)?,
        node,
        node_config,
        processor_config,
    ))
}

/// Registers [`QueryCorrelator`] as a dbtel processor factory.
#[allow(unsafe_code)]
#[distributed_slice(DBTEL_PROCESSOR_FACTORIES)]
pub static QUERY_CORRELATOR_FACTORY: otap_df_engine::ProcessorFactory<Batch> =
    otap_df_engine::ProcessorFactory {
        name: QUERY_CORRELATOR_URN,
        create: |pipeline_ctx, node, node_config, proc_cfg| {
            create_query_correlator(pipeline_ctx, node, node_config, proc_cfg)
        },
    };

impl QueryCorrelator {
    /// Creates a new correlator from an explicit config.
    #[must_use]
    pub fn new(pipeline_ctx: PipelineContext, config: Config) -> Self {
        Self {
            config,
            metrics: pipeline_ctx.register_metrics::<QueryCorrelatorMetrics>(),
            windows: HashMap::new(),
        }
    }

    /// Creates a new correlator from a JSON configuration object.
    pub fn from_config(pipeline_ctx: PipelineContext, config: &serde_json::Value) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_value(config.clone())
            .map_err(|e| ConfigError::InvalidUserConfig { error: e.to_string() })?;
        Ok(Self::new(pipeline_ctx, config))
    }

    fn window_id(&self, record: &LogRecord) -> Option<String> {
        let session = record.attributes.get(&self.config.session_attribute).and_then(|v| v.as_str())?;
        let transaction = record
            .attributes
            .get(&self.config.transaction_attribute)
            .and_then(|v| v.as_str())
            .unwrap_or("none");
        Some(format!("{session}:{transaction}"))
    }

    /// Consumes one log batch, returning the annotated pass-through batch
    /// plus any trace batches closed as a result (`spec.md` §4.5's
    /// Contract).
    fn correlate(&mut self, batch: LogBatch) -> (LogBatch, Vec<TraceBatch>) {
        let mut passthrough = Vec::with_capacity(batch.records.len());
        let mut closed = Vec::new();

        for mut record in batch.records {
            let Some(window_id) = self.window_id(&record) else {
                passthrough.push(record);
                continue;
            };
            let boundary = record
                .attributes
                .get(&self.config.boundary_attribute)
                .and_then(|v| v.as_str())
                .and_then(Boundary::parse);

            let window = self.windows.entry(window_id.clone()).or_insert_with(|| {
                self.metrics.windows_opened.add(1);
                Window::new()
            });
            window.last_seen = Instant::now();
            if window.first_seen_ms.is_none() {
                window.first_seen_ms = Some(record.timestamp_ms);
            }

            // A `begin` marker only opens/timestamps the window; it does
            // not itself become a span.
            if boundary != Some(Boundary::Begin) {
                let span_id: [u8; 8] = Uuid::new_v4().as_bytes()[..8].try_into().expect("uuid has 16 bytes");
                window.spans.push(Span {
                    trace_id: window.trace_id.into(),
                    span_id: span_id.into(),
                    parent_span_id: None,
                    name: fingerprint_sql(&record.body),
                    start_time_ms: record.timestamp_ms,
                    end_time_ms: record.timestamp_ms,
                    attributes: record.attributes.clone(),
                    status: if record.severity == Severity::Error { SpanStatus::Error } else { SpanStatus::Ok },
                    resource: record.resource.clone(),
                });
            }

            let should_close = matches!(boundary, Some(Boundary::Commit) | Some(Boundary::Rollback))
                || window.spans.len() >= self.config.max_correlation_size;

            if should_close {
                if let Some(window) = self.windows.remove(&window_id) {
                    self.metrics.windows_closed.add(1);
                    closed.push(close_window(window, boundary, record.timestamp_ms, &record.resource));
                }
            } else {
                record.attributes.insert("correlation.id", window_id);
                passthrough.push(record);
            }
        }

        self.evict_idle(&mut closed);
        (LogBatch { records: passthrough }, closed)
    }

    /// Test-only access to log/transaction correlation, for integration
    /// tests that exercise the processing stage without the pipeline-wiring
    /// machinery.
    #[cfg(feature = "testing")]
    pub fn correlate_for_test(&mut self, batch: LogBatch) -> (LogBatch, Vec<TraceBatch>) {
        self.correlate(batch)
    }

    /// Force-closes any window that has been idle past `correlation_window`,
    /// counting it as an eviction rather than a clean close.
    fn evict_idle(&mut self, closed: &mut Vec<TraceBatch>) {
        let correlation_window = self.config.correlation_window;
        let stale: Vec<String> = self
            .windows
            .iter()
            .filter(|(_, w)| w.last_seen.elapsed() >= correlation_window)
            .map(|(k, _)| k.clone())
            .collect();
        for key in stale {
            if let Some(window) = self.windows.remove(&key) {
                if window.spans.is_empty() {
                    continue;
                }
                self.metrics.windows_evicted.add(1);
                let last_ms = window.spans.last().map(|s| s.end_time_ms).unwrap_or(0);
                let resource = window.spans.last().map(|s| s.resource.clone()).unwrap_or_default();
                closed.push(close_window(window, None, last_ms, &resource));
            }
        }
    }
}

/// Synthesises a root span whose children are `window.spans` (in arrival
/// order, ties on start time broken by that same order) and assigns the
/// shared `trace.id` already held by the window. `boundary` is `None` for
/// an idle-timeout eviction.
fn close_window(
    window: Window,
    boundary: Option<Boundary>,
    end_time_ms: i64,
    resource: &otap_df_pdata::AttributeSet,
) -> TraceBatch {
    let mut spans = window.spans;
    spans.sort_by_key(|s| s.start_time_ms);

    let root_span_id: [u8; 8] = Uuid::new_v4().as_bytes()[..8].try_into().expect("uuid has 16 bytes");
    for span in &mut spans {
        span.parent_span_id = Some(root_span_id.into());
    }

    let start_time_ms = window.first_seen_ms.unwrap_or_else(|| spans.first().map(|s| s.start_time_ms).unwrap_or(end_time_ms));
    let root_status = match boundary {
        Some(Boundary::Rollback) => SpanStatus::Error,
        Some(Boundary::Commit) => SpanStatus::Ok,
        _ => SpanStatus::Unset,
    };
    let root = Span {
        trace_id: window.trace_id.into(),
        span_id: root_span_id.into(),
        parent_span_id: None,
        name: "transaction".to_owned(),
        start_time_ms,
        end_time_ms,
        attributes: otap_df_pdata::AttributeSet::new(),
        status: root_status,
        resource: resource.clone(),
    };

    let mut all = Vec::with_capacity(spans.len() + 1);
    all.push(root);
    all.extend(spans);
    TraceBatch { spans: all }
}

#[async_trait(?Send)]
impl local::Processor<Batch> for QueryCorrelator {
    async fn process(
        &mut self,
        msg: Message<Batch>,
        effect_handler: &mut local::EffectHandler<Batch>,
    ) -> Result<(), Error> {
        match msg {
            Message::Control(NodeControlMsg::Config { config }) => {
                if let Ok(new_config) = serde_json::from_value::<Config>(config) {
                    self.config = new_config;
                }
                Ok(())
            }
            Message::Control(_) => Ok(()),
            Message::PData(Batch::Logs(lb)) => {
                let (passthrough, traces) = self.correlate(lb);
                if !passthrough.records.is_empty() {
                    effect_handler.send_message(Batch::Logs(passthrough)).await?;
                }
                for trace in traces {
                    self.metrics.traces_emitted.add(1);
                    effect_handler.send_message(Batch::Traces(trace)).await?;
                }
                Ok(())
            }
            // Metrics and already-correlated traces pass through untouched.
            Message::PData(other) => effect_handler.send_message(other).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use otap_df_engine::context::ControllerContext;
    use otap_df_pdata::AttributeSet;
    use otap_df_telemetry::registry::MetricsRegistryHandle;

    fn test_pipeline_context() -> PipelineContext {
        let controller_ctx = ControllerContext::new(MetricsRegistryHandle::new());
        controller_ctx.pipeline_context_with("test_grp".into(), "test_pipeline".into(), 0, 1, 0)
    }

    fn test_correlator(config: Config) -> QueryCorrelator {
        QueryCorrelator::new(test_pipeline_context(), config)
    }

    fn record(ts: i64, session: &str, boundary: Option<&str>, body: &str) -> LogRecord {
        let mut attrs = AttributeSet::new().with("session.id", session.to_owned());
        if let Some(boundary) = boundary {
            attrs.insert("db.transaction.boundary", boundary.to_owned());
        }
        LogRecord {
            timestamp_ms: ts,
            severity: Severity::Info,
            body: body.to_owned(),
            attributes: attrs,
            resource: AttributeSet::new(),
        }
    }

    #[test]
    fn scenario_s6_transaction_closes_with_a_synthesised_root_span() {
        let mut correlator = test_correlator(Config::default());
        let batch = LogBatch {
            records: vec![
                record(0, "sess-1", Some("begin"), "BEGIN"),
                record(1, "sess-1", None, "SELECT * FROM orders WHERE id = 1"),
                record(2, "sess-1", None, "UPDATE orders SET status = 'shipped' WHERE id = 1"),
                record(3, "sess-1", Some("commit"), "COMMIT"),
            ],
        };
        let (passthrough, traces) = correlator.correlate(batch);
        assert!(passthrough.records.is_empty(), "every record belongs to the closed transaction");
        assert_eq!(traces.len(), 1);
        let trace = &traces[0];
        assert_eq!(trace.spans.len(), 4, "1 root + 3 children (select, update, commit)");
        let root = &trace.spans[0];
        assert!(root.parent_span_id.is_none());
        assert_eq!(root.start_time_ms, 0);
        assert_eq!(root.end_time_ms, 3);
        assert_eq!(root.status, SpanStatus::Ok);
        let children = &trace.spans[1..];
        let root_span_id = Vec::from(root.span_id);
        let root_trace_id = Vec::from(root.trace_id);
        assert!(children.iter().all(|s| s.parent_span_id.map(Vec::from) == Some(root_span_id.clone())));
        assert!(children.iter().all(|s| Vec::from(s.trace_id) == root_trace_id));
        assert_eq!(children[0].start_time_ms, 1);
        assert_eq!(children[1].start_time_ms, 2);
        assert_eq!(children[2].start_time_ms, 3);
    }

    #[test]
    fn non_boundary_records_are_annotated_and_passed_through() {
        let mut correlator = test_correlator(Config::default());
        let batch = LogBatch {
            records: vec![record(0, "sess-1", None, "SELECT 1")],
        };
        let (passthrough, traces) = correlator.correlate(batch);
        assert!(traces.is_empty());
        assert_eq!(passthrough.records.len(), 1);
        assert!(passthrough.records[0].attributes.get("correlation.id").is_some());
    }

    #[test]
    fn distinct_sessions_stay_in_separate_windows() {
        let mut correlator = test_correlator(Config::default());
        let batch = LogBatch {
            records: vec![record(0, "sess-1", None, "SELECT 1"), record(0, "sess-2", None, "SELECT 2")],
        };
        let (_passthrough, traces) = correlator.correlate(batch);
        assert!(traces.is_empty());
        assert_eq!(correlator.windows.len(), 2);
    }

    #[test]
    fn rollback_closes_with_error_status() {
        let mut correlator = test_correlator(Config::default());
        let batch = LogBatch {
            records: vec![record(0, "sess-1", None, "SELECT 1"), record(1, "sess-1", Some("rollback"), "ROLLBACK")],
        };
        let (_passthrough, traces) = correlator.correlate(batch);
        assert_eq!(traces.len(), 1);
        assert_eq!(traces[0].spans[0].status, SpanStatus::Error);
    }

    #[test]
    fn window_force_closes_at_max_size() {
        let mut correlator = test_correlator(Config {
            max_correlation_size: 2,
            ..Config::default()
        });
        let batch = LogBatch {
            records: vec![
                record(0, "sess-1", None, "SELECT 1"),
                record(1, "sess-1", None, "SELECT 2"),
                record(2, "sess-1", None, "SELECT 3"),
            ],
        };
        let (_passthrough, traces) = correlator.correlate(batch);
        assert_eq!(traces.len(), 1);
        assert_eq!(traces[0].spans.len(), 3, "1 root + 2 children");
        assert_eq!(correlator.windows.len(), 1, "the third record opened a fresh window");
    }
}
