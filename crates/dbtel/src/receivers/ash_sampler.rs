// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Active Session History sampler (`spec.md` §4.9): polls a
//! point-in-time "what is every backend doing right now" query at high
//! frequency and turns each active session row into a log record, giving
//! the collector visibility into transient contention that a slower
//! metrics-style scrape would miss. Alongside the per-sample log records,
//! it emits one gauge point per observed wait class every sample, and
//! over a slower `aggregation_window` derives time-in-wait per query
//! fingerprint and the deepest observed blocking chain.

use crate::db::{ColumnValue, DatabaseKey, DbConnection, Row};
use crate::processors::circuit_breaker::{CircuitBreaker, Outcome};
use crate::processors::record_fingerprint;
use crate::DBTEL_RECEIVER_FACTORIES;
use async_trait::async_trait;
use linkme::distributed_slice;
use otap_df_config::error::Error as ConfigError;
use otap_df_config::node::NodeUserConfig;
use otap_df_engine::config::ReceiverConfig;
use otap_df_engine::context::PipelineContext;
use otap_df_engine::control::NodeControlMsg;
use otap_df_engine::error::Error;
use otap_df_engine::local::receiver as local;
use otap_df_engine::node::NodeId;
use otap_df_engine::receiver::ReceiverWrapper;
use otap_df_engine::terminal_state::TerminalState;
use otap_df_engine::ReceiverFactory;
use otap_df_pdata::{AttributeSet, Batch, DataPoint, LogBatch, LogRecord, Metric, MetricBatch, MetricKind, Severity};
use otap_df_telemetry::instrument::Counter;
use otap_df_telemetry::metrics::MetricSet;
use otap_df_telemetry::{otel_info, otel_warn};
use otap_df_telemetry_macros::metric_set;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// The URN for the ASH sampler receiver.
pub const ASH_SAMPLER_RECEIVER_URN: &str = "urn:otel:dbtel:ash_sampler:receiver";

/// Configuration for [`AshSampler`].
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Database system label.
    pub db_system: String,
    /// Logical database name.
    pub db_name: String,
    /// `host:port` of the server.
    pub server_address: String,
    /// How often to sample active sessions. `spec.md` §4.9 expects this
    /// to be much shorter than the metrics collection interval.
    pub sample_interval: Duration,
    /// The point-in-time active-session query, expected to return one row
    /// per active backend/connection. Recognised columns: `pid`, `state`,
    /// `wait_event`, `query`, and an optional `blocking_pid` identifying
    /// the backend this row's `pid` is waiting behind.
    pub query: String,
    /// Window over which time-in-wait per query fingerprint and the
    /// deepest observed blocking chain are accumulated before being
    /// emitted as gauges and reset.
    pub aggregation_window: Duration,
    /// Circuit breaker configuration guarding this receiver's query
    /// (`spec.md` §4.3).
    pub circuit_breaker: crate::processors::circuit_breaker::Config,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_system: "postgresql".to_owned(),
            db_name: "postgres".to_owned(),
            server_address: "localhost:5432".to_owned(),
            sample_interval: Duration::from_secs(1),
            query: "SELECT pid, state, wait_event, query FROM pg_stat_activity WHERE state IS NOT NULL".to_owned(),
            aggregation_window: Duration::from_secs(60),
            circuit_breaker: crate::processors::circuit_breaker::Config::default(),
        }
    }
}

/// Self-metrics for [`AshSampler`].
#[metric_set(name = "dbtel.ash_sampler.metrics")]
#[derive(Debug, Default, Clone)]
pub struct AshSamplerMetrics {
    /// Samples completed successfully.
    #[metric(unit = "{sample}")]
    pub samples_ok: Counter<u64>,
    /// Samples that failed to query the database.
    #[metric(unit = "{sample}")]
    pub samples_failed: Counter<u64>,
    /// Active-session rows observed.
    #[metric(unit = "{session}")]
    pub sessions_observed: Counter<u64>,
    /// Aggregation windows closed and emitted as gauges.
    #[metric(unit = "{window}")]
    pub aggregates_emitted: Counter<u64>,
}

/// Active Session History sampler receiver. See module docs and
/// `spec.md` §4.9.
pub struct AshSampler {
    config: Config,
    metrics: MetricSet<AshSamplerMetrics>,
    connection: Box<dyn DbConnection>,
    breaker: CircuitBreaker,
    database_key: DatabaseKey,
    aggregation_started: Instant,
    wait_time_by_fingerprint: HashMap<String, Duration>,
    max_blocking_depth: u32,
}

/// Factory function to create an [`AshSampler`].
pub fn create_ash_sampler(
    pipeline_ctx: PipelineContext,
    node: NodeId,
    node_config: Arc<NodeUserConfig>,
    receiver_config: &ReceiverConfig,
) -> Result<ReceiverWrapper<Batch>, ConfigError> {
    Ok(ReceiverWrapper::local(
        AshSampler::from_config(pipeline_ctx, &node_config.config)?,
        node,
        node_config,
        receiver_config,
    ))
}

/// Registers [`AshSampler`] as a dbtel receiver factory.
#[allow(unsafe_code)]
#[distributed_slice(DBTEL_RECEIVER_FACTORIES)]
pub static ASH_SAMPLER_FACTORY: ReceiverFactory<Batch> = ReceiverFactory {
    name: ASH_SAMPLER_RECEIVER_URN,
    create: |pipeline_ctx, node, node_config, recv_cfg| {
        create_ash_sampler(pipeline_ctx, node, node_config, recv_cfg)
    },
};

impl AshSampler {
    /// Creates a new sampler from an explicit config and connection.
    #[must_use]
    pub fn new(pipeline_ctx: PipelineContext, config: Config, connection: Box<dyn DbConnection>) -> Self {
        let database_key = DatabaseKey {
            db_system: config.db_system.clone(),
            db_name: config.db_name.clone(),
            server_address: config.server_address.clone(),
        };
        let breaker = CircuitBreaker::new(pipeline_ctx.clone(), config.circuit_breaker.clone());
        Self {
            config,
            metrics: pipeline_ctx.register_metrics::<AshSamplerMetrics>(),
            connection,
            breaker,
            database_key,
            aggregation_started: Instant::now(),
            wait_time_by_fingerprint: HashMap::new(),
            max_blocking_depth: 0,
        }
    }

    /// Creates a new sampler from a JSON configuration object, with a
    /// no-op connection until the external connection-providing seam is
    /// wired in (`spec.md` §1 Non-goal).
    pub fn from_config(pipeline_ctx: PipelineContext, config: &serde_json::Value) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_value(config.clone())
            .map_err(|e| ConfigError::InvalidUserConfig { error: e.to_string() })?;
        let key = DatabaseKey {
            db_system: config.db_system.clone(),
            db_name: config.db_name.clone(),
            server_address: config.server_address.clone(),
        };
        Ok(Self::new(pipeline_ctx, config, Box::new(crate::db::fake::FakeConnection::new(key))))
    }

    fn resource(&self) -> AttributeSet {
        AttributeSet::new()
            .with("service.name", "dbtel-collector")
            .with("db.system", self.config.db_system.clone())
            .with("db.name", self.config.db_name.clone())
            .with("server.address", self.config.server_address.clone())
    }

    fn row_to_record(&self, now: i64, resource: &AttributeSet, row: Row) -> (LogRecord, Option<String>, Option<i64>, Option<i64>) {
        let mut body = String::new();
        let mut record = LogRecord::new(now, Severity::Info, "", resource.clone());
        let mut wait_event = None;
        let mut pid = None;
        let mut blocking_pid = None;
        for (col, value) in row {
            match col.as_str() {
                "query" => {
                    if let Some(text) = value.as_text() {
                        body = text;
                    }
                    continue;
                }
                "wait_event" => {
                    wait_event = value.as_text();
                }
                "pid" => {
                    if let ColumnValue::Int(v) = value {
                        pid = Some(v);
                    }
                }
                "blocking_pid" => {
                    if let ColumnValue::Int(v) = value {
                        blocking_pid = Some(v);
                    }
                }
                _ => {}
            }
            if let Some(text) = value.as_text() {
                record.attributes.insert(col, text);
            } else if let Some(n) = value.as_f64() {
                record.attributes.insert(col, n);
            }
        }
        record.body = body;
        (record, wait_event, pid, blocking_pid)
    }

    /// Runs the configured active-session query once, gated by the
    /// circuit breaker, and returns the per-row log batch plus a metrics
    /// batch carrying one gauge point per observed wait class and, once
    /// `aggregation_window` elapses, the accumulated time-in-wait per
    /// query fingerprint and deepest blocking chain.
    async fn sample(&mut self) -> (LogBatch, MetricBatch) {
        let resource = self.resource();
        let now = otap_df_pdata::now_ms();
        let empty = MetricBatch { metrics: Vec::new(), observed_at_ms: now };

        let (allowed, reason) = self.breaker.allow(self.database_key.clone());
        if !allowed {
            otel_warn!("ash_sampler.circuit_open", reason = reason);
            return (LogBatch::default(), empty);
        }

        let started = Instant::now();
        let result = self.connection.query(&self.config.query).await;
        let outcome = self.breaker.classify(&result, started.elapsed());
        self.breaker.record(self.database_key.clone(), outcome);

        let rows = match result {
            Ok(rows) => rows,
            Err(e) => {
                self.metrics.samples_failed.add(1);
                otel_warn!("ash_sampler.query_failed", error = e.to_string());
                return (LogBatch::default(), empty);
            }
        };

        let mut records = Vec::with_capacity(rows.len());
        let mut wait_counts: HashMap<String, u64> = HashMap::new();
        let mut blocking_by_pid: HashMap<i64, i64> = HashMap::new();
        for row in rows {
            let (record, wait_event, pid, blocking_pid) = self.row_to_record(now, &resource, row);
            if let Some(wait_event) = &wait_event {
                *wait_counts.entry(wait_event.clone()).or_insert(0) += 1;
            }
            if let (Some(pid), Some(blocking_pid)) = (pid, blocking_pid) {
                let _ = blocking_by_pid.insert(pid, blocking_pid);
            }
            let fingerprint = record_fingerprint(&record.body);
            *self.wait_time_by_fingerprint.entry(fingerprint).or_insert(Duration::ZERO) += self.config.sample_interval;
            records.push(record);
        }
        self.metrics.samples_ok.add(1);
        self.metrics.sessions_observed.add(records.len() as u64);

        let mut metrics = Vec::new();
        if !wait_counts.is_empty() {
            let mut wait_metric = Metric::new("db.ash.sessions_by_wait_event", MetricKind::Gauge, "{session}", resource.clone());
            for (wait_event, count) in wait_counts {
                wait_metric.points.push(DataPoint::scalar(now, count as f64).with_attribute("wait_event", wait_event));
            }
            metrics.push(wait_metric);
        }

        self.max_blocking_depth = self.max_blocking_depth.max(blocking_chain_depth(&blocking_by_pid));

        if self.aggregation_started.elapsed() >= self.config.aggregation_window {
            let mut time_in_wait = Metric::new("db.ash.time_in_wait", MetricKind::Gauge, "s", resource.clone());
            for (fingerprint, duration) in &self.wait_time_by_fingerprint {
                time_in_wait
                    .points
                    .push(DataPoint::scalar(now, duration.as_secs_f64()).with_attribute("query.fingerprint", fingerprint.clone()));
            }
            metrics.push(time_in_wait);

            let mut depth_metric = Metric::new("db.ash.blocking_chain_depth", MetricKind::Gauge, "{session}", resource.clone());
            depth_metric.points.push(DataPoint::scalar(now, f64::from(self.max_blocking_depth)));
            metrics.push(depth_metric);

            self.metrics.aggregates_emitted.add(1);
            self.wait_time_by_fingerprint.clear();
            self.max_blocking_depth = 0;
            self.aggregation_started = Instant::now();
        }

        (LogBatch { records }, MetricBatch { metrics, observed_at_ms: now })
    }
}

/// Longest chain of `pid -> blocking_pid` edges observed in one sample.
fn blocking_chain_depth(blocking_by_pid: &HashMap<i64, i64>) -> u32 {
    let mut max_depth = 0;
    for &start in blocking_by_pid.keys() {
        let mut depth = 0;
        let mut current = start;
        let mut seen = std::collections::HashSet::new();
        while let Some(&next) = blocking_by_pid.get(&current) {
            if !seen.insert(current) {
                break; // cyclic wait graph; stop rather than loop forever.
            }
            depth += 1;
            current = next;
        }
        max_depth = max_depth.max(depth);
    }
    max_depth
}

#[async_trait(?Send)]
impl local::Receiver<Batch> for AshSampler {
    async fn start(
        mut self: Box<Self>,
        mut ctrl_msg_recv: local::ControlChannel<Batch>,
        effect_handler: local::EffectHandler<Batch>,
    ) -> Result<TerminalState, Error> {
        let _ = effect_handler.start_periodic_timer(self.config.sample_interval).await?;
        otel_info!("ash_sampler.start");

        loop {
            match ctrl_msg_recv.recv().await {
                Ok(NodeControlMsg::TimerTick { .. }) => {
                    let (logs, metrics) = self.sample().await;
                    if !logs.records.is_empty() {
                        effect_handler.send_message(Batch::Logs(logs)).await?;
                    }
                    if !metrics.metrics.is_empty() {
                        effect_handler.send_message(Batch::Metrics(metrics)).await?;
                    }
                }
                Ok(NodeControlMsg::CollectTelemetry { mut metrics_reporter }) => {
                    let _ = metrics_reporter.report(&mut self.metrics);
                }
                Ok(NodeControlMsg::Shutdown { .. }) => {
                    return Ok(TerminalState::new([self.metrics.snapshot()]));
                }
                Ok(_) => {}
                Err(e) => return Err(Error::ChannelRecvError(e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::fake::FakeConnection;
    use crate::db::ColumnValue;
    use otap_df_engine::context::ControllerContext;
    use otap_df_telemetry::registry::MetricsRegistryHandle;
    use std::collections::HashMap;

    fn test_pipeline_context() -> PipelineContext {
        let controller_ctx = ControllerContext::new(MetricsRegistryHandle::new());
        controller_ctx.pipeline_context_with("test_grp".into(), "test_pipeline".into(), 0, 1, 0)
    }

    fn key() -> DatabaseKey {
        DatabaseKey {
            db_system: "postgresql".to_owned(),
            db_name: "orders".to_owned(),
            server_address: "db1:5432".to_owned(),
        }
    }

    #[tokio::test]
    async fn sample_turns_active_rows_into_log_records_and_a_wait_class_metric() {
        let connection = FakeConnection::new(key());
        let config = Config::default();
        connection.on(
            &config.query,
            Ok(vec![HashMap::from([
                ("pid".to_owned(), ColumnValue::Int(42)),
                ("state".to_owned(), ColumnValue::Text("active".to_owned())),
                ("wait_event".to_owned(), ColumnValue::Text("Lock".to_owned())),
                ("query".to_owned(), ColumnValue::Text("SELECT * FROM orders".to_owned())),
            ])]),
        );
        let mut sampler = AshSampler::new(test_pipeline_context(), config, Box::new(connection));
        let (logs, metrics) = sampler.sample().await;
        assert_eq!(logs.records.len(), 1);
        assert_eq!(logs.records[0].body, "SELECT * FROM orders");
        assert_eq!(logs.records[0].attributes.get("state").and_then(|v| v.as_str()), Some("active"));
        assert_eq!(metrics.metrics.len(), 1);
        assert_eq!(metrics.metrics[0].name, "db.ash.sessions_by_wait_event");
        assert_eq!(metrics.metrics[0].points[0].value, 1.0);
    }

    #[tokio::test]
    async fn empty_result_set_produces_empty_batches() {
        let connection = FakeConnection::new(key());
        let mut sampler = AshSampler::new(test_pipeline_context(), Config::default(), Box::new(connection));
        let (logs, metrics) = sampler.sample().await;
        assert!(logs.records.is_empty());
        assert!(metrics.metrics.is_empty());
    }

    #[tokio::test]
    async fn a_failing_sample_is_counted_and_does_not_abort_the_receiver() {
        let connection = FakeConnection::new(key());
        let config = Config::default();
        connection.on(&config.query, Err(crate::db::DbError::Driver("connection reset".to_owned())));
        let mut sampler = AshSampler::new(test_pipeline_context(), config, Box::new(connection));
        let (logs, metrics) = sampler.sample().await;
        assert!(logs.records.is_empty());
        assert!(metrics.metrics.is_empty());
        assert_eq!(sampler.metrics.samples_failed.get(), 1);
    }

    #[tokio::test]
    async fn aggregation_window_emits_time_in_wait_and_blocking_depth() {
        let connection = FakeConnection::new(key());
        let mut config = Config::default();
        config.aggregation_window = Duration::from_millis(0);
        connection.on(
            &config.query,
            Ok(vec![
                HashMap::from([
                    ("pid".to_owned(), ColumnValue::Int(1)),
                    ("blocking_pid".to_owned(), ColumnValue::Int(2)),
                    ("query".to_owned(), ColumnValue::Text("SELECT 1".to_owned())),
                ]),
                HashMap::from([
                    ("pid".to_owned(), ColumnValue::Int(2)),
                    ("blocking_pid".to_owned(), ColumnValue::Int(3)),
                    ("query".to_owned(), ColumnValue::Text("SELECT 2".to_owned())),
                ]),
            ]),
        );
        let mut sampler = AshSampler::new(test_pipeline_context(), config, Box::new(connection));
        let (_logs, metrics) = sampler.sample().await;
        let names: Vec<_> = metrics.metrics.iter().map(|m| m.name.as_ref()).collect();
        assert!(names.contains(&"db.ash.time_in_wait"));
        assert!(names.contains(&"db.ash.blocking_chain_depth"));
        let depth_metric = metrics.metrics.iter().find(|m| m.name == "db.ash.blocking_chain_depth").unwrap();
        assert_eq!(depth_metric.points[0].value, 2.0);
        assert_eq!(sampler.metrics.aggregates_emitted.get(), 1);
    }
}
