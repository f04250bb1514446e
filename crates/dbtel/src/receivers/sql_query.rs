// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! User-defined SQL query receiver (`spec.md` §4.9): runs operator-supplied,
//! parameterless queries on a fixed interval and maps named result columns
//! to either metric data points or log records, per the configured column
//! mappings.

use crate::db::{DatabaseKey, DbConnection};
use crate::processors::circuit_breaker::CircuitBreaker;
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
use otap_df_pdata::{
    AttributeSet, Batch, DataPoint, LogBatch, LogRecord, Metric, MetricBatch, MetricKind, Severity,
};
use otap_df_telemetry::instrument::Counter;
use otap_df_telemetry::metrics::MetricSet;
use otap_df_telemetry::otel_warn;
use otap_df_telemetry_macros::metric_set;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// The URN for the user-defined SQL query receiver.
pub const SQL_QUERY_RECEIVER_URN: &str = "urn:otel:dbtel:sql_query:receiver";

/// How a named result column is turned into telemetry.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ColumnMapping {
    /// Column value becomes the value of a gauge data point named `metric`.
    Metric {
        /// Source column name.
        column: String,
        /// Emitted metric name.
        metric: String,
    },
    /// Column value is attached as a point/record attribute named
    /// `attribute` (defaults to the column name).
    Attribute {
        /// Source column name.
        column: String,
        /// Attribute key to emit under, defaults to `column` if absent.
        #[serde(default)]
        attribute: Option<String>,
    },
    /// Column value becomes the log record body.
    Body {
        /// Source column name.
        column: String,
    },
}

/// One user-defined query and its column mappings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QuerySpec {
    /// Parameterless SQL text to execute each cycle.
    pub sql: String,
    /// Whether successful rows become metrics or log records.
    pub signal: SignalKind,
    /// Column-to-telemetry mappings applied to each returned row.
    pub mappings: Vec<ColumnMapping>,
}

/// Which signal type a [`QuerySpec`] produces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    /// Rows become metric data points.
    Metric,
    /// Rows become log records.
    Log,
}

/// Configuration for [`SqlQueryReceiver`].
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Database system label.
    pub db_system: String,
    /// Logical database name.
    pub db_name: String,
    /// `host:port` of the server.
    pub server_address: String,
    /// How often to run the configured queries.
    pub collection_interval: Duration,
    /// User-defined queries to run each cycle.
    pub queries: Vec<QuerySpec>,
    /// Circuit breaker configuration guarding this receiver's queries
    /// (`spec.md` §4.3).
    pub circuit_breaker: crate::processors::circuit_breaker::Config,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_system: "postgresql".to_owned(),
            db_name: "postgres".to_owned(),
            server_address: "localhost:5432".to_owned(),
            collection_interval: Duration::from_secs(30),
            queries: Vec::new(),
            circuit_breaker: crate::processors::circuit_breaker::Config::default(),
        }
    }
}

/// Self-metrics for [`SqlQueryReceiver`].
#[metric_set(name = "dbtel.sql_query.metrics")]
#[derive(Debug, Default, Clone)]
pub struct SqlQueryMetrics {
    /// Queries that ran and mapped successfully.
    #[metric(unit = "{query}")]
    pub queries_ok: Counter<u64>,
    /// Queries that failed; the cycle continues with remaining queries
    /// per `spec.md` §4.9's failure policy.
    #[metric(unit = "{query}")]
    pub queries_failed: Counter<u64>,
    /// Records produced across both signal kinds.
    #[metric(unit = "{record}")]
    pub records_produced: Counter<u64>,
}

/// User-defined SQL query receiver. See module docs and `spec.md` §4.9.
pub struct SqlQueryReceiver {
    config: Config,
    metrics: MetricSet<SqlQueryMetrics>,
    connection: Box<dyn DbConnection>,
    breaker: CircuitBreaker,
    database_key: DatabaseKey,
}

/// Factory function to create a [`SqlQueryReceiver`].
pub fn create_sql_query_receiver(
    pipeline_ctx: PipelineContext,
    node: NodeId,
    node_config: Arc<NodeUserConfig>,
    receiver_config: &ReceiverConfig,
) -> Result<ReceiverWrapper<Batch>, ConfigError> {
    Ok(ReceiverWrapper::local(
        SqlQueryReceiver::from_config(pipeline_ctx, &node_config.config)?,
        node,
        node_config,
        receiver_config,
    ))
}

/// Registers [`SqlQueryReceiver`] as a dbtel receiver factory.
#[allow(unsafe_code)]
#[distributed_slice(DBTEL_RECEIVER_FACTORIES)]
pub static SQL_QUERY_RECEIVER_FACTORY: ReceiverFactory<Batch> = ReceiverFactory {
    name: SQL_QUERY_RECEIVER_URN,
    create: |pipeline_ctx, node, node_config, recv_cfg| {
        create_sql_query_receiver(pipeline_ctx, node, node_config, recv_cfg)
    },
};

impl SqlQueryReceiver {
    /// Creates a new receiver from an explicit config and connection.
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
            metrics: pipeline_ctx.register_metrics::<SqlQueryMetrics>(),
            connection,
            breaker,
            database_key,
        }
    }

    /// Creates a new receiver from a JSON configuration object, with a
    /// no-op connection until the external connection-providing seam is
    /// wired in.
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

    /// Runs every configured query, mapping successful rows into a
    /// metrics batch and a logs batch. A query failure is logged and
    /// counted but does not abort the remaining queries in the cycle,
    /// per `spec.md` §4.9's failure policy.
    async fn collect(&mut self) -> (MetricBatch, LogBatch) {
        let resource = self.resource();
        let now = otap_df_pdata::now_ms();
        let mut metrics = MetricBatch {
            metrics: Vec::new(),
            observed_at_ms: now,
        };
        let mut logs = LogBatch { records: Vec::new() };

        for query in self.config.queries.clone() {
            let (allowed, reason) = self.breaker.allow(self.database_key.clone());
            if !allowed {
                otel_warn!("sql_query_receiver.circuit_open", sql = query.sql.as_str(), reason = reason);
                continue;
            }
            let started = Instant::now();
            let result = self.connection.query(&query.sql).await;
            let outcome = self.breaker.classify(&result, started.elapsed());
            self.breaker.record(self.database_key.clone(), outcome);
            match result {
                Ok(rows) => {
                    self.metrics.queries_ok.add(1);
                    for row in rows {
                        match query.signal {
                            SignalKind::Metric => {
                                for mapping in &query.mappings {
                                    if let ColumnMapping::Metric { column, metric: metric_name } = mapping {
                                        let Some(value) = row.get(column).and_then(|v| v.as_f64()) else {
                                            continue;
                                        };
                                        let mut metric = Metric::new(metric_name.clone(), MetricKind::Gauge, "1", resource.clone());
                                        let mut point = DataPoint::scalar(now, value);
                                        for other in &query.mappings {
                                            if let ColumnMapping::Attribute { column, attribute } = other {
                                                if let Some(text) = row.get(column).and_then(|v| v.as_text()) {
                                                    let key = attribute.clone().unwrap_or_else(|| column.clone());
                                                    point = point.with_attribute(key, text);
                                                }
                                            }
                                        }
                                        metric.points.push(point);
                                        metrics.metrics.push(metric);
                                        self.metrics.records_produced.add(1);
                                    }
                                }
                            }
                            SignalKind::Log => {
                                let body = query
                                    .mappings
                                    .iter()
                                    .find_map(|m| match m {
                                        ColumnMapping::Body { column } => row.get(column).and_then(|v| v.as_text()),
                                        _ => None,
                                    })
                                    .unwrap_or_default();
                                let mut record = LogRecord::new(now, Severity::Info, body, resource.clone());
                                for mapping in &query.mappings {
                                    if let ColumnMapping::Attribute { column, attribute } = mapping {
                                        if let Some(text) = row.get(column).and_then(|v| v.as_text()) {
                                            let key = attribute.clone().unwrap_or_else(|| column.clone());
                                            record.attributes.insert(key, text);
                                        }
                                    }
                                }
                                logs.records.push(record);
                                self.metrics.records_produced.add(1);
                            }
                        }
                    }
                }
                Err(e) => {
                    self.metrics.queries_failed.add(1);
                    otel_warn!("sql_query_receiver.query_failed", sql = query.sql.as_str(), error = e.to_string());
                }
            }
        }

        (metrics, logs)
    }
}

#[async_trait(?Send)]
impl local::Receiver<Batch> for SqlQueryReceiver {
    async fn start(
        mut self: Box<Self>,
        mut ctrl_msg_recv: local::ControlChannel<Batch>,
        effect_handler: local::EffectHandler<Batch>,
    ) -> Result<TerminalState, Error> {
        let _ = effect_handler.start_periodic_timer(self.config.collection_interval).await?;

        loop {
            match ctrl_msg_recv.recv().await {
                Ok(NodeControlMsg::TimerTick { .. }) => {
                    let (metrics, logs) = self.collect().await;
                    if !metrics.metrics.is_empty() {
                        effect_handler.send_message(Batch::Metrics(metrics)).await?;
                    }
                    if !logs.records.is_empty() {
                        effect_handler.send_message(Batch::Logs(logs)).await?;
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

    fn connection_with(sql: &str, rows: Vec<HashMap<String, ColumnValue>>) -> FakeConnection {
        let key = DatabaseKey {
            db_system: "postgresql".to_owned(),
            db_name: "orders".to_owned(),
            server_address: "db1:5432".to_owned(),
        };
        let connection = FakeConnection::new(key);
        connection.on(sql, Ok(rows));
        connection
    }

    #[tokio::test]
    async fn metric_mapping_produces_a_gauge_point_with_attributes() {
        let sql = "SELECT tablename, n_live_tup FROM pg_stat_user_tables";
        let connection = connection_with(
            sql,
            vec![HashMap::from([
                ("tablename".to_owned(), ColumnValue::Text("orders".to_owned())),
                ("n_live_tup".to_owned(), ColumnValue::Int(1200)),
            ])],
        );
        let mut receiver = SqlQueryReceiver::new(
            test_pipeline_context(),
            Config {
                queries: vec![QuerySpec {
                    sql: sql.to_owned(),
                    signal: SignalKind::Metric,
                    mappings: vec![
                        ColumnMapping::Metric {
                            column: "n_live_tup".to_owned(),
                            metric: "postgresql.table.rows".to_owned(),
                        },
                        ColumnMapping::Attribute {
                            column: "tablename".to_owned(),
                            attribute: None,
                        },
                    ],
                }],
                ..Config::default()
            },
            Box::new(connection),
        );
        let (metrics, logs) = receiver.collect().await;
        assert!(logs.records.is_empty());
        assert_eq!(metrics.metrics.len(), 1);
        assert_eq!(metrics.metrics[0].points[0].value, 1200.0);
        assert_eq!(
            metrics.metrics[0].points[0].attributes.get("tablename").and_then(|v| v.as_str()),
            Some("orders")
        );
    }

    #[tokio::test]
    async fn log_mapping_uses_body_column_and_attribute_columns() {
        let sql = "SELECT query, wait_event FROM pg_stat_activity";
        let connection = connection_with(
            sql,
            vec![HashMap::from([
                ("query".to_owned(), ColumnValue::Text("SELECT 1".to_owned())),
                ("wait_event".to_owned(), ColumnValue::Text("Lock".to_owned())),
            ])],
        );
        let mut receiver = SqlQueryReceiver::new(
            test_pipeline_context(),
            Config {
                queries: vec![QuerySpec {
                    sql: sql.to_owned(),
                    signal: SignalKind::Log,
                    mappings: vec![
                        ColumnMapping::Body { column: "query".to_owned() },
                        ColumnMapping::Attribute {
                            column: "wait_event".to_owned(),
                            attribute: Some("wait.event".to_owned()),
                        },
                    ],
                }],
                ..Config::default()
            },
            Box::new(connection),
        );
        let (metrics, logs) = receiver.collect().await;
        assert!(metrics.metrics.is_empty());
        assert_eq!(logs.records.len(), 1);
        assert_eq!(logs.records[0].body, "SELECT 1");
        assert_eq!(
            logs.records[0].attributes.get("wait.event").and_then(|v| v.as_str()),
            Some("Lock")
        );
    }

    #[tokio::test]
    async fn a_failing_query_is_counted_and_does_not_abort_remaining_queries() {
        let bad_sql = "SELECT * FROM nonexistent";
        let good_sql = "SELECT n FROM ok";
        let connection = connection_with(good_sql, vec![HashMap::from([("n".to_owned(), ColumnValue::Int(1))])]);
        connection.on(bad_sql, Err(crate::db::DbError::Driver("relation does not exist".to_owned())));
        let mut receiver = SqlQueryReceiver::new(
            test_pipeline_context(),
            Config {
                queries: vec![
                    QuerySpec {
                        sql: bad_sql.to_owned(),
                        signal: SignalKind::Metric,
                        mappings: vec![ColumnMapping::Metric { column: "n".to_owned(), metric: "bad".to_owned() }],
                    },
                    QuerySpec {
                        sql: good_sql.to_owned(),
                        signal: SignalKind::Metric,
                        mappings: vec![ColumnMapping::Metric { column: "n".to_owned(), metric: "good".to_owned() }],
                    },
                ],
                ..Config::default()
            },
            Box::new(connection),
        );
        let (metrics, _logs) = receiver.collect().await;
        assert_eq!(metrics.metrics.len(), 1);
        assert_eq!(metrics.metrics[0].name, "good");
        assert_eq!(receiver.metrics.queries_failed.get(), 1);
        assert_eq!(receiver.metrics.queries_ok.get(), 1);
    }
}
