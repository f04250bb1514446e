// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! PostgreSQL/MySQL host and database metrics receiver (`spec.md` §4.9).
//! On a fixed interval, runs a fixed set of configured SQL queries against
//! the configured [`crate::db::DbConnection`] and turns each numeric
//! column of each row into a gauge metric point.

use crate::db::{DatabaseKey, DbConnection};
use crate::processors::circuit_breaker::{CircuitBreaker, Outcome};
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
use otap_df_pdata::{AttributeSet, Batch, DataPoint, Metric, MetricBatch, MetricKind};
use otap_df_telemetry::instrument::Counter;
use otap_df_telemetry::metrics::MetricSet;
use otap_df_telemetry::{otel_info, otel_warn};
use otap_df_telemetry_macros::metric_set;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// The URN for the PostgreSQL/MySQL receiver.
pub const PG_MYSQL_RECEIVER_URN: &str = "urn:otel:dbtel:pg_mysql:receiver";

/// One query to run each collection cycle, and how to label its result.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QuerySpec {
    /// The SQL text to execute.
    pub sql: String,
    /// Metric name prefix; each numeric column `col` becomes
    /// `{metric_prefix}.{col}`.
    pub metric_prefix: String,
    /// Kind to tag every point produced by this query with, e.g. `Sum` for
    /// a monotonically increasing counter column such as
    /// `pg_stat_database.xact_commit`.
    #[serde(default = "default_query_kind")]
    pub kind: MetricKind,
}

fn default_query_kind() -> MetricKind {
    MetricKind::Gauge
}

/// Configuration for [`PgMysqlReceiver`].
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Database system label (`postgresql` or `mysql`).
    pub db_system: String,
    /// Logical database name.
    pub db_name: String,
    /// `host:port` of the server.
    pub server_address: String,
    /// How often to run the configured queries.
    pub collection_interval: Duration,
    /// Queries to run each cycle.
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
            collection_interval: Duration::from_secs(15),
            queries: Vec::new(),
            circuit_breaker: crate::processors::circuit_breaker::Config::default(),
        }
    }
}

/// Self-metrics for [`PgMysqlReceiver`].
#[metric_set(name = "dbtel.pg_mysql.metrics")]
#[derive(Debug, Default, Clone)]
pub struct PgMysqlMetrics {
    /// Collection cycles completed (a cycle runs to completion even if
    /// individual queries within it fail; see `cycles_failed`).
    #[metric(unit = "{cycle}")]
    pub cycles_ok: Counter<u64>,
    /// Individual queries within a cycle that failed; the cycle itself
    /// continues with the remaining queries per `spec.md` §4.9.
    #[metric(unit = "{query}")]
    pub cycles_failed: Counter<u64>,
    /// Metric points produced.
    #[metric(unit = "{point}")]
    pub points_produced: Counter<u64>,
}

/// PostgreSQL/MySQL metrics receiver. See module docs and `spec.md` §4.9.
pub struct PgMysqlReceiver {
    config: Config,
    metrics: MetricSet<PgMysqlMetrics>,
    connection: Box<dyn DbConnection>,
    breaker: CircuitBreaker,
    database_key: DatabaseKey,
}

/// Factory function to create a [`PgMysqlReceiver`].
///
/// The concrete [`DbConnection`] is supplied externally (`spec.md` §1
/// Non-goal: this collector does not bundle a database client library);
/// production wiring is expected to register a connection-providing
/// extension ahead of this receiver's node construction. Until that
/// seam is wired in, the receiver falls back to a connection that
/// returns no rows, which keeps the pipeline well-formed without
/// fabricating a live database dependency.
pub fn create_pg_mysql_receiver(
    pipeline_ctx: PipelineContext,
    node: NodeId,
    node_config: Arc<NodeUserConfig>,
    receiver_config: &ReceiverConfig,
) -> Result<ReceiverWrapper<Batch>, ConfigError> {
    Ok(ReceiverWrapper::local(
        PgMysqlReceiver::from_config(pipeline_ctx, &node_config.config)?,
        node,
        node_config,
        receiver_config,
    ))
}

/// Registers [`PgMysqlReceiver`] as a dbtel receiver factory.
#[allow(unsafe_code)]
#[distributed_slice(DBTEL_RECEIVER_FACTORIES)]
pub static PG_MYSQL_RECEIVER_FACTORY: ReceiverFactory<Batch> = ReceiverFactory {
    name: PG_MYSQL_RECEIVER_URN,
    create: |pipeline_ctx, node, node_config, recv_cfg| {
        create_pg_mysql_receiver(pipeline_ctx, node, node_config, recv_cfg)
    },
};

impl PgMysqlReceiver {
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
            metrics: pipeline_ctx.register_metrics::<PgMysqlMetrics>(),
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

    /// Runs every configured query against the same database, gating
    /// each call through the circuit breaker and continuing with the
    /// remaining queries on a per-query failure (`spec.md` §4.9's
    /// failure policy: a transient receiver error does not abort the
    /// cycle).
    async fn collect(&mut self) -> MetricBatch {
        let resource = self.resource();
        let mut batch = MetricBatch {
            metrics: Vec::new(),
            observed_at_ms: otap_df_pdata::now_ms(),
        };

        for query in self.config.queries.clone() {
            let (allowed, reason) = self.breaker.allow(self.database_key.clone());
            if !allowed {
                otel_warn!("pg_mysql_receiver.circuit_open", sql = query.sql.as_str(), reason = reason);
                continue;
            }

            let started = Instant::now();
            let result = self.connection.query(&query.sql).await;
            let outcome = self.breaker.classify(&result, started.elapsed());
            self.breaker.record(self.database_key.clone(), outcome);

            let rows = match result {
                Ok(rows) => rows,
                Err(e) => {
                    self.metrics.cycles_failed.add(1);
                    otel_warn!("pg_mysql_receiver.query_failed", sql = query.sql.as_str(), error = e.to_string());
                    continue;
                }
            };
            for row in rows {
                for (col, value) in row {
                    let Some(scalar) = value.as_f64() else {
                        continue;
                    };
                    let name = format!("{}.{}", query.metric_prefix, col);
                    let mut metric = Metric::new(name, query.kind.clone(), "1", resource.clone());
                    metric.points.push(DataPoint::scalar(batch.observed_at_ms, scalar));
                    batch.metrics.push(metric);
                }
            }
        }

        batch
    }

    /// Test-only access to one collection cycle, for integration tests
    /// that exercise the receiver without the pipeline-wiring machinery.
    #[cfg(feature = "testing")]
    pub async fn collect_for_test(&mut self) -> MetricBatch {
        self.collect().await
    }
}

#[async_trait(?Send)]
impl local::Receiver<Batch> for PgMysqlReceiver {
    async fn start(
        mut self: Box<Self>,
        mut ctrl_msg_recv: local::ControlChannel<Batch>,
        effect_handler: local::EffectHandler<Batch>,
    ) -> Result<TerminalState, Error> {
        let _ = effect_handler.start_periodic_timer(self.config.collection_interval).await?;
        otel_info!("pg_mysql_receiver.start");

        loop {
            match ctrl_msg_recv.recv().await {
                Ok(NodeControlMsg::TimerTick { .. }) => {
                    let batch = self.collect().await;
                    self.metrics.cycles_ok.add(1);
                    self.metrics.points_produced.add(batch.metrics.len() as u64);
                    if !batch.metrics.is_empty() {
                        effect_handler.send_message(Batch::Metrics(batch)).await?;
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
    use otap_df_engine::context::ControllerContext;
    use otap_df_telemetry::registry::MetricsRegistryHandle;

    fn test_pipeline_context() -> PipelineContext {
        let controller_ctx = ControllerContext::new(MetricsRegistryHandle::new());
        controller_ctx.pipeline_context_with("test_grp".into(), "test_pipeline".into(), 0, 1, 0)
    }

    fn test_receiver(queries: Vec<QuerySpec>) -> PgMysqlReceiver {
        let key = DatabaseKey {
            db_system: "postgresql".to_owned(),
            db_name: "orders".to_owned(),
            server_address: "db1:5432".to_owned(),
        };
        let connection = FakeConnection::new(key);
        connection.on(
            "SELECT count(*) AS backends FROM pg_stat_activity",
            Ok(vec![std::collections::HashMap::from([(
                "backends".to_owned(),
                crate::db::ColumnValue::Int(7),
            )])]),
        );
        PgMysqlReceiver::new(
            test_pipeline_context(),
            Config {
                queries,
                ..Config::default()
            },
            Box::new(connection),
        )
    }

    #[tokio::test]
    async fn collect_turns_numeric_columns_into_gauge_points() {
        let mut receiver = test_receiver(vec![QuerySpec {
            sql: "SELECT count(*) AS backends FROM pg_stat_activity".to_owned(),
            metric_prefix: "postgresql".to_owned(),
            kind: MetricKind::Gauge,
        }]);
        let batch = receiver.collect().await;
        assert_eq!(batch.metrics.len(), 1);
        assert_eq!(batch.metrics[0].name, "postgresql.backends");
        assert_eq!(batch.metrics[0].points[0].value, 7.0);
    }

    #[tokio::test]
    async fn unscripted_query_produces_no_points() {
        let mut receiver = test_receiver(vec![QuerySpec {
            sql: "SELECT 1".to_owned(),
            metric_prefix: "postgresql".to_owned(),
            kind: MetricKind::Gauge,
        }]);
        let batch = receiver.collect().await;
        assert!(batch.metrics.is_empty());
    }

    #[tokio::test]
    async fn a_failing_query_is_counted_and_does_not_abort_remaining_queries() {
        let key = DatabaseKey {
            db_system: "postgresql".to_owned(),
            db_name: "orders".to_owned(),
            server_address: "db1:5432".to_owned(),
        };
        let connection = FakeConnection::new(key);
        connection.on("SELECT bad", Err(crate::db::DbError::Driver("relation does not exist".to_owned())));
        connection.on(
            "SELECT count(*) AS backends FROM pg_stat_activity",
            Ok(vec![std::collections::HashMap::from([(
                "backends".to_owned(),
                crate::db::ColumnValue::Int(7),
            )])]),
        );
        let mut receiver = PgMysqlReceiver::new(
            test_pipeline_context(),
            Config {
                queries: vec![
                    QuerySpec {
                        sql: "SELECT bad".to_owned(),
                        metric_prefix: "bad".to_owned(),
                        kind: MetricKind::Gauge,
                    },
                    QuerySpec {
                        sql: "SELECT count(*) AS backends FROM pg_stat_activity".to_owned(),
                        metric_prefix: "postgresql".to_owned(),
                        kind: MetricKind::Gauge,
                    },
                ],
                ..Config::default()
            },
            Box::new(connection),
        );
        let batch = receiver.collect().await;
        assert_eq!(batch.metrics.len(), 1);
        assert_eq!(batch.metrics[0].name, "postgresql.backends");
        assert_eq!(receiver.metrics.cycles_failed.get(), 1);
    }

    #[tokio::test]
    async fn open_circuit_skips_the_query_without_touching_the_connection() {
        let mut receiver = test_receiver(vec![QuerySpec {
            sql: "SELECT count(*) AS backends FROM pg_stat_activity".to_owned(),
            metric_prefix: "postgresql".to_owned(),
            kind: MetricKind::Gauge,
        }]);
        receiver.config.circuit_breaker.min_requests = 1;
        receiver.config.circuit_breaker.failure_threshold = 0.5;
        let (allowed, _) = receiver.breaker.allow(receiver.database_key.clone());
        assert!(allowed);
        receiver.breaker.record(receiver.database_key.clone(), Outcome::Failure);

        let batch = receiver.collect().await;
        assert!(batch.metrics.is_empty(), "breaker should reject the query while open");
    }
}
