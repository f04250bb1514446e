// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! `spec.md` §8 Scenario S1 (metric passthrough): a `postgresql` receiver
//! whose simulated database returns `pg_stat_database.xact_commit = 42`
//! produces a `postgresql.commits` sum data point with resource attribute
//! `db.system = postgresql`.

mod common;

use otap_df_dbtel::db::fake::FakeConnection;
use otap_df_dbtel::db::{ColumnValue, DatabaseKey};
use otap_df_dbtel::receivers::pg_mysql::{Config, PgMysqlReceiver, QuerySpec};
use otap_df_pdata::MetricKind;
use std::collections::HashMap;

#[tokio::test]
async fn metric_passthrough_produces_a_commits_sum_point() {
    let key = DatabaseKey {
        db_system: "postgresql".to_owned(),
        db_name: "postgres".to_owned(),
        server_address: "localhost:5432".to_owned(),
    };
    let connection = FakeConnection::new(key);
    connection.on(
        "SELECT xact_commit AS commits FROM pg_stat_database",
        Ok(vec![HashMap::from([("commits".to_owned(), ColumnValue::Int(42))])]),
    );

    let mut receiver = PgMysqlReceiver::new(
        common::test_pipeline_context(),
        Config {
            queries: vec![QuerySpec {
                sql: "SELECT xact_commit AS commits FROM pg_stat_database".to_owned(),
                metric_prefix: "postgresql".to_owned(),
                kind: MetricKind::Sum { monotonic: true },
            }],
            ..Config::default()
        },
        Box::new(connection),
    );

    let batch = receiver.collect_for_test().await;

    assert_eq!(batch.metrics.len(), 1);
    let metric = &batch.metrics[0];
    assert_eq!(metric.name, "postgresql.commits");
    assert!(matches!(metric.kind, MetricKind::Sum { monotonic: true }));
    assert_eq!(metric.points.len(), 1);
    assert_eq!(metric.points[0].value, 42.0);
    assert_eq!(metric.resource.get("db.system").and_then(|v| v.as_str()), Some("postgresql"));
}
