// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! `spec.md` §8 Scenario S2 (plan extraction): a log record body
//! `SELECT * FROM t WHERE id = 7` with an attached `Index Scan on t`
//! plan (total_cost=8.31) gets fingerprinted and annotated with a stable
//! `plan.hash`, shared across differently-parameterised executions of the
//! same query.

mod common;

use otap_df_dbtel::processors::plan_extractor::{Config, PlanExtractor};
use otap_df_pdata::{AttributeSet, AttributeValue, Batch, LogBatch, LogRecord, Severity};

fn record_with(statement: &str) -> LogRecord {
    let resource = AttributeSet::new().with("service.name", "dbtel-collector").with("db.system", "postgresql");
    let mut record = LogRecord::new(0, Severity::Info, statement, resource);
    record.attributes.insert("db.statement", statement.to_owned());
    record.attributes.insert("db.plan", "Index Scan on t  (cost=0.29..8.31 rows=1)");
    record
}

#[test]
fn plan_extraction_fingerprints_and_annotates_the_plan() {
    let mut extractor = PlanExtractor::new(common::test_pipeline_context(), Config::default());

    let mut batch = Batch::Logs(LogBatch { records: vec![record_with("SELECT * FROM t WHERE id = 7")] });
    extractor.annotate_for_test(&mut batch);
    let Batch::Logs(lb) = batch else { panic!("expected a log batch") };
    let record = &lb.records[0];

    assert_eq!(record.attributes.get("db.statement").and_then(|v| v.as_str()), Some("SELECT * FROM t WHERE id = ?"));
    assert_eq!(record.attributes.get("plan.type").and_then(|v| v.as_str()), Some("Index Scan"));
    assert!(
        matches!(record.attributes.get("plan.total_cost"), Some(AttributeValue::F64(v)) if (*v - 8.31).abs() < 1e-9)
    );
    let plan_hash = record.attributes.get("plan.hash").and_then(|v| v.as_str()).expect("plan.hash present");
    assert_eq!(plan_hash.len(), 64);

    let mut batch2 = Batch::Logs(LogBatch { records: vec![record_with("SELECT * FROM t WHERE id = 9")] });
    extractor.annotate_for_test(&mut batch2);
    let Batch::Logs(lb2) = batch2 else { panic!("expected a log batch") };
    let plan_hash2 = lb2.records[0].attributes.get("plan.hash").and_then(|v| v.as_str()).expect("plan.hash present");

    assert_eq!(plan_hash, plan_hash2, "identical plan shape must yield identical plan.hash regardless of literal");
}
