// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! `spec.md` §8 Scenario S6 (transaction correlation): a `begin`/`select`/
//! `update`/`commit` sequence from one session closes into a single trace
//! with one root span covering the whole transaction and three child spans
//! in arrival order.

mod common;

use otap_df_dbtel::processors::query_correlator::{Config, QueryCorrelator};
use otap_df_pdata::{AttributeSet, LogBatch, LogRecord, Severity, SpanStatus};

fn record(ts: i64, session: &str, boundary: Option<&str>, body: &str) -> LogRecord {
    let mut attributes = AttributeSet::new().with("session.id", session.to_owned());
    if let Some(boundary) = boundary {
        attributes.insert("db.transaction.boundary", boundary.to_owned());
    }
    LogRecord {
        timestamp_ms: ts,
        severity: Severity::Info,
        body: body.to_owned(),
        attributes,
        resource: AttributeSet::new(),
    }
}

#[test]
fn begin_select_update_commit_closes_into_one_trace_with_a_root_span() {
    let mut correlator = QueryCorrelator::new(common::test_pipeline_context(), Config::default());

    let batch = LogBatch {
        records: vec![
            record(0, "sess-1", Some("begin"), "BEGIN"),
            record(1, "sess-1", None, "SELECT * FROM orders WHERE id = 1"),
            record(2, "sess-1", None, "UPDATE orders SET status = 'shipped' WHERE id = 1"),
            record(3, "sess-1", Some("commit"), "COMMIT"),
        ],
    };

    let (passthrough, traces) = correlator.correlate_for_test(batch);

    assert!(passthrough.records.is_empty(), "every record belongs to the closed transaction");
    assert_eq!(traces.len(), 1);
    let trace = &traces[0];
    assert_eq!(trace.spans.len(), 4, "1 root + 3 children (select, update, commit)");

    let root = &trace.spans[0];
    assert!(root.parent_span_id.is_none());
    assert_eq!(root.start_time_ms, 0, "root span must cover from the begin marker");
    assert_eq!(root.end_time_ms, 3, "root span must cover through the commit marker");
    assert_eq!(root.status, SpanStatus::Ok);

    let children = &trace.spans[1..];
    let root_span_id = Vec::from(root.span_id);
    let root_trace_id = Vec::from(root.trace_id);
    assert!(children.iter().all(|s| Vec::from(s.trace_id) == root_trace_id), "all spans share one trace id");
    assert!(
        children.iter().all(|s| s.parent_span_id.clone().map(Vec::from) == Some(root_span_id.clone())),
        "all children point at the root span"
    );
    assert_eq!(children[0].start_time_ms, 1, "select arrives first");
    assert_eq!(children[1].start_time_ms, 2, "update arrives second");
    assert_eq!(children[2].start_time_ms, 3, "commit marker arrives third");
}
