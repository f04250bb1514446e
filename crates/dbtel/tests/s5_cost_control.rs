// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! `spec.md` §8 Scenario S5 (cost control): once the configured cardinality
//! budget is exceeded, the rate limiter sheds lower-priority points first,
//! `critical`-priority points are never dropped, and `points_dropped`
//! accounts for every shed point.

mod common;

use otap_df_dbtel::processors::cost_control::{Config, CostControl, OverBudgetAction, Priority, PriorityRule};
use otap_df_pdata::{AttributeSet, Batch, DataPoint, Metric, MetricBatch, MetricKind};
use std::time::Duration;

#[test]
fn over_budget_volume_sheds_by_priority_and_never_drops_critical() {
    let config = Config {
        cardinality_budget: 10,
        global_cardinality_budget: 10,
        prunable_attributes: vec!["db.name".to_owned()],
        cooldown: Duration::from_secs(300),
        max_data_points_per_minute: 6_000.0,
        burst_capacity: 100.0,
        over_budget_action: OverBudgetAction::Drop,
        priority_rules: vec![PriorityRule {
            pattern: "special".to_owned(),
            priority: Priority::Critical,
            attribute: Some("db.name".to_owned()),
        }],
        min_warmup_samples: 0,
    };
    let mut cost_control = CostControl::new(common::test_pipeline_context(), config);

    let resource = AttributeSet::new().with("service.name", "dbtel-collector");
    let mut metric = Metric::new("postgresql.backends", MetricKind::Gauge, "1", resource);
    metric.points.push(DataPoint::scalar(0, 1.0).with_attribute("db.name", "special"));
    for i in 0..999 {
        metric.points.push(DataPoint::scalar(0, i as f64).with_attribute("db.name", format!("db_{i}")));
    }
    let total_points = metric.points.len();
    let batch = Batch::Metrics(MetricBatch { metrics: vec![metric] });

    let out = cost_control.control_for_test(batch);
    let Batch::Metrics(mb) = out else { panic!("expected a metric batch") };

    let surviving: Vec<_> = mb.metrics.iter().flat_map(|m| m.points.iter()).collect();
    assert!(
        surviving.iter().any(|p| p.attributes.get("db.name").and_then(|v| v.as_str()) == Some("special")),
        "critical-priority point must survive the rate limit"
    );

    let dropped = total_points - surviving.len();
    assert_eq!(dropped as u64, cost_control.metrics().points_dropped.get());
    assert!(dropped > 0, "over-budget volume must shed some points");

    let estimate = cost_control.metrics().cardinality_estimate.get();
    assert!(estimate > 0, "cardinality estimate must reflect the observed distinct series");
}
