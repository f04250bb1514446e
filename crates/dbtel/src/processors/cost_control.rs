// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Cardinality-aware cost control (`spec.md` §4.7): tracks the distinct
//! time-series cardinality per metric name and globally using `HyperLogLog`
//! sketches, prunes the highest-cardinality attribute to a synthetic
//! `other` bucket for a cooldown period once a budget is exceeded, and
//! rate-limits the overall point volume with a token bucket that sheds
//! load by `priority` rather than dropping whole batches.

use crate::cardinality::HyperLogLog;
use crate::processors::metrics::CostControlMetrics;
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
use otap_df_pdata::{AttributeSet, Batch};
use otap_df_telemetry::metrics::MetricSet;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// The URN for the cost control processor.
pub const COST_CONTROL_URN: &str = "urn:otel:dbtel:cost_control:processor";

/// Relative importance of a record, used to decide shedding order when the
/// rate limiter is over budget. `Critical` is never dropped or downsampled.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
    Critical,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

impl Priority {
    fn label(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }
}

/// Assigns `priority` to records whose metric name or a resource attribute
/// value matches `pattern` (substring match, longest pattern wins ties —
/// same precedence rule as `adaptive_sampler`'s overrides).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PriorityRule {
    /// Substring pattern to match.
    pub pattern: String,
    /// Priority assigned on a match.
    pub priority: Priority,
    /// When set, match against this resource attribute's value instead of
    /// the metric name (for logs/traces, which have no metric name).
    pub attribute: Option<String>,
}

/// What the rate limiter does to excess volume once the token bucket is
/// drained.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OverBudgetAction {
    /// Drop the lowest-priority records first until volume fits the budget.
    Drop,
    /// Keep an evenly-strided subset of non-critical records instead of
    /// dropping them outright.
    Downsample,
}

/// Configuration for [`CostControl`].
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Estimated distinct time-series per metric name above which the top
    /// contributing attribute starts getting pruned.
    pub cardinality_budget: u64,
    /// Estimated distinct time-series across all metrics above which
    /// pruning also kicks in, even if no single metric is individually
    /// over `cardinality_budget`.
    pub global_cardinality_budget: u64,
    /// Point-level attribute keys eligible for pruning once over budget.
    /// The one with the highest observed distinct-value count for the
    /// metric in question is pruned first.
    pub prunable_attributes: Vec<String>,
    /// Once an attribute is pruned for a metric, it stays pruned for this
    /// long even if cardinality drops back under budget, to avoid
    /// flapping.
    pub cooldown: Duration,
    /// Maximum points admitted per minute, across all metrics/logs/traces.
    pub max_data_points_per_minute: f64,
    /// Token bucket burst capacity, in points.
    pub burst_capacity: f64,
    /// What to do with volume in excess of the rate limit.
    pub over_budget_action: OverBudgetAction,
    /// Priority assignment rules, evaluated longest-pattern-wins.
    pub priority_rules: Vec<PriorityRule>,
    /// Distinct keys the global sketch must observe before budget
    /// enforcement turns on; until then the processor passes batches
    /// through unshaped while the cardinality estimate is still noisy.
    pub min_warmup_samples: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cardinality_budget: 10_000,
            global_cardinality_budget: 100_000,
            prunable_attributes: Vec::new(),
            cooldown: Duration::from_secs(300),
            max_data_points_per_minute: 6_000_000.0,
            burst_capacity: 100_000.0,
            over_budget_action: OverBudgetAction::Drop,
            priority_rules: Vec::new(),
            min_warmup_samples: 1_000,
        }
    }
}

struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(capacity: f64) -> Self {
        Self {
            tokens: capacity,
            last_refill: Instant::now(),
        }
    }

    /// Refills, then consumes up to `n` tokens, returning how many were
    /// actually available (and thus consumed). A caller admits that many
    /// items and sheds the rest.
    fn take_up_to(&mut self, rate_per_second: f64, capacity: f64, n: f64) -> f64 {
        let elapsed = self.last_refill.elapsed().as_secs_f64();
        self.tokens = (self.tokens + elapsed * rate_per_second).min(capacity);
        self.last_refill = Instant::now();
        let take = self.tokens.min(n);
        self.tokens -= take;
        take
    }
}

/// Cardinality-aware cost control processor. See module docs and
/// `spec.md` §4.7.
pub struct CostControl {
    config: Config,
    metrics: MetricSet<CostControlMetrics>,
    per_metric_sketches: HashMap<String, HyperLogLog>,
    global_sketch: HyperLogLog,
    global_observed: u64,
    // (metric name, attribute key) -> sketch of that attribute's distinct values, to find the "top contributor".
    attribute_sketches: HashMap<(String, String), HyperLogLog>,
    // (metric name, attribute key) -> pruned until.
    pruned_until: HashMap<(String, String), Instant>,
    bucket: TokenBucket,
}

/// Factory function to create a [`CostControl`] processor.
pub fn create_cost_control(
    pipeline_ctx: PipelineContext,
    node: NodeId,
    node_config: Arc<NodeUserConfig>,
    processor_config: &ProcessorConfig,
) -> Result<ProcessorWrapper<Batch>, ConfigError> {
    Ok(ProcessorWrapper::local(
        CostControl::from_config(pipeline_ctx, &node_config.config)?,
        node,
        node_config,
        processor_config,
    ))
}

/// Registers [`CostControl`] as a dbtel processor factory.
#[allow(unsafe_code)]
#[distributed_slice(DBTEL_PROCESSOR_FACTORIES)]
pub static COST_CONTROL_FACTORY: otap_df_engine::ProcessorFactory<Batch> = otap_df_engine::ProcessorFactory {
    name: COST_CONTROL_URN,
    create: |pipeline_ctx, node, node_config, proc_cfg| {
        create_cost_control(pipeline_ctx, node, node_config, proc_cfg)
    },
};

impl CostControl {
    /// Creates a new processor from an explicit config.
    #[must_use]
    pub fn new(pipeline_ctx: PipelineContext, config: Config) -> Self {
        let bucket = TokenBucket::new(config.burst_capacity);
        Self {
            config,
            metrics: pipeline_ctx.register_metrics::<CostControlMetrics>(),
            per_metric_sketches: HashMap::new(),
            global_sketch: HyperLogLog::new(),
            global_observed: 0,
            attribute_sketches: HashMap::new(),
            pruned_until: HashMap::new(),
            bucket,
        }
    }

    /// Creates a new processor from a JSON configuration object.
    pub fn from_config(pipeline_ctx: PipelineContext, config: &serde_json::Value) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_value(config.clone())
            .map_err(|e| ConfigError::InvalidUserConfig { error: e.to_string() })?;
        Ok(Self::new(pipeline_ctx, config))
    }

    /// Test-only access to this processor's self-metrics, for integration
    /// tests that assert on counters without the pipeline-wiring machinery.
    #[cfg(feature = "testing")]
    #[must_use]
    pub fn metrics(&self) -> &MetricSet<CostControlMetrics> {
        &self.metrics
    }

    fn warmed_up(&self) -> bool {
        self.global_observed >= self.config.min_warmup_samples
    }

    fn priority_for(&self, metric_name: Option<&str>, resource: &AttributeSet) -> Priority {
        self.config
            .priority_rules
            .iter()
            .filter_map(|rule| {
                let key = match &rule.attribute {
                    Some(attr) => resource.get(attr).and_then(|v| v.as_str())?,
                    None => metric_name?,
                };
                key.contains(rule.pattern.as_str()).then_some(rule)
            })
            .max_by_key(|rule| rule.pattern.len())
            .map_or(Priority::default(), |rule| rule.priority)
    }

    /// Updates the per-metric and global sketches for one metric's points,
    /// and prunes the top-contributing configured attribute if either
    /// budget is exceeded and warm-up has completed.
    fn track_and_prune_cardinality(&mut self, metric: &mut otap_df_pdata::Metric) {
        let metric_name = metric.name.to_string();
        let sketch = self.per_metric_sketches.entry(metric_name.clone()).or_default();
        for point in &metric.points {
            let key = metric.resource.merged_with(&point.attributes).canonical_hash();
            sketch.observe(key);
            self.global_sketch.observe(key);
            self.global_observed += 1;
        }
        let per_metric_estimate = sketch.estimate() as u64;
        let global_estimate = self.global_sketch.estimate() as u64;
        self.metrics.cardinality_estimate.set(global_estimate as i64);

        if !self.warmed_up() {
            return;
        }

        let over_budget = per_metric_estimate > self.config.cardinality_budget
            || global_estimate > self.config.global_cardinality_budget;

        if over_budget && !self.config.prunable_attributes.is_empty() {
            for attr in &self.config.prunable_attributes {
                let sketch = self
                    .attribute_sketches
                    .entry((metric_name.clone(), attr.clone()))
                    .or_default();
                for point in &metric.points {
                    if let Some(value) = point.attributes.get(attr).and_then(|v| v.as_str()) {
                        sketch.observe(otap_df_pdata::AttributeSet::new().with(attr.clone(), value.to_owned()).canonical_hash());
                    }
                }
            }
            if let Some(top) = self
                .config
                .prunable_attributes
                .iter()
                .max_by(|a, b| {
                    let ea = self
                        .attribute_sketches
                        .get(&(metric_name.clone(), (*a).clone()))
                        .map_or(0.0, HyperLogLog::estimate);
                    let eb = self
                        .attribute_sketches
                        .get(&(metric_name.clone(), (*b).clone()))
                        .map_or(0.0, HyperLogLog::estimate);
                    ea.total_cmp(&eb)
                })
                .cloned()
            {
                self.pruned_until
                    .insert((metric_name.clone(), top), Instant::now() + self.config.cooldown);
            }
        }

        let now = Instant::now();
        for attr in &self.config.prunable_attributes {
            let still_pruned = self
                .pruned_until
                .get(&(metric_name.clone(), attr.clone()))
                .is_some_and(|until| now < *until);
            if !still_pruned {
                continue;
            }
            for point in &mut metric.points {
                if point.attributes.contains_key(attr) {
                    point.attributes.insert(attr.clone(), "other");
                    self.metrics.attributes_pruned.add(1);
                }
            }
        }
    }

    /// Picks which of `n` items (by index, in priority order `priorities`)
    /// survive the rate limit. Never sheds `Priority::Critical`.
    fn select_keep_indices(&self, priorities: &[Priority], keep_budget: usize) -> HashSet<usize> {
        let mut keep: HashSet<usize> = priorities
            .iter()
            .enumerate()
            .filter(|(_, p)| **p == Priority::Critical)
            .map(|(i, _)| i)
            .collect();

        for tier in [Priority::High, Priority::Normal, Priority::Low] {
            let remaining = keep_budget.saturating_sub(keep.len());
            if remaining == 0 {
                continue;
            }
            let tier_indices: Vec<usize> = priorities
                .iter()
                .enumerate()
                .filter(|(_, p)| **p == tier)
                .map(|(i, _)| i)
                .collect();
            if tier_indices.is_empty() {
                continue;
            }
            match self.config.over_budget_action {
                OverBudgetAction::Drop => {
                    for i in tier_indices.into_iter().take(remaining) {
                        let _ = keep.insert(i);
                    }
                }
                OverBudgetAction::Downsample => {
                    let take_n = remaining.min(tier_indices.len());
                    let stride = tier_indices.len() as f64 / take_n as f64;
                    let mut pos = 0.0;
                    for _ in 0..take_n {
                        let idx = (pos as usize).min(tier_indices.len() - 1);
                        let _ = keep.insert(tier_indices[idx]);
                        pos += stride;
                    }
                }
            }
        }
        keep
    }

    fn apply_rate_limit(&mut self, priorities: Vec<Priority>) -> HashSet<usize> {
        let n = priorities.len();
        if n == 0 {
            return HashSet::new();
        }
        let rate_per_second = self.config.max_data_points_per_minute / 60.0;
        let available = self
            .bucket
            .take_up_to(rate_per_second, self.config.burst_capacity, n as f64);
        let allowed = available.floor() as usize;

        self.metrics.budget_used_percent.set(if self.config.burst_capacity > 0.0 {
            (((n as f64 - available.min(n as f64)) / n as f64) * 100.0).round() as i64
        } else {
            100
        });

        if allowed >= n {
            return (0..n).collect();
        }

        let keep = self.select_keep_indices(&priorities, allowed);
        let shed = n - keep.len();
        match self.config.over_budget_action {
            OverBudgetAction::Drop => self.metrics.points_dropped.add(shed as u64),
            OverBudgetAction::Downsample => self.metrics.points_downsampled.add(shed as u64),
        }
        self.metrics.rate_limited.add(shed as u64);
        keep
    }

    fn control_batch(&mut self, mut batch: Batch) -> Batch {
        match &mut batch {
            Batch::Metrics(mb) => {
                for metric in &mut mb.metrics {
                    self.track_and_prune_cardinality(metric);
                }
                let priorities: Vec<Priority> = mb
                    .metrics
                    .iter()
                    .flat_map(|m| {
                        let p = self.priority_for(Some(m.name.as_ref()), &m.resource);
                        std::iter::repeat(p).take(m.points.len())
                    })
                    .collect();
                let keep = self.apply_rate_limit(priorities.clone());
                let mut idx = 0usize;
                for metric in &mut mb.metrics {
                    metric.points.retain_mut(|point| {
                        let keep_this = keep.contains(&idx);
                        if keep_this {
                            point.attributes.insert("cost_control.priority", priorities[idx].label());
                        }
                        idx += 1;
                        keep_this
                    });
                }
                mb.metrics.retain(|m| !m.points.is_empty());
            }
            Batch::Logs(lb) => {
                let priorities: Vec<Priority> = lb
                    .records
                    .iter()
                    .map(|r| self.priority_for(None, &r.resource))
                    .collect();
                let keep = self.apply_rate_limit(priorities.clone());
                let mut idx = 0usize;
                lb.records.retain_mut(|record| {
                    let keep_this = keep.contains(&idx);
                    if keep_this {
                        record.attributes.insert("cost_control.priority", priorities[idx].label());
                    }
                    idx += 1;
                    keep_this
                });
            }
            Batch::Traces(tb) => {
                let priorities: Vec<Priority> = tb
                    .spans
                    .iter()
                    .map(|s| self.priority_for(None, &s.resource))
                    .collect();
                let keep = self.apply_rate_limit(priorities.clone());
                let mut idx = 0usize;
                tb.spans.retain_mut(|span| {
                    let keep_this = keep.contains(&idx);
                    if keep_this {
                        span.attributes.insert("cost_control.priority", priorities[idx].label());
                    }
                    idx += 1;
                    keep_this
                });
            }
        }
        batch
    }

    /// Test-only access to batch cost control, for integration tests that
    /// exercise the processing stage without the pipeline-wiring machinery.
    #[cfg(feature = "testing")]
    pub fn control_for_test(&mut self, batch: Batch) -> Batch {
        self.control_batch(batch)
    }
}

#[async_trait(?Send)]
impl local::Processor<Batch> for CostControl {
    async fn process(
        &mut self,
        msg: Message<Batch>,
        effect_handler: &mut local::EffectHandler<Batch>,
    ) -> Result<(), Error> {
        match msg {
            Message::Control(NodeControlMsg::Config { config }) => {
                if let Ok(new_config) = serde_json::from_value::<Config>(config) {
                    self.bucket = TokenBucket::new(new_config.burst_capacity);
                    self.config = new_config;
                }
                Ok(())
            }
            Message::Control(_) => Ok(()),
            Message::PData(batch) => {
                let controlled = self.control_batch(batch);
                effect_handler.send_message(controlled).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use otap_df_engine::context::ControllerContext;
    use otap_df_pdata::{DataPoint, Metric, MetricBatch, MetricKind};
    use otap_df_telemetry::registry::MetricsRegistryHandle;

    fn test_pipeline_context() -> PipelineContext {
        let controller_ctx = ControllerContext::new(MetricsRegistryHandle::new());
        controller_ctx.pipeline_context_with("test_grp".into(), "test_pipeline".into(), 0, 1, 0)
    }

    fn test_control(config: Config) -> CostControl {
        CostControl::new(test_pipeline_context(), config)
    }

    fn batch_with_points(n: usize) -> Batch {
        let resource = AttributeSet::new().with("service.name", "collector");
        let mut metric = Metric::new("postgresql.backends", MetricKind::Gauge, "1", resource);
        for i in 0..n {
            metric.points.push(DataPoint::scalar(0, i as f64).with_attribute("db.name", format!("db_{i}")));
        }
        Batch::Metrics(MetricBatch {
            metrics: vec![metric],
            observed_at_ms: 0,
        })
    }

    #[test]
    fn over_budget_cardinality_prunes_the_top_contributing_attribute() {
        let mut control = test_control(Config {
            cardinality_budget: 2,
            prunable_attributes: vec!["db.name".to_owned()],
            min_warmup_samples: 0,
            ..Config::default()
        });
        let controlled = control.control_batch(batch_with_points(5));
        if let Batch::Metrics(mb) = controlled {
            let pruned = mb.metrics[0]
                .points
                .iter()
                .filter(|p| p.attributes.get("db.name").and_then(|v| v.as_str()) == Some("other"))
                .count();
            assert!(pruned > 0);
        } else {
            unreachable!()
        }
    }

    #[test]
    fn under_budget_leaves_attributes_untouched() {
        let mut control = test_control(Config {
            cardinality_budget: 1_000,
            global_cardinality_budget: 1_000_000,
            prunable_attributes: vec!["db.name".to_owned()],
            min_warmup_samples: 0,
            ..Config::default()
        });
        let controlled = control.control_batch(batch_with_points(3));
        if let Batch::Metrics(mb) = controlled {
            assert!(mb.metrics[0]
                .points
                .iter()
                .all(|p| p.attributes.get("db.name").and_then(|v| v.as_str()) != Some("other")));
        } else {
            unreachable!()
        }
    }

    #[test]
    fn below_warmup_threshold_never_prunes() {
        let mut control = test_control(Config {
            cardinality_budget: 1,
            prunable_attributes: vec!["db.name".to_owned()],
            min_warmup_samples: 1_000_000,
            ..Config::default()
        });
        let controlled = control.control_batch(batch_with_points(5));
        if let Batch::Metrics(mb) = controlled {
            assert!(mb.metrics[0]
                .points
                .iter()
                .all(|p| p.attributes.get("db.name").and_then(|v| v.as_str()) != Some("other")));
        } else {
            unreachable!()
        }
    }

    #[test]
    fn rate_limiter_drops_low_priority_before_critical() {
        let mut control = test_control(Config {
            burst_capacity: 2.0,
            max_data_points_per_minute: 0.0,
            priority_rules: vec![PriorityRule {
                pattern: "postgresql".to_owned(),
                priority: Priority::Critical,
                attribute: None,
            }],
            ..Config::default()
        });
        let controlled = control.control_batch(batch_with_points(5));
        if let Batch::Metrics(mb) = controlled {
            // the rule matches every point (all share the metric name), so
            // all 5 survive despite only 2 tokens being available.
            assert_eq!(mb.metrics[0].points.len(), 5);
        } else {
            unreachable!()
        }
    }

    #[test]
    fn rate_limiter_sheds_low_priority_points_when_over_budget() {
        let mut control = test_control(Config {
            burst_capacity: 2.0,
            max_data_points_per_minute: 0.0,
            ..Config::default()
        });
        let controlled = control.control_batch(batch_with_points(5));
        if let Batch::Metrics(mb) = controlled {
            assert_eq!(mb.metrics[0].points.len(), 2);
        } else {
            unreachable!()
        }
        assert_eq!(control.metrics.points_dropped.get(), 3);
        assert_eq!(control.metrics.rate_limited.get(), 3);
    }

    #[test]
    fn downsample_mode_thins_instead_of_dropping_wholesale() {
        let mut control = test_control(Config {
            burst_capacity: 2.0,
            max_data_points_per_minute: 0.0,
            over_budget_action: OverBudgetAction::Downsample,
            ..Config::default()
        });
        let controlled = control.control_batch(batch_with_points(4));
        if let Batch::Metrics(mb) = controlled {
            assert_eq!(mb.metrics[0].points.len(), 2);
        } else {
            unreachable!()
        }
        assert_eq!(control.metrics.points_downsampled.get(), 2);
        assert_eq!(control.metrics.points_dropped.get(), 0);
    }
}
