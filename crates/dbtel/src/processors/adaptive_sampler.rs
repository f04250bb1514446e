// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Adaptive sampler (`spec.md` §4.2): under high load, reduce the sampled
//! fraction to protect downstream cost while preserving representativeness;
//! under low load, sample aggressively to retain fidelity.

use crate::processors::metrics::AdaptiveSamplerMetrics;
use crate::processors::record_fingerprint;
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
use otap_df_pdata::Batch;
use otap_df_telemetry::metrics::MetricSet;
use otap_df_telemetry::otel_warn;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use xxhash_rust::xxh3::xxh3_64;

/// The URN for the adaptive sampler processor.
pub const ADAPTIVE_SAMPLER_URN: &str = "urn:otel:dbtel:adaptive_sampler:processor";

/// A sampling-rate override for fingerprints/service patterns matching
/// `pattern` (longest-match-wins, ties broken by declaration order —
/// `SPEC_FULL.md` §9 Open Question 1).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SamplingRule {
    /// Substring pattern matched against the record's fingerprint/service
    /// attribute.
    pub pattern: String,
    /// Sampling fraction override in `[0, 1]` for records matching
    /// `pattern`.
    pub rate: f64,
}

/// Configuration for [`AdaptiveSampler`].
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base sampling fraction before load adjustment.
    pub base_rate: f64,
    /// Target points/second the sampler aims to emit.
    pub target_rate: f64,
    /// How often `p` is re-evaluated.
    pub decision_window: Duration,
    /// Minimum allowed sampling fraction.
    pub p_min: f64,
    /// Maximum allowed sampling fraction.
    pub p_max: f64,
    /// Ratio of instantaneous to EWMA rate that triggers spike handling.
    pub spike_ratio: f64,
    /// Multiplicative factor applied to `p` on spike detection.
    pub spike_factor: f64,
    /// Explicit rate overrides by fingerprint/service pattern.
    pub rules: Vec<SamplingRule>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_rate: 1.0,
            target_rate: 1000.0,
            decision_window: Duration::from_secs(5),
            p_min: 0.01,
            p_max: 1.0,
            spike_ratio: 3.0,
            spike_factor: 0.25,
            rules: Vec::new(),
        }
    }
}

/// Adaptive sampler processor. See module docs and `spec.md` §4.2.
pub struct AdaptiveSampler {
    config: Config,
    metrics: MetricSet<AdaptiveSamplerMetrics>,
    /// Exponentially-weighted rate estimate, points/second.
    rate_ewma: f64,
    /// Current target sampling fraction.
    p: f64,
    window_start: Instant,
    window_count: u64,
}

/// Factory function to create an [`AdaptiveSampler`].
pub fn create_adaptive_sampler(
    pipeline_ctx: PipelineContext,
    node: NodeId,
    node_config: Arc<NodeUserConfig>,
    processor_config: &ProcessorConfig,
) -> Result<ProcessorWrapper<Batch>, ConfigError> {
    Ok(ProcessorWrapper::local(
        AdaptiveSampler::from_config(pipeline_ctx, &node_config.config)?,
        node,
        node_config,
        processor_config,
    ))
}

/// Registers [`AdaptiveSampler`] as a dbtel processor factory.
#[allow(unsafe_code)]
#[distributed_slice(DBTEL_PROCESSOR_FACTORIES)]
pub static ADAPTIVE_SAMPLER_FACTORY: otap_df_engine::ProcessorFactory<Batch> =
    otap_df_engine::ProcessorFactory {
        name: ADAPTIVE_SAMPLER_URN,
        create: |pipeline_ctx, node, node_config, proc_cfg| {
            create_adaptive_sampler(pipeline_ctx, node, node_config, proc_cfg)
        },
    };

impl AdaptiveSampler {
    /// Creates a new sampler from an explicit config.
    #[must_use]
    pub fn new(pipeline_ctx: PipelineContext, config: Config) -> Self {
        let metrics = pipeline_ctx.register_metrics::<AdaptiveSamplerMetrics>();
        let base_rate = config.base_rate;
        Self {
            config,
            metrics,
            rate_ewma: 0.0,
            p: base_rate.clamp(0.0, 1.0),
            window_start: Instant::now(),
            window_count: 0,
        }
    }

    /// Creates a new sampler from a JSON configuration object.
    pub fn from_config(pipeline_ctx: PipelineContext, config: &serde_json::Value) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_value(config.clone())
            .map_err(|e| ConfigError::InvalidUserConfig { error: e.to_string() })?;
        Ok(Self::new(pipeline_ctx, config))
    }

    /// Rule-driven rate override for `key`, if any rule matches; otherwise
    /// `None`.
    fn rule_override(&self, key: &str) -> Option<f64> {
        self.config
            .rules
            .iter()
            .filter(|r| key.contains(r.pattern.as_str()))
            .max_by_key(|r| r.pattern.len())
            .map(|r| r.rate)
    }

    /// Re-evaluates `p` from the observed rate if the decision window has
    /// elapsed, applying spike detection.
    fn maybe_reevaluate(&mut self) {
        let elapsed = self.window_start.elapsed();
        if elapsed < self.config.decision_window {
            return;
        }
        let observed_rate = self.window_count as f64 / elapsed.as_secs_f64().max(f64::EPSILON);
        const EPSILON: f64 = 1e-9;

        if self.rate_ewma > 0.0 && observed_rate / self.rate_ewma > self.config.spike_ratio {
            self.p = (self.p * self.config.spike_factor).clamp(self.config.p_min, self.config.p_max);
            self.metrics.spikes_detected.add(1);
            otel_warn!(
                "adaptive_sampler.spike_detected",
                observed_rate = observed_rate,
                rate_ewma = self.rate_ewma,
                new_p = self.p
            );
        } else {
            self.p = (self.config.target_rate / observed_rate.max(EPSILON))
                .min(1.0)
                .clamp(self.config.p_min, self.config.p_max);
        }

        // Standard EWMA smoothing factor; a fixed alpha keeps the sampler
        // dependency-free on the number of windows observed so far.
        const ALPHA: f64 = 0.3;
        self.rate_ewma = if self.rate_ewma == 0.0 {
            observed_rate
        } else {
            ALPHA * observed_rate + (1.0 - ALPHA) * self.rate_ewma
        };

        self.window_start = Instant::now();
        self.window_count = 0;
    }

    /// Deterministic per-record keep decision: `hash(key) mod 2^32 < p * 2^32`.
    fn should_keep(&self, key: &str, p: f64) -> bool {
        let hash = xxh3_64(key.as_bytes()) as u32;
        (hash as u64) < (p * u32::MAX as f64) as u64
    }

    fn sample_batch(&mut self, mut batch: Batch) -> Batch {
        self.maybe_reevaluate();

        match &mut batch {
            Batch::Metrics(mb) => {
                for metric in &mut mb.metrics {
                    let p = self.effective_rate(metric.name.as_ref());
                    metric.points.retain_mut(|point| {
                        self.window_count += 1;
                        let key = format!("{}|{}", metric.name, point.attributes.canonical_form());
                        let keep = self.should_keep(&key, p);
                        if keep {
                            point.attributes.insert("sampling.rate", p);
                            self.metrics.records_kept.add(1);
                        } else {
                            self.metrics.records_dropped.add(1);
                        }
                        keep
                    });
                }
            }
            Batch::Logs(lb) => {
                lb.records.retain_mut(|record| {
                    self.window_count += 1;
                    let fp = record_fingerprint(&record.body);
                    let p = self.effective_rate(&fp);
                    let keep = self.should_keep(&fp, p);
                    if keep {
                        record.attributes.insert("sampling.rate", p);
                        self.metrics.records_kept.add(1);
                    } else {
                        self.metrics.records_dropped.add(1);
                    }
                    keep
                });
            }
            Batch::Traces(tb) => {
                tb.spans.retain_mut(|span| {
                    self.window_count += 1;
                    let p = self.effective_rate(&span.name);
                    let keep = self.should_keep(&span.name, p);
                    if keep {
                        span.attributes.insert("sampling.rate", p);
                        self.metrics.records_kept.add(1);
                    } else {
                        self.metrics.records_dropped.add(1);
                    }
                    keep
                });
            }
        }

        batch
    }

    fn effective_rate(&self, key: &str) -> f64 {
        self.rule_override(key).unwrap_or(self.p)
    }
}

#[async_trait(?Send)]
impl local::Processor<Batch> for AdaptiveSampler {
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
            Message::PData(batch) => {
                // Sampler must never drop the whole batch (`spec.md` §4.2
                // contract); an all-filtered batch is simply forwarded
                // empty so downstream counters stay accurate.
                let sampled = self.sample_batch(batch);
                effect_handler.send_message(sampled).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use otap_df_engine::context::ControllerContext;
    use otap_df_pdata::{AttributeSet, DataPoint, LogBatch, LogRecord, Metric, MetricBatch, MetricKind, Severity};
    use otap_df_telemetry::registry::MetricsRegistryHandle;

    fn test_pipeline_context() -> PipelineContext {
        let controller_ctx = ControllerContext::new(MetricsRegistryHandle::new());
        controller_ctx.pipeline_context_with("test_grp".into(), "test_pipeline".into(), 0, 1, 0)
    }

    fn test_sampler(config: Config) -> AdaptiveSampler {
        let mut sampler = AdaptiveSampler::new(test_pipeline_context(), config);
        sampler.p = 1.0;
        sampler
    }

    #[test]
    fn full_rate_keeps_everything() {
        let mut sampler = test_sampler(Config {
            p_min: 1.0,
            p_max: 1.0,
            ..Config::default()
        });
        let batch = Batch::Logs(LogBatch {
            records: (0..50)
                .map(|i| LogRecord::new(i, Severity::Info, format!("query {i}"), AttributeSet::new()))
                .collect(),
        });
        let sampled = sampler.sample_batch(batch);
        assert_eq!(sampled.len(), 50);
    }

    #[test]
    fn identical_fingerprints_get_identical_decisions() {
        let sampler = test_sampler(Config::default());
        let a = sampler.should_keep("SELECT ? FROM orders", 0.5);
        let b = sampler.should_keep("SELECT ? FROM orders", 0.5);
        assert_eq!(a, b);
    }

    #[test]
    fn rule_override_wins_over_computed_rate() {
        let sampler = test_sampler(Config {
            rules: vec![SamplingRule {
                pattern: "INSERT".to_owned(),
                rate: 1.0,
            }],
            ..Config::default()
        });
        assert_eq!(sampler.effective_rate("INSERT INTO orders"), 1.0);
    }

    #[test]
    fn metric_points_carry_sampling_rate_when_kept() {
        let mut sampler = test_sampler(Config {
            p_min: 1.0,
            p_max: 1.0,
            ..Config::default()
        });
        let resource = AttributeSet::new().with("service.name", "collector");
        let mut metric = Metric::new("postgresql.backends", MetricKind::Gauge, "1", resource);
        metric.points.push(DataPoint::scalar(0, 3.0));
        let batch = Batch::Metrics(MetricBatch {
            metrics: vec![metric],
            observed_at_ms: 0,
        });
        let sampled = sampler.sample_batch(batch);
        if let Batch::Metrics(mb) = sampled {
            assert!(mb.metrics[0].points[0].attributes.contains_key("sampling.rate"));
        } else {
            unreachable!()
        }
    }
}
