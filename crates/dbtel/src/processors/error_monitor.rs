// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Integration-error monitoring and self-healing (`spec.md` §4.8).
//!
//! Unlike the other six processing stages, this one is not a `Processor<Batch>`
//! sitting in the hot data path — `spec.md` §4.8 is explicit that it "runs as
//! a side-car ... task, not in the hot path" and "exposes `ReportError(err,
//! context)` to exporters". [`ErrorMonitor`] is a cheaply-`Clone`-able handle
//! (an `Arc` internally) that an exporter holds and calls directly when a
//! write to its backend fails; it matches the error message against a rule
//! table and, once the rolling error rate crosses `error_rate_threshold`,
//! applies a self-healing action and records it in a read-only view other
//! stages can poll (`is_metric_denylisted`, `batch_size_override`,
//! `is_exporter_disabled`).

use crate::processors::metrics::ErrorMonitorMetrics;
use otap_df_config::error::Error as ConfigError;
use otap_df_engine::context::PipelineContext;
use otap_df_telemetry::metrics::MetricSet;
use otap_df_telemetry::otel_warn;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// A self-healing action taken in response to a matched error rule.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    /// Cap future batch sizes at `max_items` until reset.
    ReduceBatchSize {
        /// New batch-size ceiling.
        max_items: usize,
    },
    /// Stop emitting the named metric until the denylist is cleared.
    DropMetric {
        /// Metric name to suppress.
        name: String,
    },
    /// Stop calling the exporter entirely for `duration`.
    DisableExporterFor {
        /// How long to keep the exporter disabled.
        #[serde(with = "duration_secs")]
        duration: Duration,
    },
    /// Log the error but take no corrective action.
    AlertOnly,
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub(super) fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        d.as_secs().serialize(s)
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

/// One `(error message pattern, action)` entry in the rule table.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Rule {
    /// Regex matched against the reported error's message.
    pub pattern: String,
    /// Action applied when `pattern` matches and the error rate is over
    /// threshold.
    pub action: Action,
}

/// Configuration for [`ErrorMonitor`].
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// `(pattern -> action)` table, evaluated in order; the first match
    /// wins.
    pub rules: Vec<Rule>,
    /// Smoothed error rate (0.0-1.0) above which a matched rule's action is
    /// actually applied, rather than just counted. Avoids flapping on an
    /// isolated failure.
    pub error_rate_threshold: f64,
    /// EWMA smoothing factor for the error rate, in `(0.0, 1.0]`.
    pub ewma_alpha: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rules: vec![
                Rule {
                    pattern: "(?i)cardinality".to_owned(),
                    action: Action::DropMetric { name: String::new() },
                },
                Rule {
                    pattern: "(?i)schema|validation".to_owned(),
                    action: Action::AlertOnly,
                },
                Rule {
                    pattern: "(?i)auth|unauthorized|forbidden".to_owned(),
                    action: Action::DisableExporterFor {
                        duration: Duration::from_secs(300),
                    },
                },
                Rule {
                    pattern: "(?i)timeout|too large|payload".to_owned(),
                    action: Action::ReduceBatchSize { max_items: 100 },
                },
            ],
            error_rate_threshold: 0.1,
            ewma_alpha: 0.3,
        }
    }
}

/// An error report handed to [`ErrorMonitor::report_error`] by an exporter.
#[derive(Clone, Debug)]
pub struct ReportedError {
    /// Human-readable error message, matched against the rule table.
    pub message: String,
    /// The metric name the error concerned, if the backend's response
    /// identified one (e.g. a per-series cardinality rejection).
    pub metric_name: Option<String>,
    /// Size of the batch that failed.
    pub batch_size: usize,
}

struct State {
    error_rate_ewma: f64,
    denylisted_metrics: HashSet<String>,
    batch_size_override: Option<usize>,
    disabled_until: Option<Instant>,
}

impl State {
    fn new() -> Self {
        Self {
            error_rate_ewma: 0.0,
            denylisted_metrics: HashSet::new(),
            batch_size_override: None,
            disabled_until: None,
        }
    }
}

struct Inner {
    config: Config,
    compiled_rules: Vec<(Regex, Action)>,
    state: Mutex<State>,
    metrics: MetricSet<ErrorMonitorMetrics>,
}

/// Side-car integration-error monitor handle. See module docs and
/// `spec.md` §4.8. Cheap to `Clone` — every clone shares the same
/// underlying state, so exporters on different cores can each hold one.
#[derive(Clone)]
pub struct ErrorMonitor {
    inner: Arc<Inner>,
}

fn compile_rules(config: &Config) -> Vec<(Regex, Action)> {
    config
        .rules
        .iter()
        .filter_map(|r| Regex::new(&r.pattern).ok().map(|re| (re, r.action.clone())))
        .collect()
}

impl ErrorMonitor {
    /// Creates a new monitor from an explicit config.
    #[must_use]
    pub fn new(pipeline_ctx: PipelineContext, config: Config) -> Self {
        let compiled_rules = compile_rules(&config);
        Self {
            inner: Arc::new(Inner {
                config,
                compiled_rules,
                state: Mutex::new(State::new()),
                metrics: pipeline_ctx.register_metrics::<ErrorMonitorMetrics>(),
            }),
        }
    }

    /// Creates a new monitor from a JSON configuration object.
    pub fn from_config(pipeline_ctx: PipelineContext, config: &serde_json::Value) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_value(config.clone())
            .map_err(|e| ConfigError::InvalidUserConfig { error: e.to_string() })?;
        Ok(Self::new(pipeline_ctx, config))
    }

    /// Reports an exporter failure. Matches `error.message` against the
    /// rule table, updates the smoothed error rate, and applies the first
    /// matching rule's action once the rate is over
    /// `error_rate_threshold`. Returns the action applied, if any.
    pub fn report_error(&self, error: ReportedError) -> Option<Action> {
        self.inner.metrics.errors_reported.add(1);
        let mut state = self.inner.state.lock().expect("error monitor mutex poisoned");

        let alpha = self.inner.config.ewma_alpha;
        state.error_rate_ewma = alpha * 1.0 + (1.0 - alpha) * state.error_rate_ewma;

        if state.error_rate_ewma < self.inner.config.error_rate_threshold {
            return None;
        }

        let action = self
            .inner
            .compiled_rules
            .iter()
            .find(|(re, _)| re.is_match(&error.message))
            .map(|(_, action)| action.clone())?;

        match &action {
            Action::ReduceBatchSize { max_items } => {
                state.batch_size_override = Some(*max_items);
            }
            Action::DropMetric { name } => {
                let name = if name.is_empty() {
                    error.metric_name.clone().unwrap_or_default()
                } else {
                    name.clone()
                };
                if !name.is_empty() {
                    let _ = state.denylisted_metrics.insert(name);
                }
            }
            Action::DisableExporterFor { duration } => {
                state.disabled_until = Some(Instant::now() + *duration);
            }
            Action::AlertOnly => {
                otel_warn!("error_monitor.alert", message = error.message.as_str(), batch_size = error.batch_size);
            }
        }
        self.inner.metrics.actions_applied.add(1);
        Some(action)
    }

    /// Successful call; decays the error rate toward zero without applying
    /// any new action.
    pub fn report_success(&self) {
        let mut state = self.inner.state.lock().expect("error monitor mutex poisoned");
        let alpha = self.inner.config.ewma_alpha;
        state.error_rate_ewma *= 1.0 - alpha;
    }

    /// `true` if `name` is currently denylisted by a `drop_metric` action.
    #[must_use]
    pub fn is_metric_denylisted(&self, name: &str) -> bool {
        self.inner
            .state
            .lock()
            .expect("error monitor mutex poisoned")
            .denylisted_metrics
            .contains(name)
    }

    /// The current batch-size ceiling, if a `reduce_batch_size` action is
    /// in effect.
    #[must_use]
    pub fn batch_size_override(&self) -> Option<usize> {
        self.inner.state.lock().expect("error monitor mutex poisoned").batch_size_override
    }

    /// `true` while a `disable_exporter_for` action's window has not yet
    /// elapsed.
    #[must_use]
    pub fn is_exporter_disabled(&self) -> bool {
        self.inner
            .state
            .lock()
            .expect("error monitor mutex poisoned")
            .disabled_until
            .is_some_and(|until| Instant::now() < until)
    }

    /// Clears the denylist, batch-size override, and disable window. For
    /// operator-triggered recovery or tests.
    pub fn clear_overrides(&self) {
        let mut state = self.inner.state.lock().expect("error monitor mutex poisoned");
        state.denylisted_metrics.clear();
        state.batch_size_override = None;
        state.disabled_until = None;
        state.error_rate_ewma = 0.0;
    }

    #[cfg(test)]
    fn metrics_snapshot(&self) -> (u64, u64) {
        (self.inner.metrics.errors_reported.get(), self.inner.metrics.actions_applied.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use otap_df_engine::context::ControllerContext;
    use otap_df_telemetry::registry::MetricsRegistryHandle;

    fn test_pipeline_context() -> PipelineContext {
        let controller_ctx = ControllerContext::new(MetricsRegistryHandle::new());
        controller_ctx.pipeline_context_with("test_grp".into(), "test_pipeline".into(), 0, 1, 0)
    }

    fn test_monitor(config: Config) -> ErrorMonitor {
        ErrorMonitor::new(test_pipeline_context(), config)
    }

    fn err(message: &str) -> ReportedError {
        ReportedError {
            message: message.to_owned(),
            metric_name: None,
            batch_size: 10,
        }
    }

    #[test]
    fn isolated_failure_below_threshold_applies_no_action() {
        let monitor = test_monitor(Config {
            error_rate_threshold: 0.9,
            ewma_alpha: 0.1,
            ..Config::default()
        });
        let action = monitor.report_error(err("cardinality limit exceeded"));
        assert!(action.is_none());
    }

    #[test]
    fn cardinality_error_over_threshold_denylists_the_metric() {
        let monitor = test_monitor(Config {
            error_rate_threshold: 0.1,
            ewma_alpha: 1.0,
            ..Config::default()
        });
        let mut e = err("cardinality limit exceeded for series");
        e.metric_name = Some("postgresql.backends".to_owned());
        let action = monitor.report_error(e);
        assert_eq!(action, Some(Action::DropMetric { name: String::new() }));
        assert!(monitor.is_metric_denylisted("postgresql.backends"));
        assert_eq!(monitor.metrics_snapshot().1, 1);
    }

    #[test]
    fn timeout_error_reduces_batch_size() {
        let monitor = test_monitor(Config {
            error_rate_threshold: 0.1,
            ewma_alpha: 1.0,
            ..Config::default()
        });
        let _ = monitor.report_error(err("request timeout talking to backend"));
        assert_eq!(monitor.batch_size_override(), Some(100));
    }

    #[test]
    fn auth_error_disables_the_exporter() {
        let monitor = test_monitor(Config {
            error_rate_threshold: 0.1,
            ewma_alpha: 1.0,
            ..Config::default()
        });
        let _ = monitor.report_error(err("401 unauthorized"));
        assert!(monitor.is_exporter_disabled());
    }

    #[test]
    fn unmatched_error_applies_no_action_but_still_counts() {
        let monitor = test_monitor(Config {
            error_rate_threshold: 0.1,
            ewma_alpha: 1.0,
            ..Config::default()
        });
        let action = monitor.report_error(err("connection reset by peer"));
        assert!(action.is_none());
        assert_eq!(monitor.metrics_snapshot().0, 1);
    }

    #[test]
    fn success_decays_error_rate_back_under_threshold() {
        let monitor = test_monitor(Config {
            error_rate_threshold: 0.5,
            ewma_alpha: 0.5,
            ..Config::default()
        });
        let _ = monitor.report_error(err("schema violation: unknown field"));
        monitor.report_success();
        monitor.report_success();
        let action = monitor.report_error(err("schema violation: unknown field"));
        assert!(action.is_none());
    }

    #[test]
    fn clear_overrides_resets_all_state() {
        let monitor = test_monitor(Config {
            error_rate_threshold: 0.1,
            ewma_alpha: 1.0,
            ..Config::default()
        });
        let _ = monitor.report_error(err("request timeout"));
        assert!(monitor.batch_size_override().is_some());
        monitor.clear_overrides();
        assert!(monitor.batch_size_override().is_none());
        assert!(!monitor.is_exporter_disabled());
    }
}
