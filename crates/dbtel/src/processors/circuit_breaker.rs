// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Per-database circuit breaker (`spec.md` §4.3): once a database's error
//! rate crosses a threshold, stop issuing new queries against it for a
//! recovery period rather than letting a struggling database pile up
//! timeouts, then probe it back in gradually.
//!
//! Unlike the other six stages in this module, the breaker is not a
//! pipeline node: pipeline instances run in independent threads with no
//! shared mutable state (`crates/controller/src/lib.rs`), so there is no
//! place downstream of a receiver where a post-hoc `Processor<Batch>`
//! could veto a query that already ran. Each of the three receivers in
//! `crate::receivers` instead owns one [`CircuitBreaker`] keyed by its own
//! [`DatabaseKey`] and calls [`CircuitBreaker::allow`]/[`CircuitBreaker::record`]
//! directly around its query calls.

use crate::db::DatabaseKey;
use crate::processors::metrics::CircuitBreakerMetrics;
use otap_df_engine::context::PipelineContext;
use otap_df_telemetry::metrics::MetricSet;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Configuration for [`CircuitBreaker`]. Field names follow `spec.md`
/// §4.3 directly.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Minimum calls observed in `observation_window` before a trip is
    /// considered.
    pub min_requests: u32,
    /// Error fraction, in `[0, 1]`, above which the breaker opens.
    pub failure_threshold: f64,
    /// Rolling window over which the error fraction is computed while
    /// Closed.
    pub observation_window: Duration,
    /// How long the breaker stays Open before allowing HalfOpen probes.
    pub recovery_timeout: Duration,
    /// Concurrent probe calls allowed while HalfOpen.
    pub probe_count: u32,
    /// Fraction, in `[0, 1]`, of probes that must succeed to close from
    /// HalfOpen.
    pub success_threshold: f64,
    /// A call slower than this counts as a failure even if it returned
    /// `Ok`.
    pub slow_threshold: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            min_requests: 20,
            failure_threshold: 0.5,
            observation_window: Duration::from_secs(30),
            recovery_timeout: Duration::from_secs(60),
            probe_count: 3,
            success_threshold: 0.66,
            slow_threshold: Duration::from_secs(1),
        }
    }
}

/// The observed result of a single call admitted by the breaker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The call returned successfully and within `slow_threshold`.
    Success,
    /// The call timed out, errored, or exceeded `slow_threshold`.
    Failure,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Closed,
    Open,
    HalfOpen,
}

struct BreakerState {
    state: State,
    window_start: Instant,
    calls: u32,
    errors: u32,
    opened_at: Instant,
    probe_attempts: u32,
    probe_successes: u32,
}

impl BreakerState {
    fn new() -> Self {
        let now = Instant::now();
        Self {
            state: State::Closed,
            window_start: now,
            calls: 0,
            errors: 0,
            opened_at: now,
            probe_attempts: 0,
            probe_successes: 0,
        }
    }
}

/// Per-database circuit breaker. See module docs and `spec.md` §4.3.
pub struct CircuitBreaker {
    config: Config,
    metrics: MetricSet<CircuitBreakerMetrics>,
    breakers: HashMap<DatabaseKey, BreakerState>,
}

impl CircuitBreaker {
    /// Creates a new breaker from an explicit config, registering its
    /// self-metrics with `pipeline_ctx` the same way a receiver or
    /// processor would.
    #[must_use]
    pub fn new(pipeline_ctx: PipelineContext, config: Config) -> Self {
        Self {
            config,
            metrics: pipeline_ctx.register_metrics::<CircuitBreakerMetrics>(),
            breakers: HashMap::new(),
        }
    }

    /// Creates a new breaker from a JSON configuration object, the way
    /// `from_config` works on the processors in this module.
    pub fn from_config(
        pipeline_ctx: PipelineContext,
        config: &serde_json::Value,
    ) -> Result<Self, otap_df_config::error::Error> {
        let config: Config = serde_json::from_value(config.clone())
            .map_err(|e| otap_df_config::error::Error::InvalidUserConfig { error: e.to_string() })?;
        Ok(Self::new(pipeline_ctx, config))
    }

    /// Classifies a call's result into an [`Outcome`], applying the
    /// `slow_threshold` latency rule on top of the raw success/failure.
    #[must_use]
    pub fn classify<T, E>(&self, result: &Result<T, E>, elapsed: Duration) -> Outcome {
        if result.is_err() || elapsed > self.config.slow_threshold {
            Outcome::Failure
        } else {
            Outcome::Success
        }
    }

    /// `Allow(dbKey) -> (bool, reason)` from `spec.md` §4.3's contract:
    /// whether a receiver may issue its next call against `key` right
    /// now, and why.
    pub fn allow(&mut self, key: DatabaseKey) -> (bool, &'static str) {
        let breaker = self.breakers.entry(key).or_insert_with(BreakerState::new);
        match breaker.state {
            State::Closed => {
                self.metrics.calls_allowed.add(1);
                (true, "closed")
            }
            State::Open => {
                if breaker.opened_at.elapsed() >= self.config.recovery_timeout {
                    breaker.state = State::HalfOpen;
                    breaker.probe_attempts = 1;
                    breaker.probe_successes = 0;
                    self.metrics.calls_allowed.add(1);
                    (true, "half_open_probe")
                } else {
                    self.metrics.calls_rejected.add(1);
                    (false, "open")
                }
            }
            State::HalfOpen => {
                if breaker.probe_attempts < self.config.probe_count {
                    breaker.probe_attempts += 1;
                    self.metrics.calls_allowed.add(1);
                    (true, "half_open_probe")
                } else {
                    self.metrics.calls_rejected.add(1);
                    (false, "half_open_saturated")
                }
            }
        }
    }

    /// `Record(dbKey, outcome)` from `spec.md` §4.3's contract: reports
    /// the observed result of a call previously admitted by `allow`.
    pub fn record(&mut self, key: DatabaseKey, outcome: Outcome) {
        let breaker = self.breakers.entry(key).or_insert_with(BreakerState::new);
        match breaker.state {
            State::Closed => {
                if breaker.window_start.elapsed() >= self.config.observation_window {
                    breaker.window_start = Instant::now();
                    breaker.calls = 0;
                    breaker.errors = 0;
                }
                breaker.calls += 1;
                if outcome == Outcome::Failure {
                    breaker.errors += 1;
                }
                if breaker.calls >= self.config.min_requests
                    && f64::from(breaker.errors) / f64::from(breaker.calls) >= self.config.failure_threshold
                {
                    breaker.state = State::Open;
                    breaker.opened_at = Instant::now();
                    self.metrics.opened.add(1);
                }
            }
            State::HalfOpen => {
                if outcome == Outcome::Success {
                    breaker.probe_successes += 1;
                }
                if breaker.probe_attempts >= self.config.probe_count {
                    let ratio = f64::from(breaker.probe_successes) / f64::from(breaker.probe_attempts);
                    if ratio >= self.config.success_threshold {
                        breaker.state = State::Closed;
                        breaker.calls = 0;
                        breaker.errors = 0;
                        breaker.window_start = Instant::now();
                        self.metrics.closed.add(1);
                    } else {
                        breaker.state = State::Open;
                        breaker.opened_at = Instant::now();
                        self.metrics.opened.add(1);
                    }
                }
            }
            // A recorded outcome while Open can only arrive from a stale
            // call that started before the breaker tripped; it cannot
            // move the state machine.
            State::Open => {}
        }
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

    fn key() -> DatabaseKey {
        DatabaseKey {
            db_system: "postgresql".to_owned(),
            db_name: "orders".to_owned(),
            server_address: "db1:5432".to_owned(),
        }
    }

    fn test_breaker(config: Config) -> CircuitBreaker {
        CircuitBreaker::new(test_pipeline_context(), config)
    }

    #[test]
    fn trips_open_after_failure_threshold() {
        let mut breaker = test_breaker(Config {
            min_requests: 4,
            failure_threshold: 0.5,
            ..Config::default()
        });
        let k = key();
        for _ in 0..4 {
            let (allowed, _) = breaker.allow(k.clone());
            assert!(allowed);
            breaker.record(k.clone(), Outcome::Failure);
        }
        let (allowed, reason) = breaker.allow(k.clone());
        assert!(!allowed);
        assert_eq!(reason, "open");
    }

    #[test]
    fn stays_closed_below_threshold() {
        let mut breaker = test_breaker(Config {
            min_requests: 4,
            failure_threshold: 0.5,
            ..Config::default()
        });
        let k = key();
        for i in 0..4 {
            let (allowed, _) = breaker.allow(k.clone());
            assert!(allowed);
            breaker.record(k.clone(), if i == 0 { Outcome::Failure } else { Outcome::Success });
        }
        let (allowed, reason) = breaker.allow(k);
        assert!(allowed);
        assert_eq!(reason, "closed");
    }

    #[test]
    fn half_open_closes_after_successful_probes() {
        let mut breaker = test_breaker(Config {
            min_requests: 2,
            failure_threshold: 0.5,
            recovery_timeout: Duration::from_millis(0),
            probe_count: 2,
            success_threshold: 0.5,
            ..Config::default()
        });
        let k = key();
        for _ in 0..2 {
            let (allowed, _) = breaker.allow(k.clone());
            assert!(allowed);
            breaker.record(k.clone(), Outcome::Failure);
        }
        assert!(!breaker.allow(k.clone()).0, "should be open immediately after the trip");

        // recovery_timeout is zero, so the next call probes HalfOpen.
        let (allowed, reason) = breaker.allow(k.clone());
        assert!(allowed);
        assert_eq!(reason, "half_open_probe");
        breaker.record(k.clone(), Outcome::Success);
        let (allowed, reason) = breaker.allow(k.clone());
        assert!(allowed);
        assert_eq!(reason, "half_open_probe");
        breaker.record(k.clone(), Outcome::Success);

        let (allowed, reason) = breaker.allow(k);
        assert!(allowed);
        assert_eq!(reason, "closed");
        assert_eq!(breaker.metrics.closed.get(), 1);
    }

    #[test]
    fn half_open_reopens_on_probe_failure() {
        let mut breaker = test_breaker(Config {
            min_requests: 1,
            failure_threshold: 0.5,
            recovery_timeout: Duration::from_millis(0),
            probe_count: 1,
            success_threshold: 1.0,
            ..Config::default()
        });
        let k = key();
        let (_, _) = breaker.allow(k.clone());
        breaker.record(k.clone(), Outcome::Failure);
        let (allowed, reason) = breaker.allow(k.clone());
        assert!(allowed, "first post-trip call probes HalfOpen");
        assert_eq!(reason, "half_open_probe");
        breaker.record(k.clone(), Outcome::Failure);
        let (allowed, reason) = breaker.allow(k);
        assert!(!allowed);
        assert_eq!(reason, "open");
    }
}
