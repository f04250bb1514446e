// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Self-metrics shared by the seven custom processing stages.

use otap_df_telemetry::instrument::{Counter, Gauge};
use otap_df_telemetry_macros::metric_set;

/// Metrics for [`crate::processors::adaptive_sampler::AdaptiveSampler`].
#[metric_set(name = "dbtel.adaptive_sampler.metrics")]
#[derive(Debug, Default, Clone)]
pub struct AdaptiveSamplerMetrics {
    /// Records kept after the sampling decision.
    #[metric(unit = "{record}")]
    pub records_kept: Counter<u64>,
    /// Records dropped by the sampling decision.
    #[metric(unit = "{record}")]
    pub records_dropped: Counter<u64>,
    /// Times a load spike was detected and `p` lowered immediately.
    #[metric(unit = "{spike}")]
    pub spikes_detected: Counter<u64>,
}

/// Metrics for [`crate::processors::circuit_breaker::CircuitBreaker`].
#[metric_set(name = "dbtel.circuit_breaker.metrics")]
#[derive(Debug, Default, Clone)]
pub struct CircuitBreakerMetrics {
    /// Calls allowed through while Closed or probing in HalfOpen.
    #[metric(unit = "{call}")]
    pub calls_allowed: Counter<u64>,
    /// Calls rejected while Open.
    #[metric(unit = "{call}")]
    pub calls_rejected: Counter<u64>,
    /// Transitions into the Open state.
    #[metric(unit = "{transition}")]
    pub opened: Counter<u64>,
    /// Transitions back into the Closed state.
    #[metric(unit = "{transition}")]
    pub closed: Counter<u64>,
}

/// Metrics for [`crate::processors::plan_extractor::PlanExtractor`].
#[metric_set(name = "dbtel.plan_extractor.metrics")]
#[derive(Debug, Default, Clone)]
pub struct PlanExtractorMetrics {
    /// Records whose plan was parsed successfully.
    #[metric(unit = "{record}")]
    pub parsed: Counter<u64>,
    /// Records whose plan failed to parse.
    #[metric(unit = "{record}")]
    pub parse_errors: Counter<u64>,
    /// Plan cache hits.
    #[metric(unit = "{lookup}")]
    pub cache_hits: Counter<u64>,
    /// Plan cache misses.
    #[metric(unit = "{lookup}")]
    pub cache_misses: Counter<u64>,
}

/// Metrics for [`crate::processors::query_correlator::QueryCorrelator`].
#[metric_set(name = "dbtel.query_correlator.metrics")]
#[derive(Debug, Default, Clone)]
pub struct QueryCorrelatorMetrics {
    /// Correlation windows opened.
    #[metric(unit = "{window}")]
    pub windows_opened: Counter<u64>,
    /// Correlation windows closed on a transaction boundary.
    #[metric(unit = "{window}")]
    pub windows_closed: Counter<u64>,
    /// Correlation windows evicted by the scavenger (timeout or size).
    #[metric(unit = "{window}")]
    pub windows_evicted: Counter<u64>,
    /// Trace batches emitted.
    #[metric(unit = "{batch}")]
    pub traces_emitted: Counter<u64>,
}

/// Metrics for [`crate::processors::verification::Verification`].
#[metric_set(name = "dbtel.verification.metrics")]
#[derive(Debug, Default, Clone)]
pub struct VerificationMetrics {
    /// Values redacted for matching the `email` PII category.
    #[metric(unit = "{value}")]
    pub pii_redacted_email: Counter<u64>,
    /// Values redacted for matching the `phone` PII category.
    #[metric(unit = "{value}")]
    pub pii_redacted_phone: Counter<u64>,
    /// Values redacted for matching the `ssn` PII category.
    #[metric(unit = "{value}")]
    pub pii_redacted_ssn: Counter<u64>,
    /// Values redacted for matching the `credit_card` PII category.
    #[metric(unit = "{value}")]
    pub pii_redacted_credit_card: Counter<u64>,
    /// Values redacted for matching an operator-supplied custom pattern.
    #[metric(unit = "{value}")]
    pub pii_redacted_custom: Counter<u64>,
    /// Records dropped for missing required attributes (strict mode).
    #[metric(unit = "{record}")]
    pub schema_dropped: Counter<u64>,
    /// Records marked invalid for missing required attributes (lenient
    /// mode).
    #[metric(unit = "{record}")]
    pub schema_invalid: Counter<u64>,
    /// Sanitisation leaks detected in `db.statement` after the plan
    /// extractor should already have anonymised it.
    #[metric(unit = "{leak}")]
    pub sanitisation_leaks: Counter<u64>,
}

/// Metrics for [`crate::processors::cost_control::CostControl`].
#[metric_set(name = "dbtel.cost_control.metrics")]
#[derive(Debug, Default, Clone)]
pub struct CostControlMetrics {
    /// Points dropped for being over budget (priority-ordered shedding).
    #[metric(unit = "{point}")]
    pub points_dropped: Counter<u64>,
    /// Points downsampled (thinned rather than dropped outright) when over
    /// budget in `downsample` mode.
    #[metric(unit = "{point}")]
    pub points_downsampled: Counter<u64>,
    /// Attributes pruned to `other` due to cardinality.
    #[metric(unit = "{attribute}")]
    pub attributes_pruned: Counter<u64>,
    /// Points rate-limited by the token bucket.
    #[metric(unit = "{point}")]
    pub rate_limited: Counter<u64>,
    /// Most recent global distinct-series cardinality estimate.
    #[metric(unit = "{series}")]
    pub cardinality_estimate: Gauge<i64>,
    /// Most recent rate-limit budget utilisation, as a percentage (0-100).
    #[metric(unit = "%")]
    pub budget_used_percent: Gauge<i64>,
}

/// Metrics for [`crate::processors::error_monitor::ErrorMonitor`].
#[metric_set(name = "dbtel.error_monitor.metrics")]
#[derive(Debug, Default, Clone)]
pub struct ErrorMonitorMetrics {
    /// Exporter error reports received.
    #[metric(unit = "{report}")]
    pub errors_reported: Counter<u64>,
    /// Self-healing actions applied.
    #[metric(unit = "{action}")]
    pub actions_applied: Counter<u64>,
}
