// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! The seven custom processing stages (`spec.md` §4.2-4.8).

/// Self-metrics shared by the seven custom processing stages.
pub mod metrics;

/// `spec.md` §4.2: load-adaptive sampling.
pub mod adaptive_sampler;

/// `spec.md` §4.3: per-database circuit breaking.
pub mod circuit_breaker;

/// `spec.md` §4.4: query-plan extraction and caching.
pub mod plan_extractor;

/// `spec.md` §4.5: query/transaction correlation into traces.
pub mod query_correlator;

/// `spec.md` §4.6: PII redaction and schema verification.
pub mod verification;

/// `spec.md` §4.7: cardinality-aware cost control.
pub mod cost_control;

/// `spec.md` §4.8: exporter error monitoring and self-healing.
pub mod error_monitor;

/// Lexical fingerprint shared by processors that key state off a log
/// record's rendered body rather than a SQL statement (e.g. the sampler,
/// which treats a query-log line the same way it treats a raw statement).
pub(crate) fn record_fingerprint(body: &str) -> String {
    otap_df_pdata::fingerprint_sql(body)
}
