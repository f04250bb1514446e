// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Typed data model for the database telemetry collector.
//!
//! This is the `PData` payload that instantiates the generic
//! `otap_df_engine` receiver/processor/exporter traits for every node in
//! `otap-df-dbtel`: a sum type of the three signal batches (metrics, logs,
//! traces), each an ordered sequence of typed records carrying a resource
//! attribute set plus per-record attributes.

use crate::{SpanID, TraceID};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::time::{SystemTime, UNIX_EPOCH};
use xxhash_rust::xxh3::xxh3_64;

/// A scalar attribute value. Attribute sets are restricted to scalars so
/// canonicalization (sorted key=value pairs) is well-defined and cheap to
/// hash.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    /// UTF-8 string.
    String(Cow<'static, str>),
    /// Signed 64-bit integer.
    I64(i64),
    /// 64-bit float.
    F64(f64),
    /// Boolean.
    Bool(bool),
}

impl AttributeValue {
    /// Returns the value as a string slice when it is the `String` variant.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s.as_ref()),
            _ => None,
        }
    }

    fn canonical_append(&self, out: &mut String) {
        match self {
            AttributeValue::String(s) => out.push_str(s),
            AttributeValue::I64(v) => out.push_str(&v.to_string()),
            AttributeValue::F64(v) => out.push_str(&v.to_string()),
            AttributeValue::Bool(v) => out.push_str(&v.to_string()),
        }
    }
}

impl From<&'static str> for AttributeValue {
    fn from(value: &'static str) -> Self {
        AttributeValue::String(Cow::Borrowed(value))
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::String(Cow::Owned(value))
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::I64(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::F64(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Bool(value)
    }
}

/// A sorted, canonicalizable set of scalar key/value attributes.
///
/// Used both for resource-level attributes (stable for the lifetime of a
/// source) and for per-point/per-record attributes (transient). Two
/// attribute sets are equal iff their canonical forms are byte-equal; this
/// is what powers cardinality counting and cache keys (`spec.md` §3).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributeSet {
    entries: Vec<(Cow<'static, str>, AttributeValue)>,
}

impl AttributeSet {
    /// Creates an empty attribute set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a key's value, keeping entries sorted by key.
    pub fn insert(&mut self, key: impl Into<Cow<'static, str>>, value: impl Into<AttributeValue>) {
        let key = key.into();
        let value = value.into();
        match self.entries.binary_search_by(|(k, _)| k.cmp(&key)) {
            Ok(idx) => self.entries[idx].1 = value,
            Err(idx) => self.entries.insert(idx, (key, value)),
        }
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, key: impl Into<Cow<'static, str>>, value: impl Into<AttributeValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Looks up a key's value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&AttributeValue> {
        self.entries
            .binary_search_by(|(k, _)| k.as_ref().cmp(key))
            .ok()
            .map(|idx| &self.entries[idx].1)
    }

    /// Returns `true` if the set contains `key`.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Iterates entries in canonical (sorted) order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttributeValue)> {
        self.entries.iter().map(|(k, v)| (k.as_ref(), v))
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` if empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merges `other` into a copy of `self`, `other` winning on key conflicts.
    #[must_use]
    pub fn merged_with(&self, other: &AttributeSet) -> AttributeSet {
        let mut merged = self.clone();
        for (k, v) in other.iter() {
            merged.insert(k.to_owned(), v.clone());
        }
        merged
    }

    /// Canonical string form: `key=value` pairs, sorted by key, joined by
    /// `,`. Entries are already stored sorted, so this is just a linear
    /// join; used as the hashing input for cardinality and cache keys.
    #[must_use]
    pub fn canonical_form(&self) -> String {
        let mut out = String::new();
        for (i, (k, v)) in self.entries.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            out.push_str(k);
            out.push('=');
            v.canonical_append(&mut out);
        }
        out
    }

    /// 64-bit hash of the canonical form (xxh3), used for cardinality
    /// sketches and cache keys.
    #[must_use]
    pub fn canonical_hash(&self) -> u64 {
        xxh3_64(self.canonical_form().as_bytes())
    }
}

/// Kind of a metric point, carrying enough shape information to detect
/// counter resets (`spec.md` §3 invariant 2) without re-deriving it at
/// every consumer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum MetricKind {
    /// An instantaneous measurement.
    Gauge,
    /// An accumulating sum.
    Sum {
        /// Whether the sum is expected to only increase absent a reset.
        monotonic: bool,
    },
    /// A distribution of values bucketed by explicit bounds.
    Histogram {
        /// Upper bound of each bucket, ascending.
        bounds: Vec<f64>,
    },
}

/// A single observation within a `Metric`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataPoint {
    /// Observation time, milliseconds since epoch.
    pub timestamp_ms: i64,
    /// Start time of the counting interval for `Sum` metrics.
    pub start_timestamp_ms: Option<i64>,
    /// Scalar value for `Gauge`/`Sum` points.
    pub value: f64,
    /// Per-bucket counts, aligned with the metric's `Histogram` bounds plus
    /// an implicit overflow bucket.
    pub bucket_counts: Vec<u64>,
    /// Set when this point's value is strictly less than the previous
    /// value observed in the same series within the same start-time epoch
    /// (`spec.md` §3 invariant: counter reset).
    pub is_reset: bool,
    /// Point-level (transient) attributes.
    pub attributes: AttributeSet,
}

impl DataPoint {
    /// Creates a gauge/sum-style point with no histogram buckets.
    #[must_use]
    pub fn scalar(timestamp_ms: i64, value: f64) -> Self {
        Self {
            timestamp_ms,
            start_timestamp_ms: None,
            value,
            bucket_counts: Vec::new(),
            is_reset: false,
            attributes: AttributeSet::new(),
        }
    }

    /// Builder-style attribute insert.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<Cow<'static, str>>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(key, value);
        self
    }
}

/// One named metric with its resource and its observed points.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Metric {
    /// Stable, dotted name, e.g. `postgresql.backends`.
    pub name: Cow<'static, str>,
    /// Measurement kind.
    pub kind: MetricKind,
    /// Unit string, e.g. `By`, `1`, `ms`.
    pub unit: Cow<'static, str>,
    /// Process-level resource attributes. Must contain `service.name`; a
    /// database-signal resource must additionally contain `db.system` and
    /// `db.name` (`spec.md` §3).
    pub resource: AttributeSet,
    /// Observed points.
    pub points: Vec<DataPoint>,
}

impl Metric {
    /// Creates a new metric with no points yet.
    #[must_use]
    pub fn new(name: impl Into<Cow<'static, str>>, kind: MetricKind, unit: impl Into<Cow<'static, str>>, resource: AttributeSet) -> Self {
        Self {
            name: name.into(),
            kind,
            unit: unit.into(),
            resource,
            points: Vec::new(),
        }
    }

    /// Time-series identity: `(metric.name, resource ∪ point-attrs)` for
    /// `point`. Used for cardinality tracking (`spec.md` §3, §4.7).
    #[must_use]
    pub fn series_key(&self, point: &DataPoint) -> String {
        let merged = self.resource.merged_with(&point.attributes);
        format!("{}|{}", self.name, merged.canonical_form())
    }
}

/// An ordered sequence of metrics observed together.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MetricBatch {
    /// Metrics in this batch, in observation order.
    pub metrics: Vec<Metric>,
    /// Time the receiver began this collection cycle, milliseconds since
    /// epoch. A `DataPoint` timestamp more than one collection interval
    /// before this is "stale" per `spec.md` §3 and must be dropped, not
    /// exported.
    pub observed_at_ms: i64,
}

/// Severity of a `LogRecord`, following the OTLP severity number scale
/// collapsed to the commonly used named levels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    /// Trace-level detail.
    Trace,
    /// Debug-level detail.
    Debug,
    /// Informational.
    Info,
    /// Warning.
    Warn,
    /// Error.
    Error,
    /// Fatal / unrecoverable.
    Fatal,
}

/// A single log / event record. Used for query-execution records and
/// execution-plan snapshots (`spec.md` §3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogRecord {
    /// Observation time, milliseconds since epoch.
    pub timestamp_ms: i64,
    /// Severity level.
    pub severity: Severity,
    /// Free-form body. For query-execution records this starts out as the
    /// raw SQL text and is replaced in place by the plan extractor
    /// (`spec.md` §4.4) with the normalised fingerprint before export.
    pub body: String,
    /// Record-level attributes.
    pub attributes: AttributeSet,
    /// Resource this record was observed from.
    pub resource: AttributeSet,
}

impl LogRecord {
    /// Creates a new log record with empty attributes.
    #[must_use]
    pub fn new(timestamp_ms: i64, severity: Severity, body: impl Into<String>, resource: AttributeSet) -> Self {
        Self {
            timestamp_ms,
            severity,
            body: body.into(),
            attributes: AttributeSet::new(),
            resource,
        }
    }

    /// Builder-style attribute insert.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<Cow<'static, str>>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(key, value);
        self
    }
}

/// An ordered sequence of log records.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LogBatch {
    /// Records, in observation order.
    pub records: Vec<LogRecord>,
}

/// Span status, following OTLP's tri-state model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpanStatus {
    /// Not explicitly set.
    Unset,
    /// Completed successfully.
    Ok,
    /// Completed with an error.
    Error,
}

/// A span reconstructed by query correlation (`spec.md` §4.5) or received
/// directly.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Span {
    /// Trace this span belongs to.
    #[serde(with = "trace_id_serde")]
    pub trace_id: TraceID,
    /// This span's own id.
    #[serde(with = "span_id_serde")]
    pub span_id: SpanID,
    /// Parent span id, if any.
    #[serde(with = "opt_span_id_serde")]
    pub parent_span_id: Option<SpanID>,
    /// Span name — for correlated query spans this is `query.fingerprint`.
    pub name: String,
    /// Start time, milliseconds since epoch.
    pub start_time_ms: i64,
    /// End time, milliseconds since epoch.
    pub end_time_ms: i64,
    /// Span attributes.
    pub attributes: AttributeSet,
    /// Completion status.
    pub status: SpanStatus,
    /// Resource the span was produced from.
    pub resource: AttributeSet,
}

/// An ordered sequence of spans, emitted when query correlation closes a
/// transaction window (`spec.md` §4.5).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TraceBatch {
    /// Spans, ordered by start time with ties broken by insertion order.
    pub spans: Vec<Span>,
}

/// The `PData` payload instantiating the generic engine traits for every
/// `otap-df-dbtel` node: one of the three signal batches.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Batch {
    /// A metrics batch.
    Metrics(MetricBatch),
    /// A logs batch.
    Logs(LogBatch),
    /// A traces batch.
    Traces(TraceBatch),
}

impl Batch {
    /// Returns `true` if this batch carries no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Batch::Metrics(b) => b.metrics.is_empty(),
            Batch::Logs(b) => b.records.is_empty(),
            Batch::Traces(b) => b.spans.is_empty(),
        }
    }

    /// Number of top-level records (metrics, log records, or spans).
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Batch::Metrics(b) => b.metrics.len(),
            Batch::Logs(b) => b.records.len(),
            Batch::Traces(b) => b.spans.len(),
        }
    }

    /// Short name of the carried signal type, for logging/metrics labels.
    #[must_use]
    pub fn signal_name(&self) -> &'static str {
        match self {
            Batch::Metrics(_) => "metrics",
            Batch::Logs(_) => "logs",
            Batch::Traces(_) => "traces",
        }
    }
}

mod trace_id_serde {
    use super::TraceID;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(id: &TraceID, s: S) -> Result<S::Ok, S::Error> {
        let bytes: Vec<u8> = (*id).into();
        s.serialize_bytes(&bytes)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<TraceID, D::Error> {
        let bytes = Vec::<u8>::deserialize(d)?;
        TraceID::try_from(bytes.as_slice()).map_err(serde::de::Error::custom)
    }
}

mod span_id_serde {
    use super::SpanID;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(id: &SpanID, s: S) -> Result<S::Ok, S::Error> {
        let bytes: Vec<u8> = (*id).into();
        s.serialize_bytes(&bytes)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<SpanID, D::Error> {
        let bytes = Vec::<u8>::deserialize(d)?;
        SpanID::try_from(bytes.as_slice()).map_err(serde::de::Error::custom)
    }
}

mod opt_span_id_serde {
    use super::SpanID;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(id: &Option<SpanID>, s: S) -> Result<S::Ok, S::Error> {
        match id {
            Some(id) => {
                let bytes: Vec<u8> = (*id).into();
                s.serialize_some(&bytes)
            }
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<SpanID>, D::Error> {
        let bytes = Option::<Vec<u8>>::deserialize(d)?;
        bytes
            .map(|b| SpanID::try_from(b.as_slice()).map_err(serde::de::Error::custom))
            .transpose()
    }
}

/// Returns the current wall-clock time in milliseconds since the epoch.
///
/// Centralised so processors/receivers have one place to stub time in
/// tests rather than calling `SystemTime::now()` ad hoc.
#[must_use]
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Normalises a SQL statement into a query fingerprint: literal constants
/// replaced with a placeholder, whitespace collapsed, identifiers
/// preserved (`spec.md` §3, §4.4 step 1).
///
/// This is a best-effort lexical normalisation, not a full SQL parser:
/// numeric literals, single/double-quoted strings, and `$n`/`?`/`:name`
/// placeholders are all replaced with `?`; runs of whitespace collapse to
/// one space.
#[must_use]
pub fn fingerprint_sql(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.char_indices().peekable();
    let mut last_was_space = false;
    while let Some((_, c)) = chars.next() {
        match c {
            '\'' | '"' => {
                let quote = c;
                for (_, c2) in chars.by_ref() {
                    if c2 == quote {
                        break;
                    }
                }
                out.push('?');
                last_was_space = false;
            }
            c if c.is_ascii_digit() => {
                while matches!(chars.peek(), Some((_, c2)) if c2.is_ascii_digit() || *c2 == '.') {
                    let _ = chars.next();
                }
                out.push('?');
                last_was_space = false;
            }
            c if c.is_whitespace() => {
                if !last_was_space {
                    out.push(' ');
                    last_was_space = true;
                }
            }
            _ => {
                out.push(c);
                last_was_space = false;
            }
        }
    }
    out.trim().to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_set_stays_sorted_and_canonicalizes() {
        let mut attrs = AttributeSet::new();
        attrs.insert("db.name", "orders");
        attrs.insert("service.name", "collector");
        attrs.insert("db.system", "postgresql");
        assert_eq!(
            attrs.canonical_form(),
            "db.name=orders,db.system=postgresql,service.name=collector"
        );
    }

    #[test]
    fn equal_attribute_sets_hash_equal() {
        let a = AttributeSet::new().with("a", 1_i64).with("b", "x");
        let b = AttributeSet::new().with("b", "x").with("a", 1_i64);
        assert_eq!(a.canonical_hash(), b.canonical_hash());
    }

    #[test]
    fn fingerprint_replaces_literals_and_collapses_whitespace() {
        let sql = "SELECT  *   FROM orders WHERE id = 42 AND name = 'bob'";
        assert_eq!(
            fingerprint_sql(sql),
            "SELECT * FROM orders WHERE id = ? AND name = ?"
        );
    }

    #[test]
    fn series_key_combines_name_resource_and_point_attributes() {
        let resource = AttributeSet::new().with("service.name", "collector");
        let metric = Metric::new("postgresql.backends", MetricKind::Gauge, "1", resource);
        let point = DataPoint::scalar(0, 3.0).with_attribute("db.name", "orders");
        assert_eq!(
            metric.series_key(&point),
            "postgresql.backends|db.name=orders,service.name=collector"
        );
    }
}
