// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! PII redaction and schema verification (`spec.md` §4.6): scrubs
//! likely-sensitive values out of every string-typed attribute, log body,
//! and span name before they can leave the collector, and enforces that
//! every record carries the attributes required for it to be useful
//! downstream.

use crate::processors::metrics::VerificationMetrics;
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
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::sync::LazyLock;

/// The URN for the verification processor.
pub const VERIFICATION_URN: &str = "urn:otel:dbtel:verification:processor";

/// The attribute the plan extractor is expected to have already replaced
/// with a fingerprint (`spec.md` §4.4). A PII hit here after that stage has
/// run is a sanitisation leak, not a routine redaction.
const STATEMENT_ATTRIBUTE: &str = "db.statement";

/// How a record failing required-attribute verification is handled.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SchemaPolicy {
    /// Drop the record entirely.
    Strict,
    /// Keep the record but mark it with `db.schema.invalid = true`.
    Lenient,
}

/// A built-in PII category, each backed by a fixed detection pattern.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PiiCategory {
    /// Email addresses.
    Email,
    /// Phone numbers (NANP-style).
    Phone,
    /// US social security numbers.
    Ssn,
    /// Credit card-shaped digit runs.
    CreditCard,
    /// Operator-supplied regexes from `custom_patterns`, plus `deny_attributes` hits.
    Custom,
}

/// Configuration for the PII scanner.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PiiDetectionConfig {
    /// Master switch for redaction. Schema verification still runs when
    /// `false`.
    pub enabled: bool,
    /// Which built-in categories to scan for.
    pub categories: Vec<PiiCategory>,
    /// Extra regexes, each reported under the `custom` category.
    pub custom_patterns: Vec<String>,
}

impl Default for PiiDetectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            categories: vec![PiiCategory::Email, PiiCategory::Phone, PiiCategory::Ssn, PiiCategory::CreditCard],
            custom_patterns: Vec::new(),
        }
    }
}

/// Configuration for [`Verification`].
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Master switch for the whole processor; `false` passes batches through
    /// untouched.
    pub enabled: bool,
    /// PII scanning configuration.
    pub pii_detection: PiiDetectionConfig,
    /// String attribute values longer than this are truncated after
    /// redaction. `0` disables truncation.
    pub max_field_length: usize,
    /// Resource attributes that must be present, per signal.
    pub required_attributes: Vec<String>,
    /// What to do with a record missing a required attribute.
    pub schema_policy: SchemaPolicy,
    /// Attribute keys whose string values are always redacted outright,
    /// rather than scanned for PII patterns.
    pub deny_attributes: Vec<String>,
    /// Attribute keys whose values are replaced with a stable truncated
    /// SHA-256 checksum instead of a full redaction, so join/grouping keys
    /// stay usable without leaving the original value in plaintext.
    pub checksum_attributes: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enabled: true,
            pii_detection: PiiDetectionConfig::default(),
            max_field_length: 4096,
            required_attributes: vec!["service.name".to_owned(), "db.system".to_owned()],
            schema_policy: SchemaPolicy::Lenient,
            deny_attributes: vec!["db.user.password".to_owned()],
            checksum_attributes: Vec::new(),
        }
    }
}

// Conservative literal patterns; `spec.md` §4.6 leaves exact detection
// regexes unspecified. Deliberately narrow to avoid over-redacting
// legitimate SQL literals and identifiers.
static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").expect("static regex")
});
static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\+?1?[-. ]?\(?\d{3}\)?[-. ]?\d{3}[-. ]?\d{4}\b").expect("static regex"));
static SSN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").expect("static regex"));
static CREDIT_CARD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{4}[- ]?\d{4}[- ]?\d{4}[- ]?\d{4}\b").expect("static regex"));

/// Replaces every match of `re` in `text` with `[REDACTED:<label>]`,
/// returning the number of matches.
fn apply_pattern(text: &mut String, re: &Regex, label: &str) -> u64 {
    let mut count = 0u64;
    let replaced = re.replace_all(text, |_: &regex::Captures| {
        count += 1;
        format!("[REDACTED:{label}]")
    });
    if count > 0 {
        *text = replaced.into_owned();
    }
    count
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// First 16 hex characters of the value's SHA-256 digest.
fn checksum(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    hex_encode(&hasher.finalize())[..16].to_owned()
}

/// PII redaction and schema verification processor. See module docs and
/// `spec.md` §4.6.
pub struct Verification {
    config: Config,
    metrics: MetricSet<VerificationMetrics>,
    custom_patterns: Vec<Regex>,
}

/// Factory function to create a [`Verification`] processor.
pub fn create_verification(
    pipeline_ctx: PipelineContext,
    node: NodeId,
    node_config: Arc<NodeUserConfig>,
    processor_config: &ProcessorConfig,
) -> Result<ProcessorWrapper<Batch>, ConfigError> {
    Ok(ProcessorWrapper::local(
        Verification::from_config(pipeline_ctx, &node_config.config)?,
        node,
        node_config,
        processor_config,
    ))
}

/// Registers [`Verification`] as a dbtel processor factory.
#[allow(unsafe_code)]
#[distributed_slice(DBTEL_PROCESSOR_FACTORIES)]
pub static VERIFICATION_FACTORY: otap_df_engine::ProcessorFactory<Batch> = otap_df_engine::ProcessorFactory {
    name: VERIFICATION_URN,
    create: |pipeline_ctx, node, node_config, proc_cfg| {
        create_verification(pipeline_ctx, node, node_config, proc_cfg)
    },
};

fn compile_custom_patterns(config: &Config) -> Vec<Regex> {
    config
        .pii_detection
        .custom_patterns
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
}

impl Verification {
    /// Creates a new processor from an explicit config.
    #[must_use]
    pub fn new(pipeline_ctx: PipelineContext, config: Config) -> Self {
        let custom_patterns = compile_custom_patterns(&config);
        Self {
            config,
            metrics: pipeline_ctx.register_metrics::<VerificationMetrics>(),
            custom_patterns,
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
    pub fn metrics(&self) -> &MetricSet<VerificationMetrics> {
        &self.metrics
    }

    fn record_category_hits(&mut self, category: PiiCategory, hits: u64) {
        if hits == 0 {
            return;
        }
        match category {
            PiiCategory::Email => self.metrics.pii_redacted_email.add(hits),
            PiiCategory::Phone => self.metrics.pii_redacted_phone.add(hits),
            PiiCategory::Ssn => self.metrics.pii_redacted_ssn.add(hits),
            PiiCategory::CreditCard => self.metrics.pii_redacted_credit_card.add(hits),
            PiiCategory::Custom => self.metrics.pii_redacted_custom.add(hits),
        }
    }

    /// Scans `value` for every enabled PII category, substituting
    /// `[REDACTED:<category>]` for each match. Returns the redacted string
    /// when at least one substitution was made.
    fn redact_value(&mut self, value: &str) -> Option<String> {
        if !self.config.pii_detection.enabled {
            return None;
        }
        let mut out = value.to_owned();
        let mut hits_by_category = Vec::new();
        for category in &self.config.pii_detection.categories {
            let hits = match category {
                PiiCategory::Email => apply_pattern(&mut out, &EMAIL_RE, "email"),
                PiiCategory::Phone => apply_pattern(&mut out, &PHONE_RE, "phone"),
                PiiCategory::Ssn => apply_pattern(&mut out, &SSN_RE, "ssn"),
                PiiCategory::CreditCard => apply_pattern(&mut out, &CREDIT_CARD_RE, "credit_card"),
                PiiCategory::Custom => self
                    .custom_patterns
                    .iter()
                    .map(|re| apply_pattern(&mut out, re, "custom"))
                    .sum(),
            };
            if hits > 0 {
                hits_by_category.push((*category, hits));
            }
        }
        for (category, hits) in &hits_by_category {
            self.record_category_hits(*category, *hits);
        }
        if hits_by_category.is_empty() {
            None
        } else {
            Some(out)
        }
    }

    /// Redacts `text` as a free-form field (log body, span name). Returns
    /// the redacted text and whether anything was found in `db.statement`
    /// worth counting as a sanitisation leak is the caller's concern, since
    /// only attribute-scanning knows the owning key.
    fn redact_free_text(&mut self, text: &str) -> Option<String> {
        self.redact_value(text)
    }

    fn truncate(&self, value: String) -> String {
        if self.config.max_field_length == 0 || value.len() <= self.config.max_field_length {
            return value;
        }
        let mut truncated: String = value.chars().take(self.config.max_field_length).collect();
        truncated.push_str("...(truncated)");
        truncated
    }

    /// Scans every string-valued attribute in `attrs`, redacting PII,
    /// applying the deny list and checksum list, and truncating overlong
    /// values. Returns `true` if `db.statement` still contained a PII hit
    /// after redaction was applied, which the caller counts as a
    /// sanitisation leak.
    fn scan_attributes(&mut self, attrs: &mut AttributeSet) -> bool {
        let candidates: Vec<(String, String)> = attrs
            .iter()
            .filter_map(|(k, v)| v.as_str().map(|s| (k.to_owned(), s.to_owned())))
            .collect();

        let mut leaked_statement = false;
        for (key, value) in candidates {
            if self.config.checksum_attributes.contains(&key) {
                attrs.insert(key, checksum(&value));
                continue;
            }
            if self.config.deny_attributes.contains(&key) {
                if !value.is_empty() {
                    attrs.insert(key, "[REDACTED:custom]".to_owned());
                    self.record_category_hits(PiiCategory::Custom, 1);
                }
                continue;
            }
            if let Some(redacted) = self.redact_value(&value) {
                if key == STATEMENT_ATTRIBUTE {
                    leaked_statement = true;
                }
                attrs.insert(key, self.truncate(redacted));
            } else if self.config.max_field_length > 0 && value.len() > self.config.max_field_length {
                attrs.insert(key, self.truncate(value));
            }
        }
        leaked_statement
    }

    fn has_required_attributes(&self, resource: &AttributeSet) -> bool {
        self.config.required_attributes.iter().all(|k| resource.contains_key(k))
    }

    fn verify_batch(&mut self, mut batch: Batch) -> Batch {
        if !self.config.enabled {
            return batch;
        }
        match &mut batch {
            Batch::Metrics(mb) => {
                mb.metrics.retain_mut(|m| {
                    for point in &mut m.points {
                        let _ = self.scan_attributes(&mut point.attributes);
                    }
                    self.verify_resource(&mut m.resource)
                });
            }
            Batch::Logs(lb) => {
                lb.records.retain_mut(|r| {
                    if let Some(redacted) = self.redact_free_text(&r.body) {
                        r.body = self.truncate(redacted);
                    }
                    let leaked = self.scan_attributes(&mut r.attributes);
                    if leaked {
                        self.metrics.sanitisation_leaks.add(1);
                    }
                    self.verify_resource(&mut r.resource)
                });
            }
            Batch::Traces(tb) => {
                tb.spans.retain_mut(|s| {
                    if let Some(redacted) = self.redact_free_text(&s.name) {
                        s.name = self.truncate(redacted);
                    }
                    let leaked = self.scan_attributes(&mut s.attributes);
                    if leaked {
                        self.metrics.sanitisation_leaks.add(1);
                    }
                    self.verify_resource(&mut s.resource)
                });
            }
        }
        batch
    }

    /// Test-only access to batch verification, for integration tests that
    /// exercise the processing stage without the pipeline-wiring machinery.
    #[cfg(feature = "testing")]
    pub fn verify_for_test(&mut self, batch: Batch) -> Batch {
        self.verify_batch(batch)
    }

    /// Returns `false` when the record should be dropped under the strict
    /// policy; always returns `true` under the lenient policy (marking the
    /// resource invalid instead).
    fn verify_resource(&mut self, resource: &mut AttributeSet) -> bool {
        let leaked = self.scan_attributes(resource);
        if leaked {
            self.metrics.sanitisation_leaks.add(1);
        }

        if self.has_required_attributes(resource) {
            return true;
        }

        match self.config.schema_policy {
            SchemaPolicy::Strict => {
                self.metrics.schema_dropped.add(1);
                false
            }
            SchemaPolicy::Lenient => {
                resource.insert("db.schema.invalid", true);
                self.metrics.schema_invalid.add(1);
                true
            }
        }
    }
}

#[async_trait(?Send)]
impl local::Processor<Batch> for Verification {
    async fn process(
        &mut self,
        msg: Message<Batch>,
        effect_handler: &mut local::EffectHandler<Batch>,
    ) -> Result<(), Error> {
        match msg {
            Message::Control(NodeControlMsg::Config { config }) => {
                if let Ok(new_config) = serde_json::from_value::<Config>(config) {
                    self.custom_patterns = compile_custom_patterns(&new_config);
                    self.config = new_config;
                }
                Ok(())
            }
            Message::Control(_) => Ok(()),
            Message::PData(batch) => {
                let verified = self.verify_batch(batch);
                effect_handler.send_message(verified).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use otap_df_engine::context::ControllerContext;
    use otap_df_pdata::{LogBatch, LogRecord, Severity};
    use otap_df_telemetry::registry::MetricsRegistryHandle;

    fn test_pipeline_context() -> PipelineContext {
        let controller_ctx = ControllerContext::new(MetricsRegistryHandle::new());
        controller_ctx.pipeline_context_with("test_grp".into(), "test_pipeline".into(), 0, 1, 0)
    }

    fn test_verifier(config: Config) -> Verification {
        Verification::new(test_pipeline_context(), config)
    }

    // spec.md §8 scenario S3: a log body containing a raw email address is
    // redacted in the `[REDACTED:<category>]` format and counted under the
    // matching per-category metric.
    #[test]
    fn scenario_s3_email_in_body_is_redacted_with_category_tag() {
        let mut verifier = test_verifier(Config::default());
        let resource = AttributeSet::new().with("service.name", "collector").with("db.system", "postgresql");
        let batch = Batch::Logs(LogBatch {
            records: vec![LogRecord::new(0, Severity::Info, "user email: alice@example.com", resource)],
        });
        let verified = verifier.verify_batch(batch);
        if let Batch::Logs(lb) = verified {
            assert_eq!(lb.records[0].body, "user email: [REDACTED:email]");
        } else {
            unreachable!()
        }
        assert_eq!(verifier.metrics.pii_redacted_email.get(), 1);
    }

    #[test]
    fn redacts_credit_card_shaped_digit_runs() {
        let mut verifier = test_verifier(Config::default());
        let resource = AttributeSet::new().with("service.name", "collector").with("db.system", "postgresql");
        let batch = Batch::Logs(LogBatch {
            records: vec![LogRecord::new(0, Severity::Info, "card 4111 1111 1111 1111", resource)],
        });
        let verified = verifier.verify_batch(batch);
        if let Batch::Logs(lb) = verified {
            assert!(!lb.records[0].body.contains("4111"));
        } else {
            unreachable!()
        }
        assert_eq!(verifier.metrics.pii_redacted_credit_card.get(), 1);
    }

    #[test]
    fn pii_scanning_covers_record_attributes_not_just_body() {
        let mut verifier = test_verifier(Config::default());
        let resource = AttributeSet::new().with("service.name", "collector").with("db.system", "postgresql");
        let batch = Batch::Logs(LogBatch {
            records: vec![LogRecord::new(0, Severity::Info, "SELECT 1", resource)
                .with_attribute("db.user.email", "bob@example.com")],
        });
        let verified = verifier.verify_batch(batch);
        if let Batch::Logs(lb) = verified {
            assert_eq!(lb.records[0].attributes.get("db.user.email").unwrap().as_str(), Some("[REDACTED:email]"));
        } else {
            unreachable!()
        }
    }

    // A PII pattern surviving in `db.statement` means the plan extractor's
    // fingerprinting should have already scrubbed it; count it as a leak.
    #[test]
    fn pii_in_statement_attribute_counts_as_a_sanitisation_leak() {
        let mut verifier = test_verifier(Config::default());
        let resource = AttributeSet::new().with("service.name", "collector").with("db.system", "postgresql");
        let batch = Batch::Logs(LogBatch {
            records: vec![LogRecord::new(0, Severity::Info, "?", resource)
                .with_attribute("db.statement", "SELECT * FROM users WHERE email = 'leak@example.com'")],
        });
        let _ = verifier.verify_batch(batch);
        assert_eq!(verifier.metrics.sanitisation_leaks.get(), 1);
    }

    #[test]
    fn strict_policy_drops_records_missing_required_attributes() {
        let mut verifier = test_verifier(Config {
            schema_policy: SchemaPolicy::Strict,
            ..Config::default()
        });
        let batch = Batch::Logs(LogBatch {
            records: vec![LogRecord::new(0, Severity::Info, "SELECT 1", AttributeSet::new())],
        });
        let verified = verifier.verify_batch(batch);
        assert!(verified.is_empty());
        assert_eq!(verifier.metrics.schema_dropped.get(), 1);
    }

    #[test]
    fn lenient_policy_marks_invalid_but_keeps_record() {
        let mut verifier = test_verifier(Config::default());
        let batch = Batch::Logs(LogBatch {
            records: vec![LogRecord::new(0, Severity::Info, "SELECT 1", AttributeSet::new())],
        });
        let verified = verifier.verify_batch(batch);
        assert_eq!(verified.len(), 1);
        if let Batch::Logs(lb) = verified {
            assert!(lb.records[0].resource.contains_key("db.schema.invalid"));
        } else {
            unreachable!()
        }
    }

    #[test]
    fn deny_listed_attribute_is_redacted() {
        let mut verifier = test_verifier(Config::default());
        let resource = AttributeSet::new()
            .with("service.name", "collector")
            .with("db.system", "postgresql")
            .with("db.user.password", "hunter2");
        let batch = Batch::Logs(LogBatch {
            records: vec![LogRecord::new(0, Severity::Info, "SELECT 1", resource)],
        });
        let verified = verifier.verify_batch(batch);
        if let Batch::Logs(lb) = verified {
            assert_eq!(lb.records[0].resource.get("db.user.password").unwrap().as_str(), Some("[REDACTED:custom]"));
        } else {
            unreachable!()
        }
        assert_eq!(verifier.metrics.pii_redacted_custom.get(), 1);
    }

    #[test]
    fn checksum_attribute_is_hashed_not_redacted() {
        let mut verifier = test_verifier(Config {
            checksum_attributes: vec!["customer.id".to_owned()],
            ..Config::default()
        });
        let resource = AttributeSet::new()
            .with("service.name", "collector")
            .with("db.system", "postgresql")
            .with("customer.id", "acct-12345");
        let batch = Batch::Logs(LogBatch {
            records: vec![LogRecord::new(0, Severity::Info, "SELECT 1", resource)],
        });
        let verified = verifier.verify_batch(batch);
        if let Batch::Logs(lb) = verified {
            let hashed = lb.records[0].resource.get("customer.id").unwrap().as_str().unwrap().to_owned();
            assert_ne!(hashed, "acct-12345");
            assert_eq!(hashed.len(), 16);
        } else {
            unreachable!()
        }
    }

    #[test]
    fn overlong_value_is_truncated() {
        let mut verifier = test_verifier(Config {
            max_field_length: 8,
            ..Config::default()
        });
        let resource = AttributeSet::new().with("service.name", "collector").with("db.system", "postgresql");
        let batch = Batch::Logs(LogBatch {
            records: vec![LogRecord::new(0, Severity::Info, "0123456789abcdef", resource)],
        });
        let verified = verifier.verify_batch(batch);
        if let Batch::Logs(lb) = verified {
            assert!(lb.records[0].body.starts_with("01234567"));
            assert!(lb.records[0].body.ends_with("(truncated)"));
        } else {
            unreachable!()
        }
    }

    #[test]
    fn custom_pattern_is_scanned_and_counted_as_custom() {
        let mut verifier = test_verifier(Config {
            pii_detection: PiiDetectionConfig {
                categories: vec![PiiCategory::Custom],
                custom_patterns: vec![r"EMP-\d{6}".to_owned()],
                ..PiiDetectionConfig::default()
            },
            ..Config::default()
        });
        let resource = AttributeSet::new().with("service.name", "collector").with("db.system", "postgresql");
        let batch = Batch::Logs(LogBatch {
            records: vec![LogRecord::new(0, Severity::Info, "employee EMP-482910 clocked in", resource)],
        });
        let verified = verifier.verify_batch(batch);
        if let Batch::Logs(lb) = verified {
            assert_eq!(lb.records[0].body, "employee [REDACTED:custom] clocked in");
        } else {
            unreachable!()
        }
        assert_eq!(verifier.metrics.pii_redacted_custom.get(), 1);
    }

    #[test]
    fn disabled_processor_passes_batch_through_untouched() {
        let mut verifier = test_verifier(Config {
            enabled: false,
            ..Config::default()
        });
        let batch = Batch::Logs(LogBatch {
            records: vec![LogRecord::new(0, Severity::Info, "alice@example.com", AttributeSet::new())],
        });
        let verified = verifier.verify_batch(batch);
        if let Batch::Logs(lb) = verified {
            assert_eq!(lb.records[0].body, "alice@example.com");
        } else {
            unreachable!()
        }
    }
}
