// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Query-plan extraction and caching (`spec.md` §4.4). For each captured
//! query-execution log record, normalizes the statement into a **query
//! fingerprint**, parses the attached plan (JSON or `EXPLAIN`-style text)
//! into a tree, and attaches a stable `plan.hash` plus a bounded-depth
//! `plan.tree` so downstream consumers can detect plan regressions.
//!
//! `db.statement` and the record body are always overwritten with the
//! fingerprint: a literal SQL statement, with its possibly sensitive
//! constant values, must never reach an exporter (`spec.md` §8 invariant
//! #4). This holds even when no plan is attached or the plan fails to
//! parse.

use crate::processors::metrics::PlanExtractorMetrics;
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
use otap_df_pdata::{fingerprint_sql, Batch, LogRecord};
use otap_df_telemetry::metrics::MetricSet;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::LazyLock;
use std::time::{Duration, Instant};

/// The URN for the plan extractor processor.
pub const PLAN_EXTRACTOR_URN: &str = "urn:otel:dbtel:plan_extractor:processor";

/// Configuration for [`PlanExtractor`].
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Attribute key holding the raw SQL statement, checked before
    /// falling back to the record body.
    pub statement_attribute: String,
    /// Attribute key holding the plan to parse: either a JSON object or
    /// an `EXPLAIN`-style text blob. Absent if the record carries no
    /// plan, in which case only the fingerprint is attached.
    pub plan_attribute: String,
    /// Maximum number of distinct fingerprints cached at once.
    pub cache_size: usize,
    /// How long a cached plan is trusted before being re-parsed, so a
    /// query's plan attributes eventually pick up a stats-driven plan
    /// change even without an eviction.
    pub cache_ttl: Duration,
    /// Maximum depth serialised into `plan.tree`; deeper children are
    /// dropped with a `children_truncated` marker.
    pub tree_max_depth: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            statement_attribute: "db.statement".to_owned(),
            plan_attribute: "db.plan".to_owned(),
            cache_size: 1000,
            cache_ttl: Duration::from_secs(300),
            tree_max_depth: 4,
        }
    }
}

/// One node of a parsed execution plan.
#[derive(Debug, Clone, Deserialize)]
struct PlanNode {
    operator: String,
    #[serde(default)]
    relation: Option<String>,
    #[serde(default)]
    total_cost: Option<f64>,
    #[serde(default)]
    rows_estimate: Option<i64>,
    #[serde(default)]
    children: Vec<PlanNode>,
}

/// `canonical(plan_tree)` from `spec.md` §4.4: depth-first operator
/// names only, costs excluded so identical shapes collide across stats
/// refreshes.
fn canonical_form(node: &PlanNode) -> String {
    if node.children.is_empty() {
        node.operator.clone()
    } else {
        let children: Vec<String> = node.children.iter().map(canonical_form).collect();
        format!("{}({})", node.operator, children.join(","))
    }
}

fn bounded_tree_json(node: &PlanNode, max_depth: usize) -> serde_json::Value {
    fn build(node: &PlanNode, depth: usize, max_depth: usize) -> serde_json::Value {
        let mut obj = serde_json::Map::new();
        let _ = obj.insert("operator".to_owned(), serde_json::Value::String(node.operator.clone()));
        if let Some(relation) = &node.relation {
            let _ = obj.insert("relation".to_owned(), serde_json::Value::String(relation.clone()));
        }
        if let Some(cost) = node.total_cost {
            let _ = obj.insert("total_cost".to_owned(), serde_json::json!(cost));
        }
        if let Some(rows) = node.rows_estimate {
            let _ = obj.insert("rows_estimate".to_owned(), serde_json::json!(rows));
        }
        if !node.children.is_empty() {
            if depth < max_depth {
                let children: Vec<_> = node.children.iter().map(|c| build(c, depth + 1, max_depth)).collect();
                let _ = obj.insert("children".to_owned(), serde_json::Value::Array(children));
            } else {
                let _ = obj.insert("children_truncated".to_owned(), serde_json::Value::Bool(true));
            }
        }
        serde_json::Value::Object(obj)
    }
    build(node, 0, max_depth)
}

static PLAN_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<op>[A-Za-z0-9_ ]+?)(?:\s+on\s+(?P<rel>\S+))?\s*\(cost=[0-9.]+\.\.(?P<cost>[0-9.]+)\s+rows=(?P<rows>[0-9]+)")
        .expect("plan line pattern is a valid regex")
});

fn parse_plan_line(line: &str) -> Result<PlanNode, String> {
    let caps = PLAN_LINE_RE
        .captures(line)
        .ok_or_else(|| format!("unrecognised plan line: {line}"))?;
    Ok(PlanNode {
        operator: caps["op"].trim().to_owned(),
        relation: caps.name("rel").map(|m| m.as_str().to_owned()),
        total_cost: caps["cost"].parse().ok(),
        rows_estimate: caps["rows"].parse().ok(),
        children: Vec::new(),
    })
}

/// Parses an `EXPLAIN`-style text plan, where deeper plan nodes are
/// indented (optionally behind a `->` marker) further than their parent.
fn parse_explain_text(text: &str) -> Result<PlanNode, String> {
    let mut stack: Vec<(usize, PlanNode)> = Vec::new();
    for raw_line in text.lines() {
        if raw_line.trim().is_empty() {
            continue;
        }
        let indent = raw_line.len() - raw_line.trim_start().len();
        let trimmed = raw_line.trim_start().trim_start_matches("->").trim();
        let node = parse_plan_line(trimmed)?;

        while let Some(&(top_indent, _)) = stack.last() {
            if top_indent < indent {
                break;
            }
            let (popped_indent, child) = stack.pop().expect("checked non-empty above");
            match stack.last_mut() {
                Some((_, parent)) => parent.children.push(child),
                None => {
                    stack.push((popped_indent, child));
                    break;
                }
            }
        }
        stack.push((indent, node));
    }

    while stack.len() > 1 {
        let (_, child) = stack.pop().expect("length checked above");
        stack.last_mut().expect("length checked above").1.children.push(child);
    }
    stack.pop().map(|(_, node)| node).ok_or_else(|| "plan text has no recognisable lines".to_owned())
}

/// Parses a plan blob, dispatching to JSON or `EXPLAIN`-text parsing.
fn parse_plan(text: &str) -> Result<PlanNode, String> {
    let trimmed = text.trim();
    if trimmed.starts_with('{') {
        serde_json::from_str(trimmed).map_err(|e| e.to_string())
    } else {
        parse_explain_text(trimmed)
    }
}

struct CachedPlan {
    hash_hex: String,
    plan_type: String,
    total_cost: f64,
    rows_estimate: i64,
    tree_json: String,
    cached_at: Instant,
}

/// The result of extracting a plan for one statement.
enum PlanOutcome {
    /// The statement was blank; nothing to fingerprint.
    Empty,
    /// Fingerprinted, but the record carried no plan to parse.
    NoPlan { fingerprint: String },
    /// Fingerprinted, but plan parsing failed.
    ParseError { fingerprint: String, error: String },
    /// Fingerprinted and the plan was parsed (or served from cache).
    Parsed {
        fingerprint: String,
        hash_hex: String,
        plan_type: String,
        total_cost: f64,
        rows_estimate: i64,
        tree_json: String,
    },
}

/// Query-plan extraction and caching processor. See module docs and
/// `spec.md` §4.4.
pub struct PlanExtractor {
    config: Config,
    metrics: MetricSet<PlanExtractorMetrics>,
    cache: HashMap<String, CachedPlan>,
    lru: VecDeque<String>,
}

/// Factory function to create a [`PlanExtractor`].
pub fn create_plan_extractor(
    pipeline_ctx: PipelineContext,
    node: NodeId,
    node_config: Arc<NodeUserConfig>,
    processor_config: &ProcessorConfig,
) -> Result<ProcessorWrapper<Batch>, ConfigError> {
    Ok(ProcessorWrapper::local(
        PlanExtractor::from_config(pipeline_ctx, &node_config.config)?,
        node,
        node_config,
        processor_config,
    ))
}

/// Registers [`PlanExtractor`] as a dbtel processor factory.
#[allow(unsafe_code)]
#[distributed_slice(DBTEL_PROCESSOR_FACTORIES)]
pub static PLAN_EXTRACTOR_FACTORY: otap_df_engine::ProcessorFactory<Batch> =
    otap_df_engine::ProcessorFactory {
        name: PLAN_EXTRACTOR_URN,
        create: |pipeline_ctx, node, node_config, proc_cfg| {
            create_plan_extractor(pipeline_ctx, node, node_config, proc_cfg)
        },
    };

impl PlanExtractor {
    /// Creates a new extractor from an explicit config.
    #[must_use]
    pub fn new(pipeline_ctx: PipelineContext, config: Config) -> Self {
        Self {
            config,
            metrics: pipeline_ctx.register_metrics::<PlanExtractorMetrics>(),
            cache: HashMap::new(),
            lru: VecDeque::new(),
        }
    }

    /// Creates a new extractor from a JSON configuration object.
    pub fn from_config(pipeline_ctx: PipelineContext, config: &serde_json::Value) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_value(config.clone())
            .map_err(|e| ConfigError::InvalidUserConfig { error: e.to_string() })?;
        Ok(Self::new(pipeline_ctx, config))
    }

    /// Fingerprints `raw_statement` and, if `plan_text` is present, parses
    /// and caches its plan. Consulting/populating the cache is keyed by
    /// the fingerprint, not the literal statement, so differently
    /// parameterised executions of the same query share one cache entry.
    fn process_statement(&mut self, raw_statement: &str, plan_text: Option<&str>) -> PlanOutcome {
        if raw_statement.trim().is_empty() {
            self.metrics.parse_errors.add(1);
            return PlanOutcome::Empty;
        }
        let fingerprint = fingerprint_sql(raw_statement);

        let Some(plan_text) = plan_text else {
            return PlanOutcome::NoPlan { fingerprint };
        };

        if let Some(cached) = self.cache.get(&fingerprint) {
            if cached.cached_at.elapsed() < self.config.cache_ttl {
                self.metrics.cache_hits.add(1);
                return PlanOutcome::Parsed {
                    fingerprint,
                    hash_hex: cached.hash_hex.clone(),
                    plan_type: cached.plan_type.clone(),
                    total_cost: cached.total_cost,
                    rows_estimate: cached.rows_estimate,
                    tree_json: cached.tree_json.clone(),
                };
            }
            let _ = self.cache.remove(&fingerprint);
        }
        self.metrics.cache_misses.add(1);

        let root = match parse_plan(plan_text) {
            Ok(root) => root,
            Err(error) => {
                self.metrics.parse_errors.add(1);
                return PlanOutcome::ParseError { fingerprint, error };
            }
        };

        let mut hasher = Sha256::new();
        hasher.update(canonical_form(&root).as_bytes());
        let hash_hex = hex_encode(&hasher.finalize());
        let tree_json = bounded_tree_json(&root, self.config.tree_max_depth).to_string();
        let total_cost = root.total_cost.unwrap_or(0.0);
        let rows_estimate = root.rows_estimate.unwrap_or(0);
        let plan_type = root.operator.clone();

        if self.cache.len() >= self.config.cache_size {
            if let Some(oldest) = self.lru.pop_front() {
                let _ = self.cache.remove(&oldest);
            }
        }
        self.lru.push_back(fingerprint.clone());
        let _ = self.cache.insert(
            fingerprint.clone(),
            CachedPlan {
                hash_hex: hash_hex.clone(),
                plan_type: plan_type.clone(),
                total_cost,
                rows_estimate,
                tree_json: tree_json.clone(),
                cached_at: Instant::now(),
            },
        );
        self.metrics.parsed.add(1);
        PlanOutcome::Parsed {
            fingerprint,
            hash_hex,
            plan_type,
            total_cost,
            rows_estimate,
            tree_json,
        }
    }

    /// Annotates one log record in place. `db.statement` and the body are
    /// always replaced with the fingerprint, regardless of outcome, so a
    /// literal statement never survives this stage.
    fn annotate_record(&mut self, record: &mut LogRecord) {
        let raw_statement = record
            .attributes
            .get(&self.config.statement_attribute)
            .and_then(|v| v.as_str())
            .map(ToOwned::to_owned)
            .unwrap_or_else(|| record.body.clone());
        let plan_text = record
            .attributes
            .get(&self.config.plan_attribute)
            .and_then(|v| v.as_str())
            .map(ToOwned::to_owned);

        match self.process_statement(&raw_statement, plan_text.as_deref()) {
            PlanOutcome::Empty => {}
            PlanOutcome::NoPlan { fingerprint } => {
                record.attributes.insert(self.config.statement_attribute.clone(), fingerprint.clone());
                record.body = fingerprint;
            }
            PlanOutcome::ParseError { fingerprint, error } => {
                record.attributes.insert(self.config.statement_attribute.clone(), fingerprint.clone());
                record.body = fingerprint;
                record.attributes.insert("plan.parse_error", error);
            }
            PlanOutcome::Parsed {
                fingerprint,
                hash_hex,
                plan_type,
                total_cost,
                rows_estimate,
                tree_json,
            } => {
                record.attributes.insert(self.config.statement_attribute.clone(), fingerprint.clone());
                record.body = fingerprint;
                record.attributes.insert("plan.hash", hash_hex);
                record.attributes.insert("plan.type", plan_type);
                record.attributes.insert("plan.total_cost", total_cost);
                record.attributes.insert("plan.rows_estimate", rows_estimate);
                record.attributes.insert("plan.tree", tree_json);
            }
        }
    }

    /// Log input only (`spec.md` §4.4's Contract); metric and trace
    /// batches pass through untouched.
    fn annotate(&mut self, batch: &mut Batch) {
        if let Batch::Logs(lb) = batch {
            for record in &mut lb.records {
                self.annotate_record(record);
            }
        }
    }

    /// Test-only access to plan annotation, for integration tests that
    /// exercise the processing stage without the pipeline-wiring machinery.
    #[cfg(feature = "testing")]
    pub fn annotate_for_test(&mut self, batch: &mut Batch) {
        self.annotate(batch);
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

#[async_trait(?Send)]
impl local::Processor<Batch> for PlanExtractor {
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
            Message::PData(mut batch) => {
                self.annotate(&mut batch);
                effect_handler.send_message(batch).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use otap_df_engine::context::ControllerContext;
    use otap_df_pdata::{AttributeSet, LogBatch, Severity};
    use otap_df_telemetry::registry::MetricsRegistryHandle;

    fn test_pipeline_context() -> PipelineContext {
        let controller_ctx = ControllerContext::new(MetricsRegistryHandle::new());
        controller_ctx.pipeline_context_with("test_grp".into(), "test_pipeline".into(), 0, 1, 0)
    }

    fn test_extractor() -> PlanExtractor {
        PlanExtractor::new(test_pipeline_context(), Config::default())
    }

    fn record_with(statement: &str, plan: Option<&str>) -> LogRecord {
        let resource = AttributeSet::new().with("service.name", "dbtel-collector");
        let mut record = LogRecord::new(0, Severity::Info, statement, resource);
        record.attributes.insert("db.statement", statement);
        if let Some(plan) = plan {
            record.attributes.insert("db.plan", plan);
        }
        record
    }

    #[test]
    fn same_statement_is_a_cache_hit_on_second_lookup() {
        let mut extractor = test_extractor();
        let plan = "Index Scan on orders  (cost=0.29..8.31 rows=1)";
        let _ = extractor.process_statement("SELECT * FROM orders WHERE id = 42", Some(plan));
        assert_eq!(extractor.metrics.cache_misses.get(), 1);
        let _ = extractor.process_statement("SELECT * FROM orders WHERE id = 42", Some(plan));
        assert_eq!(extractor.metrics.cache_hits.get(), 1);
    }

    #[test]
    fn fingerprint_equivalent_statements_share_a_plan_hash() {
        let mut extractor = test_extractor();
        let plan = "Index Scan on t  (cost=0.29..8.31 rows=1)";
        let outcome1 = extractor.process_statement("SELECT * FROM t WHERE id = 7", Some(plan));
        let outcome2 = extractor.process_statement("SELECT * FROM t WHERE id = 9", Some(plan));
        let PlanOutcome::Parsed { hash_hex: h1, .. } = outcome1 else { panic!("expected Parsed") };
        let PlanOutcome::Parsed { hash_hex: h2, .. } = outcome2 else { panic!("expected Parsed") };
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
    }

    #[test]
    fn empty_statement_is_a_parse_error() {
        let mut extractor = test_extractor();
        let outcome = extractor.process_statement("   ", None);
        assert!(matches!(outcome, PlanOutcome::Empty));
        assert_eq!(extractor.metrics.parse_errors.get(), 1);
    }

    #[test]
    fn cache_evicts_oldest_entry_once_at_capacity() {
        let mut extractor = PlanExtractor::new(
            test_pipeline_context(),
            Config {
                cache_size: 2,
                ..Config::default()
            },
        );
        let plan = "Seq Scan on t  (cost=0.00..1.00 rows=1)";
        let _ = extractor.process_statement("SELECT 1", Some(plan));
        let _ = extractor.process_statement("SELECT 2", Some(plan));
        let _ = extractor.process_statement("SELECT 3", Some(plan));
        assert_eq!(extractor.cache.len(), 2);
        assert!(!extractor.cache.contains_key(&fingerprint_sql("SELECT 1")));
    }

    #[test]
    fn scenario_s2_plan_extraction_from_explain_text() {
        let mut extractor = test_extractor();
        let mut record = record_with(
            "SELECT * FROM t WHERE id = 7",
            Some("Index Scan on t  (cost=0.29..8.31 rows=1)"),
        );
        extractor.annotate_record(&mut record);
        assert_eq!(record.attributes.get("db.statement").and_then(|v| v.as_str()), Some("SELECT * FROM t WHERE id = ?"));
        assert_eq!(record.body, "SELECT * FROM t WHERE id = ?");
        assert_eq!(record.attributes.get("plan.type").and_then(|v| v.as_str()), Some("Index Scan"));
        let total_cost = record.attributes.get("plan.total_cost").expect("total_cost present");
        assert_eq!(*total_cost, otap_df_pdata::AttributeValue::F64(8.31));
        let hash = record.attributes.get("plan.hash").and_then(|v| v.as_str()).expect("hash present");
        assert_eq!(hash.len(), 64);

        let mut second = record_with(
            "SELECT * FROM t WHERE id = 9",
            Some("Index Scan on t  (cost=0.29..8.31 rows=1)"),
        );
        extractor.annotate_record(&mut second);
        assert_eq!(second.attributes.get("plan.hash"), record.attributes.get("plan.hash"));
    }

    #[test]
    fn literal_statement_never_survives_even_without_a_plan() {
        let mut extractor = test_extractor();
        let mut record = record_with("SELECT email FROM users WHERE id = 1", None);
        extractor.annotate_record(&mut record);
        assert!(!record.body.contains("users"));
        assert_eq!(record.body, "SELECT email FROM users WHERE id = ?");
        assert!(record.attributes.get("plan.hash").is_none());
    }

    #[test]
    fn unparseable_plan_is_tagged_but_non_fatal() {
        let mut extractor = test_extractor();
        let mut record = record_with("SELECT 1", Some("not a recognisable plan"));
        extractor.annotate_record(&mut record);
        assert_eq!(record.body, "SELECT ?");
        assert!(record.attributes.get("plan.parse_error").is_some());
        assert!(record.attributes.get("plan.hash").is_none());
        assert_eq!(extractor.metrics.parse_errors.get(), 1);
    }

    #[test]
    fn batch_annotate_skips_metrics_and_traces() {
        let mut extractor = test_extractor();
        let mut logs = Batch::Logs(LogBatch {
            records: vec![record_with("SELECT 1", None)],
        });
        extractor.annotate(&mut logs);
        if let Batch::Logs(lb) = &logs {
            assert_eq!(lb.records[0].body, "SELECT ?");
        } else {
            panic!("expected Logs batch");
        }
    }
}
