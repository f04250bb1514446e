// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Node configuration specification.
//!
//! A node is a fundamental unit in our data processing pipeline, representing either a receiver
//! (source), processor, exporter (sink), or connector (linking pipelines).
//!
//! A node can expose multiple named output ports.

use crate::{Description, NodeId, PortName, Urn};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;
use std::collections::{HashMap, HashSet};

/// User configuration for a node in the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct NodeUserConfig {
    /// The kind of node (receiver, processor, exporter, ...).
    pub kind: NodeKind,

    /// The node type URN identifying the plugin (factory) to use for this node.
    pub plugin_urn: Urn,

    /// An optional description of this node.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<Description>,

    /// Node specific attributes to be added to internal telemetry.
    ///
    /// Supports both bare values and extended form with optional brief descriptions:
    /// ```yaml
    /// telemetry_attributes:
    ///   region: "us-west"                          # bare value
    ///   team:
    ///     value: "platform"                        # extended form
    ///     brief: "Owning team name"                # optional description
    /// ```
    #[serde(
        default,
        skip_serializing_if = "HashMap::is_empty",
        deserialize_with = "deserialize_telemetry_attributes"
    )]
    pub telemetry_attributes: HashMap<String, TelemetryAttribute>,

    /// Resolved hyper-edge wiring for this node's output ports, keyed by port name.
    ///
    /// Populated by [`crate::pipeline::PipelineConfigBuilder::build`] from the pipeline's
    /// `connections`; not user-authored directly.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub out_ports: HashMap<PortName, HyperEdgeConfig>,

    /// Optional default output port name to use when a node emits pdata without specifying a port.
    /// If omitted and multiple output ports are configured, the engine will treat the default as
    /// ambiguous and require explicit port selection at runtime.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_out_port: Option<PortName>,

    /// Node-specific configuration.
    ///
    /// This configuration is interpreted by the node itself and is not interpreted and validated by
    /// the pipeline engine.
    ///
    /// Note: A pre-validation step using a JSON schema or protobuf could be added to the
    /// management plane to ensure that the configuration is valid.
    #[serde(default)]
    // The serde_json::Value serializes to an invalid schema as far as the kubernetes api is concerned.
    // The preserve-unknown-fields extension allows this to be correctly interpreted as "Any JSON type"
    #[schemars(extend("x-kubernetes-preserve-unknown-fields" = true))]
    pub config: Value,
}

/// A single telemetry attribute value attached to a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum AttributeValue {
    /// A boolean value.
    Bool(bool),
    /// A signed integer value.
    I64(i64),
    /// A floating point value.
    F64(f64),
    /// A string value.
    String(String),
    /// An array of values. Rejected for node telemetry attributes.
    Array(Vec<AttributeValue>),
}

/// A node telemetry attribute, with an optional human-readable description.
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct TelemetryAttribute {
    value: AttributeValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    brief: Option<String>,
}

impl TelemetryAttribute {
    /// Returns the attribute's value.
    #[must_use]
    pub fn value(&self) -> &AttributeValue {
        &self.value
    }

    /// Returns the attribute's brief description, if any.
    #[must_use]
    pub fn brief(&self) -> Option<&str> {
        self.brief.as_deref()
    }
}

impl<'de> Deserialize<'de> for TelemetryAttribute {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Extended {
                value: AttributeValue,
                #[serde(default)]
                brief: Option<String>,
            },
            Bare(AttributeValue),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Extended { value, brief } => Ok(TelemetryAttribute { value, brief }),
            Repr::Bare(value) => Ok(TelemetryAttribute { value, brief: None }),
        }
    }
}

/// Resolved wiring for a single output port: the destination nodes and how pdata
/// is dispatched among them when there is more than one.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct HyperEdgeConfig {
    /// Destination node IDs reachable from this port.
    pub destinations: HashSet<NodeId>,
    /// Dispatch strategy used when more than one destination is configured.
    pub dispatch_strategy: DispatchStrategy,
}

/// Dispatch semantics for a hyper-edge with multiple destinations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStrategy {
    /// Send the same message to every destination.
    Broadcast,
    /// Distribute messages across destinations in round-robin order.
    RoundRobin,
    /// Distribute messages across destinations at random.
    Random,
    /// Send each message to whichever destination currently has the smallest backlog.
    LeastLoaded,
}

/// Node kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// A source of signals
    #[default]
    Receiver,
    /// A processor of signals
    Processor,
    /// A sink of signals
    Exporter,

    // ToDo(LQ) : Add more node kinds as needed.
    // A connector between two pipelines
    // Connector,
    /// A merged chain of consecutive processors (experimental).
    ProcessorChain,
}

impl From<NodeKind> for Cow<'static, str> {
    fn from(kind: NodeKind) -> Self {
        match kind {
            NodeKind::Receiver => "receiver".into(),
            NodeKind::Processor => "processor".into(),
            NodeKind::Exporter => "exporter".into(),
            NodeKind::ProcessorChain => "processor_chain".into(),
        }
    }
}

impl NodeUserConfig {
    /// Creates a new Receiver `NodeUserConfig` with the node type URN.
    pub fn new_receiver_config<U: AsRef<str>>(node_type: U) -> Self {
        let plugin_urn = crate::node_urn::normalize_plugin_urn_for_kind(
            node_type.as_ref(),
            NodeKind::Receiver,
        )
        .expect("invalid receiver node type");
        Self {
            kind: NodeKind::Receiver,
            plugin_urn: plugin_urn.into_string().into(),
            description: None,
            telemetry_attributes: HashMap::new(),
            out_ports: HashMap::new(),
            default_out_port: None,
            config: Value::Null,
        }
    }

    /// Creates a new Exporter `NodeUserConfig` with the node type URN.
    pub fn new_exporter_config<U: AsRef<str>>(node_type: U) -> Self {
        let plugin_urn = crate::node_urn::normalize_plugin_urn_for_kind(
            node_type.as_ref(),
            NodeKind::Exporter,
        )
        .expect("invalid exporter node type");
        Self {
            kind: NodeKind::Exporter,
            plugin_urn: plugin_urn.into_string().into(),
            description: None,
            telemetry_attributes: HashMap::new(),
            out_ports: HashMap::new(),
            default_out_port: None,
            config: Value::Null,
        }
    }

    /// Creates a new Processor `NodeUserConfig` with the node type URN.
    pub fn new_processor_config<U: AsRef<str>>(node_type: U) -> Self {
        let plugin_urn = crate::node_urn::normalize_plugin_urn_for_kind(
            node_type.as_ref(),
            NodeKind::Processor,
        )
        .expect("invalid processor node type");
        Self {
            kind: NodeKind::Processor,
            plugin_urn: plugin_urn.into_string().into(),
            description: None,
            telemetry_attributes: HashMap::new(),
            out_ports: HashMap::new(),
            default_out_port: None,
            config: Value::Null,
        }
    }

    /// Creates a new `NodeUserConfig` with the specified kind, plugin URN and user configuration.
    #[must_use]
    pub fn with_user_config(kind: NodeKind, plugin_urn: Urn, user_config: Value) -> Self {
        Self {
            kind,
            plugin_urn,
            description: None,
            telemetry_attributes: HashMap::new(),
            out_ports: HashMap::new(),
            default_out_port: None,
            config: user_config,
        }
    }

    /// Sets the default output port name used by this node when no explicit port is specified.
    pub fn set_default_out_port<P: Into<PortName>>(&mut self, port: P) {
        self.default_out_port = Some(port.into());
    }

    /// Returns this node's kind.
    #[must_use]
    pub const fn kind(&self) -> NodeKind {
        self.kind
    }
}

/// Deserializes `telemetry_attributes` and rejects any attribute with an `Array` value,
/// which is not supported for log record attributes.
fn deserialize_telemetry_attributes<'de, D>(
    deserializer: D,
) -> Result<HashMap<String, TelemetryAttribute>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let attrs: HashMap<String, TelemetryAttribute> = HashMap::deserialize(deserializer)?;
    for (key, attr) in &attrs {
        if matches!(attr.value(), AttributeValue::Array(_)) {
            return Err(serde::de::Error::custom(format!(
                "unsupported telemetry attribute type for `{key}`: array attributes are not supported"
            )));
        }
    }
    Ok(attrs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn node_user_config_minimal_valid() {
        let json = r#"{
            "kind": "receiver",
            "plugin_urn": "urn:example:demo:receiver"
        }"#;
        let cfg: NodeUserConfig = serde_json::from_str(json).unwrap();
        assert!(matches!(cfg.kind(), NodeKind::Receiver));
        assert!(cfg.out_ports.is_empty());
    }

    #[test]
    fn test_yaml_node_config() {
        let yaml = r#"
kind: processor
plugin_urn: "urn:otel:type_router:processor"
config: {}
"#;
        let cfg: NodeUserConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(matches!(cfg.kind(), NodeKind::Processor));
    }

    #[test]
    fn node_user_config_with_telemetry_attributes_valid() {
        let json = r#"{
            "kind": "receiver",
            "plugin_urn": "urn:example:demo:receiver",
            "telemetry_attributes": {
                "attr1": "value1",
                "attr2": 123,
                "attr3": true
            }
        }"#;
        let cfg: NodeUserConfig = serde_json::from_str(json).unwrap();
        assert_eq!(
            cfg.telemetry_attributes
                .keys()
                .cloned()
                .collect::<BTreeSet<_>>(),
            BTreeSet::from([
                "attr1".to_string(),
                "attr2".to_string(),
                "attr3".to_string(),
            ])
        );
        // Bare values have no brief
        assert!(
            cfg.telemetry_attributes
                .get("attr1")
                .unwrap()
                .brief()
                .is_none()
        );
    }

    #[test]
    fn node_user_config_with_telemetry_attributes_extended_form() {
        let json = r#"{
            "kind": "receiver",
            "plugin_urn": "urn:example:demo:receiver",
            "telemetry_attributes": {
                "region": {"value": "us-west", "brief": "Deployment region"},
                "count": 42,
                "team": {"value": "platform"}
            }
        }"#;
        let cfg: NodeUserConfig = serde_json::from_str(json).unwrap();
        let region = cfg.telemetry_attributes.get("region").unwrap();
        assert_eq!(
            *region.value(),
            AttributeValue::String("us-west".to_string())
        );
        assert_eq!(region.brief(), Some("Deployment region"));

        let count = cfg.telemetry_attributes.get("count").unwrap();
        assert_eq!(*count.value(), AttributeValue::I64(42));
        assert!(count.brief().is_none());

        let team = cfg.telemetry_attributes.get("team").unwrap();
        assert_eq!(
            *team.value(),
            AttributeValue::String("platform".to_string())
        );
        assert!(team.brief().is_none());
    }

    #[test]
    fn node_user_config_with_telemetry_attribute_array_expects_error() {
        let json = r#"{
            "kind": "receiver",
            "plugin_urn": "urn:example:demo:receiver",
            "telemetry_attributes": {
                "attr1": "value1",
                "attr2": [1, 2, 3]
            }
        }"#;
        let cfg: Result<NodeUserConfig, _> = serde_json::from_str(json);
        assert!(cfg.is_err());
    }
}
