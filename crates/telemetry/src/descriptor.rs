// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Static descriptors for attribute sets and metric sets.
//!
//! These are purely informational: they let the admin HTTP surface and
//! logs describe what an attribute or metric field means without requiring
//! a live instance.

/// The declared type of an attribute value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeValueType {
    /// UTF-8 string.
    String,
    /// Boolean.
    Boolean,
    /// Signed integer.
    Int,
    /// Floating point.
    Double,
    /// Nested key/value map.
    Map,
}

/// Describes a single leaf field of an attribute set.
#[derive(Debug, Clone, Copy)]
pub struct AttributeField {
    /// The key under which this attribute is emitted (e.g. `"node.urn"`).
    pub key: &'static str,
    /// Human readable description.
    pub brief: &'static str,
    /// Declared value type.
    pub r#type: AttributeValueType,
}

/// Static description of an attribute set, as produced by `#[attribute_set]`.
#[derive(Debug, Clone, Copy)]
pub struct AttributesDescriptor {
    /// Name of the attribute set (dotted namespace, e.g. `"node.attrs"`).
    pub name: &'static str,
    /// Leaf fields declared directly on this attribute set.
    pub fields: &'static [AttributeField],
}

/// The kind of instrument backing a metric field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instrument {
    /// Monotonically increasing counter.
    Counter,
    /// Value that can go up or down.
    Gauge,
}

/// Describes a single field of a metric set.
#[derive(Debug, Clone, Copy)]
pub struct MetricsField {
    /// The metric key (e.g. `"send.count"`).
    pub key: &'static str,
    /// Human readable description.
    pub brief: &'static str,
    /// Unit string, following UCUM-like conventions (e.g. `"{message}"`).
    pub unit: &'static str,
    /// Instrument kind.
    pub instrument: Instrument,
}

/// Static description of a metric set, as produced by `#[metric_set]`.
#[derive(Debug, Clone, Copy)]
pub struct MetricsDescriptor {
    /// Name of the metric set (e.g. `"otap.processor.batch"`).
    pub name: &'static str,
    /// Fields declared on this metric set.
    pub fields: &'static [MetricsField],
}
