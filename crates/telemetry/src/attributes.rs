// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Attribute values and the trait implemented by generated attribute sets.

use std::borrow::Cow;
use std::collections::BTreeMap;

use crate::descriptor::AttributesDescriptor;

/// A single attribute value attached to a registered entity.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    /// A string value.
    String(String),
    /// A boolean value.
    Boolean(bool),
    /// A signed integer value.
    Int(i64),
    /// A floating point value.
    Double(f64),
    /// A nested map of attributes, used for user-defined custom attributes.
    Map(BTreeMap<String, AttributeValue>),
}

impl AttributeValue {
    /// Renders the value as a string, suitable for use as a Prometheus label value.
    #[must_use]
    pub fn to_string_value(&self) -> String {
        match self {
            Self::String(s) => s.clone(),
            Self::Boolean(b) => b.to_string(),
            Self::Int(i) => i.to_string(),
            Self::Double(d) => d.to_string(),
            Self::Map(m) => {
                let mut parts: Vec<String> = m
                    .iter()
                    .map(|(k, v)| format!("{k}={}", v.to_string_value()))
                    .collect();
                parts.sort();
                format!("{{{}}}", parts.join(","))
            }
        }
    }
}

impl From<Cow<'static, str>> for AttributeValue {
    fn from(value: Cow<'static, str>) -> Self {
        Self::String(value.into_owned())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<usize> for AttributeValue {
    fn from(value: usize) -> Self {
        Self::Int(value as i64)
    }
}

impl From<u64> for AttributeValue {
    fn from(value: u64) -> Self {
        Self::Int(value as i64)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

/// Implemented by every attribute set (hand-written or generated by
/// `#[otap_df_telemetry_macros::attribute_set]`) that can be attached to a
/// registered entity.
pub trait AttributeSetHandler: std::fmt::Debug {
    /// Static description of the fields this attribute set contributes.
    fn descriptor(&self) -> &'static AttributesDescriptor;

    /// Flattened list of attribute values, in descriptor field order for the
    /// leaf fields of this struct, with any `#[compose]`d nested sets
    /// flattened in at the point they occur.
    fn attribute_values(&self) -> Vec<AttributeValue>;
}
