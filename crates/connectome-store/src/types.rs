// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Property-graph primitives: ids, property values, nodes and relationships.

use chrono::{DateTime, Utc};
use connectome_structures::{Location, RoiInfo};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Relationship direction relative to the node being expanded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outgoing,
    Incoming,
    Both,
}

/// A stored property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    IntList(Vec<i64>),
    StrList(Vec<String>),
    /// Stored in its canonical JSON encoding.
    #[serde(with = "roi_info_encoding")]
    RoiInfo(RoiInfo),
    Timestamp(DateTime<Utc>),
}

mod roi_info_encoding {
    use connectome_structures::RoiInfo;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(info: &RoiInfo, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&info.to_json_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<RoiInfo, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        RoiInfo::from_json_str(&encoded).map_err(serde::de::Error::custom)
    }
}

/// Hashable projection of a property value used by exact-match indexes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IndexKey {
    Bool(bool),
    Int(i64),
    Str(String),
    IntList(Vec<i64>),
}

impl PropertyValue {
    pub fn index_key(&self) -> Option<IndexKey> {
        match self {
            PropertyValue::Bool(v) => Some(IndexKey::Bool(*v)),
            PropertyValue::Int(v) => Some(IndexKey::Int(*v)),
            PropertyValue::Str(v) => Some(IndexKey::Str(v.clone())),
            PropertyValue::IntList(v) => Some(IndexKey::IntList(v.clone())),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            PropertyValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            PropertyValue::Float(v) => Some(*v),
            PropertyValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_int_list(&self) -> Option<&[i64]> {
        match self {
            PropertyValue::IntList(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str_list(&self) -> Option<&[String]> {
        match self {
            PropertyValue::StrList(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_roi_info(&self) -> Option<&RoiInfo> {
        match self {
            PropertyValue::RoiInfo(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_location(&self) -> Option<Location> {
        self.as_int_list()
            .and_then(|coords| Location::from_slice(coords).ok())
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        PropertyValue::Bool(v)
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        PropertyValue::Int(v)
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        PropertyValue::Float(v)
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        PropertyValue::Str(v.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        PropertyValue::Str(v)
    }
}

impl From<Location> for PropertyValue {
    fn from(v: Location) -> Self {
        PropertyValue::IntList(v.to_vec())
    }
}

impl From<RoiInfo> for PropertyValue {
    fn from(v: RoiInfo) -> Self {
        PropertyValue::RoiInfo(v)
    }
}

impl From<DateTime<Utc>> for PropertyValue {
    fn from(v: DateTime<Utc>) -> Self {
        PropertyValue::Timestamp(v)
    }
}

pub type Properties = BTreeMap<String, PropertyValue>;

/// Stored node payload (labels and properties, no identity).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub labels: BTreeSet<String>,
    pub properties: Properties,
}

impl NodeRecord {
    pub fn matches(&self, label: &str, key: &str, value: &PropertyValue) -> bool {
        self.labels.contains(label) && self.properties.get(key) == Some(value)
    }
}

/// Stored relationship payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub rel_type: String,
    pub from: NodeId,
    pub to: NodeId,
    pub properties: Properties,
}

/// A node as returned by reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub labels: BTreeSet<String>,
    pub properties: Properties,
}

impl Node {
    pub fn from_record(id: NodeId, record: NodeRecord) -> Self {
        Self {
            id,
            labels: record.labels,
            properties: record.properties,
        }
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.contains(label)
    }

    pub fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }

    pub fn int(&self, key: &str) -> Option<i64> {
        self.property(key).and_then(PropertyValue::as_int)
    }

    pub fn float(&self, key: &str) -> Option<f64> {
        self.property(key).and_then(PropertyValue::as_float)
    }

    pub fn str(&self, key: &str) -> Option<&str> {
        self.property(key).and_then(PropertyValue::as_str)
    }
}

/// A relationship as returned by reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub rel_type: String,
    pub from: NodeId,
    pub to: NodeId,
    pub properties: Properties,
}

impl Edge {
    pub fn from_record(id: EdgeId, record: EdgeRecord) -> Self {
        Self {
            id,
            rel_type: record.rel_type,
            from: record.from,
            to: record.to,
            properties: record.properties,
        }
    }

    /// The endpoint that is not `node` (or `node` itself for a self-loop).
    pub fn other(&self, node: NodeId) -> NodeId {
        if self.from == node {
            self.to
        } else {
            self.from
        }
    }

    pub fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }

    pub fn int(&self, key: &str) -> Option<i64> {
        self.property(key).and_then(PropertyValue::as_int)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use connectome_structures::SynapseType;

    #[test]
    fn test_roi_info_property_uses_canonical_string() {
        let mut info = RoiInfo::new();
        info.increment_for_roi("EB", SynapseType::Pre);
        let value = PropertyValue::RoiInfo(info.clone());
        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(json, r#"{"kind":"roiInfo","value":"{\"EB\":{\"pre\":1,\"post\":0}}"}"#);
        let back: PropertyValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back.as_roi_info(), Some(&info));
    }

    #[test]
    fn test_float_values_are_not_indexable() {
        assert!(PropertyValue::Float(0.5).index_key().is_none());
        assert_eq!(PropertyValue::Int(3).index_key(), Some(IndexKey::Int(3)));
    }

    #[test]
    fn test_location_round_trip() {
        let loc = Location::new(1, 2, 3);
        assert_eq!(PropertyValue::from(loc).as_location(), Some(loc));
    }
}
