// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Neuron designation.
//!
//! A segment is a Neuron when it has enough synapses or carries any
//! identifying annotation. The same rule is applied after every mutation
//! that can change a segment's counts or properties, including segment
//! addition.

use connectome_store::Node;
use connectome_structures::SegmentProperty;
use serde::{Deserialize, Serialize};

use crate::reader::count;
use crate::schema::props;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeuronRule {
    pub pre_threshold: u64,
    pub post_threshold: u64,
}

impl Default for NeuronRule {
    fn default() -> Self {
        Self {
            pre_threshold: 2,
            post_threshold: 10,
        }
    }
}

impl NeuronRule {
    pub fn new(pre_threshold: u64, post_threshold: u64) -> Self {
        Self {
            pre_threshold,
            post_threshold,
        }
    }

    /// Stored keys whose presence alone promotes a segment.
    pub fn promoting_keys() -> impl Iterator<Item = &'static str> {
        SegmentProperty::ALL
            .iter()
            .filter(|property| property.promotes_to_neuron())
            .flat_map(|property| property.keys().iter().copied())
    }

    pub fn qualifies(&self, pre: u64, post: u64, has_promoting_property: bool) -> bool {
        pre >= self.pre_threshold || post >= self.post_threshold || has_promoting_property
    }

    pub fn qualifies_node(&self, segment: &Node) -> bool {
        let annotated = Self::promoting_keys().any(|key| segment.property(key).is_some());
        self.qualifies(
            count(segment, props::PRE),
            count(segment, props::POST),
            annotated,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use connectome_store::{NodeId, PropertyValue};

    fn segment(pairs: &[(&str, PropertyValue)]) -> Node {
        Node {
            id: NodeId(1),
            labels: ["Segment".to_string()].into_iter().collect(),
            properties: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        }
    }

    #[test]
    fn test_count_thresholds() {
        let rule = NeuronRule::default();
        assert!(!rule.qualifies(1, 9, false));
        assert!(rule.qualifies(2, 0, false));
        assert!(rule.qualifies(0, 10, false));
    }

    #[test]
    fn test_promoting_properties() {
        let rule = NeuronRule::default();
        assert!(rule.qualifies_node(&segment(&[("status", "Traced".into())])));
        assert!(rule.qualifies_node(&segment(&[("somaRadius", PropertyValue::Float(3.0))])));
        assert!(!rule.qualifies_node(&segment(&[("size", PropertyValue::Int(100))])));
        assert!(!rule.qualifies_node(&segment(&[("pre", PropertyValue::Int(1)), ("post", PropertyValue::Int(9))])));
    }
}
