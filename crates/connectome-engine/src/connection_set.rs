// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
ConnectionSet recomputation.

A ConnectionSet is the synapse-pair evidence behind one ConnectsTo edge.
Whenever ownership of a linked synapse changes, the affected connection is
rebuilt from the graph:

```text
members = { (p, q) : p -[:SynapsesTo]-> q,
                     p in SynapseSet(pre), q in SynapseSet(post) }
```

An empty member set removes the ConnectionSet and its ConnectsTo edge.
Otherwise weight, weightHP and roiInfo are folded from the members and
written back, and the set's `Contains` edges are brought in line with the
distinct member synapses.
*/

use chrono::Utc;
use connectome_store::{Direction, GraphWrite, NodeId, Properties, PropertyValue};
use connectome_structures::{HpThresholds, RoiInfo, SynapseType};
use std::collections::{BTreeMap, BTreeSet};
use tracing::trace;

use crate::context::EngineContext;
use crate::error::EngineResult;
use crate::reader::{ConnectomeReader, Owner, SynapseNode};
use crate::schema::{props, rels};

/// Confidence and ROI tags of one member synapse.
#[derive(Debug, Clone, PartialEq)]
pub struct SynapseFacts {
    pub confidence: f64,
    pub rois: Vec<String>,
}

impl From<&SynapseNode> for SynapseFacts {
    fn from(synapse: &SynapseNode) -> Self {
        Self {
            confidence: synapse.confidence,
            rois: synapse.rois.iter().cloned().collect(),
        }
    }
}

/// Derived values of one connection.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionSummary {
    pub weight: u64,
    /// `None` when the dataset does not track high-precision counts.
    pub weight_hp: Option<u64>,
    pub roi_info: RoiInfo,
}

impl ConnectionSummary {
    /// Fold linked pairs. `facts` is queried once per distinct synapse.
    pub fn fold<K, F>(
        members: &BTreeSet<(K, K)>,
        mut facts: F,
        thresholds: Option<&HpThresholds>,
    ) -> EngineResult<Self>
    where
        K: Ord + Clone,
        F: FnMut(&K) -> EngineResult<SynapseFacts>,
    {
        let mut pre_facts = BTreeMap::new();
        let mut post_facts = BTreeMap::new();
        for (pre, post) in members {
            if !pre_facts.contains_key(pre) {
                pre_facts.insert(pre.clone(), facts(pre)?);
            }
            if !post_facts.contains_key(post) {
                post_facts.insert(post.clone(), facts(post)?);
            }
        }

        let weight_hp = thresholds.map(|t| {
            members
                .iter()
                .filter(|(_, post)| {
                    post_facts
                        .get(post)
                        .is_some_and(|f| t.is_high_precision(SynapseType::Post, f.confidence))
                })
                .count() as u64
        });

        let mut roi_info = RoiInfo::new();
        for (kind, side) in [(SynapseType::Pre, &pre_facts), (SynapseType::Post, &post_facts)] {
            for synapse in side.values() {
                for roi in &synapse.rois {
                    match thresholds {
                        Some(t) => roi_info.increment_for_roi_hp(
                            roi,
                            kind,
                            t.is_high_precision(kind, synapse.confidence),
                        ),
                        None => roi_info.increment_for_roi(roi, kind),
                    }
                }
            }
        }

        Ok(Self {
            weight: members.len() as u64,
            weight_hp,
            roi_info,
        })
    }

    pub fn connects_to_properties(&self) -> Properties {
        let mut properties = Properties::new();
        properties.insert(props::WEIGHT.to_string(), PropertyValue::Int(self.weight as i64));
        if let Some(hp) = self.weight_hp {
            properties.insert(props::WEIGHT_HP.to_string(), PropertyValue::Int(hp as i64));
        }
        properties
    }
}

/// A segment node together with its body id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SegmentRef {
    pub node: NodeId,
    pub body_id: u64,
}

impl From<Owner> for SegmentRef {
    fn from(owner: Owner) -> Self {
        Self {
            node: owner.segment,
            body_id: owner.body_id,
        }
    }
}

/// What a recomputation did to the stored connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionChange {
    Created,
    Updated,
    Removed,
    Absent,
}

/// (pre, post) segment pairs whose connection involves `synapse` when it is
/// owned by `owner`. Partners without an owner contribute nothing.
pub fn pairs_through<G: connectome_store::GraphRead + ?Sized>(
    reader: &ConnectomeReader<'_, G>,
    synapse: &SynapseNode,
    owner: SegmentRef,
) -> EngineResult<BTreeSet<(SegmentRef, SegmentRef)>> {
    let mut pairs = BTreeSet::new();
    for partner in reader.partners(synapse)? {
        if let Some(partner_owner) = reader.owner_of(partner)? {
            let other = SegmentRef::from(partner_owner);
            pairs.insert(match synapse.kind {
                SynapseType::Pre => (owner, other),
                SynapseType::Post => (other, owner),
            });
        }
    }
    Ok(pairs)
}

/// Rebuild the ConnectionSet and ConnectsTo edge for `pre` -> `post`.
pub fn sync_connection<T: GraphWrite>(
    tx: &mut T,
    ctx: &EngineContext,
    pre: SegmentRef,
    post: SegmentRef,
) -> EngineResult<ConnectionChange> {
    let schema = &ctx.schema;
    let (members, existing_set, existing_edges) = {
        let reader = ConnectomeReader::new(&*tx, schema);
        let mut members = BTreeSet::new();
        if let (Some(pre_set), Some(post_set)) =
            (reader.synapse_set_of(pre.node)?, reader.synapse_set_of(post.node)?)
        {
            for candidate in reader.set_members(pre_set)? {
                let synapse = reader.synapse_by_id(candidate)?;
                if synapse.kind != SynapseType::Pre {
                    continue;
                }
                for target in reader.partners(&synapse)? {
                    if !tx.edges_between(post_set, target, rels::CONTAINS)?.is_empty() {
                        members.insert((synapse.id, target));
                    }
                }
            }
        }
        let existing_set = reader
            .connection_set_node(pre.body_id, post.body_id)?
            .map(|node| node.id);
        let existing_edges = tx.edges_between(pre.node, post.node, rels::CONNECTS_TO)?;
        (members, existing_set, existing_edges)
    };

    if members.is_empty() {
        let existed = existing_set.is_some() || !existing_edges.is_empty();
        if let Some(set) = existing_set {
            tx.detach_delete_node(set)?;
        }
        for edge in existing_edges {
            tx.delete_edge(edge.id)?;
        }
        if existed {
            trace!(pre = pre.body_id, post = post.body_id, "connection removed");
            return Ok(ConnectionChange::Removed);
        }
        return Ok(ConnectionChange::Absent);
    }

    let summary = {
        let reader = ConnectomeReader::new(&*tx, schema);
        ConnectionSummary::fold(
            &members,
            |id| Ok(SynapseFacts::from(&reader.synapse_by_id(*id)?)),
            ctx.thresholds.as_ref(),
        )?
    };
    let now = PropertyValue::Timestamp(Utc::now());

    let (set, change) = match existing_set {
        Some(set) => {
            tx.set_node_property(set, props::ROI_INFO, summary.roi_info.clone().into())?;
            tx.set_node_property(set, props::TIME_STAMP, now)?;
            (set, ConnectionChange::Updated)
        }
        None => {
            let mut properties = Properties::new();
            properties.insert(
                props::DATASET_BODY_IDS.to_string(),
                schema.connection_set_key(pre.body_id, post.body_id).into(),
            );
            properties.insert(props::ROI_INFO.to_string(), summary.roi_info.clone().into());
            properties.insert(props::TIME_STAMP.to_string(), now);
            let set = tx.create_node(&schema.connection_set_labels(), properties)?;
            tx.create_edge(set, pre.node, rels::FROM, Properties::new())?;
            tx.create_edge(set, post.node, rels::TO, Properties::new())?;
            (set, ConnectionChange::Created)
        }
    };

    let mut wanted: BTreeSet<NodeId> = members.iter().flat_map(|(p, q)| [*p, *q]).collect();
    for edge in tx.edges_of(set, Direction::Outgoing, Some(rels::CONTAINS))? {
        if !wanted.remove(&edge.to) {
            tx.delete_edge(edge.id)?;
        }
    }
    for synapse in wanted {
        tx.create_edge(set, synapse, rels::CONTAINS, Properties::new())?;
    }

    let mut edges = existing_edges.into_iter();
    match edges.next() {
        Some(edge) => {
            tx.set_edge_property(
                edge.id,
                props::WEIGHT,
                PropertyValue::Int(summary.weight as i64),
            )?;
            if let Some(hp) = summary.weight_hp {
                tx.set_edge_property(edge.id, props::WEIGHT_HP, PropertyValue::Int(hp as i64))?;
            }
            for duplicate in edges {
                tx.delete_edge(duplicate.id)?;
            }
        }
        None => {
            tx.create_edge(
                pre.node,
                post.node,
                rels::CONNECTS_TO,
                summary.connects_to_properties(),
            )?;
        }
    }

    trace!(
        pre = pre.body_id,
        post = post.body_id,
        weight = summary.weight,
        change = ?change,
        "connection recomputed"
    );
    Ok(change)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facts(confidence: f64, rois: &[&str]) -> SynapseFacts {
        SynapseFacts {
            confidence,
            rois: rois.iter().map(|r| r.to_string()).collect(),
        }
    }

    #[test]
    fn test_summary_without_thresholds() {
        let members = BTreeSet::from([(1, 2), (1, 3)]);
        let summary = ConnectionSummary::fold(
            &members,
            |k| {
                let rois: &[&str] = if *k == 3 { &[] } else { &["R1"] };
                Ok(facts(0.9, rois))
            },
            None,
        )
        .unwrap();
        assert_eq!(summary.weight, 2);
        assert_eq!(summary.weight_hp, None);
        let r1 = summary.roi_info.get("R1").unwrap();
        assert_eq!((r1.pre(), r1.post(), r1.pre_hp()), (1, 1, None));
    }

    #[test]
    fn test_summary_gates_hp_by_confidence() {
        let thresholds = HpThresholds::new(0.5, 0.8).unwrap();
        let members = BTreeSet::from([(1, 2), (1, 3)]);
        let confidences = BTreeMap::from([(1, 0.6), (2, 0.85), (3, 0.8)]);
        let summary = ConnectionSummary::fold(
            &members,
            |k| Ok(facts(confidences[k], &["EB"])),
            Some(&thresholds),
        )
        .unwrap();
        assert_eq!(summary.weight, 2);
        assert_eq!(summary.weight_hp, Some(1));
        let eb = summary.roi_info.get("EB").unwrap();
        assert_eq!(eb.pre(), 1);
        assert_eq!(eb.post(), 2);
        assert_eq!(eb.pre_hp(), Some(1));
        assert_eq!(eb.post_hp(), Some(1));
        assert_eq!(summary.connects_to_properties().len(), 2);
    }
}
