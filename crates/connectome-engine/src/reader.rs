// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Schema-aware reads over any [`GraphRead`].
//!
//! The same reader serves committed reads on a store and reads inside a
//! mutation's transaction.

use connectome_store::{Direction, GraphRead, Node, NodeId, PropertyValue};
use connectome_structures::{HpThresholds, Location, MutationKey, RoiInfo, Soma, SynapseType};
use std::collections::BTreeSet;

use crate::error::{EngineError, EngineResult};
use crate::schema::{props, rels, Schema};
use crate::views::{ConnectionSetView, ConnectsToView, MetaView, SegmentView, SynapseView};

/// A synapse as stored.
#[derive(Debug, Clone, PartialEq)]
pub struct SynapseNode {
    pub id: NodeId,
    pub location: Location,
    pub kind: SynapseType,
    pub confidence: f64,
    pub rois: BTreeSet<String>,
}

/// Ownership of a synapse: the SynapseSet holding it and that set's segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Owner {
    pub set: NodeId,
    pub segment: NodeId,
    pub body_id: u64,
}

pub(crate) fn count(node: &Node, key: &str) -> u64 {
    node.int(key).map_or(0, |v| v.max(0) as u64)
}

pub(crate) fn roi_info(node: &Node) -> EngineResult<RoiInfo> {
    match node.property(props::ROI_INFO) {
        None => Ok(RoiInfo::new()),
        Some(PropertyValue::RoiInfo(info)) => Ok(info.clone()),
        Some(PropertyValue::Str(encoded)) => Ok(RoiInfo::from_json_str(encoded)?),
        Some(other) => Err(EngineError::Consistency(format!(
            "node {} has a non-RoiInfo roiInfo property: {:?}",
            node.id, other
        ))),
    }
}

pub(crate) fn body_id(node: &Node) -> EngineResult<u64> {
    node.int(props::BODY_ID)
        .map(|id| id as u64)
        .ok_or_else(|| EngineError::Consistency(format!("segment node {} has no bodyId", node.id)))
}

pub(crate) fn synapse_from_node(node: &Node) -> EngineResult<SynapseNode> {
    let malformed = |what: &str| {
        EngineError::Consistency(format!("synapse node {} has no valid {}", node.id, what))
    };
    let location = node
        .property(props::LOCATION)
        .and_then(PropertyValue::as_location)
        .ok_or_else(|| malformed(props::LOCATION))?;
    let kind = node
        .str(props::TYPE)
        .and_then(|t| t.parse::<SynapseType>().ok())
        .ok_or_else(|| malformed(props::TYPE))?;
    let confidence = node
        .float(props::CONFIDENCE)
        .ok_or_else(|| malformed(props::CONFIDENCE))?;
    let rois = node
        .property(props::ROIS)
        .and_then(PropertyValue::as_str_list)
        .map(|list| list.iter().cloned().collect())
        .unwrap_or_default();
    Ok(SynapseNode {
        id: node.id,
        location,
        kind,
        confidence,
        rois,
    })
}

fn optional_str(node: &Node, key: &str) -> Option<String> {
    node.str(key).map(str::to_string)
}

pub struct ConnectomeReader<'a, G: GraphRead + ?Sized> {
    graph: &'a G,
    schema: &'a Schema,
}

impl<'a, G: GraphRead + ?Sized> ConnectomeReader<'a, G> {
    pub fn new(graph: &'a G, schema: &'a Schema) -> Self {
        Self { graph, schema }
    }

    pub fn schema(&self) -> &Schema {
        self.schema
    }

    // ========================================================================
    // Node lookups
    // ========================================================================

    pub fn meta_node(&self) -> EngineResult<Node> {
        self.graph
            .find_node(
                self.schema.meta(),
                props::DATASET,
                &self.schema.dataset().into(),
            )?
            .ok_or_else(|| EngineError::not_found("Meta", self.schema.dataset()))
    }

    pub fn segment_node(&self, body_id: u64) -> EngineResult<Option<Node>> {
        Ok(self.graph.find_node(
            self.schema.segment(),
            props::BODY_ID,
            &PropertyValue::Int(body_id as i64),
        )?)
    }

    pub fn require_segment(&self, body_id: u64) -> EngineResult<Node> {
        self.segment_node(body_id)?
            .ok_or_else(|| EngineError::not_found("Segment", body_id))
    }

    pub fn synapse_node(&self, location: Location) -> EngineResult<Option<SynapseNode>> {
        match self.graph.find_node(
            self.schema.synapse(),
            props::LOCATION,
            &PropertyValue::from(location),
        )? {
            Some(node) => Ok(Some(synapse_from_node(&node)?)),
            None => Ok(None),
        }
    }

    pub fn require_synapse(&self, location: Location) -> EngineResult<SynapseNode> {
        self.synapse_node(location)?
            .ok_or_else(|| EngineError::not_found("Synapse", location))
    }

    pub fn synapse_by_id(&self, id: NodeId) -> EngineResult<SynapseNode> {
        let node = self
            .graph
            .node(id)?
            .ok_or_else(|| EngineError::Consistency(format!("synapse node {} vanished", id)))?;
        synapse_from_node(&node)
    }

    pub fn synapse_set_of(&self, segment: NodeId) -> EngineResult<Option<NodeId>> {
        Ok(self
            .graph
            .neighbours(segment, Direction::Outgoing, rels::CONTAINS)?
            .into_iter()
            .find(|node| node.has_label(self.schema.synapse_set()))
            .map(|node| node.id))
    }

    pub fn skeletons_of(&self, segment: NodeId) -> EngineResult<Vec<NodeId>> {
        Ok(self
            .graph
            .neighbours(segment, Direction::Outgoing, rels::CONTAINS)?
            .into_iter()
            .filter(|node| node.has_label(self.schema.skeleton()))
            .map(|node| node.id)
            .collect())
    }

    /// Synapse nodes held by a SynapseSet.
    pub fn set_members(&self, set: NodeId) -> EngineResult<Vec<NodeId>> {
        Ok(self
            .graph
            .edges_of(set, Direction::Outgoing, Some(rels::CONTAINS))?
            .into_iter()
            .map(|edge| edge.to)
            .collect())
    }

    pub fn owner_of(&self, synapse: NodeId) -> EngineResult<Option<Owner>> {
        for container in self
            .graph
            .neighbours(synapse, Direction::Incoming, rels::CONTAINS)?
        {
            if !container.has_label(self.schema.synapse_set()) {
                continue;
            }
            let segment = self
                .graph
                .neighbours(container.id, Direction::Incoming, rels::CONTAINS)?
                .into_iter()
                .find(|node| node.has_label(self.schema.segment()))
                .ok_or_else(|| {
                    EngineError::Consistency(format!(
                        "SynapseSet {} is not attached to a segment",
                        container.id
                    ))
                })?;
            return Ok(Some(Owner {
                set: container.id,
                segment: segment.id,
                body_id: body_id(&segment)?,
            }));
        }
        Ok(None)
    }

    /// Synapses linked with `synapse`: targets of a pre, sources of a post.
    pub fn partners(&self, synapse: &SynapseNode) -> EngineResult<Vec<NodeId>> {
        let direction = match synapse.kind {
            SynapseType::Pre => Direction::Outgoing,
            SynapseType::Post => Direction::Incoming,
        };
        Ok(self
            .graph
            .edges_of(synapse.id, direction, Some(rels::SYNAPSES_TO))?
            .into_iter()
            .map(|edge| edge.other(synapse.id))
            .collect())
    }

    pub fn is_linked(&self, pre: NodeId, post: NodeId) -> EngineResult<bool> {
        Ok(!self
            .graph
            .edges_between(pre, post, rels::SYNAPSES_TO)?
            .is_empty())
    }

    /// ConnectionSets listing `synapse` as a member.
    pub fn connection_sets_containing(&self, synapse: NodeId) -> EngineResult<Vec<NodeId>> {
        Ok(self
            .graph
            .neighbours(synapse, Direction::Incoming, rels::CONTAINS)?
            .into_iter()
            .filter(|node| node.has_label(self.schema.connection_set()))
            .map(|node| node.id)
            .collect())
    }

    pub fn connection_set_node(&self, pre: u64, post: u64) -> EngineResult<Option<Node>> {
        Ok(self.graph.find_node(
            self.schema.connection_set(),
            props::DATASET_BODY_IDS,
            &self.schema.connection_set_key(pre, post).into(),
        )?)
    }

    /// ConnectionSets with `segment` as either endpoint.
    pub fn connection_sets_of(&self, segment: NodeId) -> EngineResult<Vec<NodeId>> {
        let mut sets = BTreeSet::new();
        for rel in [rels::FROM, rels::TO] {
            for edge in self.graph.edges_of(segment, Direction::Incoming, Some(rel))? {
                sets.insert(edge.from);
            }
        }
        Ok(sets.into_iter().collect())
    }

    /// (pre segment, post segment) of a ConnectionSet.
    pub fn connection_endpoints(&self, connection_set: NodeId) -> EngineResult<(NodeId, NodeId)> {
        let endpoint = |rel: &str| -> EngineResult<NodeId> {
            self.graph
                .edges_of(connection_set, Direction::Outgoing, Some(rel))?
                .first()
                .map(|edge| edge.to)
                .ok_or_else(|| {
                    EngineError::Consistency(format!(
                        "ConnectionSet {} has no {} segment",
                        connection_set, rel
                    ))
                })
        };
        Ok((endpoint(rels::FROM)?, endpoint(rels::TO)?))
    }

    pub fn mutation_applied(&self, key: &MutationKey) -> EngineResult<bool> {
        Ok(self
            .graph
            .find_node(
                self.schema.mutation(),
                props::MUTATION_KEY,
                &key.to_string().into(),
            )?
            .is_some())
    }

    pub fn body_id_of(&self, segment: NodeId) -> EngineResult<u64> {
        let node = self
            .graph
            .node(segment)?
            .ok_or_else(|| EngineError::Consistency(format!("segment node {} vanished", segment)))?;
        body_id(&node)
    }

    // ========================================================================
    // Views
    // ========================================================================

    pub fn segment(&self, body_id: u64) -> EngineResult<Option<SegmentView>> {
        let Some(node) = self.segment_node(body_id)? else {
            return Ok(None);
        };
        let soma = match (
            node.property(props::SOMA_LOCATION).and_then(PropertyValue::as_location),
            node.float(props::SOMA_RADIUS),
        ) {
            (Some(location), Some(radius)) => Some(Soma { location, radius }),
            _ => None,
        };
        Ok(Some(SegmentView {
            body_id,
            pre_count: count(&node, props::PRE),
            post_count: count(&node, props::POST),
            roi_info: roi_info(&node)?,
            rois: node
                .property(props::ROIS)
                .and_then(PropertyValue::as_str_list)
                .map(<[String]>::to_vec)
                .unwrap_or_default(),
            is_neuron: node.has_label(self.schema.neuron()),
            size: node.int(props::SIZE).map(|v| v as u64),
            name: optional_str(&node, "name"),
            status: optional_str(&node, "status"),
            instance: optional_str(&node, "instance"),
            primary_neurite: optional_str(&node, "primaryNeurite"),
            major_input: optional_str(&node, "majorInput"),
            major_output: optional_str(&node, "majorOutput"),
            clonal_unit: optional_str(&node, "clonalUnit"),
            neurotransmitter: optional_str(&node, "neurotransmitter"),
            soma,
            time_stamp: time_stamp(&node, props::TIME_STAMP),
        }))
    }

    pub fn synapse(&self, location: Location) -> EngineResult<Option<SynapseView>> {
        let Some(synapse) = self.synapse_node(location)? else {
            return Ok(None);
        };
        let owner = self.owner_of(synapse.id)?.map(|owner| owner.body_id);
        let mut partners = Vec::new();
        for partner in self.partners(&synapse)? {
            partners.push(self.synapse_by_id(partner)?.location);
        }
        partners.sort();
        Ok(Some(SynapseView {
            location,
            kind: synapse.kind,
            confidence: synapse.confidence,
            rois: synapse.rois.into_iter().collect(),
            owner,
            partners,
        }))
    }

    pub fn connects_to(&self, pre: u64, post: u64) -> EngineResult<Option<ConnectsToView>> {
        let (Some(from), Some(to)) = (self.segment_node(pre)?, self.segment_node(post)?) else {
            return Ok(None);
        };
        Ok(self
            .graph
            .edges_between(from.id, to.id, rels::CONNECTS_TO)?
            .first()
            .map(|edge| ConnectsToView {
                pre,
                post,
                weight: edge.int(props::WEIGHT).map_or(0, |w| w as u64),
                weight_hp: edge.int(props::WEIGHT_HP).map(|w| w as u64),
            }))
    }

    /// Every ConnectsTo edge touching `body_id`, outgoing first.
    pub fn connections_of(&self, body_id: u64) -> EngineResult<Vec<ConnectsToView>> {
        let segment = self.require_segment(body_id)?;
        let mut views = Vec::new();
        for direction in [Direction::Outgoing, Direction::Incoming] {
            let mut batch = Vec::new();
            for edge in self
                .graph
                .edges_of(segment.id, direction, Some(rels::CONNECTS_TO))?
            {
                if direction == Direction::Incoming && edge.from == edge.to {
                    continue;
                }
                batch.push(ConnectsToView {
                    pre: self.body_id_of(edge.from)?,
                    post: self.body_id_of(edge.to)?,
                    weight: edge.int(props::WEIGHT).map_or(0, |w| w as u64),
                    weight_hp: edge.int(props::WEIGHT_HP).map(|w| w as u64),
                });
            }
            batch.sort_by_key(|view| (view.pre, view.post));
            views.extend(batch);
        }
        Ok(views)
    }

    pub fn connection_set(&self, pre: u64, post: u64) -> EngineResult<Option<ConnectionSetView>> {
        let Some(node) = self.connection_set_node(pre, post)? else {
            return Ok(None);
        };
        let mut synapses = Vec::new();
        for member in self.set_members(node.id)? {
            synapses.push(self.synapse_by_id(member)?.location);
        }
        synapses.sort();
        Ok(Some(ConnectionSetView {
            pre,
            post,
            roi_info: roi_info(&node)?,
            synapses,
            time_stamp: time_stamp(&node, props::TIME_STAMP),
        }))
    }

    pub fn meta(&self) -> EngineResult<MetaView> {
        let node = self.meta_node()?;
        let thresholds = match (
            node.float(props::PRE_HP_THRESHOLD),
            node.float(props::POST_HP_THRESHOLD),
        ) {
            (Some(pre), Some(post)) => Some(HpThresholds::new(pre, post)?),
            _ => None,
        };
        Ok(MetaView {
            dataset: self.schema.dataset().to_string(),
            total_pre_count: count(&node, props::TOTAL_PRE),
            total_post_count: count(&node, props::TOTAL_POST),
            roi_info: roi_info(&node)?,
            thresholds,
            last_database_edit: time_stamp(&node, props::LAST_DATABASE_EDIT),
        })
    }
}

fn time_stamp(node: &Node, key: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    match node.property(key) {
        Some(PropertyValue::Timestamp(at)) => Some(*at),
        _ => None,
    }
}
