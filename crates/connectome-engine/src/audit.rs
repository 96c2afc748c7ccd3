// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Full-dataset consistency audit.
//!
//! Recomputes every derived value (segment counts, roiInfo and ROI tags,
//! Neuron labels, Meta totals, ConnectsTo weights and ConnectionSets) from
//! the synapses, ownership and links alone, and reports each stored value
//! that differs. The audit only reads; it never repairs.

use ahash::AHashMap;
use connectome_store::{Direction, GraphRead, NodeId, PropertyValue};
use connectome_structures::{Location, RoiInfo, SynapseType};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::{info, warn};

use crate::aggregator::ConnectsToAggregator;
use crate::connection_set::{ConnectionSummary, SynapseFacts};
use crate::context::EngineContext;
use crate::error::{EngineError, EngineResult};
use crate::neuron::NeuronRule;
use crate::reader::{body_id, count, roi_info, synapse_from_node, ConnectomeReader, SynapseNode};
use crate::schema::{props, rels};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Violation {
    SegmentCount {
        body_id: u64,
        field: &'static str,
        stored: u64,
        expected: u64,
    },
    SegmentRoiInfo {
        body_id: u64,
        stored: RoiInfo,
        expected: RoiInfo,
    },
    SegmentRoiTags {
        body_id: u64,
    },
    NeuronLabel {
        body_id: u64,
        expected: bool,
    },
    SharedSynapse {
        location: Location,
    },
    MetaTotal {
        field: &'static str,
        stored: u64,
        expected: u64,
    },
    MetaRoiInfo {
        stored: RoiInfo,
        expected: RoiInfo,
    },
    MissingConnection {
        pre: u64,
        post: u64,
    },
    StaleConnection {
        pre: u64,
        post: u64,
    },
    ConnectionWeight {
        pre: u64,
        post: u64,
        stored: Option<u64>,
        expected: u64,
    },
    ConnectionWeightHp {
        pre: u64,
        post: u64,
        stored: Option<u64>,
        expected: Option<u64>,
    },
    MissingConnectionSet {
        pre: u64,
        post: u64,
    },
    StaleConnectionSet {
        pre: u64,
        post: u64,
    },
    ConnectionRoiInfo {
        pre: u64,
        post: u64,
    },
    ConnectionMembers {
        pre: u64,
        post: u64,
        stored: usize,
        expected: usize,
    },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::SegmentCount {
                body_id,
                field,
                stored,
                expected,
            } => write!(f, "segment {body_id}: {field} is {stored}, expected {expected}"),
            Violation::SegmentRoiInfo {
                body_id,
                stored,
                expected,
            } => write!(f, "segment {body_id}: roiInfo is {stored}, expected {expected}"),
            Violation::SegmentRoiTags { body_id } => {
                write!(f, "segment {body_id}: ROI tags differ from roiInfo keys")
            }
            Violation::NeuronLabel { body_id, expected } => {
                write!(f, "segment {body_id}: Neuron label should be {expected}")
            }
            Violation::SharedSynapse { location } => {
                write!(f, "synapse {location} belongs to more than one segment")
            }
            Violation::MetaTotal {
                field,
                stored,
                expected,
            } => write!(f, "Meta {field} is {stored}, expected {expected}"),
            Violation::MetaRoiInfo { stored, expected } => {
                write!(f, "Meta roiInfo is {stored}, expected {expected}")
            }
            Violation::MissingConnection { pre, post } => {
                write!(f, "ConnectsTo {pre} -> {post} is missing")
            }
            Violation::StaleConnection { pre, post } => {
                write!(f, "ConnectsTo {pre} -> {post} has no backing synapse pairs")
            }
            Violation::ConnectionWeight {
                pre,
                post,
                stored,
                expected,
            } => write!(f, "ConnectsTo {pre} -> {post}: weight {stored:?}, expected {expected}"),
            Violation::ConnectionWeightHp {
                pre,
                post,
                stored,
                expected,
            } => write!(
                f,
                "ConnectsTo {pre} -> {post}: weightHP {stored:?}, expected {expected:?}"
            ),
            Violation::MissingConnectionSet { pre, post } => {
                write!(f, "ConnectionSet {pre} -> {post} is missing")
            }
            Violation::StaleConnectionSet { pre, post } => {
                write!(f, "ConnectionSet {pre} -> {post} has no backing synapse pairs")
            }
            Violation::ConnectionRoiInfo { pre, post } => {
                write!(f, "ConnectionSet {pre} -> {post}: roiInfo differs")
            }
            Violation::ConnectionMembers {
                pre,
                post,
                stored,
                expected,
            } => write!(
                f,
                "ConnectionSet {pre} -> {post}: {stored} member synapses, expected {expected}"
            ),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AuditReport {
    pub segments: usize,
    pub synapses: usize,
    pub connections: usize,
    pub violations: Vec<Violation>,
}

impl AuditReport {
    pub fn is_consistent(&self) -> bool {
        self.violations.is_empty()
    }
}

impl fmt::Display for AuditReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "audited {} segments, {} synapses, {} connections: {} violation(s)",
            self.segments,
            self.synapses,
            self.connections,
            self.violations.len()
        )?;
        for violation in &self.violations {
            writeln!(f, "  - {}", violation)?;
        }
        Ok(())
    }
}

struct SegmentEntry {
    node: NodeId,
    body_id: u64,
    members: Vec<NodeId>,
}

/// Audit the dataset described by `ctx` as stored in `graph`.
pub fn audit<G: GraphRead + ?Sized>(graph: &G, ctx: &EngineContext) -> EngineResult<AuditReport> {
    let schema = &ctx.schema;
    let reader = ConnectomeReader::new(graph, schema);
    let mut report = AuditReport::default();

    let mut synapses: BTreeMap<NodeId, SynapseNode> = BTreeMap::new();
    for node in graph.nodes_with_label(schema.synapse())? {
        let synapse = synapse_from_node(&node)?;
        synapses.insert(synapse.id, synapse);
    }
    report.synapses = synapses.len();

    let mut segments = Vec::new();
    for node in graph.nodes_with_label(schema.segment())? {
        let members = match reader.synapse_set_of(node.id)? {
            Some(set) => reader.set_members(set)?,
            None => Vec::new(),
        };
        segments.push(SegmentEntry {
            node: node.id,
            body_id: body_id(&node)?,
            members,
        });
    }
    report.segments = segments.len();

    let mut owners: AHashMap<NodeId, u64> = AHashMap::new();
    for segment in &segments {
        for member in &segment.members {
            if owners.insert(*member, segment.body_id).is_some() {
                let location = synapses
                    .get(member)
                    .map(|s| s.location)
                    .ok_or_else(|| EngineError::not_found("Synapse", member))?;
                report.violations.push(Violation::SharedSynapse { location });
            }
        }
    }

    for segment in &segments {
        check_segment(graph, ctx, segment, &synapses, &mut report.violations)?;
    }
    check_meta(&reader, &synapses, &mut report.violations)?;

    let mut links = Vec::new();
    for synapse in synapses.values().filter(|s| s.kind == SynapseType::Pre) {
        for edge in graph.edges_of(synapse.id, Direction::Outgoing, Some(rels::SYNAPSES_TO))? {
            links.push((synapse.id, edge.to));
        }
    }
    let aggregator = ConnectsToAggregator::fold(links, |id| owners.get(id).copied());
    report.connections = aggregator.len();
    let nodes: AHashMap<u64, NodeId> = segments.iter().map(|s| (s.body_id, s.node)).collect();
    check_connections(graph, ctx, &aggregator, &nodes, &synapses, &mut report.violations)?;

    if report.is_consistent() {
        info!(
            dataset = schema.dataset(),
            segments = report.segments,
            synapses = report.synapses,
            "audit passed"
        );
    } else {
        warn!(
            dataset = schema.dataset(),
            violations = report.violations.len(),
            "audit found inconsistencies"
        );
    }
    Ok(report)
}

fn check_segment<G: GraphRead + ?Sized>(
    graph: &G,
    ctx: &EngineContext,
    segment: &SegmentEntry,
    synapses: &BTreeMap<NodeId, SynapseNode>,
    violations: &mut Vec<Violation>,
) -> EngineResult<()> {
    let node = graph
        .node(segment.node)?
        .ok_or_else(|| EngineError::not_found("Segment", segment.body_id))?;
    let body_id = segment.body_id;

    let (mut pre, mut post) = (0u64, 0u64);
    let mut expected = RoiInfo::new();
    for member in &segment.members {
        let synapse = synapses
            .get(member)
            .ok_or_else(|| EngineError::not_found("Synapse", member))?;
        match synapse.kind {
            SynapseType::Pre => pre += 1,
            SynapseType::Post => post += 1,
        }
        for roi in &synapse.rois {
            expected.increment_for_roi(roi, synapse.kind);
        }
    }

    for (field, key, value) in [("pre", props::PRE, pre), ("post", props::POST, post)] {
        let stored = count(&node, key);
        if stored != value {
            violations.push(Violation::SegmentCount {
                body_id,
                field,
                stored,
                expected: value,
            });
        }
    }
    let stored = roi_info(&node)?;
    if stored != expected {
        violations.push(Violation::SegmentRoiInfo {
            body_id,
            stored,
            expected: expected.clone(),
        });
    }
    let tags = node
        .property(props::ROIS)
        .and_then(PropertyValue::as_str_list)
        .map(<[String]>::to_vec)
        .unwrap_or_default();
    if tags != expected.roi_names() {
        violations.push(Violation::SegmentRoiTags { body_id });
    }

    let annotated = NeuronRule::promoting_keys().any(|key| node.property(key).is_some());
    let should_be_neuron = ctx.neuron_rule.qualifies(pre, post, annotated);
    if node.has_label(ctx.schema.neuron()) != should_be_neuron {
        violations.push(Violation::NeuronLabel {
            body_id,
            expected: should_be_neuron,
        });
    }
    Ok(())
}

fn check_meta<G: GraphRead + ?Sized>(
    reader: &ConnectomeReader<'_, G>,
    synapses: &BTreeMap<NodeId, SynapseNode>,
    violations: &mut Vec<Violation>,
) -> EngineResult<()> {
    let meta = reader.meta_node()?;
    let (mut pre, mut post) = (0u64, 0u64);
    let mut expected = RoiInfo::new();
    for synapse in synapses.values() {
        match synapse.kind {
            SynapseType::Pre => pre += 1,
            SynapseType::Post => post += 1,
        }
        for roi in &synapse.rois {
            expected.increment_for_roi(roi, synapse.kind);
        }
    }
    for (field, key, value) in [
        ("totalPreCount", props::TOTAL_PRE, pre),
        ("totalPostCount", props::TOTAL_POST, post),
    ] {
        let stored = count(&meta, key);
        if stored != value {
            violations.push(Violation::MetaTotal {
                field,
                stored,
                expected: value,
            });
        }
    }
    let stored = roi_info(&meta)?;
    if stored != expected {
        violations.push(Violation::MetaRoiInfo { stored, expected });
    }
    Ok(())
}

fn check_connections<G: GraphRead + ?Sized>(
    graph: &G,
    ctx: &EngineContext,
    aggregator: &ConnectsToAggregator<NodeId>,
    nodes: &AHashMap<u64, NodeId>,
    synapses: &BTreeMap<NodeId, SynapseNode>,
    violations: &mut Vec<Violation>,
) -> EngineResult<()> {
    let schema = &ctx.schema;
    let reader = ConnectomeReader::new(graph, schema);
    let body_of: AHashMap<NodeId, u64> = nodes.iter().map(|(body, node)| (*node, *body)).collect();

    let mut expected_pairs = BTreeSet::new();
    for (&(pre, post), aggregate) in aggregator.iter() {
        expected_pairs.insert((pre, post));
        let summary = ConnectionSummary::fold(
            aggregate.members(),
            |id| {
                synapses
                    .get(id)
                    .map(SynapseFacts::from)
                    .ok_or_else(|| EngineError::not_found("Synapse", id))
            },
            ctx.thresholds.as_ref(),
        )?;
        let (Some(&from), Some(&to)) = (nodes.get(&pre), nodes.get(&post)) else {
            continue;
        };

        match graph.edges_between(from, to, rels::CONNECTS_TO)?.first() {
            None => violations.push(Violation::MissingConnection { pre, post }),
            Some(edge) => {
                let weight = edge.int(props::WEIGHT).map(|w| w.max(0) as u64);
                if weight != Some(summary.weight) {
                    violations.push(Violation::ConnectionWeight {
                        pre,
                        post,
                        stored: weight,
                        expected: summary.weight,
                    });
                }
                let weight_hp = edge.int(props::WEIGHT_HP).map(|w| w.max(0) as u64);
                if weight_hp != summary.weight_hp {
                    violations.push(Violation::ConnectionWeightHp {
                        pre,
                        post,
                        stored: weight_hp,
                        expected: summary.weight_hp,
                    });
                }
            }
        }

        match reader.connection_set_node(pre, post)? {
            None => violations.push(Violation::MissingConnectionSet { pre, post }),
            Some(set) => {
                if roi_info(&set)? != summary.roi_info {
                    violations.push(Violation::ConnectionRoiInfo { pre, post });
                }
                let stored: BTreeSet<NodeId> = reader.set_members(set.id)?.into_iter().collect();
                let (pre_synapses, post_synapses) = aggregate.synapses();
                let expected: BTreeSet<NodeId> =
                    pre_synapses.into_iter().chain(post_synapses).collect();
                if stored != expected {
                    violations.push(Violation::ConnectionMembers {
                        pre,
                        post,
                        stored: stored.len(),
                        expected: expected.len(),
                    });
                }
            }
        }
    }

    for (&node, &pre) in &body_of {
        for edge in graph.edges_of(node, Direction::Outgoing, Some(rels::CONNECTS_TO))? {
            let post = body_of.get(&edge.to).copied().unwrap_or_default();
            if !expected_pairs.contains(&(pre, post)) {
                violations.push(Violation::StaleConnection { pre, post });
            }
        }
    }
    for set in graph.nodes_with_label(schema.connection_set())? {
        let (from, to) = reader.connection_endpoints(set.id)?;
        let pair = (
            body_of.get(&from).copied().unwrap_or_default(),
            body_of.get(&to).copied().unwrap_or_default(),
        );
        if !expected_pairs.contains(&pair) {
            violations.push(Violation::StaleConnectionSet {
                pre: pair.0,
                post: pair.1,
            });
        }
    }
    Ok(())
}
