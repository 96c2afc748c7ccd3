// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Subgraph lock planning.

Before a mutation writes anything it collects every entity it may touch into
a [`LockSet`]:

1. the dataset Meta node (the root, always acquired first)
2. the primary segment(s)
3. each one-hop ConnectsTo edge and its other endpoint
4. the SynapseSet and skeleton with their one-hop members
5. "targets" partners of touched synapses and their owners
6. ConnectionSets reachable from the primary segments, with their edges

Planning reads the graph after the Meta lock is held, so no other writer can
change the neighbourhood between planning and acquisition. The remaining
targets are then acquired in ascending id order.
*/

use connectome_store::{Direction, GraphRead, LockSet, NodeId};
use std::collections::BTreeSet;

use crate::error::EngineResult;
use crate::reader::{ConnectomeReader, SynapseNode};
use crate::schema::{rels, Schema};

pub struct LockPlanner<'a, G: GraphRead + ?Sized> {
    graph: &'a G,
    reader: ConnectomeReader<'a, G>,
    set: LockSet,
    segments: BTreeSet<NodeId>,
    connection_sets: BTreeSet<NodeId>,
}

impl<'a, G: GraphRead + ?Sized> LockPlanner<'a, G> {
    pub fn new(graph: &'a G, schema: &'a Schema, meta: NodeId) -> Self {
        Self {
            graph,
            reader: ConnectomeReader::new(graph, schema),
            set: LockSet::with_root(meta),
            segments: BTreeSet::new(),
            connection_sets: BTreeSet::new(),
        }
    }

    /// A segment whose counts or properties change, and its SynapseSet node.
    pub fn primary_segment(&mut self, segment: NodeId) -> EngineResult<&mut Self> {
        self.set.add_node(segment);
        if let Some(synapse_set) = self.reader.synapse_set_of(segment)? {
            self.set.add_node(synapse_set);
            for edge in self
                .graph
                .edges_between(segment, synapse_set, rels::CONTAINS)?
            {
                self.set.add_edge(edge.id);
            }
        }
        Ok(self)
    }

    /// A segment and its whole neighbourhood, for deletion.
    pub fn segment(&mut self, segment: NodeId) -> EngineResult<&mut Self> {
        if !self.segments.insert(segment) {
            return Ok(self);
        }
        self.primary_segment(segment)?;

        for edge in self
            .graph
            .edges_of(segment, Direction::Both, Some(rels::CONNECTS_TO))?
        {
            self.set.add_edge(edge.id);
            self.set.add_node(edge.other(segment));
        }

        if let Some(synapse_set) = self.reader.synapse_set_of(segment)? {
            for edge in self
                .graph
                .edges_of(synapse_set, Direction::Outgoing, Some(rels::CONTAINS))?
            {
                self.set.add_edge(edge.id);
                self.set.add_node(edge.to);
            }
        }

        for skeleton in self.reader.skeletons_of(segment)? {
            self.set.add_node(skeleton);
            for edge in self.graph.edges_of(skeleton, Direction::Both, None)? {
                self.set.add_edge(edge.id);
                let member = edge.other(skeleton);
                self.set.add_node(member);
                if member == segment {
                    continue;
                }
                for link in self.graph.edges_of(member, Direction::Both, None)? {
                    self.set.add_edge(link.id);
                }
            }
        }

        for connection_set in self.reader.connection_sets_of(segment)? {
            self.connection_set(connection_set)?;
        }
        Ok(self)
    }

    /// A synapse whose ownership, links or tags change.
    pub fn synapse(&mut self, synapse: &SynapseNode) -> EngineResult<&mut Self> {
        self.set.add_node(synapse.id);

        for edge in self
            .graph
            .edges_of(synapse.id, Direction::Incoming, Some(rels::CONTAINS))?
        {
            self.set.add_edge(edge.id);
            self.set.add_node(edge.from);
        }
        let owner = self.reader.owner_of(synapse.id)?;
        if let Some(owner) = owner {
            self.set.add_node(owner.segment);
        }

        for edge in self
            .graph
            .edges_of(synapse.id, Direction::Both, Some(rels::SYNAPSES_TO))?
        {
            self.set.add_edge(edge.id);
            let partner = edge.other(synapse.id);
            self.set.add_node(partner);
            let Some(partner_owner) = self.reader.owner_of(partner)? else {
                continue;
            };
            self.set.add_node(partner_owner.set);
            self.set.add_node(partner_owner.segment);
            if let Some(owner) = owner {
                let (from, to) = if edge.from == synapse.id {
                    (owner, partner_owner)
                } else {
                    (partner_owner, owner)
                };
                for connects in self
                    .graph
                    .edges_between(from.segment, to.segment, rels::CONNECTS_TO)?
                {
                    self.set.add_edge(connects.id);
                }
                if let Some(node) = self.reader.connection_set_node(from.body_id, to.body_id)? {
                    self.connection_set(node.id)?;
                }
            }
        }

        for connection_set in self.reader.connection_sets_containing(synapse.id)? {
            self.connection_set(connection_set)?;
        }
        Ok(self)
    }

    /// A ConnectionSet with its From/To/Contains edges and their targets.
    pub fn connection_set(&mut self, connection_set: NodeId) -> EngineResult<&mut Self> {
        if !self.connection_sets.insert(connection_set) {
            return Ok(self);
        }
        self.set.add_node(connection_set);
        for edge in self
            .graph
            .edges_of(connection_set, Direction::Outgoing, None)?
        {
            self.set.add_edge(edge.id);
            self.set.add_node(edge.to);
        }
        Ok(self)
    }

    pub fn finish(self) -> LockSet {
        self.set
    }
}
