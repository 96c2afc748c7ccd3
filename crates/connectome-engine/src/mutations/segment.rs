// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Segment-level mutations.

use connectome_store::{Direction, GraphWrite, NodeId, Properties, PropertyValue};
use connectome_structures::{
    Location, RoiInfo, SegmentAddition, SegmentProperty, SegmentPropertyUpdate, SynapseType,
};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

use super::{Delta, MutationOutcome, Mutator, Tally};
use crate::connection_set::{pairs_through, SegmentRef};
use crate::error::{EngineError, EngineResult};
use crate::reader::SynapseNode;
use crate::schema::{props, rels};

impl<'t, T: GraphWrite> Mutator<'t, T> {
    /// Give an orphaned synapse to an existing segment.
    pub fn add_synapse_to_segment(&mut self, location: Location, body_id: u64) -> EngineResult<MutationOutcome> {
        let (synapse, segment) = {
            let reader = self.reader();
            (reader.require_synapse(location)?, reader.require_segment(body_id)?)
        };
        let locks = {
            let mut planner = self.planner();
            planner.primary_segment(segment.id)?;
            planner.synapse(&synapse)?;
            planner.finish()
        };
        self.tx.lock(&locks)?;

        let (owner, synapse_set) = {
            let reader = self.reader();
            (reader.owner_of(synapse.id)?, reader.synapse_set_of(segment.id)?)
        };
        if let Some(owner) = owner {
            return Err(EngineError::Consistency(format!(
                "synapse {} already belongs to segment {}",
                location, owner.body_id
            )));
        }
        let synapse_set = synapse_set.ok_or_else(|| {
            EngineError::Consistency(format!("segment {} has no SynapseSet", body_id))
        })?;

        self.tx
            .create_edge(synapse_set, synapse.id, rels::CONTAINS, Properties::new())?;
        self.tally_synapse(Tally::Segment(segment.id), &synapse, Delta::Add)?;
        let pairs = pairs_through(
            &self.reader(),
            &synapse,
            SegmentRef {
                node: segment.id,
                body_id,
            },
        )?;
        self.sync_pairs(pairs)?;
        let neuron = self.refresh_neuron(segment.id)?;
        self.touch(synapse.id)?;
        info!(location = %location, body_id, neuron, "synapse added to segment");
        Ok(MutationOutcome::Applied)
    }

    /// Create a segment that takes ownership of the listed orphaned synapses.
    pub fn add_segment(&mut self, addition: &SegmentAddition) -> EngineResult<MutationOutcome> {
        addition.validate()?;
        let key = addition.mutation_key()?;
        let body_id = addition.body_id;

        let synapses = {
            let reader = self.reader();
            if reader.mutation_applied(&key)? {
                return Err(EngineError::Conflict(format!(
                    "mutation {} has already been applied",
                    key
                )));
            }
            if reader.segment_node(body_id)?.is_some() {
                return Err(EngineError::Conflict(format!(
                    "segment {} already exists",
                    body_id
                )));
            }
            let mut synapses = Vec::with_capacity(addition.current_synapses.len());
            for listed in &addition.current_synapses {
                let synapse = reader.require_synapse(listed.location)?;
                if synapse.kind != listed.kind {
                    return Err(EngineError::Consistency(format!(
                        "synapse {} is {} but was listed as {}",
                        listed.location, synapse.kind, listed.kind
                    )));
                }
                synapses.push(synapse);
            }
            synapses
        };

        let refs: Vec<&SynapseNode> = synapses.iter().collect();
        self.lock_synapses(&refs)?;
        {
            let reader = self.reader();
            for synapse in &synapses {
                if let Some(owner) = reader.owner_of(synapse.id)? {
                    return Err(EngineError::Consistency(format!(
                        "synapse {} already belongs to segment {}",
                        synapse.location, owner.body_id
                    )));
                }
            }
        }

        let mut pre = 0u64;
        let mut post = 0u64;
        let mut roi_info = RoiInfo::new();
        for synapse in &synapses {
            match synapse.kind {
                SynapseType::Pre => pre += 1,
                SynapseType::Post => post += 1,
            }
            for roi in &synapse.rois {
                roi_info.increment_for_roi(roi, synapse.kind);
            }
        }

        let ctx = self.ctx;
        let schema = &ctx.schema;
        let mut properties = Properties::new();
        properties.insert(props::BODY_ID.to_string(), PropertyValue::Int(body_id as i64));
        properties.insert(props::PRE.to_string(), PropertyValue::Int(pre as i64));
        properties.insert(props::POST.to_string(), PropertyValue::Int(post as i64));
        properties.insert(
            props::ROIS.to_string(),
            PropertyValue::StrList(roi_info.roi_names()),
        );
        properties.insert(props::ROI_INFO.to_string(), roi_info.into());
        properties.insert(
            props::MUTATION_UUID.to_string(),
            addition.mutation_uuid.as_str().into(),
        );
        properties.insert(
            props::MUTATION_ID.to_string(),
            PropertyValue::Int(addition.mutation_id as i64),
        );
        properties.insert(props::TIME_STAMP.to_string(), Self::now());
        let segment = self.tx.create_node(&schema.segment_labels(), properties)?;
        self.write_properties(segment, &addition.property_update())?;

        let mut set_properties = Properties::new();
        set_properties.insert(
            props::DATASET_BODY_ID.to_string(),
            schema.synapse_set_key(body_id).into(),
        );
        let synapse_set = self
            .tx
            .create_node(&schema.synapse_set_labels(), set_properties)?;
        self.tx
            .create_edge(segment, synapse_set, rels::CONTAINS, Properties::new())?;
        for synapse in &synapses {
            self.tx
                .create_edge(synapse_set, synapse.id, rels::CONTAINS, Properties::new())?;
            self.touch(synapse.id)?;
        }

        // Ownership is in place for every listed synapse, so links between
        // two of them resolve to a self-connection here.
        let owner = SegmentRef {
            node: segment,
            body_id,
        };
        let mut pairs = BTreeSet::new();
        {
            let reader = self.reader();
            for synapse in &synapses {
                pairs.extend(pairs_through(&reader, synapse, owner)?);
            }
        }
        let connections = pairs.len();
        self.sync_pairs(pairs)?;
        let neuron = self.refresh_neuron(segment)?;

        let mut record = Properties::new();
        record.insert(props::MUTATION_KEY.to_string(), key.to_string().into());
        record.insert(props::BODY_ID.to_string(), PropertyValue::Int(body_id as i64));
        record.insert(
            props::SYNAPSE_SOURCES.to_string(),
            PropertyValue::IntList(addition.synapse_sources.iter().map(|b| *b as i64).collect()),
        );
        record.insert(props::TIME_STAMP.to_string(), Self::now());
        self.tx
            .create_node(&schema.mutation_labels(), record)?;
        if !addition.synapse_sources.is_empty() {
            debug!(body_id, sources = ?addition.synapse_sources, "synapse provenance recorded");
        }

        info!(
            body_id,
            mutation = %key,
            synapses = synapses.len(),
            pre,
            post,
            connections,
            neuron,
            "segment added"
        );
        Ok(MutationOutcome::Applied)
    }

    /// Remove a segment with its SynapseSet, skeletons and connections.
    /// Its synapses stay in the graph as orphans.
    pub fn delete_segment(&mut self, body_id: u64) -> EngineResult<MutationOutcome> {
        let Some(segment) = self.reader().segment_node(body_id)? else {
            warn!(body_id, "delete of absent segment skipped");
            return Ok(MutationOutcome::Skipped);
        };
        let locks = {
            let mut planner = self.planner();
            planner.segment(segment.id)?;
            planner.finish()
        };
        self.tx.lock(&locks)?;

        let (connection_sets, synapse_set, skeletons) = {
            let reader = self.reader();
            (
                reader.connection_sets_of(segment.id)?,
                reader.synapse_set_of(segment.id)?,
                reader.skeletons_of(segment.id)?,
            )
        };
        for connection_set in &connection_sets {
            self.tx.detach_delete_node(*connection_set)?;
        }
        let mut connections = 0usize;
        for edge in self
            .tx
            .edges_of(segment.id, Direction::Both, Some(rels::CONNECTS_TO))?
        {
            self.tx.delete_edge(edge.id)?;
            connections += 1;
        }

        let mut orphaned = 0usize;
        if let Some(synapse_set) = synapse_set {
            orphaned = self.reader().set_members(synapse_set)?.len();
            self.tx.detach_delete_node(synapse_set)?;
        }
        for skeleton in skeletons {
            self.delete_skeleton(skeleton)?;
        }
        self.tx.detach_delete_node(segment.id)?;

        info!(
            body_id,
            orphaned,
            connections,
            connection_sets = connection_sets.len(),
            "segment deleted"
        );
        Ok(MutationOutcome::Applied)
    }

    pub fn update_segment_properties(
        &mut self,
        body_id: u64,
        update: &SegmentPropertyUpdate,
    ) -> EngineResult<MutationOutcome> {
        update.validate()?;
        if update.is_empty() {
            return Err(EngineError::Validation(
                "property update sets nothing".to_string(),
            ));
        }
        let segment = self.lock_segment(body_id)?;
        self.write_properties(segment, update)?;
        self.touch(segment)?;
        let neuron = self.refresh_neuron(segment)?;
        info!(body_id, neuron, "segment properties updated");
        Ok(MutationOutcome::Applied)
    }

    pub fn remove_segment_property(
        &mut self,
        body_id: u64,
        property: SegmentProperty,
    ) -> EngineResult<MutationOutcome> {
        let segment = self.lock_segment(body_id)?;
        let mut removed = false;
        for key in property.keys() {
            removed |= self.tx.remove_node_property(segment, key)?.is_some();
        }
        if !removed {
            warn!(body_id, property = %property, "property not set; removal skipped");
            return Ok(MutationOutcome::Skipped);
        }
        self.touch(segment)?;
        let neuron = self.refresh_neuron(segment)?;
        info!(body_id, property = %property, neuron, "segment property removed");
        Ok(MutationOutcome::Applied)
    }

    // ========================================================================
    // Shared steps
    // ========================================================================

    fn lock_segment(&mut self, body_id: u64) -> EngineResult<NodeId> {
        let segment = self.reader().require_segment(body_id)?;
        let locks = {
            let mut planner = self.planner();
            planner.primary_segment(segment.id)?;
            planner.finish()
        };
        self.tx.lock(&locks)?;
        Ok(segment.id)
    }

    fn write_properties(&mut self, segment: NodeId, update: &SegmentPropertyUpdate) -> EngineResult<()> {
        for (property, value) in update.string_properties() {
            self.tx
                .set_node_property(segment, property.as_str(), value.into())?;
        }
        if let Some(size) = update.size {
            self.tx
                .set_node_property(segment, props::SIZE, PropertyValue::Int(size as i64))?;
        }
        if let Some(soma) = update.soma {
            self.tx
                .set_node_property(segment, props::SOMA_LOCATION, soma.location.into())?;
            self.tx.set_node_property(
                segment,
                props::SOMA_RADIUS,
                PropertyValue::Float(soma.radius),
            )?;
        }
        Ok(())
    }

    fn delete_skeleton(&mut self, skeleton: NodeId) -> EngineResult<()> {
        let members: Vec<NodeId> = self
            .tx
            .neighbours(skeleton, Direction::Outgoing, rels::CONTAINS)?
            .into_iter()
            .filter(|node| node.has_label(self.ctx.schema.skel_node()))
            .map(|node| node.id)
            .collect();
        for member in members {
            self.tx.detach_delete_node(member)?;
        }
        self.tx.detach_delete_node(skeleton)?;
        Ok(())
    }
}
