// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Synapse-level mutations: creation, deletion, ownership removal, ROI tags
//! and pre/post links.

use connectome_store::{Direction, GraphWrite, Properties, PropertyValue};
use connectome_structures::{validate_roi_name, Location, SynapseAddition, SynapseType};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

use super::{Delta, MutationOutcome, Mutator, Tally};
use crate::connection_set::{pairs_through, SegmentRef};
use crate::error::{EngineError, EngineResult};
use crate::reader::{Owner, SynapseNode};
use crate::schema::{props, rels};

impl<'t, T: GraphWrite> Mutator<'t, T> {
    /// Create an orphaned synapse and count it in the Meta totals.
    pub fn add_synapse(&mut self, addition: &SynapseAddition) -> EngineResult<MutationOutcome> {
        addition.validate()?;
        if self.reader().synapse_node(addition.location)?.is_some() {
            return Err(EngineError::Conflict(format!(
                "a synapse already exists at {}",
                addition.location
            )));
        }

        let rois: BTreeSet<String> = addition.rois.iter().cloned().collect();
        let mut properties = Properties::new();
        properties.insert(props::LOCATION.to_string(), addition.location.into());
        properties.insert(props::TYPE.to_string(), addition.kind.as_str().into());
        properties.insert(
            props::CONFIDENCE.to_string(),
            PropertyValue::Float(addition.confidence),
        );
        properties.insert(
            props::ROIS.to_string(),
            PropertyValue::StrList(rois.iter().cloned().collect()),
        );
        properties.insert(props::TIME_STAMP.to_string(), Self::now());
        let labels = self.ctx.schema.synapse_labels(addition.kind);
        let id = self.tx.create_node(&labels, properties)?;

        let synapse = SynapseNode {
            id,
            location: addition.location,
            kind: addition.kind,
            confidence: addition.confidence,
            rois,
        };
        self.tally_synapse(Tally::Meta, &synapse, Delta::Add)?;
        info!(location = %addition.location, kind = %addition.kind, "synapse added");
        Ok(MutationOutcome::Applied)
    }

    /// Remove a synapse, first taking it away from its owner so every
    /// derived value drops its contribution.
    pub fn delete_synapse(&mut self, location: Location) -> EngineResult<MutationOutcome> {
        let Some(synapse) = self.reader().synapse_node(location)? else {
            warn!(location = %location, "delete of absent synapse skipped");
            return Ok(MutationOutcome::Skipped);
        };
        self.lock_synapses(&[&synapse])?;

        if let Some(owner) = self.reader().owner_of(synapse.id)? {
            self.detach_from_owner(&synapse, owner)?;
        }
        for link in self
            .tx
            .edges_of(synapse.id, Direction::Both, Some(rels::SYNAPSES_TO))?
        {
            self.tx.delete_edge(link.id)?;
        }
        self.tally_synapse(Tally::Meta, &synapse, Delta::Remove)?;
        self.tx.detach_delete_node(synapse.id)?;
        info!(location = %location, "synapse deleted");
        Ok(MutationOutcome::Applied)
    }

    /// Detach a synapse from its segment, leaving it in the graph unowned.
    pub fn orphan_synapse(&mut self, location: Location) -> EngineResult<MutationOutcome> {
        let synapse = self.reader().require_synapse(location)?;
        self.lock_synapses(&[&synapse])?;

        let Some(owner) = self.reader().owner_of(synapse.id)? else {
            warn!(location = %location, "synapse is already orphaned");
            return Ok(MutationOutcome::Skipped);
        };
        self.detach_from_owner(&synapse, owner)?;
        self.touch(synapse.id)?;
        info!(location = %location, body_id = owner.body_id, "synapse orphaned");
        Ok(MutationOutcome::Applied)
    }

    pub fn add_roi_to_synapse(&mut self, location: Location, roi: &str) -> EngineResult<MutationOutcome> {
        self.change_synapse_roi(location, roi, Delta::Add)
    }

    pub fn remove_roi_from_synapse(
        &mut self,
        location: Location,
        roi: &str,
    ) -> EngineResult<MutationOutcome> {
        self.change_synapse_roi(location, roi, Delta::Remove)
    }

    /// Link a pre-synapse to a post-synapse and refresh the connection
    /// between their owners.
    pub fn link_synapses(&mut self, pre: Location, post: Location) -> EngineResult<MutationOutcome> {
        let (pre_synapse, post_synapse) = self.link_endpoints(pre, post)?;
        self.lock_synapses(&[&pre_synapse, &post_synapse])?;

        if self.reader().is_linked(pre_synapse.id, post_synapse.id)? {
            return Err(EngineError::Conflict(format!(
                "{} is already linked to {}",
                pre, post
            )));
        }
        self.tx.create_edge(
            pre_synapse.id,
            post_synapse.id,
            rels::SYNAPSES_TO,
            Properties::new(),
        )?;
        self.sync_link_owners(&pre_synapse, &post_synapse)?;
        debug!(pre = %pre, post = %post, "synapses linked");
        Ok(MutationOutcome::Applied)
    }

    pub fn unlink_synapses(&mut self, pre: Location, post: Location) -> EngineResult<MutationOutcome> {
        let (pre_synapse, post_synapse) = self.link_endpoints(pre, post)?;
        self.lock_synapses(&[&pre_synapse, &post_synapse])?;

        let links = self
            .tx
            .edges_between(pre_synapse.id, post_synapse.id, rels::SYNAPSES_TO)?;
        if links.is_empty() {
            return Err(EngineError::not_found(
                "SynapsesTo",
                format!("{} -> {}", pre, post),
            ));
        }
        for link in links {
            self.tx.delete_edge(link.id)?;
        }
        self.sync_link_owners(&pre_synapse, &post_synapse)?;
        debug!(pre = %pre, post = %post, "synapses unlinked");
        Ok(MutationOutcome::Applied)
    }

    // ========================================================================
    // Shared steps
    // ========================================================================

    pub(super) fn lock_synapses(&mut self, synapses: &[&SynapseNode]) -> EngineResult<()> {
        let locks = {
            let mut planner = self.planner();
            for synapse in synapses {
                planner.synapse(synapse)?;
            }
            planner.finish()
        };
        self.tx.lock(&locks)?;
        Ok(())
    }

    /// Remove `synapse` from `owner`'s SynapseSet and roll back everything
    /// derived from that ownership.
    pub(super) fn detach_from_owner(&mut self, synapse: &SynapseNode, owner: Owner) -> EngineResult<()> {
        let pairs = pairs_through(&self.reader(), synapse, SegmentRef::from(owner))?;
        for edge in self.tx.edges_between(owner.set, synapse.id, rels::CONTAINS)? {
            self.tx.delete_edge(edge.id)?;
        }
        self.tally_synapse(Tally::Segment(owner.segment), synapse, Delta::Remove)?;
        self.sync_pairs(pairs)?;
        self.refresh_neuron(owner.segment)?;
        Ok(())
    }

    fn change_synapse_roi(
        &mut self,
        location: Location,
        roi: &str,
        delta: Delta,
    ) -> EngineResult<MutationOutcome> {
        validate_roi_name(roi)?;
        let synapse = self.reader().require_synapse(location)?;
        self.lock_synapses(&[&synapse])?;

        let tagged = synapse.rois.contains(roi);
        match delta {
            Delta::Add if tagged => {
                return Err(EngineError::Conflict(format!(
                    "synapse {} is already in ROI '{}'",
                    location, roi
                )))
            }
            Delta::Remove if !tagged => {
                return Err(EngineError::Conflict(format!(
                    "synapse {} is not in ROI '{}'",
                    location, roi
                )))
            }
            _ => {}
        }

        let mut rois = synapse.rois.clone();
        match delta {
            Delta::Add => rois.insert(roi.to_string()),
            Delta::Remove => rois.remove(roi),
        };
        self.tx.set_node_property(
            synapse.id,
            props::ROIS,
            PropertyValue::StrList(rois.into_iter().collect()),
        )?;
        self.touch(synapse.id)?;

        self.tally_roi(Tally::Meta, synapse.kind, roi, delta)?;
        let owner = self.reader().owner_of(synapse.id)?;
        if let Some(owner) = owner {
            self.tally_roi(Tally::Segment(owner.segment), synapse.kind, roi, delta)?;
        }

        let mut pairs = BTreeSet::new();
        {
            let reader = self.reader();
            for connection_set in reader.connection_sets_containing(synapse.id)? {
                let (pre, post) = reader.connection_endpoints(connection_set)?;
                pairs.insert((
                    SegmentRef {
                        node: pre,
                        body_id: reader.body_id_of(pre)?,
                    },
                    SegmentRef {
                        node: post,
                        body_id: reader.body_id_of(post)?,
                    },
                ));
            }
        }
        self.sync_pairs(pairs)?;

        info!(
            location = %location,
            roi,
            added = matches!(delta, Delta::Add),
            owner = owner.map(|o| o.body_id),
            "synapse ROI changed"
        );
        Ok(MutationOutcome::Applied)
    }

    fn link_endpoints(&self, pre: Location, post: Location) -> EngineResult<(SynapseNode, SynapseNode)> {
        let reader = self.reader();
        let pre_synapse = reader.require_synapse(pre)?;
        let post_synapse = reader.require_synapse(post)?;
        if pre_synapse.kind != SynapseType::Pre || post_synapse.kind != SynapseType::Post {
            return Err(EngineError::Consistency(format!(
                "links run from a pre-synapse to a post-synapse; got {} ({}) -> {} ({})",
                pre, pre_synapse.kind, post, post_synapse.kind
            )));
        }
        Ok((pre_synapse, post_synapse))
    }

    fn sync_link_owners(&mut self, pre: &SynapseNode, post: &SynapseNode) -> EngineResult<()> {
        let owners = {
            let reader = self.reader();
            (reader.owner_of(pre.id)?, reader.owner_of(post.id)?)
        };
        if let (Some(from), Some(to)) = owners {
            self.sync_pairs(BTreeSet::from([(SegmentRef::from(from), SegmentRef::from(to))]))?;
        }
        Ok(())
    }
}
