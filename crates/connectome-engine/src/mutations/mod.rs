// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Transactional mutations.

Each mutation runs inside one store transaction that already holds the Meta
lock. A [`Mutator`] plans and acquires the rest of the subgraph locks, applies
the structural change, and keeps every derived value (segment counts and
roiInfo, Meta totals, ConnectionSets, ConnectsTo weights, Neuron labels) in
step with it before the transaction commits.
*/

mod segment;
mod synapse;

use chrono::Utc;
use connectome_store::{GraphWrite, NodeId, PropertyValue};
use connectome_structures::SynapseType;
use std::collections::BTreeSet;
use std::fmt;
use tracing::trace;

use crate::connection_set::{sync_connection, SegmentRef};
use crate::context::EngineContext;
use crate::error::{EngineError, EngineResult};
use crate::locking::LockPlanner;
use crate::reader::{count, roi_info, ConnectomeReader, SynapseNode};
use crate::schema::props;

/// Result of a mutation that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOutcome {
    /// Changes were staged and should be committed.
    Applied,
    /// Nothing to do (deleting something already absent, for instance).
    Skipped,
}

impl MutationOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, MutationOutcome::Applied)
    }
}

impl fmt::Display for MutationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MutationOutcome::Applied => f.write_str("applied"),
            MutationOutcome::Skipped => f.write_str("skipped"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delta {
    Add,
    Remove,
}

/// Node whose synapse tallies are being adjusted.
#[derive(Debug, Clone, Copy)]
enum Tally {
    Meta,
    Segment(NodeId),
}

pub struct Mutator<'t, T: GraphWrite> {
    tx: &'t mut T,
    ctx: &'t EngineContext,
}

impl<'t, T: GraphWrite> Mutator<'t, T> {
    pub fn new(tx: &'t mut T, ctx: &'t EngineContext) -> Self {
        Self { tx, ctx }
    }

    fn reader(&self) -> ConnectomeReader<'_, T> {
        ConnectomeReader::new(&*self.tx, &self.ctx.schema)
    }

    fn planner(&self) -> LockPlanner<'_, T> {
        LockPlanner::new(&*self.tx, &self.ctx.schema, self.ctx.meta)
    }

    fn now() -> PropertyValue {
        PropertyValue::Timestamp(Utc::now())
    }

    fn touch(&mut self, node: NodeId) -> EngineResult<()> {
        self.tx.set_node_property(node, props::TIME_STAMP, Self::now())?;
        Ok(())
    }

    // ========================================================================
    // Tallies
    // ========================================================================

    /// Count (or uncount) a whole synapse against Meta or a segment.
    fn tally_synapse(&mut self, target: Tally, synapse: &SynapseNode, delta: Delta) -> EngineResult<()> {
        let rois: Vec<&str> = synapse.rois.iter().map(String::as_str).collect();
        self.tally(target, synapse.kind, &rois, true, delta)
    }

    /// Adjust only the per-ROI counters for one tag change.
    fn tally_roi(&mut self, target: Tally, kind: SynapseType, roi: &str, delta: Delta) -> EngineResult<()> {
        self.tally(target, kind, &[roi], false, delta)
    }

    fn tally(
        &mut self,
        target: Tally,
        kind: SynapseType,
        rois: &[&str],
        with_count: bool,
        delta: Delta,
    ) -> EngineResult<()> {
        let (node_id, pre_key, post_key) = match target {
            Tally::Meta => (self.ctx.meta, props::TOTAL_PRE, props::TOTAL_POST),
            Tally::Segment(node) => (node, props::PRE, props::POST),
        };
        let node = self
            .tx
            .node(node_id)?
            .ok_or_else(|| EngineError::Consistency(format!("node {} vanished", node_id)))?;

        if with_count {
            let key = match kind {
                SynapseType::Pre => pre_key,
                SynapseType::Post => post_key,
            };
            let current = count(&node, key);
            let updated = match delta {
                Delta::Add => current + 1,
                Delta::Remove => current.checked_sub(1).ok_or_else(|| {
                    EngineError::Consistency(format!(
                        "{} of node {} would drop below zero",
                        key, node_id
                    ))
                })?,
            };
            self.tx
                .set_node_property(node_id, key, PropertyValue::Int(updated as i64))?;
        }

        if !rois.is_empty() {
            let mut info = roi_info(&node)?;
            for roi in rois {
                match delta {
                    Delta::Add => info.increment_for_roi(roi, kind),
                    Delta::Remove => info.decrement_for_roi(roi, kind)?,
                }
            }
            if let Tally::Segment(_) = target {
                self.tx.set_node_property(
                    node_id,
                    props::ROIS,
                    PropertyValue::StrList(info.roi_names()),
                )?;
            }
            self.tx.set_node_property(node_id, props::ROI_INFO, info.into())?;
        }

        if let Tally::Segment(_) = target {
            self.touch(node_id)?;
        }
        Ok(())
    }

    // ========================================================================
    // Derived state
    // ========================================================================

    /// Bring the Neuron labels of `segment` in line with the designation
    /// rule. Returns whether the segment is a Neuron afterwards.
    fn refresh_neuron(&mut self, segment: NodeId) -> EngineResult<bool> {
        let node = self
            .tx
            .node(segment)?
            .ok_or_else(|| EngineError::Consistency(format!("segment node {} vanished", segment)))?;
        let qualifies = self.ctx.neuron_rule.qualifies_node(&node);
        let labelled = node.has_label(self.ctx.schema.neuron());
        if qualifies != labelled {
            for label in self.ctx.schema.neuron_labels() {
                if qualifies {
                    self.tx.add_label(segment, label)?;
                } else {
                    self.tx.remove_label(segment, label)?;
                }
            }
            trace!(segment = %segment, neuron = qualifies, "neuron designation changed");
        }
        Ok(qualifies)
    }

    fn sync_pairs(&mut self, pairs: BTreeSet<(SegmentRef, SegmentRef)>) -> EngineResult<()> {
        for (pre, post) in pairs {
            sync_connection(&mut *self.tx, self.ctx, pre, post)?;
        }
        Ok(())
    }
}
