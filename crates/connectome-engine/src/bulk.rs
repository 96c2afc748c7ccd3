// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Bulk loading of a complete dataset.

The loader computes every derived value in memory (segment counts and
roiInfo, Meta totals, ConnectsTo weights, ConnectionSets) and writes the
result in one transaction. Because everything it writes is new, only the
Meta lock is held.

Per-segment statistics and per-connection summaries are independent, so
they are computed on the rayon pool when the `parallel` feature is on.
*/

use ahash::{AHashMap, AHashSet};
use connectome_store::{GraphWrite, NodeId, Properties, PropertyValue};
use connectome_structures::{
    Location, RoiInfo, SegmentPropertyUpdate, SynapseAddition, SynapseType,
};
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Instant;
use tracing::{debug, info};

use crate::aggregator::ConnectsToAggregator;
use crate::connection_set::{ConnectionSummary, SynapseFacts};
use crate::context::EngineContext;
use crate::error::{EngineError, EngineResult};
use crate::reader::count;
use crate::schema::{props, rels};

/// One pre -> post synapse link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SynapseLink {
    pub pre: Location,
    pub post: Location,
}

/// A segment of a bulk dataset and the synapse locations it owns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkSegment {
    pub body_id: u64,
    #[serde(default)]
    pub synapses: Vec<Location>,
    #[serde(default, flatten)]
    pub properties: SegmentPropertyUpdate,
}

impl BulkSegment {
    pub fn new(body_id: u64, synapses: impl IntoIterator<Item = Location>) -> Self {
        Self {
            body_id,
            synapses: synapses.into_iter().collect(),
            properties: SegmentPropertyUpdate::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BulkDataset {
    #[serde(default)]
    pub synapses: Vec<SynapseAddition>,
    #[serde(default)]
    pub links: Vec<SynapseLink>,
    #[serde(default)]
    pub segments: Vec<BulkSegment>,
}

impl BulkDataset {
    pub fn from_json_str(encoded: &str) -> EngineResult<Self> {
        serde_json::from_str(encoded)
            .map_err(|e| EngineError::Validation(format!("malformed bulk dataset: {}", e)))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkLoadReport {
    pub synapses: usize,
    pub links: usize,
    pub segments: usize,
    pub neurons: usize,
    pub connections: usize,
    /// Links left out of every connection because an endpoint is unowned.
    pub unowned_links: usize,
}

#[derive(Debug)]
struct SegmentStats {
    pre: u64,
    post: u64,
    roi_info: RoiInfo,
    neuron: bool,
}

pub struct BulkLoader {
    parallel: bool,
}

impl BulkLoader {
    pub fn new(parallel: bool) -> Self {
        Self { parallel }
    }

    /// Write `dataset` into `tx`. The dataset in `ctx` must be empty.
    pub fn load<T: GraphWrite>(
        &self,
        tx: &mut T,
        ctx: &EngineContext,
        dataset: &BulkDataset,
    ) -> EngineResult<BulkLoadReport> {
        let started = Instant::now();
        let schema = &ctx.schema;

        if !tx.nodes_with_label(schema.synapse())?.is_empty()
            || !tx.nodes_with_label(schema.segment())?.is_empty()
        {
            return Err(EngineError::Conflict(format!(
                "bulk load requires an empty dataset; '{}' already has data",
                schema.dataset()
            )));
        }

        let synapses = index_synapses(&dataset.synapses)?;
        let links = validate_links(&dataset.links, &synapses)?;
        let owners = index_owners(&dataset.segments, &synapses)?;
        debug!(
            synapses = synapses.len(),
            links = links.len(),
            segments = dataset.segments.len(),
            "bulk dataset validated"
        );

        // Derived values.
        let stats: Vec<SegmentStats> = self.map_all(&dataset.segments, |segment| {
            segment_stats(segment, &synapses, ctx)
        });
        let mut meta_info = RoiInfo::new();
        let (mut total_pre, mut total_post) = (0u64, 0u64);
        for synapse in &dataset.synapses {
            match synapse.kind {
                SynapseType::Pre => total_pre += 1,
                SynapseType::Post => total_post += 1,
            }
            for roi in &synapse.rois {
                meta_info.increment_for_roi(roi, synapse.kind);
            }
        }

        let aggregator = ConnectsToAggregator::fold(
            links.iter().map(|link| (link.pre, link.post)),
            |location| owners.get(location).copied(),
        );
        let pairs: Vec<_> = aggregator.iter().collect();
        let summaries: Vec<EngineResult<ConnectionSummary>> = self.map_all(&pairs, |(_, aggregate)| {
            ConnectionSummary::fold(
                aggregate.members(),
                |location| {
                    synapses
                        .get(location)
                        .map(|synapse| SynapseFacts {
                            confidence: synapse.confidence,
                            rois: synapse.rois.clone(),
                        })
                        .ok_or_else(|| EngineError::not_found("Synapse", location))
                },
                ctx.thresholds.as_ref(),
            )
        });
        let summaries = summaries.into_iter().collect::<EngineResult<Vec<_>>>()?;

        // Synapses and links.
        let mut synapse_ids: AHashMap<Location, NodeId> = AHashMap::with_capacity(synapses.len());
        for synapse in &dataset.synapses {
            let mut properties = Properties::new();
            properties.insert(props::LOCATION.to_string(), synapse.location.into());
            properties.insert(props::TYPE.to_string(), synapse.kind.as_str().into());
            properties.insert(
                props::CONFIDENCE.to_string(),
                PropertyValue::Float(synapse.confidence),
            );
            let rois: BTreeSet<&String> = synapse.rois.iter().collect();
            properties.insert(
                props::ROIS.to_string(),
                PropertyValue::StrList(rois.into_iter().cloned().collect()),
            );
            let id = tx.create_node(&schema.synapse_labels(synapse.kind), properties)?;
            synapse_ids.insert(synapse.location, id);
        }
        let node_of = |location: &Location| -> EngineResult<NodeId> {
            synapse_ids
                .get(location)
                .copied()
                .ok_or_else(|| EngineError::not_found("Synapse", location))
        };
        for link in &links {
            tx.create_edge(
                node_of(&link.pre)?,
                node_of(&link.post)?,
                rels::SYNAPSES_TO,
                Properties::new(),
            )?;
        }

        // Segments with their SynapseSets.
        let mut segment_ids: AHashMap<u64, NodeId> = AHashMap::with_capacity(stats.len());
        let mut neurons = 0usize;
        for (segment, stats) in dataset.segments.iter().zip(&stats) {
            let mut properties = Properties::new();
            properties.insert(
                props::BODY_ID.to_string(),
                PropertyValue::Int(segment.body_id as i64),
            );
            properties.insert(props::PRE.to_string(), PropertyValue::Int(stats.pre as i64));
            properties.insert(props::POST.to_string(), PropertyValue::Int(stats.post as i64));
            properties.insert(
                props::ROIS.to_string(),
                PropertyValue::StrList(stats.roi_info.roi_names()),
            );
            properties.insert(props::ROI_INFO.to_string(), stats.roi_info.clone().into());
            write_update(&mut properties, &segment.properties);

            let node = if stats.neuron {
                neurons += 1;
                let labels: Vec<&str> = schema
                    .segment_labels()
                    .into_iter()
                    .chain(schema.neuron_labels())
                    .collect();
                tx.create_node(&labels, properties)?
            } else {
                tx.create_node(&schema.segment_labels(), properties)?
            };
            segment_ids.insert(segment.body_id, node);

            let mut set_properties = Properties::new();
            set_properties.insert(
                props::DATASET_BODY_ID.to_string(),
                schema.synapse_set_key(segment.body_id).into(),
            );
            let set = tx.create_node(&schema.synapse_set_labels(), set_properties)?;
            tx.create_edge(node, set, rels::CONTAINS, Properties::new())?;
            for location in &segment.synapses {
                tx.create_edge(set, node_of(location)?, rels::CONTAINS, Properties::new())?;
            }
        }

        // Connections.
        for (((pre, post), aggregate), summary) in pairs.iter().zip(&summaries) {
            let (Some(&from), Some(&to)) = (segment_ids.get(pre), segment_ids.get(post)) else {
                return Err(EngineError::Consistency(format!(
                    "connection {} -> {} refers to an unknown segment",
                    pre, post
                )));
            };
            let mut properties = Properties::new();
            properties.insert(
                props::DATASET_BODY_IDS.to_string(),
                schema.connection_set_key(*pre, *post).into(),
            );
            properties.insert(props::ROI_INFO.to_string(), summary.roi_info.clone().into());
            let set = tx.create_node(&schema.connection_set_labels(), properties)?;
            tx.create_edge(set, from, rels::FROM, Properties::new())?;
            tx.create_edge(set, to, rels::TO, Properties::new())?;
            let (pre_synapses, post_synapses) = aggregate.synapses();
            for location in pre_synapses.iter().chain(&post_synapses) {
                tx.create_edge(set, node_of(location)?, rels::CONTAINS, Properties::new())?;
            }
            tx.create_edge(from, to, rels::CONNECTS_TO, summary.connects_to_properties())?;
        }

        // Meta totals.
        let meta = tx
            .node(ctx.meta)?
            .ok_or_else(|| EngineError::not_found("Meta", schema.dataset()))?;
        if count(&meta, props::TOTAL_PRE) != 0 || count(&meta, props::TOTAL_POST) != 0 {
            return Err(EngineError::Consistency(
                "Meta totals are non-zero on an empty dataset".to_string(),
            ));
        }
        tx.set_node_property(ctx.meta, props::TOTAL_PRE, PropertyValue::Int(total_pre as i64))?;
        tx.set_node_property(ctx.meta, props::TOTAL_POST, PropertyValue::Int(total_post as i64))?;
        tx.set_node_property(ctx.meta, props::ROI_INFO, meta_info.into())?;

        let report = BulkLoadReport {
            synapses: synapses.len(),
            links: links.len(),
            segments: dataset.segments.len(),
            neurons,
            connections: pairs.len(),
            unowned_links: aggregator.skipped(),
        };
        info!(
            dataset = schema.dataset(),
            synapses = report.synapses,
            segments = report.segments,
            neurons = report.neurons,
            connections = report.connections,
            unowned_links = report.unowned_links,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "bulk load staged"
        );
        Ok(report)
    }

    #[cfg(feature = "parallel")]
    fn map_all<I, O, F>(&self, items: &[I], f: F) -> Vec<O>
    where
        I: Sync,
        O: Send,
        F: Fn(&I) -> O + Sync + Send,
    {
        if self.parallel {
            items.par_iter().map(f).collect()
        } else {
            items.iter().map(f).collect()
        }
    }

    #[cfg(not(feature = "parallel"))]
    fn map_all<I, O, F>(&self, items: &[I], f: F) -> Vec<O>
    where
        F: Fn(&I) -> O,
    {
        let _ = self.parallel;
        items.iter().map(f).collect()
    }
}

fn index_synapses(synapses: &[SynapseAddition]) -> EngineResult<AHashMap<Location, &SynapseAddition>> {
    let mut index = AHashMap::with_capacity(synapses.len());
    for synapse in synapses {
        synapse.validate()?;
        if index.insert(synapse.location, synapse).is_some() {
            return Err(EngineError::Validation(format!(
                "synapse {} appears twice",
                synapse.location
            )));
        }
    }
    Ok(index)
}

fn validate_links(
    links: &[SynapseLink],
    synapses: &AHashMap<Location, &SynapseAddition>,
) -> EngineResult<BTreeSet<SynapseLink>> {
    let mut unique = BTreeSet::new();
    for link in links {
        let kind_of = |location: &Location| {
            synapses
                .get(location)
                .map(|synapse| synapse.kind)
                .ok_or_else(|| {
                    EngineError::Validation(format!("link endpoint {} is not a synapse", location))
                })
        };
        if kind_of(&link.pre)? != SynapseType::Pre || kind_of(&link.post)? != SynapseType::Post {
            return Err(EngineError::Validation(format!(
                "link {} -> {} must run from a pre- to a post-synapse",
                link.pre, link.post
            )));
        }
        unique.insert(*link);
    }
    Ok(unique)
}

fn index_owners(
    segments: &[BulkSegment],
    synapses: &AHashMap<Location, &SynapseAddition>,
) -> EngineResult<AHashMap<Location, u64>> {
    let mut owners = AHashMap::new();
    let mut bodies = AHashSet::new();
    for segment in segments {
        if segment.body_id == 0 {
            return Err(EngineError::Validation("bodyId must be non-zero".to_string()));
        }
        if !bodies.insert(segment.body_id) {
            return Err(EngineError::Validation(format!(
                "segment {} appears twice",
                segment.body_id
            )));
        }
        segment.properties.validate()?;
        for location in &segment.synapses {
            if !synapses.contains_key(location) {
                return Err(EngineError::Validation(format!(
                    "segment {} lists unknown synapse {}",
                    segment.body_id, location
                )));
            }
            if let Some(previous) = owners.insert(*location, segment.body_id) {
                return Err(EngineError::Validation(format!(
                    "synapse {} is owned by both {} and {}",
                    location, previous, segment.body_id
                )));
            }
        }
    }
    Ok(owners)
}

fn segment_stats(
    segment: &BulkSegment,
    synapses: &AHashMap<Location, &SynapseAddition>,
    ctx: &EngineContext,
) -> SegmentStats {
    let mut stats = SegmentStats {
        pre: 0,
        post: 0,
        roi_info: RoiInfo::new(),
        neuron: false,
    };
    for synapse in segment.synapses.iter().filter_map(|l| synapses.get(l)) {
        match synapse.kind {
            SynapseType::Pre => stats.pre += 1,
            SynapseType::Post => stats.post += 1,
        }
        for roi in &synapse.rois {
            stats.roi_info.increment_for_roi(roi, synapse.kind);
        }
    }
    stats.neuron = ctx
        .neuron_rule
        .qualifies(stats.pre, stats.post, promotes(&segment.properties));
    stats
}

fn promotes(update: &SegmentPropertyUpdate) -> bool {
    update
        .string_properties()
        .any(|(property, _)| property.promotes_to_neuron())
        || update.soma.is_some()
}

fn write_update(properties: &mut Properties, update: &SegmentPropertyUpdate) {
    for (property, value) in update.string_properties() {
        properties.insert(property.as_str().to_string(), value.into());
    }
    if let Some(size) = update.size {
        properties.insert(props::SIZE.to_string(), PropertyValue::Int(size as i64));
    }
    if let Some(soma) = update.soma {
        properties.insert(props::SOMA_LOCATION.to_string(), soma.location.into());
        properties.insert(props::SOMA_RADIUS.to_string(), PropertyValue::Float(soma.radius));
    }
}
