// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
The connectome engine: one dataset on one graph store.

Every public mutation follows the same shape:

1. begin a store transaction and lock the dataset's Meta node
2. plan and lock the rest of the touched subgraph, then apply the change and
   its derived updates ([`Mutator`])
3. on success stamp `lastDatabaseEdit` and commit; on error roll back

Reads go straight to the store's committed state and never block.
*/

use chrono::Utc;
use connectome_config::validation::is_valid_dataset_name;
use connectome_config::ConnectomeConfig;
use connectome_store::{
    GraphStore, GraphTransaction, GraphWrite, InMemoryGraph, LockSet, NodeId, Properties,
    PropertyValue,
};
use connectome_structures::{
    HpThresholds, Location, RoiInfo, SegmentAddition, SegmentProperty, SegmentPropertyUpdate,
    SynapseAddition,
};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::audit::{audit, AuditReport};
use crate::bulk::{BulkDataset, BulkLoadReport, BulkLoader};
use crate::context::EngineContext;
use crate::error::{EngineError, EngineResult};
use crate::mutations::{MutationOutcome, Mutator};
use crate::neuron::NeuronRule;
use crate::reader::ConnectomeReader;
use crate::schema::{props, Schema};
use crate::views::{ConnectionSetView, ConnectsToView, MetaView, SegmentView, SynapseView};

/// How to open a dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineOptions {
    pub dataset: String,
    /// Used only when the dataset's Meta node is created; an existing Meta
    /// node keeps the thresholds it was created with.
    pub thresholds: Option<HpThresholds>,
    pub neuron_rule: NeuronRule,
    pub bulk_parallel: bool,
}

impl EngineOptions {
    pub fn new(dataset: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            thresholds: None,
            neuron_rule: NeuronRule::default(),
            bulk_parallel: true,
        }
    }

    pub fn with_thresholds(mut self, thresholds: HpThresholds) -> Self {
        self.thresholds = Some(thresholds);
        self
    }

    pub fn with_neuron_rule(mut self, rule: NeuronRule) -> Self {
        self.neuron_rule = rule;
        self
    }

    pub fn with_bulk_parallel(mut self, parallel: bool) -> Self {
        self.bulk_parallel = parallel;
        self
    }

    pub fn from_config(config: &ConnectomeConfig) -> EngineResult<Self> {
        let thresholds = match (config.dataset.pre_hp_threshold, config.dataset.post_hp_threshold) {
            (Some(pre), Some(post)) => Some(HpThresholds::new(pre, post)?),
            (None, None) => None,
            _ => {
                return Err(EngineError::Validation(
                    "preHPThreshold and postHPThreshold must be set together".to_string(),
                ))
            }
        };
        Ok(Self {
            dataset: config.dataset.name.clone(),
            thresholds,
            neuron_rule: NeuronRule::new(config.neuron.pre_threshold, config.neuron.post_threshold),
            bulk_parallel: config.bulk_load.parallel,
        })
    }
}

pub struct ConnectomeEngine<S: GraphStore> {
    store: S,
    ctx: EngineContext,
    bulk_parallel: bool,
}

impl<S: GraphStore> std::fmt::Debug for ConnectomeEngine<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectomeEngine")
            .field("ctx", &self.ctx)
            .field("bulk_parallel", &self.bulk_parallel)
            .finish_non_exhaustive()
    }
}

impl<S: GraphStore> ConnectomeEngine<S> {
    /// Open (or initialise) `options.dataset` on `store`.
    pub fn open(store: S, options: EngineOptions) -> EngineResult<Self> {
        if !is_valid_dataset_name(&options.dataset) {
            return Err(EngineError::Validation(format!(
                "'{}' is not a valid dataset name",
                options.dataset
            )));
        }
        let schema = Schema::new(options.dataset.as_str());
        for (label, key) in schema.indexes() {
            store.create_index(label, key);
        }

        let (meta, thresholds) = {
            let mut tx = store.begin();
            let existing = ConnectomeReader::new(&tx, &schema).meta_node();
            match existing {
                Ok(node) => {
                    let stored = match (
                        node.float(props::PRE_HP_THRESHOLD),
                        node.float(props::POST_HP_THRESHOLD),
                    ) {
                        (Some(pre), Some(post)) => Some(HpThresholds::new(pre, post)?),
                        _ => None,
                    };
                    if options.thresholds.is_some() && options.thresholds != stored {
                        warn!(
                            dataset = %options.dataset,
                            "ignoring configured HP thresholds; dataset keeps its stored ones"
                        );
                    }
                    tx.rollback();
                    (node.id, stored)
                }
                Err(err) if err.is_not_found() => {
                    let meta = create_meta(&mut tx, &schema, options.thresholds.as_ref())?;
                    tx.commit()?;
                    info!(dataset = %options.dataset, hp = options.thresholds.is_some(), "dataset initialised");
                    (meta, options.thresholds)
                }
                Err(err) => return Err(err),
            }
        };

        debug!(dataset = %options.dataset, meta = %meta, "dataset opened");
        Ok(Self {
            store,
            ctx: EngineContext {
                schema,
                thresholds,
                neuron_rule: options.neuron_rule,
                meta,
            },
            bulk_parallel: options.bulk_parallel,
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn schema(&self) -> &Schema {
        &self.ctx.schema
    }

    pub fn context(&self) -> &EngineContext {
        &self.ctx
    }

    pub fn thresholds(&self) -> Option<&HpThresholds> {
        self.ctx.thresholds.as_ref()
    }

    /// Reader over committed state. Each lookup sees the latest commit, so
    /// results of separate lookups may straddle a concurrent mutation.
    pub fn reader(&self) -> ConnectomeReader<'_, S> {
        ConnectomeReader::new(&self.store, &self.ctx.schema)
    }

    // ========================================================================
    // Transaction plumbing
    // ========================================================================

    fn begin_mutation(&self) -> EngineResult<S::Transaction<'_>> {
        let mut tx = self.store.begin();
        tx.lock(&LockSet::with_root(self.ctx.meta))?;
        Ok(tx)
    }

    fn finish<T: GraphTransaction>(
        &self,
        mut tx: T,
        operation: &'static str,
        result: EngineResult<MutationOutcome>,
    ) -> EngineResult<MutationOutcome> {
        match result {
            Ok(MutationOutcome::Applied) => {
                tx.set_node_property(
                    self.ctx.meta,
                    props::LAST_DATABASE_EDIT,
                    PropertyValue::Timestamp(Utc::now()),
                )?;
                tx.commit()?;
                debug!(operation, "mutation committed");
                Ok(MutationOutcome::Applied)
            }
            Ok(MutationOutcome::Skipped) => {
                tx.rollback();
                Ok(MutationOutcome::Skipped)
            }
            Err(err) => {
                tx.rollback();
                debug!(operation, error = %err, "mutation rolled back");
                Err(err)
            }
        }
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    pub fn add_synapse(&self, addition: &SynapseAddition) -> EngineResult<MutationOutcome> {
        let mut tx = self.begin_mutation()?;
        let result = Mutator::new(&mut tx, &self.ctx).add_synapse(addition);
        self.finish(tx, "add_synapse", result)
    }

    pub fn delete_synapse(&self, location: Location) -> EngineResult<MutationOutcome> {
        let mut tx = self.begin_mutation()?;
        let result = Mutator::new(&mut tx, &self.ctx).delete_synapse(location);
        self.finish(tx, "delete_synapse", result)
    }

    pub fn orphan_synapse(&self, location: Location) -> EngineResult<MutationOutcome> {
        let mut tx = self.begin_mutation()?;
        let result = Mutator::new(&mut tx, &self.ctx).orphan_synapse(location);
        self.finish(tx, "orphan_synapse", result)
    }

    pub fn add_roi_to_synapse(&self, location: Location, roi: &str) -> EngineResult<MutationOutcome> {
        let mut tx = self.begin_mutation()?;
        let result = Mutator::new(&mut tx, &self.ctx).add_roi_to_synapse(location, roi);
        self.finish(tx, "add_roi_to_synapse", result)
    }

    pub fn remove_roi_from_synapse(
        &self,
        location: Location,
        roi: &str,
    ) -> EngineResult<MutationOutcome> {
        let mut tx = self.begin_mutation()?;
        let result = Mutator::new(&mut tx, &self.ctx).remove_roi_from_synapse(location, roi);
        self.finish(tx, "remove_roi_from_synapse", result)
    }

    pub fn link_synapses(&self, pre: Location, post: Location) -> EngineResult<MutationOutcome> {
        let mut tx = self.begin_mutation()?;
        let result = Mutator::new(&mut tx, &self.ctx).link_synapses(pre, post);
        self.finish(tx, "link_synapses", result)
    }

    pub fn unlink_synapses(&self, pre: Location, post: Location) -> EngineResult<MutationOutcome> {
        let mut tx = self.begin_mutation()?;
        let result = Mutator::new(&mut tx, &self.ctx).unlink_synapses(pre, post);
        self.finish(tx, "unlink_synapses", result)
    }

    pub fn add_synapse_to_segment(&self, location: Location, body_id: u64) -> EngineResult<MutationOutcome> {
        let mut tx = self.begin_mutation()?;
        let result = Mutator::new(&mut tx, &self.ctx).add_synapse_to_segment(location, body_id);
        self.finish(tx, "add_synapse_to_segment", result)
    }

    pub fn add_segment(&self, addition: &SegmentAddition) -> EngineResult<MutationOutcome> {
        let mut tx = self.begin_mutation()?;
        let result = Mutator::new(&mut tx, &self.ctx).add_segment(addition);
        self.finish(tx, "add_segment", result)
    }

    pub fn delete_segment(&self, body_id: u64) -> EngineResult<MutationOutcome> {
        let mut tx = self.begin_mutation()?;
        let result = Mutator::new(&mut tx, &self.ctx).delete_segment(body_id);
        self.finish(tx, "delete_segment", result)
    }

    pub fn update_segment_properties(
        &self,
        body_id: u64,
        update: &SegmentPropertyUpdate,
    ) -> EngineResult<MutationOutcome> {
        let mut tx = self.begin_mutation()?;
        let result = Mutator::new(&mut tx, &self.ctx).update_segment_properties(body_id, update);
        self.finish(tx, "update_segment_properties", result)
    }

    pub fn remove_segment_property(
        &self,
        body_id: u64,
        property: SegmentProperty,
    ) -> EngineResult<MutationOutcome> {
        let mut tx = self.begin_mutation()?;
        let result = Mutator::new(&mut tx, &self.ctx).remove_segment_property(body_id, property);
        self.finish(tx, "remove_segment_property", result)
    }

    /// Load a whole dataset into an empty one in a single transaction.
    pub fn bulk_load(&self, dataset: &BulkDataset) -> EngineResult<BulkLoadReport> {
        let mut tx = self.begin_mutation()?;
        let loader = BulkLoader::new(self.bulk_parallel);
        match loader.load(&mut tx, &self.ctx, dataset) {
            Ok(report) => {
                tx.set_node_property(
                    self.ctx.meta,
                    props::LAST_DATABASE_EDIT,
                    PropertyValue::Timestamp(Utc::now()),
                )?;
                tx.commit()?;
                Ok(report)
            }
            Err(err) => {
                tx.rollback();
                Err(err)
            }
        }
    }

    // ========================================================================
    // Reads
    // ========================================================================

    // Views read through one pinned read view, so a view spanning several entities
    // never mixes states from before and after a concurrent commit.

    pub fn segment(&self, body_id: u64) -> EngineResult<Option<SegmentView>> {
        let view = self.store.read_view();
        ConnectomeReader::new(&view, &self.ctx.schema).segment(body_id)
    }

    pub fn synapse(&self, location: Location) -> EngineResult<Option<SynapseView>> {
        let view = self.store.read_view();
        ConnectomeReader::new(&view, &self.ctx.schema).synapse(location)
    }

    pub fn connects_to(&self, pre: u64, post: u64) -> EngineResult<Option<ConnectsToView>> {
        let view = self.store.read_view();
        ConnectomeReader::new(&view, &self.ctx.schema).connects_to(pre, post)
    }

    pub fn connections_of(&self, body_id: u64) -> EngineResult<Vec<ConnectsToView>> {
        let view = self.store.read_view();
        ConnectomeReader::new(&view, &self.ctx.schema).connections_of(body_id)
    }

    pub fn connection_set(&self, pre: u64, post: u64) -> EngineResult<Option<ConnectionSetView>> {
        let view = self.store.read_view();
        ConnectomeReader::new(&view, &self.ctx.schema).connection_set(pre, post)
    }

    pub fn meta(&self) -> EngineResult<MetaView> {
        let view = self.store.read_view();
        ConnectomeReader::new(&view, &self.ctx.schema).meta()
    }

    /// Recompute every derived value from scratch and compare.
    ///
    /// Commits wait while the audit runs.
    pub fn audit(&self) -> EngineResult<AuditReport> {
        audit(&self.store.read_view(), &self.ctx)
    }
}

impl ConnectomeEngine<InMemoryGraph> {
    /// In-memory store configured from `config`, restored from the
    /// configured snapshot when one exists.
    pub fn in_memory(config: &ConnectomeConfig) -> EngineResult<Self> {
        let store = match &config.persistence.snapshot_path {
            Some(path) if path.exists() => {
                info!(path = %path.display(), "restoring snapshot");
                InMemoryGraph::load_snapshot(path)?
            }
            _ => InMemoryGraph::new(),
        };
        let store = store.with_lock_timeout(config.locking.timeout());
        Self::open(store, EngineOptions::from_config(config)?)
    }

    pub fn save_snapshot(&self, path: &Path) -> EngineResult<()> {
        self.store.save_snapshot(path)?;
        info!(path = %path.display(), nodes = self.store.node_count(), "snapshot saved");
        Ok(())
    }
}

fn create_meta<T: GraphWrite>(
    tx: &mut T,
    schema: &Schema,
    thresholds: Option<&HpThresholds>,
) -> EngineResult<NodeId> {
    let mut properties = Properties::new();
    properties.insert(props::DATASET.to_string(), schema.dataset().into());
    properties.insert(props::TOTAL_PRE.to_string(), PropertyValue::Int(0));
    properties.insert(props::TOTAL_POST.to_string(), PropertyValue::Int(0));
    properties.insert(props::ROI_INFO.to_string(), RoiInfo::new().into());
    if let Some(t) = thresholds {
        properties.insert(props::PRE_HP_THRESHOLD.to_string(), PropertyValue::Float(t.pre));
        properties.insert(props::POST_HP_THRESHOLD.to_string(), PropertyValue::Float(t.post));
    }
    properties.insert(
        props::LAST_DATABASE_EDIT.to_string(),
        PropertyValue::Timestamp(Utc::now()),
    );
    Ok(tx.create_node(&schema.meta_labels(), properties)?)
}
