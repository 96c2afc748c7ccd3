// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Graph layout of a connectome dataset.
//!
//! Every entity carries a generic label and a dataset-scoped one
//! (`Segment` and `hemibrain_Segment`). Lookups always go through the scoped
//! label so several datasets can share one store.
//!
//! ```text
//! (Segment)-[:Contains]->(SynapseSet)-[:Contains]->(Synapse)
//! (Segment)-[:Contains]->(Skeleton)-[:Contains]->(SkelNode)
//! (Synapse:PreSyn)-[:SynapsesTo]->(Synapse:PostSyn)
//! (Segment)-[:ConnectsTo {weight, weightHP}]->(Segment)
//! (ConnectionSet)-[:Contains]->(Synapse)
//! (ConnectionSet)-[:From]->(Segment), (ConnectionSet)-[:To]->(Segment)
//! ```

use connectome_structures::SynapseType;

pub mod labels {
    pub const SEGMENT: &str = "Segment";
    pub const NEURON: &str = "Neuron";
    pub const SYNAPSE: &str = "Synapse";
    pub const PRE_SYN: &str = "PreSyn";
    pub const POST_SYN: &str = "PostSyn";
    pub const SYNAPSE_SET: &str = "SynapseSet";
    pub const CONNECTION_SET: &str = "ConnectionSet";
    pub const META: &str = "Meta";
    pub const SKELETON: &str = "Skeleton";
    pub const SKEL_NODE: &str = "SkelNode";
    pub const MUTATION: &str = "MutationRecord";
}

pub mod rels {
    pub const CONTAINS: &str = "Contains";
    pub const SYNAPSES_TO: &str = "SynapsesTo";
    pub const CONNECTS_TO: &str = "ConnectsTo";
    pub const FROM: &str = "From";
    pub const TO: &str = "To";
}

pub mod props {
    pub const DATASET: &str = "dataset";
    pub const BODY_ID: &str = "bodyId";
    pub const PRE: &str = "pre";
    pub const POST: &str = "post";
    pub const ROI_INFO: &str = "roiInfo";
    pub const ROIS: &str = "rois";
    pub const SIZE: &str = "size";
    pub const TIME_STAMP: &str = "timeStamp";
    pub const SOMA_LOCATION: &str = "somaLocation";
    pub const SOMA_RADIUS: &str = "somaRadius";
    pub const MUTATION_UUID: &str = "mutationUuid";
    pub const MUTATION_ID: &str = "mutationId";

    pub const LOCATION: &str = "location";
    pub const TYPE: &str = "type";
    pub const CONFIDENCE: &str = "confidence";

    pub const DATASET_BODY_ID: &str = "datasetBodyId";
    pub const DATASET_BODY_IDS: &str = "datasetBodyIds";
    pub const WEIGHT: &str = "weight";
    pub const WEIGHT_HP: &str = "weightHP";

    pub const TOTAL_PRE: &str = "totalPreCount";
    pub const TOTAL_POST: &str = "totalPostCount";
    pub const PRE_HP_THRESHOLD: &str = "preHPThreshold";
    pub const POST_HP_THRESHOLD: &str = "postHPThreshold";
    pub const LAST_DATABASE_EDIT: &str = "lastDatabaseEdit";

    pub const MUTATION_KEY: &str = "mutationKey";
    pub const SYNAPSE_SOURCES: &str = "synapseSources";
}

/// Dataset-scoped label names and keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    dataset: String,
    segment: String,
    neuron: String,
    synapse: String,
    pre_syn: String,
    post_syn: String,
    synapse_set: String,
    connection_set: String,
    meta: String,
    skeleton: String,
    skel_node: String,
    mutation: String,
}

fn scoped(dataset: &str, label: &str) -> String {
    format!("{}_{}", dataset, label)
}

impl Schema {
    pub fn new(dataset: impl Into<String>) -> Self {
        let dataset = dataset.into();
        Self {
            segment: scoped(&dataset, labels::SEGMENT),
            neuron: scoped(&dataset, labels::NEURON),
            synapse: scoped(&dataset, labels::SYNAPSE),
            pre_syn: scoped(&dataset, labels::PRE_SYN),
            post_syn: scoped(&dataset, labels::POST_SYN),
            synapse_set: scoped(&dataset, labels::SYNAPSE_SET),
            connection_set: scoped(&dataset, labels::CONNECTION_SET),
            meta: scoped(&dataset, labels::META),
            skeleton: scoped(&dataset, labels::SKELETON),
            skel_node: scoped(&dataset, labels::SKEL_NODE),
            mutation: scoped(&dataset, labels::MUTATION),
            dataset,
        }
    }

    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    pub fn segment(&self) -> &str {
        &self.segment
    }

    pub fn neuron(&self) -> &str {
        &self.neuron
    }

    pub fn synapse(&self) -> &str {
        &self.synapse
    }

    pub fn synapse_set(&self) -> &str {
        &self.synapse_set
    }

    pub fn connection_set(&self) -> &str {
        &self.connection_set
    }

    pub fn meta(&self) -> &str {
        &self.meta
    }

    pub fn skeleton(&self) -> &str {
        &self.skeleton
    }

    pub fn skel_node(&self) -> &str {
        &self.skel_node
    }

    pub fn mutation(&self) -> &str {
        &self.mutation
    }

    pub fn segment_labels(&self) -> [&str; 2] {
        [labels::SEGMENT, &self.segment]
    }

    pub fn neuron_labels(&self) -> [&str; 2] {
        [labels::NEURON, &self.neuron]
    }

    pub fn synapse_labels(&self, kind: SynapseType) -> [&str; 4] {
        match kind {
            SynapseType::Pre => [labels::SYNAPSE, &self.synapse, labels::PRE_SYN, &self.pre_syn],
            SynapseType::Post => [
                labels::SYNAPSE,
                &self.synapse,
                labels::POST_SYN,
                &self.post_syn,
            ],
        }
    }

    pub fn synapse_set_labels(&self) -> [&str; 2] {
        [labels::SYNAPSE_SET, &self.synapse_set]
    }

    pub fn connection_set_labels(&self) -> [&str; 2] {
        [labels::CONNECTION_SET, &self.connection_set]
    }

    pub fn meta_labels(&self) -> [&str; 2] {
        [labels::META, &self.meta]
    }

    pub fn skeleton_labels(&self) -> [&str; 2] {
        [labels::SKELETON, &self.skeleton]
    }

    pub fn skel_node_labels(&self) -> [&str; 2] {
        [labels::SKEL_NODE, &self.skel_node]
    }

    pub fn mutation_labels(&self) -> [&str; 2] {
        [labels::MUTATION, &self.mutation]
    }

    /// `<dataset>:<bodyId>`
    pub fn synapse_set_key(&self, body_id: u64) -> String {
        format!("{}:{}", self.dataset, body_id)
    }

    /// `<dataset>:<preBodyId>:<postBodyId>`
    pub fn connection_set_key(&self, pre: u64, post: u64) -> String {
        format!("{}:{}:{}", self.dataset, pre, post)
    }

    /// (label, property) pairs that must be indexed for point lookups.
    pub fn indexes(&self) -> [(&str, &str); 6] {
        [
            (&self.meta, props::DATASET),
            (&self.segment, props::BODY_ID),
            (&self.synapse, props::LOCATION),
            (&self.synapse_set, props::DATASET_BODY_ID),
            (&self.connection_set, props::DATASET_BODY_IDS),
            (&self.mutation, props::MUTATION_KEY),
        ]
    }
}
