// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Typed snapshots of connectome entities returned by reads.

use chrono::{DateTime, Utc};
use connectome_structures::{HpThresholds, Location, RoiInfo, Soma, SynapseType};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentView {
    pub body_id: u64,
    pub pre_count: u64,
    pub post_count: u64,
    pub roi_info: RoiInfo,
    /// ROI tags; always the key set of `roi_info`.
    pub rois: Vec<String>,
    pub is_neuron: bool,
    pub size: Option<u64>,
    pub name: Option<String>,
    pub status: Option<String>,
    pub instance: Option<String>,
    pub primary_neurite: Option<String>,
    pub major_input: Option<String>,
    pub major_output: Option<String>,
    pub clonal_unit: Option<String>,
    pub neurotransmitter: Option<String>,
    pub soma: Option<Soma>,
    pub time_stamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynapseView {
    pub location: Location,
    #[serde(rename = "type")]
    pub kind: SynapseType,
    pub confidence: f64,
    pub rois: Vec<String>,
    /// Body id of the owning segment; `None` for an orphan.
    pub owner: Option<u64>,
    /// Locations this synapse is linked with (targets for a pre-synapse,
    /// sources for a post-synapse).
    pub partners: Vec<Location>,
}

impl SynapseView {
    pub fn is_orphan(&self) -> bool {
        self.owner.is_none()
    }
}

/// A weighted ConnectsTo edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectsToView {
    pub pre: u64,
    pub post: u64,
    pub weight: u64,
    /// Present only when the dataset tracks high-precision counts.
    pub weight_hp: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSetView {
    pub pre: u64,
    pub post: u64,
    pub roi_info: RoiInfo,
    /// Member synapse locations, sorted.
    pub synapses: Vec<Location>,
    pub time_stamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaView {
    pub dataset: String,
    pub total_pre_count: u64,
    pub total_post_count: u64,
    pub roi_info: RoiInfo,
    pub thresholds: Option<HpThresholds>,
    pub last_database_edit: Option<DateTime<Utc>>,
}
