// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

use connectome_store::NodeId;
use connectome_structures::HpThresholds;

use crate::neuron::NeuronRule;
use crate::schema::Schema;

/// Dataset-wide settings every mutation needs.
#[derive(Debug, Clone)]
pub struct EngineContext {
    pub schema: Schema,
    /// High-precision thresholds; `None` disables HP tracking.
    pub thresholds: Option<HpThresholds>,
    pub neuron_rule: NeuronRule,
    /// The dataset's Meta node, always the first lock taken.
    pub meta: NodeId,
}
