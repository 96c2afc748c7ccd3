// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Dataset-level confidence thresholds for high-precision (HP) counts.

use serde::{Deserialize, Serialize};

use crate::error::StructureResult;
use crate::synapse::{validate_confidence, SynapseType};

/// A synapse is high-precision when its confidence is strictly above the
/// threshold for its type.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HpThresholds {
    pub pre: f64,
    pub post: f64,
}

impl HpThresholds {
    pub fn new(pre: f64, post: f64) -> StructureResult<Self> {
        validate_confidence(pre)?;
        validate_confidence(post)?;
        Ok(Self { pre, post })
    }

    pub fn is_high_precision(&self, kind: SynapseType, confidence: f64) -> bool {
        match kind {
            SynapseType::Pre => confidence > self.pre,
            SynapseType::Post => confidence > self.post,
        }
    }
}
