// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

/// Errors raised by the connectome value types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructureError {
    /// A counter would have gone below zero. Always an upstream bug.
    #[error("ROI counter underflow: {field} for ROI '{roi}' is already 0")]
    CounterUnderflow { roi: String, field: &'static str },

    #[error("Malformed location: {0}")]
    MalformedLocation(String),

    #[error("Malformed mutation key: {0}")]
    MalformedMutationKey(String),

    #[error("Malformed roiInfo encoding: {0}")]
    MalformedRoiInfo(String),

    #[error("Unknown synapse type: {0}")]
    UnknownSynapseType(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

pub type StructureResult<T> = Result<T, StructureError>;

impl StructureError {
    /// Attach the ROI name to an underflow raised by a bare counter.
    pub(crate) fn for_roi(self, roi: &str) -> Self {
        match self {
            StructureError::CounterUnderflow { field, .. } => StructureError::CounterUnderflow {
                roi: roi.to_string(),
                field,
            },
            other => other,
        }
    }
}
