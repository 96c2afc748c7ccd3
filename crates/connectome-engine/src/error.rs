// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

use connectome_store::StoreError;
use connectome_structures::StructureError;
use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

/// Errors raised by connectome mutations and reads.
///
/// Every error aborts the enclosing transaction; nothing it staged becomes
/// visible.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Missing or malformed input, rejected before anything is written.
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Duplicate mutation key, body id collision, occupied location, or an
    /// ROI tag that is already present or absent.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The graph is not in a state this mutation can start from. Never
    /// repaired silently.
    #[error("Consistency error: {0}")]
    Consistency(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl EngineError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        EngineError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, EngineError::Conflict(_))
    }

    pub fn is_consistency(&self) -> bool {
        matches!(self, EngineError::Consistency(_))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, EngineError::Validation(_))
    }
}

impl From<StructureError> for EngineError {
    fn from(err: StructureError) -> Self {
        match err {
            StructureError::CounterUnderflow { .. } | StructureError::MalformedRoiInfo(_) => {
                EngineError::Consistency(err.to_string())
            }
            _ => EngineError::Validation(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_underflow_is_a_consistency_error() {
        let err: EngineError = StructureError::CounterUnderflow {
            roi: "EB".to_string(),
            field: "pre",
        }
        .into();
        assert!(err.is_consistency());
    }

    #[test]
    fn test_bad_input_is_a_validation_error() {
        let err: EngineError = StructureError::MalformedLocation("1,2".to_string()).into();
        assert!(err.is_validation());
        assert_eq!(
            EngineError::not_found("Segment", 10).to_string(),
            "Segment not found: 10"
        );
    }
}
