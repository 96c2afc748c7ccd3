// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

use crate::locks::LockTarget;
use crate::types::{EdgeId, NodeId};

/// Errors raised by graph stores.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Relationship not found: {0}")]
    EdgeNotFound(EdgeId),

    #[error("Cannot delete node {node}: it still has {count} relationship(s)")]
    NodeHasRelationships { node: NodeId, count: usize },

    #[error("Timed out after {waited_ms}ms waiting for write lock on {target}")]
    LockTimeout { target: LockTarget, waited_ms: u64 },

    #[error("Snapshot I/O failed: {0}")]
    SnapshotIo(#[from] std::io::Error),

    #[error("Snapshot encoding failed: {0}")]
    SnapshotFormat(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::SnapshotFormat(err.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
