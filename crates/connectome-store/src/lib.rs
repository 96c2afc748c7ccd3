// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Connectome Store
//!
//! Property-graph storage for connectome data.
//!
//! - [`GraphRead`], [`GraphWrite`], [`GraphTransaction`], [`GraphStore`]: the
//!   backend interface the consistency engine is written against
//! - [`EntityLockManager`] and [`LockSet`]: pessimistic per-entity write locks
//!   acquired in a fixed global order
//! - [`InMemoryGraph`]: a transactional in-memory backend with exact-match
//!   property indexes and JSON snapshots

pub mod error;
pub mod locks;
pub mod memory;
pub mod persistence;
pub mod traits;
pub mod types;

pub use error::{StoreError, StoreResult};
pub use locks::{EntityLockManager, LockSet, LockTarget, TxnId};
pub use memory::{InMemoryGraph, InMemoryReadView, InMemoryTransaction, DEFAULT_LOCK_TIMEOUT};
pub use persistence::{GraphSnapshot, IndexSpec, SNAPSHOT_FORMAT_VERSION};
pub use traits::{GraphRead, GraphStore, GraphTransaction, GraphWrite};
pub use types::{
    Direction, Edge, EdgeId, EdgeRecord, IndexKey, Node, NodeId, NodeRecord, Properties,
    PropertyValue,
};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
