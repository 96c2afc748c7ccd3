// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Connectome - consistency engine for connectome graph databases
//!
//! A connectome dataset stores synapses, the segments that own them, and
//! a layer of derived data: per-segment and per-ROI synapse counts,
//! weighted `ConnectsTo` edges between segments, and the `ConnectionSet`
//! evidence behind each edge. This crate keeps that derived layer correct
//! while the graph is edited concurrently.
//!
//! ## Feature Flags
//!
//! - **`parallel`** (default): fold bulk-load statistics on the rayon pool
//! - **`observability`** (default): logging initialisation and per-crate
//!   debug flags
//! - **`file-logging`**: daily rolling log files via `tracing-appender`
//!
//! ## Usage
//!
//! ```rust
//! use connectome::prelude::*;
//!
//! let engine = ConnectomeEngine::open(InMemoryGraph::new(), EngineOptions::new("hemibrain"))?;
//!
//! let pre = Location::new(0, 0, 0);
//! let post = Location::new(1, 1, 1);
//! engine.add_synapse(&SynapseAddition::new(pre, SynapseType::Pre, 0.9).with_rois(["EB"]))?;
//! engine.add_synapse(&SynapseAddition::new(post, SynapseType::Post, 0.9).with_rois(["EB"]))?;
//! engine.link_synapses(pre, post)?;
//!
//! let uuid = "0f8b6c1e-3c2a-4d5b-9e7f-112233445566";
//! engine.add_segment(&SegmentAddition::new(10, uuid, 1).with_synapses([SynapseRef {
//!     location: pre,
//!     kind: SynapseType::Pre,
//! }]))?;
//! engine.add_segment(&SegmentAddition::new(20, uuid, 2).with_synapses([SynapseRef {
//!     location: post,
//!     kind: SynapseType::Post,
//! }]))?;
//!
//! assert_eq!(engine.connects_to(10, 20)?.map(|edge| edge.weight), Some(1));
//! assert!(engine.audit()?.is_consistent());
//! # Ok::<(), connectome::engine::EngineError>(())
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  Foundation: connectome-structures, connectome-config   │
//! │  (RoiInfo, Location, addition schemas, TOML config)     │
//! └─────────────────────────────────────────────────────────┘
//!                         ↓
//! ┌─────────────────────────────────────────────────────────┐
//! │  Storage: connectome-store                              │
//! │  (graph traits, entity locks, in-memory transactions)   │
//! └─────────────────────────────────────────────────────────┘
//!                         ↓
//! ┌─────────────────────────────────────────────────────────┐
//! │  Engine: connectome-engine                              │
//! │  (mutations, aggregation, bulk load, audit)             │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## License
//!
//! Apache-2.0

pub use connectome_config as config;
pub use connectome_engine as engine;
pub use connectome_store as store;
pub use connectome_structures as structures;

#[cfg(feature = "observability")]
pub use connectome_observability as observability;

/// Prelude - commonly used types and traits
pub mod prelude {
    pub use crate::engine::{
        AuditReport, BulkDataset, BulkSegment, ConnectomeEngine, EngineError, EngineOptions,
        EngineResult, MutationOutcome, NeuronRule, SynapseLink,
    };
    pub use crate::store::{GraphRead, GraphStore, InMemoryGraph};
    pub use crate::structures::{
        HpThresholds, Location, RoiCounter, RoiInfo, SegmentAddition, SegmentProperty,
        SegmentPropertyUpdate, SynapseAddition, SynapseRef, SynapseType,
    };
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_facade_imports() {
        use crate::prelude::*;
        let engine = ConnectomeEngine::open(InMemoryGraph::new(), EngineOptions::new("facade"))
            .expect("Failed to open dataset");
        assert_eq!(engine.meta().unwrap().dataset, "facade");
    }
}
