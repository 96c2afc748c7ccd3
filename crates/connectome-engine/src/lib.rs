// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
# Connectome Engine

Keeps the derived data of a connectome graph consistent while the graph is
edited:

- per-segment `pre`/`post` counts, `roiInfo` and ROI tags
- dataset-wide Meta totals and `roiInfo`
- `ConnectsTo` weights (and high-precision weights) between segments
- the `ConnectionSet` evidence behind each connection
- `Neuron` designation

## Architecture

- [`ConnectomeEngine`]: opens a dataset on any [`GraphStore`] and runs each
  mutation as one transaction
- [`mutations::Mutator`]: plans subgraph locks ([`locking::LockPlanner`]),
  applies a change and its derived updates
- [`bulk::BulkLoader`]: loads a whole dataset in one pass, optionally on the
  rayon pool
- [`audit::audit`]: recomputes everything from scratch and reports drift

[`GraphStore`]: connectome_store::GraphStore
*/

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod aggregator;
pub mod audit;
pub mod bulk;
pub mod connection_set;
pub mod context;
pub mod engine;
pub mod error;
pub mod locking;
pub mod mutations;
pub mod neuron;
pub mod reader;
pub mod schema;
pub mod views;

pub use aggregator::{ConnectsToAggregator, PairAggregate};
pub use audit::{AuditReport, Violation};
pub use bulk::{BulkDataset, BulkLoadReport, BulkLoader, BulkSegment, SynapseLink};
pub use connection_set::{ConnectionChange, ConnectionSummary, SegmentRef};
pub use context::EngineContext;
pub use engine::{ConnectomeEngine, EngineOptions};
pub use error::{EngineError, EngineResult};
pub use mutations::{MutationOutcome, Mutator};
pub use neuron::NeuronRule;
pub use reader::ConnectomeReader;
pub use schema::Schema;
pub use views::{ConnectionSetView, ConnectsToView, MetaView, SegmentView, SynapseView};
