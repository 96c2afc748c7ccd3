// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
# Connectome Structures

Plain value types shared by the connectome store and engine:

- [`RoiCounter`] / [`RoiInfo`]: per-ROI pre/post counts with canonical encoding
- [`Location`]: integer synapse location
- [`SynapseAddition`], [`SegmentAddition`]: mutation request schemas
- [`MutationKey`]: `<uuid>:<mutationId>:<bodyId>` idempotency key
- [`HpThresholds`]: high-precision confidence cut-offs

Nothing here touches a graph; these types are safe to construct anywhere.
*/

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod error;
pub mod location;
pub mod mutation_key;
pub mod roi;
pub mod segment;
pub mod synapse;
pub mod thresholds;

pub use error::{StructureError, StructureResult};
pub use location::Location;
pub use mutation_key::MutationKey;
pub use roi::{RoiCounter, RoiInfo};
pub use segment::{SegmentAddition, SegmentProperty, SegmentPropertyUpdate, Soma};
pub use synapse::{validate_confidence, validate_roi_name, SynapseAddition, SynapseRef, SynapseType};
pub use thresholds::HpThresholds;
