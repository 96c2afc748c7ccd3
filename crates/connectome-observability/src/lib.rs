// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # connectome-observability
//!
//! Logging setup shared by every connectome binary and test harness, with
//! per-crate debug flag support.
//!
//! ## Features
//! - `file-logging`: JSON log files with daily rotation

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod cli;
pub mod config;
pub mod init;

pub use cli::*;
pub use config::*;
pub use init::*;

/// Crate names accepted by `--debug-<crate>`
pub const KNOWN_CRATES: &[&str] = &[
    "connectome",
    "connectome-structures",
    "connectome-store",
    "connectome-engine",
    "connectome-config",
];
