// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration type definitions
//!
//! Each struct maps to one section of `connectome_configuration.toml`.
//! Every section is optional; missing keys take the defaults below.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ConnectomeConfig {
    pub dataset: DatasetConfig,
    pub neuron: NeuronConfig,
    pub locking: LockingConfig,
    pub bulk_load: BulkLoadConfig,
    pub logging: LoggingConfig,
    pub persistence: PersistenceConfig,
}

/// Dataset identity and high-precision confidence thresholds.
///
/// High-precision counts are maintained only when both thresholds are set.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DatasetConfig {
    pub name: String,
    pub pre_hp_threshold: Option<f64>,
    pub post_hp_threshold: Option<f64>,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            name: "hemibrain".to_string(),
            pre_hp_threshold: None,
            post_hp_threshold: None,
        }
    }
}

impl DatasetConfig {
    pub fn tracks_high_precision(&self) -> bool {
        self.pre_hp_threshold.is_some() && self.post_hp_threshold.is_some()
    }
}

/// Synapse counts at which a segment is designated a Neuron.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct NeuronConfig {
    pub pre_threshold: u64,
    pub post_threshold: u64,
}

impl Default for NeuronConfig {
    fn default() -> Self {
        Self {
            pre_threshold: 2,
            post_threshold: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LockingConfig {
    pub timeout_ms: u64,
}

impl Default for LockingConfig {
    fn default() -> Self {
        Self { timeout_ms: 10_000 }
    }
}

impl LockingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BulkLoadConfig {
    /// Fold per-segment and per-pair statistics on the rayon pool.
    pub parallel: bool,
}

impl Default for BulkLoadConfig {
    fn default() -> Self {
        Self { parallel: true }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// `text` or `json`
    pub format: String,
    pub file_logging: bool,
    pub log_dir: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
            file_logging: false,
            log_dir: PathBuf::from("./logs"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Graph snapshot location; `None` keeps the graph in memory only.
    pub snapshot_path: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_sections_take_defaults() {
        let config: ConnectomeConfig = toml::from_str(
            r#"
            [dataset]
            name = "mb6"
            pre_hp_threshold = 0.5
            "#,
        )
        .unwrap();
        assert_eq!(config.dataset.name, "mb6");
        assert_eq!(config.dataset.pre_hp_threshold, Some(0.5));
        assert!(!config.dataset.tracks_high_precision());
        assert_eq!(config.neuron, NeuronConfig::default());
        assert_eq!(config.locking.timeout(), Duration::from_secs(10));
    }
}
