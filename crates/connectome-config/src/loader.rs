// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration file loading with override support
//!
//! Three tiers, later ones winning:
//! 1. TOML file (base values)
//! 2. Environment variables (runtime overrides)
//! 3. CLI arguments (explicit user overrides)

use crate::{ConfigError, ConfigResult, ConnectomeConfig};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "connectome_configuration.toml";
pub const CONFIG_PATH_ENV: &str = "CONNECTOME_CONFIG_PATH";

/// Environment variable to override key, shared with the CLI map.
const ENV_OVERRIDES: &[(&str, &str)] = &[
    ("CONNECTOME_DATASET", "dataset"),
    ("CONNECTOME_PRE_HP_THRESHOLD", "pre_hp_threshold"),
    ("CONNECTOME_POST_HP_THRESHOLD", "post_hp_threshold"),
    ("CONNECTOME_NEURON_PRE_THRESHOLD", "neuron_pre_threshold"),
    ("CONNECTOME_NEURON_POST_THRESHOLD", "neuron_post_threshold"),
    ("CONNECTOME_LOCK_TIMEOUT_MS", "lock_timeout_ms"),
    ("CONNECTOME_BULK_PARALLEL", "bulk_parallel"),
    ("CONNECTOME_LOG_LEVEL", "log_level"),
    ("CONNECTOME_LOG_FORMAT", "log_format"),
    ("CONNECTOME_FILE_LOGGING", "file_logging"),
    ("CONNECTOME_LOG_DIR", "log_dir"),
    ("CONNECTOME_SNAPSHOT_PATH", "snapshot_path"),
];

/// Find the configuration file
///
/// Search order:
/// 1. `CONNECTOME_CONFIG_PATH` environment variable
/// 2. Current working directory
/// 3. Up to five parent directories
///
/// # Errors
///
/// Returns `ConfigError::FileNotFound` if no config file is found in any location
pub fn find_config_file() -> ConfigResult<PathBuf> {
    if let Ok(env_path) = env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        return Err(ConfigError::FileNotFound(format!(
            "Config file specified by {} not found: {}",
            CONFIG_PATH_ENV,
            path.display()
        )));
    }

    let mut search_paths = Vec::new();
    if let Ok(cwd) = env::current_dir() {
        search_paths.push(cwd.join(CONFIG_FILE_NAME));
        let mut current = cwd.as_path();
        for _ in 0..5 {
            match current.parent() {
                Some(parent) => {
                    search_paths.push(parent.join(CONFIG_FILE_NAME));
                    current = parent;
                }
                None => break,
            }
        }
    }

    if let Some(found) = search_paths.iter().find(|path| path.exists()) {
        return Ok(found.clone());
    }

    let search_list = search_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    Err(ConfigError::FileNotFound(format!(
        "'{}' not found in any of these locations:\n{}\n\nSet {} to specify a custom location.",
        CONFIG_FILE_NAME, search_list, CONFIG_PATH_ENV
    )))
}

/// Load configuration from TOML file
///
/// * `config_path` - Optional path to config file. If `None`, the file is searched for.
/// * `cli_args` - Optional CLI argument overrides
///
/// # Errors
///
/// Returns error if the file is not found or contains invalid TOML
pub fn load_config(
    config_path: Option<&Path>,
    cli_args: Option<&HashMap<String, String>>,
) -> ConfigResult<ConnectomeConfig> {
    let config_file = match config_path {
        Some(path) => path.to_path_buf(),
        None => find_config_file()?,
    };

    let content = fs::read_to_string(&config_file)?;
    let mut config: ConnectomeConfig = toml::from_str(&content)?;

    apply_environment_overrides(&mut config);
    if let Some(cli) = cli_args {
        apply_cli_overrides(&mut config, cli);
    }

    Ok(config)
}

/// Apply `CONNECTOME_*` environment variable overrides
///
/// - `CONNECTOME_DATASET` -> `dataset.name`
/// - `CONNECTOME_PRE_HP_THRESHOLD` / `CONNECTOME_POST_HP_THRESHOLD` -> `dataset.*_hp_threshold`
/// - `CONNECTOME_NEURON_PRE_THRESHOLD` / `CONNECTOME_NEURON_POST_THRESHOLD` -> `neuron.*`
/// - `CONNECTOME_LOCK_TIMEOUT_MS` -> `locking.timeout_ms`
/// - `CONNECTOME_BULK_PARALLEL` -> `bulk_load.parallel`
/// - `CONNECTOME_LOG_LEVEL`, `CONNECTOME_LOG_FORMAT`, `CONNECTOME_FILE_LOGGING`, `CONNECTOME_LOG_DIR` -> `logging.*`
/// - `CONNECTOME_SNAPSHOT_PATH` -> `persistence.snapshot_path`
pub fn apply_environment_overrides(config: &mut ConnectomeConfig) {
    for (var, key) in ENV_OVERRIDES {
        if let Ok(value) = env::var(var) {
            apply_override(config, key, &value);
        }
    }
}

/// Apply CLI argument overrides
///
/// Keys match the environment table without the prefix, lowercased
/// (e.g. `{"dataset": "mb6", "lock_timeout_ms": "500"}`). Unknown keys and
/// unparseable values are ignored.
pub fn apply_cli_overrides(config: &mut ConnectomeConfig, cli_args: &HashMap<String, String>) {
    for (key, value) in cli_args {
        apply_override(config, key, value);
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "true" | "1" | "yes")
}

fn apply_override(config: &mut ConnectomeConfig, key: &str, value: &str) {
    match key {
        "dataset" => config.dataset.name = value.to_string(),
        "pre_hp_threshold" => {
            if let Ok(threshold) = value.parse::<f64>() {
                config.dataset.pre_hp_threshold = Some(threshold);
            }
        }
        "post_hp_threshold" => {
            if let Ok(threshold) = value.parse::<f64>() {
                config.dataset.post_hp_threshold = Some(threshold);
            }
        }
        "neuron_pre_threshold" => {
            if let Ok(count) = value.parse::<u64>() {
                config.neuron.pre_threshold = count;
            }
        }
        "neuron_post_threshold" => {
            if let Ok(count) = value.parse::<u64>() {
                config.neuron.post_threshold = count;
            }
        }
        "lock_timeout_ms" => {
            if let Ok(ms) = value.parse::<u64>() {
                config.locking.timeout_ms = ms;
            }
        }
        "bulk_parallel" => config.bulk_load.parallel = parse_flag(value),
        "log_level" => config.logging.level = value.to_string(),
        "log_format" => config.logging.format = value.to_string(),
        "file_logging" => config.logging.file_logging = parse_flag(value),
        "log_dir" => config.logging.log_dir = PathBuf::from(value),
        "snapshot_path" => config.persistence.snapshot_path = Some(PathBuf::from(value)),
        _ => {}
    }
}
