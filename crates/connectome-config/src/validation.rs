// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration validation

use crate::{ConfigError, ConfigResult, ConnectomeConfig};

/// Validation errors that can occur during config validation
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValidationError {
    InvalidDatasetName { name: String },
    ThresholdOutOfRange { field: String, value: f64 },
    UnpairedThreshold { missing: String },
    InvalidValue { field: String, reason: String },
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidDatasetName { name } => write!(
                f,
                "Dataset name '{}' must be non-empty ASCII letters, digits or '_' and not start with a digit",
                name
            ),
            Self::ThresholdOutOfRange { field, value } => {
                write!(f, "{} = {} is outside [0, 1]", field, value)
            }
            Self::UnpairedThreshold { missing } => write!(
                f,
                "High-precision thresholds must be set together; {} is missing",
                missing
            ),
            Self::InvalidValue { field, reason } => {
                write!(f, "Invalid configuration value for {}: {}", field, reason)
            }
        }
    }
}

/// Dataset names become label prefixes, so they must be identifier-like.
pub fn is_valid_dataset_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

/// Validate the complete configuration
///
/// # Errors
///
/// Returns `ConfigError::ValidationError` listing every problem found
pub fn validate_config(config: &ConnectomeConfig) -> ConfigResult<()> {
    let mut errors = Vec::new();

    validate_dataset(config, &mut errors);
    validate_value_ranges(config, &mut errors);

    if !errors.is_empty() {
        let error_messages = errors
            .iter()
            .map(|e| format!("  - {}", e))
            .collect::<Vec<_>>()
            .join("\n");

        return Err(ConfigError::ValidationError(format!(
            "{} problem(s)\n{}",
            errors.len(),
            error_messages
        )));
    }

    Ok(())
}

fn validate_dataset(config: &ConnectomeConfig, errors: &mut Vec<ConfigValidationError>) {
    let dataset = &config.dataset;
    if !is_valid_dataset_name(&dataset.name) {
        errors.push(ConfigValidationError::InvalidDatasetName {
            name: dataset.name.clone(),
        });
    }

    for (field, threshold) in [
        ("dataset.pre_hp_threshold", dataset.pre_hp_threshold),
        ("dataset.post_hp_threshold", dataset.post_hp_threshold),
    ] {
        if let Some(value) = threshold {
            if !(0.0..=1.0).contains(&value) {
                errors.push(ConfigValidationError::ThresholdOutOfRange {
                    field: field.to_string(),
                    value,
                });
            }
        }
    }

    match (dataset.pre_hp_threshold, dataset.post_hp_threshold) {
        (Some(_), None) => errors.push(ConfigValidationError::UnpairedThreshold {
            missing: "dataset.post_hp_threshold".to_string(),
        }),
        (None, Some(_)) => errors.push(ConfigValidationError::UnpairedThreshold {
            missing: "dataset.pre_hp_threshold".to_string(),
        }),
        _ => {}
    }
}

fn validate_value_ranges(config: &ConnectomeConfig, errors: &mut Vec<ConfigValidationError>) {
    if config.neuron.pre_threshold == 0 {
        errors.push(ConfigValidationError::InvalidValue {
            field: "neuron.pre_threshold".to_string(),
            reason: "must be greater than 0".to_string(),
        });
    }
    if config.neuron.post_threshold == 0 {
        errors.push(ConfigValidationError::InvalidValue {
            field: "neuron.post_threshold".to_string(),
            reason: "must be greater than 0".to_string(),
        });
    }
    if config.locking.timeout_ms == 0 {
        errors.push(ConfigValidationError::InvalidValue {
            field: "locking.timeout_ms".to_string(),
            reason: "must be greater than 0".to_string(),
        });
    }
    if !matches!(config.logging.format.as_str(), "text" | "json") {
        errors.push(ConfigValidationError::InvalidValue {
            field: "logging.format".to_string(),
            reason: format!("expected 'text' or 'json', got '{}'", config.logging.format),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&ConnectomeConfig::default()).is_ok());
    }

    #[test]
    fn test_dataset_names() {
        assert!(is_valid_dataset_name("hemibrain"));
        assert!(is_valid_dataset_name("mb_6"));
        assert!(!is_valid_dataset_name(""));
        assert!(!is_valid_dataset_name("6mb"));
        assert!(!is_valid_dataset_name("hemi:brain"));
    }

    #[test]
    fn test_unpaired_and_out_of_range_thresholds() {
        let mut config = ConnectomeConfig::default();
        config.dataset.pre_hp_threshold = Some(1.5);
        let err = validate_config(&config).unwrap_err().to_string();
        assert!(err.contains("outside [0, 1]"));
        assert!(err.contains("post_hp_threshold is missing"));
    }

    #[test]
    fn test_zero_values_rejected() {
        let mut config = ConnectomeConfig::default();
        config.neuron.post_threshold = 0;
        config.locking.timeout_ms = 0;
        let err = validate_config(&config).unwrap_err().to_string();
        assert!(err.contains("neuron.post_threshold"));
        assert!(err.contains("locking.timeout_ms"));
    }
}
