// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Connectome Configuration
//!
//! Type-safe loader for `connectome_configuration.toml` with:
//! - TOML file parsing
//! - Environment variable overrides (`CONNECTOME_*`)
//! - CLI argument overrides
//!
//! ## Usage
//!
//! ```rust,no_run
//! use connectome_config::{load_config, validate_config};
//!
//! let config = load_config(None, None).expect("Failed to load config");
//! validate_config(&config).expect("Invalid config");
//! println!("Dataset: {}", config.dataset.name);
//! ```

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod loader;
pub mod types;
pub mod validation;

pub use loader::{apply_cli_overrides, apply_environment_overrides, find_config_file, load_config};
pub use types::*;
pub use validation::{validate_config, ConfigValidationError};

/// Errors from locating, reading, or validating the configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0}")]
    FileNotFound(String),

    #[error("cannot read configuration: {0}")]
    IoError(#[from] std::io::Error),

    #[error("malformed configuration TOML: {0}")]
    ParseError(String),

    /// Every problem `validate_config` found, joined into one message.
    #[error("invalid configuration: {0}")]
    ValidationError(String),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;
