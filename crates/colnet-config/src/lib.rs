// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # colnet Configuration System
//!
//! Type-safe loader for network descriptions with support for:
//! - TOML file parsing
//! - Environment variable overrides
//! - CLI argument overrides
//! - Built-in presets (Traub et al. 2005 thalamocortical column)
//!
//! ## Usage
//!
//! ```rust,no_run
//! use colnet_config::{load_config, ColnetConfig};
//!
//! // Load configuration with automatic file discovery and overrides
//! let config = load_config(None, None).expect("Failed to load config");
//!
//! println!("Scale: {}", config.network.scale);
//! println!("Cell types: {}", config.cell_types.len());
//! ```
//!
//! Every table in a loaded configuration is treated as an immutable value for
//! the duration of a build; overrides are applied once, at load time.

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod loader;
pub mod presets;
pub mod types;
pub mod validation;

pub use loader::{apply_cli_overrides, apply_environment_overrides, find_config_file, load_config};
pub use presets::{preset, traub_2005, PRESET_NAMES};
pub use types::*;
pub use validation::{validate_config, ConfigValidationError};

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config file not found. Searched: {0}")]
    FileNotFound(String),

    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid TOML syntax: {0}")]
    ParseError(String),

    #[error("Validation failed: {0}")]
    ValidationError(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;
