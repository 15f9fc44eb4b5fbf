// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Built-in network descriptions.

use crate::validation::validate_config;
use crate::{ColnetConfig, ConfigError, ConfigResult};

/// Names accepted by [`preset`]
pub const PRESET_NAMES: &[&str] = &["traub_2005"];

/// Source of the Traub et al. (2005) thalamocortical column preset
pub const TRAUB_2005_TOML: &str = include_str!("../presets/traub_2005.toml");

/// Load the 14-cell-type thalamocortical column of Traub et al. (2005).
///
/// Reference counts and working counts are identical; the preset ships with
/// `scale = 0.1`, which gives a column of roughly 360 cells.
pub fn traub_2005() -> ConfigResult<ColnetConfig> {
    let config: ColnetConfig = toml::from_str(TRAUB_2005_TOML)?;
    validate_config(&config)?;
    Ok(config)
}

/// Look up a built-in preset by name (case-insensitive, `-` and `_` equivalent)
pub fn preset(name: &str) -> ConfigResult<ColnetConfig> {
    match name.trim().to_lowercase().replace('-', "_").as_str() {
        "traub_2005" | "traub2005" | "traub" => traub_2005(),
        other => Err(ConfigError::InvalidValue(format!(
            "unknown preset '{}' (available: {})",
            other,
            PRESET_NAMES.join(", ")
        ))),
    }
}
