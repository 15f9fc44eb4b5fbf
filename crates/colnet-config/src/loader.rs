// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration file loading with override support
//!
//! This module implements the 3-tier configuration loading system:
//! 1. TOML file (base network description)
//! 2. Environment variables (runtime overrides)
//! 3. CLI arguments (explicit user overrides)
//!
//! Overrides only touch session parameters (`[network]`, `[logging]`); the
//! cell-type and connection tables always come from the file.

use crate::validation::validate_config;
use crate::{ColnetConfig, ConfigError, ConfigResult};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_FILE_NAME: &str = "colnet.toml";

/// Find the colnet configuration file
///
/// Search order:
/// 1. `COLNET_CONFIG_PATH` environment variable
/// 2. Current working directory: `./colnet.toml`
/// 3. Parent directories (up to 5 levels)
///
/// # Errors
///
/// Returns `ConfigError::FileNotFound` if no config file is found in any location
pub fn find_config_file() -> ConfigResult<PathBuf> {
    if let Ok(env_path) = env::var("COLNET_CONFIG_PATH") {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        return Err(ConfigError::FileNotFound(format!(
            "Config file specified by COLNET_CONFIG_PATH not found: {}",
            path.display()
        )));
    }

    let mut search_paths = Vec::new();
    if let Ok(cwd) = env::current_dir() {
        search_paths.push(cwd.join(CONFIG_FILE_NAME));

        let mut current = cwd.clone();
        for _ in 0..5 {
            if let Some(parent) = current.parent() {
                search_paths.push(parent.join(CONFIG_FILE_NAME));
                current = parent.to_path_buf();
            }
        }
    }

    if let Some(path) = search_paths.iter().find(|p| p.exists()) {
        return Ok(path.clone());
    }

    let search_list = search_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    Err(ConfigError::FileNotFound(format!(
        "colnet configuration file '{}' not found in any of these locations:\n{}\n\nSet COLNET_CONFIG_PATH environment variable to specify custom location.",
        CONFIG_FILE_NAME, search_list
    )))
}

/// Load configuration from TOML file
///
/// # Arguments
///
/// * `config_path` - Optional path to config file. If `None`, will search for config file.
/// * `cli_args` - Optional CLI argument overrides
///
/// # Errors
///
/// Returns error if the config file is not found, contains invalid TOML, an
/// override value cannot be parsed, or the result fails validation
pub fn load_config(
    config_path: Option<&Path>,
    cli_args: Option<&HashMap<String, String>>,
) -> ConfigResult<ColnetConfig> {
    let config_file = match config_path {
        Some(path) => path.to_path_buf(),
        None => find_config_file()?,
    };

    let content = fs::read_to_string(&config_file)?;
    let mut config: ColnetConfig = toml::from_str(&content)?;

    apply_environment_overrides(&mut config)?;
    if let Some(cli) = cli_args {
        apply_cli_overrides(&mut config, cli)?;
    }

    validate_config(&config)?;
    Ok(config)
}

/// Apply environment variable overrides to configuration
///
/// Supported environment variables:
/// - `COLNET_SCALE` -> `network.scale`
/// - `COLNET_SEED` -> `network.seed`
/// - `COLNET_WIRING_POLICY` -> `network.wiring_policy`
/// - `COLNET_SELF_CONNECTIONS` -> `network.self_connections`
/// - `COLNET_RNG_STREAMS` -> `network.rng_streams`
/// - `COLNET_LOG_LEVEL` -> `logging.level`
/// - `COLNET_LOG_FORMAT` -> `logging.format`
pub fn apply_environment_overrides(config: &mut ColnetConfig) -> ConfigResult<()> {
    let lookup: HashMap<String, String> = [
        ("COLNET_SCALE", "scale"),
        ("COLNET_SEED", "seed"),
        ("COLNET_WIRING_POLICY", "wiring_policy"),
        ("COLNET_SELF_CONNECTIONS", "self_connections"),
        ("COLNET_RNG_STREAMS", "rng_streams"),
        ("COLNET_LOG_LEVEL", "log_level"),
        ("COLNET_LOG_FORMAT", "log_format"),
    ]
    .into_iter()
    .filter_map(|(var, key)| env::var(var).ok().map(|value| (key.to_string(), value)))
    .collect();

    apply_overrides(config, &lookup)
}

/// Apply CLI argument overrides to configuration
///
/// # Arguments
///
/// * `config` - Configuration to modify
/// * `cli_args` - HashMap of CLI arguments (e.g., `{"scale": "0.1", "seed": "42"}`)
pub fn apply_cli_overrides(
    config: &mut ColnetConfig,
    cli_args: &HashMap<String, String>,
) -> ConfigResult<()> {
    apply_overrides(config, cli_args)
}

fn apply_overrides(config: &mut ColnetConfig, values: &HashMap<String, String>) -> ConfigResult<()> {
    if let Some(value) = values.get("scale") {
        config.network.scale = parse_value("scale", value)?;
    }
    if let Some(value) = values.get("seed") {
        config.network.seed = match value.trim() {
            "" | "none" => None,
            seed => Some(parse_value("seed", seed)?),
        };
    }
    if let Some(value) = values.get("default_weight") {
        config.network.default_weight = parse_value("default_weight", value)?;
    }
    if let Some(value) = values.get("default_delay_ms") {
        config.network.default_delay_ms = parse_value("default_delay_ms", value)?;
    }
    if let Some(value) = values.get("wiring_policy") {
        config.network.wiring_policy = value.parse()?;
    }
    if let Some(value) = values.get("self_connections") {
        config.network.self_connections = value.parse()?;
    }
    if let Some(value) = values.get("rng_streams") {
        config.network.rng_streams = value.parse()?;
    }
    if let Some(value) = values.get("max_build_seconds") {
        config.network.max_build_seconds = Some(parse_value("max_build_seconds", value)?);
    }
    if let Some(value) = values.get("log_level") {
        config.logging.level = value.clone();
    }
    if let Some(value) = values.get("log_format") {
        config.logging.format = value.clone();
    }
    Ok(())
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> ConfigResult<T> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| ConfigError::InvalidValue(format!("{} = '{}'", key, value)))
}
