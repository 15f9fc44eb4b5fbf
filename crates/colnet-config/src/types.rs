// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration type definitions
//!
//! This module defines all configuration structs that map to sections in
//! `colnet.toml`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::ConfigError;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ColnetConfig {
    pub network: NetworkConfig,
    /// Cell type name -> population description
    pub cell_types: BTreeMap<String, CellTypeConfig>,
    /// Flat (pre, post) connection table
    pub connections: Vec<ConnectionConfig>,
    pub logging: LoggingConfig,
}

/// Build-session parameters
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Population downscaling factor in `[0, 1]`
    pub scale: f64,
    /// RNG seed; `None` seeds from OS entropy
    pub seed: Option<u64>,
    pub default_weight: f64,
    pub default_delay_ms: f64,
    pub wiring_policy: WiringPolicy,
    pub self_connections: SelfConnectionPolicy,
    pub rng_streams: RngStreamMode,
    /// Abort the build when it runs longer than this (checked between rules)
    pub max_build_seconds: Option<f64>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            scale: 1.0,
            seed: None,
            default_weight: 1.0,
            default_delay_ms: 1.0,
            wiring_policy: WiringPolicy::default(),
            self_connections: SelfConnectionPolicy::default(),
            rng_streams: RngStreamMode::default(),
            max_build_seconds: None,
        }
    }
}

/// One cell type of the column
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CellTypeConfig {
    /// Population size before scaling
    pub count: usize,
    /// Population size of the reference model, used to normalize `npre`.
    /// Defaults to `count`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_count: Option<usize>,
    /// Number of compartments of the prototype (numbered `1..=compartments`)
    pub compartments: u32,
}

impl CellTypeConfig {
    pub fn new(count: usize, compartments: u32) -> Self {
        Self {
            count,
            original_count: None,
            compartments,
        }
    }

    pub fn with_original_count(mut self, original_count: usize) -> Self {
        self.original_count = Some(original_count);
        self
    }

    /// Reference population size (falls back to `count`)
    pub fn original_count(&self) -> usize {
        self.original_count.unwrap_or(self.count)
    }
}

/// One entry of the connection table
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ConnectionConfig {
    pub pre: String,
    pub post: String,
    /// Presynaptic cells per postsynaptic cell in the reference model
    pub npre: u32,
    /// Allowed postsynaptic compartments
    #[serde(default)]
    pub comps: Vec<u32>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format ("text" or "json")
    pub format: String,
    /// Directory for per-run log files (file-logging builds only)
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
            log_dir: None,
        }
    }
}

/// What to do when the engine rejects a single synapse
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WiringPolicy {
    /// Abort the whole build on the first rejected synapse
    #[default]
    Strict,
    /// Log the rejection, count it, and continue with the next target
    BestEffort,
}

/// Whether a cell may be drawn as its own presynaptic partner
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelfConnectionPolicy {
    #[default]
    Allow,
    Exclude,
}

/// How random streams are assigned to connection rules
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RngStreamMode {
    /// One stream shared by all rules, consumed in table order
    #[default]
    Shared,
    /// One stream per rule, derived from the seed and the rule's cell types
    PerRule,
}

macro_rules! impl_policy_str {
    ($ty:ty, $($variant:path => $name:literal),+ $(,)?) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self {
                    $($variant => f.write_str($name),)+
                }
            }
        }

        impl FromStr for $ty {
            type Err = ConfigError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_lowercase().replace('-', "_").as_str() {
                    $($name => Ok($variant),)+
                    other => Err(ConfigError::InvalidValue(format!(
                        "'{}' is not a valid {}",
                        other,
                        stringify!($ty)
                    ))),
                }
            }
        }
    };
}

impl_policy_str!(WiringPolicy,
    WiringPolicy::Strict => "strict",
    WiringPolicy::BestEffort => "best_effort",
);
impl_policy_str!(SelfConnectionPolicy,
    SelfConnectionPolicy::Allow => "allow",
    SelfConnectionPolicy::Exclude => "exclude",
);
impl_policy_str!(RngStreamMode,
    RngStreamMode::Shared => "shared",
    RngStreamMode::PerRule => "per_rule",
);
