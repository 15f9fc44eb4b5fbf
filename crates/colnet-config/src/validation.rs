// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration validation
//!
//! This module checks that a network description is internally consistent
//! before any build starts: value ranges, cell-type references, and the shape
//! of every connection rule. All problems are collected and reported together.

use std::collections::HashSet;

use crate::{ColnetConfig, ConfigError, ConfigResult};

/// Validation errors that can occur during config validation
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValidationError {
    InvalidValue { field: String, reason: String },
    UnknownCellType { field: String, name: String },
    InconsistentRule { pre: String, post: String, npre: u32, comps: usize },
    DuplicateRule { pre: String, post: String },
    CompartmentOutOfRange { pre: String, post: String, comp: u32, max: u32 },
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidValue { field, reason } => {
                write!(f, "Invalid configuration value for {}: {}", field, reason)
            }
            Self::UnknownCellType { field, name } => {
                write!(f, "{} refers to unknown cell type '{}'", field, name)
            }
            Self::InconsistentRule { pre, post, npre, comps } => write!(
                f,
                "Rule {} -> {} has npre = {} but {} target compartments",
                pre, post, npre, comps
            ),
            Self::DuplicateRule { pre, post } => {
                write!(f, "Rule {} -> {} is defined more than once", pre, post)
            }
            Self::CompartmentOutOfRange { pre, post, comp, max } => write!(
                f,
                "Rule {} -> {} targets compartment {} but {} has compartments 1..={}",
                pre, post, comp, post, max
            ),
        }
    }
}

/// Validate the complete configuration
///
/// Checks for:
/// - Session parameters within range (scale, delay, weight, deadline)
/// - Non-zero reference counts and compartment numbers
/// - Connection rules referring to known cell types
/// - `npre` and `comps` being both zero/empty or both set
/// - Compartment ids within the postsynaptic prototype
/// - At most one rule per (pre, post) pair
///
/// # Errors
///
/// Returns `ConfigError::ValidationError` with details if validation fails
pub fn validate_config(config: &ColnetConfig) -> ConfigResult<()> {
    let mut errors = Vec::new();

    validate_network(config, &mut errors);
    validate_cell_types(config, &mut errors);
    validate_connections(config, &mut errors);
    validate_logging(config, &mut errors);

    if !errors.is_empty() {
        let error_messages = errors
            .iter()
            .map(|e| format!("  - {}", e))
            .collect::<Vec<_>>()
            .join("\n");

        return Err(ConfigError::ValidationError(format!(
            "Configuration validation failed:\n{}",
            error_messages
        )));
    }

    Ok(())
}

fn validate_network(config: &ColnetConfig, errors: &mut Vec<ConfigValidationError>) {
    let network = &config.network;

    if !(0.0..=1.0).contains(&network.scale) {
        errors.push(ConfigValidationError::InvalidValue {
            field: "network.scale".to_string(),
            reason: "must be between 0.0 and 1.0".to_string(),
        });
    }

    if !network.default_weight.is_finite() {
        errors.push(ConfigValidationError::InvalidValue {
            field: "network.default_weight".to_string(),
            reason: "must be finite".to_string(),
        });
    }

    if !network.default_delay_ms.is_finite() || network.default_delay_ms < 0.0 {
        errors.push(ConfigValidationError::InvalidValue {
            field: "network.default_delay_ms".to_string(),
            reason: "must be non-negative".to_string(),
        });
    }

    if let Some(seconds) = network.max_build_seconds {
        if !seconds.is_finite() || seconds <= 0.0 {
            errors.push(ConfigValidationError::InvalidValue {
                field: "network.max_build_seconds".to_string(),
                reason: "must be positive".to_string(),
            });
        }
    }
}

fn validate_cell_types(config: &ColnetConfig, errors: &mut Vec<ConfigValidationError>) {
    for (name, cell) in &config.cell_types {
        if cell.original_count() == 0 {
            errors.push(ConfigValidationError::InvalidValue {
                field: format!("cell_types.{}.original_count", name),
                reason: "must be positive (used to normalize npre)".to_string(),
            });
        }
        if cell.compartments == 0 {
            errors.push(ConfigValidationError::InvalidValue {
                field: format!("cell_types.{}.compartments", name),
                reason: "must be positive".to_string(),
            });
        }
    }
}

fn validate_connections(config: &ColnetConfig, errors: &mut Vec<ConfigValidationError>) {
    let mut seen = HashSet::new();

    for (idx, conn) in config.connections.iter().enumerate() {
        let pre = config.cell_types.get(&conn.pre);
        let post = config.cell_types.get(&conn.post);

        if pre.is_none() {
            errors.push(ConfigValidationError::UnknownCellType {
                field: format!("connections[{}].pre", idx),
                name: conn.pre.clone(),
            });
        }
        if post.is_none() {
            errors.push(ConfigValidationError::UnknownCellType {
                field: format!("connections[{}].post", idx),
                name: conn.post.clone(),
            });
        }

        if (conn.npre == 0) != conn.comps.is_empty() {
            errors.push(ConfigValidationError::InconsistentRule {
                pre: conn.pre.clone(),
                post: conn.post.clone(),
                npre: conn.npre,
                comps: conn.comps.len(),
            });
        }

        if !seen.insert((conn.pre.as_str(), conn.post.as_str())) {
            errors.push(ConfigValidationError::DuplicateRule {
                pre: conn.pre.clone(),
                post: conn.post.clone(),
            });
        }

        let mut comps_seen = HashSet::new();
        for &comp in &conn.comps {
            if !comps_seen.insert(comp) {
                errors.push(ConfigValidationError::InvalidValue {
                    field: format!("connections[{}].comps", idx),
                    reason: format!("compartment {} listed twice", comp),
                });
            }
            if let Some(post) = post {
                if comp == 0 || comp > post.compartments {
                    errors.push(ConfigValidationError::CompartmentOutOfRange {
                        pre: conn.pre.clone(),
                        post: conn.post.clone(),
                        comp,
                        max: post.compartments,
                    });
                }
            }
        }
    }
}

fn validate_logging(config: &ColnetConfig, errors: &mut Vec<ConfigValidationError>) {
    let level = config.logging.level.to_lowercase();
    if !["trace", "debug", "info", "warn", "warning", "error"].contains(&level.as_str()) {
        errors.push(ConfigValidationError::InvalidValue {
            field: "logging.level".to_string(),
            reason: "must be one of trace, debug, info, warn, error".to_string(),
        });
    }

    if config.logging.format != "text" && config.logging.format != "json" {
        errors.push(ConfigValidationError::InvalidValue {
            field: "logging.format".to_string(),
            reason: "must be 'text' or 'json'".to_string(),
        });
    }
}
