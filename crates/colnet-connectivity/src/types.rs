// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Core types for connectivity operations.
*/

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::engine::EngineError;
use crate::wiring::AggregatorKey;

/// Compartment number on a cell prototype (1 = soma)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompartmentId(pub u32);

impl fmt::Display for CompartmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "comp_{}", self.0)
    }
}

/// Key of a connection rule: (presynaptic type, postsynaptic type)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RulePair {
    pub pre: String,
    pub post: String,
}

impl RulePair {
    pub fn new(pre: impl Into<String>, post: impl Into<String>) -> Self {
        Self {
            pre: pre.into(),
            post: post.into(),
        }
    }

    /// Rule connects a cell type to itself
    pub fn is_recurrent(&self) -> bool {
        self.pre == self.post
    }
}

impl fmt::Display for RulePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.pre, self.post)
    }
}

/// Result type for connectivity operations
pub type ConnectivityResult<T> = Result<T, ConnectivityError>;

/// Errors that can occur while building a network
#[derive(Debug, thiserror::Error)]
pub enum ConnectivityError {
    #[error("Invalid rule {pair}: {reason}")]
    InvalidRule { pair: RulePair, reason: String },

    #[error("Unknown cell type: {0}")]
    UnknownCellType(String),

    #[error("Prototype missing for cell type '{cell_type}': {source}")]
    PrototypeMissing {
        cell_type: String,
        #[source]
        source: EngineError,
    },

    #[error("Cannot draw {requested} samples from an empty {domain}")]
    EmptyDomain { domain: &'static str, requested: usize },

    #[error("Wiring failed for {key}: {source}")]
    Wiring {
        key: AggregatorKey,
        #[source]
        source: EngineError,
    },

    #[error("Invalid scale {0}: must be within [0, 1]")]
    InvalidScale(f64),

    #[error("Build exceeded deadline of {limit_ms} ms (elapsed {elapsed_ms} ms)")]
    DeadlineExceeded { limit_ms: u64, elapsed_ms: u64 },

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Configuration error: {0}")]
    Config(#[from] colnet_config::ConfigError),
}

impl ConnectivityError {
    pub(crate) fn invalid_rule(pair: &RulePair, reason: impl Into<String>) -> Self {
        ConnectivityError::InvalidRule {
            pair: pair.clone(),
            reason: reason.into(),
        }
    }
}
