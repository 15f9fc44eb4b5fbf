// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # colnet - Cortical Column Connectivity Generator
//!
//! colnet builds the topology of a biologically structured spiking network:
//! scaled cell populations per cell type, and synapses between specific
//! compartments sampled from a table of connection rules normalized against a
//! reference model. Cell instantiation and synapse objects belong to a
//! simulation engine, reached through the `CellFactory` and `ChannelFactory`
//! traits.
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! colnet = "0.1"  # Default: parallel building
//! ```
//!
//! ```rust
//! use colnet::prelude::*;
//!
//! // Thalamocortical column of Traub et al. (2005), scaled down
//! let mut config = colnet::config::traub_2005()?;
//! config.network.scale = 0.02;
//! config.network.seed = Some(7);
//!
//! let (_engine, network) = colnet::build_in_memory(&config)?;
//! assert!(network.report.is_complete());
//! println!("{} synapses", network.report.total_slots);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Feature Flags
//!
//! - **`parallel`** (default): build populations and per-rule plans on rayon
//! - **`file-logging`**: JSON log files in timestamped run folders
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  Foundation: colnet-config, colnet-observability        │
//! │  (TOML network description, presets, logging)           │
//! └─────────────────────────────────────────────────────────┘
//!                         ↓
//! ┌─────────────────────────────────────────────────────────┐
//! │  Algorithms: colnet-connectivity                        │
//! │  (population scaling, sampling, aggregator wiring)      │
//! └─────────────────────────────────────────────────────────┘
//!                         ↓
//! ┌─────────────────────────────────────────────────────────┐
//! │  Engine: CellFactory + ChannelFactory                   │
//! │  (simulator-side cells and synapses)                    │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## License
//!
//! Apache-2.0

// Re-export foundation
pub use colnet_config as config;
pub use colnet_observability as observability;

// Re-export algorithms
pub use colnet_connectivity as connectivity;

use colnet_config::{ColnetConfig, LoggingConfig};
use colnet_connectivity::engine::memory::InMemoryEngine;
use colnet_connectivity::{BuiltNetwork, ConnectivityResult, NetworkBuilder, NetworkSpec};
use colnet_observability::LoggingOptions;

/// Build `config` against a fresh in-memory engine
pub fn build_in_memory(config: &ColnetConfig) -> ConnectivityResult<(InMemoryEngine, BuiltNetwork)> {
    let spec = NetworkSpec::from_config(config)?;
    let engine = InMemoryEngine::from_spec(&spec);
    let network = NetworkBuilder::new(spec).build(&engine, &engine)?;
    Ok((engine, network))
}

/// Logging options for the `[logging]` section of a network description
pub fn logging_options(logging: &LoggingConfig) -> LoggingOptions {
    LoggingOptions {
        level: logging.level.clone(),
        json: logging.format.eq_ignore_ascii_case("json"),
        log_dir: logging.log_dir.clone(),
    }
}

/// Prelude - commonly used types and traits
pub mod prelude {
    pub use colnet_config::{ColnetConfig, RngStreamMode, SelfConnectionPolicy, WiringPolicy};
    pub use colnet_connectivity::engine::memory::InMemoryEngine;
    pub use colnet_connectivity::{
        BuildParams, BuildReport, BuiltNetwork, CellFactory, CellType, ChannelFactory, CompartmentId,
        ConnectionTable, ConnectivityError, ConnectivityResult, NetworkBuilder, NetworkSpec,
        RulePair,
    };
}
