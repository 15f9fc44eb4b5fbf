// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # colnet-observability
//!
//! Logging setup shared by the colnet crates and tools.
//!
//! Every crate logs through `tracing` with its crate name as target, so debug
//! output can be switched on per crate (`build_column --debug colnet-connectivity`,
//! `COLNET_DEBUG=colnet-connectivity`).
//!
//! ## Features
//! - `file-logging`: JSON log files in a timestamped run folder (desktop only)

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod cli;
pub mod init;

pub use cli::*;
pub use init::*;

/// Known colnet crate names for debug flags
pub const KNOWN_CRATES: &[&str] = &[
    "colnet",
    "colnet-config",
    "colnet-connectivity",
    "colnet-observability",
];
