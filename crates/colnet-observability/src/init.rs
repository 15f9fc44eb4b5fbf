// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Unified logging initialization for colnet
//!
//! Console output is always on. With the `file-logging` feature, a JSON log
//! of the whole run is also written to a timestamped folder.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::cli::CrateDebugFlags;

/// Console / file logging options
#[derive(Debug, Clone)]
pub struct LoggingOptions {
    /// Default level for crates without a debug flag
    pub level: String,
    /// Emit JSON lines on the console instead of human-readable text
    pub json: bool,
    /// Base directory for run folders (file-logging builds only)
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            log_dir: None,
        }
    }
}

/// Keeps background log writers alive; logs are flushed on drop.
pub struct LoggingGuard {
    #[cfg(feature = "file-logging")]
    _file_guards: Vec<tracing_appender::non_blocking::WorkerGuard>,
    log_dir: Option<PathBuf>,
}

impl LoggingGuard {
    /// Run folder receiving the file log, if any
    pub fn log_dir(&self) -> Option<&Path> {
        self.log_dir.as_deref()
    }
}

/// Initialize the global tracing subscriber
///
/// # Arguments
/// * `debug_flags` - Per-crate debug flags for filtering
/// * `options` - Default level, console format and log directory
///
/// # Errors
/// Fails if a global subscriber is already installed or the log folder
/// cannot be created.
pub fn init_logging(debug_flags: &CrateDebugFlags, options: &LoggingOptions) -> Result<LoggingGuard> {
    let filter = debug_flags.to_filter_string(&options.level);
    let env_filter = EnvFilter::try_new(&filter)
        .map_err(|e| anyhow!("Invalid log filter '{}': {}", filter, e))?;

    let mut layers = Vec::new();

    let console_layer = if options.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_filter(env_filter.clone())
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_file(false)
            .with_line_number(false)
            .with_filter(env_filter.clone())
            .boxed()
    };
    layers.push(console_layer);

    #[cfg(feature = "file-logging")]
    let (file_guards, log_dir) = match &options.log_dir {
        Some(base_log_dir) => {
            use anyhow::Context;

            let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
            let run_folder = base_log_dir.join(format!("run_{}", timestamp));
            std::fs::create_dir_all(&run_folder).with_context(|| {
                format!("Failed to create log directory: {}", run_folder.display())
            })?;

            let appender = tracing_appender::rolling::never(&run_folder, "colnet.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let file_layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .json()
                .with_filter(env_filter.clone())
                .boxed();
            layers.push(file_layer);
            (vec![guard], Some(run_folder))
        }
        None => (Vec::new(), None),
    };

    #[cfg(not(feature = "file-logging"))]
    let log_dir = None;

    Registry::default()
        .with(layers)
        .try_init()
        .map_err(|e| anyhow!("Failed to install tracing subscriber: {}", e))?;

    Ok(LoggingGuard {
        #[cfg(feature = "file-logging")]
        _file_guards: file_guards,
        log_dir,
    })
}
