// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Build a network description against the in-memory engine and summarize it.
//!
//! ```text
//! build_column --preset traub_2005 --scale 0.1 --seed 42
//! build_column --config colnet.toml --json > report.json
//! ```

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, error, info};

use colnet::config::{self, ColnetConfig, LoggingConfig};
use colnet::observability::{self, CrateDebugFlags};

/// Cortical column connectivity generator
#[derive(Parser, Debug)]
#[command(name = "build_column", version, author, long_about = None)]
struct Args {
    /// Network description (TOML). Searched for when neither this nor --preset is given
    #[arg(short, long, conflicts_with = "preset")]
    config: Option<PathBuf>,

    /// Built-in network description (e.g. "traub_2005")
    #[arg(short, long)]
    preset: Option<String>,

    /// Population scale in [0, 1]
    #[arg(long)]
    scale: Option<f64>,

    /// RNG seed ("none" for entropy)
    #[arg(long)]
    seed: Option<String>,

    /// "strict" or "best_effort"
    #[arg(long)]
    wiring_policy: Option<String>,

    /// "allow" or "exclude"
    #[arg(long)]
    self_connections: Option<String>,

    /// "shared" or "per_rule"
    #[arg(long)]
    rng_streams: Option<String>,

    /// Abort when the build runs longer than this many seconds
    #[arg(long)]
    max_build_seconds: Option<f64>,

    /// Print the build report as JSON instead of a summary
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Log level (trace, debug, info, warn, error). Falls back to COLNET_LOG_LEVEL
    #[arg(long)]
    log_level: Option<String>,

    /// Log format ("text" or "json"). Falls back to COLNET_LOG_FORMAT
    #[arg(long)]
    log_format: Option<String>,

    /// Directory for per-run log files (file-logging builds)
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Debug logging for a crate, repeatable or comma-separated ("all" for every crate)
    #[arg(long = "debug", value_name = "CRATE", value_delimiter = ',')]
    debug: Vec<String>,

    /// Debug logging for all crates
    #[arg(long, default_value_t = false)]
    debug_all: bool,
}

impl Args {
    /// Logging starts before the network description is read, so its
    /// settings come from the command line and the environment only.
    fn logging(&self) -> LoggingConfig {
        let defaults = LoggingConfig::default();
        LoggingConfig {
            level: self
                .log_level
                .clone()
                .or_else(|| env::var("COLNET_LOG_LEVEL").ok())
                .unwrap_or(defaults.level),
            format: self
                .log_format
                .clone()
                .or_else(|| env::var("COLNET_LOG_FORMAT").ok())
                .unwrap_or(defaults.format),
            log_dir: self.log_dir.clone(),
        }
    }

    fn debug_flags(&self) -> CrateDebugFlags {
        let mut flags = CrateDebugFlags::from_env();
        flags.enable(&self.debug);
        if self.debug_all {
            flags.enable(["all"]);
        }
        flags
    }

    fn overrides(&self) -> HashMap<String, String> {
        let mut overrides = HashMap::new();
        let mut set = |key: &str, value: Option<String>| {
            if let Some(value) = value {
                overrides.insert(key.to_string(), value);
            }
        };
        set("scale", self.scale.map(|v| v.to_string()));
        set("seed", self.seed.clone());
        set("wiring_policy", self.wiring_policy.clone());
        set("self_connections", self.self_connections.clone());
        set("rng_streams", self.rng_streams.clone());
        set("max_build_seconds", self.max_build_seconds.map(|v| v.to_string()));
        overrides
    }
}

fn load(args: &Args) -> Result<ColnetConfig> {
    let overrides = args.overrides();
    if !overrides.is_empty() {
        debug!(target: "colnet", "Overrides: {:?}", overrides);
    }
    match &args.preset {
        Some(name) => {
            info!(target: "colnet", "Loading preset '{}'", name);
            let mut config = config::preset(name)?;
            config::apply_environment_overrides(&mut config)?;
            config::apply_cli_overrides(&mut config, &overrides)?;
            config::validate_config(&config)?;
            Ok(config)
        }
        None => {
            match &args.config {
                Some(path) => info!(target: "colnet", "Loading {}", path.display()),
                None => info!(target: "colnet", "Searching for colnet.toml"),
            }
            config::load_config(args.config.as_deref(), Some(&overrides)).with_context(|| match &args.config {
                Some(path) => format!("Failed to load {}", path.display()),
                None => "Failed to load colnet.toml (use --preset for a built-in network)".to_string(),
            })
        }
    }
}

fn main() -> Result<()> {
    // Parse CLI arguments first, then logging, then everything else
    let args = Args::parse();
    let _logging = observability::init_logging(&args.debug_flags(), &colnet::logging_options(&args.logging()))?;

    let config = match load(&args) {
        Ok(config) => config,
        Err(e) => {
            error!(target: "colnet", "❌ {:#}", e);
            return Err(e);
        }
    };
    info!(target: "colnet",
        "Loaded network: {} cell types, {} rules, scale {}",
        config.cell_types.len(),
        config.connections.len(),
        config.network.scale
    );
    let (_engine, network) = colnet::build_in_memory(&config).context("Build failed")?;
    let report = &network.report;

    if args.json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!("seed {}  scale {}  ({} ms)", report.seed, report.scale, report.duration_ms);
    println!();
    println!("{:<16} {:>8}", "cell type", "cells");
    for (name, size) in &report.population_sizes {
        println!("{:<16} {:>8}", name, size);
    }
    println!();
    println!(
        "{:<16} {:<16} {:>5} {:>8} {:>4} {:>8} {:>8}",
        "pre", "post", "npre", "p", "k", "slots", "aggs"
    );
    for rule in report.rules.iter().filter(|rule| rule.skip.is_none()) {
        println!(
            "{:<16} {:<16} {:>5} {:>8.4} {:>4} {:>8} {:>8}",
            rule.pre, rule.post, rule.npre, rule.probability, rule.sample_size, rule.slots, rule.aggregators_created
        );
    }
    println!();
    println!(
        "{} cells, {} synapses on {} aggregators",
        report.total_cells, report.total_slots, report.total_aggregators
    );
    if !report.is_complete() {
        anyhow::bail!("{} targets could not be wired", report.failures.len());
    }
    Ok(())
}
