// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Per-crate debug selection
//!
//! Tools collect crate names from their own command line (e.g. a repeatable
//! `--debug <CRATE>` option) and from the `COLNET_DEBUG` environment variable,
//! then turn them into an `EnvFilter` directive string.

use std::collections::BTreeSet;
use std::env;

use crate::KNOWN_CRATES;

/// Environment variable holding comma-separated crate names, or `all`
pub const DEBUG_ENV_VAR: &str = "COLNET_DEBUG";

/// Crates whose log output is raised to `debug`
///
/// # Example
/// ```rust
/// use colnet_observability::CrateDebugFlags;
///
/// let flags = CrateDebugFlags::from_names(["colnet-connectivity"]);
/// assert!(flags.is_enabled("colnet-connectivity"));
/// assert_eq!(flags.to_filter_string("warn"), "colnet-connectivity=debug,warn");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrateDebugFlags {
    enabled: BTreeSet<String>,
}

impl CrateDebugFlags {
    /// Flags for the given crate names; `all` selects every known crate
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut flags = Self::default();
        flags.enable(names);
        flags
    }

    /// Flags from `COLNET_DEBUG`, empty when unset
    pub fn from_env() -> Self {
        match env::var(DEBUG_ENV_VAR) {
            Ok(value) => Self::from_names(value.split(',')),
            Err(_) => Self::default(),
        }
    }

    /// Add crate names; blanks are ignored and `all` expands to [`KNOWN_CRATES`]
    pub fn enable<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for name in names {
            match name.as_ref().trim() {
                "" => {}
                "all" => self.enabled.extend(KNOWN_CRATES.iter().map(|c| c.to_string())),
                crate_name => {
                    self.enabled.insert(crate_name.to_string());
                }
            }
        }
    }

    pub fn is_enabled(&self, crate_name: &str) -> bool {
        self.enabled.contains(crate_name)
    }

    /// `EnvFilter` directives: `crate=debug` per enabled crate, then the default level
    pub fn to_filter_string(&self, default_level: &str) -> String {
        self.enabled
            .iter()
            .map(|crate_name| format!("{}=debug", crate_name))
            .chain(std::iter::once(normalize_level(default_level).to_string()))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Map config-style level names onto `EnvFilter` directives
pub fn normalize_level(level: &str) -> &'static str {
    match level.to_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "warn" | "warning" => "warn",
        "error" | "critical" => "error",
        _ => "info",
    }
}
