// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Network description: cell types, the connection-rule table and build parameters.

All of these are immutable value objects for a build session. Rules are
validated when they enter the table, so a bad table fails before any engine
call is made.
*/

use std::collections::BTreeMap;
use std::time::Duration;

use ahash::AHashMap;
use colnet_config::{
    ColnetConfig, NetworkConfig, RngStreamMode, SelfConnectionPolicy, WiringPolicy,
};
use serde::{Deserialize, Serialize};

use crate::population::Populations;
use crate::types::{CompartmentId, ConnectivityError, ConnectivityResult, RulePair};

/// A named neuron class
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellType {
    pub name: String,
    /// Unscaled population size
    pub count: usize,
    /// Population size of the reference model (normalizes `npre`)
    pub original_count: usize,
    /// Compartments of the prototype, numbered `1..=compartments`
    pub compartments: u32,
}

impl CellType {
    /// Cell type whose reference size equals its count
    pub fn new(name: impl Into<String>, count: usize, compartments: u32) -> Self {
        Self {
            name: name.into(),
            count,
            original_count: count,
            compartments,
        }
    }

    pub fn with_original_count(mut self, original_count: usize) -> Self {
        self.original_count = original_count;
        self
    }

    /// `floor(scale * count)`
    pub fn scaled_count(&self, scale: f64) -> usize {
        scaled_count(self.count, scale)
    }
}

/// `floor(scale * count)`, saturating at zero for non-positive products
pub fn scaled_count(count: usize, scale: f64) -> usize {
    (scale * count as f64).floor().max(0.0) as usize
}

/// Connection probability and per-post-cell sample size of a rule.
///
/// `p = npre / original_count`, `k = floor(pre_len * p)`. The sample size is
/// computed in integer arithmetic so exact products never lose a synapse to
/// float rounding.
pub fn sample_size(npre: u32, original_count: usize, pre_len: usize) -> (f64, usize) {
    if npre == 0 || original_count == 0 {
        return (0.0, 0);
    }
    let probability = npre as f64 / original_count as f64;
    let k = (pre_len as u128 * npre as u128 / original_count as u128) as usize;
    (probability, k)
}

/// Connectivity between one (pre, post) pair of cell types
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionRule {
    npre: u32,
    compartments: Vec<CompartmentId>,
}

impl ConnectionRule {
    /// Build a rule for `pair`.
    ///
    /// `npre == 0` must come with no compartments ("no connection"), and
    /// `npre > 0` needs at least one. Compartment ids are 1-based and may not
    /// repeat.
    pub fn new(pair: &RulePair, npre: u32, compartments: Vec<CompartmentId>) -> ConnectivityResult<Self> {
        if npre == 0 && !compartments.is_empty() {
            return Err(ConnectivityError::invalid_rule(
                pair,
                format!("npre is 0 but {} compartments are listed", compartments.len()),
            ));
        }
        if npre > 0 && compartments.is_empty() {
            return Err(ConnectivityError::invalid_rule(
                pair,
                format!("npre is {} but no compartments are listed", npre),
            ));
        }
        if compartments.iter().any(|c| c.0 == 0) {
            return Err(ConnectivityError::invalid_rule(pair, "compartment ids start at 1"));
        }
        for (i, comp) in compartments.iter().enumerate() {
            if compartments[..i].contains(comp) {
                return Err(ConnectivityError::invalid_rule(
                    pair,
                    format!("compartment {} listed twice", comp.0),
                ));
            }
        }
        Ok(Self { npre, compartments })
    }

    /// Rule that creates no synapses
    pub fn none() -> Self {
        Self {
            npre: 0,
            compartments: Vec::new(),
        }
    }

    pub fn npre(&self) -> u32 {
        self.npre
    }

    pub fn compartments(&self) -> &[CompartmentId] {
        &self.compartments
    }

    pub fn is_connection(&self) -> bool {
        self.npre > 0
    }
}

/// Ordered table of connection rules keyed by [`RulePair`]
#[derive(Debug, Clone, Default)]
pub struct ConnectionTable {
    rules: Vec<(RulePair, ConnectionRule)>,
    index: AHashMap<RulePair, usize>,
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a rule; a second rule for the same pair is rejected.
    pub fn insert(&mut self, pair: RulePair, rule: ConnectionRule) -> ConnectivityResult<()> {
        if self.index.contains_key(&pair) {
            return Err(ConnectivityError::invalid_rule(&pair, "duplicate rule for this pair"));
        }
        self.index.insert(pair.clone(), self.rules.len());
        self.rules.push((pair, rule));
        Ok(())
    }

    /// Validate and append `(pre, post, npre, comps)`
    pub fn add(
        &mut self,
        pre: impl Into<String>,
        post: impl Into<String>,
        npre: u32,
        comps: &[u32],
    ) -> ConnectivityResult<()> {
        let pair = RulePair::new(pre, post);
        let rule = ConnectionRule::new(&pair, npre, comps.iter().copied().map(CompartmentId).collect())?;
        self.insert(pair, rule)
    }

    pub fn get(&self, pair: &RulePair) -> Option<&ConnectionRule> {
        self.index.get(pair).map(|&i| &self.rules[i].1)
    }

    /// Rules in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&RulePair, &ConnectionRule)> {
        self.rules.iter().map(|(pair, rule)| (pair, rule))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// `(p, k)` of a rule against built populations, without drawing anything
    ///
    /// # Errors
    /// `UnknownCellType` if no rule exists for `pair` or a population is missing.
    pub fn sample_size(&self, pair: &RulePair, populations: &Populations) -> ConnectivityResult<(f64, usize)> {
        let rule = self
            .get(pair)
            .ok_or_else(|| ConnectivityError::UnknownCellType(pair.to_string()))?;
        let pre = populations.require(&pair.pre)?;
        populations.require(&pair.post)?;
        Ok(sample_size(rule.npre, pre.cell_type().original_count, pre.len()))
    }
}

/// Parameters of one build session
#[derive(Debug, Clone, PartialEq)]
pub struct BuildParams {
    pub scale: f64,
    pub seed: Option<u64>,
    pub default_weight: f64,
    pub default_delay_ms: f64,
    pub wiring_policy: WiringPolicy,
    pub self_connections: SelfConnectionPolicy,
    pub rng_streams: RngStreamMode,
    pub max_build_duration: Option<Duration>,
}

impl Default for BuildParams {
    fn default() -> Self {
        Self::from(&NetworkConfig::default())
    }
}

impl From<&NetworkConfig> for BuildParams {
    fn from(config: &NetworkConfig) -> Self {
        Self {
            scale: config.scale,
            seed: config.seed,
            default_weight: config.default_weight,
            default_delay_ms: config.default_delay_ms,
            wiring_policy: config.wiring_policy,
            self_connections: config.self_connections,
            rng_streams: config.rng_streams,
            max_build_duration: config
                .max_build_seconds
                .filter(|s| s.is_finite() && *s >= 0.0)
                .map(Duration::from_secs_f64),
        }
    }
}

/// Complete description of a network to build
#[derive(Debug, Clone)]
pub struct NetworkSpec {
    cell_types: BTreeMap<String, CellType>,
    connections: ConnectionTable,
    params: BuildParams,
}

impl NetworkSpec {
    /// Check the rule table against the cell types.
    ///
    /// # Errors
    /// `InvalidRule` for rules naming unknown types, targeting compartments
    /// the post type does not have, or normalizing by a zero reference count.
    pub fn new(
        cell_types: impl IntoIterator<Item = CellType>,
        connections: ConnectionTable,
        params: BuildParams,
    ) -> ConnectivityResult<Self> {
        let cell_types: BTreeMap<String, CellType> = cell_types
            .into_iter()
            .map(|cell_type| (cell_type.name.clone(), cell_type))
            .collect();

        for (pair, rule) in connections.iter() {
            let pre = cell_types.get(&pair.pre).ok_or_else(|| {
                ConnectivityError::invalid_rule(pair, format!("unknown presynaptic cell type '{}'", pair.pre))
            })?;
            let post = cell_types.get(&pair.post).ok_or_else(|| {
                ConnectivityError::invalid_rule(pair, format!("unknown postsynaptic cell type '{}'", pair.post))
            })?;
            if !rule.is_connection() {
                continue;
            }
            if pre.original_count == 0 {
                return Err(ConnectivityError::invalid_rule(
                    pair,
                    format!("'{}' has an original count of 0", pre.name),
                ));
            }
            if let Some(comp) = rule.compartments().iter().find(|c| c.0 > post.compartments) {
                return Err(ConnectivityError::invalid_rule(
                    pair,
                    format!("{} is out of range for '{}' ({} compartments)", comp, post.name, post.compartments),
                ));
            }
        }

        Ok(Self {
            cell_types,
            connections,
            params,
        })
    }

    /// Validate and convert a configuration.
    ///
    /// # Errors
    /// `Config` when the configuration fails validation, so hand-built
    /// configurations get the same checks as loaded ones.
    pub fn from_config(config: &ColnetConfig) -> ConnectivityResult<Self> {
        colnet_config::validate_config(config)?;

        let cell_types = config.cell_types.iter().map(|(name, cell)| {
            CellType::new(name.clone(), cell.count, cell.compartments)
                .with_original_count(cell.original_count())
        });

        let mut connections = ConnectionTable::new();
        for conn in &config.connections {
            connections.add(conn.pre.clone(), conn.post.clone(), conn.npre, &conn.comps)?;
        }

        Self::new(cell_types, connections, BuildParams::from(&config.network))
    }

    pub fn cell_types(&self) -> &BTreeMap<String, CellType> {
        &self.cell_types
    }

    pub fn cell_type(&self, name: &str) -> ConnectivityResult<&CellType> {
        self.cell_types
            .get(name)
            .ok_or_else(|| ConnectivityError::UnknownCellType(name.to_string()))
    }

    pub fn connections(&self) -> &ConnectionTable {
        &self.connections
    }

    pub fn params(&self) -> &BuildParams {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut BuildParams {
        &mut self.params
    }
}
