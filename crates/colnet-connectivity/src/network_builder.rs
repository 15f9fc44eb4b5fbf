// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Network building - populations and synapses from a network description.

The builder runs one build session in two stages:

1. **Neurogenesis**: instantiate the scaled populations
2. **Synaptogenesis**: plan and wire every connection rule in table order

Progress is published through a shared [`BuildProgress`] that other threads
may poll while a build runs. A finished build returns the populations, the
as-built aggregator graph and a [`BuildReport`] with per-rule statistics.
*/

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use colnet_config::{RngStreamMode, SelfConnectionPolicy, WiringPolicy};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::engine::{CellFactory, ChannelFactory};
use crate::planner::{ConnectivityPlanner, PlannedTarget, RulePlan, SkipReason};
use crate::population::{PopulationBuilder, Populations};
use crate::rng::RandomSampler;
use crate::spec::NetworkSpec;
use crate::types::{ConnectivityError, ConnectivityResult};
use crate::wiring::{SynapseAggregator, SynapseWiring};

/// Build stage tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStage {
    /// Not started
    Initialization,
    /// Creating cells
    Neurogenesis,
    /// Creating synapses
    Synaptogenesis,
    Completed,
    Failed,
}

/// Build progress information
#[derive(Debug, Clone, Serialize)]
pub struct BuildProgress {
    pub stage: BuildStage,
    /// Progress within the current stage (0-100)
    pub progress: u8,
    pub cells_created: usize,
    pub rules_processed: usize,
    pub total_rules: usize,
    pub slots_created: usize,
    pub aggregators_created: usize,
    pub duration_ms: u64,
}

impl Default for BuildProgress {
    fn default() -> Self {
        Self {
            stage: BuildStage::Initialization,
            progress: 0,
            cells_created: 0,
            rules_processed: 0,
            total_rules: 0,
            slots_created: 0,
            aggregators_created: 0,
            duration_ms: 0,
        }
    }
}

/// Outcome of one connection rule
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleStats {
    pub pre: String,
    pub post: String,
    pub npre: u32,
    pub probability: f64,
    pub sample_size: usize,
    pub skip: Option<SkipReason>,
    /// Planned targets (`sample_size * len(post)` unless skipped)
    pub targets: usize,
    pub slots: usize,
    pub aggregators_created: usize,
    pub failures: usize,
    pub duration_ms: f64,
}

/// A target the engine refused under best-effort wiring
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WiringFailure {
    pub key: String,
    pub error: String,
}

/// Summary of a finished build
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub seed: u64,
    pub scale: f64,
    pub wiring_policy: WiringPolicy,
    pub self_connections: SelfConnectionPolicy,
    pub rng_streams: RngStreamMode,
    pub population_sizes: BTreeMap<String, usize>,
    pub rules: Vec<RuleStats>,
    pub total_cells: usize,
    pub total_targets: usize,
    pub total_slots: usize,
    pub total_aggregators: usize,
    pub failures: Vec<WiringFailure>,
    pub duration_ms: u64,
}

impl BuildReport {
    /// Every planned target was wired
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn rule(&self, pre: &str, post: &str) -> Option<&RuleStats> {
        self.rules.iter().find(|stats| stats.pre == pre && stats.post == post)
    }
}

/// Result of a successful build
#[derive(Debug)]
pub struct BuiltNetwork {
    pub populations: Populations,
    /// As-built aggregator graph, ordered by key
    pub aggregators: Vec<SynapseAggregator>,
    pub report: BuildReport,
}

/// Build orchestrator
///
/// Owns an immutable [`NetworkSpec`] and builds it against the engine
/// collaborators passed to [`build`](Self::build).
pub struct NetworkBuilder {
    spec: NetworkSpec,
    progress: Arc<RwLock<BuildProgress>>,
}

impl NetworkBuilder {
    pub fn new(spec: NetworkSpec) -> Self {
        Self {
            spec,
            progress: Arc::new(RwLock::new(BuildProgress::default())),
        }
    }

    pub fn spec(&self) -> &NetworkSpec {
        &self.spec
    }

    /// Get current build progress
    pub fn get_progress(&self) -> BuildProgress {
        self.progress.read().clone()
    }

    /// Shared progress, for polling from another thread
    pub fn progress_handle(&self) -> Arc<RwLock<BuildProgress>> {
        Arc::clone(&self.progress)
    }

    /// Run one build session.
    ///
    /// Cells and synapses created before a failure stay in the engine; the
    /// progress stage is left at [`BuildStage::Failed`].
    pub fn build<F, C>(&self, cell_factory: &F, channel_factory: &C) -> ConnectivityResult<BuiltNetwork>
    where
        F: CellFactory + ?Sized,
        C: ChannelFactory + ?Sized,
    {
        let start = Instant::now();
        *self.progress.write() = BuildProgress {
            total_rules: self.spec.connections().len(),
            ..BuildProgress::default()
        };

        let result = self.run(cell_factory, channel_factory, start);
        let mut progress = self.progress.write();
        progress.duration_ms = start.elapsed().as_millis() as u64;
        match &result {
            Ok(network) => {
                progress.stage = BuildStage::Completed;
                progress.progress = 100;
                info!(target: "colnet-connectivity",
                    "✅ Build complete: {} cells, {} synapses on {} aggregators in {} ms",
                    network.report.total_cells,
                    network.report.total_slots,
                    network.report.total_aggregators,
                    network.report.duration_ms
                );
            }
            Err(e) => {
                progress.stage = BuildStage::Failed;
                error!(target: "colnet-connectivity", "❌ Build failed: {}", e);
            }
        }
        result
    }

    fn run<F, C>(&self, cell_factory: &F, channel_factory: &C, start: Instant) -> ConnectivityResult<BuiltNetwork>
    where
        F: CellFactory + ?Sized,
        C: ChannelFactory + ?Sized,
    {
        let params = self.spec.params();
        let mut sampler = RandomSampler::from_seed_option(params.seed);
        info!(target: "colnet-connectivity",
            "🧬 Building network: {} cell types, {} rules, scale {}, seed {}",
            self.spec.cell_types().len(),
            self.spec.connections().len(),
            params.scale,
            sampler.seed()
        );

        // Stage 1: Neurogenesis
        self.set_stage(BuildStage::Neurogenesis);
        info!(target: "colnet-connectivity", "🔬 Stage 1: Neurogenesis - creating populations");
        let populations = PopulationBuilder::new(cell_factory).build(self.spec.cell_types().values(), params.scale)?;
        {
            let mut progress = self.progress.write();
            progress.cells_created = populations.total_cells();
            progress.progress = 100;
        }
        info!(target: "colnet-connectivity", "  Neurogenesis complete: {} cells", populations.total_cells());

        // Stage 2: Synaptogenesis
        self.set_stage(BuildStage::Synaptogenesis);
        info!(target: "colnet-connectivity", "🔗 Stage 2: Synaptogenesis - wiring {} rules", self.spec.connections().len());
        let (rules, failures, aggregators) = {
            let planner = ConnectivityPlanner::new(self.spec.connections(), &populations)?;
            planner.check_draws(params.self_connections)?;
            let wiring = SynapseWiring::new(channel_factory);

            #[cfg(feature = "parallel")]
            let mut planned: Vec<Option<Vec<PlannedTarget<'_>>>> = match params.rng_streams {
                RngStreamMode::PerRule => {
                    self.check_deadline(start)?;
                    planner
                        .plan_parallel(sampler.seed(), params.self_connections)?
                        .into_iter()
                        .map(Some)
                        .collect()
                }
                RngStreamMode::Shared => Vec::new(),
            };

            let mut rules = Vec::with_capacity(planner.rule_plans().len());
            let mut failures = Vec::new();
            for (i, plan) in planner.rule_plans().iter().enumerate() {
                self.check_deadline(start)?;

                #[cfg(feature = "parallel")]
                let precomputed = planned.get_mut(i).and_then(Option::take);
                #[cfg(not(feature = "parallel"))]
                let precomputed: Option<Vec<PlannedTarget<'_>>> = None;

                let targets: Box<dyn Iterator<Item = ConnectivityResult<PlannedTarget<'_>>> + '_> =
                    match (precomputed, params.rng_streams) {
                        (Some(targets), _) => Box::new(targets.into_iter().map(Ok)),
                        (None, RngStreamMode::Shared) => {
                            Box::new(plan.targets(&mut sampler, params.self_connections))
                        }
                        (None, RngStreamMode::PerRule) => Box::new(plan.targets(
                            RandomSampler::for_rule(sampler.seed(), plan.pair),
                            params.self_connections,
                        )),
                    };

                let stats = self.wire_rule(plan, targets, &wiring, &mut failures)?;
                {
                    let mut progress = self.progress.write();
                    progress.rules_processed = i + 1;
                    progress.progress = ((i + 1) * 100 / planner.rule_plans().len()) as u8;
                    progress.slots_created += stats.slots;
                    progress.aggregators_created += stats.aggregators_created;
                    progress.duration_ms = start.elapsed().as_millis() as u64;
                }
                rules.push(stats);
            }
            (rules, failures, wiring.into_aggregators())
        };

        let total_slots: usize = rules.iter().map(|r| r.slots).sum();
        info!(target: "colnet-connectivity",
            "  Synaptogenesis complete: {} synapses on {} aggregators", total_slots, aggregators.len());
        if !failures.is_empty() {
            warn!(target: "colnet-connectivity", "⚠️ {} targets could not be wired", failures.len());
        }

        let report = BuildReport {
            seed: sampler.seed(),
            scale: params.scale,
            wiring_policy: params.wiring_policy,
            self_connections: params.self_connections,
            rng_streams: params.rng_streams,
            population_sizes: populations.sizes(),
            total_cells: populations.total_cells(),
            total_targets: rules.iter().map(|r| r.targets).sum(),
            total_slots,
            total_aggregators: aggregators.len(),
            rules,
            failures,
            duration_ms: start.elapsed().as_millis() as u64,
        };

        Ok(BuiltNetwork {
            populations,
            aggregators,
            report,
        })
    }

    /// Wire the targets of one rule, applying the wiring policy
    fn wire_rule<'a, C>(
        &self,
        plan: &RulePlan<'a>,
        targets: impl Iterator<Item = ConnectivityResult<PlannedTarget<'a>>>,
        wiring: &SynapseWiring<'_, C>,
        failures: &mut Vec<WiringFailure>,
    ) -> ConnectivityResult<RuleStats>
    where
        C: ChannelFactory + ?Sized,
    {
        let params = self.spec.params();
        let rule_start = Instant::now();
        let aggregators_before = wiring.aggregator_count();
        let mut stats = RuleStats {
            pre: plan.pair.pre.clone(),
            post: plan.pair.post.clone(),
            npre: plan.rule.npre(),
            probability: plan.probability,
            sample_size: plan.sample_size,
            skip: plan.skip,
            targets: 0,
            slots: 0,
            aggregators_created: 0,
            failures: 0,
            duration_ms: 0.0,
        };

        if let Some(reason) = plan.skip {
            debug!(target: "colnet-connectivity", "  {}: skipped ({:?})", plan.pair, reason);
            return Ok(stats);
        }

        for target in targets {
            let target = target?;
            stats.targets += 1;
            match wiring.wire(&target, params.default_weight, params.default_delay_ms) {
                Ok(_) => stats.slots += 1,
                Err(ConnectivityError::Wiring { key, source })
                    if params.wiring_policy == WiringPolicy::BestEffort =>
                {
                    warn!(target: "colnet-connectivity", "  ⚠️ Skipping {}: {}", key, source);
                    stats.failures += 1;
                    failures.push(WiringFailure {
                        key: key.to_string(),
                        error: source.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        stats.aggregators_created = wiring.aggregator_count() - aggregators_before;
        stats.duration_ms = rule_start.elapsed().as_secs_f64() * 1000.0;
        debug!(target: "colnet-connectivity",
            "  {}: p={:.4} k={} -> {} slots, {} new aggregators in {:.2} ms",
            plan.pair, stats.probability, stats.sample_size, stats.slots, stats.aggregators_created, stats.duration_ms
        );
        Ok(stats)
    }

    fn set_stage(&self, stage: BuildStage) {
        let mut progress = self.progress.write();
        progress.stage = stage;
        progress.progress = 0;
    }

    fn check_deadline(&self, start: Instant) -> ConnectivityResult<()> {
        let Some(limit) = self.spec.params().max_build_duration else {
            return Ok(());
        };
        let elapsed = start.elapsed();
        if elapsed > limit {
            return Err(ConnectivityError::DeadlineExceeded {
                limit_ms: duration_ms(limit),
                elapsed_ms: duration_ms(elapsed),
            });
        }
        Ok(())
    }
}

fn duration_ms(duration: Duration) -> u64 {
    duration.as_millis().min(u128::from(u64::MAX)) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::memory::InMemoryEngine;
    use crate::spec::{BuildParams, CellType, ConnectionTable};
    use crate::types::CompartmentId;

    fn spec(params: BuildParams) -> NetworkSpec {
        let mut table = ConnectionTable::new();
        table.add("A", "B", 4, &[1, 2]).unwrap();
        table.add("B", "A", 0, &[]).unwrap();
        table.add("B", "B", 2, &[3]).unwrap();
        NetworkSpec::new(
            [CellType::new("A", 20, 2), CellType::new("B", 10, 3)],
            table,
            params,
        )
        .unwrap()
    }

    fn seeded(seed: u64) -> BuildParams {
        BuildParams {
            seed: Some(seed),
            ..BuildParams::default()
        }
    }

    #[test]
    fn test_build_report() {
        let spec = spec(seeded(1));
        let engine = InMemoryEngine::from_spec(&spec);
        let builder = NetworkBuilder::new(spec);
        let network = builder.build(&engine, &engine).unwrap();
        let report = &network.report;

        assert!(report.is_complete());
        assert_eq!(report.seed, 1);
        assert_eq!(report.total_cells, 30);
        assert_eq!(report.rules.len(), 3);

        let ab = report.rule("A", "B").unwrap();
        assert_eq!(ab.sample_size, 4);
        assert_eq!(ab.targets, 40);
        assert_eq!(ab.slots, 40);
        assert_eq!(report.rule("B", "A").unwrap().skip, Some(SkipReason::NoConnection));
        assert_eq!(report.total_slots, 40 + 20);
        assert_eq!(engine.slot_count(), 60);
        assert_eq!(network.aggregators.len(), report.total_aggregators);
        assert_eq!(engine.aggregator_count(), report.total_aggregators);

        let progress = builder.get_progress();
        assert_eq!(progress.stage, BuildStage::Completed);
        assert_eq!(progress.rules_processed, 3);
        assert_eq!(progress.slots_created, 60);
    }

    #[test]
    fn test_best_effort_continues() {
        let spec = spec(BuildParams {
            wiring_policy: WiringPolicy::BestEffort,
            ..seeded(2)
        });
        let engine = InMemoryEngine::from_spec(&spec);
        engine.reject_aggregators_on(CompartmentId(3));
        let network = NetworkBuilder::new(spec).build(&engine, &engine).unwrap();

        let report = &network.report;
        assert!(!report.is_complete());
        let bb = report.rule("B", "B").unwrap();
        assert_eq!(bb.slots, 0);
        assert_eq!(bb.failures, 20);
        assert_eq!(report.failures.len(), 20);
        assert_eq!(report.rule("A", "B").unwrap().slots, 40);
    }

    #[test]
    fn test_strict_aborts() {
        let spec = spec(seeded(2));
        let engine = InMemoryEngine::from_spec(&spec);
        engine.reject_aggregators_on(CompartmentId(3));
        let builder = NetworkBuilder::new(spec);

        let err = builder.build(&engine, &engine).unwrap_err();
        assert!(matches!(err, ConnectivityError::Wiring { .. }));
        assert_eq!(builder.get_progress().stage, BuildStage::Failed);
        // Earlier rules stay wired
        assert_eq!(engine.slot_count(), 40);
    }

    #[test]
    fn test_missing_prototype_fails_build() {
        let spec = spec(seeded(3));
        let engine = InMemoryEngine::new().with_prototype("A", 2);
        let builder = NetworkBuilder::new(spec);
        assert!(matches!(
            builder.build(&engine, &engine),
            Err(ConnectivityError::PrototypeMissing { .. })
        ));
        assert_eq!(builder.get_progress().stage, BuildStage::Failed);
    }

    #[test]
    fn test_deadline_exceeded() {
        let spec = spec(BuildParams {
            max_build_duration: Some(Duration::from_nanos(1)),
            ..seeded(4)
        });
        let engine = InMemoryEngine::from_spec(&spec);
        assert!(matches!(
            NetworkBuilder::new(spec).build(&engine, &engine),
            Err(ConnectivityError::DeadlineExceeded { .. })
        ));
        assert_eq!(engine.slot_count(), 0);
    }

    #[test]
    fn test_undrawable_rule_fails_before_wiring() {
        let mut table = ConnectionTable::new();
        table.add("A", "B", 2, &[1]).unwrap();
        table.add("C", "C", 1, &[1]).unwrap();
        let spec = NetworkSpec::new(
            [CellType::new("A", 4, 1), CellType::new("B", 4, 1), CellType::new("C", 1, 1)],
            table,
            BuildParams {
                self_connections: SelfConnectionPolicy::Exclude,
                ..seeded(1)
            },
        )
        .unwrap();
        let engine = InMemoryEngine::from_spec(&spec);
        let builder = NetworkBuilder::new(spec);

        assert!(matches!(
            builder.build(&engine, &engine),
            Err(ConnectivityError::EmptyDomain { .. })
        ));
        assert_eq!(engine.slot_count(), 0);
        assert_eq!(engine.create_aggregator_calls(), 0);
        assert_eq!(builder.get_progress().stage, BuildStage::Failed);
    }

    #[test]
    fn test_progress_handle_is_shared() {
        let builder = NetworkBuilder::new(spec(seeded(5)));
        let handle = builder.progress_handle();
        assert_eq!(handle.read().stage, BuildStage::Initialization);
        let engine = InMemoryEngine::from_spec(builder.spec());
        builder.build(&engine, &engine).unwrap();
        assert_eq!(handle.read().stage, BuildStage::Completed);
    }
}
