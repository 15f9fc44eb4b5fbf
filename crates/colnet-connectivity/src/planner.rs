// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Connectivity planning.

For every rule `(pre, post)` in table order the planner derives

- `p = npre / original_count(pre)` and
- `k = floor(len(pop[pre]) * p)`,

then, for each post cell in population order, draws `k` presynaptic indices
with replacement followed by `k` target compartments with replacement, and
pairs them positionally. A rule therefore yields `k * len(pop[post])`
targets. Duplicate `(pre cell, compartment)` draws are kept; they turn into
extra slots on the same aggregator when wired.

Targets are produced lazily. With a shared stream the draw order is exactly
the table order; with per-rule streams each rule is independent and rules may
be planned in parallel.
*/

use std::borrow::BorrowMut;
use std::vec;

use colnet_config::{RngStreamMode, SelfConnectionPolicy};
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::population::{Cell, Population, Populations};
use crate::rng::RandomSampler;
use crate::spec::{sample_size, ConnectionRule, ConnectionTable};
use crate::types::{CompartmentId, ConnectivityError, ConnectivityResult, RulePair};

/// One synapse to create: `pre` contacts `compartment` of `post`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedTarget<'a> {
    pub pair: &'a RulePair,
    pub pre: &'a Cell,
    pub post: &'a Cell,
    pub compartment: CompartmentId,
}

/// Why a rule produces no targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// `npre == 0`
    NoConnection,
    EmptyPre,
    EmptyPost,
    /// `floor(len(pop[pre]) * p) == 0`
    ZeroSampleSize,
}

/// A rule resolved against the built populations
#[derive(Debug, Clone, Copy)]
pub struct RulePlan<'a> {
    pub pair: &'a RulePair,
    pub rule: &'a ConnectionRule,
    pub pre: &'a Population,
    pub post: &'a Population,
    pub probability: f64,
    pub sample_size: usize,
    pub skip: Option<SkipReason>,
}

impl<'a> RulePlan<'a> {
    fn resolve(pair: &'a RulePair, rule: &'a ConnectionRule, populations: &'a Populations) -> ConnectivityResult<Self> {
        let pre = populations.require(&pair.pre)?;
        let post = populations.require(&pair.post)?;
        if rule.is_connection() && pre.cell_type().original_count == 0 {
            return Err(ConnectivityError::invalid_rule(
                pair,
                format!("'{}' has an original count of 0", pair.pre),
            ));
        }

        let (probability, k) = sample_size(rule.npre(), pre.cell_type().original_count, pre.len());
        let skip = if !rule.is_connection() {
            Some(SkipReason::NoConnection)
        } else if pre.is_empty() {
            Some(SkipReason::EmptyPre)
        } else if post.is_empty() {
            Some(SkipReason::EmptyPost)
        } else if k == 0 {
            Some(SkipReason::ZeroSampleSize)
        } else {
            None
        };

        Ok(Self {
            pair,
            rule,
            pre,
            post,
            probability,
            sample_size: k,
            skip,
        })
    }

    /// Number of targets this rule yields
    pub fn expected_targets(&self) -> usize {
        match self.skip {
            Some(_) => 0,
            None => self.sample_size * self.post.len(),
        }
    }

    /// Fails when `self_connections` leaves this rule nothing to draw from,
    /// i.e. a self-referential rule on a single-cell population.
    pub fn check_draws(&self, self_connections: SelfConnectionPolicy) -> ConnectivityResult<()> {
        let excludes_self = self_connections == SelfConnectionPolicy::Exclude && self.pair.is_recurrent();
        if excludes_self && self.skip.is_none() && self.pre.len() < 2 {
            return Err(ConnectivityError::EmptyDomain {
                domain: "index range without self",
                requested: self.sample_size,
            });
        }
        Ok(())
    }

    /// Lazy target sequence for this rule, drawing from `sampler`
    pub fn targets<S: BorrowMut<RandomSampler>>(
        &self,
        sampler: S,
        self_connections: SelfConnectionPolicy,
    ) -> RuleTargets<'a, S> {
        RuleTargets {
            cursor: TargetCursor::new(*self, self_connections),
            sampler,
        }
    }
}

/// Per-rule draw state, independent of where the random stream lives
struct TargetCursor<'a> {
    plan: RulePlan<'a>,
    exclude_self: bool,
    post_index: usize,
    batch: vec::IntoIter<(usize, CompartmentId)>,
    done: bool,
}

impl<'a> TargetCursor<'a> {
    fn new(plan: RulePlan<'a>, self_connections: SelfConnectionPolicy) -> Self {
        Self {
            exclude_self: self_connections == SelfConnectionPolicy::Exclude && plan.pair.is_recurrent(),
            done: plan.skip.is_some(),
            plan,
            post_index: 0,
            batch: Vec::new().into_iter(),
        }
    }

    fn next_target(&mut self, sampler: &mut RandomSampler) -> Option<ConnectivityResult<PlannedTarget<'a>>> {
        loop {
            if let Some((pre_index, compartment)) = self.batch.next() {
                let plan = self.plan;
                return Some(Ok(PlannedTarget {
                    pair: plan.pair,
                    pre: &plan.pre.cells()[pre_index],
                    post: &plan.post.cells()[self.post_index - 1],
                    compartment,
                }));
            }
            if self.done || self.post_index >= self.plan.post.len() {
                self.done = true;
                return None;
            }
            match self.draw_batch(sampler) {
                Ok(batch) => {
                    self.batch = batch.into_iter();
                    self.post_index += 1;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }

    /// Draws for the post cell at `post_index`: pre indices first, then compartments
    fn draw_batch(&self, sampler: &mut RandomSampler) -> ConnectivityResult<Vec<(usize, CompartmentId)>> {
        let k = self.plan.sample_size;
        let n = self.plan.pre.len();
        let pre_indices = if self.exclude_self {
            sampler.sample_excluding(n, k, self.post_index)?
        } else {
            sampler.sample_with_replacement(n, k)?
        };
        let compartments = sampler.sample_values_with_replacement(self.plan.rule.compartments(), k)?;
        Ok(pre_indices.into_iter().zip(compartments).collect())
    }
}

/// Targets of one rule. Finite and single-pass; stops after the first error.
pub struct RuleTargets<'a, S> {
    cursor: TargetCursor<'a>,
    sampler: S,
}

impl<'a, S: BorrowMut<RandomSampler>> Iterator for RuleTargets<'a, S> {
    type Item = ConnectivityResult<PlannedTarget<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.cursor.next_target(self.sampler.borrow_mut())
    }
}

/// Resolves a connection table against built populations
pub struct ConnectivityPlanner<'a> {
    plans: Vec<RulePlan<'a>>,
}

impl<'a> ConnectivityPlanner<'a> {
    /// Resolve every rule up front, so a bad table fails before any draw.
    ///
    /// # Errors
    /// `UnknownCellType` if a rule names a type without a population;
    /// `InvalidRule` for a connecting rule normalized by a zero count.
    pub fn new(connections: &'a ConnectionTable, populations: &'a Populations) -> ConnectivityResult<Self> {
        let plans = connections
            .iter()
            .map(|(pair, rule)| RulePlan::resolve(pair, rule, populations))
            .collect::<ConnectivityResult<Vec<_>>>()?;
        Ok(Self { plans })
    }

    /// Check every rule against `self_connections` before any draw
    pub fn check_draws(&self, self_connections: SelfConnectionPolicy) -> ConnectivityResult<()> {
        self.plans.iter().try_for_each(|plan| plan.check_draws(self_connections))
    }

    /// Resolved rules in table order
    pub fn rule_plans(&self) -> &[RulePlan<'a>] {
        &self.plans
    }

    /// Targets of all rules across the whole table
    pub fn expected_targets(&self) -> usize {
        self.plans.iter().map(RulePlan::expected_targets).sum()
    }

    /// Lazy target sequence over every rule in table order.
    ///
    /// `Shared` draws everything from `sampler`; `PerRule` leaves `sampler`
    /// untouched and gives each rule a stream derived from `sampler.seed()`.
    pub fn plan<'s>(
        &self,
        sampler: &'s mut RandomSampler,
        streams: RngStreamMode,
        self_connections: SelfConnectionPolicy,
    ) -> Plan<'a, 's> {
        Plan {
            rules: self.plans.clone().into_iter(),
            current: None,
            shared: sampler,
            streams,
            self_connections,
        }
    }

    /// Draw every rule on its own stream, one rule per task.
    ///
    /// Same result as collecting [`plan`](Self::plan) with
    /// [`RngStreamMode::PerRule`], grouped by rule.
    #[cfg(feature = "parallel")]
    pub fn plan_parallel(
        &self,
        base_seed: u64,
        self_connections: SelfConnectionPolicy,
    ) -> ConnectivityResult<Vec<Vec<PlannedTarget<'a>>>> {
        self.plans
            .par_iter()
            .map(|plan| {
                plan.targets(RandomSampler::for_rule(base_seed, plan.pair), self_connections)
                    .collect::<ConnectivityResult<Vec<_>>>()
            })
            .collect()
    }
}

/// Targets of a whole table, see [`ConnectivityPlanner::plan`]
pub struct Plan<'a, 's> {
    rules: vec::IntoIter<RulePlan<'a>>,
    current: Option<(TargetCursor<'a>, Option<RandomSampler>)>,
    shared: &'s mut RandomSampler,
    streams: RngStreamMode,
    self_connections: SelfConnectionPolicy,
}

impl<'a, 's> Iterator for Plan<'a, 's> {
    type Item = ConnectivityResult<PlannedTarget<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((cursor, own)) = self.current.as_mut() {
                let sampler = match own {
                    Some(own) => own,
                    None => &mut *self.shared,
                };
                match cursor.next_target(sampler) {
                    Some(Err(e)) => {
                        self.rules = Vec::new().into_iter();
                        self.current = None;
                        return Some(Err(e));
                    }
                    Some(target) => return Some(target),
                    None => self.current = None,
                }
            }

            let plan = self.rules.next()?;
            let own = match self.streams {
                RngStreamMode::Shared => None,
                RngStreamMode::PerRule => Some(RandomSampler::for_rule(self.shared.seed(), plan.pair)),
            };
            self.current = Some((TargetCursor::new(plan, self.self_connections), own));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::memory::InMemoryEngine;
    use crate::population::PopulationBuilder;
    use crate::spec::CellType;

    fn populations(types: &[CellType], scale: f64) -> Populations {
        let engine = InMemoryEngine::with_prototypes(types);
        PopulationBuilder::new(&engine).build(types, scale).unwrap()
    }

    fn names(targets: &[PlannedTarget<'_>]) -> Vec<(String, String, u32)> {
        targets
            .iter()
            .map(|t| (t.pre.name(), t.post.name(), t.compartment.0))
            .collect()
    }

    #[test]
    fn test_sample_size_from_scaled_population() {
        let types = vec![CellType::new("Pre", 1000, 1), CellType::new("Post", 20, 4)];
        let pops = populations(&types, 0.1);
        let mut table = ConnectionTable::new();
        table.add("Pre", "Post", 50, &[1, 2, 3]).unwrap();

        let planner = ConnectivityPlanner::new(&table, &pops).unwrap();
        let plan = &planner.rule_plans()[0];
        assert!((plan.probability - 0.05).abs() < 1e-12);
        assert_eq!(plan.sample_size, 5);
        assert_eq!(plan.skip, None);
        assert_eq!(plan.expected_targets(), 5 * 2);

        let mut sampler = RandomSampler::seeded(3);
        let targets: Vec<_> = plan
            .targets(&mut sampler, SelfConnectionPolicy::Allow)
            .collect::<ConnectivityResult<_>>()
            .unwrap();
        assert_eq!(targets.len(), 10);
        // Grouped by post cell in population order
        assert!(targets[..5].iter().all(|t| t.post.id.index == 0));
        assert!(targets[5..].iter().all(|t| t.post.id.index == 1));
        assert!(targets.iter().all(|t| (1..=3).contains(&t.compartment.0)));
        assert!(targets.iter().all(|t| t.pre.id.index < 100));
    }

    #[test]
    fn test_skip_reasons() {
        let types = vec![
            CellType::new("A", 10, 1),
            CellType::new("Tiny", 1, 1),
            CellType::new("B", 4, 1),
        ];
        // At half scale: A = 5, Tiny = 0, B = 2
        let pops = populations(&types, 0.5);
        let mut table = ConnectionTable::new();
        table.add("A", "A", 0, &[]).unwrap();
        table.add("Tiny", "A", 1, &[1]).unwrap();
        table.add("A", "Tiny", 1, &[1]).unwrap();
        table.add("A", "B", 2, &[1]).unwrap();
        table.add("B", "A", 0, &[]).unwrap();
        // floor(5 * 1 / 10) == 0
        let mut zero = ConnectionTable::new();
        zero.add("A", "B", 1, &[1]).unwrap();

        let planner = ConnectivityPlanner::new(&table, &pops).unwrap();
        let skips: Vec<_> = planner.rule_plans().iter().map(|p| p.skip).collect();
        assert_eq!(
            skips,
            vec![
                Some(SkipReason::NoConnection),
                Some(SkipReason::EmptyPre),
                Some(SkipReason::EmptyPost),
                None,
                Some(SkipReason::NoConnection),
            ]
        );
        assert_eq!(planner.rule_plans()[3].sample_size, 1);
        assert_eq!(planner.expected_targets(), 2);

        let planner = ConnectivityPlanner::new(&zero, &pops).unwrap();
        assert_eq!(planner.rule_plans()[0].skip, Some(SkipReason::ZeroSampleSize));
        assert_eq!(planner.expected_targets(), 0);
    }

    #[test]
    fn test_unknown_population() {
        let types = vec![CellType::new("A", 10, 1)];
        let pops = populations(&types, 1.0);
        let mut table = ConnectionTable::new();
        table.add("A", "B", 1, &[1]).unwrap();
        assert!(matches!(
            ConnectivityPlanner::new(&table, &pops),
            Err(ConnectivityError::UnknownCellType(_))
        ));
    }

    #[test]
    fn test_plan_is_reproducible() {
        let types = vec![CellType::new("A", 30, 3), CellType::new("B", 20, 2)];
        let pops = populations(&types, 1.0);
        let mut table = ConnectionTable::new();
        table.add("A", "B", 6, &[1, 2]).unwrap();
        table.add("B", "A", 4, &[1, 3]).unwrap();
        let planner = ConnectivityPlanner::new(&table, &pops).unwrap();

        for streams in [RngStreamMode::Shared, RngStreamMode::PerRule] {
            let mut s1 = RandomSampler::seeded(11);
            let mut s2 = RandomSampler::seeded(11);
            let a: Vec<_> = planner
                .plan(&mut s1, streams, SelfConnectionPolicy::Allow)
                .collect::<ConnectivityResult<_>>()
                .unwrap();
            let b: Vec<_> = planner
                .plan(&mut s2, streams, SelfConnectionPolicy::Allow)
                .collect::<ConnectivityResult<_>>()
                .unwrap();
            assert_eq!(a.len(), 6 * 20 + 4 * 30);
            assert_eq!(names(&a), names(&b));
        }
    }

    #[test]
    fn test_shared_stream_follows_table_order() {
        let types = vec![CellType::new("A", 10, 2), CellType::new("B", 10, 2)];
        let pops = populations(&types, 1.0);
        let mut table = ConnectionTable::new();
        table.add("A", "B", 3, &[1, 2]).unwrap();
        table.add("B", "A", 3, &[1, 2]).unwrap();
        let planner = ConnectivityPlanner::new(&table, &pops).unwrap();

        let mut shared = RandomSampler::seeded(5);
        let all: Vec<_> = planner
            .plan(&mut shared, RngStreamMode::Shared, SelfConnectionPolicy::Allow)
            .collect::<ConnectivityResult<_>>()
            .unwrap();

        // Rule by rule from one sampler reproduces the flattened sequence
        let mut sampler = RandomSampler::seeded(5);
        let mut by_rule = Vec::new();
        for plan in planner.rule_plans() {
            for target in plan.targets(&mut sampler, SelfConnectionPolicy::Allow) {
                by_rule.push(target.unwrap());
            }
        }
        assert_eq!(names(&all), names(&by_rule));
    }

    #[test]
    fn test_per_rule_streams_are_order_independent() {
        let types = vec![CellType::new("A", 10, 2), CellType::new("B", 10, 2)];
        let pops = populations(&types, 1.0);
        let mut forward = ConnectionTable::new();
        forward.add("A", "B", 3, &[1, 2]).unwrap();
        forward.add("B", "A", 2, &[1]).unwrap();
        let mut reverse = ConnectionTable::new();
        reverse.add("B", "A", 2, &[1]).unwrap();
        reverse.add("A", "B", 3, &[1, 2]).unwrap();

        let collect = |table: &ConnectionTable| {
            let planner = ConnectivityPlanner::new(table, &pops).unwrap();
            let mut sampler = RandomSampler::seeded(99);
            let mut targets = names(
                &planner
                    .plan(&mut sampler, RngStreamMode::PerRule, SelfConnectionPolicy::Allow)
                    .collect::<ConnectivityResult<Vec<_>>>()
                    .unwrap(),
            );
            targets.sort();
            targets
        };
        assert_eq!(collect(&forward), collect(&reverse));
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn test_parallel_plan_matches_per_rule_plan() {
        let types = vec![CellType::new("A", 40, 3), CellType::new("B", 25, 2)];
        let pops = populations(&types, 1.0);
        let mut table = ConnectionTable::new();
        table.add("A", "B", 8, &[1, 2]).unwrap();
        table.add("B", "A", 5, &[2, 3]).unwrap();
        table.add("A", "A", 0, &[]).unwrap();
        table.add("B", "B", 4, &[1]).unwrap();
        let planner = ConnectivityPlanner::new(&table, &pops).unwrap();

        let mut sampler = RandomSampler::seeded(1234);
        let sequential: Vec<_> = planner
            .plan(&mut sampler, RngStreamMode::PerRule, SelfConnectionPolicy::Allow)
            .collect::<ConnectivityResult<_>>()
            .unwrap();
        let parallel: Vec<_> = planner
            .plan_parallel(1234, SelfConnectionPolicy::Allow)
            .unwrap()
            .into_iter()
            .flatten()
            .collect();
        assert_eq!(names(&sequential), names(&parallel));
    }

    #[test]
    fn test_self_exclusion() {
        let types = vec![CellType::new("A", 4, 1)];
        let pops = populations(&types, 1.0);
        let mut table = ConnectionTable::new();
        table.add("A", "A", 4, &[1]).unwrap();
        let planner = ConnectivityPlanner::new(&table, &pops).unwrap();

        let mut sampler = RandomSampler::seeded(0);
        let targets: Vec<_> = planner
            .plan(&mut sampler, RngStreamMode::Shared, SelfConnectionPolicy::Exclude)
            .collect::<ConnectivityResult<_>>()
            .unwrap();
        assert_eq!(targets.len(), 16);
        assert!(targets.iter().all(|t| t.pre.id != t.post.id));
    }

    #[test]
    fn test_self_exclusion_single_cell_is_empty_domain() {
        let types = vec![CellType::new("A", 1, 1)];
        let pops = populations(&types, 1.0);
        let mut table = ConnectionTable::new();
        table.add("A", "A", 1, &[1]).unwrap();
        let planner = ConnectivityPlanner::new(&table, &pops).unwrap();

        let mut sampler = RandomSampler::seeded(0);
        let mut plan = planner.plan(&mut sampler, RngStreamMode::Shared, SelfConnectionPolicy::Exclude);
        assert!(matches!(plan.next(), Some(Err(ConnectivityError::EmptyDomain { .. }))));
        assert!(plan.next().is_none());
    }

    #[test]
    fn test_check_draws_rejects_single_cell_self_exclusion() {
        let types = vec![CellType::new("A", 5, 1), CellType::new("C", 1, 1)];
        let pops = populations(&types, 1.0);
        let mut table = ConnectionTable::new();
        table.add("A", "A", 2, &[1]).unwrap();
        table.add("C", "C", 1, &[1]).unwrap();
        let planner = ConnectivityPlanner::new(&table, &pops).unwrap();

        assert!(planner.check_draws(SelfConnectionPolicy::Allow).is_ok());
        assert!(matches!(
            planner.check_draws(SelfConnectionPolicy::Exclude),
            Err(ConnectivityError::EmptyDomain { requested: 1, .. })
        ));
    }

    #[test]
    fn test_check_draws_ignores_skipped_rules() {
        let types = vec![CellType::new("C", 1, 1)];
        let pops = populations(&types, 1.0);
        let mut table = ConnectionTable::new();
        table.add("C", "C", 0, &[]).unwrap();
        let planner = ConnectivityPlanner::new(&table, &pops).unwrap();
        assert!(planner.check_draws(SelfConnectionPolicy::Exclude).is_ok());
    }
}
