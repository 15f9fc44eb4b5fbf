// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Seedable sampling with replacement.

Every draw made while planning a network goes through [`RandomSampler`], so a
build is fully reproducible from its seed. Seeds are always explicit: an
entropy-seeded sampler still reports the seed it picked.
*/

use rand::rngs::{OsRng, StdRng};
use rand::{Rng, RngCore, SeedableRng};

use crate::types::{ConnectivityError, ConnectivityResult, RulePair};

/// Uniform sampler over index ranges and value sets
#[derive(Debug, Clone)]
pub struct RandomSampler {
    rng: StdRng,
    seed: u64,
}

impl RandomSampler {
    /// Deterministic sampler
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            seed,
        }
    }

    /// Sampler seeded from OS entropy
    pub fn from_entropy() -> Self {
        Self::seeded(OsRng.next_u64())
    }

    /// Use `seed` when given, entropy otherwise
    pub fn from_seed_option(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self::seeded(seed),
            None => Self::from_entropy(),
        }
    }

    /// Independent stream for one connection rule.
    ///
    /// The stream depends only on the base seed and the rule's cell types, so
    /// rules can be planned in any order (or in parallel) with identical
    /// results.
    pub fn for_rule(base_seed: u64, pair: &RulePair) -> Self {
        let mut key = Vec::with_capacity(pair.pre.len() + pair.post.len() + 1);
        key.extend_from_slice(pair.pre.as_bytes());
        key.push(0);
        key.extend_from_slice(pair.post.as_bytes());
        Self::seeded(xxhash_rust::xxh64::xxh64(&key, base_seed))
    }

    /// Seed this sampler was created from
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Draw `k` indices from `[0, n)` with replacement.
    ///
    /// # Errors
    /// `EmptyDomain` when `n == 0` and `k > 0`.
    pub fn sample_with_replacement(&mut self, n: usize, k: usize) -> ConnectivityResult<Vec<usize>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        if n == 0 {
            return Err(ConnectivityError::EmptyDomain {
                domain: "index range",
                requested: k,
            });
        }
        Ok((0..k).map(|_| self.rng.gen_range(0..n)).collect())
    }

    /// Draw `k` indices from `[0, n)` with replacement, never returning `excluded`.
    ///
    /// # Errors
    /// `EmptyDomain` when no index other than `excluded` exists and `k > 0`.
    pub fn sample_excluding(
        &mut self,
        n: usize,
        k: usize,
        excluded: usize,
    ) -> ConnectivityResult<Vec<usize>> {
        if excluded >= n {
            return self.sample_with_replacement(n, k);
        }
        let draws = self
            .sample_with_replacement(n - 1, k)
            .map_err(|_| ConnectivityError::EmptyDomain {
                domain: "index range without self",
                requested: k,
            })?;
        Ok(draws
            .into_iter()
            .map(|idx| if idx >= excluded { idx + 1 } else { idx })
            .collect())
    }

    /// Draw `k` values from `values` with replacement.
    ///
    /// # Errors
    /// `EmptyDomain` when `values` is empty and `k > 0`.
    pub fn sample_values_with_replacement<T: Clone>(
        &mut self,
        values: &[T],
        k: usize,
    ) -> ConnectivityResult<Vec<T>> {
        if k > 0 && values.is_empty() {
            return Err(ConnectivityError::EmptyDomain {
                domain: "value set",
                requested: k,
            });
        }
        Ok(self
            .sample_with_replacement(values.len(), k)?
            .into_iter()
            .map(|idx| values[idx].clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indices_in_range() {
        let mut sampler = RandomSampler::seeded(1);
        let draws = sampler.sample_with_replacement(10, 1000).unwrap();
        assert_eq!(draws.len(), 1000);
        assert!(draws.iter().all(|&idx| idx < 10));
        // With 1000 draws over 10 values, every value shows up
        for value in 0..10 {
            assert!(draws.contains(&value));
        }
    }

    #[test]
    fn test_same_seed_same_draws() {
        let mut a = RandomSampler::seeded(42);
        let mut b = RandomSampler::seeded(42);
        assert_eq!(
            a.sample_with_replacement(100, 50).unwrap(),
            b.sample_with_replacement(100, 50).unwrap()
        );
        assert_eq!(
            a.sample_values_with_replacement(&["x", "y", "z"], 20).unwrap(),
            b.sample_values_with_replacement(&["x", "y", "z"], 20).unwrap()
        );
    }

    #[test]
    fn test_empty_domain() {
        let mut sampler = RandomSampler::seeded(0);
        assert!(matches!(
            sampler.sample_with_replacement(0, 3),
            Err(ConnectivityError::EmptyDomain { requested: 3, .. })
        ));
        let empty: [u32; 0] = [];
        assert!(matches!(
            sampler.sample_values_with_replacement(&empty, 1),
            Err(ConnectivityError::EmptyDomain { domain: "value set", .. })
        ));
    }

    #[test]
    fn test_zero_draws_from_empty_domain() {
        let mut sampler = RandomSampler::seeded(0);
        assert!(sampler.sample_with_replacement(0, 0).unwrap().is_empty());
        let empty: [u32; 0] = [];
        assert!(sampler.sample_values_with_replacement(&empty, 0).unwrap().is_empty());
    }

    #[test]
    fn test_sample_excluding_never_returns_excluded() {
        let mut sampler = RandomSampler::seeded(9);
        let draws = sampler.sample_excluding(4, 500, 2).unwrap();
        assert!(draws.iter().all(|&idx| idx < 4 && idx != 2));
        assert!(draws.contains(&3));
        assert!(draws.contains(&0));
    }

    #[test]
    fn test_sample_excluding_single_element() {
        let mut sampler = RandomSampler::seeded(9);
        assert!(matches!(
            sampler.sample_excluding(1, 1, 0),
            Err(ConnectivityError::EmptyDomain { .. })
        ));
    }

    #[test]
    fn test_rule_streams_are_stable_and_distinct() {
        let ab = RulePair::new("A", "B");
        let ba = RulePair::new("B", "A");
        assert_eq!(
            RandomSampler::for_rule(5, &ab).seed(),
            RandomSampler::for_rule(5, &ab).seed()
        );
        assert_ne!(
            RandomSampler::for_rule(5, &ab).seed(),
            RandomSampler::for_rule(5, &ba).seed()
        );
        assert_ne!(
            RandomSampler::for_rule(5, &ab).seed(),
            RandomSampler::for_rule(6, &ab).seed()
        );
    }

    #[test]
    fn test_entropy_sampler_reports_seed() {
        let mut a = RandomSampler::from_entropy();
        let mut b = RandomSampler::seeded(a.seed());
        assert_eq!(
            a.sample_with_replacement(1000, 10).unwrap(),
            b.sample_with_replacement(1000, 10).unwrap()
        );
    }
}
