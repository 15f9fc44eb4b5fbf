// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Synapse wiring with aggregator reuse.

Each (post cell, compartment, pre cell) key owns exactly one synapse
aggregator for the whole session:

```text
Absent --create_aggregator--> Created --append_slot--> Created (+1 slot) ...
```

The first target for a key creates the aggregator; every target (first one
included) appends one slot bound to the presynaptic spike source. Duplicate
draws therefore accumulate slots on the same aggregator.

`wire` takes `&self`. The registry lock only guards the key-to-entry map;
creating an aggregator and appending slots happen under the lock of that
key's entry. A key is therefore created at most once even with concurrent
callers, while disjoint keys are wired in parallel.
*/

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::engine::{
    AggregatorHandle, ChannelFactory, CompartmentHandle, EngineError, SlotHandle, SpikeSourceHandle,
};
use crate::planner::PlannedTarget;
use crate::population::CellId;
use crate::types::{CompartmentId, ConnectivityError, ConnectivityResult};

/// Identity of a synapse aggregator
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AggregatorKey {
    pub post_cell: CellId,
    pub compartment: CompartmentId,
    pub pre_cell: CellId,
}

impl AggregatorKey {
    pub fn new(post_cell: CellId, compartment: CompartmentId, pre_cell: CellId) -> Self {
        Self {
            post_cell,
            compartment,
            pre_cell,
        }
    }

    pub fn of(target: &PlannedTarget<'_>) -> Self {
        Self::new(target.post.id.clone(), target.compartment, target.pre.id.clone())
    }
}

impl fmt::Display for AggregatorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} <- {}", self.post_cell, self.compartment, self.pre_cell)
    }
}

/// One synaptic contact. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynapseSlot {
    pub handle: SlotHandle,
    pub weight: f64,
    pub delay_ms: f64,
    pub spike_source: SpikeSourceHandle,
    pub pre_cell: CellId,
}

/// Collector of all contacts from one pre cell onto one compartment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynapseAggregator {
    pub key: AggregatorKey,
    pub handle: AggregatorHandle,
    pub slots: Vec<SynapseSlot>,
}

/// Registry entry; `None` until the engine has created the aggregator
type AggregatorEntry = Arc<Mutex<Option<SynapseAggregator>>>;

/// Turns planned targets into engine synapses
pub struct SynapseWiring<'e, C: ChannelFactory + ?Sized> {
    factory: &'e C,
    registry: Mutex<AHashMap<AggregatorKey, AggregatorEntry>>,
    created: AtomicUsize,
}

impl<'e, C: ChannelFactory + ?Sized> SynapseWiring<'e, C> {
    pub fn new(factory: &'e C) -> Self {
        Self {
            factory,
            registry: Mutex::new(AHashMap::new()),
            created: AtomicUsize::new(0),
        }
    }

    /// Wire one target: reuse or create its aggregator, then append one slot.
    ///
    /// # Errors
    /// `Wiring` when the post cell has no such compartment or the engine
    /// rejects the aggregator or the slot. Slots and aggregators already
    /// created stay in place.
    pub fn wire(&self, target: &PlannedTarget<'_>, weight: f64, delay_ms: f64) -> ConnectivityResult<SynapseSlot> {
        let key = AggregatorKey::of(target);
        let compartment = match target.post.compartment(target.compartment) {
            Some(handle) => handle,
            None => {
                return Err(ConnectivityError::Wiring {
                    key,
                    source: EngineError::InvalidHandle {
                        kind: CompartmentHandle::KIND,
                        id: u64::from(target.compartment.0),
                    },
                })
            }
        };

        // Engine calls run under the entry lock only; other keys proceed.
        let entry = self.entry(&key);
        let mut guard = entry.lock();
        let aggregator = match &mut *guard {
            Some(aggregator) => aggregator,
            empty => empty.insert(self.create(&key, compartment)?),
        };

        let spike_source = target.pre.spike_source;
        let handle = self
            .factory
            .append_slot(aggregator.handle, weight, delay_ms, spike_source)
            .map_err(|source| ConnectivityError::Wiring {
                key: key.clone(),
                source,
            })?;

        let slot = SynapseSlot {
            handle,
            weight,
            delay_ms,
            spike_source,
            pre_cell: key.pre_cell,
        };
        aggregator.slots.push(slot.clone());
        Ok(slot)
    }

    fn entry(&self, key: &AggregatorKey) -> AggregatorEntry {
        let mut registry = self.registry.lock();
        Arc::clone(registry.entry(key.clone()).or_default())
    }

    fn create(&self, key: &AggregatorKey, compartment: CompartmentHandle) -> ConnectivityResult<SynapseAggregator> {
        let handle = self
            .factory
            .create_aggregator(compartment, &key.pre_cell)
            .map_err(|source| ConnectivityError::Wiring {
                key: key.clone(),
                source,
            })?;
        self.created.fetch_add(1, Ordering::Relaxed);
        trace!(target: "colnet-connectivity", "created {} for {}", handle, key);

        Ok(SynapseAggregator {
            key: key.clone(),
            handle,
            slots: Vec::new(),
        })
    }

    /// Aggregators created so far
    pub fn aggregator_count(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }

    /// Slots across all aggregators
    pub fn slot_count(&self) -> usize {
        self.registry
            .lock()
            .values()
            .map(|entry| entry.lock().as_ref().map_or(0, |aggregator| aggregator.slots.len()))
            .sum()
    }

    /// Snapshot of one aggregator
    pub fn aggregator(&self, key: &AggregatorKey) -> Option<SynapseAggregator> {
        let entry = self.registry.lock().get(key).map(Arc::clone)?;
        let snapshot = entry.lock().clone();
        snapshot
    }

    /// Snapshot of the as-built graph, ordered by key
    pub fn aggregators(&self) -> Vec<SynapseAggregator> {
        let mut all: Vec<SynapseAggregator> = self
            .registry
            .lock()
            .values()
            .filter_map(|entry| entry.lock().clone())
            .collect();
        all.sort_by(|a, b| a.key.cmp(&b.key));
        all
    }

    /// Consume the wiring session, returning the as-built graph ordered by key
    pub fn into_aggregators(self) -> Vec<SynapseAggregator> {
        let mut all: Vec<SynapseAggregator> = self
            .registry
            .into_inner()
            .into_iter()
            .filter_map(|(_, entry)| match Arc::try_unwrap(entry) {
                Ok(entry) => entry.into_inner(),
                Err(shared) => {
                    let snapshot = shared.lock().clone();
                    snapshot
                }
            })
            .collect();
        all.sort_by(|a, b| a.key.cmp(&b.key));
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::memory::InMemoryEngine;
    use crate::population::{PopulationBuilder, Populations};
    use crate::spec::CellType;
    use crate::types::RulePair;

    fn setup(types: &[CellType]) -> (InMemoryEngine, Populations) {
        let engine = InMemoryEngine::with_prototypes(types);
        let pops = PopulationBuilder::new(&engine).build(types, 1.0).unwrap();
        (engine, pops)
    }

    fn target<'a>(
        pair: &'a RulePair,
        pops: &'a Populations,
        pre: usize,
        post: usize,
        compartment: u32,
    ) -> PlannedTarget<'a> {
        PlannedTarget {
            pair,
            pre: pops.require(&pair.pre).unwrap().get(pre).unwrap(),
            post: pops.require(&pair.post).unwrap().get(post).unwrap(),
            compartment: CompartmentId(compartment),
        }
    }

    #[test]
    fn test_single_target_single_slot() {
        let types = vec![CellType::new("A", 1, 1), CellType::new("B", 1, 1)];
        let (engine, pops) = setup(&types);
        let pair = RulePair::new("A", "B");
        let wiring = SynapseWiring::new(&engine);

        let slot = wiring.wire(&target(&pair, &pops, 0, 0, 1), 0.5, 2.0).unwrap();
        assert_eq!(slot.weight, 0.5);
        assert_eq!(slot.delay_ms, 2.0);
        assert_eq!(slot.pre_cell.to_string(), "A_000");

        let aggregators = wiring.into_aggregators();
        assert_eq!(aggregators.len(), 1);
        assert_eq!(aggregators[0].slots.len(), 1);
        assert_eq!(aggregators[0].key.post_cell.to_string(), "B_000");
    }

    #[test]
    fn test_duplicate_target_reuses_aggregator() {
        let types = vec![CellType::new("A", 2, 1), CellType::new("B", 1, 2)];
        let (engine, pops) = setup(&types);
        let pair = RulePair::new("A", "B");
        let wiring = SynapseWiring::new(&engine);

        let t = target(&pair, &pops, 1, 0, 2);
        let first = wiring.wire(&t, 1.0, 1.0).unwrap();
        let second = wiring.wire(&t, 1.0, 1.0).unwrap();
        assert_ne!(first.handle, second.handle);

        assert_eq!(wiring.aggregator_count(), 1);
        assert_eq!(wiring.slot_count(), 2);
        assert_eq!(engine.create_aggregator_calls(), 1);
        assert_eq!(engine.append_slot_calls(), 2);

        let aggregator = wiring.aggregator(&AggregatorKey::of(&t)).unwrap();
        assert_eq!(aggregator.slots, vec![first, second]);
    }

    #[test]
    fn test_distinct_keys_get_distinct_aggregators() {
        let types = vec![CellType::new("A", 2, 1), CellType::new("B", 1, 2)];
        let (engine, pops) = setup(&types);
        let pair = RulePair::new("A", "B");
        let wiring = SynapseWiring::new(&engine);

        // Same pre cell on two compartments, two pre cells on one compartment
        wiring.wire(&target(&pair, &pops, 0, 0, 1), 1.0, 1.0).unwrap();
        wiring.wire(&target(&pair, &pops, 0, 0, 2), 1.0, 1.0).unwrap();
        wiring.wire(&target(&pair, &pops, 1, 0, 1), 1.0, 1.0).unwrap();
        assert_eq!(wiring.aggregator_count(), 3);
        assert_eq!(engine.create_aggregator_calls(), 3);

        let keys: Vec<String> = wiring.aggregators().iter().map(|a| a.key.to_string()).collect();
        assert_eq!(
            keys,
            vec![
                "B_000/comp_1 <- A_000",
                "B_000/comp_1 <- A_001",
                "B_000/comp_2 <- A_000",
            ]
        );
    }

    #[test]
    fn test_missing_compartment_is_wiring_error() {
        let types = vec![CellType::new("A", 1, 1)];
        let (engine, pops) = setup(&types);
        let pair = RulePair::new("A", "A");
        let wiring = SynapseWiring::new(&engine);

        let err = wiring.wire(&target(&pair, &pops, 0, 0, 5), 1.0, 1.0).unwrap_err();
        assert!(matches!(
            err,
            ConnectivityError::Wiring {
                source: EngineError::InvalidHandle { kind: "compartment", id: 5 },
                ..
            }
        ));
        assert_eq!(engine.create_aggregator_calls(), 0);
    }

    #[test]
    fn test_rejected_aggregator_leaves_key_absent() {
        let types = vec![CellType::new("A", 1, 2)];
        let (engine, pops) = setup(&types);
        engine.reject_aggregators_on(CompartmentId(2));
        let pair = RulePair::new("A", "A");
        let wiring = SynapseWiring::new(&engine);

        assert!(wiring.wire(&target(&pair, &pops, 0, 0, 2), 1.0, 1.0).is_err());
        assert!(wiring.wire(&target(&pair, &pops, 0, 0, 1), 1.0, 1.0).is_ok());
        assert_eq!(wiring.aggregator_count(), 1);
        assert_eq!(wiring.slot_count(), 1);
    }

    /// Counts `create_aggregator` calls that overlap in time
    struct OverlapTracker {
        inner: InMemoryEngine,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl ChannelFactory for OverlapTracker {
        fn create_aggregator(
            &self,
            compartment: CompartmentHandle,
            pre_cell: &CellId,
        ) -> Result<AggregatorHandle, EngineError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            let deadline = std::time::Instant::now() + std::time::Duration::from_secs(2);
            while self.in_flight.load(Ordering::SeqCst) < 2 && std::time::Instant::now() < deadline {
                std::thread::yield_now();
            }
            self.max_in_flight
                .fetch_max(self.in_flight.load(Ordering::SeqCst), Ordering::SeqCst);
            let handle = self.inner.create_aggregator(compartment, pre_cell);
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            handle
        }

        fn append_slot(
            &self,
            aggregator: AggregatorHandle,
            weight: f64,
            delay_ms: f64,
            spike_source: SpikeSourceHandle,
        ) -> Result<SlotHandle, EngineError> {
            self.inner.append_slot(aggregator, weight, delay_ms, spike_source)
        }
    }

    #[test]
    fn test_disjoint_keys_create_concurrently() {
        let types = vec![CellType::new("A", 2, 1), CellType::new("B", 1, 1)];
        let (engine, pops) = setup(&types);
        let pair = RulePair::new("A", "B");
        let factory = OverlapTracker {
            inner: engine,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        };
        let wiring = SynapseWiring::new(&factory);
        let first = target(&pair, &pops, 0, 0, 1);
        let second = target(&pair, &pops, 1, 0, 1);

        std::thread::scope(|scope| {
            let a = scope.spawn(|| wiring.wire(&first, 1.0, 1.0).map(|_| ()));
            let b = scope.spawn(|| wiring.wire(&second, 1.0, 1.0).map(|_| ()));
            a.join().unwrap().unwrap();
            b.join().unwrap().unwrap();
        });

        assert_eq!(factory.max_in_flight.load(Ordering::SeqCst), 2);
        assert_eq!(wiring.aggregator_count(), 2);
        assert_eq!(wiring.slot_count(), 2);
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn test_concurrent_wiring_creates_each_key_once() {
        use rayon::prelude::*;

        let types = vec![CellType::new("A", 4, 1), CellType::new("B", 4, 1)];
        let (engine, pops) = setup(&types);
        let pair = RulePair::new("A", "B");
        let wiring = SynapseWiring::new(&engine);

        let targets: Vec<_> = (0..400)
            .map(|i| target(&pair, &pops, i % 4, (i / 4) % 4, 1))
            .collect();
        targets
            .par_iter()
            .try_for_each(|t| wiring.wire(t, 1.0, 1.0).map(|_| ()))
            .unwrap();

        assert_eq!(wiring.aggregator_count(), 16);
        assert_eq!(wiring.slot_count(), 400);
        assert_eq!(engine.create_aggregator_calls(), 16);
    }
}
