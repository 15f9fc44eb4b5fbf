// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
# colnet Connectivity

Builds the topology of a biologically structured spiking network:

- **Population scaling**: `floor(scale * count)` cells per type, created
  through an engine-side cell factory
- **Sampling**: per rule, `p = npre / original_count(pre)` and
  `k = floor(len(pop[pre]) * p)` presynaptic cells drawn with replacement
  for every postsynaptic cell, each paired with a random target compartment
- **Wiring**: one synapse aggregator per (post compartment, pre cell),
  created on first use and grown by one slot per planned target

## Architecture

```text
NetworkSpec ─► PopulationBuilder ─► ConnectivityPlanner ─► SynapseWiring
                    │                                          │
                    └──── CellFactory          ChannelFactory ─┘
                               (simulation engine)
```

[`NetworkBuilder`] runs the whole pipeline and reports what was built.
[`engine::memory::InMemoryEngine`] is a reference engine that keeps
everything in memory.

## Usage

```rust
use colnet_connectivity::engine::memory::InMemoryEngine;
use colnet_connectivity::{BuildParams, CellType, ConnectionTable, NetworkBuilder, NetworkSpec};

let mut connections = ConnectionTable::new();
connections.add("TCR", "nRT", 10, &[1, 2])?;
let spec = NetworkSpec::new(
    [CellType::new("TCR", 100, 3), CellType::new("nRT", 100, 2)],
    connections,
    BuildParams { seed: Some(42), ..BuildParams::default() },
)?;

let engine = InMemoryEngine::from_spec(&spec);
let network = NetworkBuilder::new(spec).build(&engine, &engine)?;
assert_eq!(network.report.total_slots, 10 * 100);
# Ok::<(), colnet_connectivity::ConnectivityError>(())
```
*/

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod engine;
pub mod network_builder;
pub mod planner;
pub mod population;
pub mod rng;
pub mod spec;
pub mod types;
pub mod wiring;

pub use engine::{
    AggregatorHandle, CellFactory, CellHandles, ChannelFactory, CompartmentHandle, EngineError,
    SlotHandle, SpikeSourceHandle,
};
pub use network_builder::{
    BuildProgress, BuildReport, BuildStage, BuiltNetwork, NetworkBuilder, RuleStats, WiringFailure,
};
pub use planner::{ConnectivityPlanner, Plan, PlannedTarget, RulePlan, RuleTargets, SkipReason};
pub use population::{Cell, CellId, Population, PopulationBuilder, Populations};
pub use rng::RandomSampler;
pub use spec::{BuildParams, CellType, ConnectionRule, ConnectionTable, NetworkSpec};
pub use types::{CompartmentId, ConnectivityError, ConnectivityResult, RulePair};
pub use wiring::{AggregatorKey, SynapseAggregator, SynapseSlot, SynapseWiring};

// Policies live with the configuration so they can be set from TOML
pub use colnet_config::{RngStreamMode, SelfConnectionPolicy, WiringPolicy};
