// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Simulation-engine collaborator interface.

The connectivity generator never touches engine objects directly. Cells,
compartments, spike sources, aggregators and slots are opaque handles issued
by the engine and passed back to it explicitly; there is no global registry
or path lookup.

- [`CellFactory`] instantiates one cell of a type from its prototype.
- [`ChannelFactory`] creates synapse aggregators on compartments and appends
  slots bound to a presynaptic spike source.

[`memory::InMemoryEngine`] is a reference implementation that keeps the
as-built graph in memory.
*/

pub mod memory;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::population::CellId;
use crate::spec::CellType;
use crate::types::CompartmentId;

macro_rules! engine_handle {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub u64);

        impl $name {
            pub const KIND: &'static str = $kind;
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}#{}", $kind, self.0)
            }
        }
    };
}

engine_handle!(
    /// Spike generator of a cell (its single designated spike source)
    SpikeSourceHandle,
    "spike-source"
);
engine_handle!(
    /// Addressable compartment of an instantiated cell
    CompartmentHandle,
    "compartment"
);
engine_handle!(
    /// Synapse aggregator living on a postsynaptic compartment
    AggregatorHandle,
    "aggregator"
);
engine_handle!(
    /// One synaptic slot inside an aggregator
    SlotHandle,
    "slot"
);

/// Handles of a freshly instantiated cell
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellHandles {
    pub spike_source: SpikeSourceHandle,
    pub compartments: BTreeMap<CompartmentId, CompartmentHandle>,
}

/// Errors reported by the engine collaborator
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("no prototype registered for cell type '{0}'")]
    PrototypeMissing(String),

    #[error("unknown {kind} handle {id}")]
    InvalidHandle { kind: &'static str, id: u64 },

    #[error("engine rejected request: {0}")]
    Rejected(String),
}

/// Instantiates cells from per-type prototypes
pub trait CellFactory: Send + Sync {
    /// Create cell number `index` of `cell_type`, registered under `name`.
    fn create_cell(
        &self,
        cell_type: &CellType,
        index: usize,
        name: &str,
    ) -> Result<CellHandles, EngineError>;
}

/// Creates synapse aggregators and binds slots to spike sources
pub trait ChannelFactory: Send + Sync {
    /// Create an aggregator on `compartment` dedicated to spikes of `pre_cell`
    /// and connect it for spike reception.
    fn create_aggregator(
        &self,
        compartment: CompartmentHandle,
        pre_cell: &CellId,
    ) -> Result<AggregatorHandle, EngineError>;

    /// Allocate one more slot on `aggregator` and connect `spike_source` to it.
    fn append_slot(
        &self,
        aggregator: AggregatorHandle,
        weight: f64,
        delay_ms: f64,
        spike_source: SpikeSourceHandle,
    ) -> Result<SlotHandle, EngineError>;
}
