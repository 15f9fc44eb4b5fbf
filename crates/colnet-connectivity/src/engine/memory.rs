// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
In-memory reference engine.

Implements both collaborator traits against plain maps. It validates every
handle it receives, counts factory calls, and can be told to reject
aggregators on a given compartment number, which makes it the engine used by
the tests and the `build_column` tool.
*/

use std::collections::{BTreeMap, BTreeSet};

use ahash::AHashMap;
use parking_lot::Mutex;

use super::{
    AggregatorHandle, CellFactory, CellHandles, ChannelFactory, CompartmentHandle, EngineError,
    SlotHandle, SpikeSourceHandle,
};
use crate::population::CellId;
use crate::spec::{CellType, NetworkSpec};
use crate::types::CompartmentId;

#[derive(Debug, Clone, Copy)]
struct SlotRecord {
    aggregator: AggregatorHandle,
    spike_source: SpikeSourceHandle,
}

#[derive(Debug, Default)]
struct EngineState {
    next_handle: u64,
    cells: AHashMap<String, SpikeSourceHandle>,
    spike_sources: BTreeSet<SpikeSourceHandle>,
    compartments: AHashMap<CompartmentHandle, CompartmentId>,
    aggregators: AHashMap<AggregatorHandle, Vec<SlotHandle>>,
    slots: AHashMap<SlotHandle, SlotRecord>,
    rejected_compartments: BTreeSet<CompartmentId>,
    create_aggregator_calls: usize,
    append_slot_calls: usize,
}

impl EngineState {
    fn next(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }
}

/// Engine that keeps the as-built graph in memory
#[derive(Debug, Default)]
pub struct InMemoryEngine {
    /// Cell type name -> number of compartments
    prototypes: BTreeMap<String, u32>,
    state: Mutex<EngineState>,
}

impl InMemoryEngine {
    /// Engine without any prototypes
    pub fn new() -> Self {
        Self::default()
    }

    /// Prototypes for every given cell type
    pub fn with_prototypes(cell_types: &[CellType]) -> Self {
        cell_types
            .iter()
            .fold(Self::new(), |engine, cell_type| {
                engine.with_prototype(cell_type.name.clone(), cell_type.compartments)
            })
    }

    /// Prototypes for every cell type of `spec`
    pub fn from_spec(spec: &NetworkSpec) -> Self {
        spec.cell_types()
            .values()
            .fold(Self::new(), |engine, cell_type| {
                engine.with_prototype(cell_type.name.clone(), cell_type.compartments)
            })
    }

    pub fn with_prototype(mut self, cell_type: impl Into<String>, compartments: u32) -> Self {
        self.prototypes.insert(cell_type.into(), compartments);
        self
    }

    /// Refuse to create aggregators on compartment `compartment` of any cell
    pub fn reject_aggregators_on(&self, compartment: CompartmentId) {
        self.state.lock().rejected_compartments.insert(compartment);
    }

    pub fn cells_created(&self) -> usize {
        self.state.lock().cells.len()
    }

    pub fn create_aggregator_calls(&self) -> usize {
        self.state.lock().create_aggregator_calls
    }

    pub fn append_slot_calls(&self) -> usize {
        self.state.lock().append_slot_calls
    }

    pub fn aggregator_count(&self) -> usize {
        self.state.lock().aggregators.len()
    }

    pub fn slot_count(&self) -> usize {
        self.state.lock().slots.len()
    }

    /// Slots of an aggregator in creation order
    pub fn slots_of(&self, aggregator: AggregatorHandle) -> Option<Vec<SlotHandle>> {
        self.state.lock().aggregators.get(&aggregator).cloned()
    }

    /// Spike source a slot is bound to
    pub fn slot_source(&self, slot: SlotHandle) -> Option<SpikeSourceHandle> {
        self.state.lock().slots.get(&slot).map(|record| record.spike_source)
    }

    /// Aggregator owning a slot
    pub fn slot_aggregator(&self, slot: SlotHandle) -> Option<AggregatorHandle> {
        self.state.lock().slots.get(&slot).map(|record| record.aggregator)
    }
}

impl CellFactory for InMemoryEngine {
    fn create_cell(
        &self,
        cell_type: &CellType,
        _index: usize,
        name: &str,
    ) -> Result<CellHandles, EngineError> {
        let compartments = *self
            .prototypes
            .get(&cell_type.name)
            .ok_or_else(|| EngineError::PrototypeMissing(cell_type.name.clone()))?;

        let mut state = self.state.lock();
        if state.cells.contains_key(name) {
            return Err(EngineError::Rejected(format!("cell '{}' already exists", name)));
        }

        let spike_source = SpikeSourceHandle(state.next());
        let mut handles = BTreeMap::new();
        for number in 1..=compartments {
            let handle = CompartmentHandle(state.next());
            state.compartments.insert(handle, CompartmentId(number));
            handles.insert(CompartmentId(number), handle);
        }
        state.spike_sources.insert(spike_source);
        state.cells.insert(name.to_string(), spike_source);

        Ok(CellHandles {
            spike_source,
            compartments: handles,
        })
    }
}

impl ChannelFactory for InMemoryEngine {
    fn create_aggregator(
        &self,
        compartment: CompartmentHandle,
        pre_cell: &CellId,
    ) -> Result<AggregatorHandle, EngineError> {
        let mut state = self.state.lock();
        state.create_aggregator_calls += 1;

        let number = *state.compartments.get(&compartment).ok_or(EngineError::InvalidHandle {
            kind: CompartmentHandle::KIND,
            id: compartment.0,
        })?;
        if state.rejected_compartments.contains(&number) {
            return Err(EngineError::Rejected(format!(
                "no synapses from {} allowed on {}",
                pre_cell, number
            )));
        }

        let handle = AggregatorHandle(state.next());
        state.aggregators.insert(handle, Vec::new());
        Ok(handle)
    }

    fn append_slot(
        &self,
        aggregator: AggregatorHandle,
        weight: f64,
        delay_ms: f64,
        spike_source: SpikeSourceHandle,
    ) -> Result<SlotHandle, EngineError> {
        let mut state = self.state.lock();
        state.append_slot_calls += 1;

        if !state.aggregators.contains_key(&aggregator) {
            return Err(EngineError::InvalidHandle {
                kind: AggregatorHandle::KIND,
                id: aggregator.0,
            });
        }
        if !state.spike_sources.contains(&spike_source) {
            return Err(EngineError::InvalidHandle {
                kind: SpikeSourceHandle::KIND,
                id: spike_source.0,
            });
        }
        if !weight.is_finite() || !delay_ms.is_finite() || delay_ms < 0.0 {
            return Err(EngineError::Rejected(format!(
                "invalid synapse parameters (weight {}, delay {} ms)",
                weight, delay_ms
            )));
        }

        let slot = SlotHandle(state.next());
        state.slots.insert(
            slot,
            SlotRecord {
                aggregator,
                spike_source,
            },
        );
        if let Some(slots) = state.aggregators.get_mut(&aggregator) {
            slots.push(slot);
        }
        Ok(slot)
    }
}
