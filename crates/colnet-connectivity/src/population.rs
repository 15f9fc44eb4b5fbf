// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Cell populations and their construction from a cell factory.
*/

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::engine::{CellFactory, CellHandles, CompartmentHandle, EngineError, SpikeSourceHandle};
use crate::spec::CellType;
use crate::types::{CompartmentId, ConnectivityError, ConnectivityResult};

/// Stable identity of a cell: its type and its index in the population
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellId {
    pub cell_type: Arc<str>,
    pub index: usize,
}

impl CellId {
    pub fn new(cell_type: impl Into<Arc<str>>, index: usize) -> Self {
        Self {
            cell_type: cell_type.into(),
            index,
        }
    }
}

/// Renders as `{type}_{index:03}`, e.g. `SupPyrRS_007`
impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{:03}", self.cell_type, self.index)
    }
}

/// One instantiated cell
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    pub id: CellId,
    pub spike_source: SpikeSourceHandle,
    pub compartments: BTreeMap<CompartmentId, CompartmentHandle>,
}

impl Cell {
    fn from_handles(id: CellId, handles: CellHandles) -> Self {
        Self {
            id,
            spike_source: handles.spike_source,
            compartments: handles.compartments,
        }
    }

    /// Name the cell was registered under
    pub fn name(&self) -> String {
        self.id.to_string()
    }

    pub fn compartment(&self, id: CompartmentId) -> Option<CompartmentHandle> {
        self.compartments.get(&id).copied()
    }
}

/// Cells of one type, in creation order
#[derive(Debug, Clone)]
pub struct Population {
    cell_type: CellType,
    cells: Vec<Cell>,
}

impl Population {
    pub fn cell_type(&self) -> &CellType {
        &self.cell_type
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn get(&self, index: usize) -> Option<&Cell> {
        self.cells.get(index)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// All populations of a build, keyed by cell type name
#[derive(Debug, Clone, Default)]
pub struct Populations(BTreeMap<String, Population>);

impl Populations {
    pub fn get(&self, cell_type: &str) -> Option<&Population> {
        self.0.get(cell_type)
    }

    /// # Errors
    /// `UnknownCellType` when no population exists for `cell_type`.
    pub fn require(&self, cell_type: &str) -> ConnectivityResult<&Population> {
        self.get(cell_type)
            .ok_or_else(|| ConnectivityError::UnknownCellType(cell_type.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Population)> {
        self.0.iter().map(|(name, pop)| (name.as_str(), pop))
    }

    /// Number of populations
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Cells across all populations
    pub fn total_cells(&self) -> usize {
        self.0.values().map(Population::len).sum()
    }

    /// Cell type name -> population size
    pub fn sizes(&self) -> BTreeMap<String, usize> {
        self.0.iter().map(|(name, pop)| (name.clone(), pop.len())).collect()
    }
}

/// Creates scaled populations through a [`CellFactory`]
pub struct PopulationBuilder<'f, F: CellFactory + ?Sized> {
    factory: &'f F,
}

impl<'f, F: CellFactory + ?Sized> PopulationBuilder<'f, F> {
    pub fn new(factory: &'f F) -> Self {
        Self { factory }
    }

    /// Instantiate `floor(scale * count)` cells of every type.
    ///
    /// Cells are named `{type}_{index:03}` and kept in creation order.
    /// Different types may be built concurrently (feature `parallel`); the
    /// cells of one type are always created in index order.
    ///
    /// # Errors
    /// `InvalidScale` for a scale outside `[0, 1]`; `PrototypeMissing` when
    /// the factory has no prototype for a type; any other factory failure as
    /// `Engine`.
    pub fn build<'t>(
        &self,
        cell_types: impl IntoIterator<Item = &'t CellType>,
        scale: f64,
    ) -> ConnectivityResult<Populations> {
        if !scale.is_finite() || !(0.0..=1.0).contains(&scale) {
            return Err(ConnectivityError::InvalidScale(scale));
        }
        let cell_types: Vec<&CellType> = cell_types.into_iter().collect();

        #[cfg(feature = "parallel")]
        let built: Vec<ConnectivityResult<Population>> = cell_types
            .par_iter()
            .map(|cell_type| self.build_one(cell_type, scale))
            .collect();

        #[cfg(not(feature = "parallel"))]
        let built: Vec<ConnectivityResult<Population>> = cell_types
            .iter()
            .map(|cell_type| self.build_one(cell_type, scale))
            .collect();

        let mut populations = BTreeMap::new();
        for population in built {
            let population = population?;
            populations.insert(population.cell_type.name.clone(), population);
        }
        Ok(Populations(populations))
    }

    fn build_one(&self, cell_type: &CellType, scale: f64) -> ConnectivityResult<Population> {
        let size = cell_type.scaled_count(scale);
        let type_name: Arc<str> = Arc::from(cell_type.name.as_str());
        let mut cells = Vec::with_capacity(size);

        for index in 0..size {
            let id = CellId::new(type_name.clone(), index);
            let handles = self
                .factory
                .create_cell(cell_type, index, &id.to_string())
                .map_err(|e| match e {
                    EngineError::PrototypeMissing(_) => ConnectivityError::PrototypeMissing {
                        cell_type: cell_type.name.clone(),
                        source: e,
                    },
                    other => ConnectivityError::Engine(other),
                })?;
            cells.push(Cell::from_handles(id, handles));
        }

        debug!(target: "colnet-connectivity", "  {}: {} of {} cells", cell_type.name, size, cell_type.count);
        Ok(Population {
            cell_type: cell_type.clone(),
            cells,
        })
    }
}
