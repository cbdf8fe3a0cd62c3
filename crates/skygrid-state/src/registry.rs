//! Registry of active grids, keyed by hub id.

use std::collections::HashMap;

use tracing::debug;

use crate::types::Grid;

#[derive(Debug, Clone, Default)]
pub struct GridRegistry {
    grids: HashMap<String, Grid>,
}

impl GridRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a grid. Returns the grid previously held under the same hub
    /// id, which callers treat as a bookkeeping bug.
    pub fn insert(&mut self, grid: Grid) -> Option<Grid> {
        let hub_id = grid.hub_id().to_string();
        debug!(%hub_id, team = %grid.team, "grid registered");
        self.grids.insert(hub_id, grid)
    }

    pub fn remove(&mut self, hub_id: &str) -> Option<Grid> {
        let removed = self.grids.remove(hub_id);
        if removed.is_some() {
            debug!(%hub_id, "grid unregistered");
        }
        removed
    }

    pub fn get(&self, hub_id: &str) -> Option<&Grid> {
        self.grids.get(hub_id)
    }

    pub fn contains(&self, hub_id: &str) -> bool {
        self.grids.contains_key(hub_id)
    }

    pub fn len(&self) -> usize {
        self.grids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grids.is_empty()
    }

    /// Active grids in no particular order.
    pub fn grids(&self) -> impl Iterator<Item = &Grid> {
        self.grids.values()
    }
}
