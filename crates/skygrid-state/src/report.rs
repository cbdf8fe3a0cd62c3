//! Point-in-time fleet report.
//!
//! List order carries no meaning. Compare reports through
//! [`Report::normalized`], which sorts every list and zeroes the fields that
//! depend on when the report was taken.

use serde::{Deserialize, Serialize};

use crate::pool::ResourcePool;
use crate::registry::GridRegistry;
use crate::types::{Hub, Node, Pooled};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct ActiveGridEntry {
    pub hub_id: String,
    pub hub_address: String,
    pub team: String,
    pub assigned_seconds: u64,
    /// Ids of the nodes assigned to the hub.
    pub nodes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct PooledEntry {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    pub address: String,
    /// Seconds since the instance was created.
    pub age_seconds: u64,
    pub minutes_left: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Report {
    pub active_grids: Vec<ActiveGridEntry>,
    pub active_grids_count: usize,
    pub pooled_hubs: Vec<PooledEntry>,
    pub pooled_hubs_count: usize,
    pub pooled_nodes: Vec<PooledEntry>,
    pub pooled_nodes_count: usize,
}

impl Report {
    /// Build a report. Callers hold whatever lock makes the three inputs a
    /// consistent view.
    pub fn capture(
        registry: &GridRegistry,
        hubs: &ResourcePool<Hub>,
        nodes: &ResourcePool<Node>,
        now: u64,
    ) -> Self {
        let active_grids: Vec<ActiveGridEntry> = registry
            .grids()
            .map(|grid| ActiveGridEntry {
                hub_id: grid.hub_id().to_string(),
                hub_address: grid.hub.address.clone(),
                team: grid.team.clone(),
                assigned_seconds: grid.assigned_secs(now),
                nodes: grid.nodes().iter().map(|n| n.id.clone()).collect(),
            })
            .collect();
        let pooled_hubs: Vec<PooledEntry> = hubs.iter().map(|h| pooled_entry(h, now)).collect();
        let pooled_nodes: Vec<PooledEntry> = nodes.iter().map(|n| pooled_entry(n, now)).collect();

        Self {
            active_grids_count: active_grids.len(),
            active_grids,
            pooled_hubs_count: pooled_hubs.len(),
            pooled_hubs,
            pooled_nodes_count: pooled_nodes.len(),
            pooled_nodes,
        }
    }

    /// Copy with elapsed-time fields zeroed and every list sorted.
    pub fn normalized(&self) -> Self {
        let mut report = self.clone();
        for grid in &mut report.active_grids {
            grid.assigned_seconds = 0;
            grid.nodes.sort();
        }
        for entry in report.pooled_hubs.iter_mut().chain(report.pooled_nodes.iter_mut()) {
            entry.age_seconds = 0;
            entry.minutes_left = 0;
        }
        report.active_grids.sort();
        report.pooled_hubs.sort();
        report.pooled_nodes.sort();
        report
    }
}

fn pooled_entry<T: Pooled>(resource: &T, now: u64) -> PooledEntry {
    PooledEntry {
        id: resource.id().to_string(),
        class: resource.class().map(str::to_string),
        address: resource.address().to_string(),
        age_seconds: resource.age_secs(now),
        minutes_left: resource.time_until_hour(now),
    }
}
