//! Domain types for the Skygrid fleet.
//!
//! A [`Hub`] coordinates a grid and exclusively owns the [`Node`]s attached
//! to it. A [`Grid`] is a hub handed out to a team. Both hubs and nodes are
//! [`Pooled`], which is all the pools need to rank them by billing hour.

use serde::{Deserialize, Serialize};

/// Opaque cloud instance identifier (e.g. `i-0abc123`).
pub type ResourceId = String;

/// Minutes in one billing period.
pub const BILLING_PERIOD_MINUTES: u32 = 60;

/// Minutes left before a resource created at `created_at` crosses into its
/// next billing hour, as seen at `now` (both unix seconds).
///
/// Always in `1..=60`. A resource created in the future (clock skew) is
/// treated as brand new.
pub fn time_until_hour(created_at: u64, now: u64) -> u32 {
    let elapsed_minutes = now.saturating_sub(created_at) / 60;
    BILLING_PERIOD_MINUTES - (elapsed_minutes % u64::from(BILLING_PERIOD_MINUTES)) as u32
}

/// Capability shared by everything a [`crate::ResourcePool`] can hold.
pub trait Pooled {
    /// Instance identifier.
    fn id(&self) -> &str;

    /// Unix timestamp (seconds) at which the instance was created.
    fn created_at(&self) -> u64;

    /// Network address (ip or hostname, no port).
    fn address(&self) -> &str;

    /// Resource class (instance type). `None` for untyped resources.
    fn class(&self) -> Option<&str> {
        None
    }

    /// Minutes left in the current billing hour.
    fn time_until_hour(&self, now: u64) -> u32 {
        time_until_hour(self.created_at(), now)
    }

    /// Seconds since creation.
    fn age_secs(&self, now: u64) -> u64 {
        now.saturating_sub(self.created_at())
    }
}

// ── Node ──────────────────────────────────────────────────────────

/// A worker instance that executes browser sessions for one hub at a time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Node {
    pub id: ResourceId,
    pub address: String,
    /// Unix timestamp when the instance was created.
    pub created_at: u64,
}

impl Node {
    pub fn new(id: impl Into<ResourceId>, address: impl Into<String>, created_at: u64) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
            created_at,
        }
    }
}

impl Pooled for Node {
    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> u64 {
        self.created_at
    }

    fn address(&self) -> &str {
        &self.address
    }
}

// ── Hub ───────────────────────────────────────────────────────────

/// The coordinating instance of a grid.
///
/// Nodes are owned by value: moving a node onto a hub moves it out of
/// wherever it was before, so a node can never sit on two hubs at once.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Hub {
    pub id: ResourceId,
    /// Instance type, e.g. `m3.medium`.
    pub class: String,
    pub address: String,
    /// Unix timestamp when the instance was created.
    pub created_at: u64,
    nodes: Vec<Node>,
    /// Grid size originally requested; 0 while pooled.
    requested_nodes: u32,
}

impl Hub {
    pub fn new(
        id: impl Into<ResourceId>,
        class: impl Into<String>,
        address: impl Into<String>,
        created_at: u64,
        requested_nodes: u32,
    ) -> Self {
        Self {
            id: id.into(),
            class: class.into(),
            address: address.into(),
            created_at,
            nodes: Vec::new(),
            requested_nodes,
        }
    }

    /// Nodes currently attached, in assignment order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn requested_nodes(&self) -> u32 {
        self.requested_nodes
    }

    /// Replace the attached nodes. The requested size follows the new list.
    pub fn assign_nodes(&mut self, nodes: Vec<Node>) {
        self.requested_nodes = nodes.len() as u32;
        self.nodes = nodes;
    }

    /// Append nodes without changing the requested size.
    pub fn attach_nodes(&mut self, nodes: impl IntoIterator<Item = Node>) {
        self.nodes.extend(nodes);
    }

    /// Detach every node and reset the requested size to 0.
    pub fn detach_nodes(&mut self) -> Vec<Node> {
        self.requested_nodes = 0;
        std::mem::take(&mut self.nodes)
    }
}

impl Pooled for Hub {
    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> u64 {
        self.created_at
    }

    fn address(&self) -> &str {
        &self.address
    }

    fn class(&self) -> Option<&str> {
        Some(&self.class)
    }
}

// ── Grid ──────────────────────────────────────────────────────────

/// An active allocation: a hub with its nodes, owned by one team.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Grid {
    pub hub: Hub,
    pub team: String,
    /// Unix timestamp when the grid was handed to the team.
    pub assigned_at: u64,
}

impl Grid {
    pub fn new(hub: Hub, team: impl Into<String>, assigned_at: u64) -> Self {
        Self {
            hub,
            team: team.into(),
            assigned_at,
        }
    }

    pub fn hub_id(&self) -> &str {
        &self.hub.id
    }

    pub fn nodes(&self) -> &[Node] {
        self.hub.nodes()
    }

    /// Seconds since the grid was assigned.
    pub fn assigned_secs(&self, now: u64) -> u64 {
        now.saturating_sub(self.assigned_at)
    }

    /// Tear the grid apart into a bare hub and its former nodes.
    pub fn dissolve(mut self) -> (Hub, Vec<Node>) {
        let nodes = self.hub.detach_nodes();
        (self.hub, nodes)
    }
}
