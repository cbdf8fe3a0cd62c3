//! skygrid-engine: hands grids to teams and takes them back.
//!
//! The [`AllocationEngine`] validates requests, draws idle hubs and nodes
//! from the billing-aware pools, asks the [`Provisioner`] for whatever the
//! pools cannot cover, and registers the resulting grid. Finishing a grid
//! returns its hub and nodes to the pools for reuse.
//!
//! # Architecture
//!
//! ```text
//! AllocationEngine
//!   ├── Mutex<Inventory>
//!   │     ├── ResourcePool<Hub>   (by class, fewest minutes left first)
//!   │     ├── ResourcePool<Node>
//!   │     └── GridRegistry        (hub id → Grid)
//!   ├── Arc<dyn Provisioner>      (create / terminate instances)
//!   └── StatusPoller              (readiness, agent commands)
//! ```
//!
//! # Allocation
//!
//! ```text
//! validate(nodes, team)            → InvalidRequest, no side effects
//! hub   = hub_pool.take(class)     ?: provision_hub(class, nodes)
//! nodes = node_pool.take_many(n)   ++ provision_nodes(shortfall)
//! registry.insert(Grid(hub ← nodes, team, now))
//! set_hub → every node, start_grid → hub   (best effort)
//! ```
//!
//! A provisioning failure aborts the allocation. Every resource obtained up
//! to that point goes back to its pool.

pub mod engine;
pub mod error;
pub mod provisioner;
pub mod request;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use engine::{AllocationEngine, GridState, GridStatus};
pub use error::{EngineError, EngineResult};
pub use provisioner::{ProvisionFuture, Provisioner};
pub use request::AllocationRequest;
