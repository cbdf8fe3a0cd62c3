//! skygrid-state: in-memory state for the Skygrid on-demand grid fleet.
//!
//! Holds the leaf records (hubs, nodes, grids), the billing-aware
//! [`ResourcePool`], the [`GridRegistry`] of active grids, the point-in-time
//! [`Report`], the injectable [`Clock`], and [`GridConfig`].
//!
//! # Billing model
//!
//! Compute is billed per started hour. Every resource therefore has a
//! *time-until-hour*: the minutes left before it rolls into a new billing
//! period, always in `1..=60`.
//!
//! ```text
//! age 0m   → 60 left     age 55m → 5 left
//! age 59m  → 1 left      age 60m → 60 left (new hour paid)
//! ```
//!
//! Pools hand out the resource with the fewest minutes left, so paid time
//! that is about to be forfeited gets used first.
//!
//! Nothing here is persisted. A process restart starts with empty pools
//! and an empty registry.

pub mod clock;
pub mod config;
pub mod error;
pub mod pool;
pub mod registry;
pub mod report;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    AbandonPolicy, AllocationLimits, GridConfig, LoggingConfig, PollerConfig, ReclaimWindow,
    ScheduleConfig, parse_duration,
};
pub use error::{ConfigError, ConfigResult};
pub use pool::ResourcePool;
pub use registry::GridRegistry;
pub use report::{ActiveGridEntry, PooledEntry, Report};
pub use types::*;
