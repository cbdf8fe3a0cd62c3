//! skygrid-reclaim: background sweeps that give resources back.
//!
//! Three scheduled tasks run against the allocation engine:
//!
//! ```text
//! abandoned_check   active grids  → poll idle_time → finish if
//!                                   idle >= 300s and assigned >= 300s
//! node_check        active grids  → poll connected nodes → re-send
//!                                   set_hub to nodes that fell off
//! teardown_check    pooled hubs   → time_until_hour in (1, 3] →
//!                   pooled nodes    log usage, stop_grid, terminate
//! ```
//!
//! A failed poll is never read as idle: the grid is skipped for that pass.
//! Each task stamps its start time, which [`ReclamationScheduler::healthcheck`]
//! compares against the staleness budget.
//!
//! Thresholds, the reclaim window, intervals, and the budget all come from
//! `GridConfig`.

pub mod health;
pub mod scheduler;

pub use health::{HealthReport, Liveness, SweepKind, SweepTimestamps};
pub use scheduler::{
    AbandonOutcome, NodeCheckOutcome, ReclamationScheduler, TeardownOutcome, is_grid_abandoned,
};
