//! skygrid: on-demand browser-test grids on hourly-billed compute.
//!
//! A grid is one hub plus the nodes attached to it, handed to a team for
//! the duration of a test run. Idle hubs and nodes are pooled and reused
//! for the rest of the billing hour they have already paid for, then
//! terminated just before the next hour starts.
//!
//! # Architecture
//!
//! ```text
//! GridService
//!   ├── AllocationEngine        (skygrid-engine)
//!   │     ├── pools + registry  (skygrid-state)
//!   │     ├── Provisioner       (cloud, injected)
//!   │     └── StatusPoller      (skygrid-poller, hub HTTP endpoints)
//!   ├── ReclamationScheduler    (skygrid-reclaim)
//!   │     ├── abandoned_check   every 30s
//!   │     ├── node_check        every 30s
//!   │     └── teardown_check    every 30s
//!   └── LogTail                 (skygrid-logs)
//! ```
//!
//! The HTTP front door and the cloud provider live outside this workspace.
//! They talk to [`GridService`] through plain values.

pub mod service;

pub use service::GridService;

pub use skygrid_engine::{
    AllocationEngine, AllocationRequest, EngineError, EngineResult, GridState, GridStatus,
    Provisioner,
};
pub use skygrid_logs::{LogTail, init_tracing};
pub use skygrid_poller::{GridProbe, HttpProbe, PollError, StatusPoller};
pub use skygrid_reclaim::{HealthReport, Liveness, ReclamationScheduler};
pub use skygrid_state::{Clock, GridConfig, ManualClock, Report, SystemClock};
