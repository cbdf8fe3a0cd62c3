//! skygrid-poller: talks to the grid software running on each hub.
//!
//! Every hub exposes two HTTP endpoints:
//!
//! ```text
//! :4444/grid/admin/ActiveNodeServlet  → { nodes: [{host, status, idle_time, ...}] }
//! :3000/served_sessions               → { quarter, last_quarter, ... }
//! ```
//!
//! and its grid agent (hub and node alike) accepts control commands on
//! `:3000/<command>`.
//!
//! # Architecture
//!
//! ```text
//! StatusPoller
//!   ├── per-call timeout (tokio::time::timeout)
//!   ├── payload parsing → idle time, connected nodes, readiness, sessions
//!   └── Arc<dyn GridProbe>
//!       ├── HttpProbe (hyper http1 client)
//!       └── ScriptedProbe (feature = "testing")
//! ```
//!
//! # Failure policy
//!
//! Unreachable hubs, timeouts, non-2xx answers, and payloads that do not
//! parse all surface as [`PollError`]. Callers must treat a failed poll as
//! *unknown*, never as idle or busy.

pub mod error;
pub mod payload;
pub mod poller;
pub mod probe;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{PollError, PollResult};
pub use payload::{NodeActivity, NodeStatus, NodeStatusPayload, UsagePayload};
pub use poller::{GridCommand, StatusPoller, idle_secs};
pub use probe::{GridProbe, HttpProbe, ProbeFuture};
