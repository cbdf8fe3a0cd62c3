//! skygrid-logs: the in-process log tail.
//!
//! Every tracing event is mirrored into a bounded [`LogTail`] so operators
//! can read recent activity without access to the host's log storage.
//!
//! ```text
//! tracing::info!(...) ─┬─► fmt layer    (stdout)
//!                      └─► TailLayer ─► LogTail (ring buffer, newest first)
//! ```

pub mod layer;
pub mod tail;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};

pub use layer::TailLayer;
pub use tail::{DEFAULT_CAPACITY, LogEntry, LogTail};

/// Filter used when `RUST_LOG` is not set.
pub const DEFAULT_FILTER: &str = "info,skygrid=debug";

/// Install the global subscriber: env filter, stdout formatting, and the tail.
///
/// Fails if a global subscriber is already set.
pub fn init_tracing(tail: &LogTail) -> Result<(), TryInitError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(TailLayer::new(tail.clone()))
        .try_init()
}
