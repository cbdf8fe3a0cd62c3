//! The service facade handed to the request-handling layer.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use skygrid_engine::{AllocationEngine, AllocationRequest, EngineResult, GridStatus, Provisioner};
use skygrid_logs::LogTail;
use skygrid_poller::StatusPoller;
use skygrid_reclaim::{HealthReport, ReclamationScheduler};
use skygrid_state::{Clock, ConfigResult, GridConfig, Report, SystemClock};

/// Every externally visible Skygrid operation behind one value.
///
/// Cheap to share behind an `Arc`; all methods take `&self`.
pub struct GridService {
    engine: Arc<AllocationEngine>,
    scheduler: Arc<ReclamationScheduler>,
    tail: LogTail,
    config: GridConfig,
}

impl GridService {
    /// Wire a service from explicit collaborators.
    pub fn new(
        config: GridConfig,
        provisioner: Arc<dyn Provisioner>,
        poller: StatusPoller,
        clock: Arc<dyn Clock>,
        tail: LogTail,
    ) -> Self {
        let engine = Arc::new(AllocationEngine::new(
            provisioner,
            poller,
            clock,
            config.allocation.clone(),
        ));
        let scheduler = Arc::new(ReclamationScheduler::new(engine.clone(), &config));
        Self {
            engine,
            scheduler,
            tail,
            config,
        }
    }

    /// A service polling hubs over HTTP on wall-clock time.
    pub fn with_defaults(config: GridConfig, provisioner: Arc<dyn Provisioner>) -> Self {
        let poller = StatusPoller::http(&config.poller);
        let tail = LogTail::new(config.logging.tail_capacity);
        Self::new(config, provisioner, poller, Arc::new(SystemClock), tail)
    }

    /// Load `skygrid.toml` and build a service with [`Self::with_defaults`].
    pub fn from_config_file(path: &Path, provisioner: Arc<dyn Provisioner>) -> ConfigResult<Self> {
        let config = GridConfig::from_file(path)?;
        info!(path = %path.display(), "configuration loaded");
        Ok(Self::with_defaults(config, provisioner))
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    pub fn engine(&self) -> &Arc<AllocationEngine> {
        &self.engine
    }

    pub fn scheduler(&self) -> &Arc<ReclamationScheduler> {
        &self.scheduler
    }

    /// The buffer to install with `skygrid_logs::init_tracing`.
    pub fn tail(&self) -> &LogTail {
        &self.tail
    }

    /// Allocate a grid and return its hub id.
    pub async fn allocate(&self, node_count: i64, team: &str) -> EngineResult<String> {
        self.engine.allocate(node_count, team).await
    }

    /// Allocate from a `{"team": ..., "nodes": ...}` body.
    pub async fn allocate_json(&self, body: &[u8]) -> EngineResult<String> {
        let request = AllocationRequest::from_json(body, self.engine.limits())?;
        let grid = self.engine.allocate_grid(&request).await?;
        Ok(grid.hub.id)
    }

    /// Idempotent.
    pub async fn finish(&self, hub_id: &str) -> bool {
        self.engine.finish(hub_id).await
    }

    pub async fn status(&self, hub_id: &str) -> GridStatus {
        self.engine.status(hub_id).await
    }

    pub async fn report(&self) -> Report {
        self.engine.report().await
    }

    pub async fn healthcheck(&self) -> HealthReport {
        self.scheduler.healthcheck().await
    }

    /// Recent log lines, newest first.
    pub fn log_tail(&self) -> Vec<String> {
        self.tail.lines()
    }

    /// Start the abandonment, node check, and teardown loops.
    ///
    /// They stop when `shutdown` changes or its sender is dropped.
    pub fn spawn_sweeps(&self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        self.scheduler.spawn(shutdown)
    }
}
