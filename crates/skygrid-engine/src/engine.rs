//! Allocation engine: hands grids to teams and takes them back.
//!
//! Pools and the registry sit behind one coarse lock. The lock is never
//! held across provisioning or polling, so a slow cloud call or an
//! unresponsive hub cannot stall other requests. Every mutation is a single
//! locked step that moves resources between pools and the registry.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use skygrid_poller::{GridCommand, StatusPoller};
use skygrid_state::{
    AllocationLimits, Clock, Grid, GridRegistry, Hub, Node, Pooled, ReclaimWindow, Report,
    ResourcePool,
};

use crate::error::{EngineError, EngineResult};
use crate::provisioner::Provisioner;
use crate::request::AllocationRequest;

/// Lifecycle state of a grid as seen by its team.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum GridState {
    /// At least one node has registered with the hub.
    #[serde(rename = "SKYGRID_READY")]
    Ready,
    /// The hub answers but no node has registered yet.
    #[serde(rename = "SKYGRID_REGISTERING")]
    Registering,
    /// The hub could not be polled.
    #[serde(rename = "SKYGRID_UNKNOWN")]
    Unknown,
    /// No active grid has this hub id.
    #[serde(rename = "INSTANCE_NOT_FOUND")]
    NotFound,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GridStatus {
    pub state: GridState,
    /// Empty when the grid is not found.
    pub hub_address: String,
}

/// Everything that owns a resource while it is not in flight.
#[derive(Default)]
struct Inventory {
    hubs: ResourcePool<Hub>,
    nodes: ResourcePool<Node>,
    registry: GridRegistry,
}

impl Inventory {
    fn pool_hub(&mut self, mut hub: Hub) {
        let nodes = hub.detach_nodes();
        self.hubs.add(hub);
        for node in nodes {
            self.nodes.add(node);
        }
    }

    fn pool_nodes(&mut self, nodes: impl IntoIterator<Item = Node>) {
        for node in nodes {
            self.nodes.add(node);
        }
    }
}

/// Validates requests, draws from the pools, provisions the shortfall, and
/// keeps the registry of active grids.
pub struct AllocationEngine {
    inventory: Arc<Mutex<Inventory>>,
    provisioner: Arc<dyn Provisioner>,
    poller: StatusPoller,
    clock: Arc<dyn Clock>,
    limits: AllocationLimits,
}

impl AllocationEngine {
    pub fn new(
        provisioner: Arc<dyn Provisioner>,
        poller: StatusPoller,
        clock: Arc<dyn Clock>,
        limits: AllocationLimits,
    ) -> Self {
        Self {
            inventory: Arc::new(Mutex::new(Inventory::default())),
            provisioner,
            poller,
            clock,
            limits,
        }
    }

    pub fn limits(&self) -> &AllocationLimits {
        &self.limits
    }

    pub fn poller(&self) -> &StatusPoller {
        &self.poller
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn provisioner(&self) -> &Arc<dyn Provisioner> {
        &self.provisioner
    }

    /// Allocate a grid of `node_count` nodes for `team` and return its hub id.
    pub async fn allocate(&self, node_count: i64, team: &str) -> EngineResult<String> {
        let request = AllocationRequest::new(node_count, team, &self.limits)?;
        let grid = self.allocate_grid(&request).await?;
        Ok(grid.hub.id)
    }

    /// Allocate a grid for an already validated request.
    ///
    /// On provisioning failure nothing is registered and every resource
    /// obtained so far, drawn from a pool or freshly created, is pooled.
    ///
    /// The allocation runs as its own task. Once resources leave the pools
    /// it always ends by registering them or pooling them again, even if
    /// the caller stops waiting. A grid registered for a caller that went
    /// away sits idle until the abandonment sweep reclaims it.
    pub async fn allocate_grid(&self, request: &AllocationRequest) -> EngineResult<Grid> {
        let allocation = Allocation {
            inventory: Arc::clone(&self.inventory),
            provisioner: Arc::clone(&self.provisioner),
            poller: self.poller.clone(),
            clock: Arc::clone(&self.clock),
            class: self.limits.hub_class.clone(),
            request: request.clone(),
        };
        tokio::spawn(allocation.run()).await.map_err(|e| {
            error!(team = %request.team, error = %e, "allocation task aborted");
            EngineError::Provisioning(anyhow::anyhow!("allocation task aborted: {e}"))
        })?
    }

    /// Return a grid's hub and nodes to the pools.
    ///
    /// Unknown or already finished hub ids are a no-op. Returns whether a
    /// grid was finished.
    pub async fn finish(&self, hub_id: &str) -> bool {
        self.finish_matching(hub_id, None).await
    }

    /// Finish the grid only while it is still the assignment made at
    /// `assigned_at`. A grid re-allocated since then is left alone.
    pub async fn finish_assignment(&self, hub_id: &str, assigned_at: u64) -> bool {
        self.finish_matching(hub_id, Some(assigned_at)).await
    }

    async fn finish_matching(&self, hub_id: &str, assigned_at: Option<u64>) -> bool {
        let target = {
            let inventory = self.inventory.lock().await;
            inventory
                .registry
                .get(hub_id)
                .filter(|grid| assigned_at.is_none_or(|at| grid.assigned_at == at))
                .map(|grid| (grid.hub.address.clone(), grid.assigned_at))
        };
        let Some((hub_address, assigned_at)) = target else {
            debug!(%hub_id, "finish for unknown grid ignored");
            return false;
        };

        // The previous team's sessions must be gone before anyone can take
        // the hub. The grid stays registered until then.
        self.poller.notify(&hub_address, GridCommand::Reset).await;

        let (team, node_count) = {
            let mut inventory = self.inventory.lock().await;
            let current = inventory
                .registry
                .get(hub_id)
                .is_some_and(|grid| grid.assigned_at == assigned_at);
            let grid = if current {
                inventory.registry.remove(hub_id)
            } else {
                None
            };
            let Some(grid) = grid else {
                debug!(%hub_id, "grid finished concurrently");
                return false;
            };
            let team = grid.team.clone();
            let (hub, nodes) = grid.dissolve();
            let node_count = nodes.len();
            inventory.pool_nodes(nodes);
            inventory.pool_hub(hub);
            (team, node_count)
        };

        info!(%hub_id, %team, nodes = node_count, "grid finished");
        true
    }

    /// Consistent snapshot of active grids and pools.
    pub async fn report(&self) -> Report {
        let inventory = self.inventory.lock().await;
        Report::capture(
            &inventory.registry,
            &inventory.hubs,
            &inventory.nodes,
            self.clock.now(),
        )
    }

    /// Whether the grid behind `hub_id` is ready for sessions.
    pub async fn status(&self, hub_id: &str) -> GridStatus {
        let hub = {
            let inventory = self.inventory.lock().await;
            inventory.registry.get(hub_id).map(|grid| grid.hub.clone())
        };
        let Some(hub) = hub else {
            return GridStatus {
                state: GridState::NotFound,
                hub_address: String::new(),
            };
        };

        let state = match self.poller.is_ready(&hub).await {
            Ok(true) => GridState::Ready,
            Ok(false) => GridState::Registering,
            Err(e) => {
                warn!(%hub_id, error = %e, "grid status poll failed");
                GridState::Unknown
            }
        };
        GridStatus {
            state,
            hub_address: hub.address,
        }
    }

    /// Copies of every active grid.
    pub async fn active_grids(&self) -> Vec<Grid> {
        let inventory = self.inventory.lock().await;
        inventory.registry.grids().cloned().collect()
    }

    /// Remove every pooled hub and node whose time-until-hour lies in
    /// `window`. The caller owns the returned resources.
    pub async fn drain_reclaimable(
        &self,
        window: ReclaimWindow,
        now: u64,
    ) -> (Vec<Hub>, Vec<Node>) {
        let mut inventory = self.inventory.lock().await;
        let hubs = inventory
            .hubs
            .drain_where(|hub| window.contains(hub.time_until_hour(now)));
        let nodes = inventory
            .nodes
            .drain_where(|node| window.contains(node.time_until_hour(now)));
        (hubs, nodes)
    }

    /// Pool an idle hub. Any nodes still attached are pooled separately.
    pub async fn release_hub(&self, hub: Hub) {
        self.inventory.lock().await.pool_hub(hub);
    }

    /// Pool an idle node.
    pub async fn release_node(&self, node: Node) {
        self.inventory.lock().await.pool_nodes([node]);
    }

    /// Copies of the idle hubs.
    pub async fn pooled_hubs(&self) -> Vec<Hub> {
        self.inventory.lock().await.hubs.iter().cloned().collect()
    }

    /// Copies of the idle nodes.
    pub async fn pooled_nodes(&self) -> Vec<Node> {
        self.inventory.lock().await.nodes.iter().cloned().collect()
    }

    pub async fn pooled_hub_count(&self) -> usize {
        self.inventory.lock().await.hubs.len()
    }

    pub async fn pooled_node_count(&self) -> usize {
        self.inventory.lock().await.nodes.len()
    }

    pub async fn active_grid_count(&self) -> usize {
        self.inventory.lock().await.registry.len()
    }
}

/// One allocation in flight. Owns everything it needs so it can run
/// detached from the caller.
struct Allocation {
    inventory: Arc<Mutex<Inventory>>,
    provisioner: Arc<dyn Provisioner>,
    poller: StatusPoller,
    clock: Arc<dyn Clock>,
    class: String,
    request: AllocationRequest,
}

impl Allocation {
    async fn run(self) -> EngineResult<Grid> {
        let request = &self.request;
        let count = request.nodes as usize;
        let class = self.class.as_str();

        let (pooled_hub, mut nodes) = {
            let now = self.clock.now();
            let mut inventory = self.inventory.lock().await;
            let hub = inventory.hubs.take(Some(class), now);
            let nodes = inventory.nodes.take_many(count, None, now);
            (hub, nodes)
        };
        let reused_hub = pooled_hub.is_some();
        let reused_nodes = nodes.len();

        let mut hub = match pooled_hub {
            Some(hub) => hub,
            None => match self.provisioner.provision_hub(class, request.nodes).await {
                Ok(hub) => hub,
                Err(e) => {
                    warn!(team = %request.team, error = %e, "hub provisioning failed");
                    self.inventory.lock().await.pool_nodes(nodes);
                    return Err(EngineError::Provisioning(e));
                }
            },
        };

        let shortfall = count - nodes.len();
        if shortfall > 0 {
            match self.provisioner.provision_nodes(shortfall).await {
                Ok(fresh) if fresh.len() == shortfall => nodes.extend(fresh),
                Ok(fresh) => {
                    let got = fresh.len();
                    warn!(
                        team = %request.team,
                        wanted = shortfall,
                        got,
                        "node provisioning came up short"
                    );
                    let mut inventory = self.inventory.lock().await;
                    inventory.pool_nodes(nodes.into_iter().chain(fresh));
                    inventory.pool_hub(hub);
                    return Err(EngineError::Provisioning(anyhow::anyhow!(
                        "provisioner returned {got} of {shortfall} nodes"
                    )));
                }
                Err(e) => {
                    warn!(team = %request.team, error = %e, "node provisioning failed");
                    let mut inventory = self.inventory.lock().await;
                    inventory.pool_nodes(nodes);
                    inventory.pool_hub(hub);
                    return Err(EngineError::Provisioning(e));
                }
            }
        }

        hub.assign_nodes(nodes);
        let grid = Grid::new(hub, request.team.as_str(), self.clock.now());
        {
            let mut inventory = self.inventory.lock().await;
            if let Some(stale) = inventory.registry.insert(grid.clone()) {
                error!(
                    hub_id = %stale.hub_id(),
                    team = %stale.team,
                    "hub id registered twice, dropping stale grid"
                );
            }
        }

        info!(
            hub_id = %grid.hub_id(),
            team = %grid.team,
            nodes = count,
            reused_hub,
            reused_nodes,
            "grid allocated"
        );

        let hub_address = grid.hub.address.clone();
        let mut commands: Vec<(String, GridCommand)> = grid
            .nodes()
            .iter()
            .map(|node| {
                (
                    node.address.clone(),
                    GridCommand::SetHub {
                        hub_address: hub_address.clone(),
                    },
                )
            })
            .collect();
        commands.push((hub_address, GridCommand::StartGrid));
        broadcast(&self.poller, commands).await;

        Ok(grid)
    }
}

/// Send best-effort commands concurrently and wait for all of them.
async fn broadcast(poller: &StatusPoller, commands: Vec<(String, GridCommand)>) {
    let mut tasks = JoinSet::new();
    for (address, command) in commands {
        let poller = poller.clone();
        tasks.spawn(async move { poller.notify(&address, command).await });
    }
    let mut failed = 0usize;
    while let Some(result) = tasks.join_next().await {
        if !matches!(result, Ok(true)) {
            failed += 1;
        }
    }
    if failed > 0 {
        debug!(failed, "some grid commands were not delivered");
    }
}
