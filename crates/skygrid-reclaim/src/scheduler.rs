//! Reclamation scheduler: the three background sweeps.
//!
//! Each sweep is a plain async method that can be called directly (tests,
//! manual triggers) or driven by [`ReclamationScheduler::run`]. A sweep that
//! is still in flight when its next turn comes up is skipped, not queued.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard, RwLock, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use skygrid_engine::AllocationEngine;
use skygrid_poller::GridCommand;
use skygrid_state::{AbandonPolicy, GridConfig, Pooled, ReclaimWindow, ScheduleConfig};

use crate::health::{HealthReport, SweepKind, SweepTimestamps};

/// Whether a grid counts as abandoned under the default thresholds
/// (300s idle, 300s since assignment).
pub fn is_grid_abandoned(idle_secs: u64, assigned_secs: u64) -> bool {
    AbandonPolicy::default().is_abandoned(idle_secs, assigned_secs)
}

/// Result of one abandonment sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AbandonOutcome {
    /// Active grids polled.
    pub checked: usize,
    /// Hub ids of the grids that were finished.
    pub reclaimed: Vec<String>,
    /// Grids skipped because their hub could not be polled.
    pub poll_failures: usize,
}

/// Result of one node check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeCheckOutcome {
    pub checked: usize,
    /// Nodes that were missing from their hub and got `set_hub` again.
    pub reattached: usize,
    pub poll_failures: usize,
}

/// Result of one teardown sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownOutcome {
    /// Hubs removed from the pool. Includes failed terminations.
    pub hubs: Vec<String>,
    /// Nodes removed from the pool. Includes failed terminations.
    pub nodes: Vec<String>,
    /// Ids whose termination call failed.
    pub termination_failures: Vec<String>,
}

enum Kind {
    Hub,
    Node,
}

/// Runs abandonment detection, node re-attachment, and billing-window
/// teardown against an [`AllocationEngine`], and tracks when each last ran.
pub struct ReclamationScheduler {
    engine: Arc<AllocationEngine>,
    policy: AbandonPolicy,
    window: ReclaimWindow,
    schedule: ScheduleConfig,
    timestamps: RwLock<SweepTimestamps>,
    abandonment_guard: Mutex<()>,
    node_check_guard: Mutex<()>,
    teardown_guard: Mutex<()>,
}

impl ReclamationScheduler {
    pub fn new(engine: Arc<AllocationEngine>, config: &GridConfig) -> Self {
        Self {
            engine,
            policy: config.abandonment.clone(),
            window: config.reclaim_window,
            schedule: config.schedule.clone(),
            timestamps: RwLock::new(SweepTimestamps::default()),
            abandonment_guard: Mutex::new(()),
            node_check_guard: Mutex::new(()),
            teardown_guard: Mutex::new(()),
        }
    }

    /// Last start time of each sweep.
    pub async fn timestamps(&self) -> SweepTimestamps {
        *self.timestamps.read().await
    }

    /// PASS/FAIL per sweep against the staleness budget.
    pub async fn healthcheck(&self) -> HealthReport {
        let timestamps = self.timestamps().await;
        HealthReport::judge(
            &timestamps,
            self.engine.clock().now(),
            self.schedule.staleness_budget(),
        )
    }

    pub fn interval(&self, kind: SweepKind) -> Duration {
        match kind {
            SweepKind::Abandonment => self.schedule.abandon_interval(),
            SweepKind::NodeCheck => self.schedule.node_check_interval(),
            SweepKind::Teardown => self.schedule.teardown_interval(),
        }
    }

    /// Run one sweep of `kind`. Returns `false` if it was skipped because
    /// the previous run is still in flight.
    pub async fn run_sweep(&self, kind: SweepKind) -> bool {
        match kind {
            SweepKind::Abandonment => self.run_abandonment_sweep().await.is_some(),
            SweepKind::NodeCheck => self.run_node_check().await.is_some(),
            SweepKind::Teardown => self.run_teardown_sweep().await.is_some(),
        }
    }

    /// Finish every active grid that is both idle and past its grace period.
    ///
    /// A hub that cannot be polled is skipped for this pass.
    pub async fn run_abandonment_sweep(&self) -> Option<AbandonOutcome> {
        let _guard = self.begin(SweepKind::Abandonment).await?;

        let grids = self.engine.active_grids().await;
        let mut outcome = AbandonOutcome {
            checked: grids.len(),
            ..AbandonOutcome::default()
        };

        let mut polls = JoinSet::new();
        for grid in grids {
            let poller = self.engine.poller().clone();
            polls.spawn(async move {
                let idle = poller.idle_time(&grid.hub).await;
                (grid, idle)
            });
        }

        while let Some(joined) = polls.join_next().await {
            let Ok((grid, idle)) = joined else {
                outcome.poll_failures += 1;
                continue;
            };
            let hub_id = grid.hub_id();
            let idle_secs = match idle {
                Ok(idle) => idle,
                Err(e) => {
                    warn!(%hub_id, error = %e, "idle poll failed, grid left alone");
                    outcome.poll_failures += 1;
                    continue;
                }
            };

            let assigned_secs = grid.assigned_secs(self.engine.clock().now());
            if !self.policy.is_abandoned(idle_secs, assigned_secs) {
                debug!(%hub_id, idle_secs, assigned_secs, "grid in use");
                continue;
            }
            if self.engine.finish_assignment(hub_id, grid.assigned_at).await {
                info!(
                    %hub_id,
                    team = %grid.team,
                    idle_secs,
                    assigned_secs,
                    "abandoned grid reclaimed"
                );
                outcome.reclaimed.push(hub_id.to_string());
            }
        }

        debug!(
            checked = outcome.checked,
            reclaimed = outcome.reclaimed.len(),
            poll_failures = outcome.poll_failures,
            "abandonment sweep done"
        );
        Some(outcome)
    }

    /// Re-send `set_hub` to assigned nodes that have not registered with
    /// their hub.
    pub async fn run_node_check(&self) -> Option<NodeCheckOutcome> {
        let _guard = self.begin(SweepKind::NodeCheck).await?;

        let grids = self.engine.active_grids().await;
        let mut outcome = NodeCheckOutcome {
            checked: grids.len(),
            ..NodeCheckOutcome::default()
        };

        let mut checks = JoinSet::new();
        for grid in grids {
            let poller = self.engine.poller().clone();
            checks.spawn(async move {
                let connected = match poller.connected_node_addresses(&grid.hub).await {
                    Ok(connected) => connected,
                    Err(e) => {
                        warn!(hub_id = %grid.hub_id(), error = %e, "node poll failed, grid skipped");
                        return None;
                    }
                };
                let mut reattached = 0;
                for node in grid.nodes() {
                    if connected.contains(&node.address) {
                        continue;
                    }
                    info!(hub_id = %grid.hub_id(), node_id = %node.id, "node missing from hub, re-sending set_hub");
                    let command = GridCommand::SetHub {
                        hub_address: grid.hub.address.clone(),
                    };
                    poller.notify(&node.address, command).await;
                    reattached += 1;
                }
                Some(reattached)
            });
        }

        while let Some(joined) = checks.join_next().await {
            match joined {
                Ok(Some(reattached)) => outcome.reattached += reattached,
                _ => outcome.poll_failures += 1,
            }
        }

        debug!(
            checked = outcome.checked,
            reattached = outcome.reattached,
            poll_failures = outcome.poll_failures,
            "node check done"
        );
        Some(outcome)
    }

    /// Terminate pooled hubs and nodes whose time-until-hour is inside the
    /// reclaim window.
    ///
    /// Resources leave the pool before termination is attempted. A failed
    /// termination is logged and counted; the resource is not pooled again.
    pub async fn run_teardown_sweep(&self) -> Option<TeardownOutcome> {
        let _guard = self.begin(SweepKind::Teardown).await?;

        let now = self.engine.clock().now();
        let (hubs, nodes) = self.engine.drain_reclaimable(self.window, now).await;
        let mut outcome = TeardownOutcome::default();
        if hubs.is_empty() && nodes.is_empty() {
            debug!("teardown sweep found nothing in the reclaim window");
            return Some(outcome);
        }

        // Drained resources are tracked nowhere else, so terminations run
        // detached and finish even if this sweep is dropped.
        let mut tasks: Vec<JoinHandle<(Kind, String, u32, Result<(), String>)>> = Vec::new();
        for hub in hubs {
            let poller = self.engine.poller().clone();
            let provisioner = self.engine.provisioner().clone();
            let minutes_left = hub.time_until_hour(now);
            tasks.push(tokio::spawn(async move {
                match poller.served_sessions(&hub).await {
                    Ok(served) => info!(hub_id = %hub.id, served_sessions = served, "hub usage"),
                    Err(e) => warn!(hub_id = %hub.id, error = %e, "usage poll failed, tearing down anyway"),
                }
                poller.notify(&hub.address, GridCommand::StopGrid).await;
                let result = provisioner.terminate(&hub.id).await.map_err(|e| e.to_string());
                (Kind::Hub, hub.id, minutes_left, result)
            }));
        }
        for node in nodes {
            let provisioner = self.engine.provisioner().clone();
            let minutes_left = node.time_until_hour(now);
            tasks.push(tokio::spawn(async move {
                let result = provisioner.terminate(&node.id).await.map_err(|e| e.to_string());
                (Kind::Node, node.id, minutes_left, result)
            }));
        }

        for task in tasks {
            let Ok((kind, id, minutes_left, result)) = task.await else {
                continue;
            };
            let resource = match kind {
                Kind::Hub => "hub",
                Kind::Node => "node",
            };
            match result {
                Ok(()) => info!(%id, resource, minutes_left, "torn down"),
                Err(e) => {
                    warn!(%id, resource, minutes_left, error = %e, "termination failed, dropped from pool anyway");
                    outcome.termination_failures.push(id.clone());
                }
            }
            match kind {
                Kind::Hub => outcome.hubs.push(id),
                Kind::Node => outcome.nodes.push(id),
            }
        }

        Some(outcome)
    }

    /// Run the loop for one sweep until `shutdown` changes.
    pub async fn run(&self, kind: SweepKind, mut shutdown: watch::Receiver<bool>) {
        let interval = self.interval(kind);
        info!(
            sweep = kind.name(),
            interval_ms = interval.as_millis() as u64,
            "sweep loop started"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    if !self.run_sweep(kind).await {
                        debug!(sweep = kind.name(), "sweep skipped");
                    }
                }
                _ = shutdown.changed() => {
                    info!(sweep = kind.name(), "sweep loop shutting down");
                    break;
                }
            }
        }
    }

    /// Spawn one loop per sweep.
    pub fn spawn(self: &Arc<Self>, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        SweepKind::ALL
            .into_iter()
            .map(|kind| {
                let scheduler = Arc::clone(self);
                let shutdown = shutdown.clone();
                tokio::spawn(async move { scheduler.run(kind, shutdown).await })
            })
            .collect()
    }

    /// Take the re-entrancy guard and stamp the start time.
    async fn begin(&self, kind: SweepKind) -> Option<MutexGuard<'_, ()>> {
        let guard = match kind {
            SweepKind::Abandonment => &self.abandonment_guard,
            SweepKind::NodeCheck => &self.node_check_guard,
            SweepKind::Teardown => &self.teardown_guard,
        };
        let Ok(guard) = guard.try_lock() else {
            debug!(sweep = kind.name(), "previous run still in flight");
            return None;
        };
        self.timestamps
            .write()
            .await
            .stamp(kind, self.engine.clock().now());
        Some(guard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::Liveness;
    use skygrid_engine::testing::FakeProvisioner;
    use skygrid_engine::AllocationRequest;
    use skygrid_poller::StatusPoller;
    use skygrid_poller::testing::ScriptedProbe;
    use skygrid_state::{Grid, Hub, ManualClock, Node};

    const NOW: u64 = 1_700_000_000;
    const USAGE: &str = r#"{"exit_code": 0, "out": [], "error": [], "today": 8393, "yesterday": 7937,
        "last_week": 52860, "week_so_far": 43790, "quarter": 8393, "last_quarter": 521932}"#;

    struct Harness {
        scheduler: Arc<ReclamationScheduler>,
        engine: Arc<AllocationEngine>,
        probe: Arc<ScriptedProbe>,
        provisioner: Arc<FakeProvisioner>,
        clock: Arc<ManualClock>,
    }

    fn harness() -> Harness {
        let config = GridConfig::default();
        let clock = Arc::new(ManualClock::new(NOW));
        let probe = Arc::new(ScriptedProbe::new());
        let provisioner = Arc::new(FakeProvisioner::new(clock.clone()));
        let engine = Arc::new(AllocationEngine::new(
            provisioner.clone(),
            StatusPoller::new(probe.clone(), &config.poller),
            clock.clone(),
            config.allocation.clone(),
        ));
        let scheduler = Arc::new(ReclamationScheduler::new(engine.clone(), &config));
        Harness {
            scheduler,
            engine,
            probe,
            provisioner,
            clock,
        }
    }

    impl Harness {
        async fn allocate(&self, nodes: u32) -> Grid {
            self.engine
                .allocate_grid(&AllocationRequest {
                    team: "test".into(),
                    nodes,
                })
                .await
                .unwrap()
        }

        fn script_nodes(&self, hub: &Hub, nodes: &[(&str, &str, u64)]) {
            let entries: Vec<String> = nodes
                .iter()
                .map(|(host, status, idle)| {
                    format!(r#"{{"host": "{host}", "status": "{status}", "idle_time": "{idle}"}}"#)
                })
                .collect();
            self.probe.respond(
                status_key(hub),
                format!(r#"{{"nodes": [{}]}}"#, entries.join(",")),
            );
        }

        fn advance(&self, secs: u64) {
            self.clock.advance(Duration::from_secs(secs));
        }
    }

    fn status_key(hub: &Hub) -> String {
        format!("{}:4444/grid/admin/ActiveNodeServlet", hub.address)
    }

    fn mins_ago(m: u64) -> u64 {
        NOW - m * 60
    }

    #[test]
    fn abandonment_needs_idle_and_grace() {
        assert!(!is_grid_abandoned(0, 0));
        assert!(!is_grid_abandoned(0, 1000));
        assert!(!is_grid_abandoned(400, 0));
        assert!(!is_grid_abandoned(699, 299));
        assert!(is_grid_abandoned(300, 360));
        assert!(is_grid_abandoned(1000, 1000));
    }

    #[tokio::test]
    async fn idle_grid_past_grace_is_reclaimed() {
        let h = harness();
        let grid = h.allocate(1).await;
        h.advance(400);
        h.script_nodes(&grid.hub, &[("10.0.0.2", "idle", 350)]);

        let outcome = h.scheduler.run_abandonment_sweep().await.unwrap();
        assert_eq!(outcome.checked, 1);
        assert_eq!(outcome.reclaimed, vec![grid.hub_id().to_string()]);
        assert_eq!(h.engine.active_grid_count().await, 0);
        assert_eq!(h.engine.pooled_hub_count().await, 1);
        assert_eq!(h.engine.pooled_node_count().await, 1);
    }

    #[tokio::test]
    async fn fresh_grid_is_kept_even_when_idle() {
        let h = harness();
        let grid = h.allocate(1).await;
        h.advance(100);
        h.script_nodes(&grid.hub, &[("10.0.0.2", "idle", 1000)]);

        let outcome = h.scheduler.run_abandonment_sweep().await.unwrap();
        assert!(outcome.reclaimed.is_empty());
        assert_eq!(h.engine.active_grid_count().await, 1);
    }

    #[tokio::test]
    async fn busy_grid_is_kept() {
        let h = harness();
        let grid = h.allocate(2).await;
        h.advance(1000);
        h.script_nodes(&grid.hub, &[("10.0.0.2", "idle", 900), ("10.0.0.3", "busy", 0)]);

        let outcome = h.scheduler.run_abandonment_sweep().await.unwrap();
        assert!(outcome.reclaimed.is_empty());
        assert_eq!(h.engine.active_grid_count().await, 1);
    }

    #[tokio::test]
    async fn unreachable_hub_is_never_reclaimed() {
        let h = harness();
        let grid = h.allocate(1).await;
        h.advance(10_000);
        h.probe.fail(status_key(&grid.hub));

        let outcome = h.scheduler.run_abandonment_sweep().await.unwrap();
        assert_eq!(outcome.poll_failures, 1);
        assert!(outcome.reclaimed.is_empty());
        assert_eq!(h.engine.active_grid_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_hub_does_not_stall_the_sweep() {
        let h = harness();
        let stuck = h.allocate(1).await;
        let idle = h.allocate(1).await;
        h.advance(600);
        h.probe.hang(status_key(&stuck.hub));
        h.script_nodes(&idle.hub, &[("10.0.0.9", "idle", 600)]);

        let outcome = h.scheduler.run_abandonment_sweep().await.unwrap();
        assert_eq!(outcome.checked, 2);
        assert_eq!(outcome.poll_failures, 1);
        assert_eq!(outcome.reclaimed, vec![idle.hub_id().to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_run_is_skipped_and_not_stamped() {
        let h = harness();
        let grid = h.allocate(1).await;
        h.probe.hang(status_key(&grid.hub));

        let first = tokio::spawn({
            let scheduler = h.scheduler.clone();
            async move { scheduler.run_abandonment_sweep().await }
        });
        tokio::time::sleep(Duration::from_secs(1)).await;

        h.advance(30);
        assert!(h.scheduler.run_abandonment_sweep().await.is_none());
        assert_eq!(h.scheduler.timestamps().await.abandoned_check, Some(NOW));

        let outcome = first.await.unwrap().unwrap();
        assert_eq!(outcome.poll_failures, 1);
    }

    #[tokio::test]
    async fn node_check_reattaches_missing_nodes() {
        let h = harness();
        let grid = h.allocate(2).await;
        let present = &grid.nodes()[0];
        let missing = &grid.nodes()[1];
        h.script_nodes(&grid.hub, &[(present.address.as_str(), "idle", 10)]);
        h.probe.clear_requests();

        let outcome = h.scheduler.run_node_check().await.unwrap();
        assert_eq!(outcome.reattached, 1);
        assert_eq!(
            h.probe.requests(),
            vec![
                status_key(&grid.hub),
                format!("{}:3000/set_hub?hub={}", missing.address, grid.hub.address),
            ]
        );
    }

    #[tokio::test]
    async fn node_check_skips_unreachable_hub() {
        let h = harness();
        let grid = h.allocate(1).await;
        h.probe.fail(status_key(&grid.hub));

        let outcome = h.scheduler.run_node_check().await.unwrap();
        assert_eq!(outcome.poll_failures, 1);
        assert_eq!(outcome.reattached, 0);
        assert!(h.scheduler.timestamps().await.node_check.is_some());
    }

    async fn seed_billing_ladder(h: &Harness) {
        // Minutes left: 5, 4, 3, 2, 1.
        for (i, age) in (55..=59).enumerate() {
            let address = format!("10.1.0.{i}");
            let created = mins_ago(age);
            let hub = Hub::new(format!("i-hub{age}"), "m3.medium", address.as_str(), created, 0);
            h.engine.release_hub(hub).await;
            let node = Node::new(format!("i-node{age}"), format!("10.2.0.{i}"), created);
            h.engine.release_node(node).await;
            h.probe.respond(format!("{address}:3000/served_sessions"), USAGE);
        }
    }

    #[tokio::test]
    async fn teardown_reclaims_only_inside_the_window() {
        let h = harness();
        seed_billing_ladder(&h).await;

        let mut outcome = h.scheduler.run_teardown_sweep().await.unwrap();
        outcome.hubs.sort();
        outcome.nodes.sort();
        assert_eq!(outcome.hubs, vec!["i-hub57", "i-hub58"]);
        assert_eq!(outcome.nodes, vec!["i-node57", "i-node58"]);
        assert!(outcome.termination_failures.is_empty());

        assert_eq!(h.engine.pooled_hub_count().await, 3);
        assert_eq!(h.engine.pooled_node_count().await, 3);

        let mut terminated = h.provisioner.terminated();
        terminated.sort();
        assert_eq!(terminated, vec!["i-hub57", "i-hub58", "i-node57", "i-node58"]);

        let requests = h.probe.requests();
        assert!(requests.contains(&"10.1.0.2:3000/served_sessions".to_string()));
        assert!(requests.contains(&"10.1.0.2:3000/stop_grid".to_string()));
        assert!(requests.contains(&"10.1.0.3:3000/stop_grid".to_string()));
        assert!(!requests.contains(&"10.1.0.0:3000/stop_grid".to_string()));
    }

    #[tokio::test]
    async fn failed_termination_still_leaves_the_pool() {
        let h = harness();
        seed_billing_ladder(&h).await;
        h.provisioner.fail_terminate(true);

        let outcome = h.scheduler.run_teardown_sweep().await.unwrap();
        assert_eq!(outcome.termination_failures.len(), 4);
        assert_eq!(h.engine.pooled_hub_count().await, 3);
        assert_eq!(h.engine.pooled_node_count().await, 3);
    }

    #[tokio::test]
    async fn teardown_ignores_active_grids() {
        let h = harness();
        let grid = h.allocate(1).await;
        // Put the grid's hub two minutes before its billing boundary.
        h.advance(58 * 60);

        let outcome = h.scheduler.run_teardown_sweep().await.unwrap();
        assert_eq!(outcome, TeardownOutcome::default());
        assert!(h.engine.active_grids().await.iter().any(|g| g.hub_id() == grid.hub_id()));
        assert!(h.provisioner.terminated().is_empty());
    }

    #[tokio::test]
    async fn healthcheck_tracks_each_sweep() {
        let h = harness();
        let report = h.scheduler.healthcheck().await;
        assert_eq!(report.abandoned_check, Liveness::Fail);
        assert_eq!(report.node_check, Liveness::Fail);
        assert_eq!(report.teardown_check, Liveness::Fail);

        for kind in SweepKind::ALL {
            assert!(h.scheduler.run_sweep(kind).await);
        }
        assert!(h.scheduler.healthcheck().await.all_pass());

        h.advance(90);
        assert!(h.scheduler.healthcheck().await.all_pass());

        h.advance(1);
        h.scheduler.run_teardown_sweep().await.unwrap();
        let report = h.scheduler.healthcheck().await;
        assert_eq!(report.abandoned_check, Liveness::Fail);
        assert_eq!(report.node_check, Liveness::Fail);
        assert_eq!(report.teardown_check, Liveness::Pass);
    }

    #[tokio::test(start_paused = true)]
    async fn loops_run_until_shutdown() {
        let h = harness();
        let (tx, rx) = watch::channel(false);
        let handles = h.scheduler.spawn(rx);

        tokio::time::sleep(Duration::from_secs(31)).await;
        let stamps = h.scheduler.timestamps().await;
        assert_eq!(stamps.abandoned_check, Some(NOW));
        assert_eq!(stamps.node_check, Some(NOW));
        assert_eq!(stamps.teardown_check, Some(NOW));

        tx.send(true).unwrap();
        for handle in handles {
            handle.await.unwrap();
        }
    }
}
