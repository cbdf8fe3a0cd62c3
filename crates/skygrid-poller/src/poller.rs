//! Derives grid activity from a hub's endpoints.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use skygrid_state::{Hub, PollerConfig};

use crate::error::{PollError, PollResult};
use crate::payload::{NodeActivity, NodeStatus, NodeStatusPayload, UsagePayload};
use crate::probe::{GridProbe, HttpProbe};

/// Control commands understood by the grid agent on hubs and nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GridCommand {
    /// Start the grid process on a hub.
    StartGrid,
    /// Stop the grid process on a hub.
    StopGrid,
    /// Drop any session state left over from the previous team.
    Reset,
    /// Point a node at the hub it should register with.
    SetHub { hub_address: String },
}

impl GridCommand {
    pub fn name(&self) -> &'static str {
        match self {
            GridCommand::StartGrid => "start_grid",
            GridCommand::StopGrid => "stop_grid",
            GridCommand::Reset => "reset",
            GridCommand::SetHub { .. } => "set_hub",
        }
    }

    /// Request path including any query string.
    pub fn path(&self) -> String {
        match self {
            GridCommand::SetHub { hub_address } => format!("/set_hub?hub={hub_address}"),
            other => format!("/{}", other.name()),
        }
    }
}

/// Queries hubs for node activity and usage, one bounded call at a time.
///
/// Cheap to clone; clones share the underlying probe.
#[derive(Clone)]
pub struct StatusPoller {
    probe: Arc<dyn GridProbe>,
    config: PollerConfig,
    timeout: Duration,
}

impl StatusPoller {
    pub fn new(probe: Arc<dyn GridProbe>, config: &PollerConfig) -> Self {
        Self {
            probe,
            timeout: config.timeout(),
            config: config.clone(),
        }
    }

    /// A poller that talks plain HTTP to the hubs.
    pub fn http(config: &PollerConfig) -> Self {
        Self::new(Arc::new(HttpProbe), config)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Raw node list from the hub's status endpoint.
    pub async fn node_statuses(&self, hub: &Hub) -> PollResult<Vec<NodeStatus>> {
        let authority = format!("{}:{}", hub.address, self.config.status_port);
        let payload: NodeStatusPayload = self.get_json(&authority, &self.config.status_path).await?;
        Ok(payload.nodes)
    }

    /// Seconds the grid has been idle. See [`idle_secs`].
    pub async fn idle_time(&self, hub: &Hub) -> PollResult<u64> {
        let nodes = self.node_statuses(hub).await?;
        Ok(idle_secs(&nodes))
    }

    /// Host addresses of the nodes registered with the hub, in payload order.
    pub async fn connected_node_addresses(&self, hub: &Hub) -> PollResult<Vec<String>> {
        let nodes = self.node_statuses(hub).await?;
        Ok(nodes.into_iter().map(|n| n.host).collect())
    }

    /// Whether at least one node has registered with the hub.
    pub async fn is_ready(&self, hub: &Hub) -> PollResult<bool> {
        let nodes = self.node_statuses(hub).await?;
        Ok(!nodes.is_empty())
    }

    /// Sessions served by the hub over this quarter and the last.
    pub async fn served_sessions(&self, hub: &Hub) -> PollResult<u64> {
        let authority = format!("{}:{}", hub.address, self.config.agent_port);
        let usage: UsagePayload = self.get_json(&authority, &self.config.usage_path).await?;
        Ok(usage.served_sessions())
    }

    /// Send a control command to the grid agent at `address`.
    pub async fn send_command(&self, address: &str, command: &GridCommand) -> PollResult<()> {
        let authority = format!("{address}:{}", self.config.agent_port);
        self.get(&authority, &command.path()).await?;
        debug!(%address, command = command.name(), "grid command sent");
        Ok(())
    }

    /// Best-effort variant of [`Self::send_command`]: failures are logged.
    pub async fn notify(&self, address: &str, command: GridCommand) -> bool {
        match self.send_command(address, &command).await {
            Ok(()) => true,
            Err(e) => {
                warn!(%address, command = command.name(), error = %e, "grid command failed");
                false
            }
        }
    }

    async fn get(&self, authority: &str, path: &str) -> PollResult<Bytes> {
        match tokio::time::timeout(self.timeout, self.probe.get(authority, path)).await {
            Ok(result) => result,
            Err(_) => {
                let uri = format!("http://{authority}{path}");
                debug!(%uri, timeout_ms = self.timeout.as_millis() as u64, "grid endpoint timed out");
                Err(PollError::Timeout {
                    uri,
                    after: self.timeout,
                })
            }
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, authority: &str, path: &str) -> PollResult<T> {
        let body = self.get(authority, path).await?;
        serde_json::from_slice(&body).map_err(|e| PollError::Malformed {
            uri: format!("http://{authority}{path}"),
            reason: e.to_string(),
        })
    }
}

/// Idle seconds of a grid, given its node list.
///
/// Any busy node means the grid is in use (0). Otherwise the grid is only
/// as idle as its most recently used node. No nodes is no evidence of
/// idleness (0).
pub fn idle_secs(nodes: &[NodeStatus]) -> u64 {
    if nodes.iter().any(|n| n.status == NodeActivity::Busy) {
        return 0;
    }
    nodes.iter().map(|n| n.idle_time).min().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedProbe;

    const STATUS: &str = "10.41.1.1:4444/grid/admin/ActiveNodeServlet";
    const USAGE: &str = "10.41.1.1:3000/served_sessions";

    fn hub() -> Hub {
        Hub::new("i-abcdefgh", "m3.medium", "10.41.1.1", 0, 1)
    }

    fn node_json(host: &str, status: &str, idle: u64) -> String {
        format!(
            r#"{{"host": "{host}", "hostname": "SEL", "status": "{status}",
                 "idle_time": "{idle}", "busy_time": "0", "browser_active": "false"}}"#
        )
    }

    fn nodes_body(nodes: &[(&str, &str, u64)]) -> String {
        let entries: Vec<String> = nodes
            .iter()
            .map(|(host, status, idle)| node_json(host, status, *idle))
            .collect();
        format!(r#"{{"nodes": [{}]}}"#, entries.join(","))
    }

    fn poller(probe: &Arc<ScriptedProbe>) -> StatusPoller {
        StatusPoller::new(probe.clone(), &PollerConfig::default())
    }

    #[tokio::test]
    async fn idle_time_is_minimum_until_a_node_is_busy() {
        let probe = Arc::new(ScriptedProbe::new());
        let poller = poller(&probe);
        let mut nodes = vec![("10.101.10.001", "idle", 150)];

        probe.respond(STATUS, nodes_body(&nodes));
        assert_eq!(poller.idle_time(&hub()).await.unwrap(), 150);

        nodes.push(("10.101.10.002", "idle", 200));
        probe.respond(STATUS, nodes_body(&nodes));
        assert_eq!(poller.idle_time(&hub()).await.unwrap(), 150);

        nodes.push(("10.101.10.003", "idle", 100));
        probe.respond(STATUS, nodes_body(&nodes));
        assert_eq!(poller.idle_time(&hub()).await.unwrap(), 100);

        nodes.push(("10.101.10.004", "busy", 0));
        probe.respond(STATUS, nodes_body(&nodes));
        assert_eq!(poller.idle_time(&hub()).await.unwrap(), 0);

        nodes.push(("10.101.10.005", "idle", 5));
        probe.respond(STATUS, nodes_body(&nodes));
        assert_eq!(poller.idle_time(&hub()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn idle_time_of_empty_grid_is_zero() {
        let probe = Arc::new(ScriptedProbe::new());
        probe.respond(STATUS, r#"{"nodes": []}"#);
        assert_eq!(poller(&probe).idle_time(&hub()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn connected_nodes_keep_payload_order() {
        let probe = Arc::new(ScriptedProbe::new());
        probe.respond(
            STATUS,
            nodes_body(&[
                ("10.101.10.001", "idle", 150),
                ("10.101.10.002", "busy", 0),
                ("10.101.10.003", "idle", 5),
            ]),
        );

        let hosts = poller(&probe).connected_node_addresses(&hub()).await.unwrap();
        assert_eq!(hosts, vec!["10.101.10.001", "10.101.10.002", "10.101.10.003"]);
    }

    #[tokio::test]
    async fn ready_once_a_node_registers() {
        let probe = Arc::new(ScriptedProbe::new());
        let poller = poller(&probe);

        probe.respond(STATUS, r#"{"nodes": []}"#);
        assert!(!poller.is_ready(&hub()).await.unwrap());

        probe.respond(STATUS, nodes_body(&[("10.101.10.001", "idle", 150)]));
        assert!(poller.is_ready(&hub()).await.unwrap());
    }

    #[tokio::test]
    async fn served_sessions_sums_quarters() {
        let probe = Arc::new(ScriptedProbe::new());
        probe.respond(
            USAGE,
            r#"{"exit_code": 0, "out": [], "error": [], "today": 8393, "yesterday": 7937,
                "last_week": 52860, "week_so_far": 43790, "quarter": 8393, "last_quarter": 521932}"#,
        );
        assert_eq!(poller(&probe).served_sessions(&hub()).await.unwrap(), 530325);
    }

    #[tokio::test]
    async fn malformed_payload_is_a_poll_failure() {
        let probe = Arc::new(ScriptedProbe::new());
        probe.respond(STATUS, "<html>grid console</html>");
        let err = poller(&probe).idle_time(&hub()).await.unwrap_err();
        assert!(matches!(err, PollError::Malformed { .. }));
    }

    #[tokio::test]
    async fn unreachable_hub_is_a_poll_failure() {
        let probe = Arc::new(ScriptedProbe::new());
        probe.fail(STATUS);
        let err = poller(&probe).is_ready(&hub()).await.unwrap_err();
        assert!(matches!(err, PollError::Connect { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_hub_times_out() {
        let probe = Arc::new(ScriptedProbe::new());
        probe.hang(STATUS);
        let err = poller(&probe).idle_time(&hub()).await.unwrap_err();
        assert!(matches!(err, PollError::Timeout { after, .. } if after == Duration::from_secs(2)));
    }

    #[tokio::test]
    async fn commands_hit_the_agent_port() {
        let probe = Arc::new(ScriptedProbe::new());
        let poller = poller(&probe);

        assert!(
            poller
                .notify(
                    "10.0.1.7",
                    GridCommand::SetHub {
                        hub_address: "10.41.1.1".to_string()
                    }
                )
                .await
        );
        assert!(poller.notify("10.41.1.1", GridCommand::Reset).await);

        assert_eq!(
            probe.requests(),
            vec![
                "10.0.1.7:3000/set_hub?hub=10.41.1.1".to_string(),
                "10.41.1.1:3000/reset".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn failed_notify_reports_false() {
        let probe = Arc::new(ScriptedProbe::new());
        probe.fail("10.41.1.1:3000/stop_grid");
        assert!(!poller(&probe).notify("10.41.1.1", GridCommand::StopGrid).await);
    }

    #[test]
    fn command_paths() {
        assert_eq!(GridCommand::StartGrid.path(), "/start_grid");
        assert_eq!(GridCommand::StopGrid.path(), "/stop_grid");
        assert_eq!(GridCommand::Reset.path(), "/reset");
        assert_eq!(
            GridCommand::SetHub {
                hub_address: "10.0.0.9".to_string()
            }
            .path(),
            "/set_hub?hub=10.0.0.9"
        );
    }
}
