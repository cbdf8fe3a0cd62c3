//! Wire payloads served by the grid software on a hub.
//!
//! The grid console reports counters as either JSON numbers or numeric
//! strings (`"idle_time": "150"`), so numeric fields accept both.

use serde::{Deserialize, Deserializer};

/// Body of the node-status endpoint.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct NodeStatusPayload {
    pub nodes: Vec<NodeStatus>,
}

/// One node as seen by its hub.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct NodeStatus {
    pub host: String,
    #[serde(default)]
    pub hostname: String,
    pub status: NodeActivity,
    /// Seconds since the node last finished a session.
    #[serde(deserialize_with = "lenient_u64")]
    pub idle_time: u64,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub busy_time: u64,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NodeActivity {
    Idle,
    Busy,
}

/// Body of the served-sessions endpoint.
///
/// Only the quarterly counters are read. Whatever else the agent sends
/// may take any shape.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct UsagePayload {
    #[serde(deserialize_with = "lenient_u64")]
    pub quarter: u64,
    #[serde(deserialize_with = "lenient_u64")]
    pub last_quarter: u64,
}

impl UsagePayload {
    /// Sessions served over the current and previous quarter.
    pub fn served_sessions(&self) -> u64 {
        self.quarter.saturating_add(self.last_quarter)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(u64),
    String(String),
}

fn lenient_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => Ok(n),
        NumberOrString::String(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}
