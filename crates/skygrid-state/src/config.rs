//! skygrid.toml configuration.
//!
//! Every field has a default, so an empty file (or no file) is a valid
//! config. Durations are written as strings: `"2s"`, `"500ms"`, `"1m"`.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct GridConfig {
    pub allocation: AllocationLimits,
    pub abandonment: AbandonPolicy,
    pub reclaim_window: ReclaimWindow,
    pub poller: PollerConfig,
    pub schedule: ScheduleConfig,
    pub logging: LoggingConfig,
}

/// Bounds on what a single allocation request may ask for.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AllocationLimits {
    /// Largest grid a team may request.
    pub max_nodes: u32,
    /// Shortest accepted team name, in characters.
    pub min_team_length: usize,
    /// Instance type requested for new hubs and matched against pooled ones.
    pub hub_class: String,
}

impl Default for AllocationLimits {
    fn default() -> Self {
        Self {
            max_nodes: 100,
            min_team_length: 3,
            hub_class: "m3.medium".to_string(),
        }
    }
}

/// When an active grid counts as abandoned.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AbandonPolicy {
    /// Minimum idle time reported by the hub.
    pub idle_threshold_secs: u64,
    /// Minimum time since assignment. Fresh grids are never reclaimed.
    pub grace_period_secs: u64,
}

impl Default for AbandonPolicy {
    fn default() -> Self {
        Self {
            idle_threshold_secs: 300,
            grace_period_secs: 300,
        }
    }
}

impl AbandonPolicy {
    /// Both the idle threshold and the grace period must be reached.
    pub fn is_abandoned(&self, idle_secs: u64, assigned_secs: u64) -> bool {
        idle_secs >= self.idle_threshold_secs && assigned_secs >= self.grace_period_secs
    }
}

/// Time-until-hour band in which an idle pooled resource is terminated.
///
/// A resource is torn down iff `lower_minutes < time_until_hour <= upper_minutes`.
/// Above the band it may still be reused this hour; at or below the lower
/// bound termination might not finish before the hour rolls over.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ReclaimWindow {
    pub lower_minutes: u32,
    pub upper_minutes: u32,
}

impl Default for ReclaimWindow {
    fn default() -> Self {
        Self {
            lower_minutes: 1,
            upper_minutes: 3,
        }
    }
}

impl ReclaimWindow {
    pub fn contains(&self, time_until_hour: u32) -> bool {
        time_until_hour > self.lower_minutes && time_until_hour <= self.upper_minutes
    }
}

/// Where and how to reach the grid endpoints on a hub.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PollerConfig {
    /// Per-call timeout (e.g. "2s").
    pub timeout: String,
    /// Port of the grid console that lists node status.
    pub status_port: u16,
    pub status_path: String,
    /// Port of the grid agent (usage counters and control commands).
    pub agent_port: u16,
    pub usage_path: String,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            timeout: "2s".to_string(),
            status_port: 4444,
            status_path: "/grid/admin/ActiveNodeServlet".to_string(),
            agent_port: 3000,
            usage_path: "/served_sessions".to_string(),
        }
    }
}

impl PollerConfig {
    pub fn timeout(&self) -> Duration {
        parse_duration(&self.timeout).unwrap_or(Duration::from_secs(2))
    }
}

/// Background sweep cadence and liveness budget.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScheduleConfig {
    pub abandon_interval: String,
    pub node_check_interval: String,
    pub teardown_interval: String,
    /// A sweep that has not run within this budget reports `FAIL`.
    pub staleness_budget: String,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            abandon_interval: "30s".to_string(),
            node_check_interval: "30s".to_string(),
            teardown_interval: "30s".to_string(),
            staleness_budget: "90s".to_string(),
        }
    }
}

impl ScheduleConfig {
    pub fn abandon_interval(&self) -> Duration {
        parse_duration(&self.abandon_interval).unwrap_or(Duration::from_secs(30))
    }

    pub fn node_check_interval(&self) -> Duration {
        parse_duration(&self.node_check_interval).unwrap_or(Duration::from_secs(30))
    }

    pub fn teardown_interval(&self) -> Duration {
        parse_duration(&self.teardown_interval).unwrap_or(Duration::from_secs(30))
    }

    pub fn staleness_budget(&self) -> Duration {
        parse_duration(&self.staleness_budget).unwrap_or(Duration::from_secs(90))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Number of log lines kept for the log tail.
    pub tail_capacity: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            tail_capacity: 1000,
        }
    }
}

impl GridConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: GridConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.allocation.max_nodes == 0 {
            return Err(invalid("allocation.max_nodes must be at least 1"));
        }
        if self.allocation.hub_class.trim().is_empty() {
            return Err(invalid("allocation.hub_class must not be empty"));
        }

        let window = &self.reclaim_window;
        if window.lower_minutes >= window.upper_minutes {
            return Err(invalid("reclaim_window.lower_minutes must be below upper_minutes"));
        }
        if window.upper_minutes > crate::types::BILLING_PERIOD_MINUTES {
            return Err(invalid("reclaim_window.upper_minutes must be at most 60"));
        }

        match parse_duration(&self.poller.timeout) {
            Some(d) if !d.is_zero() => {}
            _ => return Err(invalid("poller.timeout must be a positive duration")),
        }

        let schedule = &self.schedule;
        let budget = parse_duration(&schedule.staleness_budget)
            .ok_or_else(|| invalid("schedule.staleness_budget is not a duration"))?;
        for (name, raw) in [
            ("abandon_interval", &schedule.abandon_interval),
            ("node_check_interval", &schedule.node_check_interval),
            ("teardown_interval", &schedule.teardown_interval),
        ] {
            let interval = parse_duration(raw)
                .ok_or_else(|| invalid(&format!("schedule.{name} is not a duration")))?;
            if interval.is_zero() {
                return Err(invalid(&format!("schedule.{name} must be positive")));
            }
            if interval > budget {
                return Err(invalid(&format!(
                    "schedule.{name} ({raw}) exceeds staleness_budget ({})",
                    schedule.staleness_budget
                )));
            }
        }

        Ok(())
    }
}

fn invalid(msg: &str) -> ConfigError {
    ConfigError::Invalid(msg.to_string())
}

/// Parse a duration string like "5s", "500ms", "1m". A bare number is seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        let mins = mins.parse::<u64>().ok()?;
        mins.checked_mul(60).map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}
