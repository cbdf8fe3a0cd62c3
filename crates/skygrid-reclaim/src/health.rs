//! Sweep liveness.
//!
//! Each scheduled task stamps its own last-run time. A task is alive while
//! its stamp is no older than the staleness budget. A task that has never
//! run is as stale as it gets.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// The three scheduled tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SweepKind {
    Abandonment,
    NodeCheck,
    Teardown,
}

impl SweepKind {
    pub const ALL: [SweepKind; 3] = [
        SweepKind::Abandonment,
        SweepKind::NodeCheck,
        SweepKind::Teardown,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SweepKind::Abandonment => "abandoned_check",
            SweepKind::NodeCheck => "node_check",
            SweepKind::Teardown => "teardown_check",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Liveness {
    Pass,
    Fail,
}

impl Liveness {
    /// `Pass` iff `now - last_run <= budget`.
    pub fn judge(last_run: Option<u64>, now: u64, budget: Duration) -> Self {
        match last_run {
            Some(at) if now.saturating_sub(at) <= budget.as_secs() => Liveness::Pass,
            _ => Liveness::Fail,
        }
    }
}

/// Unix seconds of the last start of each sweep. `None` until it first runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepTimestamps {
    pub abandoned_check: Option<u64>,
    pub node_check: Option<u64>,
    pub teardown_check: Option<u64>,
}

impl SweepTimestamps {
    pub fn get(&self, kind: SweepKind) -> Option<u64> {
        match kind {
            SweepKind::Abandonment => self.abandoned_check,
            SweepKind::NodeCheck => self.node_check,
            SweepKind::Teardown => self.teardown_check,
        }
    }

    pub fn stamp(&mut self, kind: SweepKind, now: u64) {
        let slot = match kind {
            SweepKind::Abandonment => &mut self.abandoned_check,
            SweepKind::NodeCheck => &mut self.node_check,
            SweepKind::Teardown => &mut self.teardown_check,
        };
        *slot = Some(now);
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthReport {
    pub abandoned_check: Liveness,
    pub node_check: Liveness,
    pub teardown_check: Liveness,
}

impl HealthReport {
    pub fn judge(timestamps: &SweepTimestamps, now: u64, budget: Duration) -> Self {
        let judge = |kind: SweepKind| Liveness::judge(timestamps.get(kind), now, budget);
        Self {
            abandoned_check: judge(SweepKind::Abandonment),
            node_check: judge(SweepKind::NodeCheck),
            teardown_check: judge(SweepKind::Teardown),
        }
    }

    pub fn all_pass(&self) -> bool {
        [self.abandoned_check, self.node_check, self.teardown_check]
            .iter()
            .all(|l| *l == Liveness::Pass)
    }
}
