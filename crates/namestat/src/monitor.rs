//! Background liveness and safe mode monitor.
//!
//! On every recheck interval the monitor declares dead the nodes whose
//! heartbeats expired, feeds the block census into the safe mode thresholds
//! and lets an elapsed extension window take safe mode off.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::config::NamestatConfig;
use crate::registry::NodeState;
use crate::safemode::SafeModeState;
use crate::state::ClusterState;
use crate::types::{NodeId, Timestamp};

/// Shortest recheck interval a monitor will run with.
pub const MIN_RECHECK_INTERVAL: Duration = Duration::from_millis(1);

/// Result of one monitor pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CheckOutcome {
    /// Nodes declared dead in this pass.
    pub expired: Vec<NodeId>,
    /// Safe mode state after the pass.
    pub safemode: Option<SafeModeState>,
    /// Whether this pass took safe mode off.
    pub left_safemode: bool,
}

/// Counters kept by a running monitor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonitorStats {
    /// Passes completed.
    pub checks: u64,
    /// Nodes declared dead in total.
    pub nodes_expired: u64,
}

/// Handle to a running monitor.
pub struct MonitorHandle {
    shutdown: watch::Sender<bool>,
    stats: watch::Receiver<MonitorStats>,
    task: JoinHandle<MonitorStats>,
}

impl MonitorHandle {
    /// Latest counters.
    pub fn stats(&self) -> MonitorStats {
        self.stats.borrow().clone()
    }

    /// Whether the monitor task is still running.
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stops the monitor and returns its final counters.
    pub async fn shutdown(self) -> MonitorStats {
        let _ = self.shutdown.send(true);
        match self.task.await {
            Ok(stats) => stats,
            Err(e) => {
                tracing::error!(error = %e, "liveness monitor task failed");
                self.stats.borrow().clone()
            }
        }
    }
}

/// Periodic liveness checker for one cluster state.
pub struct LivenessMonitor {
    state: ClusterState,
    recheck_interval: Duration,
    heartbeat_expiry: Duration,
}

impl LivenessMonitor {
    /// Creates a monitor using the intervals from `config`.
    pub fn new(state: ClusterState, config: &NamestatConfig) -> Self {
        Self::with_intervals(state, config.recheck_interval(), config.heartbeat_expiry())
    }

    /// Creates a monitor with explicit intervals.
    ///
    /// A recheck interval below [`MIN_RECHECK_INTERVAL`] is raised to it.
    pub fn with_intervals(
        state: ClusterState,
        recheck_interval: Duration,
        heartbeat_expiry: Duration,
    ) -> Self {
        Self {
            state,
            recheck_interval: recheck_interval.max(MIN_RECHECK_INTERVAL),
            heartbeat_expiry,
        }
    }

    /// Runs one pass as of `now`.
    pub fn check(&self, now: Timestamp) -> CheckOutcome {
        let expired = self.state.registry.expire_stale(now, self.heartbeat_expiry);

        let blocks = self.state.census.snapshot();
        let live = self.state.registry.count_by_state(NodeState::Live);
        let safe_blocks = blocks.total_blocks.saturating_sub(blocks.missing_blocks);
        self.state
            .safemode
            .report_blocks(safe_blocks, blocks.total_blocks, live, now);

        let left_safemode = self.state.safemode.tick(now);
        let safemode = Some(self.state.safemode.current_state_at(now).state);

        CheckOutcome {
            expired,
            safemode,
            left_safemode,
        }
    }

    /// Spawns the monitor on the current tokio runtime.
    pub fn start(self) -> MonitorHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (stats_tx, stats_rx) = watch::channel(MonitorStats::default());

        let task = tokio::spawn(self.run(shutdown_rx, stats_tx));

        MonitorHandle {
            shutdown: shutdown_tx,
            stats: stats_rx,
            task,
        }
    }

    async fn run(
        self,
        mut shutdown: watch::Receiver<bool>,
        stats_tx: watch::Sender<MonitorStats>,
    ) -> MonitorStats {
        let mut ticker = tokio::time::interval(self.recheck_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut stats = MonitorStats::default();

        debug!(
            recheck_ms = self.recheck_interval.as_millis() as u64,
            expiry_ms = self.heartbeat_expiry.as_millis() as u64,
            "liveness monitor started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let outcome = self.check(Timestamp::now());
                    stats.checks += 1;
                    stats.nodes_expired += outcome.expired.len() as u64;
                    if outcome.left_safemode {
                        tracing::info!("safe mode extension elapsed, safe mode is off");
                    }
                    let _ = stats_tx.send(stats.clone());
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        debug!(checks = stats.checks, nodes_expired = stats.nodes_expired, "liveness monitor stopped");
        stats
    }
}
