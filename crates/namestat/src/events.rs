//! Cluster mutation events.
//!
//! Each event corresponds to one call the live subsystems make into the
//! cluster state. Events can be read from JSON and replayed against a
//! [`ClusterState`], which is how the CLI and the scenario tests drive it.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::census::{BlockCounters, BlockDelta};
use crate::error::StatsResult;
use crate::registry::NodeState;
use crate::safemode::SafeModeState;
use crate::state::ClusterState;
use crate::types::{NodeId, Timestamp};

/// A single mutation of the cluster state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClusterEvent {
    /// A worker node reported in.
    Heartbeat {
        /// Reporting node.
        node_id: NodeId,
        /// Raw capacity in bytes.
        capacity_bytes: u64,
        /// Bytes used by blocks.
        used_bytes: u64,
        /// Bytes used for other purposes.
        #[serde(default)]
        non_dfs_used_bytes: u64,
        /// Heartbeat time; the current time when absent.
        #[serde(default)]
        at: Option<Timestamp>,
    },
    /// A node was declared dead.
    MarkDead {
        /// Affected node.
        node_id: NodeId,
    },
    /// A node started decommissioning.
    MarkDecommissioning {
        /// Affected node.
        node_id: NodeId,
    },
    /// A decommissioning node returned to service.
    Recommission {
        /// Affected node.
        node_id: NodeId,
    },
    /// An administrator removed a node.
    RemoveNode {
        /// Affected node.
        node_id: NodeId,
    },
    /// Block and namespace counters changed.
    BlockDelta(BlockDelta),
    /// Block counters were re-seeded from a full report.
    CensusReset(BlockCounters),
    /// Safe mode entered at startup.
    SafeModeEnter,
    /// Safe mode entered by an administrator.
    SafeModeEnterManual,
    /// Generic safe mode transition.
    SafeModeTransition {
        /// Requested state.
        to: SafeModeState,
    },
    /// Administrator left safe mode.
    SafeModeLeave,
    /// Administrator forced safe mode off.
    SafeModeForceLeave,
    /// Block report progress for the safe mode thresholds.
    BlockReport {
        /// Blocks with enough reported replicas.
        safe_blocks: u64,
        /// Blocks expected.
        total_blocks: u64,
    },
    /// Liveness check at a given time.
    Tick {
        /// Time of the check.
        at: Timestamp,
        /// Heartbeat silence after which a node is dead.
        expiry_secs: u64,
    },
}

impl ClusterEvent {
    /// Applies the event. Errors leave the state unchanged.
    pub fn apply(&self, state: &ClusterState) -> StatsResult<()> {
        match self {
            ClusterEvent::Heartbeat {
                node_id,
                capacity_bytes,
                used_bytes,
                non_dfs_used_bytes,
                at,
            } => {
                state.registry.record_heartbeat_at(
                    node_id.clone(),
                    *capacity_bytes,
                    *used_bytes,
                    *non_dfs_used_bytes,
                    at.unwrap_or_else(Timestamp::now),
                );
            }
            ClusterEvent::MarkDead { node_id } => {
                state.registry.mark_dead(node_id);
            }
            ClusterEvent::MarkDecommissioning { node_id } => {
                state.registry.mark_decommissioning(node_id);
            }
            ClusterEvent::Recommission { node_id } => {
                state.registry.recommission(node_id);
            }
            ClusterEvent::RemoveNode { node_id } => {
                state.registry.remove(node_id);
            }
            ClusterEvent::BlockDelta(delta) => {
                state.census.apply_delta(*delta)?;
            }
            ClusterEvent::CensusReset(counters) => state.census.reset(*counters)?,
            ClusterEvent::SafeModeEnter => state.safemode.enter_startup()?,
            ClusterEvent::SafeModeEnterManual => state.safemode.enter_manual()?,
            ClusterEvent::SafeModeTransition { to } => {
                state.safemode.transition_to(*to, Timestamp::now())?
            }
            ClusterEvent::SafeModeLeave => state.safemode.leave()?,
            ClusterEvent::SafeModeForceLeave => {
                state.safemode.force_leave();
            }
            ClusterEvent::BlockReport {
                safe_blocks,
                total_blocks,
            } => {
                let live = state.registry.count_by_state(NodeState::Live);
                state
                    .safemode
                    .report_blocks(*safe_blocks, *total_blocks, live, Timestamp::now());
            }
            ClusterEvent::Tick { at, expiry_secs } => {
                state
                    .registry
                    .expire_stale(*at, Duration::from_secs(*expiry_secs));
                state.safemode.tick(*at);
            }
        }
        Ok(())
    }
}

/// Outcome of replaying a batch of events.
#[derive(Debug, Default)]
pub struct ReplayReport {
    /// Events applied.
    pub applied: usize,
    /// Indices and errors of rejected events.
    pub rejected: Vec<(usize, String)>,
}

/// Applies events in order, continuing past rejected ones.
pub fn replay(state: &ClusterState, events: &[ClusterEvent]) -> ReplayReport {
    let mut report = ReplayReport::default();
    for (index, event) in events.iter().enumerate() {
        match event.apply(state) {
            Ok(()) => report.applied += 1,
            Err(e) => {
                tracing::warn!(index, ?event, error = %e, "event rejected");
                report.rejected.push((index, e.to_string()));
            }
        }
    }
    report
}
