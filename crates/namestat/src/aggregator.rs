//! Cluster snapshot aggregation.
//!
//! A snapshot is composed from one copy of each component: the node
//! registry, the block census and the safe mode tracker. Each copy is taken
//! under that component's own lock, so the fields derived from it are
//! mutually consistent. No lock spans the three components; the copies may
//! be a heartbeat or a poll interval apart, which is the accepted staleness
//! window for monitoring reads.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::census::{BlockCensus, BlockCounters};
use crate::registry::{NodeRecord, NodeRegistry, NodeState, RegistryView};
use crate::safemode::{SafeModeStatus, SafeModeTracker};
use crate::types::{percent_of, Timestamp};

/// Capacity totals over Live nodes.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CapacitySummary {
    /// Raw capacity in bytes.
    pub total_bytes: u64,
    /// Bytes used by filesystem blocks.
    pub used_bytes: u64,
    /// Bytes used for non-filesystem purposes.
    pub non_dfs_used_bytes: u64,
    /// Bytes still free for blocks.
    pub free_bytes: u64,
}

impl CapacitySummary {
    /// Sums the figures of the Live records in `records`.
    pub fn from_live(records: &[NodeRecord]) -> Self {
        let mut summary = CapacitySummary::default();
        for record in records.iter().filter(|r| r.state == NodeState::Live) {
            summary.total_bytes = summary.total_bytes.saturating_add(record.capacity_bytes);
            summary.used_bytes = summary.used_bytes.saturating_add(record.used_bytes);
            summary.non_dfs_used_bytes = summary
                .non_dfs_used_bytes
                .saturating_add(record.non_dfs_used_bytes);
        }
        summary.free_bytes = summary
            .total_bytes
            .saturating_sub(summary.used_bytes)
            .saturating_sub(summary.non_dfs_used_bytes);
        summary
    }

    /// Used space as a percentage of total capacity.
    pub fn percent_used(&self) -> f64 {
        percent_of(self.used_bytes, self.total_bytes)
    }

    /// Free space as a percentage of total capacity.
    pub fn percent_remaining(&self) -> f64 {
        percent_of(self.free_bytes, self.total_bytes)
    }
}

/// Immutable point-in-time view of cluster statistics.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClusterSnapshot {
    /// When the snapshot was taken.
    pub taken_at: Timestamp,
    /// Capacity totals over Live nodes.
    pub capacity: CapacitySummary,
    /// `capacity.used_bytes` as a percentage of `capacity.total_bytes`.
    pub percent_used: f64,
    /// `capacity.free_bytes` as a percentage of `capacity.total_bytes`.
    pub percent_remaining: f64,
    /// Block and namespace counters.
    pub blocks: BlockCounters,
    /// Namespace-used bytes as a percentage of `capacity.total_bytes`.
    pub percent_namespace_used: f64,
    /// Live nodes, ordered by id.
    pub live_nodes: Vec<NodeRecord>,
    /// Dead nodes, ordered by id.
    pub dead_nodes: Vec<NodeRecord>,
    /// Decommissioning nodes, ordered by id.
    pub decom_nodes: Vec<NodeRecord>,
    /// Safe mode state and description.
    pub safemode: SafeModeStatus,
}

impl ClusterSnapshot {
    /// Composes a snapshot from component copies.
    pub fn compose(
        view: &RegistryView,
        blocks: BlockCounters,
        safemode: SafeModeStatus,
        taken_at: Timestamp,
    ) -> Self {
        let capacity = CapacitySummary::from_live(view.records());

        Self {
            taken_at,
            percent_used: capacity.percent_used(),
            percent_remaining: capacity.percent_remaining(),
            percent_namespace_used: percent_of(blocks.namespace_used_bytes, capacity.total_bytes),
            capacity,
            blocks,
            live_nodes: view.list_by_state(NodeState::Live).to_vec(),
            dead_nodes: view.list_by_state(NodeState::Dead).to_vec(),
            decom_nodes: view.list_by_state(NodeState::Decommissioning).to_vec(),
            safemode,
        }
    }

    /// Bytes used by blocks on Live nodes.
    pub fn used(&self) -> u64 {
        self.capacity.used_bytes
    }

    /// Bytes free for blocks on Live nodes.
    pub fn free(&self) -> u64 {
        self.capacity.free_bytes
    }

    /// Raw capacity of Live nodes.
    pub fn total(&self) -> u64 {
        self.capacity.total_bytes
    }

    /// Non-filesystem usage on Live nodes.
    pub fn non_dfs_used(&self) -> u64 {
        self.capacity.non_dfs_used_bytes
    }

    /// Nodes in the given state.
    pub fn nodes(&self, state: NodeState) -> &[NodeRecord] {
        match state {
            NodeState::Live => &self.live_nodes,
            NodeState::Dead => &self.dead_nodes,
            NodeState::Decommissioning => &self.decom_nodes,
        }
    }

    /// Number of nodes across all states.
    pub fn node_count(&self) -> usize {
        self.live_nodes.len() + self.dead_nodes.len() + self.decom_nodes.len()
    }
}

/// Produces cluster snapshots from shared component handles.
#[derive(Clone)]
pub struct StatsAggregator {
    registry: Arc<NodeRegistry>,
    census: Arc<BlockCensus>,
    safemode: Arc<SafeModeTracker>,
}

impl StatsAggregator {
    /// Creates an aggregator reading from the given components.
    pub fn new(
        registry: Arc<NodeRegistry>,
        census: Arc<BlockCensus>,
        safemode: Arc<SafeModeTracker>,
    ) -> Self {
        Self {
            registry,
            census,
            safemode,
        }
    }

    /// Takes a snapshot of the cluster. Never fails.
    pub fn take_snapshot(&self) -> ClusterSnapshot {
        let taken_at = Timestamp::now();
        let view = self.registry.view();
        let blocks = self.census.snapshot();
        let safemode = self.safemode.current_state_at(taken_at);

        let snapshot = ClusterSnapshot::compose(&view, blocks, safemode, taken_at);
        tracing::trace!(
            live = snapshot.live_nodes.len(),
            dead = snapshot.dead_nodes.len(),
            decom = snapshot.decom_nodes.len(),
            total_bytes = snapshot.capacity.total_bytes,
            "cluster snapshot taken"
        );
        snapshot
    }
}
