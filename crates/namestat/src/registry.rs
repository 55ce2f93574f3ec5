//! Worker node registry.
//!
//! Tracks every worker node that has ever sent a heartbeat together with its
//! last reported capacity figures, and classifies it as Live, Dead or
//! Decommissioning. Heartbeat processing, the liveness monitor and
//! administrative commands mutate it concurrently; readers always get a copy
//! taken under a single lock acquisition.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::types::{percent_of, NodeId, Timestamp};

/// Classification of a worker node.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeState {
    /// Node is heartbeating and serving.
    Live,
    /// Node missed its heartbeat deadline or was declared dead.
    Dead,
    /// Node is draining its replicas before leaving the cluster.
    Decommissioning,
}

impl NodeState {
    /// All states, in listing order.
    pub const ALL: [NodeState; 3] = [NodeState::Live, NodeState::Dead, NodeState::Decommissioning];
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeState::Live => "live",
            NodeState::Dead => "dead",
            NodeState::Decommissioning => "decommissioning",
        };
        write!(f, "{}", s)
    }
}

/// Last known state of one worker node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Node identity.
    pub node_id: NodeId,
    /// Current classification.
    pub state: NodeState,
    /// Raw capacity in bytes.
    pub capacity_bytes: u64,
    /// Bytes used by filesystem blocks.
    pub used_bytes: u64,
    /// Bytes used on the node for anything other than filesystem blocks.
    pub non_dfs_used_bytes: u64,
    /// When the last heartbeat arrived.
    pub last_heartbeat: Timestamp,
}

impl NodeRecord {
    fn new(node_id: NodeId, at: Timestamp) -> Self {
        Self {
            node_id,
            state: NodeState::Live,
            capacity_bytes: 0,
            used_bytes: 0,
            non_dfs_used_bytes: 0,
            last_heartbeat: at,
        }
    }

    /// Bytes still available for blocks on this node.
    pub fn remaining_bytes(&self) -> u64 {
        self.capacity_bytes
            .saturating_sub(self.used_bytes)
            .saturating_sub(self.non_dfs_used_bytes)
    }

    /// Block usage as a percentage of capacity.
    pub fn percent_used(&self) -> f64 {
        percent_of(self.used_bytes, self.capacity_bytes)
    }

    /// Time since the last heartbeat.
    pub fn age(&self, now: Timestamp) -> Duration {
        now.saturating_since(self.last_heartbeat)
    }
}

/// Node records of a single state, copied at the moment the listing was made.
///
/// The listing never changes afterwards; iterate it as often as needed.
#[derive(Clone, Debug, Default)]
pub struct NodeListing {
    records: Arc<[NodeRecord]>,
}

impl NodeListing {
    /// Iterates the records in node id order.
    pub fn iter(&self) -> std::slice::Iter<'_, NodeRecord> {
        self.records.iter()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the listing is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Ids of the listed nodes, in order.
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.records.iter().map(|r| r.node_id.clone()).collect()
    }

    /// Copies the records into an owned vector.
    pub fn to_vec(&self) -> Vec<NodeRecord> {
        self.records.to_vec()
    }
}

impl<'a> IntoIterator for &'a NodeListing {
    type Item = &'a NodeRecord;
    type IntoIter = std::slice::Iter<'a, NodeRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// A consistent copy of the whole registry, ordered by node id.
#[derive(Clone, Debug, Default)]
pub struct RegistryView {
    records: Vec<NodeRecord>,
}

impl RegistryView {
    /// Records in the given state.
    pub fn list_by_state(&self, state: NodeState) -> NodeListing {
        let records: Vec<NodeRecord> = self
            .records
            .iter()
            .filter(|r| r.state == state)
            .cloned()
            .collect();
        NodeListing {
            records: records.into(),
        }
    }

    /// All records.
    pub fn records(&self) -> &[NodeRecord] {
        &self.records
    }

    /// Number of nodes in the view.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the view holds no nodes.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Registry of worker nodes, keyed and ordered by node id.
pub struct NodeRegistry {
    nodes: RwLock<BTreeMap<NodeId, NodeRecord>>,
}

impl NodeRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            nodes: RwLock::new(BTreeMap::new()),
        }
    }

    /// Records a heartbeat stamped with the current time.
    ///
    /// See [`NodeRegistry::record_heartbeat_at`].
    pub fn record_heartbeat(
        &self,
        node_id: NodeId,
        capacity_bytes: u64,
        used_bytes: u64,
        non_dfs_used_bytes: u64,
    ) {
        self.record_heartbeat_at(
            node_id,
            capacity_bytes,
            used_bytes,
            non_dfs_used_bytes,
            Timestamp::now(),
        );
    }

    /// Records a heartbeat and refreshes the node's capacity figures.
    ///
    /// Unknown nodes, including ones removed by an administrator, are
    /// registered on the spot. A dead node that heartbeats again is Live.
    /// A decommissioning node keeps draining: its figures are refreshed but
    /// its state is kept until it is recommissioned or declared dead.
    pub fn record_heartbeat_at(
        &self,
        node_id: NodeId,
        capacity_bytes: u64,
        used_bytes: u64,
        non_dfs_used_bytes: u64,
        at: Timestamp,
    ) {
        let mut nodes = self.nodes.write();
        let record = nodes.entry(node_id.clone()).or_insert_with(|| {
            tracing::info!(node_id = %node_id, "registering new node");
            NodeRecord::new(node_id.clone(), at)
        });

        record.capacity_bytes = capacity_bytes;
        record.used_bytes = used_bytes;
        record.non_dfs_used_bytes = non_dfs_used_bytes;
        if at > record.last_heartbeat {
            record.last_heartbeat = at;
        }

        if record.state == NodeState::Dead {
            tracing::info!(node_id = %node_id, "dead node resumed heartbeating");
            record.state = NodeState::Live;
        }
    }

    /// Declares a node dead. Returns whether its state changed.
    pub fn mark_dead(&self, node_id: &NodeId) -> bool {
        self.transition(node_id, NodeState::Dead)
    }

    /// Starts decommissioning a node. Returns whether its state changed.
    pub fn mark_decommissioning(&self, node_id: &NodeId) -> bool {
        self.transition(node_id, NodeState::Decommissioning)
    }

    /// Returns a decommissioning node to service. Returns whether its state
    /// changed; dead nodes only come back through a heartbeat.
    pub fn recommission(&self, node_id: &NodeId) -> bool {
        let mut nodes = self.nodes.write();
        match nodes.get_mut(node_id) {
            Some(record) if record.state == NodeState::Decommissioning => {
                record.state = NodeState::Live;
                tracing::info!(node_id = %node_id, "node recommissioned");
                true
            }
            Some(_) => false,
            None => {
                tracing::debug!(node_id = %node_id, "recommission of unknown node ignored");
                false
            }
        }
    }

    fn transition(&self, node_id: &NodeId, target: NodeState) -> bool {
        let mut nodes = self.nodes.write();
        let Some(record) = nodes.get_mut(node_id) else {
            tracing::debug!(node_id = %node_id, state = %target, "transition of unknown node ignored");
            return false;
        };

        if record.state == target {
            return false;
        }

        tracing::info!(
            node_id = %node_id,
            from = %record.state,
            to = %target,
            "node state changed"
        );
        record.state = target;
        true
    }

    /// Removes a node from the registry. A later heartbeat registers it again.
    pub fn remove(&self, node_id: &NodeId) -> Option<NodeRecord> {
        let removed = self.nodes.write().remove(node_id);
        if removed.is_some() {
            tracing::info!(node_id = %node_id, "node removed from registry");
        }
        removed
    }

    /// Declares dead every Live node whose last heartbeat is older than
    /// `expiry` at `now`. Returns the ids of the expired nodes.
    pub fn expire_stale(&self, now: Timestamp, expiry: Duration) -> Vec<NodeId> {
        let mut nodes = self.nodes.write();
        let mut expired = Vec::new();

        for record in nodes.values_mut() {
            if record.state == NodeState::Live && record.age(now) > expiry {
                record.state = NodeState::Dead;
                expired.push(record.node_id.clone());
            }
        }

        if !expired.is_empty() {
            tracing::warn!(count = expired.len(), nodes = ?expired, "heartbeats expired, nodes marked dead");
        }
        expired
    }

    /// Nodes in the given state, ordered by node id.
    pub fn list_by_state(&self, state: NodeState) -> NodeListing {
        self.view().list_by_state(state)
    }

    /// Copies the whole registry under one lock acquisition.
    pub fn view(&self) -> RegistryView {
        let nodes = self.nodes.read();
        RegistryView {
            records: nodes.values().cloned().collect(),
        }
    }

    /// Looks up a single node.
    pub fn get(&self, node_id: &NodeId) -> Option<NodeRecord> {
        self.nodes.read().get(node_id).cloned()
    }

    /// Number of nodes in the given state.
    pub fn count_by_state(&self, state: NodeState) -> usize {
        self.nodes.read().values().filter(|r| r.state == state).count()
    }

    /// Total number of registered nodes.
    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    /// Whether no node has registered yet.
    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
