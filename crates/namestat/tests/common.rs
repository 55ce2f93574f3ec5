//! Shared fixtures for integration tests.

#![allow(dead_code)]

use namestat::{ClusterState, NodeId, Timestamp};

/// Registers `count` nodes named `node1..=nodeN`, each with the given
/// capacity and a used figure taken from `used` (0 when `used` is short).
pub fn register_nodes(state: &ClusterState, capacity: u64, used: &[u64], count: usize) -> Vec<NodeId> {
    (0..count)
        .map(|i| {
            let id = NodeId::new(format!("node{}", i + 1));
            let used_bytes = used.get(i).copied().unwrap_or(0);
            state
                .registry
                .record_heartbeat_at(id.clone(), capacity, used_bytes, 0, Timestamp::from_secs(1_000));
            id
        })
        .collect()
}
