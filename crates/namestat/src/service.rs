//! Process-wide facts and the full management view.
//!
//! Identifiers such as the namespace id or the primary flag are not cluster
//! statistics; they are passed through unchanged next to a snapshot when the
//! management view is assembled.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::aggregator::ClusterSnapshot;
use crate::registry::NodeRecord;

/// Static identity of this master node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceInfo {
    /// Namespace id assigned when the filesystem was formatted.
    pub namespace_id: i32,
    /// Nameservice this master belongs to; empty when not federated.
    pub nameservice_id: String,
    /// Whether this master is the primary of its pair.
    pub is_primary: bool,
    /// Whether the last layout upgrade has been finalized.
    pub upgrade_finalized: bool,
    /// Implementation-specific keys exposed as-is.
    pub specific_keys: BTreeMap<String, String>,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            namespace_id: 0,
            nameservice_id: String::new(),
            is_primary: true,
            upgrade_finalized: true,
            specific_keys: BTreeMap::new(),
        }
    }
}

/// Facts about the running process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeFacts {
    /// Software version.
    pub version: String,
    /// Number of threads in the process.
    pub threads: usize,
}

impl RuntimeFacts {
    /// Reads the facts of the current process.
    pub fn collect() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            threads: thread_count(),
        }
    }
}

#[cfg(target_os = "linux")]
fn thread_count() -> usize {
    std::fs::read_dir("/proc/self/task")
        .map(|entries| entries.count())
        .unwrap_or(1)
}

#[cfg(not(target_os = "linux"))]
fn thread_count() -> usize {
    1
}

/// Every value of the master node management surface, in one structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NameNodeStatus {
    /// Software version.
    pub version: String,
    /// Bytes used by blocks on live nodes.
    pub used: u64,
    /// Bytes free for blocks on live nodes.
    pub free: u64,
    /// Raw capacity of live nodes.
    pub total: u64,
    /// Safe mode text, empty when safe mode is off.
    pub safemode: String,
    /// Whether the last upgrade was finalized.
    pub upgrade_finalized: bool,
    /// Non-filesystem usage on live nodes.
    pub non_dfs_used_space: u64,
    /// Used space as a percentage of total.
    pub percent_used: f64,
    /// Free space as a percentage of total.
    pub percent_remaining: f64,
    /// Bytes consumed by the namespace.
    pub namespace_used: u64,
    /// Namespace usage as a percentage of total.
    pub percent_namespace_used: f64,
    /// Total blocks.
    pub total_blocks: u64,
    /// Total files and directories.
    pub total_files_and_directories: u64,
    /// Blocks with no live replica.
    pub number_of_missing_blocks: u64,
    /// Threads in the process.
    pub threads: usize,
    /// Live nodes.
    pub live_nodes: Vec<NodeRecord>,
    /// Dead nodes.
    pub dead_nodes: Vec<NodeRecord>,
    /// Decommissioning nodes.
    pub decom_nodes: Vec<NodeRecord>,
    /// Namespace id.
    pub namespace_id: i32,
    /// Nameservice id.
    pub nameservice_id: String,
    /// Safe mode text as shown to operators.
    pub safe_mode_text: String,
    /// Implementation-specific keys.
    pub nn_specific_keys: BTreeMap<String, String>,
    /// Whether this master is the primary.
    pub is_primary: bool,
}

impl NameNodeStatus {
    /// Assembles the view from a snapshot and the process facts.
    pub fn compose(snapshot: &ClusterSnapshot, service: &ServiceInfo, runtime: &RuntimeFacts) -> Self {
        let safemode = if snapshot.safemode.is_on() {
            snapshot.safemode.text.clone()
        } else {
            String::new()
        };

        Self {
            version: runtime.version.clone(),
            used: snapshot.used(),
            free: snapshot.free(),
            total: snapshot.total(),
            safemode,
            upgrade_finalized: service.upgrade_finalized,
            non_dfs_used_space: snapshot.non_dfs_used(),
            percent_used: snapshot.percent_used,
            percent_remaining: snapshot.percent_remaining,
            namespace_used: snapshot.blocks.namespace_used_bytes,
            percent_namespace_used: snapshot.percent_namespace_used,
            total_blocks: snapshot.blocks.total_blocks,
            total_files_and_directories: snapshot.blocks.files_and_dirs,
            number_of_missing_blocks: snapshot.blocks.missing_blocks,
            threads: runtime.threads,
            live_nodes: snapshot.live_nodes.clone(),
            dead_nodes: snapshot.dead_nodes.clone(),
            decom_nodes: snapshot.decom_nodes.clone(),
            namespace_id: service.namespace_id,
            nameservice_id: service.nameservice_id.clone(),
            safe_mode_text: snapshot.safemode.text.clone(),
            nn_specific_keys: service.specific_keys.clone(),
            is_primary: service.is_primary,
        }
    }
}
