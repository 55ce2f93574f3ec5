#![warn(missing_docs)]

//! namestat: cluster-state aggregation and metrics snapshot engine for a filesystem master node
//!
//! Heartbeats, namespace changes and safe mode commands mutate the node
//! registry, the block census and the safe mode tracker concurrently. The
//! stats aggregator turns them into immutable `ClusterSnapshot` values for
//! monitoring reads without a cluster-wide lock.

pub mod aggregator;
pub mod census;
pub mod cli;
pub mod config;
pub mod error;
pub mod events;
pub mod monitor;
pub mod registry;
pub mod safemode;
pub mod service;
pub mod state;
pub mod types;

pub use aggregator::{CapacitySummary, ClusterSnapshot, StatsAggregator};
pub use census::{BlockCensus, BlockCounters, BlockDelta};
pub use config::NamestatConfig;
pub use error::{StatsError, StatsResult};
pub use events::{replay, ClusterEvent, ReplayReport};
pub use monitor::{CheckOutcome, LivenessMonitor, MonitorHandle, MonitorStats};
pub use registry::{NodeListing, NodeRecord, NodeRegistry, NodeState, RegistryView};
pub use safemode::{SafeModeConfig, SafeModeState, SafeModeStatus, SafeModeTracker};
pub use service::{NameNodeStatus, RuntimeFacts, ServiceInfo};
pub use state::ClusterState;
pub use types::{NodeId, Timestamp};
