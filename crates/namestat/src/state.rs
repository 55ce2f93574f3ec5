//! Shared handles to the cluster state components.

use std::sync::Arc;

use crate::aggregator::StatsAggregator;
use crate::census::BlockCensus;
use crate::error::StatsResult;
use crate::safemode::{SafeModeConfig, SafeModeTracker};
use crate::registry::NodeRegistry;

/// Node registry, block census and safe mode tracker of one master node.
///
/// Cloning shares the components.
#[derive(Clone)]
pub struct ClusterState {
    /// Worker node registry.
    pub registry: Arc<NodeRegistry>,
    /// Block and namespace counters.
    pub census: Arc<BlockCensus>,
    /// Safe mode state machine.
    pub safemode: Arc<SafeModeTracker>,
}

impl ClusterState {
    /// Creates empty components with the given safe mode thresholds.
    pub fn new(safemode: SafeModeConfig) -> StatsResult<Self> {
        safemode.validate()?;
        Ok(Self {
            registry: Arc::new(NodeRegistry::new()),
            census: Arc::new(BlockCensus::new()),
            safemode: Arc::new(SafeModeTracker::new(safemode)),
        })
    }

    /// An aggregator reading from these components.
    pub fn aggregator(&self) -> StatsAggregator {
        StatsAggregator::new(
            self.registry.clone(),
            self.census.clone(),
            self.safemode.clone(),
        )
    }
}

impl Default for ClusterState {
    fn default() -> Self {
        Self {
            registry: Arc::new(NodeRegistry::new()),
            census: Arc::new(BlockCensus::new()),
            safemode: Arc::new(SafeModeTracker::default()),
        }
    }
}
