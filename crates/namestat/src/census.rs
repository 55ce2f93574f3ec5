//! Cluster-wide block and namespace counters.
//!
//! The block manager and namespace feed signed deltas as blocks and inodes
//! come and go. Counters are never recomputed by scanning; a delta that would
//! leave them inconsistent is refused as a whole.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{StatsError, StatsResult};

/// Point-in-time copy of the census counters.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockCounters {
    /// Total number of blocks.
    pub total_blocks: u64,
    /// Blocks with no live replica. Always a subset of `total_blocks`.
    pub missing_blocks: u64,
    /// Total number of files and directories.
    pub files_and_dirs: u64,
    /// Bytes consumed by the namespace, replication included.
    pub namespace_used_bytes: u64,
}

impl BlockCounters {
    /// Creates counters with the given block totals and zero namespace figures.
    pub fn with_blocks(total_blocks: u64, missing_blocks: u64) -> Self {
        Self {
            total_blocks,
            missing_blocks,
            ..Self::default()
        }
    }

    fn validate(&self) -> StatsResult<()> {
        if self.missing_blocks > self.total_blocks {
            return Err(StatsError::InvariantViolation {
                reason: format!(
                    "missing blocks {} exceed total blocks {}",
                    self.missing_blocks, self.total_blocks
                ),
            });
        }
        Ok(())
    }

    fn apply(&self, delta: &BlockDelta) -> StatsResult<BlockCounters> {
        let next = BlockCounters {
            total_blocks: adjust("total_blocks", self.total_blocks, delta.blocks)?,
            missing_blocks: adjust("missing_blocks", self.missing_blocks, delta.missing)?,
            files_and_dirs: adjust("files_and_dirs", self.files_and_dirs, delta.files_and_dirs)?,
            namespace_used_bytes: adjust(
                "namespace_used_bytes",
                self.namespace_used_bytes,
                delta.namespace_used,
            )?,
        };
        next.validate()?;
        Ok(next)
    }
}

fn adjust(counter: &'static str, value: u64, delta: i64) -> StatsResult<u64> {
    value
        .checked_add_signed(delta)
        .ok_or_else(|| StatsError::InvariantViolation {
            reason: format!("{} {} cannot absorb delta {}", counter, value, delta),
        })
}

/// Signed adjustment of every census counter.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockDelta {
    /// Change in total blocks.
    pub blocks: i64,
    /// Change in missing blocks.
    pub missing: i64,
    /// Change in files and directories.
    pub files_and_dirs: i64,
    /// Change in namespace-used bytes.
    pub namespace_used: i64,
}

impl BlockDelta {
    /// Creates a delta from its four components.
    pub fn new(blocks: i64, missing: i64, files_and_dirs: i64, namespace_used: i64) -> Self {
        Self {
            blocks,
            missing,
            files_and_dirs,
            namespace_used,
        }
    }

    /// Whether applying the delta changes nothing.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Block and namespace counters shared by the namespace and replication paths.
pub struct BlockCensus {
    counters: Mutex<BlockCounters>,
}

impl BlockCensus {
    /// Creates a census with every counter at zero.
    pub fn new() -> Self {
        Self {
            counters: Mutex::new(BlockCounters::default()),
        }
    }

    /// Creates a census seeded with existing counters.
    pub fn with_counters(initial: BlockCounters) -> StatsResult<Self> {
        initial.validate()?;
        Ok(Self {
            counters: Mutex::new(initial),
        })
    }

    /// Applies a delta to all four counters at once.
    ///
    /// Returns the updated counters. If any counter would go negative or
    /// missing blocks would exceed total blocks, nothing is changed and
    /// [`StatsError::InvariantViolation`] is returned.
    pub fn apply_delta(&self, delta: BlockDelta) -> StatsResult<BlockCounters> {
        let mut counters = self.counters.lock();
        match counters.apply(&delta) {
            Ok(next) => {
                *counters = next;
                tracing::trace!(?delta, "block census delta applied");
                Ok(next)
            }
            Err(e) => {
                tracing::warn!(?delta, current = ?*counters, error = %e, "block census delta rejected");
                Err(e)
            }
        }
    }

    /// Replaces every counter, e.g. after a full block report on restart.
    pub fn reset(&self, counters: BlockCounters) -> StatsResult<()> {
        if let Err(e) = counters.validate() {
            tracing::warn!(?counters, error = %e, "block census reset rejected");
            return Err(e);
        }
        *self.counters.lock() = counters;
        tracing::info!(?counters, "block census reset");
        Ok(())
    }

    /// Consistent copy of the counters.
    pub fn snapshot(&self) -> BlockCounters {
        *self.counters.lock()
    }
}

impl Default for BlockCensus {
    fn default() -> Self {
        Self::new()
    }
}
