use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{StatsError, StatsResult};
use crate::safemode::SafeModeConfig;
use crate::service::ServiceInfo;

/// Top-level configuration, read from TOML or JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamestatConfig {
    /// Expected interval between heartbeats of a worker node.
    pub heartbeat_interval_secs: u64,
    /// How often the liveness monitor re-checks heartbeats.
    pub heartbeat_recheck_interval_secs: u64,
    /// Safe mode thresholds.
    pub safemode: SafeModeConfig,
    /// Pass-through identity of this master node.
    pub service: ServiceInfo,
}

impl Default for NamestatConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: 3,
            heartbeat_recheck_interval_secs: 300,
            safemode: SafeModeConfig::default(),
            service: ServiceInfo::default(),
        }
    }
}

impl NamestatConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        let config: NamestatConfig = match ext.to_lowercase().as_str() {
            "toml" => toml::from_str(&contents)?,
            "json" => serde_json::from_str(&contents)?,
            _ => anyhow::bail!("Unsupported config file extension: {}", ext),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> StatsResult<()> {
        if self.heartbeat_interval_secs == 0 {
            return Err(StatsError::Config(
                "heartbeat_interval_secs must be positive".to_string(),
            ));
        }
        if self.heartbeat_recheck_interval_secs == 0 {
            return Err(StatsError::Config(
                "heartbeat_recheck_interval_secs must be positive".to_string(),
            ));
        }
        self.safemode.validate()
    }

    /// Silence after which a Live node is declared dead:
    /// twice the recheck interval plus ten heartbeat intervals.
    pub fn heartbeat_expiry(&self) -> Duration {
        Duration::from_secs(
            self.heartbeat_recheck_interval_secs
                .saturating_mul(2)
                .saturating_add(self.heartbeat_interval_secs.saturating_mul(10)),
        )
    }

    pub fn recheck_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_recheck_interval_secs)
    }
}
