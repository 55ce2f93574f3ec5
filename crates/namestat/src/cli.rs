use crate::config::NamestatConfig;
use crate::events::{replay, ClusterEvent, ReplayReport};
use crate::monitor::LivenessMonitor;
use crate::service::{NameNodeStatus, RuntimeFacts};
use crate::state::ClusterState;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "namestat")]
#[command(about = "Cluster statistics snapshot engine", long_about = None)]
pub struct Cli {
    #[arg(short, long, env = "NAMESTAT_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Apply a JSON array of cluster events and print the resulting status.
    Replay {
        events: PathBuf,
        #[arg(long)]
        compact: bool,
    },
    /// Replay events, then keep the liveness monitor running and log a
    /// summary on every interval until interrupted.
    Watch {
        events: Option<PathBuf>,
        #[arg(short, long, default_value = "5", value_parser = clap::value_parser!(u64).range(1..))]
        interval_secs: u64,
    },
    /// Load a configuration file and print the effective values.
    CheckConfig { path: PathBuf },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        match self.command {
            Command::Replay {
                ref events,
                compact,
            } => {
                let config = load_config(self.config.as_deref())?;
                let (status, report) = replay_file(&config, events)?;
                if !report.rejected.is_empty() {
                    tracing::warn!(
                        applied = report.applied,
                        rejected = report.rejected.len(),
                        "some events were rejected"
                    );
                }
                let out = if compact {
                    serde_json::to_string(&status)?
                } else {
                    serde_json::to_string_pretty(&status)?
                };
                println!("{}", out);
                Ok(())
            }
            Command::Watch {
                ref events,
                interval_secs,
            } => {
                let config = load_config(self.config.as_deref())?;
                watch(&config, events.as_deref(), Duration::from_secs(interval_secs)).await
            }
            Command::CheckConfig { ref path } => {
                let config = NamestatConfig::from_file(path)?;
                println!("{}", toml::to_string_pretty(&config)?);
                println!(
                    "# heartbeat expiry: {}s",
                    config.heartbeat_expiry().as_secs()
                );
                Ok(())
            }
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<NamestatConfig> {
    match path {
        Some(path) if path.exists() => NamestatConfig::from_file(path),
        Some(path) => {
            tracing::warn!("Config file not found, using defaults: {}", path.display());
            Ok(NamestatConfig::default())
        }
        None => Ok(NamestatConfig::default()),
    }
}

fn read_events(path: &Path) -> Result<Vec<ClusterEvent>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("reading events from {}", path.display()))?;
    let events: Vec<ClusterEvent> = serde_json::from_str(&contents)
        .with_context(|| format!("parsing events in {}", path.display()))?;
    Ok(events)
}

/// Builds a fresh cluster state, replays the events in `path` and composes
/// the resulting management view.
pub fn replay_file(config: &NamestatConfig, path: &Path) -> Result<(NameNodeStatus, ReplayReport)> {
    let state = ClusterState::new(config.safemode.clone())?;
    let events = read_events(path)?;
    let report = replay(&state, &events);
    let snapshot = state.aggregator().take_snapshot();
    let status = NameNodeStatus::compose(&snapshot, &config.service, &RuntimeFacts::collect());
    Ok((status, report))
}

async fn watch(config: &NamestatConfig, events: Option<&Path>, interval: Duration) -> Result<()> {
    anyhow::ensure!(!interval.is_zero(), "watch interval must be at least one second");
    let state = ClusterState::new(config.safemode.clone())?;
    if let Some(path) = events {
        let report = replay(&state, &read_events(path)?);
        tracing::info!(applied = report.applied, rejected = report.rejected.len(), "events replayed");
    }

    let monitor = LivenessMonitor::new(state.clone(), config).start();
    let aggregator = state.aggregator();
    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let snap = aggregator.take_snapshot();
                tracing::info!(
                    live = snap.live_nodes.len(),
                    dead = snap.dead_nodes.len(),
                    decom = snap.decom_nodes.len(),
                    total = snap.total(),
                    used = snap.used(),
                    percent_used = snap.percent_used,
                    blocks = snap.blocks.total_blocks,
                    missing = snap.blocks.missing_blocks,
                    safemode = %snap.safemode.state,
                    "cluster"
                );
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted, shutting down");
                break;
            }
        }
    }

    let stats = monitor.shutdown().await;
    tracing::info!(checks = stats.checks, nodes_expired = stats.nodes_expired, "monitor stopped");
    Ok(())
}
