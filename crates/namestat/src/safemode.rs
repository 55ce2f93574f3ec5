//! Safe mode state machine.
//!
//! Off -> On (startup or administrator) -> ExtensionPending (enough blocks
//! reported) -> Off (extension window elapsed or administrator). An
//! administrator may also leave directly from On. Anything else is refused
//! and the state is kept.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::{StatsError, StatsResult};
use crate::types::Timestamp;

/// Whether the namespace currently refuses structural mutations.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SafeModeState {
    /// Normal operation.
    Off,
    /// Waiting for block reports, or held by an administrator.
    On,
    /// Threshold reached; leaving once the extension window elapses.
    ExtensionPending,
}

impl SafeModeState {
    fn can_transition_to(self, target: SafeModeState) -> bool {
        use SafeModeState::*;
        matches!(
            (self, target),
            (Off, On) | (On, ExtensionPending) | (ExtensionPending, Off) | (On, Off)
        )
    }
}

impl fmt::Display for SafeModeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SafeModeState::Off => "Off",
            SafeModeState::On => "On",
            SafeModeState::ExtensionPending => "ExtensionPending",
        };
        write!(f, "{}", s)
    }
}

/// Safe mode state together with its operator-facing description.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SafeModeStatus {
    /// Current state.
    pub state: SafeModeState,
    /// Human-readable status line.
    pub text: String,
}

impl SafeModeStatus {
    /// Whether safe mode is in effect.
    pub fn is_on(&self) -> bool {
        self.state != SafeModeState::Off
    }
}

/// Thresholds for leaving startup safe mode automatically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafeModeConfig {
    /// Fraction of blocks (0..=1) that must be reported safe.
    pub threshold_pct: f64,
    /// Seconds to stay in safe mode after the thresholds are met.
    pub extension_secs: u64,
    /// Live nodes required before leaving.
    pub min_live_nodes: usize,
}

impl Default for SafeModeConfig {
    fn default() -> Self {
        Self {
            threshold_pct: 0.999,
            extension_secs: 30,
            min_live_nodes: 0,
        }
    }
}

impl SafeModeConfig {
    /// Length of the extension window.
    pub fn extension(&self) -> Duration {
        Duration::from_secs(self.extension_secs)
    }

    /// Blocks that must be reported safe out of `total_blocks`.
    pub fn block_threshold(&self, total_blocks: u64) -> u64 {
        (total_blocks as f64 * self.threshold_pct) as u64
    }

    /// Checks the configured values.
    pub fn validate(&self) -> StatsResult<()> {
        if !(0.0..=1.0).contains(&self.threshold_pct) {
            return Err(StatsError::Config(format!(
                "safemode threshold_pct {} must be within 0..=1",
                self.threshold_pct
            )));
        }
        Ok(())
    }
}

#[derive(Debug)]
struct Inner {
    state: SafeModeState,
    manual: bool,
    safe_blocks: u64,
    total_blocks: u64,
    live_nodes: usize,
    extension_deadline: Option<Timestamp>,
}

/// Tracks safe mode and the block reports that drive it.
pub struct SafeModeTracker {
    config: SafeModeConfig,
    inner: Mutex<Inner>,
}

impl SafeModeTracker {
    /// Creates a tracker in the Off state.
    pub fn new(config: SafeModeConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: SafeModeState::Off,
                manual: false,
                safe_blocks: 0,
                total_blocks: 0,
                live_nodes: 0,
                extension_deadline: None,
            }),
        }
    }

    /// Thresholds in use.
    pub fn config(&self) -> &SafeModeConfig {
        &self.config
    }

    /// Enters safe mode at startup; it leaves automatically once the
    /// thresholds are met.
    pub fn enter_startup(&self) -> StatsResult<()> {
        self.enter(false)
    }

    /// Enters safe mode on administrator request; only an administrator
    /// can leave it.
    pub fn enter_manual(&self) -> StatsResult<()> {
        self.enter(true)
    }

    fn enter(&self, manual: bool) -> StatsResult<()> {
        let mut inner = self.inner.lock();
        if inner.state == SafeModeState::On {
            inner.manual |= manual;
            return Ok(());
        }
        self.apply(&mut inner, SafeModeState::On, Timestamp::now())?;
        inner.manual = manual;
        Ok(())
    }

    /// Administrative exit from On or ExtensionPending.
    pub fn leave(&self) -> StatsResult<()> {
        self.transition_to(SafeModeState::Off, Timestamp::now())
    }

    /// Forced administrative exit, accepted from any state.
    ///
    /// Returns the state that was left.
    pub fn force_leave(&self) -> SafeModeState {
        let mut inner = self.inner.lock();
        let previous = inner.state;
        inner.state = SafeModeState::Off;
        inner.manual = false;
        inner.extension_deadline = None;
        tracing::warn!(from = %previous, "safe mode forced off");
        previous
    }

    /// Moves to `target` if the edge is allowed.
    ///
    /// Requesting the current state is accepted and changes nothing. Entering
    /// ExtensionPending starts the extension window at `now`.
    pub fn transition_to(&self, target: SafeModeState, now: Timestamp) -> StatsResult<()> {
        let mut inner = self.inner.lock();
        self.apply(&mut inner, target, now)
    }

    fn apply(&self, inner: &mut Inner, target: SafeModeState, now: Timestamp) -> StatsResult<()> {
        let from = inner.state;
        if from == target {
            return Ok(());
        }
        if !from.can_transition_to(target) {
            tracing::warn!(from = %from, to = %target, "rejected safe mode transition");
            return Err(StatsError::InvalidTransition { from, to: target });
        }

        inner.state = target;
        match target {
            SafeModeState::ExtensionPending => {
                inner.extension_deadline = Some(now + self.config.extension());
            }
            SafeModeState::Off => {
                inner.manual = false;
                inner.extension_deadline = None;
            }
            SafeModeState::On => {
                inner.extension_deadline = None;
            }
        }
        tracing::info!(from = %from, to = %target, "safe mode transition");
        Ok(())
    }

    /// Records the latest block report figures.
    ///
    /// In automatic safe mode, reaching both the block threshold and the
    /// live node minimum starts the extension window. Returns the state
    /// after the report.
    pub fn report_blocks(
        &self,
        safe_blocks: u64,
        total_blocks: u64,
        live_nodes: usize,
        now: Timestamp,
    ) -> SafeModeState {
        let mut inner = self.inner.lock();
        inner.safe_blocks = safe_blocks;
        inner.total_blocks = total_blocks;
        inner.live_nodes = live_nodes;

        if inner.state == SafeModeState::On && !inner.manual && self.thresholds_met(&inner) {
            tracing::debug!(safe_blocks, total_blocks, live_nodes, "safe mode thresholds reached");
            if let Err(e) = self.apply(&mut inner, SafeModeState::ExtensionPending, now) {
                tracing::error!(error = %e, "could not start safe mode extension");
            }
        }
        inner.state
    }

    /// Leaves safe mode if the extension window has elapsed at `now`.
    /// Returns whether safe mode was left.
    pub fn tick(&self, now: Timestamp) -> bool {
        let mut inner = self.inner.lock();
        match (inner.state, inner.extension_deadline) {
            (SafeModeState::ExtensionPending, Some(deadline)) if now >= deadline => {
                self.apply(&mut inner, SafeModeState::Off, now).is_ok()
            }
            _ => false,
        }
    }

    /// Whether safe mode is in effect.
    pub fn is_on(&self) -> bool {
        self.inner.lock().state != SafeModeState::Off
    }

    /// Current state and its description.
    pub fn current_state(&self) -> SafeModeStatus {
        self.current_state_at(Timestamp::now())
    }

    /// Current state, describing the extension window relative to `now`.
    pub fn current_state_at(&self, now: Timestamp) -> SafeModeStatus {
        let inner = self.inner.lock();
        SafeModeStatus {
            state: inner.state,
            text: self.describe(&inner, now),
        }
    }

    fn blocks_met(&self, inner: &Inner) -> bool {
        inner.safe_blocks >= self.config.block_threshold(inner.total_blocks)
    }

    fn nodes_met(&self, inner: &Inner) -> bool {
        inner.live_nodes >= self.config.min_live_nodes
    }

    fn thresholds_met(&self, inner: &Inner) -> bool {
        self.blocks_met(inner) && self.nodes_met(inner)
    }

    fn describe(&self, inner: &Inner, now: Timestamp) -> String {
        match inner.state {
            SafeModeState::Off => "Safe mode is OFF.".to_string(),
            SafeModeState::On if inner.manual => "Safe mode is ON. It was turned on manually. \
                 Use the administrative leave command to turn safe mode off."
                .to_string(),
            SafeModeState::On => {
                let mut text = String::from("Safe mode is ON. ");
                text.push_str(&self.describe_blocks(inner));
                if !self.nodes_met(inner) {
                    text.push_str(&format!(
                        " The number of live nodes {} needs an additional {} live nodes to reach the minimum number {}.",
                        inner.live_nodes,
                        self.config.min_live_nodes - inner.live_nodes,
                        self.config.min_live_nodes
                    ));
                }
                text.push_str(" Safe mode will be turned off automatically once the thresholds have been reached.");
                text
            }
            SafeModeState::ExtensionPending => {
                let remaining = inner
                    .extension_deadline
                    .map(|d| d.saturating_since(now).as_secs())
                    .unwrap_or(0);
                format!(
                    "Safe mode is ON. {} Safe mode will be turned off automatically in {} seconds.",
                    self.describe_blocks(inner),
                    remaining
                )
            }
        }
    }

    fn describe_blocks(&self, inner: &Inner) -> String {
        let threshold = self.config.block_threshold(inner.total_blocks);
        if inner.safe_blocks >= threshold {
            format!(
                "The reported blocks {} has reached the threshold {:.4} of total blocks {}.",
                inner.safe_blocks, self.config.threshold_pct, inner.total_blocks
            )
        } else {
            format!(
                "The reported blocks {} needs additional {} blocks to reach the threshold {:.4} of total blocks {}.",
                inner.safe_blocks,
                threshold - inner.safe_blocks,
                self.config.threshold_pct,
                inner.total_blocks
            )
        }
    }
}

impl Default for SafeModeTracker {
    fn default() -> Self {
        Self::new(SafeModeConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(secs: u64) -> Timestamp {
        Timestamp::from_secs(secs)
    }

    #[test]
    fn test_starts_off() {
        let tracker = SafeModeTracker::default();
        let status = tracker.current_state();
        assert_eq!(status.state, SafeModeState::Off);
        assert_eq!(status.text, "Safe mode is OFF.");
        assert!(!tracker.is_on());
    }

    #[test]
    fn test_full_lifecycle() {
        let tracker = SafeModeTracker::default();
        tracker.transition_to(SafeModeState::On, t(0)).unwrap();
        tracker
            .transition_to(SafeModeState::ExtensionPending, t(1))
            .unwrap();
        tracker.transition_to(SafeModeState::Off, t(2)).unwrap();
        assert_eq!(tracker.current_state().state, SafeModeState::Off);
    }

    #[test]
    fn test_extension_pending_to_on_rejected() {
        let tracker = SafeModeTracker::default();
        tracker.transition_to(SafeModeState::On, t(0)).unwrap();
        tracker
            .transition_to(SafeModeState::ExtensionPending, t(1))
            .unwrap();

        let result = tracker.transition_to(SafeModeState::On, t(2));
        assert!(matches!(
            result,
            Err(StatsError::InvalidTransition {
                from: SafeModeState::ExtensionPending,
                to: SafeModeState::On
            })
        ));
        assert_eq!(
            tracker.current_state().state,
            SafeModeState::ExtensionPending
        );
    }

    #[test]
    fn test_off_to_extension_rejected() {
        let tracker = SafeModeTracker::default();
        let result = tracker.transition_to(SafeModeState::ExtensionPending, t(0));
        assert!(result.is_err());
        assert_eq!(tracker.current_state().state, SafeModeState::Off);
    }

    #[test]
    fn test_same_state_is_noop() {
        let tracker = SafeModeTracker::default();
        tracker.transition_to(SafeModeState::Off, t(0)).unwrap();
        tracker.enter_startup().unwrap();
        tracker.enter_startup().unwrap();
        assert_eq!(tracker.current_state().state, SafeModeState::On);
    }

    #[test]
    fn test_force_leave_from_any_state() {
        let tracker = SafeModeTracker::default();
        assert_eq!(tracker.force_leave(), SafeModeState::Off);

        tracker.enter_manual().unwrap();
        assert_eq!(tracker.force_leave(), SafeModeState::On);

        tracker.enter_startup().unwrap();
        tracker
            .transition_to(SafeModeState::ExtensionPending, t(0))
            .unwrap();
        assert_eq!(tracker.force_leave(), SafeModeState::ExtensionPending);
        assert!(!tracker.is_on());
    }

    #[test]
    fn test_leave_from_on() {
        let tracker = SafeModeTracker::default();
        tracker.enter_startup().unwrap();
        tracker.leave().unwrap();
        assert!(!tracker.is_on());
    }

    #[test]
    fn test_report_blocks_starts_extension() {
        let tracker = SafeModeTracker::default();
        tracker.enter_startup().unwrap();

        let state = tracker.report_blocks(500, 1000, 3, t(100));
        assert_eq!(state, SafeModeState::On);

        let state = tracker.report_blocks(1000, 1000, 3, t(110));
        assert_eq!(state, SafeModeState::ExtensionPending);

        assert!(!tracker.tick(t(139)));
        assert!(tracker.tick(t(140)));
        assert_eq!(tracker.current_state().state, SafeModeState::Off);
    }

    #[test]
    fn test_repeated_reports_keep_extension_deadline() {
        let tracker = SafeModeTracker::default();
        tracker.enter_startup().unwrap();
        tracker.report_blocks(1000, 1000, 1, t(100));

        assert_eq!(
            tracker.report_blocks(1000, 1000, 1, t(120)),
            SafeModeState::ExtensionPending
        );
        assert!(tracker.current_state_at(t(120)).text.contains("in 10 seconds"));
        assert!(tracker.tick(t(130)));
    }

    #[test]
    fn test_report_blocks_waits_for_live_nodes() {
        let tracker = SafeModeTracker::new(SafeModeConfig {
            min_live_nodes: 2,
            ..SafeModeConfig::default()
        });
        tracker.enter_startup().unwrap();

        assert_eq!(tracker.report_blocks(10, 10, 1, t(0)), SafeModeState::On);
        let text = tracker.current_state_at(t(0)).text;
        assert!(text.contains("needs an additional 1 live nodes"));

        assert_eq!(
            tracker.report_blocks(10, 10, 2, t(1)),
            SafeModeState::ExtensionPending
        );
    }

    #[test]
    fn test_empty_namespace_meets_threshold() {
        let tracker = SafeModeTracker::default();
        tracker.enter_startup().unwrap();
        assert_eq!(
            tracker.report_blocks(0, 0, 0, t(0)),
            SafeModeState::ExtensionPending
        );
    }

    #[test]
    fn test_manual_safe_mode_does_not_leave_automatically() {
        let tracker = SafeModeTracker::default();
        tracker.enter_manual().unwrap();

        assert_eq!(tracker.report_blocks(10, 10, 5, t(0)), SafeModeState::On);
        assert!(!tracker.tick(t(1000)));
        assert!(tracker.current_state().text.contains("manually"));
    }

    #[test]
    fn test_tick_outside_extension_is_noop() {
        let tracker = SafeModeTracker::default();
        assert!(!tracker.tick(t(10)));
        tracker.enter_startup().unwrap();
        assert!(!tracker.tick(t(10)));
        assert!(tracker.is_on());
    }

    #[test]
    fn test_text_describes_needed_blocks() {
        let tracker = SafeModeTracker::default();
        tracker.enter_startup().unwrap();
        tracker.report_blocks(500, 1000, 1, t(0));

        let text = tracker.current_state_at(t(0)).text;
        assert!(text.starts_with("Safe mode is ON."));
        assert!(text.contains("needs additional 499 blocks"));
        assert!(text.contains("0.9990"));
    }

    #[test]
    fn test_text_counts_down_extension() {
        let tracker = SafeModeTracker::default();
        tracker.enter_startup().unwrap();
        tracker.report_blocks(1000, 1000, 1, t(100));

        let text = tracker.current_state_at(t(110)).text;
        assert!(text.contains("has reached the threshold"));
        assert!(text.contains("in 20 seconds"));
    }

    #[test]
    fn test_config_validate() {
        assert!(SafeModeConfig::default().validate().is_ok());
        let bad = SafeModeConfig {
            threshold_pct: 1.5,
            ..SafeModeConfig::default()
        };
        assert!(matches!(bad.validate(), Err(StatsError::Config(_))));
    }

    #[test]
    fn test_block_threshold() {
        let config = SafeModeConfig::default();
        assert_eq!(config.block_threshold(1000), 999);
        assert_eq!(config.block_threshold(0), 0);
    }
}
