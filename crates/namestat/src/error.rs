//! Error types for the statistics core.

use thiserror::Error;

use crate::safemode::SafeModeState;

/// Result type alias for statistics operations.
pub type StatsResult<T> = Result<T, StatsError>;

/// Error variants for statistics operations.
///
/// None of these ever reach a snapshot consumer; they are returned to the
/// subsystem that attempted the mutation.
#[derive(Debug, Error)]
pub enum StatsError {
    /// A block census delta would break a counter invariant.
    #[error("invariant violation: {reason}")]
    InvariantViolation {
        /// Description of the broken invariant.
        reason: String,
    },

    /// A safe mode transition was requested out of order.
    #[error("invalid safe mode transition from {from} to {to}")]
    InvalidTransition {
        /// State the tracker was in.
        from: SafeModeState,
        /// State that was requested.
        to: SafeModeState,
    },

    /// Configuration values are out of range.
    #[error("config error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_result_alias() {
        let ok: StatsResult<u64> = Ok(7);
        assert!(ok.is_ok());

        let err: StatsResult<u64> = Err(StatsError::Config("bad".to_string()));
        assert!(err.is_err());
    }

    #[test]
    fn test_invariant_violation_display() {
        let err = StatsError::InvariantViolation {
            reason: "missing blocks 35 exceed total blocks 15".to_string(),
        };
        assert_eq!(
            format!("{}", err),
            "invariant violation: missing blocks 35 exceed total blocks 15"
        );
    }

    #[test]
    fn test_invalid_transition_display() {
        let err = StatsError::InvalidTransition {
            from: SafeModeState::ExtensionPending,
            to: SafeModeState::On,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("ExtensionPending"));
        assert!(msg.contains("On"));
    }

    #[test]
    fn test_config_error_display() {
        let err = StatsError::Config("threshold_pct must be within 0..=1".to_string());
        assert_eq!(
            format!("{}", err),
            "config error: threshold_pct must be within 0..=1"
        );
    }
}
