use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ledger::BetLimits;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_SUBMISSION_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_HISTORY_LIMIT: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("poll_interval must be non-zero")]
    ZeroPollInterval,
    #[error("submission_timeout must be non-zero")]
    ZeroSubmissionTimeout,
    #[error("history_limit must be at least 1")]
    ZeroHistoryLimit,
    #[error("bet limits are inverted: min {min} > max {max}")]
    InvertedBetLimits { min: u128, max: u128 },
}

/// Client tuning knobs; defaults match the production deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Interval of the authoritative full-state reload. Bounds how stale
    /// the view can get when events are dropped.
    pub poll_interval: Duration,
    /// Local watchdog on each submission; expiry surfaces `Timeout` and
    /// re-enables actions without resubmitting.
    pub submission_timeout: Duration,
    /// Completed rounds retained in the session history.
    pub history_limit: usize,
    /// Overrides the limits reported by the ledger when set.
    pub bet_limits: Option<BetLimits>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            submission_timeout: DEFAULT_SUBMISSION_TIMEOUT,
            history_limit: DEFAULT_HISTORY_LIMIT,
            bet_limits: None,
        }
    }
}

impl ClientConfig {
    /// Short intervals for test suites driving the loop with paused time.
    pub fn for_tests() -> Self {
        Self {
            poll_interval: Duration::from_millis(25),
            submission_timeout: Duration::from_millis(100),
            history_limit: 8,
            bet_limits: None,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval.is_zero() {
            return Err(ConfigError::ZeroPollInterval);
        }
        if self.submission_timeout.is_zero() {
            return Err(ConfigError::ZeroSubmissionTimeout);
        }
        if self.history_limit == 0 {
            return Err(ConfigError::ZeroHistoryLimit);
        }
        if let Some(limits) = &self.bet_limits {
            if limits.min > limits.max {
                return Err(ConfigError::InvertedBetLimits {
                    min: limits.min,
                    max: limits.max,
                });
            }
        }
        Ok(())
    }
}
