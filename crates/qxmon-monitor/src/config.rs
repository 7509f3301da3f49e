//! Poll schedule configuration.
//!
//! All values here are wall-clock. Deadlines are ledger ticks and live on
//! the task, not in the config.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{MonitorError, MonitorResult};

/// Task monitor configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Wait between poll iterations (ms). Default: 2000.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Minimum gap between two polls of one task when a push hint arrives
    /// early (ms). Default: 250.
    #[serde(default = "default_min_poll_gap_ms")]
    pub min_poll_gap_ms: u64,

    /// Cap for the doubling backoff applied after consecutive read
    /// failures (ms). Default: 15,000.
    #[serde(default = "default_error_backoff_max_ms")]
    pub error_backoff_max_ms: u64,

    /// Wall-clock ceiling per task (ms), the fallback against a stalled
    /// tick clock. Default: 600,000 (10 minutes).
    #[serde(default = "default_max_wall_clock_ms")]
    pub max_wall_clock_ms: u64,

    /// Optional cap on poll iterations per task.
    #[serde(default)]
    pub max_polls: Option<u32>,
}

fn default_poll_interval_ms() -> u64 {
    2_000
}

fn default_min_poll_gap_ms() -> u64 {
    250
}

fn default_error_backoff_max_ms() -> u64 {
    15_000
}

fn default_max_wall_clock_ms() -> u64 {
    600_000
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            min_poll_gap_ms: default_min_poll_gap_ms(),
            error_backoff_max_ms: default_error_backoff_max_ms(),
            max_wall_clock_ms: default_max_wall_clock_ms(),
            max_polls: None,
        }
    }
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn min_poll_gap(&self) -> Duration {
        Duration::from_millis(self.min_poll_gap_ms)
    }

    pub fn max_wall_clock(&self) -> Duration {
        Duration::from_millis(self.max_wall_clock_ms)
    }

    /// Wait before the next poll after `consecutive_errors` failed reads.
    ///
    /// `poll_interval * 2^errors`, capped at `error_backoff_max`, and never
    /// shorter than `poll_interval`.
    pub fn backoff(&self, consecutive_errors: u32) -> Duration {
        let base = self.poll_interval_ms;
        if consecutive_errors == 0 {
            return Duration::from_millis(base);
        }
        let factor = 1u64 << consecutive_errors.min(16);
        let scaled = base.saturating_mul(factor);
        Duration::from_millis(scaled.min(self.error_backoff_max_ms.max(base)))
    }

    /// Reject schedules that would spin or never poll.
    pub fn validate(&self) -> MonitorResult<()> {
        if self.poll_interval_ms == 0 {
            return Err(MonitorError::InvalidConfig(
                "poll_interval_ms must be > 0".to_string(),
            ));
        }
        if self.min_poll_gap_ms > self.poll_interval_ms {
            return Err(MonitorError::InvalidConfig(format!(
                "min_poll_gap_ms ({}) exceeds poll_interval_ms ({})",
                self.min_poll_gap_ms, self.poll_interval_ms
            )));
        }
        if self.max_wall_clock_ms < self.poll_interval_ms {
            return Err(MonitorError::InvalidConfig(
                "max_wall_clock_ms must cover at least one poll interval".to_string(),
            ));
        }
        if self.max_polls == Some(0) {
            return Err(MonitorError::InvalidConfig(
                "max_polls must be > 0 when set".to_string(),
            ));
        }
        Ok(())
    }
}
