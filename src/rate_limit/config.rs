//! Pacer configuration and types.

use std::time::Duration;

/// Configuration for dispatch pacing.
#[derive(Debug, Clone)]
pub struct PacerConfig {
    /// Minimum spacing between dispatch starts (the rate budget).
    pub base_delay: Duration,
    /// Maximum delay (ceiling for backoff).
    pub max_delay: Duration,
    /// Multiplier applied to the delay when throttling repeats.
    pub backoff_multiplier: f64,
    /// Consecutive throttled responses before widening the delay.
    pub throttle_threshold: u32,
    /// Multiplier for recovery on success (< 1.0 to decrease delay).
    pub recovery_multiplier: f64,
    /// Number of consecutive successes before reducing delay.
    pub recovery_threshold: u32,
}

impl PacerConfig {
    /// Pacing for a requests-per-minute ceiling.
    pub fn per_minute(requests_per_minute: f64) -> Self {
        Self {
            base_delay: rpm_to_interval(requests_per_minute),
            ..Default::default()
        }
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }
}

impl Default for PacerConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1200),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            throttle_threshold: 3,
            recovery_multiplier: 0.8,
            recovery_threshold: 20,
        }
    }
}

/// Interval between dispatch starts for a requests-per-minute ceiling, or
/// `None` when the rate is not a positive finite number or the interval
/// does not fit in a `Duration`.
pub fn checked_rpm_interval(requests_per_minute: f64) -> Option<Duration> {
    if !requests_per_minute.is_finite() || requests_per_minute <= 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(60.0 / requests_per_minute).ok()
}

/// Like [`checked_rpm_interval`], with unusable rates disabling pacing.
pub fn rpm_to_interval(requests_per_minute: f64) -> Duration {
    checked_rpm_interval(requests_per_minute).unwrap_or(Duration::ZERO)
}

/// Snapshot of pacer state.
#[derive(Debug, Clone)]
pub struct PacerStats {
    pub current_delay: Duration,
    pub in_backoff: bool,
    pub total_dispatches: u64,
    pub throttle_hits: u64,
}
