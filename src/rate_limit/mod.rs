//! Global dispatch pacing with adaptive backoff.
//!
//! Every dispatch passes through one gate that spaces dispatch starts by at
//! least the current delay. Repeated throttling widens the delay; sustained
//! success shrinks it back towards the configured budget, never below it.

mod config;
pub mod probe;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub use config::{checked_rpm_interval, rpm_to_interval, PacerConfig, PacerStats};
pub use probe::{probe, ProbeConfig, ProbeError, ProbeReport};

#[derive(Debug)]
struct PacerState {
    current_delay: Duration,
    consecutive_throttles: u32,
    consecutive_successes: u32,
    in_backoff: bool,
    total_dispatches: u64,
    throttle_hits: u64,
}

impl PacerState {
    fn new(base_delay: Duration) -> Self {
        Self {
            current_delay: base_delay,
            consecutive_throttles: 0,
            consecutive_successes: 0,
            in_backoff: false,
            total_dispatches: 0,
            throttle_hits: 0,
        }
    }
}

/// `delay * factor`, saturating at `ceiling`.
fn scale(delay: Duration, factor: f64, ceiling: Duration) -> Duration {
    Duration::try_from_secs_f64(delay.as_secs_f64() * factor)
        .unwrap_or(ceiling)
        .min(ceiling)
}

/// Single shared pacing gate.
///
/// The gate (time of the last dispatch) and the adaptive state live behind
/// separate locks: a caller sleeping in [`Pacer::acquire`] holds only the
/// gate, so outcome reports never wait on it.
#[derive(Debug, Clone)]
pub struct Pacer {
    config: PacerConfig,
    gate: Arc<Mutex<Option<Instant>>>,
    state: Arc<Mutex<PacerState>>,
}

impl Pacer {
    pub fn new(config: PacerConfig) -> Self {
        let state = PacerState::new(config.base_delay);
        Self {
            config,
            gate: Arc::new(Mutex::new(None)),
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn config(&self) -> &PacerConfig {
        &self.config
    }

    /// Wait for the next dispatch slot, then mark the dispatch as started.
    ///
    /// The gate is held across the wait so that concurrent callers are
    /// admitted one at a time, each a full delay after the previous one.
    /// Dropping the future while it waits leaves the gate untouched.
    pub async fn acquire(&self) {
        let mut last_dispatch = self.gate.lock().await;
        if let Some(last) = *last_dispatch {
            // The delay may widen while we sleep; re-read it each round.
            loop {
                let delay = self.state.lock().await.current_delay;
                let wait = match last.checked_add(delay) {
                    Some(ready) => ready.saturating_duration_since(Instant::now()),
                    None => delay,
                };
                if wait.is_zero() {
                    break;
                }
                debug!("Pacing: waiting {:?}", wait);
                tokio::time::sleep(wait).await;
            }
        }
        *last_dispatch = Some(Instant::now());
        self.state.lock().await.total_dispatches += 1;
    }

    /// Report a successful response - may decrease delay.
    pub async fn report_success(&self) {
        let mut state = self.state.lock().await;
        state.consecutive_throttles = 0;
        state.consecutive_successes += 1;

        if state.in_backoff && state.consecutive_successes >= self.config.recovery_threshold {
            let reduced = scale(
                state.current_delay,
                self.config.recovery_multiplier,
                state.current_delay,
            );
            state.current_delay = reduced.max(self.config.base_delay);

            if state.current_delay <= self.config.base_delay {
                state.in_backoff = false;
                state.current_delay = self.config.base_delay;
                info!("Recovered from throttling backoff");
            } else {
                debug!("Dispatch delay reduced to {:?}", state.current_delay);
            }
            state.consecutive_successes = 0;
        }
    }

    /// Report a throttled response. Widens the delay once throttling repeats.
    pub async fn report_throttled(&self) {
        let mut state = self.state.lock().await;
        state.throttle_hits += 1;
        state.consecutive_successes = 0;
        state.consecutive_throttles += 1;

        if state.consecutive_throttles >= self.config.throttle_threshold {
            let ceiling = self.config.max_delay.max(self.config.base_delay);
            let floor = state.current_delay.max(Duration::from_millis(100));
            state.current_delay = scale(floor, self.config.backoff_multiplier, ceiling)
                .max(state.current_delay);
            state.in_backoff = true;
            state.consecutive_throttles = 0;
            warn!(
                "Throttled repeatedly, widening dispatch delay to {:?}",
                state.current_delay
            );
        }
    }

    /// Report a failure that says nothing about rate limits.
    pub async fn report_other_failure(&self) {
        let mut state = self.state.lock().await;
        state.consecutive_successes = 0;
    }

    pub async fn current_delay(&self) -> Duration {
        self.state.lock().await.current_delay
    }

    pub async fn stats(&self) -> PacerStats {
        let state = self.state.lock().await;
        PacerStats {
            current_delay: state.current_delay,
            in_backoff: state.in_backoff,
            total_dispatches: state.total_dispatches,
            throttle_hits: state.throttle_hits,
        }
    }
}
