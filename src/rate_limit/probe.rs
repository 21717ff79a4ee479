//! One-shot calibration of the endpoint's request ceiling.
//!
//! Sends the same query sequentially at a fixed cadence until the endpoint
//! throttles or the target count is reached. The result is advisory: it only
//! seeds the pacer's base delay.

use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::oracle::{Oracle, OracleError};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProbeError {
    #[error("throttled on the first probe request; no safe rate could be measured")]
    NoHeadroom,
    #[error("probe target count must be positive")]
    EmptyTarget,
    #[error("rate budget does not fit in a duration; check safety_factor and window")]
    BudgetOverflow,
}

/// Probe parameters.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Span the whole probe should take at full count.
    pub target_duration: Duration,
    /// Number of requests to send if no throttling occurs.
    pub target_count: u32,
    /// Prefix queried on every probe request.
    pub prefix: String,
    /// Window the endpoint's ceiling is assumed to be counted over.
    pub window: Duration,
    /// Multiplier (>= 1.0) applied to a measured interval.
    pub safety_factor: f64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            target_duration: Duration::from_secs(300),
            target_count: 500,
            prefix: "a".to_string(),
            window: Duration::from_secs(60),
            safety_factor: 1.2,
        }
    }
}

impl ProbeConfig {
    /// Spacing between probe requests.
    pub fn cadence(&self) -> Duration {
        if self.target_count == 0 {
            return self.target_duration;
        }
        self.target_duration / self.target_count
    }
}

/// What the probe observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    /// Requests sent, including the throttled one.
    pub requests_sent: u32,
    /// 1-based index of the first throttled request.
    pub throttled_at: Option<u32>,
    /// Wall time from the first request to the last response.
    pub elapsed: Duration,
    /// Requests that failed for reasons other than throttling.
    pub other_failures: u32,
}

impl ProbeReport {
    /// Derive the dispatch interval to use for the main run.
    ///
    /// Without throttling the probe cadence itself is safe. A throttle at
    /// request `k` is read as a ceiling of `k - 1` requests per window.
    pub fn rate_budget(&self, config: &ProbeConfig) -> Result<Duration, ProbeError> {
        let cadence = config.cadence();
        match self.throttled_at {
            None => Ok(cadence),
            Some(k) if k <= 1 => Err(ProbeError::NoHeadroom),
            Some(k) => {
                let per_request = (config.window / (k - 1)).max(cadence);
                let secs = per_request.as_secs_f64() * config.safety_factor.max(1.0);
                Duration::try_from_secs_f64(secs).map_err(|_| ProbeError::BudgetOverflow)
            }
        }
    }
}

/// Run the probe against `oracle`.
pub async fn probe(oracle: &dyn Oracle, config: &ProbeConfig) -> Result<ProbeReport, ProbeError> {
    if config.target_count == 0 {
        return Err(ProbeError::EmptyTarget);
    }

    let slot = config.cadence();
    let start = Instant::now();
    let mut other_failures = 0;

    for i in 0..config.target_count {
        let sent = i + 1;
        match oracle.query(&config.prefix).await {
            Ok(words) => {
                info!("Probe request {}: ok ({} words)", sent, words.len());
            }
            Err(OracleError::Throttled(status)) => {
                warn!("Probe throttled (HTTP {}) after {} requests", status, sent);
                return Ok(ProbeReport {
                    requests_sent: sent,
                    throttled_at: Some(sent),
                    elapsed: start.elapsed(),
                    other_failures,
                });
            }
            Err(e) => {
                other_failures += 1;
                warn!("Probe request {} failed: {}", sent, e);
            }
        }

        // Sleep off the rest of this request's slot to hold the average rate.
        let due = start + slot * sent;
        let now = Instant::now();
        if due > now {
            tokio::time::sleep(due - now).await;
        }
    }

    info!(
        "Probe completed {} requests without throttling",
        config.target_count
    );
    Ok(ProbeReport {
        requests_sent: config.target_count,
        throttled_at: None,
        elapsed: start.elapsed(),
        other_failures,
    })
}
