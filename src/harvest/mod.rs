//! Prefix-expansion harvester.
//!
//! A pool of workers drains the [`Frontier`]. Each worker claims a prefix,
//! queries it through the [`Fetcher`], then hands the result to the
//! [`ExpansionPolicy`], which records new words and queues follow-up prefixes.
//! Frontier, queried set and in-flight count share one lock so that no prefix
//! is ever dispatched twice by two workers.
//!
//! The run ends when the frontier is empty and nothing is in flight, when the
//! run timeout elapses, or when the caller signals shutdown. After a stop no
//! new request is sent: prefixes still waiting for the pacer resolve as
//! cancelled. Requests already sent get `grace_period` to finish before their
//! workers are aborted; aborted prefixes stay queried and are reported as
//! abandoned.

mod expansion;
mod fetcher;
mod frontier;

pub use expansion::{Applied, Expansion, ExpansionPolicy, SiblingPolicy};
pub use fetcher::Fetcher;
pub use frontier::Frontier;

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use futures::future::join_all;
use thiserror::Error;
use tokio::sync::{mpsc, watch, Mutex, Notify};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::oracle::{FailureClass, QueryResult};
use crate::store::DiscoveryStore;

#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("failed to write discovered words: {0}")]
    Store(#[from] io::Error),
    #[error("worker crashed: {0}")]
    Worker(String),
}

/// Engine settings that are not part of the expansion policy.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    /// Concurrent worker tasks.
    pub workers: usize,
    /// Seed every prefix up to this length.
    pub seed_depth: usize,
    /// Wall-clock budget for the whole run.
    pub run_timeout: Option<Duration>,
    /// How long in-flight queries may finish after a stop.
    pub grace_period: Duration,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            workers: 10,
            seed_depth: 1,
            run_timeout: None,
            grace_period: Duration::from_secs(10),
        }
    }
}

/// Progress events, emitted as prefixes move through the run.
#[derive(Debug, Clone)]
pub enum HarvestEvent {
    Dispatched {
        prefix: String,
    },
    Resolved {
        prefix: String,
        new_words: usize,
        total_words: usize,
        pending: usize,
    },
    Failed {
        prefix: String,
        class: FailureClass,
        retrying: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Frontier empty with nothing in flight.
    Exhausted,
    Cancelled,
    TimedOut,
}

/// Summary of a finished run.
#[derive(Debug, Clone)]
pub struct HarvestReport {
    pub stop_reason: StopReason,
    /// Distinct prefixes claimed by a worker, including cancelled ones.
    pub queried: usize,
    pub resolved: usize,
    /// Prefixes that failed terminally.
    pub failed: usize,
    /// Failed attempts that were queued again.
    pub retried: usize,
    /// Claimed prefixes never sent because the run stopped.
    pub cancelled: usize,
    /// Prefixes whose query was cut off by the grace period.
    pub abandoned: usize,
    /// Prefixes still pending when the run stopped.
    pub pending: usize,
    pub new_words: usize,
    pub total_words: usize,
    pub elapsed: Duration,
}

#[derive(Debug, Default)]
struct WorkState {
    frontier: Frontier,
    in_flight: usize,
    /// Attempts made so far, only for prefixes that have failed.
    failures: HashMap<String, u32>,
    resolved: usize,
    failed: usize,
    retried: usize,
    cancelled: usize,
}

struct Shared {
    policy: ExpansionPolicy,
    fetcher: Fetcher,
    store: Arc<DiscoveryStore>,
    work: Mutex<WorkState>,
    changed: Notify,
    stop: watch::Sender<bool>,
    stop_reason: StdMutex<Option<StopReason>>,
    events: Option<mpsc::Sender<HarvestEvent>>,
}

impl Shared {
    fn request_stop(&self, reason: StopReason) {
        if let Ok(mut slot) = self.stop_reason.lock() {
            slot.get_or_insert(reason);
        }
        self.stop.send_replace(true);
    }

    async fn emit(&self, event: HarvestEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event).await;
        }
    }

    /// Claim the next prefix, waiting while other workers may still add work.
    /// Returns `None` once the run is exhausted or stopped.
    async fn claim(&self, stop: &mut watch::Receiver<bool>) -> Option<(String, u32)> {
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if *stop.borrow() {
                return None;
            }
            {
                let mut work = self.work.lock().await;
                if let Some(prefix) = work.frontier.pop() {
                    work.in_flight += 1;
                    let attempt = work.failures.get(&prefix).map_or(1, |n| n + 1);
                    return Some((prefix, attempt));
                }
                if work.in_flight == 0 {
                    return None;
                }
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = stop.changed() => {}
            }
        }
    }

    async fn resolve(
        &self,
        prefix: &str,
        attempt: u32,
        result: QueryResult,
    ) -> Result<(), HarvestError> {
        let class = match &result {
            QueryResult::Failed(f) => Some(f.class),
            QueryResult::Words(_) => None,
        };

        let (applied, pending) = {
            let mut work = self.work.lock().await;
            let work = &mut *work;
            work.in_flight -= 1;
            let applied =
                self.policy
                    .apply(prefix, attempt, result, &mut work.frontier, &self.store);
            match &applied {
                Ok(Applied::Resolved { .. }) => work.resolved += 1,
                Ok(Applied::Retrying(_)) => {
                    work.retried += 1;
                    work.failures.insert(prefix.to_string(), attempt);
                }
                Ok(Applied::Failed(f)) if f.class == FailureClass::Cancelled => {
                    work.cancelled += 1;
                }
                Ok(Applied::Failed(_)) => {
                    work.failed += 1;
                    work.failures.insert(prefix.to_string(), attempt);
                }
                Err(_) => {}
            }
            (applied, work.frontier.len())
        };
        self.changed.notify_waiters();

        let applied = match applied {
            Ok(applied) => applied,
            Err(e) => {
                error!("Stopping run, could not store words for {:?}: {}", prefix, e);
                self.request_stop(StopReason::Cancelled);
                return Err(HarvestError::Store(e));
            }
        };

        let event = match applied {
            Applied::Resolved { new_words, .. } => HarvestEvent::Resolved {
                prefix: prefix.to_string(),
                new_words: new_words.len(),
                total_words: self.store.len(),
                pending,
            },
            Applied::Retrying(_) | Applied::Failed(_) => HarvestEvent::Failed {
                prefix: prefix.to_string(),
                class: class.unwrap_or(FailureClass::Other),
                retrying: matches!(applied, Applied::Retrying(_)),
            },
        };
        self.emit(event).await;
        Ok(())
    }
}

async fn worker(
    id: usize,
    shared: Arc<Shared>,
    mut stop: watch::Receiver<bool>,
) -> Result<(), HarvestError> {
    while let Some((prefix, attempt)) = shared.claim(&mut stop).await {
        shared
            .emit(HarvestEvent::Dispatched {
                prefix: prefix.clone(),
            })
            .await;
        let result = shared.fetcher.fetch(&prefix, &stop).await;
        shared.resolve(&prefix, attempt, result).await?;
    }
    debug!("Worker {} finished", id);
    Ok(())
}

/// Flip the stop channel on external shutdown or when the run timeout passes.
async fn watch_for_stop(
    shared: Arc<Shared>,
    mut shutdown: watch::Receiver<bool>,
    run_timeout: Option<Duration>,
) {
    let shutdown_requested = async {
        if shutdown.wait_for(|s| *s).await.is_err() {
            // Sender gone without signalling; never shut down from here.
            std::future::pending::<()>().await;
        }
    };
    let timed_out = async {
        match run_timeout {
            Some(t) => tokio::time::sleep(t).await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        _ = shutdown_requested => {
            info!("Shutdown requested, finishing in-flight queries");
            shared.request_stop(StopReason::Cancelled);
        }
        _ = timed_out => {
            warn!("Run timeout reached, finishing in-flight queries");
            shared.request_stop(StopReason::TimedOut);
        }
    }
}

/// Resolves `grace` after the stop flag is raised.
async fn grace_expired(mut stop: watch::Receiver<bool>, grace: Duration) {
    if stop.wait_for(|s| *s).await.is_err() {
        std::future::pending::<()>().await;
    }
    tokio::time::sleep(grace).await;
}

/// Drives one harvest run.
pub struct Harvester {
    policy: ExpansionPolicy,
    fetcher: Fetcher,
    store: Arc<DiscoveryStore>,
    config: HarvestConfig,
    events: Option<mpsc::Sender<HarvestEvent>>,
}

impl Harvester {
    pub fn new(
        policy: ExpansionPolicy,
        fetcher: Fetcher,
        store: Arc<DiscoveryStore>,
        config: HarvestConfig,
    ) -> Self {
        Self {
            policy,
            fetcher,
            store,
            config,
            events: None,
        }
    }

    /// Send progress events to `tx`.
    pub fn with_events(mut self, tx: mpsc::Sender<HarvestEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Run until exhaustion, timeout or `shutdown` becomes true.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<HarvestReport, HarvestError> {
        let start = Instant::now();
        let words_before = self.store.len();

        let mut frontier = Frontier::new();
        for seed in self.policy.alphabet().seeds(self.config.seed_depth.max(1)) {
            frontier.push(seed);
        }
        info!(
            "Starting harvest: {} seed prefixes, {} workers",
            frontier.len(),
            self.config.workers.max(1)
        );

        let (stop_tx, stop_rx) = watch::channel(false);
        let shared = Arc::new(Shared {
            policy: self.policy,
            fetcher: self.fetcher,
            store: self.store.clone(),
            work: Mutex::new(WorkState {
                frontier,
                ..Default::default()
            }),
            changed: Notify::new(),
            stop: stop_tx,
            stop_reason: StdMutex::new(None),
            events: self.events,
        });

        let watchdog = tokio::spawn(watch_for_stop(
            shared.clone(),
            shutdown,
            self.config.run_timeout,
        ));

        let handles: Vec<_> = (0..self.config.workers.max(1))
            .map(|id| tokio::spawn(worker(id, shared.clone(), stop_rx.clone())))
            .collect();
        let aborts: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();

        let mut joined = Box::pin(join_all(handles));
        let results = tokio::select! {
            results = &mut joined => results,
            _ = grace_expired(stop_rx.clone(), self.config.grace_period) => {
                warn!("Grace period elapsed, abandoning in-flight queries");
                for handle in &aborts {
                    handle.abort();
                }
                joined.await
            }
        };
        watchdog.abort();

        let mut first_error = None;
        for result in results {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    first_error.get_or_insert(e);
                }
                Err(e) if e.is_cancelled() => {}
                Err(e) => {
                    first_error.get_or_insert(HarvestError::Worker(e.to_string()));
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        let stop_reason = shared
            .stop_reason
            .lock()
            .ok()
            .and_then(|r| *r)
            .unwrap_or(StopReason::Exhausted);

        let work = shared.work.lock().await;
        let total_words = self.store.len();
        let report = HarvestReport {
            stop_reason,
            queried: work.frontier.queried_count(),
            resolved: work.resolved,
            failed: work.failed,
            retried: work.retried,
            cancelled: work.cancelled,
            abandoned: work.in_flight,
            pending: work.frontier.len(),
            new_words: total_words.saturating_sub(words_before),
            total_words,
            elapsed: start.elapsed(),
        };
        info!(
            "Harvest finished ({:?}): {} prefixes queried, {} words",
            report.stop_reason, report.queried, report.total_words
        );
        Ok(report)
    }
}
