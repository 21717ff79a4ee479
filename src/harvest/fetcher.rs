//! Bounded, paced oracle calls.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Semaphore};
use tracing::{debug, warn};

use crate::oracle::{FailureClass, Oracle, OracleError, QueryResult};
use crate::rate_limit::Pacer;

/// Issues oracle calls with at most `max_in_flight` outstanding and dispatch
/// starts spaced by the pacer. Never retries.
#[derive(Clone)]
pub struct Fetcher {
    oracle: Arc<dyn Oracle>,
    pacer: Pacer,
    permits: Arc<Semaphore>,
    timeout: Duration,
}

impl Fetcher {
    pub fn new(oracle: Arc<dyn Oracle>, pacer: Pacer, max_in_flight: usize, timeout: Duration) -> Self {
        Self {
            oracle,
            pacer,
            permits: Arc::new(Semaphore::new(max_in_flight.max(1))),
            timeout,
        }
    }

    pub fn pacer(&self) -> &Pacer {
        &self.pacer
    }

    /// Query `prefix` once. If `stop` turns true before the pacer admits the
    /// request, nothing is sent and the result is [`QueryResult::cancelled`].
    pub async fn fetch(&self, prefix: &str, stop: &watch::Receiver<bool>) -> QueryResult {
        let mut stop = stop.clone();
        let admitted = async {
            let permit = self.permits.acquire().await;
            if permit.is_ok() {
                self.pacer.acquire().await;
            }
            permit
        };

        let _permit = tokio::select! {
            biased;
            _ = stopped(&mut stop) => return QueryResult::cancelled(),
            permit = admitted => match permit {
                Ok(permit) => permit,
                Err(_) => return QueryResult::failed(FailureClass::Other, "fetcher closed"),
            },
        };
        if *stop.borrow() {
            return QueryResult::cancelled();
        }

        debug!("Querying prefix: {:?}", prefix);

        let outcome = tokio::time::timeout(self.timeout, self.oracle.query(prefix)).await;
        let result = match outcome {
            Ok(Ok(words)) => QueryResult::Words(words),
            Ok(Err(OracleError::UnexpectedShape)) => {
                warn!("Unexpected response shape for {:?}, treating as empty", prefix);
                QueryResult::Words(Vec::new())
            }
            Ok(Err(e)) => QueryResult::failed(e.class(), e.to_string()),
            Err(_) => QueryResult::failed(
                FailureClass::Other,
                format!("timed out after {:?}", self.timeout),
            ),
        };

        match &result {
            QueryResult::Words(_) => self.pacer.report_success().await,
            QueryResult::Failed(f) if f.class == FailureClass::Throttled => {
                warn!("Throttled on {:?}", prefix);
                self.pacer.report_throttled().await
            }
            QueryResult::Failed(_) => self.pacer.report_other_failure().await,
        }

        result
    }
}

/// Resolves once the stop flag is raised. A dropped sender never stops.
async fn stopped(stop: &mut watch::Receiver<bool>) {
    if stop.wait_for(|s| *s).await.is_err() {
        std::future::pending::<()>().await;
    }
}
