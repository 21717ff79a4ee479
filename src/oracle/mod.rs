//! The autocomplete endpoint, seen as a prefix -> words oracle.

mod http;
mod response;
mod user_agent;

pub use http::{HttpOracle, OracleConfig};
pub use response::{parse_suggestions, RESULT_KEYS};
pub use user_agent::{resolve_user_agent, USER_AGENT};

use async_trait::async_trait;
use thiserror::Error;

/// Errors from a single oracle call.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("throttled (HTTP {0})")]
    Throttled(u16),
    #[error("unexpected status HTTP {0}")]
    Status(u16),
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("response has neither `results` nor `suggestions`")]
    UnexpectedShape,
    #[error("{0}")]
    Other(String),
}

impl OracleError {
    /// Check if a status code is a definite rate limit.
    pub fn is_throttle_status(status_code: u16) -> bool {
        matches!(status_code, 429 | 503)
    }

    pub fn class(&self) -> FailureClass {
        match self {
            OracleError::Throttled(_) => FailureClass::Throttled,
            _ => FailureClass::Other,
        }
    }
}

/// Source of autocomplete suggestions.
///
/// `query` returns the words the endpoint reports for `prefix`, in the
/// endpoint's order and at most as many as its per-response cap.
#[async_trait]
pub trait Oracle: Send + Sync {
    async fn query(&self, prefix: &str) -> Result<Vec<String>, OracleError>;
}

/// Why a dispatched query produced no usable answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    Throttled,
    Other,
    /// The run stopped before the query was sent.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryFailure {
    pub class: FailureClass,
    pub detail: String,
}

/// Outcome of one dispatched prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryResult {
    Words(Vec<String>),
    Failed(QueryFailure),
}

impl QueryResult {
    pub fn failed(class: FailureClass, detail: impl Into<String>) -> Self {
        QueryResult::Failed(QueryFailure {
            class,
            detail: detail.into(),
        })
    }

    /// A query that was never sent because the run stopped.
    pub fn cancelled() -> Self {
        Self::failed(FailureClass::Cancelled, "run stopped before dispatch")
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, QueryResult::Failed(f) if f.class == FailureClass::Cancelled)
    }

    pub fn is_throttled(&self) -> bool {
        matches!(self, QueryResult::Failed(f) if f.class == FailureClass::Throttled)
    }
}
