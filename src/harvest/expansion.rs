//! Decides what to query next after each response.
//!
//! Two rules drive the search:
//!
//! - **children**: every returned word longer than the prefix contributes the
//!   prefix one character longer than the current one, taken from the word.
//! - **sibling**: because responses are capped, a non-empty (or full) response
//!   may have hidden words; the next sibling prefix from
//!   [`Alphabet::next_prefix`] is queued to walk sideways.
//!
//! The discovered set is a lower bound on the real vocabulary. A capped
//! response can hide a whole branch that neither rule reaches.

use std::collections::BTreeSet;
use std::io;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::frontier::Frontier;
use crate::alphabet::Alphabet;
use crate::oracle::{FailureClass, QueryFailure, QueryResult};
use crate::store::DiscoveryStore;

/// When to queue the sibling prefix after a response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum SiblingPolicy {
    /// After every non-empty response.
    #[default]
    Always,
    /// Only when the response filled the cap.
    WhenCapped,
}

/// Prefixes derived from one response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Expansion {
    pub children: Vec<String>,
    pub sibling: Option<String>,
}

/// What applying a result did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    Resolved {
        new_words: Vec<String>,
        pushed: usize,
    },
    Retrying(QueryFailure),
    Failed(QueryFailure),
}

#[derive(Debug, Clone)]
pub struct ExpansionPolicy {
    alphabet: Alphabet,
    /// The endpoint's per-response cap.
    cap: usize,
    sibling: SiblingPolicy,
    /// Extra attempts allowed per failed prefix.
    retry_budget: u32,
}

impl ExpansionPolicy {
    pub fn new(alphabet: Alphabet, cap: usize, sibling: SiblingPolicy, retry_budget: u32) -> Self {
        Self {
            alphabet,
            cap,
            sibling,
            retry_budget,
        }
    }

    pub fn alphabet(&self) -> &Alphabet {
        &self.alphabet
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn sibling_policy(&self) -> SiblingPolicy {
        self.sibling
    }

    pub fn retry_budget(&self) -> u32 {
        self.retry_budget
    }

    /// Child and sibling prefixes for `words` returned by `prefix`.
    pub fn expand(&self, prefix: &str, words: &[String]) -> Expansion {
        let depth = prefix.chars().count() + 1;

        // Distinct children in first-seen order.
        let mut seen = BTreeSet::new();
        let mut children = Vec::new();
        for word in words {
            if word.chars().count() >= depth {
                let child: String = word.chars().take(depth).collect();
                if seen.insert(child.clone()) {
                    children.push(child);
                }
            }
        }

        let wants_sibling = match self.sibling {
            SiblingPolicy::Always => !words.is_empty(),
            SiblingPolicy::WhenCapped => !words.is_empty() && words.len() >= self.cap,
        };
        let sibling = if wants_sibling {
            self.alphabet.next_prefix(prefix)
        } else {
            None
        };

        Expansion { children, sibling }
    }

    /// Apply the result for `prefix`, whose dispatch was attempt number
    /// `attempt` (1-based), to the frontier and the store.
    pub fn apply(
        &self,
        prefix: &str,
        attempt: u32,
        result: QueryResult,
        frontier: &mut Frontier,
        store: &DiscoveryStore,
    ) -> io::Result<Applied> {
        let words = match result {
            QueryResult::Words(words) => words,
            QueryResult::Failed(failure) => {
                if failure.class == FailureClass::Cancelled {
                    debug!("Query {:?} cancelled before dispatch", prefix);
                    return Ok(Applied::Failed(failure));
                }
                if attempt <= self.retry_budget {
                    debug!(
                        "Query {:?} failed ({}), retrying later",
                        prefix, failure.detail
                    );
                    frontier.requeue_retry(prefix.to_string());
                    return Ok(Applied::Retrying(failure));
                }
                warn!(
                    "Query {:?} failed after {} attempt(s): {}",
                    prefix, attempt, failure.detail
                );
                return Ok(Applied::Failed(failure));
            }
        };

        let new_words = store.ingest(&words)?;
        if !new_words.is_empty() {
            info!(
                "Found {} new words for {:?}. Total words: {}",
                new_words.len(),
                prefix,
                store.len()
            );
        }

        let expansion = self.expand(prefix, &words);
        let mut pushed = 0;
        for child in expansion.children {
            if frontier.push(child) {
                pushed += 1;
            }
        }
        if let Some(sibling) = expansion.sibling {
            if frontier.push(sibling) {
                pushed += 1;
            }
        }

        Ok(Applied::Resolved { new_words, pushed })
    }
}
