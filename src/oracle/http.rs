//! Autocomplete endpoint over HTTP.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;
use url::Url;

use super::{parse_suggestions, resolve_user_agent, Oracle, OracleError};

/// Connection settings for [`HttpOracle`].
#[derive(Debug, Clone)]
pub struct OracleConfig {
    pub endpoint: Url,
    /// Custom user agent; `None` uses [`super::USER_AGENT`].
    pub user_agent: Option<String>,
    pub timeout: Duration,
}

/// Queries `GET <endpoint>?query=<prefix>`.
#[derive(Debug, Clone)]
pub struct HttpOracle {
    client: Client,
    endpoint: Url,
}

impl HttpOracle {
    pub fn new(config: &OracleConfig) -> Result<Self, OracleError> {
        let user_agent = resolve_user_agent(config.user_agent.as_deref());
        let client = Client::builder()
            .user_agent(&user_agent)
            .timeout(config.timeout)
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl Oracle for HttpOracle {
    async fn query(&self, prefix: &str) -> Result<Vec<String>, OracleError> {
        let start = Instant::now();
        let response = self
            .client
            .get(self.endpoint.clone())
            .query(&[("query", prefix)])
            .send()
            .await?;

        let status_code = response.status().as_u16();
        if OracleError::is_throttle_status(status_code) {
            return Err(OracleError::Throttled(status_code));
        }
        if !response.status().is_success() {
            return Err(OracleError::Status(status_code));
        }

        let body: serde_json::Value = response.json().await?;
        let words = parse_suggestions(&body)?;
        debug!(
            "GET {:?} -> {} words in {:?}",
            prefix,
            words.len(),
            start.elapsed()
        );
        Ok(words)
    }
}
