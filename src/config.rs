//! Configuration management using the prefer crate for file discovery.
//!
//! Precedence, lowest first: built-in defaults, the discovered (or explicit)
//! config file, `LEXHARVEST_*` environment variables, command-line flags.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;
use url::Url;

use crate::alphabet::{Alphabet, AlphabetError, AlphabetPreset};
use crate::harvest::{ExpansionPolicy, HarvestConfig, SiblingPolicy};
use crate::oracle::OracleConfig;
use crate::rate_limit::{checked_rpm_interval, rpm_to_interval, PacerConfig, ProbeConfig};

/// Name used for config file discovery (`lexharvest.toml`, `.yaml`, `.json`).
pub const CONFIG_NAME: &str = "lexharvest";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("invalid endpoint URL {url:?}: {source}")]
    Endpoint {
        url: String,
        source: url::ParseError,
    },
    #[error("invalid alphabet: {0}")]
    Alphabet(#[from] AlphabetError),
    #[error("{0}")]
    Invalid(String),
}

/// Throttling backoff tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Upper bound for the widened dispatch delay, in seconds.
    pub max_delay_secs: u64,
    pub multiplier: f64,
    /// Consecutive throttled responses before widening.
    pub throttle_threshold: u32,
    pub recovery_multiplier: f64,
    /// Consecutive successes before narrowing again.
    pub recovery_threshold: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        let pacer = PacerConfig::default();
        Self {
            max_delay_secs: pacer.max_delay.as_secs(),
            multiplier: pacer.backoff_multiplier,
            throttle_threshold: pacer.throttle_threshold,
            recovery_multiplier: pacer.recovery_multiplier,
            recovery_threshold: pacer.recovery_threshold,
        }
    }
}

/// Rate probe settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeSettings {
    /// Run the probe before harvesting instead of trusting `requests_per_minute`.
    pub enabled: bool,
    pub duration_secs: u64,
    pub count: u32,
    pub prefix: String,
    pub window_secs: u64,
    pub safety_factor: f64,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        let probe = ProbeConfig::default();
        Self {
            enabled: false,
            duration_secs: probe.target_duration.as_secs(),
            count: probe.target_count,
            prefix: probe.prefix,
            window_secs: probe.window.as_secs(),
            safety_factor: probe.safety_factor,
        }
    }
}

/// Operator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Autocomplete endpoint, queried as `<endpoint>?query=<prefix>`.
    pub endpoint: String,
    /// Custom user agent (default: lexharvest/<version>).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Named alphabet, ignored when `custom_alphabet` is set.
    pub alphabet: AlphabetPreset,
    /// Literal alphabet, characters in their intended order.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_alphabet: Option<String>,
    /// Seed all prefixes up to this length.
    pub seed_depth: usize,
    pub workers: usize,
    /// Maximum oracle calls in flight at once.
    pub max_in_flight: usize,
    /// Dispatch ceiling when the probe is not used.
    pub requests_per_minute: f64,
    /// The endpoint's per-response cap.
    pub response_cap: usize,
    pub sibling_policy: SiblingPolicy,
    /// Extra attempts for a failed prefix.
    pub retry_budget: u32,
    pub request_timeout_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_timeout_secs: Option<u64>,
    pub grace_period_secs: u64,
    /// Output file, one word per line.
    pub output: String,
    /// Keep words already in the output file instead of truncating it.
    pub resume: bool,
    pub backoff: BackoffConfig,
    pub probe: ProbeSettings,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8000/v1/autocomplete".to_string(),
            user_agent: None,
            alphabet: AlphabetPreset::default(),
            custom_alphabet: None,
            seed_depth: 1,
            workers: 10,
            max_in_flight: 10,
            requests_per_minute: 50.0,
            response_cap: 10,
            sibling_policy: SiblingPolicy::default(),
            retry_budget: 1,
            request_timeout_secs: 30,
            run_timeout_secs: None,
            grace_period_secs: 10,
            output: "autocomplete_words.txt".to_string(),
            resume: false,
            backoff: BackoffConfig::default(),
            probe: ProbeSettings::default(),
            source_path: None,
        }
    }
}

impl Config {
    /// Load configuration using prefer crate for discovery.
    /// Falls back to defaults (with env overrides) when no file is found.
    pub async fn load() -> Self {
        match prefer::load(CONFIG_NAME).await {
            Ok(pref_config) => {
                if let Some(path) = pref_config.source_path() {
                    match Self::load_from_path(path).await {
                        Ok(config) => config,
                        Err(e) => {
                            warn!("{}; using defaults", e);
                            Self::default_with_env()
                        }
                    }
                } else {
                    Self::default_with_env()
                }
            }
            Err(_) => Self::default_with_env(),
        }
    }

    /// Create a default config with environment variable overrides applied.
    pub fn default_with_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Load configuration from a specific file path.
    /// Supports JSON, TOML and YAML based on file extension.
    pub async fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        let mut config = Self::parse(path, &contents)?;
        config.source_path = Some(path.to_path_buf());
        Ok(config.with_env_overrides())
    }

    fn parse(path: &Path, contents: &str) -> Result<Self, ConfigError> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        let parse_error = |message: String| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        };
        match ext {
            "toml" => toml::from_str(contents).map_err(|e| parse_error(e.to_string())),
            "yaml" | "yml" => serde_yaml::from_str(contents).map_err(|e| parse_error(e.to_string())),
            _ => serde_json::from_str(contents).map_err(|e| parse_error(e.to_string())),
        }
    }

    /// Apply `LEXHARVEST_*` environment variables.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(endpoint) = lookup("LEXHARVEST_ENDPOINT") {
            self.endpoint = endpoint;
        }
        if let Some(ua) = lookup("LEXHARVEST_USER_AGENT") {
            self.user_agent = Some(ua);
        }
        if let Some(output) = lookup("LEXHARVEST_OUTPUT") {
            self.output = output;
        }
        if let Some(rpm) = lookup("LEXHARVEST_REQUESTS_PER_MINUTE") {
            match rpm.parse() {
                Ok(rpm) => self.requests_per_minute = rpm,
                Err(_) => warn!("Ignoring invalid LEXHARVEST_REQUESTS_PER_MINUTE={:?}", rpm),
            }
        }
        self
    }

    /// Check values that serde cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.endpoint_url()?;
        self.alphabet()?;
        if self.response_cap == 0 {
            return Err(ConfigError::Invalid("response_cap must be at least 1".into()));
        }
        if self.seed_depth == 0 {
            return Err(ConfigError::Invalid("seed_depth must be at least 1".into()));
        }
        if !self.probe.enabled && checked_rpm_interval(self.requests_per_minute).is_none() {
            return Err(ConfigError::Invalid(format!(
                "requests_per_minute must be a positive finite rate (got {}), or enable the probe",
                self.requests_per_minute
            )));
        }
        let backoff = &self.backoff;
        if !(backoff.multiplier.is_finite() && backoff.multiplier >= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "backoff.multiplier must be a finite number >= 1 (got {})",
                backoff.multiplier
            )));
        }
        if !(backoff.recovery_multiplier > 0.0 && backoff.recovery_multiplier <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "backoff.recovery_multiplier must be in (0, 1] (got {})",
                backoff.recovery_multiplier
            )));
        }
        let factor = self.probe.safety_factor;
        if !(factor.is_finite() && factor >= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "probe.safety_factor must be a finite number >= 1 (got {})",
                factor
            )));
        }
        Ok(())
    }

    pub fn endpoint_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.endpoint).map_err(|source| ConfigError::Endpoint {
            url: self.endpoint.clone(),
            source,
        })
    }

    pub fn alphabet(&self) -> Result<Alphabet, ConfigError> {
        match &self.custom_alphabet {
            Some(chars) => Ok(Alphabet::new(chars)?),
            None => Ok(self.alphabet.alphabet()),
        }
    }

    /// Output path with `~` expanded.
    pub fn output_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.output).as_ref())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Base dispatch interval from `requests_per_minute`.
    pub fn rate_budget(&self) -> Duration {
        rpm_to_interval(self.requests_per_minute)
    }

    pub fn expansion_policy(&self) -> Result<ExpansionPolicy, ConfigError> {
        Ok(ExpansionPolicy::new(
            self.alphabet()?,
            self.response_cap,
            self.sibling_policy,
            self.retry_budget,
        ))
    }

    pub fn harvest_config(&self) -> HarvestConfig {
        HarvestConfig {
            workers: self.workers,
            seed_depth: self.seed_depth,
            run_timeout: self.run_timeout_secs.map(Duration::from_secs),
            grace_period: Duration::from_secs(self.grace_period_secs),
        }
    }

    /// Pacer settings around `base_delay` (from the probe or the rpm setting).
    pub fn pacer_config(&self, base_delay: Duration) -> PacerConfig {
        PacerConfig {
            base_delay,
            max_delay: Duration::from_secs(self.backoff.max_delay_secs),
            backoff_multiplier: self.backoff.multiplier,
            throttle_threshold: self.backoff.throttle_threshold.max(1),
            recovery_multiplier: self.backoff.recovery_multiplier,
            recovery_threshold: self.backoff.recovery_threshold.max(1),
        }
    }

    pub fn probe_config(&self) -> ProbeConfig {
        ProbeConfig {
            target_duration: Duration::from_secs(self.probe.duration_secs),
            target_count: self.probe.count,
            prefix: self.probe.prefix.clone(),
            window: Duration::from_secs(self.probe.window_secs),
            safety_factor: self.probe.safety_factor,
        }
    }

    pub fn oracle_config(&self) -> Result<OracleConfig, ConfigError> {
        Ok(OracleConfig {
            endpoint: self.endpoint_url()?,
            user_agent: self.user_agent.clone(),
            timeout: self.request_timeout(),
        })
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}
