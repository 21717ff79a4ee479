//! Shared helper functions for CLI commands.

use std::sync::Arc;
use std::time::Duration;

use console::style;

use lexharvest::config::Config;
use lexharvest::oracle::{HttpOracle, Oracle};
use lexharvest::rate_limit::{probe, ProbeReport};
use lexharvest::store::{load_existing_words, DiscoveryStore, FileSink};

/// Build the HTTP oracle from config.
pub fn build_oracle(config: &Config) -> anyhow::Result<Arc<dyn Oracle>> {
    let oracle = HttpOracle::new(&config.oracle_config()?)?;
    Ok(Arc::new(oracle))
}

/// Run the probe and print what it saw.
pub async fn run_probe(config: &Config, oracle: &dyn Oracle) -> anyhow::Result<(ProbeReport, Duration)> {
    let probe_config = config.probe_config();
    eprintln!(
        "{} Probing {} ({} requests over {}s, query {:?})",
        style("→").cyan(),
        config.endpoint,
        probe_config.target_count,
        probe_config.target_duration.as_secs(),
        probe_config.prefix
    );

    let report = probe(oracle, &probe_config).await?;
    match report.throttled_at {
        Some(n) => eprintln!(
            "{} Throttled at request {} after {:.1}s",
            style("!").yellow(),
            n,
            report.elapsed.as_secs_f64()
        ),
        None => eprintln!(
            "{} {} requests without throttling in {:.1}s",
            style("✓").green(),
            report.requests_sent,
            report.elapsed.as_secs_f64()
        ),
    }

    let budget = report.rate_budget(&probe_config)?;
    eprintln!(
        "  {} Rate budget: {} ({:.1} requests/min)",
        style("→").dim(),
        format_duration(budget),
        per_minute(budget)
    );
    Ok((report, budget))
}

/// Dispatch interval for the run: measured by the probe when enabled,
/// otherwise derived from `requests_per_minute`.
pub async fn resolve_rate_budget(config: &Config, oracle: &dyn Oracle) -> anyhow::Result<Duration> {
    if config.probe.enabled {
        let (_, budget) = run_probe(config, oracle).await?;
        Ok(budget)
    } else {
        Ok(config.rate_budget())
    }
}

/// Open the discovery store over the configured output file.
pub fn open_store(config: &Config) -> anyhow::Result<DiscoveryStore> {
    let path = config.output_path();
    if config.resume {
        let known = load_existing_words(&path)?;
        let sink = FileSink::append_to(&path)?;
        Ok(DiscoveryStore::with_known(Box::new(sink), known))
    } else {
        let sink = FileSink::create(&path)?;
        Ok(DiscoveryStore::new(Box::new(sink)))
    }
}

pub fn per_minute(interval: Duration) -> f64 {
    if interval.is_zero() {
        f64::INFINITY
    } else {
        60.0 / interval.as_secs_f64()
    }
}

/// Format a duration compactly (e.g. "1.20s", "350ms", "2m05s").
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs >= 60 {
        format!("{}m{:02}s", secs / 60, secs % 60)
    } else if secs >= 1 {
        format!("{:.2}s", d.as_secs_f64())
    } else {
        format!("{}ms", d.as_millis())
    }
}
