//! Main harvest command implementation.

use std::sync::Arc;
use std::time::Duration;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::{mpsc, watch};

use crate::cli::helpers::{build_oracle, format_duration, open_store, per_minute, resolve_rate_budget};
use lexharvest::config::Config;
use lexharvest::oracle::FailureClass;
use lexharvest::{Fetcher, HarvestEvent, Harvester, Pacer, StopReason};

/// Harvest the endpoint's vocabulary into the output file.
pub async fn cmd_harvest(config: &Config) -> anyhow::Result<()> {
    config.validate()?;

    let oracle = build_oracle(config)?;
    let base_delay = resolve_rate_budget(config, oracle.as_ref()).await?;
    let pacer = Pacer::new(config.pacer_config(base_delay));
    let fetcher = Fetcher::new(
        oracle,
        pacer.clone(),
        config.max_in_flight,
        config.request_timeout(),
    );

    let output = config.output_path();
    let store = Arc::new(open_store(config)?);
    let alphabet = config.alphabet()?;

    eprintln!(
        "{} Harvesting {} ({} chars, cap {}, {:?} siblings, {:.1} req/min)",
        style("→").cyan(),
        config.endpoint,
        alphabet.len(),
        config.response_cap,
        config.sibling_policy,
        per_minute(base_delay)
    );
    eprintln!("  {} Writing to {}", style("→").dim(), output.display());

    let (event_tx, event_rx) = mpsc::channel(1024);
    let harvester = Harvester::new(
        config.expansion_policy()?,
        fetcher,
        store.clone(),
        config.harvest_config(),
    )
    .with_events(event_tx);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(true);
        }
    });

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {pos} queries | {prefix} | {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.enable_steady_tick(Duration::from_millis(120));
    let progress = tokio::spawn(drive_progress(pb.clone(), event_rx));

    let result = harvester.run(shutdown_rx).await;

    progress.abort();
    ctrl_c.abort();
    pb.finish_and_clear();

    let report = result?;
    let stats = pacer.stats().await;

    let headline = match report.stop_reason {
        StopReason::Exhausted => format!("{} Harvest complete", style("✓").green()),
        StopReason::Cancelled => format!("{} Harvest cancelled", style("!").yellow()),
        StopReason::TimedOut => format!("{} Harvest timed out", style("!").yellow()),
    };
    println!("{} in {}", headline, format_duration(report.elapsed));
    println!(
        "  {} {} new words ({} total) written to {}",
        style("→").dim(),
        report.new_words,
        report.total_words,
        output.display()
    );
    println!(
        "  {} {} prefixes queried, {} failed, {} retried",
        style("→").dim(),
        report.queried,
        report.failed,
        report.retried
    );
    if report.pending > 0 || report.cancelled > 0 || report.abandoned > 0 {
        println!(
            "  {} {} prefixes still pending, {} cancelled before sending, {} abandoned in flight",
            style("→").dim(),
            report.pending,
            report.cancelled,
            report.abandoned
        );
    }
    if stats.throttle_hits > 0 {
        println!(
            "  {} Throttled {} times, final delay {}",
            style("!").yellow(),
            stats.throttle_hits,
            format_duration(stats.current_delay)
        );
    }

    Ok(())
}

async fn drive_progress(pb: ProgressBar, mut events: mpsc::Receiver<HarvestEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            HarvestEvent::Dispatched { prefix } => {
                pb.set_message(format!("querying {:?}", prefix));
            }
            HarvestEvent::Resolved {
                total_words,
                pending,
                ..
            } => {
                pb.inc(1);
                pb.set_prefix(format!("{} words, {} pending", total_words, pending));
            }
            HarvestEvent::Failed {
                prefix,
                class,
                retrying,
            } => {
                pb.inc(1);
                if retrying {
                    continue;
                }
                let reason = match class {
                    FailureClass::Throttled => "throttled",
                    FailureClass::Other => "failed",
                    FailureClass::Cancelled => continue,
                };
                pb.println(format!("{} {:?} {}", style("✗").red(), prefix, reason));
            }
        }
    }
}
