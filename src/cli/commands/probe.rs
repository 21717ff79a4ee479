//! Rate probe command.

use console::style;

use crate::cli::helpers::{build_oracle, run_probe};
use lexharvest::config::Config;

/// Probe the endpoint and report a safe requests-per-minute setting.
pub async fn cmd_probe(config: &Config) -> anyhow::Result<()> {
    config.endpoint_url()?;
    let oracle = build_oracle(config)?;
    let (report, budget) = run_probe(config, oracle.as_ref()).await?;

    if report.other_failures > 0 {
        println!(
            "{} {} probe requests failed for reasons other than throttling",
            style("!").yellow(),
            report.other_failures
        );
    }
    let rpm = if budget.is_zero() {
        0.0
    } else {
        60.0 / budget.as_secs_f64()
    };
    println!("requests_per_minute = {:.1}", rpm);
    Ok(())
}
