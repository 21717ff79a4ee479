//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod config_cmd;
mod harvest;
mod probe;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use lexharvest::config::Config;
use lexharvest::{AlphabetPreset, SiblingPolicy};

#[derive(Parser)]
#[command(name = "lexharvest")]
#[command(about = "Harvest the vocabulary behind a capped autocomplete endpoint")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Walk the prefix space and write every discovered word to the output file
    Harvest(HarvestArgs),

    /// Measure the endpoint's request ceiling with sequential requests
    Probe(ProbeArgs),

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration as TOML
    Show,
    /// Print the path of the loaded config file
    Path,
}

/// Endpoint flags shared by commands that talk to the oracle.
#[derive(Args, Debug, Default)]
struct EndpointArgs {
    /// Autocomplete endpoint URL
    #[arg(short, long, env = "LEXHARVEST_ENDPOINT")]
    endpoint: Option<String>,
    /// Custom User-Agent header
    #[arg(long)]
    user_agent: Option<String>,
    /// Per-request timeout in seconds
    #[arg(long)]
    request_timeout: Option<u64>,
}

impl EndpointArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(ref endpoint) = self.endpoint {
            config.endpoint = endpoint.clone();
        }
        if let Some(ref ua) = self.user_agent {
            config.user_agent = Some(ua.clone());
        }
        if let Some(secs) = self.request_timeout {
            config.request_timeout_secs = secs;
        }
    }
}

#[derive(Args, Debug, Default)]
struct HarvestArgs {
    #[command(flatten)]
    endpoint: EndpointArgs,
    /// Named alphabet
    #[arg(short, long, value_enum)]
    alphabet: Option<AlphabetPreset>,
    /// Literal alphabet in order (overrides --alphabet)
    #[arg(long)]
    custom_alphabet: Option<String>,
    /// Seed all prefixes up to this length
    #[arg(long)]
    seed_depth: Option<usize>,
    /// Number of workers
    #[arg(short, long)]
    workers: Option<usize>,
    /// Maximum concurrent requests
    #[arg(long)]
    max_in_flight: Option<usize>,
    /// Requests per minute ceiling
    #[arg(long, env = "LEXHARVEST_REQUESTS_PER_MINUTE")]
    rpm: Option<f64>,
    /// Calibrate the request rate with a probe before harvesting
    #[arg(long)]
    probe: bool,
    /// Maximum words the endpoint returns per response
    #[arg(long)]
    cap: Option<usize>,
    /// When to query the next sibling prefix
    #[arg(long, value_enum)]
    sibling_policy: Option<SiblingPolicy>,
    /// Extra attempts for a failed prefix
    #[arg(long)]
    retry_budget: Option<u32>,
    /// Stop the run after this many seconds
    #[arg(long)]
    timeout: Option<u64>,
    /// Seconds in-flight queries may finish after a stop
    #[arg(long)]
    grace_period: Option<u64>,
    /// Output file (one word per line)
    #[arg(short, long, env = "LEXHARVEST_OUTPUT")]
    output: Option<String>,
    /// Keep words already in the output file
    #[arg(long)]
    resume: bool,
}

impl HarvestArgs {
    fn apply(&self, config: &mut Config) {
        self.endpoint.apply(config);
        if let Some(alphabet) = self.alphabet {
            config.alphabet = alphabet;
            config.custom_alphabet = None;
        }
        if let Some(ref chars) = self.custom_alphabet {
            config.custom_alphabet = Some(chars.clone());
        }
        if let Some(depth) = self.seed_depth {
            config.seed_depth = depth;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(n) = self.max_in_flight {
            config.max_in_flight = n;
        }
        if let Some(rpm) = self.rpm {
            config.requests_per_minute = rpm;
        }
        if self.probe {
            config.probe.enabled = true;
        }
        if let Some(cap) = self.cap {
            config.response_cap = cap;
        }
        if let Some(policy) = self.sibling_policy {
            config.sibling_policy = policy;
        }
        if let Some(budget) = self.retry_budget {
            config.retry_budget = budget;
        }
        if let Some(secs) = self.timeout {
            config.run_timeout_secs = Some(secs);
        }
        if let Some(secs) = self.grace_period {
            config.grace_period_secs = secs;
        }
        if let Some(ref output) = self.output {
            config.output = output.clone();
        }
        if self.resume {
            config.resume = true;
        }
    }
}

#[derive(Args, Debug, Default)]
struct ProbeArgs {
    #[command(flatten)]
    endpoint: EndpointArgs,
    /// Seconds the full probe should span
    #[arg(long)]
    duration: Option<u64>,
    /// Requests to send if never throttled
    #[arg(short = 'n', long)]
    count: Option<u32>,
    /// Prefix to query on every request
    #[arg(long)]
    prefix: Option<String>,
}

impl ProbeArgs {
    fn apply(&self, config: &mut Config) {
        self.endpoint.apply(config);
        if let Some(secs) = self.duration {
            config.probe.duration_secs = secs;
        }
        if let Some(count) = self.count {
            config.probe.count = count;
        }
        if let Some(ref prefix) = self.prefix {
            config.probe.prefix = prefix.clone();
        }
    }
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match cli.config {
        Some(ref path) => {
            if !path.exists() {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            Config::load_from_path(path).await?
        }
        None => Config::load().await,
    };

    match cli.command {
        Commands::Harvest(args) => {
            args.apply(&mut config);
            harvest::cmd_harvest(&config).await
        }
        Commands::Probe(args) => {
            args.apply(&mut config);
            probe::cmd_probe(&config).await
        }
        Commands::Config { command } => match command {
            ConfigCommands::Show => config_cmd::cmd_config_show(&config),
            ConfigCommands::Path => config_cmd::cmd_config_path(&config),
        },
    }
}
