//! Configuration management commands.

use console::style;

use lexharvest::config::Config;

/// Print the effective configuration.
pub fn cmd_config_show(config: &Config) -> anyhow::Result<()> {
    if let Err(e) = config.validate() {
        eprintln!("{} {}", style("!").yellow(), e);
    }
    print!("{}", config.to_toml()?);
    Ok(())
}

/// Print where the configuration came from.
pub fn cmd_config_path(config: &Config) -> anyhow::Result<()> {
    match config.source_path {
        Some(ref path) => println!("{}", path.display()),
        None => eprintln!(
            "{} No config file found; using defaults and environment",
            style("!").yellow()
        ),
    }
    Ok(())
}
