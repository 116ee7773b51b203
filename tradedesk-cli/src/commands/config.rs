//! Configuration inspection command.

use anyhow::{Result, anyhow};
use clap::Parser;

use tradedesk_core::config::{ConfigFormat, ConfigLoader, Configurable, Validatable};

use crate::app_config::{AppConfig, ENV_PREFIX};

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Output format (yaml, toml, json)
    #[arg(short, long, default_value = "yaml")]
    pub format: String,

    /// List the environment variables that override the file
    #[arg(long)]
    pub env: bool,
}

/// Renders the effective configuration.
///
/// # Errors
///
/// Returns error if the format is unknown or serialization fails.
pub fn render(args: &ConfigArgs, config: &AppConfig) -> Result<String> {
    if args.env {
        return Ok(AppConfig::env_var_names(ENV_PREFIX).join("\n"));
    }
    let format = ConfigFormat::from_name(&args.format)
        .ok_or_else(|| anyhow!("Unknown format '{}', expected yaml, toml or json", args.format))?;
    Ok(ConfigLoader::serialize(config, format)?)
}

/// Prints the effective configuration and whether it validates.
///
/// # Errors
///
/// Returns error if rendering fails.
pub fn show(args: &ConfigArgs, config: &AppConfig) -> Result<()> {
    println!("{}", render(args, config)?);
    if !args.env {
        if let Err(e) = config.validate() {
            eprintln!("warning: configuration does not validate: {e}");
        }
    }
    Ok(())
}
