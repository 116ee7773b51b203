//! # TradeDesk CLI
//!
//! Command-line client for the TradeDesk real-time connection layer.
//!
//! This CLI provides commands for:
//! - Watching a live or simulated feed
//! - Inspecting the effective configuration

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod app_config;
mod commands;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tradedesk_telemetry::logging::{LogFormat, init_logging};

use app_config::AppConfig;
use commands::{config, watch};

/// TradeDesk - real-time trading dashboard connection client
#[derive(Parser, Debug)]
#[command(name = "tradedesk")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path (yaml, toml or json)
    #[arg(short, long, global = true, env = "TRADEDESK_CONFIG")]
    config: Option<PathBuf>,

    /// Log format (pretty, json)
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Connect and print routed messages
    Watch(watch::WatchArgs),

    /// Print the effective configuration
    Config(config::ConfigArgs),

    /// Show system information
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let app_config =
        AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    let mut log_config = app_config.logging.clone();
    if cli.verbose {
        log_config.level = "debug".to_string();
    }
    if let Some(format) = cli.log_format {
        log_config.format = format;
    }
    let _guards = init_logging(&log_config).context("Failed to initialize logging")?;

    match cli.command {
        Commands::Watch(args) => watch::run(args, app_config).await?,
        Commands::Config(args) => config::show(&args, &app_config)?,
        Commands::Info => print_info(),
    }

    Ok(())
}

fn print_info() {
    println!("TradeDesk Connection Client");
    println!("===========================");
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
    println!("Rust Edition: 2024");
    println!();
    println!("Adapters:");
    println!("  - live       (websocket, ws:// or wss://)");
    println!("  - simulated  (in-process random-walk feed)");
    println!();
    println!("Features:");
    println!("  - Constant-interval reconnection with attempt ceiling");
    println!("  - JSON ping heartbeat");
    println!("  - Outbound queue flushed in order on connect");
    println!("  - Channel, symbol and wildcard subscriptions");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_watch() {
        let cli = Cli::try_parse_from([
            "tradedesk",
            "-v",
            "--log-format",
            "json",
            "watch",
            "--simulate",
            "--duration",
            "5",
        ])
        .unwrap();

        assert!(cli.verbose);
        assert_eq!(cli.log_format, Some(LogFormat::Json));
        match cli.command {
            Commands::Watch(args) => {
                assert!(args.simulate);
                assert_eq!(args.duration, Some(5));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_config_with_global_flag_after_subcommand() {
        let cli = Cli::try_parse_from(["tradedesk", "config", "--format", "json", "-c", "td.toml"])
            .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("td.toml")));
        assert!(matches!(cli.command, Commands::Config(_)));
    }

    #[test]
    fn test_rejects_unknown_log_format() {
        assert!(Cli::try_parse_from(["tradedesk", "--log-format", "xml", "info"]).is_err());
    }
}
