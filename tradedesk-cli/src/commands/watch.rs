//! Live connection command.
//!
//! Connects through the configured adapter, prints every routed message as
//! one JSON line on stdout, and reports lifecycle events through the log.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use tradedesk_core::config::Validatable;
use tradedesk_core::error::NetworkError;
use tradedesk_gateway::ws::{
    ConnectionManager, ConnectionObserver, ConnectionState, Message, MessageCodec,
    SimulatedTransport, Transport, TungsteniteTransport,
};

use crate::app_config::{AdapterKind, AppConfig};

/// Arguments for the watch command
#[derive(Parser, Debug)]
pub struct WatchArgs {
    /// WebSocket endpoint; selects the live adapter
    #[arg(short, long, conflicts_with = "simulate")]
    pub url: Option<String>,

    /// Use the simulated feed instead of a live endpoint
    #[arg(long)]
    pub simulate: bool,

    /// Channels to print (repeatable); defaults to the wildcard
    #[arg(long = "channel")]
    pub channels: Vec<String>,

    /// JSON message to send after start-up (repeatable), e.g. '{"type":"subscribe","channel":"prices"}'
    #[arg(short, long = "send")]
    pub sends: Vec<String>,

    /// Stop after this many seconds instead of waiting for Ctrl-C
    #[arg(short, long)]
    pub duration: Option<u64>,
}

struct LogObserver;

impl ConnectionObserver for LogObserver {
    fn on_connected(&self) {
        info!("Connected");
    }

    fn on_disconnected(&self, code: u16, reason: &str) {
        info!(code, reason, "Disconnected");
    }

    fn on_error(&self, error: &NetworkError) {
        warn!(error = %error, severity = %error.severity(), "Connection error");
    }

    fn on_state_change(&self, state: ConnectionState) {
        info!(state = %state, "State changed");
    }

    fn on_reconnecting(&self, attempt: u32, max_attempts: u32) {
        info!(attempt, max_attempts, "Reconnecting");
    }
}

/// Applies command-line selections on top of the loaded configuration.
fn apply_args(mut config: AppConfig, args: &WatchArgs) -> AppConfig {
    if let Some(url) = &args.url {
        config.connection.url.clone_from(url);
        config.adapter = AdapterKind::Live;
    }
    if args.simulate {
        config.adapter = AdapterKind::Simulated;
    }
    config
}

fn parse_outbound(raw: &[String]) -> Result<Vec<Message>> {
    let codec = MessageCodec::new();
    raw.iter()
        .map(|text| {
            codec
                .decode(text)
                .with_context(|| format!("Invalid --send message: {text}"))
        })
        .collect()
}

/// Runs the watch command.
///
/// # Errors
///
/// Returns error if the configuration is invalid or an outbound message
/// does not parse.
pub async fn run(args: WatchArgs, config: AppConfig) -> Result<()> {
    let config = apply_args(config, &args);
    config.validate().context("Invalid configuration")?;
    let outbound = parse_outbound(&args.sends)?;

    let connection = config.effective_connection();
    let transport: Arc<dyn Transport> = match config.adapter {
        AdapterKind::Live => Arc::new(TungsteniteTransport::new(connection.connect_timeout())),
        AdapterKind::Simulated => Arc::new(SimulatedTransport::new(config.simulation.clone())),
    };
    info!(
        adapter = %config.adapter,
        transport = transport.name(),
        url = %connection.url,
        "Starting watch"
    );

    let manager = ConnectionManager::with_transport(connection, transport);
    manager.add_observer(Arc::new(LogObserver));

    let channels = if args.channels.is_empty() {
        vec![manager.config().wildcard_channel.clone()]
    } else {
        args.channels.clone()
    };
    let codec = MessageCodec::new();
    for channel in &channels {
        manager.subscribe(channel.clone(), move |message| {
            match codec.encode(message) {
                Ok(line) => println!("{line}"),
                Err(e) => warn!(error = %e, "Failed to print message"),
            }
        });
    }

    // Sent before connecting so they go through the outbound queue.
    for message in outbound {
        manager.send_message(message);
    }
    info!(queued = manager.queue_size(), "Connecting");
    manager.connect();

    match args.duration {
        Some(secs) => {
            tokio::select! {
                () = tokio::time::sleep(Duration::from_secs(secs)) => {}
                result = tokio::signal::ctrl_c() => result.context("Failed to listen for Ctrl-C")?,
            }
        }
        None => tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl-C")?,
    }

    manager.disconnect();
    let mut state = manager.watch_state();
    let _ = tokio::time::timeout(
        Duration::from_secs(2),
        state.wait_for(ConnectionState::is_inactive),
    )
    .await;

    let stats = manager.stats();
    info!(
        received = stats.messages_received,
        sent = stats.messages_sent,
        reconnections = stats.reconnections,
        "Watch finished"
    );
    manager.shutdown();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> WatchArgs {
        let mut argv = vec!["watch"];
        argv.extend_from_slice(extra);
        WatchArgs::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_url_selects_live_adapter() {
        let config = apply_args(AppConfig::default(), &args(&["--url", "wss://x.test/ws"]));
        assert_eq!(config.adapter, AdapterKind::Live);
        assert_eq!(config.connection.url, "wss://x.test/ws");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_simulate_overrides_file_adapter() {
        let file_config = AppConfig {
            adapter: AdapterKind::Live,
            ..AppConfig::default()
        };
        let config = apply_args(file_config, &args(&["--simulate"]));
        assert_eq!(config.adapter, AdapterKind::Simulated);
    }

    #[test]
    fn test_url_conflicts_with_simulate() {
        assert!(WatchArgs::try_parse_from(["watch", "--url", "ws://a", "--simulate"]).is_err());
    }

    #[test]
    fn test_repeatable_flags() {
        let parsed = args(&["--channel", "prices", "--channel", "orders", "--send", r#"{"type":"a"}"#]);
        assert_eq!(parsed.channels, ["prices", "orders"]);
        assert_eq!(parsed.sends.len(), 1);
    }

    #[test]
    fn test_parse_outbound() {
        let ok = parse_outbound(&[r#"{"type":"subscribe","channel":"prices"}"#.to_string()]).unwrap();
        assert_eq!(ok[0].kind, "subscribe");
        assert_eq!(ok[0].channel.as_deref(), Some("prices"));

        assert!(parse_outbound(&["{}".to_string()]).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_simulated_for_duration() {
        let mut config = AppConfig::default();
        config.simulation.tick_interval_ms = 500;
        let result = run(args(&["--simulate", "--duration", "2"]), config).await;
        assert!(result.is_ok());
    }
}
