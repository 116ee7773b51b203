//! Application configuration file.
//!
//! ```yaml
//! adapter: live
//! connection:
//!   url: wss://feed.example.com/ws
//!   reconnect_interval_ms: 3000
//!   max_reconnect_attempts: 5
//!   heartbeat_interval_ms: 30000
//! simulation:
//!   tick_interval_ms: 1000
//! logging:
//!   level: info
//!   format: pretty
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use tradedesk_core::config::{ConfigLoader, Configurable, EnvLookup, Validatable};
use tradedesk_core::error::ConfigError;
use tradedesk_gateway::ws::{ConnectionConfig, SimulationConfig};
use tradedesk_telemetry::logging::LogConfig;

/// Prefix for environment overrides, e.g. `TRADEDESK_WS_URL`.
pub const ENV_PREFIX: &str = "TRADEDESK";

/// URL reported by the simulated adapter when none is configured.
pub const SIMULATED_URL: &str = "sim://local";

/// Which transport the connection manager uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdapterKind {
    /// Real websocket endpoint.
    Live,
    /// In-process fake feed.
    #[default]
    Simulated,
}

impl std::str::FromStr for AdapterKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "live" => Ok(Self::Live),
            "simulated" | "sim" => Ok(Self::Simulated),
            other => Err(format!("unknown adapter '{other}', expected live or simulated")),
        }
    }
}

impl std::fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Live => write!(f, "live"),
            Self::Simulated => write!(f, "simulated"),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Transport selection.
    #[serde(default)]
    pub adapter: AdapterKind,

    /// Connection manager settings.
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Simulated feed settings.
    #[serde(default)]
    pub simulation: SimulationConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LogConfig,
}

impl AppConfig {
    /// Loads `path` if given, otherwise starts from defaults, then applies
    /// `TRADEDESK_*` overrides. Validation is left to the caller so command
    /// line flags can still fill in missing values.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let loader = ConfigLoader::new()
            .with_env_prefix(ENV_PREFIX)
            .with_validation(false);
        let config = match path {
            Some(path) => loader.load_file(path)?,
            None => Self::default(),
        };
        loader.finish(config)
    }

    /// Connection settings with the simulated placeholder URL filled in.
    #[must_use]
    pub fn effective_connection(&self) -> ConnectionConfig {
        let mut connection = self.connection.clone();
        if self.adapter == AdapterKind::Simulated && connection.url.trim().is_empty() {
            connection.url = SIMULATED_URL.to_string();
        }
        connection
    }
}

impl Validatable for AppConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        match self.adapter {
            AdapterKind::Live => self.connection.validate()?,
            AdapterKind::Simulated => {
                if self.simulation.symbols.is_empty() {
                    return Err(ConfigError::invalid_value(
                        "simulation.symbols",
                        "must list at least one symbol",
                    ));
                }
            }
        }
        Ok(())
    }
}

impl Configurable for AppConfig {
    fn apply_overrides_with(
        &mut self,
        prefix: &str,
        lookup: EnvLookup<'_>,
    ) -> Result<(), ConfigError> {
        let name = format!("{prefix}_ADAPTER");
        if let Some(raw) = lookup(&name) {
            self.adapter = raw
                .parse()
                .map_err(|reason| ConfigError::InvalidEnvVar { name, reason })?;
        }

        let name = format!("{prefix}_LOG_LEVEL");
        if let Some(level) = lookup(&name) {
            self.logging.level = level;
        }

        self.connection.apply_overrides_with(prefix, lookup)
    }

    fn env_var_names(prefix: &str) -> Vec<String> {
        let mut names = vec![format!("{prefix}_ADAPTER"), format!("{prefix}_LOG_LEVEL")];
        names.extend(ConnectionConfig::env_var_names(prefix));
        names
    }
}
