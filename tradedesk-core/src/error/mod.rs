//! Error types and handling framework.
//!
//! Errors are grouped by domain:
//! - `NetworkError` - connection, transport and wire-format failures
//! - `ConfigError` - configuration loading and validation failures
//!
//! `TradeDeskError` wraps both for callers that need a single error type.
//!
//! # Examples
//!
//! ```
//! use tradedesk_core::error::{NetworkError, TradeDeskError};
//!
//! let error = TradeDeskError::from(NetworkError::Timeout { timeout_ms: 5000 });
//! assert_eq!(error.category(), "network");
//! assert!(error.is_recoverable());
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Error severity levels for categorizing errors.
///
/// - `Fatal`: the operation cannot succeed without outside intervention
/// - `Recoverable`: the operation can be retried
/// - `Warning`: degraded but operational
/// - `Info`: expected condition, worth noting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ErrorSeverity {
    /// Unrecoverable error requiring intervention.
    Fatal,

    /// Error that can be recovered from through retry.
    #[default]
    Recoverable,

    /// Non-critical issue that should be logged.
    Warning,

    /// Informational, not a true error.
    Info,
}

impl ErrorSeverity {
    /// Returns true if this error is recoverable (not fatal).
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Fatal)
    }

    /// Returns true if this error is fatal.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal)
    }

    /// Returns the severity as a static string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Fatal => "FATAL",
            Self::Recoverable => "RECOVERABLE",
            Self::Warning => "WARNING",
            Self::Info => "INFO",
        }
    }
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

mod config;
mod network;

pub use config::ConfigError;
pub use network::NetworkError;

/// Top-level error type for TradeDesk.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeDeskError {
    /// Network-related error.
    #[error("{0}")]
    Network(#[from] NetworkError),

    /// Configuration error.
    #[error("{0}")]
    Config(#[from] ConfigError),
}

impl TradeDeskError {
    /// Returns the severity level of this error.
    #[must_use]
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Network(e) => e.severity(),
            Self::Config(e) => e.severity(),
        }
    }

    /// Returns true if this error is recoverable.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        self.severity().is_recoverable()
    }

    /// Returns the error category as a string.
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            Self::Network(_) => "network",
            Self::Config(_) => "config",
        }
    }

    /// Returns the inner network error, if this is a network error.
    #[must_use]
    pub fn as_network_error(&self) -> Option<&NetworkError> {
        match self {
            Self::Network(e) => Some(e),
            Self::Config(_) => None,
        }
    }

    /// Returns the inner config error, if this is a config error.
    #[must_use]
    pub fn as_config_error(&self) -> Option<&ConfigError> {
        match self {
            Self::Config(e) => Some(e),
            Self::Network(_) => None,
        }
    }
}
