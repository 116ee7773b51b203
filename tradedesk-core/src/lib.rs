//! # TradeDesk Core
//!
//! Shared building blocks for the TradeDesk real-time connection layer.
//!
//! This crate provides:
//! - Error types and severity classification
//! - Configuration loading with YAML/TOML/JSON support, validation and
//!   environment variable overrides

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]

/// Error types and handling
pub mod error;

/// Configuration management
pub mod config;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{ConfigFormat, ConfigLoader, Configurable, Validatable};
    pub use crate::error::{ConfigError, ErrorSeverity, NetworkError, TradeDeskError};
}
