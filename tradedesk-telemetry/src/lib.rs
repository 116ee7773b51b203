//! # TradeDesk Telemetry
//!
//! Logging setup shared by TradeDesk binaries.
//!
//! This crate provides:
//! - Structured logging with JSON and pretty formats
//! - Stdout, stderr and rotating file outputs
//! - `RUST_LOG` overrides on top of the configured level

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]

/// Logging configuration and initialization
pub mod logging;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::logging::{LogConfig, LogFormat, LogOutput, RotationConfig, init_logging};
}
