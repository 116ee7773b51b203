//! Configuration management module.
//!
//! This module provides:
//! - YAML, TOML and JSON configuration file loading
//! - Validation through the [`Validatable`] trait
//! - Environment variable overrides through the [`Configurable`] trait
//!
//! # Example
//!
//! ```rust,ignore
//! use tradedesk_core::config::{ConfigFormat, ConfigLoader};
//!
//! let config: AppConfig = ConfigLoader::new()
//!     .with_env_prefix("TRADEDESK")
//!     .load_validated("tradedesk.yaml")?;
//!
//! let text = ConfigLoader::serialize(&config, ConfigFormat::Toml)?;
//! ```

mod loader;
mod traits;

pub use loader::{ConfigFormat, ConfigLoader};
pub use traits::{Configurable, EnvLookup, Validatable, parse_override};
