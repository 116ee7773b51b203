//! Configuration traits for validation and environment overrides.

use crate::error::ConfigError;

/// Trait for types that can be validated.
///
/// # Example
///
/// ```rust
/// use tradedesk_core::config::Validatable;
/// use tradedesk_core::error::ConfigError;
///
/// struct EndpointConfig {
///     url: String,
/// }
///
/// impl Validatable for EndpointConfig {
///     fn validate(&self) -> Result<(), ConfigError> {
///         if self.url.is_empty() {
///             return Err(ConfigError::missing_field("url"));
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait Validatable {
    /// Validates the configuration.
    fn validate(&self) -> Result<(), ConfigError>;
}

/// Lookup function used to resolve environment variables.
pub type EnvLookup<'a> = &'a dyn Fn(&str) -> Option<String>;

/// Trait for types that support environment variable overrides.
///
/// Implementors only provide [`Configurable::apply_overrides_with`]; the
/// process environment is wired in by [`Configurable::apply_env_overrides`].
pub trait Configurable: Sized {
    /// Applies overrides resolved through `lookup`.
    ///
    /// # Arguments
    ///
    /// * `prefix` - The variable prefix (e.g., "TRADEDESK")
    /// * `lookup` - Resolves a variable name to its value
    fn apply_overrides_with(&mut self, prefix: &str, lookup: EnvLookup<'_>)
    -> Result<(), ConfigError>;

    /// Returns the variable names that can override this configuration.
    fn env_var_names(prefix: &str) -> Vec<String>;

    /// Applies overrides from the process environment.
    fn apply_env_overrides(&mut self, prefix: &str) -> Result<(), ConfigError> {
        self.apply_overrides_with(prefix, &|name| std::env::var(name).ok())
    }
}

/// Parses an override value, mapping failures to `ConfigError::InvalidEnvVar`.
pub fn parse_override<T>(name: &str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidEnvVar {
        name: name.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct PoolConfig {
        size: u32,
    }

    impl Validatable for PoolConfig {
        fn validate(&self) -> Result<(), ConfigError> {
            if self.size == 0 {
                return Err(ConfigError::invalid_value("size", "must be positive"));
            }
            Ok(())
        }
    }

    impl Configurable for PoolConfig {
        fn apply_overrides_with(
            &mut self,
            prefix: &str,
            lookup: EnvLookup<'_>,
        ) -> Result<(), ConfigError> {
            let name = format!("{prefix}_POOL_SIZE");
            if let Some(raw) = lookup(&name) {
                self.size = parse_override(&name, &raw)?;
            }
            Ok(())
        }

        fn env_var_names(prefix: &str) -> Vec<String> {
            vec![format!("{prefix}_POOL_SIZE")]
        }
    }

    #[test]
    fn test_validatable() {
        assert!(PoolConfig { size: 4 }.validate().is_ok());
        let err = PoolConfig { size: 0 }.validate().unwrap_err();
        assert!(err.to_string().contains("size"));
    }

    #[test]
    fn test_override_applied() {
        let vars = HashMap::from([("APP_POOL_SIZE".to_string(), "16".to_string())]);
        let mut config = PoolConfig { size: 4 };
        config
            .apply_overrides_with("APP", &|name| vars.get(name).cloned())
            .unwrap();
        assert_eq!(config.size, 16);
    }

    #[test]
    fn test_override_parse_failure() {
        let mut config = PoolConfig { size: 4 };
        let err = config
            .apply_overrides_with("APP", &|_| Some("many".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar { .. }));
        assert_eq!(config.size, 4);
    }

    #[test]
    fn test_env_var_names() {
        assert_eq!(PoolConfig::env_var_names("APP"), vec!["APP_POOL_SIZE"]);
    }
}
