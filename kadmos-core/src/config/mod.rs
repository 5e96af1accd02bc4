//! Configuration for a kadmos node
//!
//! Defaults, a TOML file, or `KADMOS_<SECTION>_<KEY>` environment
//! overrides on top of the defaults. Durations use humantime notation
//! ("30s", "5m", "1h").

use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::core_dht::DhtConfig;
use crate::logging::{LogConfig, LogLevel};

mod error;

pub use error::ConfigError;

const ENV_PREFIX: &str = "KADMOS";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage and republish settings
    pub dht: DhtConfig,

    pub logging: LogConfig,
}

impl Config {
    /// Defaults overridden by environment variables, e.g.
    /// `KADMOS_DHT_CLEANER_PERIOD=30s` or `KADMOS_LOGGING_LEVEL=debug`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let overrides = EnvOverrides { lookup };

        let dht = &mut config.dht;
        overrides.parse("DHT_REPLICATION_PARAMETER", &mut dht.replication_parameter)?;
        overrides.parse("DHT_VALUE_TYPE_CACHE_SIZE", &mut dht.value_type_cache_size)?;
        overrides.duration("DHT_VALUE_EXPIRATION", &mut dht.value_expiration)?;
        overrides.duration("DHT_CLEANER_INITIAL_DELAY", &mut dht.cleaner_initial_delay)?;
        overrides.duration("DHT_CLEANER_PERIOD", &mut dht.cleaner_period)?;
        overrides.duration("DHT_PUBLISHER_INITIAL_DELAY", &mut dht.publisher_initial_delay)?;
        overrides.duration("DHT_PUBLISHER_PERIOD", &mut dht.publisher_period)?;
        overrides.parse("DHT_MAX_VALUES_PER_KEY", &mut dht.max_values_per_key)?;
        overrides.parse("DHT_LIMIT_VALUES_PER_ADDRESS", &mut dht.limit_values_per_address)?;
        overrides.parse("DHT_MAX_VALUES_PER_ADDRESS", &mut dht.max_values_per_address)?;
        overrides.parse("DHT_LIMIT_VALUES_PER_NETWORK", &mut dht.limit_values_per_network)?;
        overrides.parse("DHT_MAX_VALUES_PER_NETWORK", &mut dht.max_values_per_network)?;
        overrides.parse("DHT_VALIDATE_VALUE_CREATOR", &mut dht.validate_value_creator)?;
        overrides.parse("DHT_REQUEST_LOAD_SMOOTHING", &mut dht.request_load_smoothing)?;
        overrides.duration("DHT_REQUEST_LOAD_NULLING_DELAY", &mut dht.request_load_nulling_delay)?;

        let logging = &mut config.logging;
        overrides.parse::<LogLevel>("LOGGING_LEVEL", &mut logging.level)?;
        overrides.parse("LOGGING_JSON", &mut logging.json_format)?;
        overrides.parse("LOGGING_WITH_TARGET", &mut logging.with_target)?;
        overrides.list("LOGGING_DIRECTIVES", &mut logging.directives);

        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file. Missing sections and keys take defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::FileReadError(e.to_string()))?;

        let config: Self =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.dht.validate()
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let contents = self.to_toml()?;
        std::fs::write(path, contents).map_err(|e| ConfigError::FileWriteError(e.to_string()))
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))
    }
}

struct EnvOverrides<F> {
    lookup: F,
}

impl<F> EnvOverrides<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<(String, String)> {
        let name = format!("{}_{}", ENV_PREFIX, key);
        (self.lookup)(&name).map(|value| (name, value))
    }

    fn parse<T>(&self, key: &str, target: &mut T) -> Result<(), ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        if let Some((name, value)) = self.get(key) {
            *target = value
                .trim()
                .parse()
                .map_err(|e: T::Err| ConfigError::InvalidValue { key: name, reason: e.to_string() })?;
        }
        Ok(())
    }

    /// Comma-separated list, replacing the default
    fn list(&self, key: &str, target: &mut Vec<String>) {
        if let Some((_, value)) = self.get(key) {
            *target = value
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(String::from)
                .collect();
        }
    }

    fn duration(&self, key: &str, target: &mut Duration) -> Result<(), ConfigError> {
        if let Some((name, value)) = self.get(key) {
            *target = humantime_serde::re::humantime::parse_duration(value.trim())
                .map_err(|e| ConfigError::InvalidValue { key: name, reason: e.to_string() })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.dht, DhtConfig::default());
    }

    #[test]
    fn test_env_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("KADMOS_DHT_REPLICATION_PARAMETER", "8"),
            ("KADMOS_DHT_CLEANER_PERIOD", "30s"),
            ("KADMOS_DHT_VALIDATE_VALUE_CREATOR", "false"),
            ("KADMOS_LOGGING_LEVEL", "DEBUG"),
            ("KADMOS_LOGGING_JSON", "true"),
            ("KADMOS_LOGGING_DIRECTIVES", "kadmos_core::core_dht=trace, tokio=warn"),
        ]))
        .unwrap();

        assert_eq!(config.dht.replication_parameter, 8);
        assert_eq!(config.dht.cleaner_period, Duration::from_secs(30));
        assert!(!config.dht.validate_value_creator);
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert!(config.logging.json_format);
        assert_eq!(config.logging.directives, vec!["kadmos_core::core_dht=trace", "tokio=warn"]);
    }

    #[test]
    fn test_env_invalid_value_names_variable() {
        let err = Config::from_lookup(lookup(&[("KADMOS_DHT_PUBLISHER_PERIOD", "soon")]))
            .unwrap_err();
        assert!(err.to_string().contains("KADMOS_DHT_PUBLISHER_PERIOD"));

        let err = Config::from_lookup(lookup(&[("KADMOS_DHT_MAX_VALUES_PER_KEY", "-1")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_env_overrides_are_validated() {
        let result = Config::from_lookup(lookup(&[("KADMOS_DHT_REPLICATION_PARAMETER", "0")]));
        assert!(matches!(result, Err(ConfigError::ValidationFailed(_))));
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kadmos.toml");

        let mut config = Config::default();
        config.dht = config.dht.with_replication_parameter(7);
        config.logging.level = LogLevel::Trace;
        config.save_to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kadmos.toml");
        std::fs::write(&path, "[dht]\npublisher_period = \"10m\"\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.dht.publisher_period, Duration::from_secs(600));
        assert_eq!(config.logging, LogConfig::default());
    }

    #[test]
    fn test_missing_file() {
        let result = Config::from_file("/nonexistent/kadmos.toml");
        assert!(matches!(result, Err(ConfigError::FileReadError(_))));
    }
}
