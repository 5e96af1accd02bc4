/*
    DhtConfig - tunables of the storage and republish subsystem

    Responsibilities:
    `dht_config.rs` defines the replication parameter, value lifetime, the
    periods of the database cleaner and the storable publisher, the store's
    flood limits and the request load estimator.

    Inputs:
    - configuration file section `[dht]` or defaults
    - builder calls from embedding code and tests

    Outputs:
    - static values to the rest of the DHT subsystem
*/

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::ConfigError;

use super::value_type::DEFAULT_TYPE_CACHE_SIZE;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DhtConfig {
    /// Replication parameter (k): how many nodes closest to a key hold its values
    pub replication_parameter: usize,

    /// Capacity of the canonical value type cache
    pub value_type_cache_size: usize,

    /// How long a remote value lives without being republished
    #[serde(with = "humantime_serde")]
    pub value_expiration: Duration,

    /// Delay before the first database cleaner pass
    #[serde(with = "humantime_serde")]
    pub cleaner_initial_delay: Duration,

    /// Delay between the end of one cleaner pass and the start of the next
    #[serde(with = "humantime_serde")]
    pub cleaner_period: Duration,

    /// Delay before the first publisher tick
    #[serde(with = "humantime_serde")]
    pub publisher_initial_delay: Duration,

    /// Delay between publisher ticks
    #[serde(with = "humantime_serde")]
    pub publisher_period: Duration,

    /// Maximum number of creators per key accepted by the default admission policy
    pub max_values_per_key: usize,

    /// Limit the number of values a single IPv4 address may have stored
    pub limit_values_per_address: bool,
    pub max_values_per_address: usize,

    /// Limit the number of values a single /24 network may have stored
    pub limit_values_per_network: bool,
    pub max_values_per_network: usize,

    /// Reject indirect values whose creator has an invalid or private address
    pub validate_value_creator: bool,

    /// Weight of the newest sample in the request load average
    pub request_load_smoothing: f32,

    /// Request gaps longer than this reset the load to zero
    #[serde(with = "humantime_serde")]
    pub request_load_nulling_delay: Duration,
}

impl Default for DhtConfig {
    fn default() -> Self {
        DhtConfig {
            replication_parameter: 20,
            value_type_cache_size: DEFAULT_TYPE_CACHE_SIZE,
            value_expiration: Duration::from_secs(60 * 60),
            cleaner_initial_delay: Duration::from_secs(5 * 60),
            cleaner_period: Duration::from_secs(5 * 60),
            publisher_initial_delay: Duration::from_secs(60),
            publisher_period: Duration::from_secs(5 * 60),
            max_values_per_key: 5,
            limit_values_per_address: true,
            max_values_per_address: 5,
            limit_values_per_network: true,
            max_values_per_network: 20,
            validate_value_creator: true,
            request_load_smoothing: 0.25,
            request_load_nulling_delay: Duration::from_secs(60),
        }
    }
}

impl DhtConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: set the replication parameter (k)
    pub fn with_replication_parameter(mut self, k: usize) -> Self {
        self.replication_parameter = k;
        self
    }

    /// Builder: set value expiration
    pub fn with_value_expiration(mut self, expiration: Duration) -> Self {
        self.value_expiration = expiration;
        self
    }

    /// Builder: set the cleaner schedule
    pub fn with_cleaner_period(mut self, initial_delay: Duration, period: Duration) -> Self {
        self.cleaner_initial_delay = initial_delay;
        self.cleaner_period = period;
        self
    }

    /// Builder: set the publisher schedule
    pub fn with_publisher_period(mut self, initial_delay: Duration, period: Duration) -> Self {
        self.publisher_initial_delay = initial_delay;
        self.publisher_period = period;
        self
    }

    /// Builder: enable or disable both flood limits
    pub fn with_flood_limits(mut self, enabled: bool) -> Self {
        self.limit_values_per_address = enabled;
        self.limit_values_per_network = enabled;
        self
    }

    /// Builder: enable or disable creator address validation
    pub fn with_creator_validation(mut self, enabled: bool) -> Self {
        self.validate_value_creator = enabled;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.replication_parameter == 0 {
            return Err(ConfigError::ValidationFailed(
                "replication_parameter must be greater than 0".to_string(),
            ));
        }

        if self.value_type_cache_size == 0 {
            return Err(ConfigError::ValidationFailed(
                "value_type_cache_size must be greater than 0".to_string(),
            ));
        }

        if self.cleaner_period.is_zero() || self.publisher_period.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "cleaner_period and publisher_period must be non-zero".to_string(),
            ));
        }

        if self.max_values_per_key == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_values_per_key must be greater than 0".to_string(),
            ));
        }

        if !(self.request_load_smoothing > 0.0 && self.request_load_smoothing <= 1.0) {
            return Err(ConfigError::ValidationFailed(format!(
                "request_load_smoothing must be in (0, 1], got {}",
                self.request_load_smoothing
            )));
        }

        Ok(())
    }

    /// Short periods and no flood limits, for tests and local runs
    pub fn test_config() -> Self {
        DhtConfig {
            replication_parameter: 3,
            value_expiration: Duration::from_secs(30),
            cleaner_initial_delay: Duration::from_millis(100),
            cleaner_period: Duration::from_millis(100),
            publisher_initial_delay: Duration::from_millis(100),
            publisher_period: Duration::from_millis(100),
            limit_values_per_address: false,
            limit_values_per_network: false,
            validate_value_creator: false,
            ..Default::default()
        }
    }
}
