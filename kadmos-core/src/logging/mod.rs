//! Logging for kadmos
//!
//! Installs a `tracing` subscriber. `RUST_LOG` replaces the configured
//! filter entirely when set; otherwise the filter is the configured level
//! followed by the per-target directives, e.g.
//! `kadmos_core::core_dht::replication=trace`.

use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

mod error;
mod level;

pub use error::LoggingError;
pub use level::LogLevel;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Level for every target without a directive
    pub level: LogLevel,
    /// `target=level` overrides applied on top of `level`
    pub directives: Vec<String>,
    pub with_target: bool,
    /// One JSON object per event, for log shippers
    pub json_format: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { level: LogLevel::Info, directives: Vec::new(), with_target: true, json_format: false }
    }
}

impl LogConfig {
    pub fn new(level: LogLevel) -> Self {
        Self { level, ..Default::default() }
    }

    pub fn with_target(mut self, enabled: bool) -> Self {
        self.with_target = enabled;
        self
    }

    pub fn json_format(mut self, enabled: bool) -> Self {
        self.json_format = enabled;
        self
    }

    /// Add a `target=level` directive
    pub fn directive(mut self, directive: impl Into<String>) -> Self {
        self.directives.push(directive.into());
        self
    }

    /// The filter string built from the level and directives
    pub fn filter_spec(&self) -> String {
        std::iter::once(self.level.as_str().to_string())
            .chain(self.directives.iter().map(|d| d.trim().to_string()))
            .filter(|d| !d.is_empty())
            .collect::<Vec<_>>()
            .join(",")
    }

    fn env_filter(&self) -> Result<EnvFilter, LoggingError> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
        let spec = self.filter_spec();
        EnvFilter::try_new(&spec).map_err(|e| {
            LoggingError::InvalidConfiguration(format!("bad log filter '{}': {}", spec, e))
        })
    }
}

/// Initialize logging with the default configuration
pub fn init_logging() -> Result<(), LoggingError> {
    init_logging_with_config(LogConfig::default())
}

/// Install the global subscriber. Fails if one is already installed or a
/// directive does not parse.
///
/// ```
/// use kadmos_core::logging::{init_logging_with_config, LogConfig, LogLevel};
///
/// let config = LogConfig::new(LogLevel::Warn).directive("kadmos_core::core_dht=debug");
/// init_logging_with_config(config).expect("logging already initialized");
/// ```
pub fn init_logging_with_config(config: LogConfig) -> Result<(), LoggingError> {
    let filter = config.env_filter()?;
    let fmt_layer = fmt::layer().with_target(config.with_target);
    let fmt_layer =
        if config.json_format { fmt_layer.json().boxed() } else { fmt_layer.boxed() };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| LoggingError::InitializationFailed(e.to_string()))
}
