//! Observability (structured logging and tracing)
//!
//! Admission attempts run inside an `admission` span carrying the owner id and
//! MIME type, so every event of one attempt can be correlated. This module
//! installs the subscriber that renders those spans.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable, multi-line output
    Pretty,
    /// One JSON object per event
    Json,
}

/// Observability configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservabilityConfig {
    /// Service name attached to the startup event
    pub service_name: String,

    /// Filter used when `RUST_LOG` is unset
    pub default_filter: String,

    /// Output format
    pub format: LogFormat,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            Self {
                service_name: "taleforge".to_string(),
                default_filter: "debug,taleforge=trace".to_string(),
                format: LogFormat::Pretty,
            }
        } else {
            Self {
                service_name: "taleforge".to_string(),
                default_filter: "info".to_string(),
                format: LogFormat::Json,
            }
        }
    }
}

impl ObservabilityConfig {
    /// Create new observability config
    #[must_use]
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Default::default()
        }
    }

    /// Override the filter used when `RUST_LOG` is unset
    #[must_use]
    pub fn with_default_filter(mut self, filter: impl Into<String>) -> Self {
        self.default_filter = filter.into();
        self
    }

    /// Force JSON output
    #[must_use]
    pub fn with_json(mut self) -> Self {
        self.format = LogFormat::Json;
        self
    }

    /// Force pretty output
    #[must_use]
    pub fn with_pretty(mut self) -> Self {
        self.format = LogFormat::Pretty;
        self
    }
}

/// Initialize observability with defaults
///
/// - Pretty output and `debug,taleforge=trace` in debug builds
/// - JSON output and `info` in release builds
/// - `RUST_LOG` overrides the filter
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed
///
/// # Example
///
/// ```rust,no_run
/// use taleforge::observability;
///
/// # fn main() -> anyhow::Result<()> {
/// observability::init()?;
/// tracing::info!("Application started");
/// # Ok(())
/// # }
/// ```
pub fn init() -> anyhow::Result<()> {
    init_with(&ObservabilityConfig::default())
}

/// Initialize observability from an explicit configuration
///
/// # Errors
///
/// Returns an error if the default filter cannot be parsed or a global
/// subscriber is already installed
pub fn init_with(config: &ObservabilityConfig) -> anyhow::Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.default_filter)?,
    };

    match config.format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init()?,
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()?,
    }

    tracing::debug!(service = %config.service_name, "observability initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ObservabilityConfig::default();
        assert_eq!(config.service_name, "taleforge");

        #[cfg(debug_assertions)]
        {
            assert_eq!(config.format, LogFormat::Pretty);
            assert_eq!(config.default_filter, "debug,taleforge=trace");
        }

        #[cfg(not(debug_assertions))]
        assert_eq!(config.format, LogFormat::Json);
    }

    #[test]
    fn test_builder() {
        let config = ObservabilityConfig::new("taleforge-cli")
            .with_default_filter("warn")
            .with_json();

        assert_eq!(config.service_name, "taleforge-cli");
        assert_eq!(config.default_filter, "warn");
        assert_eq!(config.format, LogFormat::Json);
    }

    #[test]
    fn test_invalid_filter_is_an_error() {
        // Only reached when RUST_LOG is unset; an unparseable directive fails.
        if std::env::var("RUST_LOG").is_err() {
            let config = ObservabilityConfig::default().with_default_filter("taleforge=[");
            assert!(init_with(&config).is_err());
        }
    }
}
