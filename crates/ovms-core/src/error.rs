//! Common error types for the shared stores

use thiserror::Error;

/// Errors raised by the metric store
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MetricError {
    /// Metric name is not registered
    #[error("Unknown metric: {0}")]
    UnknownMetric(String),

    /// All modifier slots are in use
    #[error("No free metric modifier slot for {0}")]
    ModifiersExhausted(String),
}

/// Errors raised while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// IO error reading a config file
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Value type the store cannot represent
    #[error("Unsupported value for {param}/{instance}: {reason}")]
    Unsupported {
        param: String,
        instance: String,
        reason: String,
    },
}
