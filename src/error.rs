//! Error types

/// Errors that can occur while running a conditioner
#[derive(thiserror::Error, Debug)]
pub enum ConditionerError {
    #[error("No Tokio runtime available to drive the monitoring task")]
    NoRuntime,

    #[error("Streamer update failed: {0:#}")]
    Streamer(#[from] anyhow::Error),

    #[error("Strategy error: {0}")]
    Strategy(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors raised while loading or validating configuration and scenarios
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Invalid(String),
}

/// Result type for conditioner operations
pub type Result<T> = std::result::Result<T, ConditionerError>;
