use thiserror::Error;

/// Top-level error type for the Lore platform.
#[derive(Error, Debug)]
pub enum LoreError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
}
