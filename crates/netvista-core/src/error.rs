use thiserror::Error;

/// Top-level error type for the netvista platform.
#[derive(Error, Debug)]
pub enum NetvistaError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}
