//! Core error types for fingraph.

use std::path::PathBuf;

use thiserror::Error;

use fingraph_graph::GraphError;
use fingraph_market_data::MarketDataError;

/// Type alias for Result using the core error type.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Market data operation failed: {0}")]
    MarketData(#[from] MarketDataError),

    #[error("Graph operation failed: {0}")]
    Graph(#[from] GraphError),

    #[error("Cache operation failed: {0}")]
    Cache(#[from] CacheError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

/// Errors raised while loading or validating configuration. All are fatal
/// at startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid value for {key}: '{value}'")]
    InvalidValue { key: String, value: String },

    #[error("Invalid rate limit for '{api}': {message}")]
    InvalidRateLimit { api: String, message: String },

    #[error("{0}")]
    Invalid(String),

    #[error("NEO4J_PASSWORD is required when persistence is enabled")]
    MissingPassword,
}

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize cache entry: {0}")]
    Serialize(#[from] serde_json::Error),
}
