//! Error types and retry classification for the market data crate.
//!
//! This module provides:
//! - [`MarketDataError`]: The main error enum for all source operations
//! - [`RetryClass`]: Classification for determining retry behavior

mod retry;

pub use retry::RetryClass;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, MarketDataError>;

/// Errors that can occur while talking to an external data source.
///
/// Each variant is classified into a [`RetryClass`] via the [`retry_class`](Self::retry_class)
/// method, which determines whether the backoff wrapper attempts the call again.
#[derive(Error, Debug)]
pub enum MarketDataError {
    /// The source has no data for this entity.
    /// This is a terminal error - retrying won't help.
    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    /// The identifier cannot be turned into a source symbol.
    #[error("Invalid symbol: {0}")]
    InvalidSymbol(String),

    /// The source answered, but the response did not have the expected shape.
    #[error("Malformed payload from {provider}: {message}")]
    MalformedPayload {
        /// The source that returned the payload
        provider: String,
        /// What was wrong with it, including the key fields
        message: String,
    },

    /// The source rate limited the request (HTTP 429).
    /// Should retry with exponential backoff.
    #[error("Rate limited: {provider}")]
    RateLimited {
        /// The source that rate limited the request
        provider: String,
    },

    /// The request to the source timed out.
    /// Should retry with exponential backoff.
    #[error("Timeout: {provider}")]
    Timeout {
        /// The source that timed out
        provider: String,
    },

    /// The source failed with a 5xx status.
    #[error("Server error from {provider}: HTTP {status}")]
    ServerError { provider: String, status: u16 },

    /// The source refused the request with a 4xx status other than 404/429.
    #[error("Request rejected by {provider}: HTTP {status}")]
    RequestRejected { provider: String, status: u16 },

    /// The adapter does not implement this operation.
    #[error("{operation} is not supported by {provider}")]
    NotSupported {
        provider: String,
        operation: String,
    },

    /// Transient failures persisted through every retry.
    #[error("Source unavailable: {provider} after {attempts} attempts: {last_error}")]
    SourceUnavailable {
        /// The API name whose gate the attempts went through
        provider: String,
        /// Total number of calls made
        attempts: u32,
        /// The error returned by the final attempt
        #[source]
        last_error: Box<MarketDataError>,
    },

    /// A network error occurred while communicating with a source.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl MarketDataError {
    /// Returns the retry classification for this error.
    ///
    /// - [`RetryClass::Never`]: Don't retry, the error is terminal
    /// - [`RetryClass::WithBackoff`]: Retry with exponential backoff
    ///
    /// # Examples
    ///
    /// ```
    /// use fingraph_market_data::errors::{MarketDataError, RetryClass};
    ///
    /// let error = MarketDataError::RateLimited { provider: "yfinance".to_string() };
    /// assert_eq!(error.retry_class(), RetryClass::WithBackoff);
    ///
    /// let error = MarketDataError::EntityNotFound("INVALID".to_string());
    /// assert_eq!(error.retry_class(), RetryClass::Never);
    /// ```
    pub fn retry_class(&self) -> RetryClass {
        match self {
            // Terminal errors - never retry
            Self::EntityNotFound(_)
            | Self::InvalidSymbol(_)
            | Self::MalformedPayload { .. }
            | Self::RequestRejected { .. }
            | Self::NotSupported { .. } => RetryClass::Never,

            // Already exhausted
            Self::SourceUnavailable { .. } => RetryClass::Never,

            // Transient errors - retry with backoff
            Self::RateLimited { .. } | Self::Timeout { .. } | Self::ServerError { .. } => {
                RetryClass::WithBackoff
            }

            // A body that fails to decode will fail the same way next time
            Self::Network(e) if e.is_decode() => RetryClass::Never,
            Self::Network(_) => RetryClass::WithBackoff,
        }
    }

    /// Map a non-success HTTP status to an error.
    ///
    /// `entity` is used for the 404 case so the caller sees which lookup failed.
    pub fn from_status(provider: &str, status: reqwest::StatusCode, entity: &str) -> Self {
        let provider = provider.to_string();
        match status.as_u16() {
            404 => Self::EntityNotFound(entity.to_string()),
            429 => Self::RateLimited { provider },
            408 => Self::Timeout { provider },
            s if s >= 500 => Self::ServerError {
                provider,
                status: s,
            },
            s => Self::RequestRejected {
                provider,
                status: s,
            },
        }
    }

    /// Map a transport error, pulling timeouts out into their own variant.
    pub fn from_transport(provider: &str, error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout {
                provider: provider.to_string(),
            }
        } else if let Some(status) = error.status() {
            Self::from_status(provider, status, "")
        } else {
            Self::Network(error)
        }
    }

    /// Shorthand for a [`MalformedPayload`](Self::MalformedPayload) error.
    pub fn malformed(provider: &str, message: impl Into<String>) -> Self {
        Self::MalformedPayload {
            provider: provider.to_string(),
            message: message.into(),
        }
    }
}
