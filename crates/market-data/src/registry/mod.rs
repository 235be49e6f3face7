//! Per-API call registry.
//!
//! This module keeps track of every external API the sources talk to:
//! - Minimum-interval gates per API name
//! - Exponential backoff for transient failures

mod rate_limiter;

pub use rate_limiter::{BackoffPolicy, RateLimitTable, RateLimiter, DEFAULT_API};
