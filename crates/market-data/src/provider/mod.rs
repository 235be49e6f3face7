//! Source abstractions and implementations.
//!
//! This module contains:
//! - The [`SourceAdapter`], [`NewsSource`] and [`DocumentCollector`] traits
//! - Yahoo Finance market data and news
//! - SEC EDGAR filings
//!
//! Every implementation takes a shared [`RateLimiter`](crate::registry::RateLimiter)
//! at construction and routes each request through its backoff wrapper.

mod http;
mod traits;

pub mod sec_edgar;
pub mod yahoo;

pub use http::REQUEST_TIMEOUT;
pub use traits::{DocumentCollector, NewsSource, SourceAdapter};
