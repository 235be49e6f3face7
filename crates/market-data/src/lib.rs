//! Fingraph Market Data Crate
//!
//! This crate talks to the external sources the ingestion pipeline reads
//! from: market prices and fundamentals, news, and regulatory filings.
//!
//! # Overview
//!
//! The market data crate supports:
//! - A typed error taxonomy with retry classification
//! - Per-API minimum-interval rate limiting with exponential backoff
//! - Source adapters: Yahoo Finance (prices, profile, news) and SEC EDGAR (filings)
//! - Exchange-aware symbol resolution (e.g., NSE tickers get `.NS`)
//! - Deterministic technical indicators
//!
//! # Architecture
//!
//! ```text
//! +------------------+     +------------------+
//! |  ticker/exchange | --> |    Resolver      |  (source symbol)
//! +------------------+     +------------------+
//!                                  |
//!                                  v
//!                          +------------------+
//!                          |  SourceAdapter   |  (Yahoo, ...)
//!                          +------------------+
//!                                  |
//!                                  v
//!                          +------------------+
//!                          |   RateLimiter    |  (gate + backoff per API)
//!                          +------------------+
//!                                  |
//!                                  v
//!                          +------------------+
//!                          | MarketSnapshot   |  (validated raw payload)
//!                          +------------------+
//!                                  |
//!                                  v
//!                          +------------------+
//!                          |  IndicatorSet    |  (pure computation)
//!                          +------------------+
//! ```
//!
//! # Core Types
//!
//! - [`SourceAdapter`] - Fetches prices and fundamentals for one symbol
//! - [`NewsSource`] - Fetches news items
//! - [`DocumentCollector`] - Returns classified documents
//! - [`RateLimiter`] - Gates and retries every outbound call
//! - [`MarketSnapshot`] - One validated market-data fetch
//! - [`IndicatorSet`] - Latest indicator values with availability

pub mod errors;
pub mod indicators;
pub mod models;
pub mod provider;
pub mod registry;
pub mod resolver;

pub use errors::{MarketDataError, RetryClass};

pub use indicators::{
    compute_indicators, IndicatorSet, IndicatorValue, Momentum, TechnicalSignals, Trend,
};

pub use models::{
    classify_document, CollectedDocument, CompanyProfile, DocumentKind, MarketSnapshot,
    NewsArticle, PricePoint,
};

pub use resolver::{
    listing_region, normalize_ticker, strip_yahoo_suffix, yahoo_symbol, Exchange, ListingRegion,
};

pub use provider::sec_edgar::SecEdgarCollector;
pub use provider::yahoo::{YahooAdapter, YahooNewsSource};
pub use provider::{DocumentCollector, NewsSource, SourceAdapter, REQUEST_TIMEOUT};

pub use registry::{BackoffPolicy, RateLimitTable, RateLimiter};
