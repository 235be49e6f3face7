//! Source trait definitions.
//!
//! This module defines the seams between the ingestion pipeline and the
//! outside world: the market-data [`SourceAdapter`], the [`NewsSource`] and
//! the [`DocumentCollector`].

use async_trait::async_trait;

use crate::errors::MarketDataError;
use crate::indicators::{compute_indicators, IndicatorSet};
use crate::models::{CollectedDocument, MarketSnapshot, NewsArticle, PricePoint};
use crate::resolver::{yahoo_symbol, Exchange, ListingRegion};

/// Trait for market-data sources.
///
/// Implementations build their own requests but must send every network call
/// through [`RateLimiter::with_backoff`](crate::registry::RateLimiter::with_backoff)
/// under their [`api_name`](Self::api_name).
///
/// # Example
///
/// ```ignore
/// use async_trait::async_trait;
/// use fingraph_market_data::provider::SourceAdapter;
///
/// struct MySource {
///     limiter: Arc<RateLimiter>,
/// }
///
/// #[async_trait]
/// impl SourceAdapter for MySource {
///     fn id(&self) -> &'static str {
///         "MY_SOURCE"
///     }
///
///     fn api_name(&self) -> &str {
///         "my_source"
///     }
///
///     async fn fetch(&self, symbol: &str) -> Result<MarketSnapshot, MarketDataError> {
///         self.limiter
///             .with_backoff(self.api_name(), &BackoffPolicy::default(), || self.download(symbol))
///             .await
///     }
/// }
/// ```
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Unique identifier for this source.
    ///
    /// Should be a constant string like "YAHOO". Used for logging and as the
    /// `source` recorded on persisted data.
    fn id(&self) -> &'static str;

    /// Name of the rate-limit gate this source's calls go through.
    fn api_name(&self) -> &str;

    /// Turn a caller ticker into the symbol this source expects.
    ///
    /// Default implementation applies Yahoo exchange suffixes.
    fn resolve_symbol(
        &self,
        ticker: &str,
        exchange: Option<&Exchange>,
    ) -> Result<String, MarketDataError> {
        yahoo_symbol(ticker, exchange)
    }

    /// Fetch prices and fundamentals for an already resolved symbol.
    ///
    /// # Returns
    ///
    /// The snapshot on success, [`MarketDataError::EntityNotFound`] when the
    /// source has no such symbol, or [`MarketDataError::SourceUnavailable`]
    /// when transient failures outlasted the retry budget.
    async fn fetch(&self, symbol: &str) -> Result<MarketSnapshot, MarketDataError>;

    /// Derive indicators from a price series.
    ///
    /// Must be deterministic. Default implementation uses the built-in engine.
    fn compute_indicators(&self, prices: &[PricePoint]) -> IndicatorSet {
        compute_indicators(prices)
    }
}

/// Trait for news sources.
#[async_trait]
pub trait NewsSource: Send + Sync {
    fn id(&self) -> &'static str;

    /// Recent news for a resolved symbol, newest first when the source orders them.
    ///
    /// Items without a link are dropped by the implementation.
    async fn fetch_news(&self, symbol: &str) -> Result<Vec<NewsArticle>, MarketDataError>;
}

/// Trait for document collectors (filings, reports, transcripts).
///
/// How a collector obtains documents is its own business; the pipeline only
/// sees classified [`CollectedDocument`]s.
#[async_trait]
pub trait DocumentCollector: Send + Sync {
    fn id(&self) -> &'static str;

    /// Whether this collector serves entities listed in `region`.
    fn supports(&self, region: ListingRegion) -> bool;

    /// Collect documents for a canonical ticker (no exchange suffix).
    async fn collect(&self, ticker: &str) -> Result<Vec<CollectedDocument>, MarketDataError>;
}
