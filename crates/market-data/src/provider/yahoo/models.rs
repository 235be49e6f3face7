//! Yahoo Finance API response models.
//!
//! Each endpoint's response is deserialized into these structs exactly once,
//! at the adapter boundary. Everything Yahoo may omit is an `Option`.

use serde::Deserialize;

// ============================================================================
// v8 chart
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ChartResponse {
    pub chart: ChartBody,
}

#[derive(Debug, Deserialize)]
pub struct ChartBody {
    pub result: Option<Vec<ChartResult>>,
    pub error: Option<YahooApiError>,
}

#[derive(Debug, Deserialize)]
pub struct YahooApiError {
    pub code: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChartResult {
    pub meta: ChartMeta,
    #[serde(default)]
    pub timestamp: Vec<i64>,
    pub indicators: ChartIndicators,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartMeta {
    pub symbol: Option<String>,
    pub currency: Option<String>,
    pub exchange_name: Option<String>,
    pub full_exchange_name: Option<String>,
    pub long_name: Option<String>,
    pub short_name: Option<String>,
    /// Seconds east of UTC for the exchange, used to get local trading dates
    #[serde(default)]
    pub gmtoffset: i64,
}

#[derive(Debug, Deserialize)]
pub struct ChartIndicators {
    #[serde(default)]
    pub quote: Vec<ChartQuote>,
    #[serde(default)]
    pub adjclose: Vec<ChartAdjClose>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChartQuote {
    #[serde(default)]
    pub open: Vec<Option<f64>>,
    #[serde(default)]
    pub high: Vec<Option<f64>>,
    #[serde(default)]
    pub low: Vec<Option<f64>>,
    #[serde(default)]
    pub close: Vec<Option<f64>>,
    #[serde(default)]
    pub volume: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
pub struct ChartAdjClose {
    #[serde(default)]
    pub adjclose: Vec<Option<f64>>,
}

// ============================================================================
// v10 quoteSummary
// ============================================================================

/// Main response wrapper for quoteSummary API
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YahooQuoteSummaryResponse {
    pub quote_summary: YahooQuoteSummary,
}

#[derive(Debug, Deserialize)]
pub struct YahooQuoteSummary {
    pub result: Option<Vec<YahooQuoteSummaryResult>>,
    pub error: Option<YahooApiError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YahooQuoteSummaryResult {
    pub price: Option<YahooPriceData>,
    pub summary_profile: Option<YahooSummaryProfile>,
    pub summary_detail: Option<YahooSummaryDetail>,
    pub default_key_statistics: Option<YahooKeyStatistics>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YahooPriceData {
    pub currency: Option<String>,
    pub short_name: Option<String>,
    pub long_name: Option<String>,
    pub exchange_name: Option<String>,
    pub market_cap: Option<YahooPriceDetail>,
}

/// Numeric value with raw and formatted forms.
///
/// Yahoo sends `{}` when it has no value, which leaves `raw` empty.
#[derive(Debug, Deserialize, Clone)]
pub struct YahooPriceDetail {
    pub raw: Option<f64>,
}

/// Company info
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YahooSummaryProfile {
    pub sector: Option<String>,
    pub industry: Option<String>,
    pub website: Option<String>,
    pub long_business_summary: Option<String>,
    pub country: Option<String>,
    pub full_time_employees: Option<u64>,
}

/// Financial metrics
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YahooSummaryDetail {
    pub market_cap: Option<YahooPriceDetail>,
    #[serde(rename = "trailingPE")]
    pub trailing_pe: Option<YahooPriceDetail>,
    pub dividend_yield: Option<YahooPriceDetail>,
    pub beta: Option<YahooPriceDetail>,
    pub fifty_two_week_high: Option<YahooPriceDetail>,
    pub fifty_two_week_low: Option<YahooPriceDetail>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YahooKeyStatistics {
    pub beta: Option<YahooPriceDetail>,
}

// ============================================================================
// v1 search (news)
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct YahooSearchResponse {
    #[serde(default)]
    pub news: Vec<YahooNewsItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YahooNewsItem {
    pub title: Option<String>,
    pub publisher: Option<String>,
    pub link: Option<String>,
    pub provider_publish_time: Option<i64>,
    pub summary: Option<String>,
}
