//! Yahoo Finance source.
//!
//! Prices come from the v8 chart endpoint (one year of daily bars), company
//! profile and fundamentals from quoteSummary, news from the search endpoint.
//! Every request goes through the `yfinance` rate-limit gate.

mod models;
mod news;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use num_traits::FromPrimitive;
use reqwest::header;
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use urlencoding::encode;

use crate::errors::MarketDataError;
use crate::models::{CompanyProfile, MarketSnapshot, PricePoint};
use crate::provider::{http, SourceAdapter};
use crate::registry::{BackoffPolicy, RateLimiter};

use models::{ChartResponse, YahooQuoteSummaryResponse};

pub use news::YahooNewsSource;

/// Rate-limit gate for every Yahoo request.
pub const API_NAME: &str = "yfinance";

const PROVIDER_ID: &str = "YAHOO";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";
const BASE_URL: &str = "https://query1.finance.yahoo.com";
const SUMMARY_MODULES: &str = "price,summaryProfile,summaryDetail,defaultKeyStatistics";

// ============================================================================
// Crumb/Cookie Authentication
// ============================================================================

/// Yahoo authentication data required by quoteSummary
#[derive(Debug, Clone)]
struct CrumbData {
    cookie: String,
    crumb: String,
}

// ============================================================================
// Yahoo Adapter
// ============================================================================

/// Yahoo Finance market-data adapter.
pub struct YahooAdapter {
    client: reqwest::Client,
    limiter: Arc<RateLimiter>,
    backoff: BackoffPolicy,
    crumb: RwLock<Option<CrumbData>>,
}

impl YahooAdapter {
    pub fn new(limiter: Arc<RateLimiter>, backoff: BackoffPolicy) -> Result<Self, MarketDataError> {
        Ok(Self {
            client: http::client(USER_AGENT)?,
            limiter,
            backoff,
            crumb: RwLock::new(None),
        })
    }

    /// Get the cached crumb, fetching one first if needed.
    async fn ensure_crumb(&self) -> Result<CrumbData, MarketDataError> {
        if let Some(crumb) = self.crumb.read().await.as_ref() {
            return Ok(crumb.clone());
        }

        let crumb = self.fetch_crumb().await?;
        *self.crumb.write().await = Some(crumb.clone());
        Ok(crumb)
    }

    /// Fetch a new Yahoo authentication crumb.
    async fn fetch_crumb(&self) -> Result<CrumbData, MarketDataError> {
        // Step 1: Get cookie from fc.yahoo.com (the status is irrelevant)
        let response = self
            .client
            .get("https://fc.yahoo.com")
            .send()
            .await
            .map_err(|e| MarketDataError::from_transport(API_NAME, e))?;

        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.split_once(';').map(|(v, _)| v.to_string()))
            .ok_or_else(|| MarketDataError::malformed(API_NAME, "no cookie from fc.yahoo.com"))?;

        // Step 2: Get crumb using cookie
        let response = self
            .client
            .get(format!("{}/v1/test/getcrumb", BASE_URL))
            .header(header::COOKIE, &cookie)
            .send()
            .await
            .map_err(|e| MarketDataError::from_transport(API_NAME, e))?;
        if !response.status().is_success() {
            return Err(MarketDataError::from_status(API_NAME, response.status(), "crumb"));
        }
        let crumb = response
            .text()
            .await
            .map_err(|e| MarketDataError::from_transport(API_NAME, e))?;
        if crumb.is_empty() || crumb.contains('<') {
            return Err(MarketDataError::malformed(API_NAME, "unexpected crumb body"));
        }

        debug!("Fetched new Yahoo crumb");
        Ok(CrumbData { cookie, crumb })
    }

    async fn request_chart(&self, symbol: &str) -> Result<ChartResponse, MarketDataError> {
        let url = format!(
            "{}/v8/finance/chart/{}?range=1y&interval=1d&includeAdjustedClose=true",
            BASE_URL,
            encode(symbol)
        );
        http::get_json(self.client.get(&url), API_NAME, symbol).await
    }

    async fn request_summary(
        &self,
        symbol: &str,
    ) -> Result<YahooQuoteSummaryResponse, MarketDataError> {
        let crumb = self.ensure_crumb().await?;
        let url = format!(
            "{}/v10/finance/quoteSummary/{}?modules={}&crumb={}",
            BASE_URL,
            encode(symbol),
            SUMMARY_MODULES,
            encode(&crumb.crumb)
        );

        let result = http::get_json(
            self.client.get(&url).header(header::COOKIE, &crumb.cookie),
            API_NAME,
            symbol,
        )
        .await;

        if let Err(MarketDataError::RequestRejected { status: 401, .. }) = &result {
            // Authentication expired; the next request fetches a new crumb
            *self.crumb.write().await = None;
        }
        result
    }
}

#[async_trait]
impl SourceAdapter for YahooAdapter {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn api_name(&self) -> &str {
        API_NAME
    }

    async fn fetch(&self, symbol: &str) -> Result<MarketSnapshot, MarketDataError> {
        let chart = self
            .limiter
            .with_backoff(API_NAME, &self.backoff, || self.request_chart(symbol))
            .await?;
        let (chart_profile, prices) = parse_chart(symbol, chart)?;

        // Prices are what the entity needs; a missing profile only leaves fields empty
        let summary = self
            .limiter
            .with_backoff(API_NAME, &self.backoff, || self.request_summary(symbol))
            .await
            .and_then(|response| parse_quote_summary(symbol, response));
        let profile = match summary {
            Ok(mut profile) => {
                profile.merge_missing(chart_profile);
                profile
            }
            Err(e) => {
                warn!("{}: profile unavailable for {}: {}", PROVIDER_ID, symbol, e);
                chart_profile
            }
        };

        debug!("{}: {} bars for {}", PROVIDER_ID, prices.len(), symbol);
        Ok(MarketSnapshot::new(symbol, profile, prices, Utc::now()))
    }
}

// ============================================================================
// Response mapping
// ============================================================================

/// Validate a chart response into a partial profile and daily bars.
fn parse_chart(
    symbol: &str,
    response: ChartResponse,
) -> Result<(CompanyProfile, Vec<PricePoint>), MarketDataError> {
    if let Some(error) = response.chart.error {
        return Err(if error.code == "Not Found" {
            MarketDataError::EntityNotFound(symbol.to_string())
        } else {
            MarketDataError::malformed(
                API_NAME,
                format!(
                    "chart error for {}: {} {}",
                    symbol,
                    error.code,
                    error.description.unwrap_or_default()
                ),
            )
        });
    }

    let result = response
        .chart
        .result
        .and_then(|results| results.into_iter().next())
        .ok_or_else(|| MarketDataError::EntityNotFound(symbol.to_string()))?;

    let meta = result.meta;
    let profile = CompanyProfile {
        source: Some(PROVIDER_ID.to_string()),
        name: meta
            .long_name
            .or(meta.short_name)
            .map(|n| n.replace("&amp;", "&")),
        currency: meta.currency,
        exchange: meta.full_exchange_name.or(meta.exchange_name),
        ..Default::default()
    };

    if result.timestamp.is_empty() {
        return Err(MarketDataError::EntityNotFound(symbol.to_string()));
    }
    let quote = result.indicators.quote.into_iter().next().ok_or_else(|| {
        MarketDataError::malformed(API_NAME, format!("chart for {} has no quote block", symbol))
    })?;
    let adjclose = result
        .indicators
        .adjclose
        .into_iter()
        .next()
        .map(|a| a.adjclose)
        .unwrap_or_default();

    let at = |series: &[Option<f64>], i: usize| series.get(i).copied().flatten();
    let mut prices = Vec::with_capacity(result.timestamp.len());
    for (i, ts) in result.timestamp.iter().enumerate() {
        // Bars without a close are holidays or halts
        let Some(close) = at(&quote.close, i).and_then(Decimal::from_f64) else {
            continue;
        };
        let Some(date) = local_date(*ts, meta.gmtoffset) else {
            return Err(MarketDataError::malformed(
                API_NAME,
                format!("chart for {} has invalid timestamp {}", symbol, ts),
            ));
        };

        prices.push(PricePoint {
            date,
            open: at(&quote.open, i).and_then(Decimal::from_f64),
            high: at(&quote.high, i).and_then(Decimal::from_f64),
            low: at(&quote.low, i).and_then(Decimal::from_f64),
            close,
            adj_close: at(&adjclose, i).and_then(Decimal::from_f64),
            volume: at(&quote.volume, i)
                .filter(|v| v.is_finite() && *v >= 0.0)
                .map(|v| v as u64),
        });
    }

    if prices.is_empty() {
        return Err(MarketDataError::EntityNotFound(symbol.to_string()));
    }
    Ok((profile, prices))
}

/// Trading date at the exchange for a UTC epoch timestamp.
fn local_date(timestamp: i64, gmtoffset: i64) -> Option<NaiveDate> {
    DateTime::from_timestamp(timestamp.checked_add(gmtoffset)?, 0).map(|dt| dt.date_naive())
}

fn parse_quote_summary(
    symbol: &str,
    response: YahooQuoteSummaryResponse,
) -> Result<CompanyProfile, MarketDataError> {
    if let Some(error) = response.quote_summary.error {
        return Err(if error.code == "Not Found" {
            MarketDataError::EntityNotFound(symbol.to_string())
        } else {
            let message = format!("quoteSummary error for {}: {}", symbol, error.code);
            MarketDataError::malformed(API_NAME, message)
        });
    }

    let result = response
        .quote_summary
        .result
        .and_then(|results| results.into_iter().next())
        .ok_or_else(|| MarketDataError::EntityNotFound(symbol.to_string()))?;

    let price = result.price.as_ref();
    let summary = result.summary_profile.as_ref();
    let detail = result.summary_detail.as_ref();
    let stats = result.default_key_statistics.as_ref();
    let raw = |d: Option<&models::YahooPriceDetail>| d.and_then(|d| d.raw);

    Ok(CompanyProfile {
        source: Some(PROVIDER_ID.to_string()),
        name: price
            .and_then(|p| p.long_name.clone().or(p.short_name.clone()))
            .map(|n| n.replace("&amp;", "&")),
        sector: summary.and_then(|s| s.sector.clone()).filter(|s| !s.is_empty()),
        industry: summary.and_then(|s| s.industry.clone()).filter(|s| !s.is_empty()),
        country: summary.and_then(|s| s.country.clone()),
        currency: price.and_then(|p| p.currency.clone()),
        exchange: price.and_then(|p| p.exchange_name.clone()),
        website: summary.and_then(|s| s.website.clone()),
        description: summary.and_then(|s| s.long_business_summary.clone()),
        employees: summary.and_then(|s| s.full_time_employees),
        market_cap: raw(detail.and_then(|d| d.market_cap.as_ref()))
            .or(raw(price.and_then(|p| p.market_cap.as_ref()))),
        beta: raw(detail.and_then(|d| d.beta.as_ref()))
            .or(raw(stats.and_then(|s| s.beta.as_ref()))),
        pe_ratio: raw(detail.and_then(|d| d.trailing_pe.as_ref())),
        dividend_yield: raw(detail.and_then(|d| d.dividend_yield.as_ref())),
        week_52_high: raw(detail.and_then(|d| d.fifty_two_week_high.as_ref())),
        week_52_low: raw(detail.and_then(|d| d.fifty_two_week_low.as_ref())),
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn chart(json: &str) -> ChartResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_parse_chart() {
        let response = chart(
            r#"{"chart":{"result":[{
                "meta":{"currency":"INR","symbol":"TCS.NS","longName":"Tata Consultancy Services Limited",
                        "fullExchangeName":"NSE","gmtoffset":19800},
                "timestamp":[1704166200,1704252600,1704339000],
                "indicators":{
                    "quote":[{"open":[3800.0,null,3900.0],"high":[3850.5,null,3950.0],
                              "low":[3790.0,null,3880.0],"close":[3820.25,null,3940.1],
                              "volume":[1500000,null,2100000]}],
                    "adjclose":[{"adjclose":[3810.0,null,3930.0]}]}
            }],"error":null}}"#,
        );

        let (profile, prices) = parse_chart("TCS.NS", response).unwrap();
        assert_eq!(profile.name.as_deref(), Some("Tata Consultancy Services Limited"));
        assert_eq!(profile.currency.as_deref(), Some("INR"));
        assert_eq!(profile.exchange.as_deref(), Some("NSE"));

        // The null bar is skipped
        assert_eq!(prices.len(), 2);
        assert_eq!(prices[0].date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(prices[0].close, dec!(3820.25));
        assert_eq!(prices[0].volume, Some(1_500_000));
        assert_eq!(prices[1].adj_close, Some(dec!(3930)));
    }

    #[test]
    fn test_parse_chart_not_found() {
        let response = chart(
            r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#,
        );
        assert!(matches!(
            parse_chart("NOPE", response),
            Err(MarketDataError::EntityNotFound(ref s)) if s == "NOPE"
        ));
    }

    #[test]
    fn test_parse_chart_without_quote_block_is_malformed() {
        let response = chart(
            r#"{"chart":{"result":[{"meta":{},"timestamp":[1704166200],"indicators":{}}],"error":null}}"#,
        );
        let error = parse_chart("ACME", response).unwrap_err();
        assert!(matches!(error, MarketDataError::MalformedPayload { .. }));
    }

    #[test]
    fn test_parse_chart_with_no_closes_is_not_found() {
        let response = chart(
            r#"{"chart":{"result":[{"meta":{},"timestamp":[1704166200],
                "indicators":{"quote":[{"close":[null]}]}}],"error":null}}"#,
        );
        assert!(matches!(
            parse_chart("ACME", response),
            Err(MarketDataError::EntityNotFound(_))
        ));
    }

    #[test]
    fn test_parse_quote_summary() {
        let response: YahooQuoteSummaryResponse = serde_json::from_str(
            r#"{"quoteSummary":{"result":[{
                "price":{"currency":"USD","longName":"Acme &amp; Sons","exchangeName":"NasdaqGS"},
                "summaryProfile":{"sector":"Industrials","industry":"Machinery","country":"United States",
                                  "fullTimeEmployees":1200},
                "summaryDetail":{"marketCap":{"raw":1500000000},"trailingPE":{"raw":18.2},"dividendYield":{}},
                "defaultKeyStatistics":{"beta":{"raw":1.1}}
            }],"error":null}}"#,
        )
        .unwrap();

        let profile = parse_quote_summary("ACME", response).unwrap();
        assert_eq!(profile.name.as_deref(), Some("Acme & Sons"));
        assert_eq!(profile.sector.as_deref(), Some("Industrials"));
        assert_eq!(profile.employees, Some(1200));
        assert_eq!(profile.market_cap, Some(1.5e9));
        assert_eq!(profile.beta, Some(1.1));
        assert_eq!(profile.dividend_yield, None);
    }

    #[test]
    fn test_local_date_uses_exchange_offset() {
        // 2024-01-01T22:00:00Z is already Jan 2 in India (+05:30)
        assert_eq!(
            local_date(1704146400, 19800),
            NaiveDate::from_ymd_opt(2024, 1, 2)
        );
        assert_eq!(
            local_date(1704146400, 0),
            NaiveDate::from_ymd_opt(2024, 1, 1)
        );
    }
}
