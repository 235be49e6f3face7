//! SEC EDGAR filings collector.
//!
//! Resolves a ticker to its CIK through the published ticker map, then lists
//! recent filings from the submissions API. SEC asks for a descriptive
//! `User-Agent` (name and contact) and at most 10 requests per second.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::errors::MarketDataError;
use crate::models::{CollectedDocument, DocumentKind};
use crate::provider::{http, DocumentCollector};
use crate::registry::{BackoffPolicy, RateLimiter};
use crate::resolver::{strip_yahoo_suffix, ListingRegion};

/// Rate-limit gate for every SEC request.
pub const API_NAME: &str = "sec_edgar";

const PROVIDER_ID: &str = "SEC_EDGAR";
const TICKERS_URL: &str = "https://www.sec.gov/files/company_tickers.json";
const SUBMISSIONS_URL: &str = "https://data.sec.gov/submissions";
const ARCHIVES_URL: &str = "https://www.sec.gov/Archives/edgar/data";

/// Forms collected by default.
pub const DEFAULT_FORMS: &[&str] = &["10-K", "10-Q", "8-K"];

#[derive(Debug, Deserialize)]
struct TickerEntry {
    cik_str: u64,
    ticker: String,
}

#[derive(Debug, Deserialize)]
struct Submissions {
    filings: SubmissionFilings,
}

#[derive(Debug, Deserialize)]
struct SubmissionFilings {
    recent: RecentFilings,
}

/// Column-oriented listing: index `i` of every vector is one filing.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecentFilings {
    #[serde(default)]
    accession_number: Vec<String>,
    #[serde(default)]
    filing_date: Vec<String>,
    #[serde(default)]
    form: Vec<String>,
    #[serde(default)]
    primary_document: Vec<String>,
    #[serde(default)]
    primary_doc_description: Vec<String>,
}

pub struct SecEdgarCollector {
    client: reqwest::Client,
    limiter: Arc<RateLimiter>,
    backoff: BackoffPolicy,
    forms: Vec<String>,
    max_filings: usize,
    ciks: OnceCell<HashMap<String, u64>>,
}

impl SecEdgarCollector {
    pub fn new(
        limiter: Arc<RateLimiter>,
        backoff: BackoffPolicy,
        user_agent: &str,
        max_filings: usize,
    ) -> Result<Self, MarketDataError> {
        Ok(Self {
            client: http::client(user_agent)?,
            limiter,
            backoff,
            forms: DEFAULT_FORMS.iter().map(|f| f.to_string()).collect(),
            max_filings,
            ciks: OnceCell::new(),
        })
    }

    /// Restrict collection to these form types.
    pub fn with_forms(mut self, forms: Vec<String>) -> Self {
        self.forms = forms;
        self
    }

    /// Ticker to CIK map, downloaded once per collector.
    async fn cik_map(&self) -> Result<&HashMap<String, u64>, MarketDataError> {
        self.ciks
            .get_or_try_init(|| async {
                let entries: HashMap<String, TickerEntry> = self
                    .limiter
                    .with_backoff(API_NAME, &self.backoff, || {
                        http::get_json(self.client.get(TICKERS_URL), API_NAME, "company_tickers")
                    })
                    .await?;
                info!("Loaded {} SEC ticker mappings", entries.len());
                Ok::<_, MarketDataError>(
                    entries
                        .into_values()
                        .map(|e| (e.ticker.to_ascii_uppercase(), e.cik_str))
                        .collect(),
                )
            })
            .await
    }

    async fn submissions(&self, cik: u64) -> Result<Submissions, MarketDataError> {
        let url = format!("{}/CIK{:010}.json", SUBMISSIONS_URL, cik);
        let entity = format!("CIK{:010}", cik);
        self.limiter
            .with_backoff(API_NAME, &self.backoff, || {
                http::get_json(self.client.get(&url), API_NAME, &entity)
            })
            .await
    }
}

#[async_trait]
impl DocumentCollector for SecEdgarCollector {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn supports(&self, region: ListingRegion) -> bool {
        region == ListingRegion::Us
    }

    async fn collect(&self, ticker: &str) -> Result<Vec<CollectedDocument>, MarketDataError> {
        let ticker = strip_yahoo_suffix(ticker).to_ascii_uppercase();
        let cik = *self
            .cik_map()
            .await?
            .get(&ticker)
            .ok_or_else(|| MarketDataError::EntityNotFound(ticker.clone()))?;

        let submissions = self.submissions(cik).await?;
        let recent = &submissions.filings.recent;
        let documents = recent_documents(cik, recent, &self.forms, self.max_filings)?;
        debug!("{}: {} filings for {} (CIK {})", PROVIDER_ID, documents.len(), ticker, cik);
        Ok(documents)
    }
}

/// Turn the column-oriented listing into documents, newest first as SEC lists them.
fn recent_documents(
    cik: u64,
    recent: &RecentFilings,
    forms: &[String],
    limit: usize,
) -> Result<Vec<CollectedDocument>, MarketDataError> {
    let n = recent.form.len();
    if recent.accession_number.len() != n
        || recent.filing_date.len() != n
        || recent.primary_document.len() != n
    {
        return Err(MarketDataError::malformed(
            API_NAME,
            format!("CIK{:010}: filing columns have different lengths", cik),
        ));
    }

    let mut documents = Vec::new();
    for i in 0..n {
        if documents.len() >= limit {
            break;
        }
        let form = &recent.form[i];
        if !forms.iter().any(|f| f == form) {
            continue;
        }

        let accession = recent.accession_number[i].replace('-', "");
        let date = NaiveDate::parse_from_str(&recent.filing_date[i], "%Y-%m-%d").ok();
        let description = recent
            .primary_doc_description
            .get(i)
            .filter(|d| !d.is_empty())
            .cloned()
            .unwrap_or_else(|| form.clone());

        documents.push(CollectedDocument {
            kind: DocumentKind::from_sec_form(form),
            title: format!("{} {} ({})", form, description, recent.filing_date[i]),
            date,
            url: format!(
                "{}/{}/{}/{}",
                ARCHIVES_URL, cik, accession, recent.primary_document[i]
            ),
            source: PROVIDER_ID.to_string(),
            accession: Some(recent.accession_number[i].clone()),
            content: None,
        });
    }
    Ok(documents)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing() -> RecentFilings {
        serde_json::from_str(
            r#"{
                "accessionNumber": ["0000320193-24-000123", "0000320193-24-000110", "0000320193-24-000081"],
                "filingDate": ["2024-11-01", "2024-10-31", "2024-08-02"],
                "form": ["10-K", "4", "10-Q"],
                "primaryDocument": ["aapl-20240928.htm", "xslF345X05/wk-form4.xml", "aapl-20240629.htm"],
                "primaryDocDescription": ["10-K", "", "10-Q"]
            }"#,
        )
        .unwrap()
    }

    fn forms() -> Vec<String> {
        DEFAULT_FORMS.iter().map(|f| f.to_string()).collect()
    }

    #[test]
    fn test_recent_documents_filters_forms() {
        let documents = recent_documents(320193, &listing(), &forms(), 10).unwrap();
        assert_eq!(documents.len(), 2);

        let annual = &documents[0];
        assert_eq!(annual.kind, DocumentKind::AnnualReport);
        assert_eq!(annual.date, NaiveDate::from_ymd_opt(2024, 11, 1));
        assert_eq!(
            annual.url,
            "https://www.sec.gov/Archives/edgar/data/320193/000032019324000123/aapl-20240928.htm"
        );
        assert_eq!(annual.accession.as_deref(), Some("0000320193-24-000123"));
        assert_eq!(documents[1].kind, DocumentKind::QuarterlyReport);
    }

    #[test]
    fn test_recent_documents_respects_limit() {
        let documents = recent_documents(320193, &listing(), &forms(), 1).unwrap();
        assert_eq!(documents.len(), 1);
    }

    #[test]
    fn test_ragged_columns_are_malformed() {
        let mut recent = listing();
        recent.filing_date.pop();
        assert!(matches!(
            recent_documents(320193, &recent, &forms(), 10),
            Err(MarketDataError::MalformedPayload { .. })
        ));
    }

    #[test]
    fn test_ticker_map_entry() {
        let entries: HashMap<String, TickerEntry> = serde_json::from_str(
            r#"{"0":{"cik_str":320193,"ticker":"AAPL","title":"Apple Inc."}}"#,
        )
        .unwrap();
        assert_eq!(entries["0"].cik_str, 320193);
        assert_eq!(entries["0"].ticker, "AAPL");
    }
}
