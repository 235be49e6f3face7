//! Node payloads written by the store. Each type names its natural key.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A listed company, keyed by ticker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityNode {
    pub ticker: String,
    pub name: Option<String>,
    pub sector: Option<String>,
    pub industry: Option<String>,
    pub exchange: Option<String>,
    pub currency: Option<String>,
    pub country: Option<String>,
    pub market_cap: Option<f64>,
    pub pe_ratio: Option<f64>,
    pub beta: Option<f64>,
    pub dividend_yield: Option<f64>,
    pub source: Option<String>,
    pub last_updated: DateTime<Utc>,
}

impl EntityNode {
    pub fn new(ticker: impl Into<String>, last_updated: DateTime<Utc>) -> Self {
        Self {
            ticker: ticker.into(),
            name: None,
            sector: None,
            industry: None,
            exchange: None,
            currency: None,
            country: None,
            market_cap: None,
            pe_ratio: None,
            beta: None,
            dividend_yield: None,
            source: None,
            last_updated,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectorNode {
    pub name: String,
}

/// One daily bar. Its id is derived from the owning ticker and the date.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricePointNode {
    pub date: NaiveDate,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: f64,
    pub adj_close: Option<f64>,
    pub volume: Option<i64>,
}

impl PricePointNode {
    pub fn id(&self, ticker: &str) -> String {
        price_point_id(ticker, self.date)
    }
}

pub fn price_point_id(ticker: &str, date: NaiveDate) -> String {
    format!("{}_{}", ticker, date.format("%Y-%m-%d"))
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentNode {
    pub id: String,
    /// Document type, e.g. `annual_report`.
    pub kind: String,
    pub title: String,
    pub date: Option<NaiveDate>,
    pub url: String,
    pub source: String,
    pub accession: Option<String>,
    pub content: Option<String>,
    pub last_updated: DateTime<Utc>,
}

/// An earnings call transcript. Stored as a document carrying the extra
/// `Transcript` label.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptNode {
    pub id: String,
    pub title: String,
    pub date: Option<NaiveDate>,
    pub quarter: Option<String>,
    pub url: String,
    pub source: String,
    pub participants: Vec<String>,
    pub last_updated: DateTime<Utc>,
}

/// A single speaker turn. Segments have no natural key, so each gets a
/// generated id when it is built.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentNode {
    pub id: Uuid,
    pub sequence: u32,
    pub speaker: String,
    pub role: Option<String>,
    pub text: String,
    pub sentiment: Option<f64>,
}

impl SegmentNode {
    pub fn new(sequence: u32, speaker: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            sequence,
            speaker: speaker.into(),
            role: None,
            text: text.into(),
            sentiment: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsItemNode {
    pub link: String,
    pub title: String,
    pub publisher: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub sentiment: Option<f64>,
    pub sentiment_label: Option<String>,
}

impl NewsItemNode {
    pub fn date(&self) -> Option<NaiveDate> {
        self.published_at.map(|ts| ts.date_naive())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextChunkNode {
    pub chunk_id: String,
    pub sequence: u32,
    pub text: String,
}

/// Latest technical assessment for one entity.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisNode {
    pub as_of: Option<NaiveDate>,
    pub last_close: Option<f64>,
    pub trend: String,
    pub momentum: String,
    pub macd_signal: String,
    pub sma_20: Option<f64>,
    pub sma_50: Option<f64>,
    pub sma_200: Option<f64>,
    pub rsi_14: Option<f64>,
    pub macd: Option<f64>,
    pub macd_signal_line: Option<f64>,
    pub macd_histogram: Option<f64>,
    pub atr_14: Option<f64>,
    pub obv: Option<f64>,
    pub generated_at: Option<DateTime<Utc>>,
}

/// Aggregate news sentiment for one entity.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentimentAnalysisNode {
    pub article_count: u32,
    pub average_score: f64,
    pub volatility: f64,
    pub positive_ratio: f64,
    pub negative_ratio: f64,
    pub trend: String,
    pub generated_at: Option<DateTime<Utc>>,
}

/// Relationship types used by the schema.
pub mod rel {
    pub const HAS_PRICE: &str = "HAS_PRICE";
    pub const HAS_DOCUMENT: &str = "HAS_DOCUMENT";
    pub const HAS_TRANSCRIPT: &str = "HAS_TRANSCRIPT";
    pub const HAS_SEGMENT: &str = "HAS_SEGMENT";
    pub const HAS_NEWS: &str = "HAS_NEWS";
    pub const HAS_CHUNK: &str = "HAS_CHUNK";
    pub const BELONGS_TO: &str = "BELONGS_TO";
    pub const HAS_ANALYSIS: &str = "HAS_ANALYSIS";
    pub const HAS_SENTIMENT: &str = "HAS_SENTIMENT";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_point_id_uses_iso_date() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        assert_eq!(price_point_id("AAPL", date), "AAPL_2024-03-05");
    }

    #[test]
    fn test_segments_get_distinct_ids() {
        let a = SegmentNode::new(0, "CEO", "Thanks");
        let b = SegmentNode::new(0, "CEO", "Thanks");
        assert_ne!(a.id, b.id);
    }
}
