use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::price::PricePoint;
use super::profile::CompanyProfile;

/// Everything one market-data fetch returned for one symbol.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketSnapshot {
    /// Source symbol the data was fetched for (e.g., "RELIANCE.NS")
    pub symbol: String,

    pub profile: CompanyProfile,

    /// Daily bars, ascending by date, one per date
    pub prices: Vec<PricePoint>,

    pub fetched_at: DateTime<Utc>,
}

impl MarketSnapshot {
    /// Build a snapshot, normalizing the price series.
    ///
    /// Bars are sorted by date; when a date appears twice the later bar wins.
    pub fn new(
        symbol: impl Into<String>,
        profile: CompanyProfile,
        mut prices: Vec<PricePoint>,
        fetched_at: DateTime<Utc>,
    ) -> Self {
        // Stable sort keeps source order within a date, so the last duplicate
        // is the one we keep below.
        prices.sort_by_key(|p| p.date);
        let mut deduped: Vec<PricePoint> = Vec::with_capacity(prices.len());
        for bar in prices {
            match deduped.last_mut() {
                Some(last) if last.date == bar.date => *last = bar,
                _ => deduped.push(bar),
            }
        }

        Self {
            symbol: symbol.into(),
            profile,
            prices: deduped,
            fetched_at,
        }
    }

    pub fn latest(&self) -> Option<&PricePoint> {
        self.prices.last()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}
