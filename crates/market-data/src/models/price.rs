use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One daily bar for an entity.
///
/// Prices are kept as [`Decimal`] in the listing currency exactly as the
/// source reported them; no unit scaling is applied.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricePoint {
    /// Trading date (exchange local)
    pub date: NaiveDate,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub open: Option<Decimal>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub high: Option<Decimal>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub low: Option<Decimal>,

    /// Closing price (required)
    pub close: Decimal,

    /// Close adjusted for splits and dividends
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adj_close: Option<Decimal>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<u64>,
}

impl PricePoint {
    /// Create a bar with only a close.
    pub fn new(date: NaiveDate, close: Decimal) -> Self {
        Self {
            date,
            open: None,
            high: None,
            low: None,
            close,
            adj_close: None,
            volume: None,
        }
    }

    /// Create a full OHLCV bar.
    pub fn ohlcv(
        date: NaiveDate,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: u64,
    ) -> Self {
        Self {
            date,
            open: Some(open),
            high: Some(high),
            low: Some(low),
            close,
            adj_close: None,
            volume: Some(volume),
        }
    }

    pub fn close_f64(&self) -> f64 {
        self.close.to_f64().unwrap_or(f64::NAN)
    }

    /// High, falling back to the close when the source omitted it.
    pub fn high_f64(&self) -> f64 {
        self.high.unwrap_or(self.close).to_f64().unwrap_or(f64::NAN)
    }

    /// Low, falling back to the close when the source omitted it.
    pub fn low_f64(&self) -> f64 {
        self.low.unwrap_or(self.close).to_f64().unwrap_or(f64::NAN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_price_point_json_keeps_decimal_precision() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        let bar = PricePoint::ohlcv(
            date,
            dec!(101.10),
            dec!(103.333333),
            dec!(99.95),
            dec!(102.0000001),
            1_250_000,
        );

        let json = serde_json::to_string(&bar).unwrap();
        let back: PricePoint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, bar);
        assert_eq!(back.close, dec!(102.0000001));
    }

    #[test]
    fn test_missing_high_low_fall_back_to_close() {
        let bar = PricePoint::new(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(), dec!(10.5));
        assert_eq!(bar.high_f64(), 10.5);
        assert_eq!(bar.low_f64(), 10.5);
        assert!(bar.volume.is_none());
    }
}
