//! Conversion of node payloads into Bolt parameter maps for `UNWIND $rows`.

use neo4rs::{BoltFloat, BoltInteger, BoltMap, BoltNull, BoltString, BoltType};

use crate::model::{NewsItemNode, PricePointNode, SegmentNode, TextChunkNode};

/// `Some(v)` as a Bolt value, `None` as Cypher `null`.
pub(crate) fn nullable<T: Into<BoltType>>(value: Option<T>) -> BoltType {
    value.map(Into::into).unwrap_or(BoltType::Null(BoltNull))
}

#[derive(Default)]
struct Row(Vec<(BoltString, BoltType)>);

impl Row {
    fn put(mut self, key: &str, value: BoltType) -> Self {
        self.0.push((BoltString::from(key), value));
        self
    }

    fn str(self, key: &str, value: &str) -> Self {
        self.put(key, BoltType::String(BoltString::from(value)))
    }

    fn opt_str(self, key: &str, value: Option<&str>) -> Self {
        let value = value
            .map(|v| BoltType::String(BoltString::from(v)))
            .unwrap_or(BoltType::Null(BoltNull));
        self.put(key, value)
    }

    fn float(self, key: &str, value: f64) -> Self {
        self.put(key, BoltType::Float(BoltFloat::new(value)))
    }

    fn opt_float(self, key: &str, value: Option<f64>) -> Self {
        let value = value
            .map(|v| BoltType::Float(BoltFloat::new(v)))
            .unwrap_or(BoltType::Null(BoltNull));
        self.put(key, value)
    }

    fn int(self, key: &str, value: i64) -> Self {
        self.put(key, BoltType::Integer(BoltInteger::new(value)))
    }

    fn opt_int(self, key: &str, value: Option<i64>) -> Self {
        let value = value
            .map(|v| BoltType::Integer(BoltInteger::new(v)))
            .unwrap_or(BoltType::Null(BoltNull));
        self.put(key, value)
    }

    fn build(self) -> BoltType {
        BoltType::Map(BoltMap::from_iter(self.0))
    }
}

pub(crate) fn price_rows(ticker: &str, points: &[PricePointNode]) -> Vec<BoltType> {
    points
        .iter()
        .map(|p| {
            Row::default()
                .str("id", &p.id(ticker))
                .str("date", &p.date.format("%Y-%m-%d").to_string())
                .opt_float("open", p.open)
                .opt_float("high", p.high)
                .opt_float("low", p.low)
                .float("close", p.close)
                .opt_float("adj_close", p.adj_close)
                .opt_int("volume", p.volume)
                .build()
        })
        .collect()
}

pub(crate) fn news_rows(items: &[NewsItemNode]) -> Vec<BoltType> {
    items
        .iter()
        .map(|n| {
            let published = n.published_at.map(|ts| ts.to_rfc3339());
            let date = n.date().map(|d| d.format("%Y-%m-%d").to_string());
            Row::default()
                .str("link", &n.link)
                .str("title", &n.title)
                .opt_str("publisher", n.publisher.as_deref())
                .opt_str("published_at", published.as_deref())
                .opt_str("date", date.as_deref())
                .opt_float("sentiment", n.sentiment)
                .opt_str("sentiment_label", n.sentiment_label.as_deref())
                .build()
        })
        .collect()
}

pub(crate) fn segment_rows(segments: &[SegmentNode]) -> Vec<BoltType> {
    segments
        .iter()
        .map(|s| {
            Row::default()
                .str("id", &s.id.to_string())
                .int("sequence", i64::from(s.sequence))
                .str("speaker", &s.speaker)
                .opt_str("role", s.role.as_deref())
                .str("text", &s.text)
                .opt_float("sentiment", s.sentiment)
                .build()
        })
        .collect()
}

pub(crate) fn chunk_rows(chunks: &[TextChunkNode]) -> Vec<BoltType> {
    chunks
        .iter()
        .map(|c| {
            Row::default()
                .str("chunk_id", &c.chunk_id)
                .int("sequence", i64::from(c.sequence))
                .str("text", &c.text)
                .build()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_price_row_fields() {
        let point = PricePointNode {
            date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            open: None,
            high: Some(11.0),
            low: Some(9.0),
            close: 10.0,
            adj_close: None,
            volume: Some(500),
        };
        let rows = price_rows("TCS.NS", &[point]);
        assert_eq!(rows.len(), 1);
        let BoltType::Map(map) = &rows[0] else {
            panic!("expected a map row");
        };
        assert!(matches!(
            map.value.get(&BoltString::from("id")),
            Some(BoltType::String(id)) if id.value == "TCS.NS_2024-01-02"
        ));
        assert!(matches!(
            map.value.get(&BoltString::from("close")),
            Some(BoltType::Float(close)) if close.value == 10.0
        ));
        assert!(matches!(
            map.value.get(&BoltString::from("open")),
            Some(BoltType::Null(_))
        ));
    }
}
