//! Sentiment scoring contract and aggregation over news items.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Scores at or beyond ±0.2 carry a label.
pub const LABEL_THRESHOLD: f64 = 0.2;

/// Newer-half average must move this much for the trend to change.
pub const TREND_THRESHOLD: f64 = 0.1;

/// Any scorer producing a polarity in `[-1, 1]`.
pub trait SentimentScorer: Send + Sync {
    fn score(&self, text: &str) -> f64;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Negative,
    Neutral,
}

impl SentimentLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Negative => "negative",
            Self::Neutral => "neutral",
        }
    }
}

pub fn label(score: f64) -> SentimentLabel {
    if score >= LABEL_THRESHOLD {
        SentimentLabel::Positive
    } else if score <= -LABEL_THRESHOLD {
        SentimentLabel::Negative
    } else {
        SentimentLabel::Neutral
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SentimentTrend {
    Improving,
    Deteriorating,
    Stable,
}

impl SentimentTrend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Improving => "IMPROVING",
            Self::Deteriorating => "DETERIORATING",
            Self::Stable => "STABLE",
        }
    }
}

/// One scored item.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScoredItem {
    pub score: f64,
    pub published_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentimentSummary {
    pub article_count: usize,
    pub average_score: f64,
    /// Population standard deviation of the scores
    pub volatility: f64,
    pub positive_ratio: f64,
    pub negative_ratio: f64,
    pub trend: SentimentTrend,
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Summarize item scores. The trend compares the newer half of the dated
/// items with the older half.
pub fn aggregate(items: &[ScoredItem]) -> SentimentSummary {
    let n = items.len();
    if n == 0 {
        return SentimentSummary {
            article_count: 0,
            average_score: 0.0,
            volatility: 0.0,
            positive_ratio: 0.0,
            negative_ratio: 0.0,
            trend: SentimentTrend::Stable,
        };
    }

    let scores: Vec<f64> = items.iter().map(|i| i.score).collect();
    let average = mean(&scores);
    let variance = scores.iter().map(|s| (s - average).powi(2)).sum::<f64>() / n as f64;
    let positives = scores
        .iter()
        .filter(|s| label(**s) == SentimentLabel::Positive)
        .count();
    let negatives = scores
        .iter()
        .filter(|s| label(**s) == SentimentLabel::Negative)
        .count();

    let mut dated: Vec<(DateTime<Utc>, f64)> = items
        .iter()
        .filter_map(|i| i.published_at.map(|ts| (ts, i.score)))
        .collect();
    dated.sort_by_key(|(ts, _)| *ts);
    let trend = if dated.len() < 2 {
        SentimentTrend::Stable
    } else {
        let (older, newer) = dated.split_at(dated.len() / 2);
        let older: Vec<f64> = older.iter().map(|(_, s)| *s).collect();
        let newer: Vec<f64> = newer.iter().map(|(_, s)| *s).collect();
        let delta = mean(&newer) - mean(&older);
        if delta > TREND_THRESHOLD {
            SentimentTrend::Improving
        } else if delta < -TREND_THRESHOLD {
            SentimentTrend::Deteriorating
        } else {
            SentimentTrend::Stable
        }
    };

    SentimentSummary {
        article_count: n,
        average_score: average,
        volatility: variance.sqrt(),
        positive_ratio: positives as f64 / n as f64,
        negative_ratio: negatives as f64 / n as f64,
        trend,
    }
}

const POSITIVE_WORDS: &[&str] = &[
    "beat", "beats", "gain", "gains", "growth", "grew", "surge", "surged", "rally", "rallied",
    "record", "strong", "stronger", "upgrade", "upgraded", "outperform", "profit", "profitable",
    "rise", "rises", "rose", "positive", "bullish", "expand", "expansion", "improve", "improved",
    "robust", "exceed", "exceeded", "dividend", "buyback", "win", "wins", "optimistic",
];

const NEGATIVE_WORDS: &[&str] = &[
    "miss", "missed", "loss", "losses", "decline", "declined", "drop", "dropped", "fall", "fell",
    "plunge", "plunged", "weak", "weaker", "downgrade", "downgraded", "underperform", "lawsuit",
    "fraud", "probe", "negative", "bearish", "cut", "cuts", "layoffs", "default", "slump",
    "warning", "recall", "risk", "concern", "pessimistic", "investigation", "penalty",
];

const NEGATIONS: &[&str] = &["not", "no", "never", "without"];

/// Word-list scorer: `(positive - negative) / (positive + negative)`, with a
/// preceding negation flipping a word.
pub struct LexiconScorer {
    positive: HashSet<&'static str>,
    negative: HashSet<&'static str>,
}

impl Default for LexiconScorer {
    fn default() -> Self {
        Self {
            positive: POSITIVE_WORDS.iter().copied().collect(),
            negative: NEGATIVE_WORDS.iter().copied().collect(),
        }
    }
}

impl SentimentScorer for LexiconScorer {
    fn score(&self, text: &str) -> f64 {
        let lowered = text.to_lowercase();
        let tokens: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .collect();

        let (mut pos, mut neg) = (0u32, 0u32);
        for (i, token) in tokens.iter().enumerate() {
            let negated = i > 0 && NEGATIONS.iter().any(|n| *n == tokens[i - 1]);
            let positive = if self.positive.contains(*token) {
                true
            } else if self.negative.contains(*token) {
                false
            } else {
                continue;
            };
            if positive != negated {
                pos += 1;
            } else {
                neg += 1;
            }
        }

        let total = pos + neg;
        if total == 0 {
            return 0.0;
        }
        (f64::from(pos) - f64::from(neg)) / f64::from(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32, score: f64) -> ScoredItem {
        ScoredItem {
            score,
            published_at: Some(Utc.with_ymd_and_hms(2024, 5, day, 9, 0, 0).unwrap()),
        }
    }

    #[test]
    fn test_labels() {
        assert_eq!(label(0.2), SentimentLabel::Positive);
        assert_eq!(label(0.19), SentimentLabel::Neutral);
        assert_eq!(label(-0.2), SentimentLabel::Negative);
    }

    #[test]
    fn test_aggregate_empty() {
        let summary = aggregate(&[]);
        assert_eq!(summary.article_count, 0);
        assert_eq!(summary.trend, SentimentTrend::Stable);
    }

    #[test]
    fn test_aggregate_statistics() {
        let items = [at(1, 0.5), at(2, -0.5), at(3, 0.0), at(4, 0.0)];
        let summary = aggregate(&items);
        assert_eq!(summary.article_count, 4);
        assert!((summary.average_score - 0.0).abs() < 1e-12);
        // Population std-dev of [0.5, -0.5, 0, 0] is sqrt(0.125).
        assert!((summary.volatility - 0.125f64.sqrt()).abs() < 1e-12);
        assert!((summary.positive_ratio - 0.25).abs() < 1e-12);
        assert!((summary.negative_ratio - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_trend_uses_publication_order() {
        // Given out of order; newest items are the positive ones.
        let items = [at(4, 0.6), at(1, -0.4), at(3, 0.5), at(2, -0.3)];
        assert_eq!(aggregate(&items).trend, SentimentTrend::Improving);

        let items = [at(1, 0.6), at(2, 0.5), at(3, -0.4), at(4, -0.3)];
        assert_eq!(aggregate(&items).trend, SentimentTrend::Deteriorating);

        let items = [at(1, 0.30), at(2, 0.30), at(3, 0.35), at(4, 0.35)];
        assert_eq!(aggregate(&items).trend, SentimentTrend::Stable);
    }

    #[test]
    fn test_undated_items_do_not_drive_trend() {
        let items = [
            ScoredItem {
                score: 0.9,
                published_at: None,
            },
            at(1, 0.1),
        ];
        let summary = aggregate(&items);
        assert_eq!(summary.article_count, 2);
        assert_eq!(summary.trend, SentimentTrend::Stable);
    }

    #[test]
    fn test_lexicon_scorer() {
        let scorer = LexiconScorer::default();
        assert!(scorer.score("Apple beats estimates on record iPhone growth") > 0.2);
        assert!(scorer.score("Shares plunge after earnings miss and downgrade") < -0.2);
        assert_eq!(scorer.score("The company held its annual meeting"), 0.0);
        assert!(scorer.score("Results were not weak") > 0.0);
    }
}
