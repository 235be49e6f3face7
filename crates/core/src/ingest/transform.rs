//! Conversion of fetched source data into graph node payloads.

use chrono::{DateTime, Utc};
use num_traits::ToPrimitive;
use rust_decimal::Decimal;

use fingraph_graph::{
    AnalysisNode, DocumentNode, EntityNode, NewsItemNode, PricePointNode, SegmentNode,
    SentimentAnalysisNode, TextChunkNode, TranscriptNode,
};
use fingraph_market_data::{
    CollectedDocument, DocumentKind, IndicatorSet, MarketSnapshot, NewsArticle, PricePoint,
};

use crate::config::TextConfig;
use crate::documents::document_id;
use crate::sentiment::{label, ScoredItem, SentimentScorer, SentimentSummary};
use crate::text::{chunk_id, chunk_text};
use crate::transcript::{split_segments, transcript_metadata};

fn to_f64(value: Decimal) -> Option<f64> {
    value.to_f64().filter(|v| v.is_finite())
}

pub(crate) fn entity_node(
    key: &str,
    snapshot: Option<&MarketSnapshot>,
    source: &str,
    now: DateTime<Utc>,
) -> EntityNode {
    let mut node = EntityNode::new(key, now);
    if let Some(snapshot) = snapshot {
        let profile = &snapshot.profile;
        node.name = profile.name.clone();
        node.sector = profile.sector.clone();
        node.industry = profile.industry.clone();
        node.exchange = profile.exchange.clone();
        node.currency = profile.currency.clone();
        node.country = profile.country.clone();
        node.market_cap = profile.market_cap;
        node.pe_ratio = profile.pe_ratio;
        node.beta = profile.beta;
        node.dividend_yield = profile.dividend_yield;
        node.source = Some(profile.source.clone().unwrap_or_else(|| source.to_string()));
    }
    node
}

pub(crate) fn price_nodes(prices: &[PricePoint]) -> Vec<PricePointNode> {
    prices
        .iter()
        .filter_map(|p| {
            Some(PricePointNode {
                date: p.date,
                open: p.open.and_then(to_f64),
                high: p.high.and_then(to_f64),
                low: p.low.and_then(to_f64),
                close: to_f64(p.close)?,
                adj_close: p.adj_close.and_then(to_f64),
                volume: p.volume.and_then(|v| i64::try_from(v).ok()),
            })
        })
        .collect()
}

fn signal_name<T: serde::Serialize>(signal: &T) -> String {
    serde_json::to_value(signal)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| "UNKNOWN".to_string())
}

pub(crate) fn analysis_node(set: &IndicatorSet, now: DateTime<Utc>) -> AnalysisNode {
    AnalysisNode {
        as_of: set.as_of,
        last_close: set.last_close,
        trend: signal_name(&set.signals.trend),
        momentum: signal_name(&set.signals.momentum),
        macd_signal: signal_name(&set.signals.macd),
        sma_20: set.sma_20.value(),
        sma_50: set.sma_50.value(),
        sma_200: set.sma_200.value(),
        rsi_14: set.rsi_14.value(),
        macd: set.macd.value(),
        macd_signal_line: set.macd_signal.value(),
        macd_histogram: set.macd_histogram.value(),
        atr_14: set.atr_14.value(),
        obv: set.obv.value(),
        generated_at: Some(now),
    }
}

/// Score each article and build its node.
pub(crate) fn news_nodes(
    articles: &[NewsArticle],
    scorer: &dyn SentimentScorer,
) -> (Vec<NewsItemNode>, Vec<ScoredItem>) {
    articles
        .iter()
        .map(|article| {
            let score = scorer.score(&article.scoring_text()).clamp(-1.0, 1.0);
            let node = NewsItemNode {
                link: article.link.clone(),
                title: article.title.clone(),
                publisher: article.publisher.clone(),
                published_at: article.published_at,
                sentiment: Some(score),
                sentiment_label: Some(label(score).as_str().to_string()),
            };
            let scored = ScoredItem {
                score,
                published_at: article.published_at,
            };
            (node, scored)
        })
        .unzip()
}

pub(crate) fn sentiment_node(
    summary: &SentimentSummary,
    now: DateTime<Utc>,
) -> SentimentAnalysisNode {
    SentimentAnalysisNode {
        article_count: u32::try_from(summary.article_count).unwrap_or(u32::MAX),
        average_score: summary.average_score,
        volatility: summary.volatility,
        positive_ratio: summary.positive_ratio,
        negative_ratio: summary.negative_ratio,
        trend: summary.trend.as_str().to_string(),
        generated_at: Some(now),
    }
}

/// A collected document ready to be written.
pub(crate) enum PreparedDocument {
    Document {
        node: DocumentNode,
        chunks: Vec<TextChunkNode>,
    },
    Transcript {
        node: TranscriptNode,
        segments: Vec<SegmentNode>,
        chunks: Vec<TextChunkNode>,
    },
}

impl PreparedDocument {
    pub(crate) fn id(&self) -> &str {
        match self {
            Self::Document { node, .. } => &node.id,
            Self::Transcript { node, .. } => &node.id,
        }
    }
}

fn chunk_nodes(source_id: &str, content: Option<&str>, text: TextConfig) -> Vec<TextChunkNode> {
    let Some(content) = content else {
        return Vec::new();
    };
    chunk_text(content, text.chunk_size, text.overlap)
        .into_iter()
        .enumerate()
        .map(|(n, body)| TextChunkNode {
            chunk_id: chunk_id(source_id, n),
            sequence: u32::try_from(n).unwrap_or(u32::MAX),
            text: body,
        })
        .collect()
}

pub(crate) fn prepare_document(
    key: &str,
    doc: &CollectedDocument,
    text: TextConfig,
    scorer: &dyn SentimentScorer,
    now: DateTime<Utc>,
) -> PreparedDocument {
    let content = doc.content.as_deref();

    if doc.kind == DocumentKind::Transcript {
        let meta = content.map(transcript_metadata).unwrap_or_default();
        let date = doc.date.or(meta.call_date);
        let id = document_id(key, doc.kind, date, doc.accession.as_deref(), &doc.url);
        let segments = content
            .map(split_segments)
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .map(|(n, turn)| {
                let mut node = SegmentNode::new(
                    u32::try_from(n).unwrap_or(u32::MAX),
                    turn.speaker,
                    turn.text,
                );
                node.role = turn.role;
                node.sentiment = Some(scorer.score(&node.text).clamp(-1.0, 1.0));
                node
            })
            .collect();
        let chunks = chunk_nodes(&id, content, text);
        return PreparedDocument::Transcript {
            node: TranscriptNode {
                id,
                title: doc.title.clone(),
                date,
                quarter: meta.quarter,
                url: doc.url.clone(),
                source: doc.source.clone(),
                participants: meta.participants,
                last_updated: now,
            },
            segments,
            chunks,
        };
    }

    let id = document_id(key, doc.kind, doc.date, doc.accession.as_deref(), &doc.url);
    let chunks = chunk_nodes(&id, content, text);
    PreparedDocument::Document {
        node: DocumentNode {
            id,
            kind: doc.kind.as_str().to_string(),
            title: doc.title.clone(),
            date: doc.date,
            url: doc.url.clone(),
            source: doc.source.clone(),
            accession: doc.accession.clone(),
            content: doc.content.clone(),
            last_updated: now,
        },
        chunks,
    }
}
