//! In-memory [`GraphStore`] with the same merge semantics as the Neo4j store.
//! Used for dry runs and tests.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{GraphError, Result};
use crate::model::{
    rel, AnalysisNode, DocumentNode, EntityNode, NewsItemNode, PricePointNode, SectorNode,
    SegmentNode, SentimentAnalysisNode, TextChunkNode, TranscriptNode,
};
use crate::schema::SCHEMA;
use crate::state::{ConnectionState, ConnectionTracker};
use crate::store::{missing_source, write_chunked, BatchWriteReport, GraphStore, DEFAULT_CHUNK_SIZE};

/// Directed, typed edge between two natural keys.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Edge {
    pub from: String,
    pub rel: &'static str,
    pub to: String,
}

#[derive(Debug, Default)]
struct GraphData {
    schema: BTreeSet<&'static str>,
    entities: BTreeMap<String, EntityNode>,
    sectors: BTreeMap<String, SectorNode>,
    price_points: BTreeMap<String, PricePointNode>,
    documents: BTreeMap<String, DocumentNode>,
    transcripts: BTreeMap<String, TranscriptNode>,
    segments: BTreeMap<Uuid, SegmentNode>,
    news: BTreeMap<String, NewsItemNode>,
    chunks: BTreeMap<String, TextChunkNode>,
    analyses: BTreeMap<String, AnalysisNode>,
    sentiments: BTreeMap<String, SentimentAnalysisNode>,
    edges: BTreeSet<Edge>,
}

impl GraphData {
    fn link(&mut self, from: &str, rel: &'static str, to: &str) {
        self.edges.insert(Edge {
            from: from.to_string(),
            rel,
            to: to.to_string(),
        });
    }

    fn merge_entity(&mut self, ticker: &str) {
        if !self.entities.contains_key(ticker) {
            self.entities.insert(
                ticker.to_string(),
                EntityNode::new(ticker, chrono::Utc::now()),
            );
        }
    }

    fn has_source(&self, source_id: &str) -> bool {
        self.documents.contains_key(source_id) || self.transcripts.contains_key(source_id)
    }

    /// Detach and delete chunks of `source_id` numbered `count` or higher.
    fn prune_chunks(&mut self, source_id: &str, count: usize) {
        let doomed: Vec<String> = self
            .edges
            .iter()
            .filter(|e| e.from == source_id && e.rel == rel::HAS_CHUNK)
            .filter(|e| {
                self.chunks
                    .get(&e.to)
                    .is_some_and(|chunk| chunk.sequence as usize >= count)
            })
            .map(|e| e.to.clone())
            .collect();
        for chunk_id in doomed {
            self.chunks.remove(&chunk_id);
            self.edges.retain(|e| e.from != chunk_id && e.to != chunk_id);
        }
    }
}

pub struct MemoryGraphStore {
    data: Mutex<GraphData>,
    tracker: ConnectionTracker,
    chunk_size: usize,
    reconnect_allowed: AtomicBool,
    /// Number of further batch chunks that may commit before writes fail.
    chunk_budget: Mutex<Option<usize>>,
    chunk_writes: AtomicUsize,
}

impl Default for MemoryGraphStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self::with_chunk_size(DEFAULT_CHUNK_SIZE)
    }

    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            data: Mutex::new(GraphData::default()),
            tracker: ConnectionTracker::new(ConnectionState::Ready),
            chunk_size: chunk_size.max(1),
            reconnect_allowed: AtomicBool::new(true),
            chunk_budget: Mutex::new(None),
            chunk_writes: AtomicUsize::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, GraphData> {
        self.data.lock().unwrap_or_else(|poisoned| {
            warn!("Memory graph mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Put the store into `state`. A forced `Disconnected` store refuses to
    /// reconnect until [`Self::allow_reconnect`] is called.
    pub fn force_state(&self, state: ConnectionState) {
        self.tracker.force(state);
        self.reconnect_allowed
            .store(state != ConnectionState::Disconnected, Ordering::SeqCst);
    }

    pub fn allow_reconnect(&self) {
        self.reconnect_allowed.store(true, Ordering::SeqCst);
    }

    /// Let `n` more batch chunks commit, then fail every later one.
    pub fn fail_writes_after(&self, n: usize) {
        *self
            .chunk_budget
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(n);
    }

    pub fn chunk_writes(&self) -> usize {
        self.chunk_writes.load(Ordering::SeqCst)
    }

    pub fn entity(&self, ticker: &str) -> Option<EntityNode> {
        self.lock().entities.get(ticker).cloned()
    }

    pub fn entity_count(&self) -> usize {
        self.lock().entities.len()
    }

    pub fn sector_count(&self) -> usize {
        self.lock().sectors.len()
    }

    pub fn price_point_ids(&self) -> Vec<String> {
        self.lock().price_points.keys().cloned().collect()
    }

    pub fn news_count(&self) -> usize {
        self.lock().news.len()
    }

    pub fn document(&self, id: &str) -> Option<DocumentNode> {
        self.lock().documents.get(id).cloned()
    }

    pub fn transcript(&self, id: &str) -> Option<TranscriptNode> {
        self.lock().transcripts.get(id).cloned()
    }

    pub fn segment_count(&self) -> usize {
        self.lock().segments.len()
    }

    pub fn chunk_ids(&self) -> Vec<String> {
        self.lock().chunks.keys().cloned().collect()
    }

    pub fn analysis(&self, ticker: &str) -> Option<AnalysisNode> {
        self.lock().analyses.get(ticker).cloned()
    }

    pub fn sentiment(&self, ticker: &str) -> Option<SentimentAnalysisNode> {
        self.lock().sentiments.get(ticker).cloned()
    }

    pub fn schema_items(&self) -> Vec<&'static str> {
        self.lock().schema.iter().copied().collect()
    }

    pub fn edges(&self) -> Vec<Edge> {
        self.lock().edges.iter().cloned().collect()
    }

    pub fn edges_from(&self, from: &str, rel: &str) -> Vec<String> {
        self.lock()
            .edges
            .iter()
            .filter(|e| e.from == from && e.rel == rel)
            .map(|e| e.to.clone())
            .collect()
    }

    /// Run a single-statement write through the connection state machine.
    fn write<F>(&self, apply: F) -> Result<()>
    where
        F: FnOnce(&mut GraphData) -> Result<()>,
    {
        self.tracker.check_writable()?;
        let result = apply(&mut self.lock());
        match &result {
            Ok(()) => self.tracker.record_success(),
            Err(_) => self.tracker.record_failure(),
        }
        result
    }

    /// Commit one batch chunk, honouring any injected failure budget.
    async fn write_chunk<F>(&self, apply: F) -> Result<()>
    where
        F: FnOnce(&mut GraphData) -> Result<()>,
    {
        self.tracker.check_writable()?;
        {
            let mut budget = self
                .chunk_budget
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            match budget.as_mut() {
                Some(0) => {
                    drop(budget);
                    self.tracker.record_failure();
                    return Err(GraphError::Write("Injected chunk failure".to_string()));
                }
                Some(remaining) => *remaining -= 1,
                None => {}
            }
        }
        self.chunk_writes.fetch_add(1, Ordering::SeqCst);
        self.write(apply)
    }
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    fn state(&self) -> ConnectionState {
        self.tracker.state()
    }

    async fn ensure_ready(&self) -> Result<()> {
        if self.tracker.state() != ConnectionState::Disconnected {
            return self.tracker.check_writable();
        }
        self.tracker.begin_connect();
        if self.reconnect_allowed.load(Ordering::SeqCst) {
            self.tracker.connected();
            Ok(())
        } else {
            self.tracker.connect_failed();
            Err(GraphError::Unavailable {
                state: ConnectionState::Disconnected,
            })
        }
    }

    async fn ensure_schema(&self) -> Result<()> {
        self.write(|data| {
            for item in SCHEMA {
                if data.schema.insert(item.name) {
                    debug!(name = item.name, "Declared schema item");
                }
            }
            Ok(())
        })
    }

    async fn upsert_entity(&self, entity: &EntityNode) -> Result<()> {
        self.write(|data| {
            data.entities.insert(entity.ticker.clone(), entity.clone());
            Ok(())
        })
    }

    async fn upsert_sector(&self, sector: &SectorNode) -> Result<()> {
        self.write(|data| {
            data.sectors.insert(sector.name.clone(), sector.clone());
            Ok(())
        })
    }

    async fn link_entity_to_sector(&self, ticker: &str, sector: &str) -> Result<()> {
        self.write(|data| {
            data.merge_entity(ticker);
            data.sectors
                .entry(sector.to_string())
                .or_insert_with(|| SectorNode {
                    name: sector.to_string(),
                });
            data.link(ticker, rel::BELONGS_TO, sector);
            Ok(())
        })
    }

    async fn upsert_price_points(
        &self,
        ticker: &str,
        points: &[PricePointNode],
    ) -> Result<BatchWriteReport> {
        self.tracker.check_writable()?;
        Ok(write_chunked(points, self.chunk_size, |chunk| {
            self.write_chunk(move |data| {
                data.merge_entity(ticker);
                for point in chunk {
                    let id = point.id(ticker);
                    data.price_points.insert(id.clone(), point.clone());
                    data.link(ticker, rel::HAS_PRICE, &id);
                }
                Ok(())
            })
        })
        .await)
    }

    async fn upsert_news_items(
        &self,
        ticker: &str,
        items: &[NewsItemNode],
    ) -> Result<BatchWriteReport> {
        self.tracker.check_writable()?;
        Ok(write_chunked(items, self.chunk_size, |chunk| {
            self.write_chunk(move |data| {
                data.merge_entity(ticker);
                for item in chunk {
                    data.news.insert(item.link.clone(), item.clone());
                    data.link(ticker, rel::HAS_NEWS, &item.link);
                }
                Ok(())
            })
        })
        .await)
    }

    async fn upsert_document(&self, ticker: &str, document: &DocumentNode) -> Result<()> {
        self.write(|data| {
            data.merge_entity(ticker);
            data.documents.insert(document.id.clone(), document.clone());
            data.link(ticker, rel::HAS_DOCUMENT, &document.id);
            Ok(())
        })
    }

    async fn upsert_transcript(&self, ticker: &str, transcript: &TranscriptNode) -> Result<()> {
        self.write(|data| {
            data.merge_entity(ticker);
            data.transcripts
                .insert(transcript.id.clone(), transcript.clone());
            data.link(ticker, rel::HAS_TRANSCRIPT, &transcript.id);
            Ok(())
        })
    }

    async fn append_transcript_segments(
        &self,
        transcript_id: &str,
        segments: &[SegmentNode],
    ) -> Result<BatchWriteReport> {
        self.tracker.check_writable()?;
        Ok(write_chunked(segments, self.chunk_size, |chunk| {
            self.write_chunk(move |data| {
                if !data.transcripts.contains_key(transcript_id) {
                    return Err(missing_source(transcript_id));
                }
                for segment in chunk {
                    data.segments.insert(segment.id, segment.clone());
                    data.link(transcript_id, rel::HAS_SEGMENT, &segment.id.to_string());
                }
                Ok(())
            })
        })
        .await)
    }

    async fn upsert_text_chunks(
        &self,
        source_id: &str,
        chunks: &[TextChunkNode],
    ) -> Result<BatchWriteReport> {
        self.tracker.check_writable()?;
        let count = chunks.len();
        Ok(write_chunked(chunks, self.chunk_size, |batch| {
            self.write_chunk(move |data| {
                if !data.has_source(source_id) {
                    return Err(missing_source(source_id));
                }
                for chunk in batch {
                    data.chunks.insert(chunk.chunk_id.clone(), chunk.clone());
                    data.link(source_id, rel::HAS_CHUNK, &chunk.chunk_id);
                }
                data.prune_chunks(source_id, count);
                Ok(())
            })
        })
        .await)
    }

    async fn upsert_analysis(&self, ticker: &str, analysis: &AnalysisNode) -> Result<()> {
        self.write(|data| {
            data.merge_entity(ticker);
            data.analyses.insert(ticker.to_string(), analysis.clone());
            data.link(ticker, rel::HAS_ANALYSIS, ticker);
            Ok(())
        })
    }

    async fn upsert_sentiment(
        &self,
        ticker: &str,
        sentiment: &SentimentAnalysisNode,
    ) -> Result<()> {
        self.write(|data| {
            data.merge_entity(ticker);
            data.sentiments.insert(ticker.to_string(), sentiment.clone());
            data.link(ticker, rel::HAS_SENTIMENT, ticker);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn entity(ticker: &str) -> EntityNode {
        let mut e = EntityNode::new(ticker, Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap());
        e.name = Some("Apple Inc.".to_string());
        e.sector = Some("Technology".to_string());
        e
    }

    fn points(n: usize) -> Vec<PricePointNode> {
        let start = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        (0..n)
            .map(|i| PricePointNode {
                date: start + chrono::Duration::days(i as i64),
                open: Some(100.0),
                high: Some(101.0),
                low: Some(99.0),
                close: 100.5,
                adj_close: None,
                volume: Some(1_000),
            })
            .collect()
    }

    fn document(id: &str) -> DocumentNode {
        DocumentNode {
            id: id.to_string(),
            kind: "annual_report".to_string(),
            title: "10-K".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 2, 1),
            url: "https://example.com/10k.htm".to_string(),
            source: "SEC_EDGAR".to_string(),
            accession: Some("0000320193-24-000001".to_string()),
            content: None,
            last_updated: Utc.with_ymd_and_hms(2024, 2, 2, 0, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_upsert_entity_twice_yields_one_node() {
        let store = MemoryGraphStore::new();
        store.upsert_entity(&entity("AAPL")).await.unwrap();
        store.upsert_entity(&entity("AAPL")).await.unwrap();

        assert_eq!(store.entity_count(), 1);
        assert_eq!(store.entity("AAPL"), Some(entity("AAPL")));
    }

    #[tokio::test]
    async fn test_upsert_entity_replaces_properties() {
        let store = MemoryGraphStore::new();
        store.upsert_entity(&entity("AAPL")).await.unwrap();
        let mut updated = entity("AAPL");
        updated.industry = Some("Consumer Electronics".to_string());
        store.upsert_entity(&updated).await.unwrap();

        assert_eq!(store.entity_count(), 1);
        assert_eq!(
            store.entity("AAPL").and_then(|e| e.industry),
            Some("Consumer Electronics".to_string())
        );
    }

    #[tokio::test]
    async fn test_sector_link_is_idempotent() {
        let store = MemoryGraphStore::new();
        store.upsert_entity(&entity("AAPL")).await.unwrap();
        for _ in 0..3 {
            store
                .link_entity_to_sector("AAPL", "Technology")
                .await
                .unwrap();
        }
        assert_eq!(store.sector_count(), 1);
        assert_eq!(
            store.edges_from("AAPL", rel::BELONGS_TO),
            vec!["Technology".to_string()]
        );
    }

    #[tokio::test]
    async fn test_price_points_unique_per_ticker_and_date() {
        let store = MemoryGraphStore::new();
        let series = points(30);
        store.upsert_price_points("AAPL", &series).await.unwrap();
        let report = store.upsert_price_points("AAPL", &series).await.unwrap();

        assert!(report.is_complete());
        assert_eq!(store.price_point_ids().len(), 30);
        assert_eq!(store.edges_from("AAPL", rel::HAS_PRICE).len(), 30);
        assert!(store
            .price_point_ids()
            .contains(&"AAPL_2023-01-01".to_string()));
    }

    #[tokio::test]
    async fn test_chunk_failure_keeps_earlier_chunks() {
        let store = MemoryGraphStore::with_chunk_size(10);
        store.fail_writes_after(2);

        let report = store.upsert_price_points("AAPL", &points(35)).await.unwrap();

        assert_eq!(report.chunks_total, 4);
        assert_eq!(report.chunks_committed, 2);
        assert_eq!(report.rows_committed, 20);
        assert!(report.summary().starts_with("2 of 4 chunks succeeded"));
        assert_eq!(store.price_point_ids().len(), 20);
        assert_eq!(store.state(), ConnectionState::Degraded);
    }

    #[tokio::test]
    async fn test_disconnected_store_fails_fast() {
        let store = MemoryGraphStore::new();
        store.force_state(ConnectionState::Disconnected);

        let err = store.upsert_entity(&entity("AAPL")).await.unwrap_err();
        assert!(matches!(err, GraphError::Unavailable { .. }));
        assert!(store.upsert_price_points("AAPL", &points(5)).await.is_err());
        assert_eq!(store.chunk_writes(), 0);
        assert!(store.ensure_ready().await.is_err());
        assert_eq!(store.entity_count(), 0);
    }

    #[tokio::test]
    async fn test_ensure_ready_reconnects_when_allowed() {
        let store = MemoryGraphStore::new();
        store.force_state(ConnectionState::Disconnected);
        store.allow_reconnect();

        store.ensure_ready().await.unwrap();
        assert_eq!(store.state(), ConnectionState::Ready);
    }

    #[tokio::test]
    async fn test_schema_redeclare_is_noop() {
        let store = MemoryGraphStore::new();
        store.ensure_schema().await.unwrap();
        let first = store.schema_items();
        store.ensure_schema().await.unwrap();
        assert_eq!(store.schema_items(), first);
        assert_eq!(first.len(), SCHEMA.len());
    }

    #[tokio::test]
    async fn test_news_shared_between_entities() {
        let store = MemoryGraphStore::new();
        let item = NewsItemNode {
            link: "https://news.example.com/a".to_string(),
            title: "Chipmakers rally".to_string(),
            publisher: None,
            published_at: None,
            sentiment: Some(0.4),
            sentiment_label: Some("positive".to_string()),
        };
        store
            .upsert_news_items("AAPL", std::slice::from_ref(&item))
            .await
            .unwrap();
        store
            .upsert_news_items("MSFT", std::slice::from_ref(&item))
            .await
            .unwrap();

        assert_eq!(store.news_count(), 1);
        assert_eq!(store.edges_from("MSFT", rel::HAS_NEWS).len(), 1);
    }

    #[tokio::test]
    async fn test_chunks_require_existing_source() {
        let store = MemoryGraphStore::new();
        let chunk = TextChunkNode {
            chunk_id: "AAPL_annual_report_20240201_chunk_0".to_string(),
            sequence: 0,
            text: "Revenue grew.".to_string(),
        };

        let report = store
            .upsert_text_chunks("AAPL_annual_report_20240201", std::slice::from_ref(&chunk))
            .await
            .unwrap();
        assert_eq!(report.chunks_committed, 0);
        assert!(report.error.is_some());

        store.upsert_document("AAPL", &document("AAPL_annual_report_20240201")).await.unwrap();
        let report = store
            .upsert_text_chunks("AAPL_annual_report_20240201", std::slice::from_ref(&chunk))
            .await
            .unwrap();
        assert!(report.is_complete());
        assert_eq!(store.chunk_ids().len(), 1);
    }

    #[tokio::test]
    async fn test_shorter_rewrite_drops_trailing_chunks() {
        let store = MemoryGraphStore::new();
        let id = "AAPL_annual_report_20240201_0000320193-24-000001";
        store.upsert_document("AAPL", &document(id)).await.unwrap();
        let chunks = |n: u32| -> Vec<TextChunkNode> {
            (0..n)
                .map(|sequence| TextChunkNode {
                    chunk_id: format!("{id}_chunk_{sequence}"),
                    sequence,
                    text: format!("Part {sequence}."),
                })
                .collect()
        };

        store.upsert_text_chunks(id, &chunks(3)).await.unwrap();
        assert_eq!(store.edges_from(id, rel::HAS_CHUNK).len(), 3);

        let report = store.upsert_text_chunks(id, &chunks(1)).await.unwrap();
        assert!(report.is_complete());
        assert_eq!(store.chunk_ids(), vec![format!("{id}_chunk_0")]);
        assert_eq!(store.edges_from(id, rel::HAS_CHUNK).len(), 1);
    }

    #[tokio::test]
    async fn test_transcript_segments() {
        let store = MemoryGraphStore::new();
        let transcript = TranscriptNode {
            id: "INFY_transcript_20240418".to_string(),
            title: "Q4 FY24 earnings call".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 4, 18),
            quarter: Some("Q4 FY24".to_string()),
            url: "https://example.com/call.pdf".to_string(),
            source: "SCRIPTED".to_string(),
            participants: vec!["CEO".to_string()],
            last_updated: Utc::now(),
        };
        store.upsert_transcript("INFY", &transcript).await.unwrap();
        let segments = vec![
            SegmentNode::new(0, "CEO", "Good evening."),
            SegmentNode::new(1, "Analyst", "Congratulations."),
        ];
        let report = store
            .append_transcript_segments(&transcript.id, &segments)
            .await
            .unwrap();

        assert!(report.is_complete());
        assert_eq!(store.segment_count(), 2);
        assert_eq!(store.edges_from("INFY", rel::HAS_TRANSCRIPT).len(), 1);
    }
}
