//! Neo4j-backed [`GraphStore`].

mod rows;

use async_trait::async_trait;
use neo4rs::{query, ConfigBuilder, Graph, Query};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::{GraphError, Result};
use crate::model::{
    AnalysisNode, DocumentNode, EntityNode, NewsItemNode, PricePointNode, SectorNode, SegmentNode,
    SentimentAnalysisNode, TextChunkNode, TranscriptNode,
};
use crate::schema::SCHEMA;
use crate::state::{ConnectionState, ConnectionTracker};
use crate::store::{write_chunked, BatchWriteReport, GraphStore, DEFAULT_CHUNK_SIZE};

use rows::nullable;

#[derive(Clone, Debug)]
pub struct Neo4jSettings {
    pub uri: String,
    pub user: String,
    pub password: String,
    pub database: Option<String>,
    pub max_connections: usize,
    pub fetch_size: usize,
    /// Rows per transaction for batch writes.
    pub chunk_size: usize,
}

impl Neo4jSettings {
    pub fn new(
        uri: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            uri: uri.into(),
            user: user.into(),
            password: password.into(),
            database: None,
            max_connections: 10,
            fetch_size: 500,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

const UPSERT_ENTITY: &str = "MERGE (c:Company {ticker: $ticker})
SET c.name = $name, c.sector = $sector, c.industry = $industry,
    c.exchange = $exchange, c.currency = $currency, c.country = $country,
    c.market_cap = $market_cap, c.pe_ratio = $pe_ratio, c.beta = $beta,
    c.dividend_yield = $dividend_yield, c.source = $source,
    c.last_updated = datetime($last_updated)";

const UPSERT_SECTOR: &str = "MERGE (:Sector {name: $name})";

const LINK_SECTOR: &str = "MERGE (c:Company {ticker: $ticker})
MERGE (s:Sector {name: $sector})
MERGE (c)-[:BELONGS_TO]->(s)";

const UPSERT_PRICES: &str = "MERGE (c:Company {ticker: $ticker})
WITH c
UNWIND $rows AS row
MERGE (p:PricePoint {id: row.id})
SET p.ticker = $ticker, p.date = date(row.date), p.open = row.open,
    p.high = row.high, p.low = row.low, p.close = row.close,
    p.adj_close = row.adj_close, p.volume = row.volume
MERGE (c)-[:HAS_PRICE]->(p)";

const UPSERT_NEWS: &str = "MERGE (c:Company {ticker: $ticker})
WITH c
UNWIND $rows AS row
MERGE (n:NewsItem {link: row.link})
SET n.title = row.title, n.publisher = row.publisher,
    n.published_at = datetime(row.published_at), n.date = date(row.date),
    n.sentiment = row.sentiment, n.sentiment_label = row.sentiment_label
MERGE (c)-[:HAS_NEWS]->(n)";

const UPSERT_DOCUMENT: &str = "MERGE (c:Company {ticker: $ticker})
MERGE (d:Document {id: $id})
SET d.type = $type, d.title = $title, d.date = date($date), d.url = $url,
    d.source = $source, d.accession = $accession, d.content = $content,
    d.last_updated = datetime($last_updated)
MERGE (c)-[:HAS_DOCUMENT]->(d)";

const UPSERT_TRANSCRIPT: &str = "MERGE (c:Company {ticker: $ticker})
MERGE (t:Document {id: $id})
SET t:Transcript, t.type = 'transcript', t.title = $title, t.date = date($date),
    t.quarter = $quarter, t.url = $url, t.source = $source,
    t.participants = $participants, t.last_updated = datetime($last_updated)
MERGE (c)-[:HAS_TRANSCRIPT]->(t)";

const APPEND_SEGMENTS: &str = "MATCH (t:Transcript {id: $transcript_id})
UNWIND $rows AS row
MERGE (s:Segment {id: row.id})
SET s.sequence = row.sequence, s.speaker = row.speaker, s.role = row.role,
    s.text = row.text, s.sentiment = row.sentiment
MERGE (t)-[:HAS_SEGMENT]->(s)
RETURN count(s) AS written";

const UPSERT_CHUNKS: &str = "MATCH (d:Document {id: $source_id})
UNWIND $rows AS row
MERGE (k:TextChunk {chunk_id: row.chunk_id})
SET k.sequence = row.sequence, k.text = row.text, k.source_id = $source_id
MERGE (d)-[:HAS_CHUNK]->(k)
RETURN count(k) AS written";

/// Chunks left over from a longer earlier version of the same source.
const PRUNE_CHUNKS: &str = "MATCH (d:Document {id: $source_id})-[:HAS_CHUNK]->(k:TextChunk)
WHERE k.sequence >= $count
DETACH DELETE k";

const UPSERT_ANALYSIS: &str = "MERGE (c:Company {ticker: $ticker})
MERGE (a:Analysis {ticker: $ticker})
SET a.as_of = date($as_of), a.last_close = $last_close, a.trend = $trend,
    a.momentum = $momentum, a.macd_signal = $macd_signal,
    a.sma_20 = $sma_20, a.sma_50 = $sma_50, a.sma_200 = $sma_200,
    a.rsi_14 = $rsi_14, a.macd = $macd, a.macd_signal_line = $macd_signal_line,
    a.macd_histogram = $macd_histogram, a.atr_14 = $atr_14, a.obv = $obv,
    a.generated_at = datetime($generated_at)
MERGE (c)-[:HAS_ANALYSIS]->(a)";

const UPSERT_SENTIMENT: &str = "MERGE (c:Company {ticker: $ticker})
MERGE (s:SentimentAnalysis {ticker: $ticker})
SET s.article_count = $article_count, s.average_score = $average_score,
    s.volatility = $volatility, s.positive_ratio = $positive_ratio,
    s.negative_ratio = $negative_ratio, s.trend = $trend,
    s.generated_at = datetime($generated_at)
MERGE (c)-[:HAS_SENTIMENT]->(s)";

fn iso_date(date: Option<chrono::NaiveDate>) -> Option<String> {
    date.map(|d| d.format("%Y-%m-%d").to_string())
}

pub struct Neo4jGraphStore {
    settings: Neo4jSettings,
    graph: RwLock<Option<Graph>>,
    tracker: ConnectionTracker,
}

impl Neo4jGraphStore {
    /// Create a store without connecting. The first `ensure_ready` connects.
    pub fn new(settings: Neo4jSettings) -> Self {
        Self {
            settings,
            graph: RwLock::new(None),
            tracker: ConnectionTracker::new(ConnectionState::Disconnected),
        }
    }

    /// Create a store and connect immediately.
    pub async fn connect(settings: Neo4jSettings) -> Result<Self> {
        let store = Self::new(settings);
        store.open().await?;
        Ok(store)
    }

    async fn open(&self) -> Result<()> {
        self.tracker.begin_connect();
        match self.try_open().await {
            Ok(graph) => {
                *self.graph.write().await = Some(graph);
                self.tracker.connected();
                info!(uri = %self.settings.uri, "Connected to graph store");
                Ok(())
            }
            Err(e) => {
                *self.graph.write().await = None;
                self.tracker.connect_failed();
                warn!(uri = %self.settings.uri, "Graph connection failed: {}", e);
                Err(e)
            }
        }
    }

    async fn try_open(&self) -> Result<Graph> {
        let mut builder = ConfigBuilder::default()
            .uri(self.settings.uri.as_str())
            .user(self.settings.user.as_str())
            .password(self.settings.password.as_str())
            .fetch_size(self.settings.fetch_size)
            .max_connections(self.settings.max_connections);
        if let Some(db) = &self.settings.database {
            builder = builder.db(db.as_str());
        }
        let config = builder
            .build()
            .map_err(|e| GraphError::Config(e.to_string()))?;
        let graph = Graph::connect(config)
            .await
            .map_err(|e| GraphError::Connection(e.to_string()))?;
        graph
            .run(query("RETURN 1"))
            .await
            .map_err(|e| GraphError::Connection(e.to_string()))?;
        Ok(graph)
    }

    async fn graph(&self) -> Result<Graph> {
        self.tracker.check_writable()?;
        self.graph
            .read()
            .await
            .clone()
            .ok_or(GraphError::Unavailable {
                state: ConnectionState::Disconnected,
            })
    }

    fn observe<T>(&self, result: std::result::Result<T, neo4rs::Error>) -> Result<T> {
        match result {
            Ok(v) => {
                self.tracker.record_success();
                Ok(v)
            }
            Err(e) => {
                self.tracker.record_failure();
                Err(e.into())
            }
        }
    }

    async fn run(&self, q: Query) -> Result<()> {
        let graph = self.graph().await?;
        let result = graph.run(q).await;
        self.observe(result)
    }

    /// Run one chunk in its own transaction.
    async fn run_chunk(&self, q: Query) -> Result<()> {
        let graph = self.graph().await?;
        let result = async {
            let mut txn = graph.start_txn().await?;
            txn.run(q).await?;
            txn.commit().await
        }
        .await;
        self.observe(result)
    }

    /// Run one chunk whose single statement returns `written`. Zero rows
    /// written means the parent node was missing.
    async fn run_chunk_counted(&self, q: Query, parent: &str) -> Result<()> {
        let graph = self.graph().await?;
        let result = async {
            let mut stream = graph.execute(q).await?;
            let mut written: i64 = 0;
            while let Some(row) = stream.next().await? {
                written += row.get::<i64>("written").unwrap_or(0);
            }
            Ok::<_, neo4rs::Error>(written)
        }
        .await;
        let written = self.observe(result)?;
        if written == 0 {
            return Err(crate::store::missing_source(parent));
        }
        Ok(())
    }

    /// Like [`Self::run_chunk_counted`], followed by `cleanup` in the same
    /// transaction.
    async fn run_chunk_counted_then(&self, q: Query, cleanup: Query, parent: &str) -> Result<()> {
        let graph = self.graph().await?;
        let result = async {
            let mut txn = graph.start_txn().await?;
            let mut stream = txn.execute(q).await?;
            let mut written: i64 = 0;
            while let Some(row) = stream.next(txn.handle()).await? {
                written += row.get::<i64>("written").unwrap_or(0);
            }
            if written > 0 {
                txn.run(cleanup).await?;
                txn.commit().await?;
            } else {
                txn.rollback().await?;
            }
            Ok::<_, neo4rs::Error>(written)
        }
        .await;
        let written = self.observe(result)?;
        if written == 0 {
            return Err(crate::store::missing_source(parent));
        }
        Ok(())
    }

    async fn run_ignoring_exists(&self, cypher: &str) -> Result<()> {
        match self.run(query(cypher)).await {
            Ok(()) => Ok(()),
            Err(e) => {
                let msg = e.to_string().to_lowercase();
                if msg.contains("already exists") || msg.contains("equivalent") {
                    let head: String = cypher.chars().take(80).collect();
                    warn!("Already exists (skipped): {}", head);
                    Ok(())
                } else {
                    Err(e)
                }
            }
        }
    }
}

#[async_trait]
impl GraphStore for Neo4jGraphStore {
    fn state(&self) -> ConnectionState {
        self.tracker.state()
    }

    async fn ensure_ready(&self) -> Result<()> {
        match self.tracker.state() {
            ConnectionState::Ready | ConnectionState::Degraded => Ok(()),
            _ => self.open().await,
        }
    }

    async fn ensure_schema(&self) -> Result<()> {
        info!("Ensuring graph schema");
        for item in SCHEMA {
            self.run_ignoring_exists(&item.cypher()).await?;
            debug!(name = item.name, "Schema item ready");
        }
        info!(items = SCHEMA.len(), "Graph schema ready");
        Ok(())
    }

    async fn upsert_entity(&self, entity: &EntityNode) -> Result<()> {
        let q = query(UPSERT_ENTITY)
            .param("ticker", entity.ticker.as_str())
            .param("name", nullable(entity.name.clone()))
            .param("sector", nullable(entity.sector.clone()))
            .param("industry", nullable(entity.industry.clone()))
            .param("exchange", nullable(entity.exchange.clone()))
            .param("currency", nullable(entity.currency.clone()))
            .param("country", nullable(entity.country.clone()))
            .param("market_cap", nullable(entity.market_cap))
            .param("pe_ratio", nullable(entity.pe_ratio))
            .param("beta", nullable(entity.beta))
            .param("dividend_yield", nullable(entity.dividend_yield))
            .param("source", nullable(entity.source.clone()))
            .param("last_updated", entity.last_updated.to_rfc3339());
        self.run(q).await
    }

    async fn upsert_sector(&self, sector: &SectorNode) -> Result<()> {
        self.run(query(UPSERT_SECTOR).param("name", sector.name.as_str()))
            .await
    }

    async fn link_entity_to_sector(&self, ticker: &str, sector: &str) -> Result<()> {
        let q = query(LINK_SECTOR)
            .param("ticker", ticker)
            .param("sector", sector);
        self.run(q).await
    }

    async fn upsert_price_points(
        &self,
        ticker: &str,
        points: &[PricePointNode],
    ) -> Result<BatchWriteReport> {
        self.tracker.check_writable()?;
        Ok(write_chunked(points, self.settings.chunk_size, |chunk| {
            self.run_chunk(
                query(UPSERT_PRICES)
                    .param("ticker", ticker)
                    .param("rows", rows::price_rows(ticker, chunk)),
            )
        })
        .await)
    }

    async fn upsert_news_items(
        &self,
        ticker: &str,
        items: &[NewsItemNode],
    ) -> Result<BatchWriteReport> {
        self.tracker.check_writable()?;
        Ok(write_chunked(items, self.settings.chunk_size, |chunk| {
            self.run_chunk(
                query(UPSERT_NEWS)
                    .param("ticker", ticker)
                    .param("rows", rows::news_rows(chunk)),
            )
        })
        .await)
    }

    async fn upsert_document(&self, ticker: &str, document: &DocumentNode) -> Result<()> {
        let q = query(UPSERT_DOCUMENT)
            .param("ticker", ticker)
            .param("id", document.id.as_str())
            .param("type", document.kind.as_str())
            .param("title", document.title.as_str())
            .param("date", nullable(iso_date(document.date)))
            .param("url", document.url.as_str())
            .param("source", document.source.as_str())
            .param("accession", nullable(document.accession.clone()))
            .param("content", nullable(document.content.clone()))
            .param("last_updated", document.last_updated.to_rfc3339());
        self.run(q).await
    }

    async fn upsert_transcript(&self, ticker: &str, transcript: &TranscriptNode) -> Result<()> {
        let q = query(UPSERT_TRANSCRIPT)
            .param("ticker", ticker)
            .param("id", transcript.id.as_str())
            .param("title", transcript.title.as_str())
            .param("date", nullable(iso_date(transcript.date)))
            .param("quarter", nullable(transcript.quarter.clone()))
            .param("url", transcript.url.as_str())
            .param("source", transcript.source.as_str())
            .param("participants", transcript.participants.clone())
            .param("last_updated", transcript.last_updated.to_rfc3339());
        self.run(q).await
    }

    async fn append_transcript_segments(
        &self,
        transcript_id: &str,
        segments: &[SegmentNode],
    ) -> Result<BatchWriteReport> {
        self.tracker.check_writable()?;
        Ok(write_chunked(segments, self.settings.chunk_size, |chunk| {
            self.run_chunk_counted(
                query(APPEND_SEGMENTS)
                    .param("transcript_id", transcript_id)
                    .param("rows", rows::segment_rows(chunk)),
                transcript_id,
            )
        })
        .await)
    }

    async fn upsert_text_chunks(
        &self,
        source_id: &str,
        chunks: &[TextChunkNode],
    ) -> Result<BatchWriteReport> {
        self.tracker.check_writable()?;
        let count = i64::try_from(chunks.len()).unwrap_or(i64::MAX);
        Ok(write_chunked(chunks, self.settings.chunk_size, |batch| {
            self.run_chunk_counted_then(
                query(UPSERT_CHUNKS)
                    .param("source_id", source_id)
                    .param("rows", rows::chunk_rows(batch)),
                query(PRUNE_CHUNKS)
                    .param("source_id", source_id)
                    .param("count", count),
                source_id,
            )
        })
        .await)
    }

    async fn upsert_analysis(&self, ticker: &str, analysis: &AnalysisNode) -> Result<()> {
        let q = query(UPSERT_ANALYSIS)
            .param("ticker", ticker)
            .param("as_of", nullable(iso_date(analysis.as_of)))
            .param("last_close", nullable(analysis.last_close))
            .param("trend", analysis.trend.as_str())
            .param("momentum", analysis.momentum.as_str())
            .param("macd_signal", analysis.macd_signal.as_str())
            .param("sma_20", nullable(analysis.sma_20))
            .param("sma_50", nullable(analysis.sma_50))
            .param("sma_200", nullable(analysis.sma_200))
            .param("rsi_14", nullable(analysis.rsi_14))
            .param("macd", nullable(analysis.macd))
            .param("macd_signal_line", nullable(analysis.macd_signal_line))
            .param("macd_histogram", nullable(analysis.macd_histogram))
            .param("atr_14", nullable(analysis.atr_14))
            .param("obv", nullable(analysis.obv))
            .param(
                "generated_at",
                nullable(analysis.generated_at.map(|ts| ts.to_rfc3339())),
            );
        self.run(q).await
    }

    async fn upsert_sentiment(
        &self,
        ticker: &str,
        sentiment: &SentimentAnalysisNode,
    ) -> Result<()> {
        let q = query(UPSERT_SENTIMENT)
            .param("ticker", ticker)
            .param("article_count", i64::from(sentiment.article_count))
            .param("average_score", sentiment.average_score)
            .param("volatility", sentiment.volatility)
            .param("positive_ratio", sentiment.positive_ratio)
            .param("negative_ratio", sentiment.negative_ratio)
            .param("trend", sentiment.trend.as_str())
            .param(
                "generated_at",
                nullable(sentiment.generated_at.map(|ts| ts.to_rfc3339())),
            );
        self.run(q).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_new_store_starts_disconnected_and_refuses_writes() {
        let store = Neo4jGraphStore::new(Neo4jSettings::new(
            "bolt://localhost:7687",
            "neo4j",
            "secret",
        ));
        assert_eq!(store.state(), ConnectionState::Disconnected);

        let err = store
            .upsert_sector(&SectorNode {
                name: "Technology".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GraphError::Unavailable {
                state: ConnectionState::Disconnected
            }
        ));
    }

    #[test]
    fn test_statements_merge_on_natural_keys() {
        assert!(UPSERT_ENTITY.starts_with("MERGE (c:Company {ticker: $ticker})"));
        assert!(UPSERT_PRICES.contains("MERGE (p:PricePoint {id: row.id})"));
        assert!(UPSERT_NEWS.contains("MERGE (n:NewsItem {link: row.link})"));
        assert!(UPSERT_CHUNKS.contains("MERGE (k:TextChunk {chunk_id: row.chunk_id})"));
        assert!(PRUNE_CHUNKS.contains("k.sequence >= $count"));
        for statement in [LINK_SECTOR, UPSERT_PRICES, UPSERT_DOCUMENT, UPSERT_TRANSCRIPT] {
            assert!(!statement.contains("CREATE"), "{statement}");
        }
    }
}
