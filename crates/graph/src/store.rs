use std::future::Future;

use async_trait::async_trait;
use serde::Serialize;
use tracing::warn;

use crate::error::{GraphError, Result};
use crate::model::{
    AnalysisNode, DocumentNode, EntityNode, NewsItemNode, PricePointNode, SectorNode, SegmentNode,
    SentimentAnalysisNode, TextChunkNode, TranscriptNode,
};
use crate::state::ConnectionState;

/// Rows per transaction for batch writes.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Result of a chunked batch write.
///
/// Chunks are committed in order and writing stops at the first failure, so
/// `rows_committed` is always a prefix of the input.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchWriteReport {
    pub rows_total: usize,
    pub chunks_total: usize,
    pub chunks_committed: usize,
    pub rows_committed: usize,
    pub error: Option<String>,
}

impl BatchWriteReport {
    pub fn is_complete(&self) -> bool {
        self.error.is_none() && self.chunks_committed == self.chunks_total
    }

    pub fn summary(&self) -> String {
        let mut s = format!(
            "{} of {} chunks succeeded",
            self.chunks_committed, self.chunks_total
        );
        if let Some(err) = &self.error {
            s.push_str(&format!(" ({err})"));
        }
        s
    }
}

/// Split `rows` into chunks and hand each one to `write` in order.
pub async fn write_chunked<'a, T, F, Fut>(
    rows: &'a [T],
    chunk_size: usize,
    mut write: F,
) -> BatchWriteReport
where
    F: FnMut(&'a [T]) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let chunk_size = chunk_size.max(1);
    let mut report = BatchWriteReport {
        rows_total: rows.len(),
        chunks_total: rows.len().div_ceil(chunk_size),
        ..Default::default()
    };

    for (idx, chunk) in rows.chunks(chunk_size).enumerate() {
        match write(chunk).await {
            Ok(()) => {
                report.chunks_committed += 1;
                report.rows_committed += chunk.len();
            }
            Err(e) => {
                warn!(
                    chunk = idx + 1,
                    chunks = report.chunks_total,
                    "Batch chunk failed: {}",
                    e
                );
                report.error = Some(e.to_string());
                break;
            }
        }
    }
    report
}

/// Idempotent persistence for the canonical data model.
///
/// Every upsert merges on the node's natural key and then sets the remaining
/// properties, so repeating a call with the same payload leaves the graph
/// unchanged. Relationships are merged the same way.
///
/// Batch methods return `Err` only when nothing could be attempted; partial
/// progress is reported through [`BatchWriteReport`].
#[async_trait]
pub trait GraphStore: Send + Sync {
    fn state(&self) -> ConnectionState;

    /// Reconnect once if disconnected. Fails with `Unavailable` if the store
    /// still cannot accept writes.
    async fn ensure_ready(&self) -> Result<()>;

    async fn ensure_schema(&self) -> Result<()>;

    async fn upsert_entity(&self, entity: &EntityNode) -> Result<()>;

    async fn upsert_sector(&self, sector: &SectorNode) -> Result<()>;

    async fn link_entity_to_sector(&self, ticker: &str, sector: &str) -> Result<()>;

    async fn upsert_price_points(
        &self,
        ticker: &str,
        points: &[PricePointNode],
    ) -> Result<BatchWriteReport>;

    async fn upsert_news_items(
        &self,
        ticker: &str,
        items: &[NewsItemNode],
    ) -> Result<BatchWriteReport>;

    async fn upsert_document(&self, ticker: &str, document: &DocumentNode) -> Result<()>;

    async fn upsert_transcript(&self, ticker: &str, transcript: &TranscriptNode) -> Result<()>;

    async fn append_transcript_segments(
        &self,
        transcript_id: &str,
        segments: &[SegmentNode],
    ) -> Result<BatchWriteReport>;

    /// Attach chunks to a document or transcript.
    async fn upsert_text_chunks(
        &self,
        source_id: &str,
        chunks: &[TextChunkNode],
    ) -> Result<BatchWriteReport>;

    async fn upsert_analysis(&self, ticker: &str, analysis: &AnalysisNode) -> Result<()>;

    async fn upsert_sentiment(
        &self,
        ticker: &str,
        sentiment: &SentimentAnalysisNode,
    ) -> Result<()>;
}

pub(crate) fn missing_source(source_id: &str) -> GraphError {
    GraphError::Write(format!("No document or transcript with id {source_id}"))
}
