//! Drives entities through the ingestion pipeline.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::OnceCell;
use tokio::time::Instant;

use fingraph_graph::{BatchWriteReport, GraphStore, SectorNode};
use fingraph_market_data::{
    listing_region, strip_yahoo_suffix, CollectedDocument, DocumentCollector, Exchange,
    IndicatorSet, ListingRegion, MarketDataError, MarketSnapshot, NewsArticle, NewsSource,
    SourceAdapter,
};

use super::cancel::CancelToken;
use super::outcome::{BatchSummary, EntityOutcome, FailureKind, IngestStep, StepRecord};
use super::transform::{
    analysis_node, entity_node, news_nodes, prepare_document, price_nodes, sentiment_node,
    PreparedDocument,
};
use crate::cache::{CacheKey, DataKind, ResultCache};
use crate::config::{Config, Persistence};
use crate::errors::{ConfigError, Result};
use crate::sentiment::{aggregate, LexiconScorer, SentimentScorer};

/// One entity to ingest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntityRequest {
    pub ticker: String,
    pub exchange: Option<Exchange>,
}

impl EntityRequest {
    pub fn new(ticker: impl Into<String>) -> Self {
        Self {
            ticker: ticker.into(),
            exchange: None,
        }
    }

    /// Same request, listed on `exchange`.
    pub fn on(mut self, exchange: Exchange) -> Self {
        self.exchange = Some(exchange);
        self
    }
}

#[derive(Default)]
pub struct OrchestratorBuilder {
    adapter: Option<Arc<dyn SourceAdapter>>,
    news: Option<Arc<dyn NewsSource>>,
    scorer: Option<Arc<dyn SentimentScorer>>,
    collectors: Vec<Arc<dyn DocumentCollector>>,
    store: Option<Arc<dyn GraphStore>>,
    cache: Option<Arc<ResultCache>>,
    config: Option<Config>,
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn adapter(mut self, adapter: Arc<dyn SourceAdapter>) -> Self {
        self.adapter = Some(adapter);
        self
    }

    pub fn news_source(mut self, news: Arc<dyn NewsSource>) -> Self {
        self.news = Some(news);
        self
    }

    pub fn scorer(mut self, scorer: Arc<dyn SentimentScorer>) -> Self {
        self.scorer = Some(scorer);
        self
    }

    pub fn collector(mut self, collector: Arc<dyn DocumentCollector>) -> Self {
        self.collectors.push(collector);
        self
    }

    pub fn store(mut self, store: Arc<dyn GraphStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn cache(mut self, cache: Arc<ResultCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    pub fn build(self) -> Result<IngestionOrchestrator> {
        let missing = |what: &str| ConfigError::Invalid(format!("Orchestrator requires {what}"));
        let adapter = self.adapter.ok_or_else(|| missing("a source adapter"))?;
        let cache = self.cache.ok_or_else(|| missing("a result cache"))?;
        let config = self.config.ok_or_else(|| missing("a configuration"))?;
        if config.workers == 0 {
            return Err(ConfigError::InvalidValue {
                key: "workers".to_string(),
                value: "0".to_string(),
            }
            .into());
        }
        if config.persistence == Persistence::Graph && self.store.is_none() {
            return Err(missing("a graph store when persistence is enabled").into());
        }

        Ok(IngestionOrchestrator {
            adapter,
            news: self.news,
            scorer: self
                .scorer
                .unwrap_or_else(|| Arc::new(LexiconScorer::default())),
            collectors: self.collectors,
            store: self.store,
            cache,
            config,
            schema: OnceCell::new(),
        })
    }
}

/// Data gathered for one entity as its steps run.
#[derive(Default)]
struct EntityContext {
    /// Source symbol, also the graph key (e.g. "TCS.NS")
    symbol: Option<String>,
    /// Ticker without the exchange suffix, as document collectors expect it
    canonical: Option<String>,
    region: Option<ListingRegion>,
    snapshot: Option<MarketSnapshot>,
    indicators: Option<IndicatorSet>,
    news: Vec<NewsArticle>,
    documents: Vec<CollectedDocument>,
}

enum Origin {
    Cache,
    Source,
    /// Expired entry served because the source failed.
    Stale {
        written_at: DateTime<Utc>,
        kind: FailureKind,
        error: String,
    },
}

/// A value obtained through the cache-first path.
struct Fetched<T> {
    value: T,
    origin: Origin,
    cache_error: Option<String>,
}

impl<T> Fetched<T> {
    fn describe(&self, what: &str, source: &str) -> String {
        let mut detail = match &self.origin {
            Origin::Cache => format!("{what} from cache"),
            Origin::Source => format!("{what} from {source}"),
            Origin::Stale { written_at, .. } => format!(
                "{what} from stale cache written {}",
                written_at.to_rfc3339()
            ),
        };
        if let Some(err) = &self.cache_error {
            detail.push_str(&format!("; cache write failed: {err}"));
        }
        detail
    }

    /// Step record for this fetch. Serving a stale entry keeps the source
    /// failure on the record, so the outcome never reads as a clean success.
    fn record(&self, step: IngestStep, what: &str, source: &str) -> StepRecord {
        let detail = self.describe(what, source);
        match &self.origin {
            Origin::Stale { kind, error, .. } => {
                StepRecord::failed(step, *kind, format!("{source} failed: {error}"))
                    .with_detail(detail)
            }
            Origin::Cache | Origin::Source => StepRecord::succeeded(step, detail),
        }
    }
}

/// Failures a stale cache entry may stand in for.
fn is_transient(err: &MarketDataError) -> bool {
    matches!(
        FailureKind::from(err),
        FailureKind::SourceUnavailable | FailureKind::TimedOut
    )
}

/// Per-write results of the persist step.
struct WriteLog<'a> {
    ticker: &'a str,
    lines: Vec<String>,
    failures: Vec<String>,
}

impl<'a> WriteLog<'a> {
    fn new(ticker: &'a str) -> Self {
        Self {
            ticker,
            lines: Vec::new(),
            failures: Vec::new(),
        }
    }

    fn single(&mut self, what: &str, result: fingraph_graph::Result<()>) -> bool {
        match result {
            Ok(()) => {
                self.lines.push(format!("{what} ok"));
                true
            }
            Err(err) => self.fail(what, err.to_string()),
        }
    }

    fn batch(&mut self, what: &str, result: fingraph_graph::Result<BatchWriteReport>) -> bool {
        match result {
            Ok(report) if report.is_complete() => {
                self.lines.push(format!("{what}: {}", report.summary()));
                true
            }
            Ok(report) => self.fail(what, report.summary()),
            Err(err) => self.fail(what, err.to_string()),
        }
    }

    fn fail(&mut self, what: &str, message: String) -> bool {
        warn!("Graph write '{}' failed for {}: {}", what, self.ticker, message);
        self.lines.push(format!("{what} FAILED: {message}"));
        self.failures.push(format!("{what}: {message}"));
        false
    }

    fn into_record(self) -> StepRecord {
        let detail = self.lines.join("; ");
        if self.failures.is_empty() {
            StepRecord::succeeded(IngestStep::PersistGraph, detail)
        } else {
            let total = self.lines.len();
            StepRecord::failed(
                IngestStep::PersistGraph,
                FailureKind::GraphStoreUnavailable,
                format!(
                    "{} of {} writes failed; first: {}",
                    self.failures.len(),
                    total,
                    self.failures[0]
                ),
            )
            .with_detail(detail)
        }
    }
}

/// Runs the ingestion pipeline for single entities and batches.
///
/// Steps run in [`IngestStep::ALL`] order. Each step is caught and recorded,
/// so a failing source or an unavailable graph store never aborts the
/// entity or the batch.
pub struct IngestionOrchestrator {
    adapter: Arc<dyn SourceAdapter>,
    news: Option<Arc<dyn NewsSource>>,
    scorer: Arc<dyn SentimentScorer>,
    collectors: Vec<Arc<dyn DocumentCollector>>,
    store: Option<Arc<dyn GraphStore>>,
    cache: Arc<ResultCache>,
    config: Config,
    schema: OnceCell<()>,
}

impl IngestionOrchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run every step for one entity.
    ///
    /// Cancellation is checked before each step; a step already running
    /// completes or hits the step timeout.
    pub async fn process_entity(
        &self,
        request: &EntityRequest,
        cancel: &CancelToken,
    ) -> EntityOutcome {
        let started_at = Utc::now();
        let mut ctx = EntityContext::default();
        let mut steps = Vec::with_capacity(IngestStep::ALL.len());

        debug!("Processing {}", request.ticker);
        for step in IngestStep::ALL {
            if cancel.is_cancelled() {
                steps.push(StepRecord::cancelled(step));
                continue;
            }
            if step != IngestStep::ResolveIdentifier && ctx.symbol.is_none() {
                steps.push(StepRecord::skipped(step, "Identifier did not resolve"));
                continue;
            }

            let begun = Instant::now();
            let record = match tokio::time::timeout(
                self.config.step_timeout,
                self.run_step(step, request, &mut ctx),
            )
            .await
            {
                Ok(record) => record,
                Err(_) => StepRecord::failed(
                    step,
                    FailureKind::TimedOut,
                    format!(
                        "Step did not finish within {}s",
                        self.config.step_timeout.as_secs_f64()
                    ),
                ),
            };
            let elapsed = u64::try_from(begun.elapsed().as_millis()).unwrap_or(u64::MAX);

            if let Some(failure) = &record.failure {
                warn!(
                    "{} failed for {}: {:?}: {}",
                    step, request.ticker, failure.kind, failure.message
                );
            }
            steps.push(record.with_duration(elapsed));
        }

        let outcome = EntityOutcome::new(request.ticker.clone(), ctx.symbol, steps, started_at);
        info!("Finished {}: {}", outcome.ticker, outcome.status);
        outcome
    }

    /// Process a batch on a bounded pool of `workers` concurrent entities.
    ///
    /// Outcomes are reported in input order. Entities not started before
    /// cancellation come back with every step cancelled.
    pub async fn process_many(
        &self,
        requests: Vec<EntityRequest>,
        cancel: &CancelToken,
    ) -> BatchSummary {
        let duplicates = BatchSummary::duplicates(requests.iter().map(|r| r.ticker.as_str()));
        if !duplicates.is_empty() {
            warn!(
                "Batch lists these tickers more than once: {}",
                duplicates.join(", ")
            );
        }

        let workers = self.config.workers.max(1);
        info!(
            "Processing {} entities with {} workers",
            requests.len(),
            workers
        );

        let mut results: Vec<(usize, EntityOutcome)> =
            stream::iter(requests.into_iter().enumerate())
                .map(|(index, request)| async move {
                    (index, self.process_entity(&request, cancel).await)
                })
                .buffer_unordered(workers)
                .collect()
                .await;
        results.sort_by_key(|(index, _)| *index);

        let mut summary = BatchSummary::default();
        for (_, outcome) in results {
            summary.add_outcome(outcome);
        }
        info!("{}", summary.summary());
        summary
    }

    async fn run_step(
        &self,
        step: IngestStep,
        request: &EntityRequest,
        ctx: &mut EntityContext,
    ) -> StepRecord {
        match step {
            IngestStep::ResolveIdentifier => self.resolve(request, ctx),
            IngestStep::FetchMarketData => self.fetch_market_data(ctx).await,
            IngestStep::ComputeIndicators => self.compute_indicators(ctx).await,
            IngestStep::FetchNews => self.fetch_news(ctx).await,
            IngestStep::CollectDocuments => self.collect_documents(ctx).await,
            IngestStep::PersistGraph => self.persist(ctx).await,
        }
    }

    fn resolve(&self, request: &EntityRequest, ctx: &mut EntityContext) -> StepRecord {
        let step = IngestStep::ResolveIdentifier;
        match self
            .adapter
            .resolve_symbol(&request.ticker, request.exchange.as_ref())
        {
            Ok(symbol) => {
                let region = listing_region(&symbol, request.exchange.as_ref());
                ctx.canonical = Some(strip_yahoo_suffix(&symbol).to_string());
                ctx.region = Some(region);
                let record =
                    StepRecord::succeeded(step, format!("{} -> {}", request.ticker, symbol));
                ctx.symbol = Some(symbol);
                record
            }
            Err(err) => StepRecord::failed(step, FailureKind::from(&err), err.to_string()),
        }
    }

    /// Serve a fresh cache entry, else fetch and store the result.
    ///
    /// When the fetch fails transiently and an expired entry exists, the
    /// entry's value is returned with [`Origin::Stale`] so the data still
    /// reaches the graph while the step is recorded as failed.
    async fn cache_first<T, Fut>(
        &self,
        key: &CacheKey,
        fetch: Fut,
    ) -> std::result::Result<Fetched<T>, MarketDataError>
    where
        T: Serialize + DeserializeOwned,
        Fut: Future<Output = std::result::Result<T, MarketDataError>>,
    {
        let stale = match self.cache.get::<T>(key).await {
            Some(hit) if hit.fresh => {
                debug!("Cache hit for {} {}", key.entity_id, key.kind.as_str());
                return Ok(Fetched {
                    value: hit.value,
                    origin: Origin::Cache,
                    cache_error: None,
                });
            }
            other => other,
        };

        match fetch.await {
            Ok(value) => {
                let cache_error = self.cache.put(key, &value).await.err().map(|err| {
                    warn!(
                        "Failed to cache {} for {}: {}",
                        key.kind.as_str(),
                        key.entity_id,
                        err
                    );
                    err.to_string()
                });
                Ok(Fetched {
                    value,
                    origin: Origin::Source,
                    cache_error,
                })
            }
            Err(err) if is_transient(&err) => match stale {
                Some(hit) => {
                    warn!(
                        "Serving stale {} for {} after fetch failure: {}",
                        key.kind.as_str(),
                        key.entity_id,
                        err
                    );
                    Ok(Fetched {
                        value: hit.value,
                        origin: Origin::Stale {
                            written_at: hit.written_at,
                            kind: FailureKind::from(&err),
                            error: err.to_string(),
                        },
                        cache_error: None,
                    })
                }
                None => Err(err),
            },
            Err(err) => Err(err),
        }
    }

    async fn fetch_market_data(&self, ctx: &mut EntityContext) -> StepRecord {
        let step = IngestStep::FetchMarketData;
        let Some(symbol) = ctx.symbol.clone() else {
            return StepRecord::skipped(step, "Identifier did not resolve");
        };
        let key = CacheKey::new(symbol.as_str(), DataKind::MarketData);

        match self.cache_first(&key, self.adapter.fetch(&symbol)).await {
            Ok(fetched) => {
                let record = fetched.record(
                    step,
                    &format!("{} price points", fetched.value.prices.len()),
                    self.adapter.id(),
                );
                ctx.snapshot = Some(fetched.value);
                record
            }
            Err(err) => StepRecord::failed(step, FailureKind::from(&err), err.to_string()),
        }
    }

    async fn compute_indicators(&self, ctx: &mut EntityContext) -> StepRecord {
        let step = IngestStep::ComputeIndicators;
        let (Some(symbol), Some(snapshot)) = (ctx.symbol.as_deref(), ctx.snapshot.as_ref()) else {
            return StepRecord::skipped(step, "No price history");
        };

        let set = self.adapter.compute_indicators(&snapshot.prices);
        let mut detail = format!(
            "{} indicators available from {} bars",
            set.available_count(),
            set.bars
        );
        if let Err(err) = self
            .cache
            .put(&CacheKey::new(symbol, DataKind::Indicators), &set)
            .await
        {
            warn!("Failed to cache indicators for {}: {}", symbol, err);
            detail.push_str(&format!("; cache write failed: {err}"));
        }
        ctx.indicators = Some(set);
        StepRecord::succeeded(step, detail)
    }

    async fn fetch_news(&self, ctx: &mut EntityContext) -> StepRecord {
        let step = IngestStep::FetchNews;
        let Some(source) = &self.news else {
            return StepRecord::skipped(step, "No news source configured");
        };
        let Some(symbol) = ctx.symbol.clone() else {
            return StepRecord::skipped(step, "Identifier did not resolve");
        };
        let key = CacheKey::new(symbol.as_str(), DataKind::News);

        match self.cache_first(&key, source.fetch_news(&symbol)).await {
            Ok(fetched) => {
                let record = fetched.record(
                    step,
                    &format!("{} news items", fetched.value.len()),
                    source.id(),
                );
                ctx.news = fetched.value;
                record
            }
            Err(err) => StepRecord::failed(step, FailureKind::from(&err), err.to_string()),
        }
    }

    /// Run every collector serving the entity's region. Documents from the
    /// collectors that succeeded are kept even when another one fails; the
    /// result is only cached when all of them succeeded.
    async fn collect_documents(&self, ctx: &mut EntityContext) -> StepRecord {
        let step = IngestStep::CollectDocuments;
        let (Some(symbol), Some(canonical), Some(region)) =
            (ctx.symbol.clone(), ctx.canonical.clone(), ctx.region)
        else {
            return StepRecord::skipped(step, "Identifier did not resolve");
        };

        let applicable: Vec<&Arc<dyn DocumentCollector>> = self
            .collectors
            .iter()
            .filter(|c| c.supports(region))
            .collect();
        if applicable.is_empty() {
            return StepRecord::skipped(
                step,
                format!("No document collector for {region:?} listings"),
            );
        }

        let key = CacheKey::new(symbol.as_str(), DataKind::Documents);
        if let Some(documents) = self
            .cache
            .lookup_fresh::<Vec<CollectedDocument>>(&key)
            .await
        {
            let detail = format!("{} documents from cache", documents.len());
            ctx.documents = documents;
            return StepRecord::succeeded(step, detail);
        }

        let mut documents = Vec::new();
        let mut errors: Vec<(&'static str, MarketDataError)> = Vec::new();
        for collector in applicable {
            match collector.collect(&canonical).await {
                Ok(mut found) => {
                    debug!(
                        "{} collected {} documents for {}",
                        collector.id(),
                        found.len(),
                        canonical
                    );
                    documents.append(&mut found);
                }
                Err(err) => errors.push((collector.id(), err)),
            }
        }

        let collected = format!("{} documents collected", documents.len());
        if errors.is_empty() {
            let mut detail = collected;
            if let Err(err) = self.cache.put(&key, &documents).await {
                warn!("Failed to cache documents for {}: {}", symbol, err);
                detail.push_str(&format!("; cache write failed: {err}"));
            }
            ctx.documents = documents;
            return StepRecord::succeeded(step, detail);
        }

        let kind = FailureKind::from(&errors[0].1);
        let message = errors
            .iter()
            .map(|(id, err)| format!("{id}: {err}"))
            .collect::<Vec<_>>()
            .join("; ");
        ctx.documents = documents;
        StepRecord::failed(step, kind, message).with_detail(collected)
    }

    async fn persist(&self, ctx: &mut EntityContext) -> StepRecord {
        let step = IngestStep::PersistGraph;
        if self.config.persistence == Persistence::Disabled {
            return StepRecord::skipped(step, "Persistence disabled");
        }
        let Some(store) = &self.store else {
            return StepRecord::skipped(step, "No graph store configured");
        };
        let Some(key) = ctx.symbol.as_deref() else {
            return StepRecord::skipped(step, "Identifier did not resolve");
        };
        if ctx.snapshot.is_none() && ctx.news.is_empty() && ctx.documents.is_empty() {
            return StepRecord::skipped(step, "Nothing to persist");
        }

        if let Err(err) = store.ensure_ready().await {
            return StepRecord::failed(step, FailureKind::from(&err), err.to_string());
        }
        if let Err(err) = self
            .schema
            .get_or_try_init(|| store.ensure_schema())
            .await
        {
            return StepRecord::failed(step, FailureKind::from(&err), err.to_string());
        }

        let now = Utc::now();
        let mut log = WriteLog::new(key);

        if let Some(snapshot) = &ctx.snapshot {
            log.single(
                "entity",
                store
                    .upsert_entity(&entity_node(key, Some(snapshot), self.adapter.id(), now))
                    .await,
            );
            if let Some(sector) = snapshot.profile.sector.as_deref() {
                let created = log.single(
                    "sector",
                    store
                        .upsert_sector(&SectorNode {
                            name: sector.to_string(),
                        })
                        .await,
                );
                if created {
                    log.single("sector link", store.link_entity_to_sector(key, sector).await);
                }
            }
            let prices = price_nodes(&snapshot.prices);
            if !prices.is_empty() {
                log.batch("price points", store.upsert_price_points(key, &prices).await);
            }
        }

        if let Some(set) = &ctx.indicators {
            log.single(
                "analysis",
                store.upsert_analysis(key, &analysis_node(set, now)).await,
            );
        }

        if !ctx.news.is_empty() {
            let (nodes, scored) = news_nodes(&ctx.news, self.scorer.as_ref());
            log.batch("news", store.upsert_news_items(key, &nodes).await);
            let summary = aggregate(&scored);
            log.single(
                "sentiment",
                store.upsert_sentiment(key, &sentiment_node(&summary, now)).await,
            );
        }

        for doc in &ctx.documents {
            let prepared = prepare_document(key, doc, self.config.text, self.scorer.as_ref(), now);
            let id = prepared.id().to_string();
            match prepared {
                PreparedDocument::Document { node, chunks } => {
                    let written = log.single(
                        &format!("document {id}"),
                        store.upsert_document(key, &node).await,
                    );
                    if written && !chunks.is_empty() {
                        log.batch(
                            &format!("chunks {id}"),
                            store.upsert_text_chunks(&id, &chunks).await,
                        );
                    }
                }
                PreparedDocument::Transcript {
                    node,
                    segments,
                    chunks,
                } => {
                    let written = log.single(
                        &format!("transcript {id}"),
                        store.upsert_transcript(key, &node).await,
                    );
                    if !written {
                        continue;
                    }
                    if !segments.is_empty() {
                        log.batch(
                            &format!("segments {id}"),
                            store.append_transcript_segments(&id, &segments).await,
                        );
                    }
                    if !chunks.is_empty() {
                        log.batch(
                            &format!("chunks {id}"),
                            store.upsert_text_chunks(&id, &chunks).await,
                        );
                    }
                }
            }
        }

        log.into_record()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_request_builder() {
        let request = EntityRequest::new("TCS").on(Exchange::Nse);
        assert_eq!(request.ticker, "TCS");
        assert_eq!(request.exchange, Some(Exchange::Nse));
    }

    #[test]
    fn test_write_log_reports_first_failure() {
        let mut log = WriteLog::new("AAPL");
        assert!(log.single("entity", Ok(())));
        let report = BatchWriteReport {
            rows_total: 3000,
            chunks_total: 3,
            chunks_committed: 1,
            rows_committed: 1000,
            error: Some("boom".to_string()),
        };
        assert!(!log.batch("price points", Ok(report)));
        let record = log.into_record();
        assert!(record.is_failed());
        let failure = record.failure.as_ref().unwrap();
        assert_eq!(failure.kind, FailureKind::GraphStoreUnavailable);
        assert!(failure.message.starts_with("1 of 2 writes failed"));
        assert!(record
            .detail
            .as_deref()
            .unwrap()
            .contains("1 of 3 chunks succeeded"));
    }

    #[test]
    fn test_write_log_all_ok() {
        let mut log = WriteLog::new("AAPL");
        log.single("entity", Ok(()));
        let record = log.into_record();
        assert!(record.is_succeeded());
        assert_eq!(record.detail.as_deref(), Some("entity ok"));
    }

    #[test]
    fn test_missing_adapter_is_a_config_error() {
        let result = IngestionOrchestrator::builder().build();
        assert!(matches!(result, Err(crate::Error::Config(_))));
    }
}
