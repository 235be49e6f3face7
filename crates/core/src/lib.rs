//! Fingraph Core - configuration, caching and the ingestion pipeline.
//!
//! This crate ties the market-data sources to the graph store. It owns the
//! result cache, the text helpers used to prepare documents, and the
//! orchestrator that drives each entity through fetch, transform and upsert.

pub mod cache;
pub mod clock;
pub mod config;
pub mod documents;
pub mod errors;
pub mod ingest;
pub mod sentiment;
pub mod text;
pub mod transcript;

pub use cache::{CacheKey, CachedValue, DataKind, ResultCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, GraphConfig, Persistence, TextConfig};
pub use ingest::{
    BatchSummary, CancelToken, EntityOutcome, EntityRequest, FailureKind, IngestStep,
    IngestionOrchestrator, OrchestratorBuilder, OutcomeStatus, StepRecord, StepStatus,
};
pub use sentiment::{LexiconScorer, SentimentScorer};

// Re-export error types
pub use errors::Error;
pub use errors::Result;
