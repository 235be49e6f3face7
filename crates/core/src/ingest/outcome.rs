//! Per-entity and per-batch ingestion reports.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use fingraph_graph::GraphError;
use fingraph_market_data::MarketDataError;

/// Pipeline steps, in execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum IngestStep {
    ResolveIdentifier,
    FetchMarketData,
    ComputeIndicators,
    FetchNews,
    CollectDocuments,
    PersistGraph,
}

impl IngestStep {
    pub const ALL: [IngestStep; 6] = [
        IngestStep::ResolveIdentifier,
        IngestStep::FetchMarketData,
        IngestStep::ComputeIndicators,
        IngestStep::FetchNews,
        IngestStep::CollectDocuments,
        IngestStep::PersistGraph,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ResolveIdentifier => "resolve_identifier",
            Self::FetchMarketData => "fetch_market_data",
            Self::ComputeIndicators => "compute_indicators",
            Self::FetchNews => "fetch_news",
            Self::CollectDocuments => "collect_documents",
            Self::PersistGraph => "persist_graph",
        }
    }

    /// Steps that pull data from an external source.
    pub fn is_fetch(&self) -> bool {
        matches!(
            self,
            Self::FetchMarketData | Self::FetchNews | Self::CollectDocuments
        )
    }
}

impl fmt::Display for IngestStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    Succeeded,
    Failed,
    Skipped,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    EntityNotFound,
    SourceUnavailable,
    MalformedPayload,
    GraphStoreUnavailable,
    CacheCorrupt,
    InvalidIdentifier,
    NotSupported,
    Cancelled,
    TimedOut,
}

impl From<&MarketDataError> for FailureKind {
    fn from(err: &MarketDataError) -> Self {
        match err {
            MarketDataError::EntityNotFound(_) => Self::EntityNotFound,
            MarketDataError::InvalidSymbol(_) => Self::InvalidIdentifier,
            MarketDataError::MalformedPayload { .. } => Self::MalformedPayload,
            MarketDataError::NotSupported { .. } => Self::NotSupported,
            MarketDataError::Timeout { .. } => Self::TimedOut,
            MarketDataError::RateLimited { .. }
            | MarketDataError::ServerError { .. }
            | MarketDataError::RequestRejected { .. }
            | MarketDataError::SourceUnavailable { .. }
            | MarketDataError::Network(_) => Self::SourceUnavailable,
        }
    }
}

impl From<&GraphError> for FailureKind {
    fn from(_: &GraphError) -> Self {
        Self::GraphStoreUnavailable
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepFailure {
    pub kind: FailureKind,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepRecord {
    pub step: IngestStep,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<StepFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub duration_ms: u64,
}

impl StepRecord {
    pub fn succeeded(step: IngestStep, detail: impl Into<String>) -> Self {
        Self {
            step,
            status: StepStatus::Succeeded,
            failure: None,
            detail: Some(detail.into()),
            duration_ms: 0,
        }
    }

    pub fn failed(step: IngestStep, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            step,
            status: StepStatus::Failed,
            failure: Some(StepFailure {
                kind,
                message: message.into(),
            }),
            detail: None,
            duration_ms: 0,
        }
    }

    /// Not attempted because its input is absent or it is not configured.
    pub fn skipped(step: IngestStep, reason: impl Into<String>) -> Self {
        Self {
            step,
            status: StepStatus::Skipped,
            failure: None,
            detail: Some(reason.into()),
            duration_ms: 0,
        }
    }

    pub fn cancelled(step: IngestStep) -> Self {
        Self {
            step,
            status: StepStatus::Skipped,
            failure: Some(StepFailure {
                kind: FailureKind::Cancelled,
                message: "Cancelled before the step started".to_string(),
            }),
            detail: None,
            duration_ms: 0,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn is_succeeded(&self) -> bool {
        self.status == StepStatus::Succeeded
    }

    pub fn is_failed(&self) -> bool {
        self.status == StepStatus::Failed
    }

    pub fn is_cancelled(&self) -> bool {
        self.failure
            .as_ref()
            .is_some_and(|f| f.kind == FailureKind::Cancelled)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeStatus {
    /// Every attempted step succeeded.
    Succeeded,
    /// The identifier resolved and at least one fetch succeeded, but something
    /// failed or was cancelled.
    Partial,
    Failed,
    /// Cancelled before the identifier resolved and a fetch succeeded.
    Cancelled,
}

impl OutcomeStatus {
    /// Derive the status from the recorded steps.
    pub fn from_steps(steps: &[StepRecord]) -> Self {
        let succeeded = |step: IngestStep| {
            steps
                .iter()
                .any(|r| r.step == step && r.is_succeeded())
        };
        let resolved = succeeded(IngestStep::ResolveIdentifier);
        let fetched = steps.iter().any(|r| r.step.is_fetch() && r.is_succeeded());
        let any_failed = steps.iter().any(StepRecord::is_failed);
        let any_cancelled = steps.iter().any(StepRecord::is_cancelled);
        let minimum_met = resolved && fetched;

        if any_cancelled && !minimum_met {
            Self::Cancelled
        } else if resolved && !any_failed && !any_cancelled {
            Self::Succeeded
        } else if minimum_met {
            Self::Partial
        } else {
            Self::Failed
        }
    }
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => write!(f, "succeeded"),
            Self::Partial => write!(f, "partial"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// What happened to one entity.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityOutcome {
    pub ticker: String,
    /// Source symbol, once resolved
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    pub status: OutcomeStatus,
    pub steps: Vec<StepRecord>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl EntityOutcome {
    pub fn new(
        ticker: impl Into<String>,
        symbol: Option<String>,
        steps: Vec<StepRecord>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            ticker: ticker.into(),
            symbol,
            status: OutcomeStatus::from_steps(&steps),
            steps,
            started_at,
            finished_at: Utc::now(),
        }
    }

    pub fn step(&self, step: IngestStep) -> Option<&StepRecord> {
        self.steps.iter().find(|r| r.step == step)
    }

    pub fn failures(&self) -> impl Iterator<Item = &StepRecord> {
        self.steps.iter().filter(|r| r.is_failed())
    }

    /// One-line-per-step text rendering.
    pub fn render(&self) -> String {
        let mut out = format!("{} [{}]\n", self.ticker, self.status);
        for record in &self.steps {
            let status = match record.status {
                StepStatus::Succeeded => "ok",
                StepStatus::Failed => "FAILED",
                StepStatus::Skipped => "skipped",
            };
            out.push_str(&format!("  {:<20} {:<8}", record.step.as_str(), status));
            if let Some(failure) = &record.failure {
                out.push_str(&format!(" {:?}: {}", failure.kind, failure.message));
            }
            if let Some(detail) = &record.detail {
                out.push_str(&format!(" {}", detail));
            }
            out.push('\n');
        }
        out
    }
}

/// Aggregated result of a batch run.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub partial: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub outcomes: Vec<EntityOutcome>,
}

impl BatchSummary {
    pub fn add_outcome(&mut self, outcome: EntityOutcome) {
        self.total += 1;
        match outcome.status {
            OutcomeStatus::Succeeded => self.succeeded += 1,
            OutcomeStatus::Partial => self.partial += 1,
            OutcomeStatus::Failed => self.failed += 1,
            OutcomeStatus::Cancelled => self.cancelled += 1,
        }
        self.outcomes.push(outcome);
    }

    /// No entity failed outright.
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    pub fn summary(&self) -> String {
        format!(
            "Processed {} entities: {} succeeded, {} partial, {} failed, {} cancelled",
            self.total, self.succeeded, self.partial, self.failed, self.cancelled
        )
    }

    /// Tickers that appear more than once in `tickers`.
    pub fn duplicates<'a>(tickers: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        let mut seen = BTreeSet::new();
        let mut dups = BTreeSet::new();
        for ticker in tickers {
            if !seen.insert(ticker) {
                dups.insert(ticker.to_string());
            }
        }
        dups.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(step: IngestStep) -> StepRecord {
        StepRecord::succeeded(step, "")
    }

    fn failed(step: IngestStep) -> StepRecord {
        StepRecord::failed(step, FailureKind::SourceUnavailable, "down")
    }

    #[test]
    fn test_all_succeeded() {
        let steps = vec![
            ok(IngestStep::ResolveIdentifier),
            ok(IngestStep::FetchMarketData),
            ok(IngestStep::ComputeIndicators),
            StepRecord::skipped(IngestStep::FetchNews, "No news source configured"),
            ok(IngestStep::PersistGraph),
        ];
        assert_eq!(OutcomeStatus::from_steps(&steps), OutcomeStatus::Succeeded);
    }

    #[test]
    fn test_persist_failure_is_partial() {
        let steps = vec![
            ok(IngestStep::ResolveIdentifier),
            ok(IngestStep::FetchMarketData),
            ok(IngestStep::ComputeIndicators),
            StepRecord::failed(
                IngestStep::PersistGraph,
                FailureKind::GraphStoreUnavailable,
                "disconnected",
            ),
        ];
        assert_eq!(OutcomeStatus::from_steps(&steps), OutcomeStatus::Partial);
    }

    #[test]
    fn test_no_fetch_is_failed() {
        let steps = vec![
            ok(IngestStep::ResolveIdentifier),
            failed(IngestStep::FetchMarketData),
            StepRecord::skipped(IngestStep::ComputeIndicators, "No price data"),
            failed(IngestStep::FetchNews),
        ];
        assert_eq!(OutcomeStatus::from_steps(&steps), OutcomeStatus::Failed);
    }

    #[test]
    fn test_cancelled_before_minimum() {
        let steps = vec![
            ok(IngestStep::ResolveIdentifier),
            StepRecord::cancelled(IngestStep::FetchMarketData),
        ];
        assert_eq!(OutcomeStatus::from_steps(&steps), OutcomeStatus::Cancelled);
    }

    #[test]
    fn test_cancelled_after_minimum_is_partial() {
        let steps = vec![
            ok(IngestStep::ResolveIdentifier),
            ok(IngestStep::FetchMarketData),
            StepRecord::cancelled(IngestStep::ComputeIndicators),
        ];
        assert_eq!(OutcomeStatus::from_steps(&steps), OutcomeStatus::Partial);
    }

    #[test]
    fn test_batch_summary_counts() {
        let now = Utc::now();
        let mut batch = BatchSummary::default();
        batch.add_outcome(EntityOutcome::new(
            "AAPL",
            None,
            vec![ok(IngestStep::ResolveIdentifier), ok(IngestStep::FetchMarketData)],
            now,
        ));
        batch.add_outcome(EntityOutcome::new(
            "BAD",
            None,
            vec![StepRecord::failed(
                IngestStep::ResolveIdentifier,
                FailureKind::InvalidIdentifier,
                "bad",
            )],
            now,
        ));

        assert_eq!(batch.total, 2);
        assert_eq!(batch.succeeded, 1);
        assert_eq!(batch.failed, 1);
        assert!(!batch.is_success());
        assert_eq!(
            batch.summary(),
            "Processed 2 entities: 1 succeeded, 0 partial, 1 failed, 0 cancelled"
        );
    }

    #[test]
    fn test_duplicates() {
        let dups = BatchSummary::duplicates(["AAPL", "MSFT", "AAPL"]);
        assert_eq!(dups, vec!["AAPL".to_string()]);
    }

    #[test]
    fn test_failure_kind_from_market_error() {
        let err = MarketDataError::EntityNotFound("ZZZZ".into());
        assert_eq!(FailureKind::from(&err), FailureKind::EntityNotFound);
        let err = MarketDataError::InvalidSymbol("??".into());
        assert_eq!(FailureKind::from(&err), FailureKind::InvalidIdentifier);
    }
}
