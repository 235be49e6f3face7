//! The ingestion pipeline: per-entity steps, batch runs and outcome reports.

mod cancel;
mod orchestrator;
mod outcome;
mod transform;

pub use cancel::CancelToken;
pub use orchestrator::{EntityRequest, IngestionOrchestrator, OrchestratorBuilder};
pub use outcome::{
    BatchSummary, EntityOutcome, FailureKind, IngestStep, OutcomeStatus, StepFailure,
    StepRecord, StepStatus,
};
