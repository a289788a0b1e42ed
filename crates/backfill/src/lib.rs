//! Backfill engine: orchestrator, retry policy, verification, scheduler.
//!
//! Drives the fetch→write→checkpoint loop for each (entity, document-kind)
//! job. The loop is sequential within a job (the cursor forbids parallel
//! pagination) and jobs fan out across a bounded worker pool. All durable
//! state lives in the [`quorum_store::CheckpointStore`]; a process crash
//! at any point costs at most one re-fetched batch.

pub mod backoff;
pub mod error;
pub mod orchestrator;
pub mod scheduler;
pub mod verify;

pub use backoff::RetryPolicy;
pub use error::BackfillError;
pub use orchestrator::{Orchestrator, PauseSignal};
pub use scheduler::{JobFilter, RunSummary, Scheduler};
pub use verify::Verifier;
