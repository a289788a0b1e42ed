use thiserror::Error;

use quorum_store::StoreError;

/// Failures that stop a backfill run outright.
///
/// Fetch and row-write errors are absorbed by the orchestrator's policy
/// (retry, skip, or fail-the-job with the error recorded on the record);
/// what escapes here is the checkpoint store itself misbehaving, where
/// there is nowhere durable left to record anything.
#[derive(Debug, Error)]
pub enum BackfillError {
    #[error("checkpoint store error: {0}")]
    Store(#[from] StoreError),

    #[error("no job record for {0}")]
    JobNotFound(String),
}
