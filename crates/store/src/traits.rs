//! Storage contracts the backfill core is written against.

use async_trait::async_trait;

use quorum_core::{BackfillJob, JobKey, PageRow, UpsertOutcome};

use crate::error::StoreError;

/// Idempotent page writes, keyed by (entity, document, page number).
///
/// Calling `upsert` with identical arguments arbitrarily many times is
/// safe: the first call creates, every later call updates in place.
/// Concurrent upserts from different jobs land in disjoint key ranges and
/// need no coordination here.
#[async_trait]
pub trait RowSink: Send + Sync {
    async fn upsert(&self, row: &PageRow) -> Result<UpsertOutcome, StoreError>;

    /// Local row count scoped to one (entity, kind) — the verification
    /// engine's "actual" side.
    async fn count(&self, key: &JobKey) -> Result<i64, StoreError>;
}

/// Durable per-job checkpoint records.
///
/// `save` atomically overwrites the full record. A crash between "rows
/// written" and "checkpoint saved" is observable only as a re-fetch and
/// idempotent re-upsert of the in-flight batch on resume.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn load(&self, key: &JobKey) -> Result<Option<BackfillJob>, StoreError>;

    async fn save(&self, job: &BackfillJob) -> Result<(), StoreError>;

    /// All known jobs, for scheduler selection and operator listings.
    async fn list(&self) -> Result<Vec<BackfillJob>, StoreError>;
}
