//! PostgreSQL implementations of [`RowSink`] and [`CheckpointStore`].
//!
//! Plain-string queries over a shared [`PgPool`]; no compile-time query
//! checking so the crate builds without a database. Schema bootstrap is
//! `CREATE TABLE IF NOT EXISTS` — index and parallelism tuning beyond the
//! natural keys is left to the database operators.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tracing::info;

use quorum_core::{BackfillJob, JobKey, PageRow, UpsertOutcome};

use crate::error::StoreError;
use crate::traits::{CheckpointStore, RowSink};

/// Pool-backed store handle. Cheap to clone.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect and bootstrap the schema.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS meeting_pages (
                entity_key    TEXT NOT NULL,
                document_kind TEXT NOT NULL,
                document_id   TEXT NOT NULL,
                page_number   INT  NOT NULL,
                payload       JSONB NOT NULL,
                created_at    TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at    TIMESTAMPTZ NOT NULL DEFAULT now(),
                PRIMARY KEY (entity_key, document_id, page_number)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS backfill_jobs (
                entity_key         TEXT NOT NULL,
                document_kind      TEXT NOT NULL,
                status             TEXT NOT NULL,
                last_cursor        TEXT NOT NULL DEFAULT '',
                pages_fetched      BIGINT NOT NULL DEFAULT 0,
                pages_created      BIGINT NOT NULL DEFAULT 0,
                pages_updated      BIGINT NOT NULL DEFAULT 0,
                errors_encountered BIGINT NOT NULL DEFAULT 0,
                expected_count     BIGINT,
                actual_count       BIGINT,
                verified_at        TIMESTAMPTZ,
                last_error         TEXT NOT NULL DEFAULT '',
                retry_count        BIGINT NOT NULL DEFAULT 0,
                created_at         TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at         TIMESTAMPTZ NOT NULL DEFAULT now(),
                PRIMARY KEY (entity_key, document_kind)
            )",
        )
        .execute(&self.pool)
        .await?;

        info!("schema ready");
        Ok(())
    }
}

#[async_trait]
impl RowSink for PgStore {
    async fn upsert(&self, row: &PageRow) -> Result<UpsertOutcome, StoreError> {
        // xmax = 0 distinguishes a fresh insert from a conflict update.
        let inserted: bool = sqlx::query(
            "INSERT INTO meeting_pages
                (entity_key, document_kind, document_id, page_number, payload)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (entity_key, document_id, page_number)
             DO UPDATE SET payload = EXCLUDED.payload,
                           document_kind = EXCLUDED.document_kind,
                           updated_at = now()
             RETURNING (xmax = 0) AS inserted",
        )
        .bind(&row.entity_key)
        .bind(row.kind.as_str())
        .bind(&row.document_id)
        .bind(row.page_number)
        .bind(&row.payload)
        .fetch_one(&self.pool)
        .await?
        .try_get("inserted")?;

        Ok(if inserted {
            UpsertOutcome::Created
        } else {
            UpsertOutcome::Updated
        })
    }

    async fn count(&self, key: &JobKey) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM meeting_pages
             WHERE entity_key = $1 AND document_kind = $2",
        )
        .bind(&key.entity_key)
        .bind(key.kind.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}

/// Raw row shape for `backfill_jobs`; converted to the domain record so
/// bad status/kind strings surface as [`StoreError::CorruptRecord`]
/// instead of panics.
#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    entity_key: String,
    document_kind: String,
    status: String,
    last_cursor: String,
    pages_fetched: i64,
    pages_created: i64,
    pages_updated: i64,
    errors_encountered: i64,
    expected_count: Option<i64>,
    actual_count: Option<i64>,
    verified_at: Option<DateTime<Utc>>,
    last_error: String,
    retry_count: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<JobRow> for BackfillJob {
    type Error = StoreError;

    fn try_from(r: JobRow) -> Result<Self, StoreError> {
        let kind = r
            .document_kind
            .parse()
            .map_err(|e| StoreError::CorruptRecord(format!("{}: {e}", r.entity_key)))?;
        let status = r
            .status
            .parse()
            .map_err(|e| StoreError::CorruptRecord(format!("{}: {e}", r.entity_key)))?;
        Ok(BackfillJob {
            entity_key: r.entity_key,
            kind,
            status,
            last_cursor: r.last_cursor,
            pages_fetched: r.pages_fetched,
            pages_created: r.pages_created,
            pages_updated: r.pages_updated,
            errors_encountered: r.errors_encountered,
            expected_count: r.expected_count,
            actual_count: r.actual_count,
            verified_at: r.verified_at,
            last_error: r.last_error,
            retry_count: r.retry_count,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

const JOB_COLUMNS: &str = "entity_key, document_kind, status, last_cursor, \
     pages_fetched, pages_created, pages_updated, errors_encountered, \
     expected_count, actual_count, verified_at, last_error, retry_count, \
     created_at, updated_at";

#[async_trait]
impl CheckpointStore for PgStore {
    async fn load(&self, key: &JobKey) -> Result<Option<BackfillJob>, StoreError> {
        let row: Option<JobRow> = sqlx::query_as(&format!(
            "SELECT {JOB_COLUMNS} FROM backfill_jobs
             WHERE entity_key = $1 AND document_kind = $2"
        ))
        .bind(&key.entity_key)
        .bind(key.kind.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(BackfillJob::try_from).transpose()
    }

    async fn save(&self, job: &BackfillJob) -> Result<(), StoreError> {
        // Full-record overwrite in one statement: the checkpoint either
        // lands entirely or not at all.
        sqlx::query(
            "INSERT INTO backfill_jobs
                (entity_key, document_kind, status, last_cursor,
                 pages_fetched, pages_created, pages_updated, errors_encountered,
                 expected_count, actual_count, verified_at, last_error, retry_count,
                 created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
             ON CONFLICT (entity_key, document_kind) DO UPDATE SET
                status = EXCLUDED.status,
                last_cursor = EXCLUDED.last_cursor,
                pages_fetched = EXCLUDED.pages_fetched,
                pages_created = EXCLUDED.pages_created,
                pages_updated = EXCLUDED.pages_updated,
                errors_encountered = EXCLUDED.errors_encountered,
                expected_count = EXCLUDED.expected_count,
                actual_count = EXCLUDED.actual_count,
                verified_at = EXCLUDED.verified_at,
                last_error = EXCLUDED.last_error,
                retry_count = EXCLUDED.retry_count,
                updated_at = EXCLUDED.updated_at",
        )
        .bind(&job.entity_key)
        .bind(job.kind.as_str())
        .bind(job.status.as_str())
        .bind(&job.last_cursor)
        .bind(job.pages_fetched)
        .bind(job.pages_created)
        .bind(job.pages_updated)
        .bind(job.errors_encountered)
        .bind(job.expected_count)
        .bind(job.actual_count)
        .bind(job.verified_at)
        .bind(&job.last_error)
        .bind(job.retry_count)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<BackfillJob>, StoreError> {
        let rows: Vec<JobRow> = sqlx::query_as(&format!(
            "SELECT {JOB_COLUMNS} FROM backfill_jobs
             ORDER BY entity_key, document_kind"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(BackfillJob::try_from).collect()
    }
}
