//! Per-job fetch→write→checkpoint loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use quorum_core::{BackfillConfig, BackfillJob, JobKey, JobStatus, UpsertOutcome};
use quorum_source::{Cursor, FetchError, SourceClient};
use quorum_store::{CheckpointStore, RowSink};

use crate::backoff::RetryPolicy;
use crate::error::BackfillError;
use crate::verify::Verifier;

/// Cooperative pause flag, observed at batch boundaries only.
///
/// Pausing mid-sleep wakes the backoff wait immediately; pausing mid-batch
/// takes effect once the current batch is written and checkpointed, so
/// cancellation latency is bounded by one batch, never by row count.
#[derive(Debug, Default)]
pub struct PauseSignal {
    flag: AtomicBool,
    notify: Notify,
}

impl PauseSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pause(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_paused(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    async fn wait(&self) {
        self.notify.notified().await;
    }
}

/// What one batch write did, before it is folded into the checkpoint.
#[derive(Debug, Default)]
struct BatchStats {
    fetched: i64,
    created: i64,
    updated: i64,
}

/// Drives one job at a time through fetch, per-row upsert, checkpoint,
/// and final verification. Holds no per-job state of its own — everything
/// durable lives on the [`BackfillJob`] record.
pub struct Orchestrator {
    source: Arc<dyn SourceClient>,
    sink: Arc<dyn RowSink>,
    checkpoints: Arc<dyn CheckpointStore>,
    config: BackfillConfig,
    retry: RetryPolicy,
    verifier: Verifier,
}

impl Orchestrator {
    pub fn new(
        source: Arc<dyn SourceClient>,
        sink: Arc<dyn RowSink>,
        checkpoints: Arc<dyn CheckpointStore>,
        config: BackfillConfig,
    ) -> Self {
        let retry = RetryPolicy::new(config.max_retries);
        let verifier = Verifier::new(
            Arc::clone(&source),
            Arc::clone(&sink),
            config.verify_tolerance,
        );
        Self {
            source,
            sink,
            checkpoints,
            config,
            retry,
            verifier,
        }
    }

    /// Run one job to a terminal state, resuming from its stored cursor.
    ///
    /// Returns the final job record; the only errors that escape are
    /// checkpoint-store failures (there is nowhere to record anything
    /// else). A completed job passed in here is re-run from scratch.
    pub async fn run(
        &self,
        key: &JobKey,
        pause: &PauseSignal,
    ) -> Result<BackfillJob, BackfillError> {
        let mut job = match self.checkpoints.load(key).await? {
            Some(mut existing) => {
                if existing.status == JobStatus::Completed {
                    existing.reset_for_run();
                }
                existing
            }
            None => BackfillJob::new(key.clone()),
        };

        info!(job = %key, cursor = %job.last_cursor, "backfill run starting");
        job.mark_running();
        self.checkpoints.save(&job).await?;

        let mut cursor = Cursor::from_token(job.last_cursor.clone());
        // Total-count metadata observed while fetching; verification falls
        // back to the count endpoint when the envelope never carried one.
        let mut observed_total: Option<i64> = None;

        loop {
            if pause.is_paused() {
                info!(job = %key, "pause observed at batch boundary");
                job.mark_paused();
                self.checkpoints.save(&job).await?;
                return Ok(job);
            }

            let page = match timeout(
                self.config.fetch_timeout(),
                self.source.fetch(key, &cursor, self.config.batch_size),
            )
            .await
            {
                Err(_) => Err(FetchError::Transient(format!(
                    "fetch timed out after {}s",
                    self.config.fetch_timeout_secs
                ))),
                Ok(result) => result,
            };

            let page = match page {
                Ok(page) => page,
                Err(e) if e.is_transient() => {
                    if self.retry.is_exhausted(job.retry_count) {
                        warn!(job = %key, error = %e, "retry budget exhausted");
                        job.mark_failed(format!(
                            "gave up after {} retries: {e}",
                            self.retry.max_retries()
                        ));
                        self.checkpoints.save(&job).await?;
                        return Ok(job);
                    }
                    let delay = self.retry.delay_for(job.retry_count);
                    warn!(
                        job = %key,
                        error = %e,
                        retry = job.retry_count + 1,
                        delay_secs = delay.as_secs(),
                        "transient fetch error, backing off"
                    );
                    job.record_retry();
                    self.checkpoints.save(&job).await?;
                    // Cancellable wait: a pause request cuts the sleep
                    // short and is handled at the top of the loop.
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = pause.wait() => {}
                    }
                    continue; // same cursor, no progress lost
                }
                Err(e) => {
                    // Stop-the-job condition; the untouched cursor makes a
                    // future resume retry this batch cleanly.
                    warn!(job = %key, error = %e, "permanent fetch error");
                    job.mark_failed(e.to_string());
                    self.checkpoints.save(&job).await?;
                    return Ok(job);
                }
            };

            if let Some(total) = page.total_count {
                observed_total = Some(total);
            }

            let stats = self.write_batch(&mut job, &page.rows).await;
            // On the final page the end marker persists as the empty start
            // token: a job that later fails verification re-walks the whole
            // sequence on resume (the gap could be anywhere), and idempotent
            // upserts make the re-walk safe.
            let next_token = page.next_cursor.token().unwrap_or_default().to_string();
            job.advance_checkpoint(next_token, stats.fetched, stats.created, stats.updated);
            self.checkpoints.save(&job).await?;
            debug!(
                job = %key,
                fetched = stats.fetched,
                created = stats.created,
                updated = stats.updated,
                "batch checkpointed"
            );

            if page.next_cursor.is_end() {
                break;
            }
            cursor = page.next_cursor;
        }

        info!(job = %key, pages = job.pages_fetched, "fetch exhausted, verifying");
        self.verifier.verify(&mut job, observed_total).await?;
        self.checkpoints.save(&job).await?;
        Ok(job)
    }

    /// Upsert each row independently. A failed row is counted and
    /// skipped; it never rolls back the batch or anything before it.
    async fn write_batch(&self, job: &mut BackfillJob, rows: &[quorum_core::PageRow]) -> BatchStats {
        let mut stats = BatchStats {
            fetched: rows.len() as i64,
            ..BatchStats::default()
        };
        for row in rows {
            match self.sink.upsert(row).await {
                Ok(UpsertOutcome::Created) => stats.created += 1,
                Ok(UpsertOutcome::Updated) => stats.updated += 1,
                Err(e) => {
                    warn!(
                        job = %job.key(),
                        document = %row.document_id,
                        page = row.page_number,
                        error = %e,
                        "row write failed, skipping"
                    );
                    job.record_row_error(format!(
                        "{}#{}: {e}",
                        row.document_id, row.page_number
                    ));
                }
            }
        }
        stats
    }

    /// Recompute the verification comparison without fetching anything.
    pub async fn verify_only(&self, key: &JobKey) -> Result<BackfillJob, BackfillError> {
        let mut job = self
            .checkpoints
            .load(key)
            .await?
            .ok_or_else(|| BackfillError::JobNotFound(key.to_string()))?;

        self.verifier.verify(&mut job, None).await?;
        self.checkpoints.save(&job).await?;
        Ok(job)
    }
}
