//! Fans the orchestrator out across many jobs.
//!
//! Cross-job parallelism, intra-job sequentiality: each worker owns one
//! job's sequential loop, and a semaphore bounds how many run at once so
//! the pool respects upstream rate limits. An in-process running set
//! enforces the one-running-job-per-key invariant on top of the persisted
//! status.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use quorum_core::{BackfillJob, DocumentKind, JobKey, JobStatus};
use quorum_store::CheckpointStore;

use crate::error::BackfillError;
use crate::orchestrator::{Orchestrator, PauseSignal};

/// Which jobs a run should touch.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    /// Restrict to one entity key; `None` means all.
    pub entity: Option<String>,
    /// Restrict to these kinds; empty means all.
    pub kinds: Vec<DocumentKind>,
    /// Only failed/paused jobs (the `--resume` flag).
    pub resume_only: bool,
    /// Recompute verification without fetching (the `--verify-only` flag).
    pub verify_only: bool,
}

impl JobFilter {
    fn matches(&self, job: &BackfillJob) -> bool {
        if let Some(entity) = &self.entity {
            if &job.entity_key != entity {
                return false;
            }
        }
        if !self.kinds.is_empty() && !self.kinds.contains(&job.kind) {
            return false;
        }
        // Verify-only is diagnostics: any non-running job qualifies.
        if self.verify_only {
            return job.status != JobStatus::Running;
        }
        job.status.is_eligible(self.resume_only)
    }
}

/// Outcome of one scheduling run.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub jobs: Vec<BackfillJob>,
}

impl RunSummary {
    /// True when every selected job reached `completed` — the CLI's
    /// exit-code condition.
    pub fn all_completed(&self) -> bool {
        self.jobs
            .iter()
            .all(|j| j.status == JobStatus::Completed)
    }
}

/// Releases a key's running-set claim when the worker finishes,
/// including by panic — a poisoned claim would block the key forever.
struct RunningGuard {
    running: Arc<Mutex<HashMap<JobKey, Arc<PauseSignal>>>>,
    key: JobKey,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.running.lock().unwrap().remove(&self.key);
    }
}

pub struct Scheduler {
    orchestrator: Arc<Orchestrator>,
    checkpoints: Arc<dyn CheckpointStore>,
    workers: usize,
    running: Arc<Mutex<HashMap<JobKey, Arc<PauseSignal>>>>,
}

impl Scheduler {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        checkpoints: Arc<dyn CheckpointStore>,
        workers: usize,
    ) -> Self {
        Self {
            orchestrator,
            checkpoints,
            workers: workers.max(1),
            running: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Create the job record for `key` if none exists yet.
    ///
    /// Existing records are left untouched, whatever their status.
    pub async fn enqueue(&self, key: JobKey) -> Result<(), BackfillError> {
        if self.checkpoints.load(&key).await?.is_none() {
            info!(job = %key, "enqueuing new job");
            self.checkpoints.save(&BackfillJob::new(key)).await?;
        }
        Ok(())
    }

    /// Ask a running job to stop at its next batch boundary.
    ///
    /// Returns false when the key is not currently running in this
    /// process.
    pub fn pause(&self, key: &JobKey) -> bool {
        let running = self.running.lock().unwrap();
        match running.get(key) {
            Some(signal) => {
                signal.pause();
                true
            }
            None => false,
        }
    }

    /// Run every eligible job under the filter and wait for all of them.
    pub async fn run_eligible(&self, filter: &JobFilter) -> Result<RunSummary, BackfillError> {
        let candidates: Vec<JobKey> = self
            .checkpoints
            .list()
            .await?
            .into_iter()
            .filter(|job| filter.matches(job))
            .map(|job| job.key())
            .collect();

        info!(jobs = candidates.len(), "scheduling eligible jobs");

        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut tasks = JoinSet::new();

        for key in candidates {
            // Per-key exclusivity: skip anything already claimed by a
            // worker in this process.
            let signal = {
                let mut running = self.running.lock().unwrap();
                if running.contains_key(&key) {
                    warn!(job = %key, "already running, skipping");
                    continue;
                }
                let signal = Arc::new(PauseSignal::new());
                running.insert(key.clone(), Arc::clone(&signal));
                signal
            };

            let orchestrator = Arc::clone(&self.orchestrator);
            let running = Arc::clone(&self.running);
            let semaphore = Arc::clone(&semaphore);
            let verify_only = filter.verify_only;

            tasks.spawn(async move {
                let _guard = RunningGuard {
                    running,
                    key: key.clone(),
                };
                // Closed only on scheduler drop, which cannot happen while
                // this future is still being awaited.
                let _permit = semaphore.acquire_owned().await;
                let result = if verify_only {
                    orchestrator.verify_only(&key).await
                } else {
                    orchestrator.run(&key, &signal).await
                };
                (key, result)
            });
        }

        let mut summary = RunSummary::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((key, Ok(job))) => {
                    info!(job = %key, status = %job.status, "job finished");
                    summary.jobs.push(job);
                }
                Ok((key, Err(e))) => {
                    // Checkpoint store failure: the job stops, the
                    // scheduler keeps going with the others.
                    error!(job = %key, error = %e, "job aborted");
                    if let Some(job) = self.checkpoints.load(&key).await? {
                        summary.jobs.push(job);
                    }
                }
                Err(e) => error!(error = %e, "worker panicked"),
            }
        }

        summary
            .jobs
            .sort_by(|a, b| (&a.entity_key, a.kind.as_str()).cmp(&(&b.entity_key, b.kind.as_str())));
        Ok(summary)
    }
}
