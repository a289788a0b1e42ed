//! Backfill job records and the job state machine.
//!
//! One [`BackfillJob`] exists per (entity, document-kind) pair. The record
//! is the durable checkpoint for a paginated backfill: cursor, counters,
//! and status survive process restarts. Only the orchestrator and the
//! verification engine mutate a job; everything else reads.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Kinds of meeting documents the source-of-record serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Agenda,
    Minutes,
    Transcript,
    Attachment,
}

impl DocumentKind {
    /// All kinds, in a stable order (used when expanding `--kinds=all`).
    pub const ALL: [DocumentKind; 4] = [
        DocumentKind::Agenda,
        DocumentKind::Minutes,
        DocumentKind::Transcript,
        DocumentKind::Attachment,
    ];

    /// Stable string form, matching the persisted column value.
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Agenda => "agenda",
            DocumentKind::Minutes => "minutes",
            DocumentKind::Transcript => "transcript",
            DocumentKind::Attachment => "attachment",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for unrecognized kind/status strings read from storage or CLI.
#[derive(Debug, Error)]
#[error("unknown {what}: '{value}'")]
pub struct ParseEnumError {
    what: &'static str,
    value: String,
}

impl FromStr for DocumentKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "agenda" => Ok(DocumentKind::Agenda),
            "minutes" => Ok(DocumentKind::Minutes),
            "transcript" => Ok(DocumentKind::Transcript),
            "attachment" => Ok(DocumentKind::Attachment),
            other => Err(ParseEnumError {
                what: "document kind",
                value: other.to_string(),
            }),
        }
    }
}

/// Identity of one backfill job: which entity, which document kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobKey {
    /// Source-of-record entity key (e.g. a municipality slug).
    pub entity_key: String,
    pub kind: DocumentKind,
}

impl JobKey {
    pub fn new(entity_key: impl Into<String>, kind: DocumentKind) -> Self {
        Self {
            entity_key: entity_key.into(),
            kind,
        }
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.entity_key, self.kind)
    }
}

/// Job lifecycle states.
///
/// `pending → running → {completed, failed, paused}`. Both `failed` and
/// `paused` are resumable: scheduling re-enters `running` from the stored
/// cursor. `completed` is reached only after verification passes — fetch
/// exhaustion alone never completes a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Paused,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Paused => "paused",
        }
    }

    /// Whether a scheduler may pick this job up.
    ///
    /// With `resume_only`, restricts to jobs that previously ran and
    /// stopped short (failed or paused).
    pub fn is_eligible(&self, resume_only: bool) -> bool {
        match self {
            JobStatus::Pending => !resume_only,
            JobStatus::Failed | JobStatus::Paused => true,
            JobStatus::Running | JobStatus::Completed => false,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "paused" => Ok(JobStatus::Paused),
            other => Err(ParseEnumError {
                what: "job status",
                value: other.to_string(),
            }),
        }
    }
}

/// Durable checkpoint record for one (entity, document-kind) backfill.
///
/// Field layout is a persisted contract — other tooling reads these
/// columns directly. Counters are monotonic within a run; `reset_for_run`
/// zeroes them when a job is re-run from scratch. `actual_count` is
/// authoritative only once `verified_at` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackfillJob {
    pub entity_key: String,
    pub kind: DocumentKind,
    pub status: JobStatus,
    /// Opaque resume token; empty string means "start from the beginning".
    pub last_cursor: String,
    pub pages_fetched: i64,
    pub pages_created: i64,
    pub pages_updated: i64,
    pub errors_encountered: i64,
    pub expected_count: Option<i64>,
    pub actual_count: Option<i64>,
    pub verified_at: Option<DateTime<Utc>>,
    pub last_error: String,
    pub retry_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BackfillJob {
    /// Fresh job in `pending`, cursor at the start.
    pub fn new(key: JobKey) -> Self {
        let now = Utc::now();
        Self {
            entity_key: key.entity_key,
            kind: key.kind,
            status: JobStatus::Pending,
            last_cursor: String::new(),
            pages_fetched: 0,
            pages_created: 0,
            pages_updated: 0,
            errors_encountered: 0,
            expected_count: None,
            actual_count: None,
            verified_at: None,
            last_error: String::new(),
            retry_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn key(&self) -> JobKey {
        JobKey::new(self.entity_key.clone(), self.kind)
    }

    /// Re-run from scratch: counters and cursor reset, identity and
    /// `created_at` kept. History survives implicitly via `updated_at`.
    pub fn reset_for_run(&mut self) {
        self.last_cursor.clear();
        self.pages_fetched = 0;
        self.pages_created = 0;
        self.pages_updated = 0;
        self.errors_encountered = 0;
        self.expected_count = None;
        self.actual_count = None;
        self.verified_at = None;
        self.last_error.clear();
        self.retry_count = 0;
        self.touch();
    }

    /// Every run gets a fresh retry budget: a job that previously failed
    /// by exhausting its retries must back off from zero on resume.
    pub fn mark_running(&mut self) {
        self.status = JobStatus::Running;
        self.retry_count = 0;
        self.touch();
    }

    pub fn mark_paused(&mut self) {
        self.status = JobStatus::Paused;
        self.touch();
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = JobStatus::Failed;
        self.last_error = error.into();
        self.touch();
    }

    /// Terminal success: only the verification engine calls this.
    ///
    /// `last_error` survives unless the run was clean — a job that
    /// completed within tolerance but skipped rows keeps the latest row
    /// failure as its audit trail.
    pub fn mark_completed(&mut self, expected: i64, actual: i64) {
        self.status = JobStatus::Completed;
        self.expected_count = Some(expected);
        self.actual_count = Some(actual);
        self.verified_at = Some(Utc::now());
        if self.errors_encountered == 0 {
            self.last_error.clear();
        }
        self.touch();
    }

    /// Advance the checkpoint past one successfully written batch.
    ///
    /// The cursor only ever moves forward while running; callers pass the
    /// `next_cursor` the source returned for this batch.
    pub fn advance_checkpoint(&mut self, next_cursor: String, fetched: i64, created: i64, updated: i64) {
        self.last_cursor = next_cursor;
        self.pages_fetched += fetched;
        self.pages_created += created;
        self.pages_updated += updated;
        self.retry_count = 0;
        self.touch();
    }

    /// Count one skipped row. Row failures never abort the batch.
    pub fn record_row_error(&mut self, error: impl Into<String>) {
        self.errors_encountered += 1;
        self.last_error = error.into();
        self.touch();
    }

    pub fn record_retry(&mut self) {
        self.retry_count += 1;
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_eligibility() {
        assert!(JobStatus::Pending.is_eligible(false));
        assert!(!JobStatus::Pending.is_eligible(true));
        assert!(JobStatus::Failed.is_eligible(true));
        assert!(JobStatus::Paused.is_eligible(true));
        assert!(!JobStatus::Running.is_eligible(false));
        assert!(!JobStatus::Completed.is_eligible(false));
    }

    #[test]
    fn test_kind_round_trip() {
        for kind in DocumentKind::ALL {
            assert_eq!(kind.as_str().parse::<DocumentKind>().unwrap(), kind);
        }
        assert!("docket".parse::<DocumentKind>().is_err());
    }

    #[test]
    fn test_status_round_trip() {
        for s in ["pending", "running", "completed", "failed", "paused"] {
            assert_eq!(s.parse::<JobStatus>().unwrap().as_str(), s);
        }
    }

    #[test]
    fn test_advance_checkpoint_accumulates() {
        let mut job = BackfillJob::new(JobKey::new("springfield", DocumentKind::Agenda));
        job.mark_running();
        job.record_retry();
        job.advance_checkpoint("c1".into(), 2, 2, 0);
        job.advance_checkpoint("c2".into(), 1, 0, 1);

        assert_eq!(job.last_cursor, "c2");
        assert_eq!(job.pages_fetched, 3);
        assert_eq!(job.pages_created, 2);
        assert_eq!(job.pages_updated, 1);
        // A successful batch resets the per-run retry counter.
        assert_eq!(job.retry_count, 0);
    }

    #[test]
    fn test_reset_for_run_keeps_identity() {
        let mut job = BackfillJob::new(JobKey::new("springfield", DocumentKind::Minutes));
        job.mark_running();
        job.advance_checkpoint("c9".into(), 10, 10, 0);
        job.mark_failed("boom");
        let created = job.created_at;

        job.reset_for_run();
        assert_eq!(job.last_cursor, "");
        assert_eq!(job.pages_fetched, 0);
        assert_eq!(job.last_error, "");
        assert_eq!(job.created_at, created);
        assert_eq!(job.key(), JobKey::new("springfield", DocumentKind::Minutes));
    }

    #[test]
    fn test_completed_stamps_verification() {
        let mut job = BackfillJob::new(JobKey::new("shelbyville", DocumentKind::Agenda));
        job.mark_completed(100, 100);
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.expected_count, Some(100));
        assert_eq!(job.actual_count, Some(100));
        assert!(job.verified_at.is_some());
        assert_eq!(job.last_error, "");
    }

    #[test]
    fn test_completed_keeps_row_error_audit() {
        let mut job = BackfillJob::new(JobKey::new("shelbyville", DocumentKind::Agenda));
        job.record_row_error("doc-4#7: payload rejected");
        job.mark_completed(100, 99);
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.errors_encountered, 1);
        // The skipped row stays on the record after completion.
        assert_eq!(job.last_error, "doc-4#7: payload rejected");
    }

    #[test]
    fn test_running_refreshes_retry_budget() {
        let mut job = BackfillJob::new(JobKey::new("springfield", DocumentKind::Agenda));
        job.mark_running();
        job.record_retry();
        job.record_retry();
        job.mark_failed("gave up");
        assert_eq!(job.retry_count, 2);

        job.mark_running();
        assert_eq!(job.retry_count, 0);
        // Checkpoint and counters are untouched by the reset.
        assert_eq!(job.pages_fetched, 0);
        assert_eq!(job.last_cursor, "");
    }
}
