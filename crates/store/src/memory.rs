//! In-memory store for tests and dry runs.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use quorum_core::{BackfillJob, DocumentKind, JobKey, PageRow, UpsertOutcome};

use crate::error::StoreError;
use crate::traits::{CheckpointStore, RowSink};

type RowId = (String, String, i32);

#[derive(Debug, Clone)]
struct StoredRow {
    kind: DocumentKind,
    payload: serde_json::Value,
}

/// Hash-map backed [`RowSink`] + [`CheckpointStore`].
///
/// `poison_row` injects per-row write failures so tests can exercise the
/// orchestrator's row isolation without a real database.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: Mutex<HashMap<RowId, StoredRow>>,
    jobs: Mutex<HashMap<JobKey, BackfillJob>>,
    poisoned: Mutex<HashSet<(String, i32)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every upsert of (document, page) fail with `RowRejected`.
    pub fn poison_row(&self, document_id: impl Into<String>, page_number: i32) {
        self.poisoned
            .lock()
            .unwrap()
            .insert((document_id.into(), page_number));
    }

    pub fn row_count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn payload_of(&self, entity: &str, document: &str, page: i32) -> Option<serde_json::Value> {
        self.rows
            .lock()
            .unwrap()
            .get(&(entity.to_string(), document.to_string(), page))
            .map(|r| r.payload.clone())
    }
}

#[async_trait]
impl RowSink for MemoryStore {
    async fn upsert(&self, row: &PageRow) -> Result<UpsertOutcome, StoreError> {
        if self
            .poisoned
            .lock()
            .unwrap()
            .contains(&(row.document_id.clone(), row.page_number))
        {
            return Err(StoreError::RowRejected(format!(
                "poisoned row {}#{}",
                row.document_id, row.page_number
            )));
        }

        let id = (
            row.entity_key.clone(),
            row.document_id.clone(),
            row.page_number,
        );
        let stored = StoredRow {
            kind: row.kind,
            payload: row.payload.clone(),
        };
        match self.rows.lock().unwrap().insert(id, stored) {
            None => Ok(UpsertOutcome::Created),
            Some(_) => Ok(UpsertOutcome::Updated),
        }
    }

    async fn count(&self, key: &JobKey) -> Result<i64, StoreError> {
        let rows = self.rows.lock().unwrap();
        let n = rows
            .iter()
            .filter(|((entity, _, _), r)| *entity == key.entity_key && r.kind == key.kind)
            .count();
        Ok(n as i64)
    }
}

#[async_trait]
impl CheckpointStore for MemoryStore {
    async fn load(&self, key: &JobKey) -> Result<Option<BackfillJob>, StoreError> {
        Ok(self.jobs.lock().unwrap().get(key).cloned())
    }

    async fn save(&self, job: &BackfillJob) -> Result<(), StoreError> {
        self.jobs.lock().unwrap().insert(job.key(), job.clone());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<BackfillJob>, StoreError> {
        let mut jobs: Vec<_> = self.jobs.lock().unwrap().values().cloned().collect();
        jobs.sort_by(|a, b| {
            (&a.entity_key, a.kind.as_str()).cmp(&(&b.entity_key, b.kind.as_str()))
        });
        Ok(jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(entity: &str, doc: &str, page: i32, body: &str) -> PageRow {
        PageRow {
            entity_key: entity.into(),
            kind: DocumentKind::Agenda,
            document_id: doc.into(),
            page_number: page,
            payload: json!({ "body": body }),
            total_hint: None,
        }
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let store = MemoryStore::new();
        let r = row("springfield", "doc-1", 1, "v1");

        assert_eq!(store.upsert(&r).await.unwrap(), UpsertOutcome::Created);
        assert_eq!(store.upsert(&r).await.unwrap(), UpsertOutcome::Updated);
        assert_eq!(store.row_count(), 1);

        // Re-delivery with new content updates in place.
        let r2 = row("springfield", "doc-1", 1, "v2");
        assert_eq!(store.upsert(&r2).await.unwrap(), UpsertOutcome::Updated);
        assert_eq!(
            store.payload_of("springfield", "doc-1", 1).unwrap(),
            json!({ "body": "v2" })
        );
    }

    #[tokio::test]
    async fn test_count_scoped_to_entity_and_kind() {
        let store = MemoryStore::new();
        store.upsert(&row("springfield", "d1", 1, "x")).await.unwrap();
        store.upsert(&row("springfield", "d1", 2, "x")).await.unwrap();
        store.upsert(&row("shelbyville", "d2", 1, "x")).await.unwrap();

        let key = JobKey::new("springfield", DocumentKind::Agenda);
        assert_eq!(store.count(&key).await.unwrap(), 2);
        let other = JobKey::new("springfield", DocumentKind::Minutes);
        assert_eq!(store.count(&other).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_poisoned_row_rejected() {
        let store = MemoryStore::new();
        store.poison_row("bad-doc", 3);
        let err = store.upsert(&row("s", "bad-doc", 3, "x")).await.unwrap_err();
        assert!(matches!(err, StoreError::RowRejected(_)));
        assert_eq!(store.row_count(), 0);
    }

    #[tokio::test]
    async fn test_checkpoint_round_trip() {
        let store = MemoryStore::new();
        let key = JobKey::new("springfield", DocumentKind::Agenda);
        assert!(store.load(&key).await.unwrap().is_none());

        let mut job = BackfillJob::new(key.clone());
        job.mark_running();
        store.save(&job).await.unwrap();

        let loaded = store.load(&key).await.unwrap().unwrap();
        assert_eq!(loaded, job);
        assert_eq!(store.list().await.unwrap().len(), 1);
    }
}
