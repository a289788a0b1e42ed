//! Fetched row shape and upsert outcomes.

use serde::{Deserialize, Serialize};

use crate::job::DocumentKind;

/// One document page as returned by the source-of-record.
///
/// The ingestion core does not own this data; it carries just enough shape
/// to write the page through the row sink. Upsert identity is the triple
/// (entity, document, page number) — delivering the same triple twice is a
/// content update, never a duplicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRow {
    pub entity_key: String,
    pub kind: DocumentKind,
    /// Source-side document identifier (stable across pages).
    pub document_id: String,
    pub page_number: i32,
    /// Raw page payload, passed through opaquely.
    pub payload: serde_json::Value,
    /// Upstream's total-count hint, when the envelope includes one.
    #[serde(default)]
    pub total_hint: Option<i64>,
}

/// What an idempotent upsert did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
}
